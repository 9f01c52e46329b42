// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::Arc;

use crate::delete_vector::DeleteVector;
use crate::{Error, ErrorKind, Result};

/// Size and cardinality facts of one delete marker.
///
/// These are the only inputs placement looks at. The commit path usually
/// computes them while encoding the marker and hands them over as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStats {
    serialized_size_bytes: i64,
    cardinality: u64,
    row_count: u64,
}

impl MarkerStats {
    /// Creates marker statistics without validating them.
    ///
    /// Validation happens in [`MarkerStats::validate`], which every placement
    /// entry point calls before deciding anything.
    pub fn new(serialized_size_bytes: i64, cardinality: u64, row_count: u64) -> Self {
        Self {
            serialized_size_bytes,
            cardinality,
            row_count,
        }
    }

    /// Checks the marker invariants: non-negative size and
    /// `cardinality <= row_count`.
    pub fn validate(&self) -> Result<()> {
        if self.serialized_size_bytes < 0 {
            return Err(Error::new(
                ErrorKind::InvalidVector,
                format!(
                    "Delete marker has negative serialized size {}",
                    self.serialized_size_bytes
                ),
            ));
        }

        if self.cardinality > self.row_count {
            return Err(Error::new(
                ErrorKind::InvalidVector,
                format!(
                    "Delete marker cardinality {} exceeds row count {}",
                    self.cardinality, self.row_count
                ),
            ));
        }

        Ok(())
    }

    /// Serialized size in bytes, clamped at zero for unvalidated input.
    pub fn size_bytes(&self) -> u64 {
        self.serialized_size_bytes.max(0) as u64
    }

    pub fn serialized_size_bytes(&self) -> i64 {
        self.serialized_size_bytes
    }

    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Fraction of the file's rows that are deleted. Empty files have density 0.
    pub fn density(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.cardinality as f64 / self.row_count as f64
        }
    }
}

/// A record of which rows of one data file are logically deleted.
///
/// Markers are immutable. A marker built from a [`DeleteVector`] carries its
/// positions and can be resolved; a marker built from stats alone can only be
/// placed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMarker {
    data_file_id: String,
    sequence_number: i64,
    stats: MarkerStats,
    deletes: Option<Arc<DeleteVector>>,
}

impl DeleteMarker {
    /// Builds a marker from deleted positions, deriving cardinality and size.
    pub fn from_vector(
        data_file_id: impl Into<String>,
        sequence_number: i64,
        row_count: u64,
        deletes: DeleteVector,
    ) -> Self {
        let stats = MarkerStats::new(
            deletes.serialized_size_bytes() as i64,
            deletes.len(),
            row_count,
        );
        Self {
            data_file_id: data_file_id.into(),
            sequence_number,
            stats,
            deletes: Some(Arc::new(deletes)),
        }
    }

    /// Builds a marker from already computed facts, without positions.
    pub fn from_stats(
        data_file_id: impl Into<String>,
        sequence_number: i64,
        stats: MarkerStats,
    ) -> Self {
        Self {
            data_file_id: data_file_id.into(),
            sequence_number,
            stats,
            deletes: None,
        }
    }

    pub fn data_file_id(&self) -> &str {
        &self.data_file_id
    }

    /// Sequence number of the commit that recorded this marker.
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    pub fn stats(&self) -> &MarkerStats {
        &self.stats
    }

    pub fn cardinality(&self) -> u64 {
        self.stats.cardinality
    }

    pub fn density(&self) -> f64 {
        self.stats.density()
    }

    /// Deleted positions, if this marker carries them.
    pub fn deletes(&self) -> Option<&Arc<DeleteVector>> {
        self.deletes.as_ref()
    }
}

impl AsRef<DeleteMarker> for DeleteMarker {
    fn as_ref(&self) -> &DeleteMarker {
        self
    }
}
