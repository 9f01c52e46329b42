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

use super::{DataFile, DeleteMarker};
use crate::placement::{Placement, PlacementDecision};
use crate::{Error, ErrorKind, Result};

/// A delete marker attached to a catalog entry, with its placement once the
/// commit has placed it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDelete {
    marker: Arc<DeleteMarker>,
    placement: Option<Placement>,
}

impl EntryDelete {
    pub fn marker(&self) -> &Arc<DeleteMarker> {
        &self.marker
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }
}

/// Catalog entry for one data file.
///
/// Entries are copy-on-write: every modifier returns a new entry and leaves
/// `self` readable for snapshots that still reference it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    data_file: Arc<DataFile>,
    deletes: Vec<EntryDelete>,
}

impl CatalogEntry {
    pub fn new(data_file: DataFile) -> Self {
        Self {
            data_file: Arc::new(data_file),
            deletes: Vec::new(),
        }
    }

    pub fn data_file(&self) -> &Arc<DataFile> {
        &self.data_file
    }

    pub fn deletes(&self) -> &[EntryDelete] {
        &self.deletes
    }

    /// The markers of this entry, in commit order.
    pub fn markers(&self) -> Vec<Arc<DeleteMarker>> {
        self.deletes
            .iter()
            .map(|delete| delete.marker.clone())
            .collect()
    }

    /// Returns a copy of this entry with `marker` appended, unplaced.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidVector`] if the marker targets another file.
    pub fn with_marker(&self, marker: DeleteMarker) -> Result<Self> {
        if marker.data_file_id() != self.data_file.id() {
            return Err(Error::new(
                ErrorKind::InvalidVector,
                "Delete marker targets a different data file",
            )
            .with_context("data_file", self.data_file.id())
            .with_context("marker_data_file", marker.data_file_id()));
        }

        let mut entry = self.clone();
        entry.deletes.push(EntryDelete {
            marker: Arc::new(marker),
            placement: None,
        });
        Ok(entry)
    }

    /// Returns a copy of this entry with one placement per marker.
    pub fn with_placements(&self, placements: &[Placement]) -> Result<Self> {
        if placements.len() != self.deletes.len() {
            return Err(Error::new(
                ErrorKind::Unexpected,
                format!(
                    "Expected {} placements for data file {}, got {}",
                    self.deletes.len(),
                    self.data_file.id(),
                    placements.len()
                ),
            ));
        }

        let mut entry = self.clone();
        for (delete, placement) in entry.deletes.iter_mut().zip(placements) {
            delete.placement = Some(*placement);
        }
        Ok(entry)
    }

    /// Replaces all markers with a single folded one, unplaced.
    pub fn with_folded_marker(&self, folded: DeleteMarker) -> Result<Self> {
        Self {
            data_file: self.data_file.clone(),
            deletes: Vec::new(),
        }
        .with_marker(folded)
    }

    /// Entry for the file that replaces this one after a rewrite.
    ///
    /// Markers of the old file do not carry over.
    pub fn supersede(&self, data_file: DataFile) -> Self {
        Self::new(data_file)
    }

    /// Returns true if every marker has been placed.
    pub fn is_placed(&self) -> bool {
        self.deletes.iter().all(|delete| delete.placement.is_some())
    }

    /// Inline delete payload of this entry.
    pub fn inline_delete_bytes(&self) -> u64 {
        self.deletes
            .iter()
            .filter(|delete| {
                delete.placement.map(|p| p.decision) == Some(PlacementDecision::Inline)
            })
            .map(|delete| delete.marker.stats().size_bytes())
            .sum()
    }

    /// Upper bound on deleted rows; overlapping markers are counted once each.
    pub fn deleted_rows_upper_bound(&self) -> u64 {
        self.deletes
            .iter()
            .map(|delete| delete.marker.cardinality())
            .sum::<u64>()
            .min(self.data_file.record_count())
    }
}
