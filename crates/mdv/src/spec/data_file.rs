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

use std::collections::BTreeMap;

/// Inclusive value range of one column, as recorded in file statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    /// Smallest value in the column.
    pub lower: i64,
    /// Largest value in the column.
    pub upper: i64,
}

impl ColumnRange {
    /// Creates a new range.
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// Returns true if `lower <= upper`.
    pub fn is_valid(&self) -> bool {
        self.lower <= self.upper
    }

    /// Smallest range covering both `self` and `other`.
    pub fn merge(&self, other: &ColumnRange) -> ColumnRange {
        ColumnRange {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Returns true if some value in `[lower, upper]` may be in this range.
    pub fn overlaps(&self, lower: i64, upper: i64) -> bool {
        self.lower <= upper && lower <= self.upper
    }
}

/// An immutable data file as seen by the delete bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    id: String,
    record_count: u64,
    ordinals_stable: bool,
    column_ranges: BTreeMap<i32, ColumnRange>,
}

impl DataFile {
    /// Creates a data file with stable row ordinals and no column statistics.
    pub fn new(id: impl Into<String>, record_count: u64) -> Self {
        Self {
            id: id.into(),
            record_count,
            ordinals_stable: true,
            column_ranges: BTreeMap::new(),
        }
    }

    /// Marks the file's row ordinals as unstable.
    ///
    /// Files whose rows may be renumbered by a concurrent compaction cannot be
    /// resolved positionally.
    pub fn with_unstable_ordinals(mut self) -> Self {
        self.ordinals_stable = false;
        self
    }

    /// Records the value range of a column.
    pub fn with_column_range(mut self, field_id: i32, lower: i64, upper: i64) -> Self {
        self.column_ranges
            .insert(field_id, ColumnRange::new(lower, upper));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn ordinals_stable(&self) -> bool {
        self.ordinals_stable
    }

    pub fn column_ranges(&self) -> &BTreeMap<i32, ColumnRange> {
        &self.column_ranges
    }

    pub fn column_range(&self, field_id: i32) -> Option<&ColumnRange> {
        self.column_ranges.get(&field_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_range_merge_and_overlap() {
        let a = ColumnRange::new(10, 20);
        let b = ColumnRange::new(15, 40);
        assert_eq!(a.merge(&b), ColumnRange::new(10, 40));
        assert_eq!(a.merge(&b), b.merge(&a));

        assert!(a.overlaps(20, 30));
        assert!(a.overlaps(0, 10));
        assert!(!a.overlaps(21, 30));
        assert!(!ColumnRange::new(5, 1).is_valid());
    }

    #[test]
    fn test_data_file_defaults_to_stable_ordinals() {
        let file = DataFile::new("data/f-1.parquet", 1000).with_column_range(1, 0, 99);
        assert!(file.ordinals_stable());
        assert_eq!(file.record_count(), 1000);
        assert_eq!(file.column_range(1), Some(&ColumnRange::new(0, 99)));
        assert!(file.column_range(2).is_none());

        let file = file.with_unstable_ordinals();
        assert!(!file.ordinals_stable());
    }
}
