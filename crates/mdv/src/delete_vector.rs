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

use std::ops::BitOrAssign;

use roaring::RoaringTreemap;

/// Set of deleted row ordinals of one data file, backed by a roaring treemap.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeleteVector {
    inner: RoaringTreemap,
}

impl DeleteVector {
    pub fn new(roaring_treemap: RoaringTreemap) -> DeleteVector {
        DeleteVector {
            inner: roaring_treemap,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.inner.iter()
    }

    pub fn contains(&self, pos: u64) -> bool {
        self.inner.contains(pos)
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Largest deleted ordinal, if any.
    pub fn max(&self) -> Option<u64> {
        self.inner.max()
    }

    /// Size of the portable roaring serialization of this vector.
    ///
    /// Only the size is exposed; the encoding itself belongs to the storage
    /// layer.
    pub fn serialized_size_bytes(&self) -> u64 {
        self.inner.serialized_size() as u64
    }

    /// Unions `other` into this vector.
    pub fn union_with(&mut self, other: &DeleteVector) {
        self.inner.bitor_assign(&other.inner);
    }
}

impl FromIterator<u64> for DeleteVector {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        DeleteVector::new(RoaringTreemap::from_iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_iterate() {
        let dv: DeleteVector = [100u64, 42, 42, 1 << 33].into_iter().collect();

        let items: Vec<u64> = dv.iter().collect();
        assert_eq!(items, vec![42, 100, 1 << 33]);
        assert_eq!(dv.len(), 3);
        assert_eq!(dv.max(), Some(1 << 33));
        assert!(dv.contains(42));
        assert!(!dv.contains(43));
        assert!(!dv.is_empty());
        assert!(DeleteVector::default().is_empty());
        assert_eq!(DeleteVector::default().max(), None);
    }

    #[test]
    fn test_union_keeps_rows_from_both_sides() {
        let mut left: DeleteVector = [1u64, 5, 9].into_iter().collect();
        let right: DeleteVector = [5u64, 7].into_iter().collect();
        left.union_with(&right);
        assert_eq!(left.iter().collect::<Vec<_>>(), vec![1, 5, 7, 9]);
        assert_eq!(right.len(), 2);
    }

    #[test]
    fn test_serialized_size_grows_with_cardinality() {
        let small: DeleteVector = (0..10u64).map(|i| i * 97).collect();
        let large: DeleteVector = (0..10_000u64).map(|i| i * 97).collect();
        assert!(small.serialized_size_bytes() > 0);
        assert!(large.serialized_size_bytes() > small.serialized_size_bytes());
    }
}
