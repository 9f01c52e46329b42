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

//! Worst-first demotion of inline markers under a group cap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Counters describing one demotion pass.
///
/// `heap_pushes` and `heap_pops` are each bounded by the number of
/// candidates, and every one of them costs `O(log N)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemotionStats {
    /// Markers that were eligible for demotion.
    pub candidates: usize,
    /// Markers actually moved to external storage.
    pub demoted: usize,
    /// Heap insertions performed.
    pub heap_pushes: u64,
    /// Heap removals performed.
    pub heap_pops: u64,
}

impl DemotionStats {
    /// Total heap operations.
    pub fn heap_operations(&self) -> u64 {
        self.heap_pushes + self.heap_pops
    }
}

/// Heap element. The greatest candidate is the worst one to keep inline.
#[derive(Debug, Clone, Copy)]
struct DemotionCandidate {
    index: usize,
    size_bytes: u64,
    density: f64,
}

impl Ord for DemotionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size_bytes
            .cmp(&other.size_bytes)
            // lower density is worse
            .then_with(|| other.density.total_cmp(&self.density))
            // earlier markers go first on a full tie
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for DemotionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DemotionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DemotionCandidate {}

/// Max-heap of demotion candidates for one manifest group.
///
/// The heap is owned by a single group plan; groups never share one.
#[derive(Debug, Default)]
pub(crate) struct DemotionHeap {
    heap: BinaryHeap<DemotionCandidate>,
    stats: DemotionStats,
}

impl DemotionHeap {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            stats: DemotionStats::default(),
        }
    }

    pub(crate) fn push(&mut self, index: usize, size_bytes: u64, density: f64) {
        self.heap.push(DemotionCandidate {
            index,
            size_bytes,
            density,
        });
        self.stats.candidates += 1;
        self.stats.heap_pushes += 1;
    }

    /// Pops the worst candidates until `inline_bytes <= cap` or the heap is
    /// empty, returning the demoted indices in pop order.
    pub(crate) fn demote_until(&mut self, inline_bytes: &mut u64, cap: u64) -> Vec<usize> {
        let mut demoted = Vec::new();
        while *inline_bytes > cap {
            let Some(worst) = self.heap.pop() else {
                break;
            };
            self.stats.heap_pops += 1;
            *inline_bytes = inline_bytes.saturating_sub(worst.size_bytes);
            demoted.push(worst.index);
        }
        self.stats.demoted += demoted.len();
        demoted
    }

    pub(crate) fn stats(&self) -> DemotionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_is_demoted_first() {
        let mut heap = DemotionHeap::with_capacity(3);
        heap.push(0, 100, 0.5);
        heap.push(1, 300, 0.5);
        heap.push(2, 200, 0.5);

        let mut inline_bytes = 600;
        let demoted = heap.demote_until(&mut inline_bytes, 350);
        assert_eq!(demoted, vec![1]);
        assert_eq!(inline_bytes, 300);
    }

    #[test]
    fn test_lower_density_breaks_size_ties() {
        let mut heap = DemotionHeap::with_capacity(3);
        heap.push(0, 100, 0.9);
        heap.push(1, 100, 0.2);
        heap.push(2, 100, 0.5);

        let mut inline_bytes = 300;
        let demoted = heap.demote_until(&mut inline_bytes, 100);
        assert_eq!(demoted, vec![1, 2]);
    }

    #[test]
    fn test_index_breaks_full_ties() {
        let mut heap = DemotionHeap::with_capacity(3);
        for index in 0..3 {
            heap.push(index, 10, 0.5);
        }
        let mut inline_bytes = 30;
        assert_eq!(heap.demote_until(&mut inline_bytes, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_no_pops_when_under_cap() {
        let mut heap = DemotionHeap::with_capacity(1);
        heap.push(0, 10, 0.5);
        let mut inline_bytes = 10;
        assert!(heap.demote_until(&mut inline_bytes, 10).is_empty());

        let stats = heap.stats();
        assert_eq!(stats.heap_pushes, 1);
        assert_eq!(stats.heap_pops, 0);
        assert_eq!(stats.demoted, 0);
    }

    #[test]
    fn test_exhausted_heap_stops() {
        let mut heap = DemotionHeap::with_capacity(1);
        heap.push(0, 10, 0.5);
        let mut inline_bytes = 100;
        assert_eq!(heap.demote_until(&mut inline_bytes, 0), vec![0]);
        assert_eq!(inline_bytes, 90);
        assert_eq!(heap.stats().heap_operations(), 2);
    }
}
