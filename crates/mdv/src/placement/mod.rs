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

//! Inline vs external placement of delete markers.
//!
//! Every marker is first placed on its own:
//!
//! | Serialized size | Density | Placement |
//! |-----------------|---------|-----------|
//! | `<= small_inline_bytes` | any | Inline |
//! | `> hard_external_bytes` | any | External |
//! | in between | `>= density_cutoff` | Inline |
//! | in between | `< density_cutoff` | External |
//!
//! A manifest group then enforces its aggregate inline cap by demoting the
//! worst inline markers (largest first, then least dense) through a max-heap,
//! see [`plan_group`].

mod demotion;
mod group;

pub use demotion::DemotionStats;
pub use group::{GroupPlacement, place_entries, plan_group, plan_groups};

use crate::Result;
use crate::config::DeleteMetadataConfig;
use crate::spec::MarkerStats;

/// Where a delete marker is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementDecision {
    /// Stored inside the catalog entry that owns the data file.
    Inline,
    /// Stored as a separate object referenced from the catalog entry.
    External,
}

/// Which rule produced a [`PlacementDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementReason {
    /// At or below the inline byte floor.
    InlineFloor,
    /// Above the hard external limit.
    HardExternalLimit,
    /// Middle band, dense enough to stay inline.
    DenseMiddleBand,
    /// Middle band, too sparse to stay inline.
    SparseMiddleBand,
    /// Would have been inline but the manifest group's inline cap was exceeded.
    DemotedByGroupCap,
}

/// A placement decision together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub decision: PlacementDecision,
    pub reason: PlacementReason,
}

impl Placement {
    fn inline(reason: PlacementReason) -> Self {
        Self {
            decision: PlacementDecision::Inline,
            reason,
        }
    }

    fn external(reason: PlacementReason) -> Self {
        Self {
            decision: PlacementDecision::External,
            reason,
        }
    }

    pub fn is_inline(&self) -> bool {
        self.decision == PlacementDecision::Inline
    }

    /// Returns true if the group cap could move this marker to external.
    pub(crate) fn is_demotable(&self) -> bool {
        self.reason == PlacementReason::DenseMiddleBand
    }
}

/// Places a single marker, ignoring any group cap.
///
/// # Errors
///
/// Returns [`crate::ErrorKind::InvalidVector`] for malformed stats.
pub fn decide(stats: &MarkerStats, config: &DeleteMetadataConfig) -> Result<Placement> {
    stats.validate()?;
    Ok(decide_validated(stats, config))
}

pub(crate) fn decide_validated(stats: &MarkerStats, config: &DeleteMetadataConfig) -> Placement {
    let size = stats.size_bytes();
    if size <= config.small_inline_bytes() {
        Placement::inline(PlacementReason::InlineFloor)
    } else if size > config.hard_external_bytes() {
        Placement::external(PlacementReason::HardExternalLimit)
    } else if stats.density() >= config.density_cutoff() {
        Placement::inline(PlacementReason::DenseMiddleBand)
    } else {
        Placement::external(PlacementReason::SparseMiddleBand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn config() -> DeleteMetadataConfig {
        DeleteMetadataConfig::builder()
            .small_inline_bytes(4 * 1024)
            .hard_external_bytes(16 * 1024 * 1024)
            .density_cutoff(0.1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_small_markers_are_always_inline() {
        let config = config();
        for (size, cardinality) in [(0, 0), (1, 1), (4096, 1), (4096, 1_000_000)] {
            let stats = MarkerStats::new(size, cardinality, 1_000_000);
            let placement = decide(&stats, &config).unwrap();
            assert_eq!(placement.decision, PlacementDecision::Inline);
            assert_eq!(placement.reason, PlacementReason::InlineFloor);
        }
    }

    #[test]
    fn test_large_markers_are_always_external() {
        let config = config();
        let hard = config.hard_external_bytes() as i64;
        for cardinality in [1, 500_000, 1_000_000] {
            let stats = MarkerStats::new(hard + 1, cardinality, 1_000_000);
            let placement = decide(&stats, &config).unwrap();
            assert_eq!(placement.decision, PlacementDecision::External);
            assert_eq!(placement.reason, PlacementReason::HardExternalLimit);
        }
    }

    #[test]
    fn test_hard_limit_is_inclusive_for_middle_band() {
        let config = config();
        let hard = config.hard_external_bytes() as i64;
        let placement = decide(&MarkerStats::new(hard, 500, 1000), &config).unwrap();
        assert_eq!(placement.reason, PlacementReason::DenseMiddleBand);
    }

    #[test]
    fn test_middle_band_follows_density() {
        let config = config();
        let dense = decide(&MarkerStats::new(100 * 1024, 100, 1000), &config).unwrap();
        assert!(dense.is_inline());
        assert_eq!(dense.reason, PlacementReason::DenseMiddleBand);

        let sparse = decide(&MarkerStats::new(100 * 1024, 99, 1000), &config).unwrap();
        assert!(!sparse.is_inline());
        assert_eq!(sparse.reason, PlacementReason::SparseMiddleBand);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let config = config();
        let stats = MarkerStats::new(64 * 1024, 30, 1000);
        let first = decide(&stats, &config).unwrap();
        for _ in 0..10 {
            assert_eq!(decide(&stats, &config).unwrap(), first);
        }
    }

    #[test]
    fn test_decide_rejects_malformed_stats() {
        let config = config();
        let err = decide(&MarkerStats::new(10, 11, 10), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidVector);

        let err = decide(&MarkerStats::new(-5, 1, 10), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidVector);
    }
}
