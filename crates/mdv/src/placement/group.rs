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

//! Placement for a whole manifest group.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tracing::{debug, warn};

use super::demotion::{DemotionHeap, DemotionStats};
use super::{Placement, PlacementReason, decide_validated};
use crate::config::DeleteMetadataConfig;
use crate::spec::{CatalogEntry, MarkerStats};
use crate::{Error, Result};

/// Placement of every marker in one manifest group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlacement {
    placements: Vec<Placement>,
    inline_bytes: u64,
    external_bytes: u64,
    over_cap: bool,
    demotion: DemotionStats,
}

impl GroupPlacement {
    /// Placements in the same order as the input markers.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Total inline payload after demotion.
    pub fn inline_bytes(&self) -> u64 {
        self.inline_bytes
    }

    /// Total external payload after demotion.
    pub fn external_bytes(&self) -> u64 {
        self.external_bytes
    }

    pub fn inline_count(&self) -> usize {
        self.placements.iter().filter(|p| p.is_inline()).count()
    }

    pub fn external_count(&self) -> usize {
        self.placements.len() - self.inline_count()
    }

    /// True if markers under the inline floor alone exceed the group cap.
    ///
    /// Such markers are never demoted, so the cap cannot be met.
    pub fn over_cap(&self) -> bool {
        self.over_cap
    }

    pub fn demotion(&self) -> &DemotionStats {
        &self.demotion
    }
}

/// Places the markers of one manifest group.
///
/// Every marker is validated before anything is placed. Markers are then
/// placed individually; if the inline total exceeds
/// [`DeleteMetadataConfig::group_inline_cap_bytes`], dense middle band markers
/// are pushed onto a max-heap keyed by (size, inverse density) and popped one
/// by one until the total fits. Markers at or under the inline floor are never
/// demoted.
///
/// Cost is `O(N log N)` in the number of markers.
///
/// # Errors
///
/// Returns [`crate::ErrorKind::InvalidVector`] if any marker is malformed.
pub fn plan_group(stats: &[MarkerStats], config: &DeleteMetadataConfig) -> Result<GroupPlacement> {
    for (index, marker) in stats.iter().enumerate() {
        marker
            .validate()
            .map_err(|err| err.with_context("marker_index", index.to_string()))?;
    }

    let mut placements: Vec<Placement> = stats
        .iter()
        .map(|marker| decide_validated(marker, config))
        .collect();

    let mut inline_bytes = stats
        .iter()
        .zip(&placements)
        .filter(|(_, placement)| placement.is_inline())
        .fold(0u64, |acc, (marker, _)| acc.saturating_add(marker.size_bytes()));

    let cap = config.group_inline_cap_bytes();
    let mut heap = DemotionHeap::default();
    if inline_bytes > cap {
        heap = DemotionHeap::with_capacity(stats.len());
        for (index, (marker, placement)) in stats.iter().zip(&placements).enumerate() {
            if placement.is_demotable() {
                heap.push(index, marker.size_bytes(), marker.density());
            }
        }
        for index in heap.demote_until(&mut inline_bytes, cap) {
            placements[index] = Placement::external(PlacementReason::DemotedByGroupCap);
        }
    }

    let total_bytes = stats
        .iter()
        .fold(0u64, |acc, marker| acc.saturating_add(marker.size_bytes()));
    let over_cap = inline_bytes > cap;
    let demotion = heap.stats();

    if over_cap {
        warn!(
            inline_bytes,
            cap, "Inline floor markers alone exceed the manifest group cap"
        );
    }
    debug!(
        markers = stats.len(),
        inline_bytes,
        demoted = demotion.demoted,
        heap_operations = demotion.heap_operations(),
        config_version = config.version(),
        "Planned manifest group placement"
    );

    Ok(GroupPlacement {
        placements,
        inline_bytes,
        external_bytes: total_bytes - inline_bytes,
        over_cap,
        demotion,
    })
}

/// Plans independent manifest groups concurrently.
///
/// Each group is planned on the blocking pool; results come back in input
/// order. Groups share nothing but the configuration.
pub async fn plan_groups(
    groups: Vec<Vec<MarkerStats>>,
    config: Arc<DeleteMetadataConfig>,
    concurrency: usize,
) -> Result<Vec<GroupPlacement>> {
    futures::stream::iter(groups.into_iter().map(|group| {
        let config = config.clone();
        tokio::task::spawn_blocking(move || plan_group(&group, &config))
    }))
    .buffered(concurrency.max(1))
    .map(|joined| joined.map_err(Error::from).and_then(|planned| planned))
    .try_collect()
    .await
}

/// Places all markers of `entries` as one manifest group.
///
/// Returns new entries carrying the placements; the inputs are untouched.
pub fn place_entries(
    entries: &[Arc<CatalogEntry>],
    config: &DeleteMetadataConfig,
) -> Result<Vec<Arc<CatalogEntry>>> {
    let stats: Vec<MarkerStats> = entries
        .iter()
        .flat_map(|entry| entry.deletes().iter().map(|delete| *delete.marker().stats()))
        .collect();

    let group = plan_group(&stats, config)?;

    let mut offset = 0;
    entries
        .iter()
        .map(|entry| {
            let count = entry.deletes().len();
            let placed = entry.with_placements(&group.placements[offset..offset + count])?;
            offset += count;
            Ok(Arc::new(placed))
        })
        .collect()
}
