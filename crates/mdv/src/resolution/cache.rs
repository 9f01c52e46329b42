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
use std::sync::atomic::{AtomicU64, Ordering};

use moka::policy::EvictionPolicy;
use tracing::debug;

use super::{DeletePredicate, ResolutionBudget, resolve};
use crate::spec::{DataFile, DeleteMarker};
use crate::{Error, ErrorKind, Result};

/// Default resolver cache size: 256 MiB of resolved predicates.
pub const DEFAULT_RESOLVER_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

/// Hit/miss/load counters of a [`DeleteResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverMetrics {
    /// Calls answered from a resolved predicate.
    pub hits: u64,
    /// Calls that had to wait for a resolution.
    pub misses: u64,
    /// Resolutions actually computed.
    pub loads: u64,
}

impl ResolverMetrics {
    /// Returns the hit rate as a ratio (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct ResolverMetricsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
}

impl ResolverMetricsInner {
    fn snapshot(&self) -> ResolverMetrics {
        ResolverMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
struct ResolutionKey {
    data_file_id: String,
    snapshot_id: i64,
}

/// Memoizes resolved predicates per (data file, snapshot).
///
/// Concurrent callers asking for the same key share one in-flight resolution.
/// Failed resolutions are not cached; the next caller retries. Entries of a
/// snapshot are dropped with [`DeleteResolver::invalidate_snapshot`] once the
/// snapshot is no longer read.
#[derive(Clone, Debug)]
pub struct DeleteResolver {
    cache: moka::future::Cache<ResolutionKey, Arc<DeletePredicate>>,
    metrics: Arc<ResolverMetricsInner>,
}

impl Default for DeleteResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVER_CAPACITY_BYTES)
    }
}

impl DeleteResolver {
    /// Creates a resolver holding at most `capacity_bytes` of predicates.
    pub fn new(capacity_bytes: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .eviction_policy(EvictionPolicy::lru())
            .weigher(|_, predicate: &Arc<DeletePredicate>| {
                u32::try_from(predicate.memory_bytes()).unwrap_or(u32::MAX)
            })
            .max_capacity(capacity_bytes)
            .support_invalidation_closures()
            .build();

        Self {
            cache,
            metrics: Arc::new(ResolverMetricsInner::default()),
        }
    }

    /// Resolves `markers` against `file` as of `snapshot_id`.
    ///
    /// The markers applicable to a file are fixed for a given snapshot, so the
    /// result is reused for later calls with the same file and snapshot.
    pub async fn resolve<M>(
        &self,
        snapshot_id: i64,
        file: &DataFile,
        markers: &[M],
        budget: &ResolutionBudget,
    ) -> Result<Arc<DeletePredicate>>
    where
        M: AsRef<DeleteMarker> + Sync,
    {
        let key = ResolutionKey {
            data_file_id: file.id().to_string(),
            snapshot_id,
        };

        let entry = self
            .cache
            .entry_by_ref(&key)
            .or_try_insert_with(async {
                let predicate = resolve(file, markers, budget)?;
                self.metrics.record_load();
                debug!(
                    data_file = file.id(),
                    snapshot_id,
                    strategy = predicate.strategy().name(),
                    deleted = predicate.deleted_count(),
                    memory_bytes = predicate.memory_bytes(),
                    "resolved delete markers"
                );
                Ok::<_, Error>(Arc::new(predicate))
            })
            .await
            .map_err(|err: Arc<Error>| {
                Error::new(err.kind(), err.message().to_string())
                    .with_context("data_file", file.id())
                    .with_context("snapshot_id", snapshot_id.to_string())
                    .with_source(err)
            })?;

        if entry.is_fresh() {
            self.metrics.record_miss();
        } else {
            self.metrics.record_hit();
        }

        Ok(entry.into_value())
    }

    /// Drops every predicate resolved for `snapshot_id`.
    pub async fn invalidate_snapshot(&self, snapshot_id: i64) -> Result<()> {
        self.cache
            .invalidate_entries_if(move |key, _| key.snapshot_id == snapshot_id)
            .map_err(|err| {
                Error::new(
                    ErrorKind::Unexpected,
                    "Failed to invalidate resolved delete predicates",
                )
                .with_context("snapshot_id", snapshot_id.to_string())
                .with_source(err)
            })?;
        self.cache.run_pending_tasks().await;
        debug!(snapshot_id, "invalidated resolved delete predicates");
        Ok(())
    }

    /// Drops every resolved predicate.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Returns a snapshot of the hit/miss/load counters.
    pub fn metrics(&self) -> ResolverMetrics {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Barrier;

    use super::*;

    fn markers(rows: u64) -> Vec<Arc<DeleteMarker>> {
        vec![
            Arc::new(DeleteMarker::from_vector(
                "f",
                1,
                rows,
                (0..rows).step_by(2).collect(),
            )),
            Arc::new(DeleteMarker::from_vector(
                "f",
                2,
                rows,
                (0..rows).step_by(5).collect(),
            )),
        ]
    }

    #[tokio::test]
    async fn test_resolve_hits_after_first_load() {
        let resolver = DeleteResolver::default();
        let file = DataFile::new("f", 100);
        let markers = markers(100);
        let budget = ResolutionBudget::unlimited();

        let first = resolver.resolve(7, &file, &markers, &budget).await.unwrap();
        let second = resolver.resolve(7, &file, &markers, &budget).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            resolver.metrics(),
            ResolverMetrics {
                hits: 1,
                misses: 1,
                loads: 1,
            }
        );
        assert_eq!(resolver.metrics().hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_snapshots_are_resolved_separately() {
        let resolver = DeleteResolver::default();
        let file = DataFile::new("f", 100);
        let markers = markers(100);
        let budget = ResolutionBudget::unlimited();

        resolver.resolve(1, &file, &markers, &budget).await.unwrap();
        resolver.resolve(2, &file, &markers[..1], &budget).await.unwrap();
        assert_eq!(resolver.metrics().loads, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_resolution() {
        let resolver = DeleteResolver::default();
        let file = Arc::new(DataFile::new("f", 200_000));
        let markers = Arc::new(markers(200_000));
        let barrier = Arc::new(Barrier::new(8));

        let mut handles = vec![];
        for _ in 0..8 {
            let resolver = resolver.clone();
            let file = file.clone();
            let markers = markers.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                resolver
                    .resolve(42, &file, markers.as_slice(), &ResolutionBudget::unlimited())
                    .await
            }));
        }

        let predicates: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let metrics = resolver.metrics();
        assert_eq!(metrics.loads, 1);
        assert_eq!(metrics.hits + metrics.misses, 8);
        assert!(predicates.iter().all(|p| Arc::ptr_eq(p, &predicates[0])));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let resolver = DeleteResolver::default();
        let file = DataFile::new("f", 100);
        let markers = markers(100);

        let err = resolver
            .resolve(
                3,
                &file,
                &markers,
                &ResolutionBudget::unlimited().with_max_work(10),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionTimeout);
        assert!(err.to_string().contains("snapshot_id: 3"));

        resolver
            .resolve(3, &file, &markers, &ResolutionBudget::unlimited())
            .await
            .unwrap();
        assert_eq!(resolver.metrics().loads, 1);
    }

    #[tokio::test]
    async fn test_invalidate_snapshot() {
        let resolver = DeleteResolver::default();
        let file = DataFile::new("f", 100);
        let markers = markers(100);
        let budget = ResolutionBudget::unlimited();

        resolver.resolve(1, &file, &markers, &budget).await.unwrap();
        resolver.resolve(2, &file, &markers, &budget).await.unwrap();
        assert_eq!(resolver.metrics().loads, 2);

        resolver.invalidate_snapshot(1).await.unwrap();

        resolver.resolve(2, &file, &markers, &budget).await.unwrap();
        assert_eq!(resolver.metrics().loads, 2);
        resolver.resolve(1, &file, &markers, &budget).await.unwrap();
        assert_eq!(resolver.metrics().loads, 3);

        resolver.invalidate_all().await;
        resolver.resolve(2, &file, &markers, &budget).await.unwrap();
        assert_eq!(resolver.metrics().loads, 4);
    }
}
