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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use super::{MetadataTree, TreeShape, append_entries, build_tree, replace_entries};
use crate::Result;
use crate::config::DeleteMetadataConfig;
use crate::spec::CatalogEntry;

/// Rebuild state of a [`TreeManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// The published tree is current and no rebuild is running.
    Stable,
    /// A rebuild is running; readers keep seeing the previous version.
    Rebuilding,
}

enum CommitPlan {
    Publish(MetadataTree),
    Rebuild(Vec<Arc<CatalogEntry>>),
}

/// Publishes successive versions of a metadata tree.
///
/// Writers are serialized. Readers take an `Arc` of the current version and
/// are never blocked by a rebuild. A rebuild that fails leaves the previous
/// version (and configuration) in place.
#[derive(Debug)]
pub struct TreeManager {
    config: RwLock<Arc<DeleteMetadataConfig>>,
    current: RwLock<Arc<MetadataTree>>,
    rebuilding: AtomicBool,
    writer: Mutex<()>,
}

impl TreeManager {
    /// Creates a manager publishing an empty tree.
    pub fn new(config: Arc<DeleteMetadataConfig>) -> Self {
        Self {
            config: RwLock::new(config),
            current: RwLock::new(Arc::new(MetadataTree::empty(0))),
            rebuilding: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    /// Creates a manager whose first version holds `entries`.
    pub fn with_entries(
        config: Arc<DeleteMetadataConfig>,
        entries: Vec<Arc<CatalogEntry>>,
    ) -> Result<Self> {
        let manager = Self::new(config);
        manager.compact(entries)?;
        Ok(manager)
    }

    /// Currently published tree.
    pub fn current(&self) -> Arc<MetadataTree> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn config(&self) -> Arc<DeleteMetadataConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> TreeState {
        if self.rebuilding.load(Ordering::Acquire) {
            TreeState::Rebuilding
        } else {
            TreeState::Stable
        }
    }

    /// Commits `entries` to the catalog, keyed by data file.
    ///
    /// An entry whose data file is already in the tree replaces the existing
    /// entry; only the leaves holding replaced entries and the paths above
    /// them are copied. Remaining entries are appended along the right edge,
    /// unless the new entry count calls for a different depth or the current
    /// depth has no room left, in which case the tree is rebuilt.
    pub fn commit(&self, entries: Vec<Arc<CatalogEntry>>) -> Result<Arc<MetadataTree>> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let config = self.config();
        let current = self.current();
        let version = current.version() + 1;

        let planned = TreeShape::from_config(&config).and_then(|shape| {
            let (replaced, added) = replace_entries(&current, &entries, version)?;
            let base = replaced.unwrap_or_else(|| current.with_version(version));
            if added.is_empty() {
                return Ok(CommitPlan::Publish(base));
            }

            let total = base.entry_count() as usize + added.len();
            if !shape.needs_rebalance(base.depth(), total)
                && let Some(tree) = append_entries(&base, &added, &shape, version)?
            {
                return Ok(CommitPlan::Publish(tree));
            }

            let mut all = base.entries();
            all.extend(added);
            Ok(CommitPlan::Rebuild(all))
        });

        match planned {
            Ok(CommitPlan::Publish(tree)) => {
                debug!(
                    version,
                    depth = tree.depth(),
                    committed = entries.len(),
                    entries = tree.entry_count(),
                    "committed entries to metadata tree"
                );
                Ok(self.publish(tree))
            }
            Ok(CommitPlan::Rebuild(all)) => self.rebuild_locked(&config, all, version),
            Err(err) => {
                warn!(
                    error = %err,
                    version = current.version(),
                    "metadata tree commit failed, keeping previous version"
                );
                Err(err)
            }
        }
    }

    /// Replaces the catalog with `entries`, as after compaction.
    pub fn compact(&self, entries: Vec<Arc<CatalogEntry>>) -> Result<Arc<MetadataTree>> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let version = self.current().version() + 1;
        self.rebuild_locked(&self.config(), entries, version)
    }

    /// Rebuilds the current entries from scratch.
    pub fn rebuild(&self) -> Result<Arc<MetadataTree>> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current();
        self.rebuild_locked(&self.config(), current.entries(), current.version() + 1)
    }

    /// Switches to `config` and rebuilds under it.
    ///
    /// If the rebuild fails the previous configuration stays in effect.
    pub fn reconfigure(&self, config: Arc<DeleteMetadataConfig>) -> Result<Arc<MetadataTree>> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current();
        let tree = self.rebuild_locked(&config, current.entries(), current.version() + 1)?;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(tree)
    }

    fn rebuild_locked(
        &self,
        config: &DeleteMetadataConfig,
        entries: Vec<Arc<CatalogEntry>>,
        version: u64,
    ) -> Result<Arc<MetadataTree>> {
        self.rebuilding.store(true, Ordering::Release);
        let built = TreeShape::from_config(config)
            .and_then(|shape| build_tree(entries, &shape, version));
        self.rebuilding.store(false, Ordering::Release);

        match built {
            Ok(tree) => {
                info!(
                    version,
                    depth = tree.depth(),
                    flat = tree.is_flat(),
                    entries = tree.entry_count(),
                    config_version = config.version(),
                    "rebuilt metadata tree"
                );
                Ok(self.publish(tree))
            }
            Err(err) => {
                warn!(
                    error = %err,
                    version = version - 1,
                    "metadata tree rebuild failed, keeping previous version"
                );
                Err(err)
            }
        }
    }

    fn publish(&self, tree: MetadataTree) -> Arc<MetadataTree> {
        let tree = Arc::new(tree);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = tree.clone();
        tree
    }
}
