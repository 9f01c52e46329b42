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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{MetadataTree, MetadataTreeNode, NodeChildren, NodeStats};
use crate::config::DeleteMetadataConfig;
use crate::spec::CatalogEntry;
use crate::{Error, ErrorKind, Result};

/// Validated layout parameters of a metadata tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeShape {
    fanout: usize,
    leaf_capacity: usize,
    large_scale_threshold: usize,
    rebalance_band: f64,
}

impl TreeShape {
    /// Extracts the tree layout from `config`.
    ///
    /// Returns [`ErrorKind::TreeRebuild`] if fanout is below 2 or leaf
    /// capacity is 0.
    pub fn from_config(config: &DeleteMetadataConfig) -> Result<Self> {
        if config.tree_fanout() < 2 {
            return Err(Error::new(
                ErrorKind::TreeRebuild,
                format!("Tree fanout must be at least 2, got {}", config.tree_fanout()),
            ));
        }
        if config.leaf_capacity() == 0 {
            return Err(Error::new(ErrorKind::TreeRebuild, "Leaf capacity must be positive"));
        }

        Ok(Self {
            fanout: config.tree_fanout(),
            leaf_capacity: config.leaf_capacity(),
            large_scale_threshold: config.large_scale_threshold(),
            rebalance_band: config.rebalance_band(),
        })
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Returns true if a catalog of `entry_count` entries gets a flat tree.
    pub fn is_flat(&self, entry_count: usize) -> bool {
        entry_count < self.large_scale_threshold
    }

    /// Internal levels needed above the leaves for `entry_count` entries.
    ///
    /// This is the smallest `d >= 1` with `fanout^d >= ceil(entries / leaf_capacity)`,
    /// or 1 for flat trees.
    pub fn required_depth(&self, entry_count: usize) -> usize {
        if self.is_flat(entry_count) {
            return 1;
        }

        let leaves = entry_count.div_ceil(self.leaf_capacity);
        let mut depth = 1;
        let mut reach = self.fanout;
        while reach < leaves {
            reach = reach.saturating_mul(self.fanout);
            depth += 1;
        }
        depth
    }

    /// Returns true if a tree of `current_depth` holding `entry_count`
    /// entries should be rebuilt.
    ///
    /// The depth required at both edges of the hysteresis band around
    /// `entry_count` must differ from the current depth, so a catalog
    /// hovering around a boundary does not flip between depths.
    pub fn needs_rebalance(&self, current_depth: usize, entry_count: usize) -> bool {
        let count = entry_count as f64;
        let low = (count * (1.0 - self.rebalance_band)).floor() as usize;
        let high = (count * (1.0 + self.rebalance_band)).ceil() as usize;
        self.required_depth(low) != current_depth && self.required_depth(high) != current_depth
    }
}

fn check_entry(entry: &CatalogEntry) -> Result<()> {
    let data_file = entry.data_file();
    for (field_id, range) in data_file.column_ranges() {
        if !range.is_valid() {
            return Err(Error::new(
                ErrorKind::TreeRebuild,
                format!(
                    "Column range lower bound {} exceeds upper bound {}",
                    range.lower, range.upper
                ),
            )
            .with_context("data_file", data_file.id())
            .with_context("field_id", field_id.to_string()));
        }
    }
    Ok(())
}

/// Builds a new tree over `entries` from scratch.
pub fn build_tree(
    entries: Vec<Arc<CatalogEntry>>,
    shape: &TreeShape,
    version: u64,
) -> Result<MetadataTree> {
    entries.iter().try_for_each(|entry| check_entry(entry))?;

    let flat = shape.is_flat(entries.len());
    let depth = shape.required_depth(entries.len());

    let mut level: Vec<Arc<MetadataTreeNode>> = entries
        .chunks(shape.leaf_capacity)
        .map(|chunk| Arc::new(MetadataTreeNode::leaf(chunk.to_vec())))
        .collect();

    for _ in 1..depth {
        level = level
            .chunks(shape.fanout)
            .map(|chunk| Arc::new(MetadataTreeNode::internal(chunk.to_vec())))
            .collect();
    }

    let root = Arc::new(MetadataTreeNode::internal(level));
    Ok(MetadataTree::new(version, depth, flat, root))
}

/// Appends `entries` to the right edge of `tree`, sharing every untouched
/// subtree with it.
///
/// Returns `Ok(None)` if the entries do not fit at the current depth.
pub fn append_entries(
    tree: &MetadataTree,
    entries: &[Arc<CatalogEntry>],
    shape: &TreeShape,
    version: u64,
) -> Result<Option<MetadataTree>> {
    entries.iter().try_for_each(|entry| check_entry(entry))?;

    let mut pending = entries;
    let appender = SpineAppender {
        shape,
        unbounded_root: tree.is_flat() || tree.depth() == 1,
    };
    let root = appender.append(tree.root(), tree.depth(), true, &mut pending);
    if !pending.is_empty() {
        return Ok(None);
    }

    let entry_count = root.stats.entry_count as usize;
    Ok(Some(MetadataTree::new(
        version,
        tree.depth(),
        tree.is_flat() && shape.is_flat(entry_count),
        Arc::new(root),
    )))
}

/// Replaces the entries of `tree` whose data file matches one of `entries`,
/// copying only the leaves that hold them and the paths above those leaves.
///
/// When several of `entries` share a data file, the last one wins. Returns
/// the new tree, or `None` if nothing in `tree` matched, together with the
/// entries whose data file is not in `tree`, in input order.
pub fn replace_entries(
    tree: &MetadataTree,
    entries: &[Arc<CatalogEntry>],
    version: u64,
) -> Result<(Option<MetadataTree>, Vec<Arc<CatalogEntry>>)> {
    entries.iter().try_for_each(|entry| check_entry(entry))?;

    let mut latest: HashMap<&str, &Arc<CatalogEntry>> = HashMap::with_capacity(entries.len());
    for entry in entries {
        latest.insert(entry.data_file().id(), entry);
    }

    let mut replaced = HashSet::new();
    let root = if latest.is_empty() {
        None
    } else {
        replace_in(tree.root(), &latest, &mut replaced)
    };

    let mut emitted = HashSet::new();
    let unmatched = entries
        .iter()
        .map(|entry| entry.data_file().id())
        .filter(|id| !replaced.contains(id) && emitted.insert(*id))
        .filter_map(|id| latest.get(id).map(|entry| Arc::clone(entry)))
        .collect();

    let tree = root.map(|root| {
        MetadataTree::new(version, tree.depth(), tree.is_flat(), Arc::new(root))
    });
    Ok((tree, unmatched))
}

/// Copy of `node` with matching entries swapped, or `None` if nothing below
/// `node` matched.
fn replace_in<'a>(
    node: &MetadataTreeNode,
    latest: &HashMap<&'a str, &'a Arc<CatalogEntry>>,
    replaced: &mut HashSet<&'a str>,
) -> Option<MetadataTreeNode> {
    match &node.children {
        NodeChildren::Entries(entries) => {
            let mut copied: Option<Vec<Arc<CatalogEntry>>> = None;
            for (index, entry) in entries.iter().enumerate() {
                if let Some(&update) = latest.get(entry.data_file().id()) {
                    replaced.insert(update.data_file().id());
                    copied.get_or_insert_with(|| entries.clone())[index] = update.clone();
                }
            }
            copied.map(MetadataTreeNode::leaf)
        }
        NodeChildren::Nodes(children) => {
            let mut copied: Option<Vec<Arc<MetadataTreeNode>>> = None;
            for (index, child) in children.iter().enumerate() {
                if let Some(child) = replace_in(child, latest, replaced) {
                    copied.get_or_insert_with(|| children.clone())[index] = Arc::new(child);
                }
            }
            copied.map(MetadataTreeNode::internal)
        }
    }
}

struct SpineAppender<'a> {
    shape: &'a TreeShape,
    unbounded_root: bool,
}

impl SpineAppender<'_> {
    /// Copies `node` with as many `pending` entries appended as it can take.
    fn append(
        &self,
        node: &MetadataTreeNode,
        level: usize,
        is_root: bool,
        pending: &mut &[Arc<CatalogEntry>],
    ) -> MetadataTreeNode {
        match &node.children {
            NodeChildren::Entries(entries) => {
                let room = self.shape.leaf_capacity.saturating_sub(entries.len());
                let (taken, rest) = pending.split_at(room.min(pending.len()));
                *pending = rest;

                let mut stats = node.stats.clone();
                taken
                    .iter()
                    .for_each(|entry| stats.merge(&NodeStats::from_entry(entry)));
                let mut entries = entries.clone();
                entries.extend_from_slice(taken);
                MetadataTreeNode {
                    stats,
                    children: NodeChildren::Entries(entries),
                }
            }
            NodeChildren::Nodes(children) => {
                let mut children = children.clone();
                if let Some(last) = children.last_mut() {
                    *last = Arc::new(self.append(last, level - 1, false, pending));
                }

                let limit = if is_root && self.unbounded_root {
                    usize::MAX
                } else {
                    self.shape.fanout
                };
                while !pending.is_empty() && children.len() < limit {
                    children.push(Arc::new(self.fill(level - 1, pending)));
                }
                MetadataTreeNode::internal(children)
            }
        }
    }

    /// Builds a fresh subtree of `level` internal levels from `pending`.
    fn fill(&self, level: usize, pending: &mut &[Arc<CatalogEntry>]) -> MetadataTreeNode {
        if level == 0 {
            let (taken, rest) = pending.split_at(self.shape.leaf_capacity.min(pending.len()));
            *pending = rest;
            return MetadataTreeNode::leaf(taken.to_vec());
        }

        let mut children = Vec::new();
        while !pending.is_empty() && children.len() < self.shape.fanout {
            children.push(Arc::new(self.fill(level - 1, pending)));
        }
        MetadataTreeNode::internal(children)
    }
}
