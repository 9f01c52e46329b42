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

//! Versioned metadata trees over catalog entries.
//!
//! A [`MetadataTree`] is an immutable snapshot: leaves hold up to
//! `leaf_capacity` entries, internal nodes hold up to `tree_fanout` children
//! and every node carries [`NodeStats`] aggregated bottom-up. Small catalogs
//! get a flat tree, a single root over all leaves. See [`TreeManager`] for
//! publishing new versions.

mod builder;
mod manager;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use builder::{TreeShape, append_entries, build_tree, replace_entries};
pub use manager::{TreeManager, TreeState};

use crate::spec::{CatalogEntry, ColumnRange};

/// Statistics of a subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Number of catalog entries below this node.
    pub entry_count: u64,
    /// Sum of data file record counts.
    pub record_count: u64,
    /// Upper bound of deleted rows.
    pub deleted_rows: u64,
    /// Delete payload stored inline with the entries.
    pub inline_delete_bytes: u64,
    /// Value range per field id, present only when every entry below
    /// reports a range for that field.
    pub column_ranges: BTreeMap<i32, ColumnRange>,
}

impl NodeStats {
    /// Statistics of a single entry.
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let data_file = entry.data_file();
        Self {
            entry_count: 1,
            record_count: data_file.record_count(),
            deleted_rows: entry.deleted_rows_upper_bound(),
            inline_delete_bytes: entry.inline_delete_bytes(),
            column_ranges: data_file.column_ranges().clone(),
        }
    }

    /// Folds `other` into `self`.
    ///
    /// The merge is associative and the empty statistics are its identity, so
    /// the result does not depend on how children are grouped.
    pub fn merge(&mut self, other: &NodeStats) {
        if other.entry_count == 0 {
            return;
        }
        if self.entry_count == 0 {
            *self = other.clone();
            return;
        }

        self.entry_count += other.entry_count;
        self.record_count += other.record_count;
        self.deleted_rows += other.deleted_rows;
        self.inline_delete_bytes += other.inline_delete_bytes;
        self.column_ranges.retain(|field_id, range| match other.column_ranges.get(field_id) {
            Some(other_range) => {
                *range = range.merge(other_range);
                true
            }
            None => false,
        });
    }

    /// Returns false only if no entry below can hold a value in
    /// `[lower, upper]` for `field_id`.
    pub fn may_overlap(&self, field_id: i32, lower: i64, upper: i64) -> bool {
        match self.column_ranges.get(&field_id) {
            Some(range) => range.overlaps(lower, upper),
            None => self.entry_count > 0,
        }
    }
}

impl<'a> FromIterator<&'a NodeStats> for NodeStats {
    fn from_iter<I: IntoIterator<Item = &'a NodeStats>>(iter: I) -> Self {
        let mut merged = NodeStats::default();
        for stats in iter {
            merged.merge(stats);
        }
        merged
    }
}

/// Children of a tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChildren {
    /// Leaf level.
    Entries(Vec<Arc<CatalogEntry>>),
    /// Internal level.
    Nodes(Vec<Arc<MetadataTreeNode>>),
}

/// A node of a metadata tree. Never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTreeNode {
    stats: NodeStats,
    children: NodeChildren,
}

impl MetadataTreeNode {
    pub(crate) fn leaf(entries: Vec<Arc<CatalogEntry>>) -> Self {
        let stats = entries
            .iter()
            .map(|entry| NodeStats::from_entry(entry))
            .fold(NodeStats::default(), |mut acc, stats| {
                acc.merge(&stats);
                acc
            });
        Self {
            stats,
            children: NodeChildren::Entries(entries),
        }
    }

    pub(crate) fn internal(children: Vec<Arc<MetadataTreeNode>>) -> Self {
        let stats = children.iter().map(|child| &child.stats).collect();
        Self {
            stats,
            children: NodeChildren::Nodes(children),
        }
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn children(&self) -> &NodeChildren {
        &self.children
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        match &self.children {
            NodeChildren::Entries(entries) => entries.len(),
            NodeChildren::Nodes(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_entries(&self, out: &mut Vec<Arc<CatalogEntry>>) {
        match &self.children {
            NodeChildren::Entries(entries) => out.extend(entries.iter().cloned()),
            NodeChildren::Nodes(nodes) => nodes.iter().for_each(|node| node.collect_entries(out)),
        }
    }
}

/// Entries selected by [`MetadataTree::prune`].
#[derive(Debug, Clone, Default)]
pub struct PruneResult {
    /// Entries whose range for the field may overlap the query range.
    pub entries: Vec<Arc<CatalogEntry>>,
    /// Number of tree nodes whose statistics were inspected.
    pub nodes_visited: usize,
}

/// An immutable, versioned metadata tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTree {
    version: u64,
    depth: usize,
    flat: bool,
    root: Arc<MetadataTreeNode>,
}

impl MetadataTree {
    pub(crate) fn new(version: u64, depth: usize, flat: bool, root: Arc<MetadataTreeNode>) -> Self {
        Self {
            version,
            depth,
            flat,
            root,
        }
    }

    /// This tree, published under `version`.
    pub(crate) fn with_version(&self, version: u64) -> Self {
        Self::new(version, self.depth, self.flat, self.root.clone())
    }

    /// An empty flat tree.
    pub fn empty(version: u64) -> Self {
        Self::new(version, 1, true, Arc::new(MetadataTreeNode::internal(vec![])))
    }

    /// Version number, bumped on every published change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of internal levels above the leaves.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true if the root holds every leaf directly.
    pub fn is_flat(&self) -> bool {
        self.flat
    }

    pub fn root(&self) -> &Arc<MetadataTreeNode> {
        &self.root
    }

    /// Aggregated statistics over the whole catalog.
    pub fn stats(&self) -> &NodeStats {
        &self.root.stats
    }

    pub fn entry_count(&self) -> u64 {
        self.root.stats.entry_count
    }

    /// All entries in order.
    pub fn entries(&self) -> Vec<Arc<CatalogEntry>> {
        let mut entries = Vec::with_capacity(self.entry_count() as usize);
        self.root.collect_entries(&mut entries);
        entries
    }

    /// Returns the entries whose values of `field_id` may fall in
    /// `[lower, upper]`, skipping subtrees whose statistics rule them out.
    pub fn prune(&self, field_id: i32, lower: i64, upper: i64) -> PruneResult {
        let mut result = PruneResult::default();
        let mut stack = vec![self.root.as_ref()];

        while let Some(node) = stack.pop() {
            result.nodes_visited += 1;
            if !node.stats.may_overlap(field_id, lower, upper) {
                continue;
            }
            match &node.children {
                NodeChildren::Entries(entries) => {
                    result.entries.extend(
                        entries
                            .iter()
                            .filter(|entry| match entry.data_file().column_range(field_id) {
                                Some(range) => range.overlaps(lower, upper),
                                None => true,
                            })
                            .cloned(),
                    );
                }
                // reversed so entries come out in tree order
                NodeChildren::Nodes(nodes) => stack.extend(nodes.iter().rev().map(|n| n.as_ref())),
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DataFile;

    fn entry(id: &str, rows: u64, lower: i64, upper: i64) -> Arc<CatalogEntry> {
        Arc::new(CatalogEntry::new(
            DataFile::new(id, rows).with_column_range(1, lower, upper),
        ))
    }

    #[test]
    fn test_stats_merge_is_associative() {
        let a = NodeStats::from_entry(&entry("a", 10, 0, 5));
        let b = NodeStats::from_entry(&entry("b", 20, 3, 9));
        let c = NodeStats::from_entry(&CatalogEntry::new(DataFile::new("c", 5)));

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left, right);
        assert_eq!(left.entry_count, 3);
        assert_eq!(left.record_count, 35);
        // "c" has no range for field 1, so the merged range is unknown
        assert!(left.column_ranges.is_empty());

        let mut ab = a.clone();
        ab.merge(&b);
        assert_eq!(ab.column_ranges.get(&1), Some(&ColumnRange::new(0, 9)));

        let mut identity = NodeStats::default();
        identity.merge(&a);
        assert_eq!(identity, a);
    }

    #[test]
    fn test_prune_skips_subtrees() {
        let left = Arc::new(MetadataTreeNode::leaf(vec![
            entry("a", 1, 0, 10),
            entry("b", 1, 5, 20),
        ]));
        let right = Arc::new(MetadataTreeNode::leaf(vec![
            entry("c", 1, 100, 110),
            entry("d", 1, 105, 200),
        ]));
        let root = Arc::new(MetadataTreeNode::internal(vec![left, right]));
        let tree = MetadataTree::new(1, 1, true, root);

        let result = tree.prune(1, 12, 15);
        let ids: Vec<_> = result.entries.iter().map(|e| e.data_file().id()).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(result.nodes_visited, 3);

        let result = tree.prune(1, 0, 1000);
        assert_eq!(result.entries.len(), 4);

        // unknown field cannot be pruned
        assert_eq!(tree.prune(7, 0, 0).entries.len(), 4);
        assert_eq!(tree.stats().entry_count, 4);
        assert_eq!(tree.entries().len(), 4);
    }

    #[test]
    fn test_empty_tree() {
        let tree = MetadataTree::empty(0);
        assert_eq!(tree.entry_count(), 0);
        assert!(tree.root().is_empty());
        assert!(tree.prune(1, 0, 1).entries.is_empty());
    }
}
