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

//! Versioned, immutable thresholds for delete placement and tree layout.
//!
//! A [`DeleteMetadataConfig`] is validated once, when it is built or loaded
//! from properties, and then passed explicitly into every placement,
//! resolution and tree call. There is no process-wide configuration.
//!
//! # Properties
//!
//! | Property | Default | Description |
//! |----------|---------|-------------|
//! | `write.delete.inline.small-bytes` | `4096` | Markers at or below this size are always inline |
//! | `write.delete.inline.hard-external-bytes` | `16777216` (16MB) | Markers above this size are always external |
//! | `write.delete.inline.density-cutoff` | `0.1` | Middle band markers at or above this density stay inline |
//! | `write.delete.inline.group-cap-bytes` | `16777216` (16MB) | Maximum inline payload per manifest group |
//! | `metadata.tree.fanout` | `100` | Children per internal node |
//! | `metadata.tree.leaf-capacity` | `10000` | Entries per leaf |
//! | `metadata.tree.large-scale-threshold` | `100000` | Entry count below which the tree stays flat |
//! | `metadata.tree.rebalance-band` | `0.1` | Hysteresis band around rebuild thresholds |
//! | `metadata.config.version` | `1` | Version stamped on everything built from this config |
//!
//! The hard external limit stands in for the host runtime's large-object
//! allocation threshold. Published measurements put that boundary anywhere
//! between 8MB and 16MB depending on the collector's region size, so it is a
//! tunable rather than a constant.
//!
//! # Example
//!
//! ```rust
//! use iceberg_mdv::DeleteMetadataConfig;
//!
//! let config = DeleteMetadataConfig::builder()
//!     .small_inline_bytes(8 * 1024)
//!     .hard_external_bytes(10 * 1024 * 1024)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.small_inline_bytes(), 8 * 1024);
//!
//! // Inverted thresholds are rejected when the config is built.
//! assert!(
//!     DeleteMetadataConfig::builder()
//!         .small_inline_bytes(1024)
//!         .hard_external_bytes(512)
//!         .build()
//!         .is_err()
//! );
//! ```

use std::collections::HashMap;

use crate::{Error, ErrorKind, Result};

// ============================================================================
// Property Names
// ============================================================================

/// Property for the inline byte floor.
pub const PROPERTY_SMALL_INLINE_BYTES: &str = "write.delete.inline.small-bytes";
/// Property for the mandatory spill threshold.
pub const PROPERTY_HARD_EXTERNAL_BYTES: &str = "write.delete.inline.hard-external-bytes";
/// Property for the middle band density cutoff.
pub const PROPERTY_DENSITY_CUTOFF: &str = "write.delete.inline.density-cutoff";
/// Property for the per manifest group inline cap.
pub const PROPERTY_GROUP_INLINE_CAP_BYTES: &str = "write.delete.inline.group-cap-bytes";
/// Property for the tree fanout.
pub const PROPERTY_TREE_FANOUT: &str = "metadata.tree.fanout";
/// Property for the number of entries per leaf.
pub const PROPERTY_TREE_LEAF_CAPACITY: &str = "metadata.tree.leaf-capacity";
/// Property for the entry count at which trees may grow deeper than one level.
pub const PROPERTY_TREE_LARGE_SCALE_THRESHOLD: &str = "metadata.tree.large-scale-threshold";
/// Property for the rebuild hysteresis band.
pub const PROPERTY_TREE_REBALANCE_BAND: &str = "metadata.tree.rebalance-band";
/// Property for the configuration version.
pub const PROPERTY_CONFIG_VERSION: &str = "metadata.config.version";

// ============================================================================
// Default Values
// ============================================================================

/// Default inline byte floor: 4KB.
pub const DEFAULT_SMALL_INLINE_BYTES: u64 = 4 * 1024;
/// Default mandatory spill threshold: 16MB.
pub const DEFAULT_HARD_EXTERNAL_BYTES: u64 = 16 * 1024 * 1024;
/// Default middle band density cutoff.
pub const DEFAULT_DENSITY_CUTOFF: f64 = 0.1;
/// Default inline cap per manifest group: 16MB.
pub const DEFAULT_GROUP_INLINE_CAP_BYTES: u64 = 16 * 1024 * 1024;
/// Default tree fanout.
pub const DEFAULT_TREE_FANOUT: usize = 100;
/// Default leaf capacity.
pub const DEFAULT_TREE_LEAF_CAPACITY: usize = 10_000;
/// Default large-scale threshold; flat trees are optimal below it.
pub const DEFAULT_TREE_LARGE_SCALE_THRESHOLD: usize = 100_000;
/// Default rebuild hysteresis band (10%).
pub const DEFAULT_TREE_REBALANCE_BAND: f64 = 0.1;

// Helper function to parse a property from a HashMap
// If the property is not found, use the default value
fn parse_property<T: std::str::FromStr>(
    properties: &HashMap<String, String>,
    key: &str,
    default: T,
) -> std::result::Result<T, anyhow::Error>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    properties.get(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}"))
    })
}

/// Thresholds shared by placement, resolution and tree building.
///
/// Fields are private; a config can only be obtained through
/// [`DeleteMetadataConfig::builder`], [`DeleteMetadataConfig::from_properties`]
/// or [`Default`], all of which hand out validated values.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMetadataConfig {
    version: u64,
    small_inline_bytes: u64,
    hard_external_bytes: u64,
    density_cutoff: f64,
    group_inline_cap_bytes: u64,
    tree_fanout: usize,
    leaf_capacity: usize,
    large_scale_threshold: usize,
    rebalance_band: f64,
}

impl Default for DeleteMetadataConfig {
    fn default() -> Self {
        Self {
            version: 1,
            small_inline_bytes: DEFAULT_SMALL_INLINE_BYTES,
            hard_external_bytes: DEFAULT_HARD_EXTERNAL_BYTES,
            density_cutoff: DEFAULT_DENSITY_CUTOFF,
            group_inline_cap_bytes: DEFAULT_GROUP_INLINE_CAP_BYTES,
            tree_fanout: DEFAULT_TREE_FANOUT,
            leaf_capacity: DEFAULT_TREE_LEAF_CAPACITY,
            large_scale_threshold: DEFAULT_TREE_LARGE_SCALE_THRESHOLD,
            rebalance_band: DEFAULT_TREE_REBALANCE_BAND,
        }
    }
}

impl DeleteMetadataConfig {
    /// Creates a new configuration builder seeded with the defaults.
    pub fn builder() -> DeleteMetadataConfigBuilder {
        DeleteMetadataConfigBuilder {
            config: Self::default(),
        }
    }

    /// Loads a configuration from a properties map.
    ///
    /// Unset properties fall back to defaults. Unlike the cache options of the
    /// table layer, unparsable values are an error here: silently falling back
    /// would change which rows are inline without anyone noticing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Config`] if a value cannot be parsed or the
    /// resulting thresholds are inconsistent.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let parsed = (|| -> std::result::Result<Self, anyhow::Error> {
            Ok(Self {
                version: parse_property(props, PROPERTY_CONFIG_VERSION, defaults.version)?,
                small_inline_bytes: parse_property(
                    props,
                    PROPERTY_SMALL_INLINE_BYTES,
                    defaults.small_inline_bytes,
                )?,
                hard_external_bytes: parse_property(
                    props,
                    PROPERTY_HARD_EXTERNAL_BYTES,
                    defaults.hard_external_bytes,
                )?,
                density_cutoff: parse_property(
                    props,
                    PROPERTY_DENSITY_CUTOFF,
                    defaults.density_cutoff,
                )?,
                group_inline_cap_bytes: parse_property(
                    props,
                    PROPERTY_GROUP_INLINE_CAP_BYTES,
                    defaults.group_inline_cap_bytes,
                )?,
                tree_fanout: parse_property(props, PROPERTY_TREE_FANOUT, defaults.tree_fanout)?,
                leaf_capacity: parse_property(
                    props,
                    PROPERTY_TREE_LEAF_CAPACITY,
                    defaults.leaf_capacity,
                )?,
                large_scale_threshold: parse_property(
                    props,
                    PROPERTY_TREE_LARGE_SCALE_THRESHOLD,
                    defaults.large_scale_threshold,
                )?,
                rebalance_band: parse_property(
                    props,
                    PROPERTY_TREE_REBALANCE_BAND,
                    defaults.rebalance_band,
                )?,
            })
        })()
        .map_err(|err| {
            Error::new(ErrorKind::Config, "Failed to parse delete metadata properties")
                .with_source(err)
        })?;

        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.small_inline_bytes > self.hard_external_bytes {
            return Err(Error::new(
                ErrorKind::Config,
                "small inline threshold must not exceed the hard external threshold",
            )
            .with_context("small_inline_bytes", self.small_inline_bytes.to_string())
            .with_context("hard_external_bytes", self.hard_external_bytes.to_string()));
        }

        if !(0.0..=1.0).contains(&self.density_cutoff) {
            return Err(Error::new(
                ErrorKind::Config,
                format!(
                    "density cutoff must be within [0, 1], got {}",
                    self.density_cutoff
                ),
            ));
        }

        if !(0.0..1.0).contains(&self.rebalance_band) {
            return Err(Error::new(
                ErrorKind::Config,
                format!(
                    "rebalance band must be within [0, 1), got {}",
                    self.rebalance_band
                ),
            ));
        }

        Ok(())
    }

    /// Version of this configuration.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Markers at or below this size are always placed inline.
    pub fn small_inline_bytes(&self) -> u64 {
        self.small_inline_bytes
    }

    /// Markers above this size are always placed externally.
    pub fn hard_external_bytes(&self) -> u64 {
        self.hard_external_bytes
    }

    /// Density at or above which a middle band marker stays inline.
    pub fn density_cutoff(&self) -> f64 {
        self.density_cutoff
    }

    /// Maximum total inline payload of one manifest group.
    pub fn group_inline_cap_bytes(&self) -> u64 {
        self.group_inline_cap_bytes
    }

    /// Number of children per internal tree node.
    ///
    /// Not validated at load time; the tree builder rejects unusable values
    /// with [`ErrorKind::TreeRebuild`] so that a bad layout never replaces a
    /// published tree.
    pub fn tree_fanout(&self) -> usize {
        self.tree_fanout
    }

    /// Number of catalog entries per leaf.
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Entry count below which the tree is kept flat.
    pub fn large_scale_threshold(&self) -> usize {
        self.large_scale_threshold
    }

    /// Fractional hysteresis band applied around rebuild thresholds.
    pub fn rebalance_band(&self) -> f64 {
        self.rebalance_band
    }
}

/// Builder for [`DeleteMetadataConfig`].
#[derive(Debug, Clone)]
pub struct DeleteMetadataConfigBuilder {
    config: DeleteMetadataConfig,
}

impl DeleteMetadataConfigBuilder {
    /// Sets the configuration version.
    pub fn version(mut self, version: u64) -> Self {
        self.config.version = version;
        self
    }

    /// Sets the inline byte floor.
    pub fn small_inline_bytes(mut self, bytes: u64) -> Self {
        self.config.small_inline_bytes = bytes;
        self
    }

    /// Sets the mandatory spill threshold.
    ///
    /// Use the host runtime's large-object threshold here.
    pub fn hard_external_bytes(mut self, bytes: u64) -> Self {
        self.config.hard_external_bytes = bytes;
        self
    }

    /// Sets the middle band density cutoff.
    pub fn density_cutoff(mut self, cutoff: f64) -> Self {
        self.config.density_cutoff = cutoff;
        self
    }

    /// Sets the inline cap per manifest group.
    pub fn group_inline_cap_bytes(mut self, bytes: u64) -> Self {
        self.config.group_inline_cap_bytes = bytes;
        self
    }

    /// Sets the tree fanout.
    pub fn tree_fanout(mut self, fanout: usize) -> Self {
        self.config.tree_fanout = fanout;
        self
    }

    /// Sets the number of entries per leaf.
    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.config.leaf_capacity = capacity;
        self
    }

    /// Sets the entry count below which trees stay flat.
    pub fn large_scale_threshold(mut self, entries: usize) -> Self {
        self.config.large_scale_threshold = entries;
        self
    }

    /// Sets the rebuild hysteresis band.
    pub fn rebalance_band(mut self, band: f64) -> Self {
        self.config.rebalance_band = band;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<DeleteMetadataConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
