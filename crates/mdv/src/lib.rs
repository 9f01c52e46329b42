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

//! Row-level delete bookkeeping for Iceberg table metadata.
//!
//! This crate decides where delete vectors live, turns them into row
//! membership predicates and lays out catalog entries in a metadata tree.
//!
//! - [`placement`] decides per delete marker whether it is stored inline with
//!   its catalog entry or externalized, and enforces the inline cap of a
//!   manifest group.
//! - [`resolution`] resolves the markers of a data file into a
//!   [`DeletePredicate`](resolution::DeletePredicate), memoized per snapshot by
//!   [`DeleteResolver`](resolution::DeleteResolver).
//! - [`tree`] builds and publishes versioned [`MetadataTree`](tree::MetadataTree)s.
//!
//! Every entry point takes a [`DeleteMetadataConfig`] explicitly.
//!
//! ```
//! use iceberg_mdv::placement::{PlacementDecision, decide};
//! use iceberg_mdv::spec::MarkerStats;
//! use iceberg_mdv::DeleteMetadataConfig;
//!
//! let config = DeleteMetadataConfig::default();
//! let placement = decide(&MarkerStats::new(512, 40, 1000), &config).unwrap();
//! assert_eq!(placement.decision, PlacementDecision::Inline);
//! ```

mod error;
pub use error::{Error, ErrorKind, Result};

pub mod config;
pub use config::DeleteMetadataConfig;

pub mod delete_vector;
pub mod placement;
pub mod resolution;
pub mod spec;
pub mod tree;
