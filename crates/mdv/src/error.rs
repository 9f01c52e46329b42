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

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Result that is a wrapper of `Result<T, iceberg_mdv::Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of Error of this crate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A delete marker is malformed: its cardinality exceeds the row count of
    /// the file it belongs to, or its serialized size is negative.
    InvalidVector,
    /// Configuration thresholds are inconsistent with each other.
    Config,
    /// A delete marker does not fit the data file it is resolved against.
    Resolution,
    /// Folding delete markers exceeded the caller supplied budget.
    ResolutionTimeout,
    /// A metadata tree rebuild violated one of its invariants.
    ///
    /// The previously published tree stays active.
    TreeRebuild,
    /// Failure that we don't expect, usually a broken internal invariant.
    Unexpected,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::InvalidVector => "InvalidVector",
            ErrorKind::Config => "Config",
            ErrorKind::Resolution => "Resolution",
            ErrorKind::ResolutionTimeout => "ResolutionTimeout",
            ErrorKind::TreeRebuild => "TreeRebuild",
            ErrorKind::Unexpected => "Unexpected",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error is the error struct returned by all functions of this crate.
///
/// ## Display
///
/// Error can be displayed in two ways:
///
/// - Via `Display`: like `err.to_string()` or `format!("{err}")`
///
/// Error will be printed in a single line:
///
/// ```shell
/// InvalidVector, context: { data_file: f-1 } => cardinality exceeds row count, source: ...
/// ```
///
/// - Via `Debug`: like `format!("{err:?}")`
///
/// Error will be printed in multi lines with more details and backtraces (if captured):
///
/// ```shell
/// InvalidVector => cardinality exceeds row count
///
/// Context:
///    data_file: f-1
///
/// Source:
///    ...
///
/// Backtrace:
///    ...
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<anyhow::Error>,
    backtrace: Backtrace,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:#}")?;
        }

        if self.backtrace.status() == BacktraceStatus::Captured {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{}", self.backtrace)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::default(),

            source: None,
            // `Backtrace::capture()` will check if backtrace has been enabled
            // internally. It's zero cost if backtrace is disabled.
            backtrace: Backtrace::capture(),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    /// Return error's backtrace.
    ///
    /// Note: the standard way of exposing backtrace is the unstable feature [`error_generic_member_access`](https://github.com/rust-lang/rust/issues/99301).
    /// We don't provide it as it requires nightly rust.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    #[inline]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::new(ErrorKind::Unexpected, "background task failed").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    fn generate_error_with_source() -> Error {
        Error::new(ErrorKind::InvalidVector, "cardinality exceeds row count")
        .with_context("data_file", "f-1")
        .with_context("cardinality", "12")
        .with_source(anyhow!("marker was built from a stale snapshot"))
    }

    #[test]
    fn test_error_display_with_context_and_source() {
        let s = format!("{}", generate_error_with_source());
        assert_eq!(
            s,
            "InvalidVector, context: { data_file: f-1, cardinality: 12 } => cardinality exceeds row count, source: marker was built from a stale snapshot"
        )
    }

    #[test]
    fn test_error_display_without_context() {
        let err = Error::new(ErrorKind::TreeRebuild, "fanout must be at least 2");
        assert_eq!(err.to_string(), "TreeRebuild => fanout must be at least 2");
        assert_eq!(err.kind(), ErrorKind::TreeRebuild);
        assert_eq!(err.message(), "fanout must be at least 2");
    }

    #[test]
    fn test_error_debug_lists_context() {
        let s = format!("{:?}", generate_error_with_source());
        assert!(s.starts_with("InvalidVector => cardinality exceeds row count\n"));
        assert!(s.contains("Context:\n   data_file: f-1\n   cardinality: 12\n"));
        assert!(s.contains("Source: marker was built from a stale snapshot"));
    }

    #[test]
    fn test_error_exposes_source() {
        let err = generate_error_with_source();
        assert!(std::error::Error::source(&err).is_some());
        let err = Error::new(ErrorKind::Config, "bad");
        assert!(std::error::Error::source(&err).is_none());
    }
}
