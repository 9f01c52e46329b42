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

use std::time::Instant;

use super::{ResolutionBudget, check_marker_bounds};
use crate::delete_vector::DeleteVector;
use crate::spec::{DataFile, DeleteMarker};
use crate::{Error, ErrorKind, Result};

/// Positions processed between two deadline checks while materializing a
/// resolved set.
pub(super) const DEADLINE_CHECK_INTERVAL: u64 = 1 << 16;

/// Tracks resolution work against a [`ResolutionBudget`].
///
/// Work is charged before each merge. The deadline is checked after every
/// merge and at least every [`DEADLINE_CHECK_INTERVAL`] positions while a
/// predicate is being materialized.
pub(super) struct BudgetTracker<'a> {
    budget: &'a ResolutionBudget,
    started: Instant,
    work: u64,
}

impl<'a> BudgetTracker<'a> {
    pub(super) fn start(budget: &'a ResolutionBudget) -> Self {
        Self {
            budget,
            started: Instant::now(),
            work: 0,
        }
    }

    fn charge(&mut self, file: &DataFile, positions: u64) -> Result<()> {
        self.work = self.work.saturating_add(positions);

        if let Some(max_work) = self.budget.max_work()
            && self.work > max_work
        {
            return Err(Error::new(
                ErrorKind::ResolutionTimeout,
                format!(
                    "Folding merged {} positions, budget allows {max_work}",
                    self.work
                ),
            )
            .with_context("data_file", file.id()));
        }

        self.check_deadline(file)
    }

    pub(super) fn check_deadline(&self, file: &DataFile) -> Result<()> {
        let Some(deadline) = self.budget.deadline() else {
            return Ok(());
        };

        let elapsed = self.started.elapsed();
        if elapsed > deadline {
            return Err(Error::new(
                ErrorKind::ResolutionTimeout,
                format!("Resolution took {elapsed:?}, deadline is {deadline:?}"),
            )
            .with_context("data_file", file.id()));
        }
        Ok(())
    }
}

/// Unions the positions of all `markers` after checking each against `file`.
///
/// Every marker is bounds-checked before any merge work is charged, so a bad
/// marker is reported as a resolution error rather than a timeout.
pub(super) fn union_positions<M: AsRef<DeleteMarker>>(
    file: &DataFile,
    markers: &[M],
    tracker: &mut BudgetTracker<'_>,
) -> Result<DeleteVector> {
    let vectors = markers
        .iter()
        .map(|marker| check_marker_bounds(file, marker.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut folded = DeleteVector::default();
    for vector in vectors {
        tracker.charge(file, vector.len())?;
        folded.union_with(vector);
        tracker.check_deadline(file)?;
    }

    Ok(folded)
}

/// Folds several markers of one data file into a single marker.
///
/// The folded marker carries the union of all positions and the highest
/// sequence number among the inputs. Inputs are left untouched.
pub fn fold_markers<M: AsRef<DeleteMarker>>(
    file: &DataFile,
    markers: &[M],
    budget: &ResolutionBudget,
) -> Result<DeleteMarker> {
    let Some(sequence_number) = markers
        .iter()
        .map(|marker| marker.as_ref().sequence_number())
        .max()
    else {
        return Err(Error::new(
            ErrorKind::Resolution,
            "Cannot fold an empty set of delete markers",
        )
        .with_context("data_file", file.id()));
    };

    let folded = union_positions(file, markers, &mut BudgetTracker::start(budget))?;
    Ok(DeleteMarker::from_vector(
        file.id(),
        sequence_number,
        file.record_count(),
        folded,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn marker(seq: i64, positions: impl IntoIterator<Item = u64>) -> Arc<DeleteMarker> {
        Arc::new(DeleteMarker::from_vector(
            "f",
            seq,
            1_000_000,
            positions.into_iter().collect(),
        ))
    }

    fn union(
        file: &DataFile,
        markers: &[Arc<DeleteMarker>],
        budget: &ResolutionBudget,
    ) -> Result<DeleteVector> {
        union_positions(file, markers, &mut BudgetTracker::start(budget))
    }

    #[test]
    fn test_fold_markers_unions_and_keeps_latest_sequence() {
        let file = DataFile::new("f", 1_000_000);
        let markers = vec![marker(3, [1, 2, 3]), marker(9, [3, 4]), marker(5, [10])];

        let folded = fold_markers(&file, &markers, &ResolutionBudget::unlimited()).unwrap();
        assert_eq!(folded.sequence_number(), 9);
        assert_eq!(folded.cardinality(), 5);
        assert_eq!(folded.data_file_id(), "f");
        let positions: Vec<u64> = folded.deletes().unwrap().iter().collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 10]);
    }

    #[test]
    fn test_fold_empty_is_error() {
        let file = DataFile::new("f", 10);
        let markers: Vec<Arc<DeleteMarker>> = vec![];
        let err = fold_markers(&file, &markers, &ResolutionBudget::unlimited()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_work_budget_exceeded() {
        let file = DataFile::new("f", 1_000_000);
        let markers = vec![marker(1, 0..600), marker(2, 600..1200)];

        let budget = ResolutionBudget::unlimited().with_max_work(1000);
        let err = union(&file, &markers, &budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionTimeout);

        let budget = ResolutionBudget::unlimited().with_max_work(1200);
        assert_eq!(union(&file, &markers, &budget).unwrap().len(), 1200);
    }

    #[test]
    fn test_deadline_exceeded() {
        let file = DataFile::new("f", 1_000_000);
        let markers: Vec<_> = (0..8)
            .map(|i| marker(i, (i as u64 * 100_000)..(i as u64 * 100_000 + 50_000)))
            .collect();

        let budget = ResolutionBudget::unlimited().with_deadline(Duration::ZERO);
        let err = union(&file, &markers, &budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionTimeout);
    }

    #[test]
    fn test_deadline_checked_after_last_merge() {
        let file = DataFile::new("f", 1_000_000);
        let markers = vec![marker(1, (0..900_000).step_by(3))];

        let budget = ResolutionBudget::unlimited().with_deadline(Duration::ZERO);
        let err = union(&file, &markers, &budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionTimeout);

        let err = fold_markers(&file, &markers, &budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionTimeout);
    }

    #[test]
    fn test_bounds_checked_before_budget() {
        let file = DataFile::new("f", 100);
        let markers = vec![marker(1, 0..50), marker(2, [500])];
        let budget = ResolutionBudget::unlimited().with_max_work(1);
        let err = union(&file, &markers, &budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }
}
