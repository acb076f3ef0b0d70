//! Three-way merge of two resolved commits.

use tracing::{debug, info};

use crate::config::MergeSettings;
use crate::errors::{MergeError, StoreError};
use crate::models::ResolvedCommit;
use crate::store::{MergeIndex, ObjectStore};

/// A merge index known to hold no conflicts.
///
/// Only [`three_way_merge`] constructs one, so a conflicted index can never
/// reach [`write_merge_commit`](super::writer::write_merge_commit).
#[derive(Debug)]
pub struct CleanIndex<I> {
    index: I,
}

impl<I> CleanIndex<I> {
    pub(crate) fn index_mut(&mut self) -> &mut I {
        &mut self.index
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}

/// Result of a merge computation that did not fail.
#[derive(Debug)]
pub enum MergeResult<I> {
    Clean(CleanIndex<I>),
    Conflicted {
        index: I,
        /// Sorted, deduplicated conflicted paths.
        paths: Vec<String>,
    },
}

impl<I> MergeResult<I> {
    pub fn has_conflicts(&self) -> bool {
        matches!(self, Self::Conflicted { .. })
    }
}

/// Merge `ours` and `theirs` against their common ancestor.
///
/// Conflicts are a successful [`MergeResult::Conflicted`]. Failing to find a
/// merge base, or any store error, is [`MergeError::MergeComputationFailed`].
pub fn three_way_merge<S: ObjectStore>(
    store: &S,
    ours: &ResolvedCommit,
    theirs: &ResolvedCommit,
    settings: &MergeSettings,
) -> Result<MergeResult<S::Index>, MergeError> {
    let failed = |source: StoreError| MergeError::MergeComputationFailed {
        ours: ours.id,
        theirs: theirs.id,
        source,
    };

    let index = store.merge_commits(ours, theirs, settings).map_err(failed)?;
    if !index.has_conflicts() {
        debug!(ours = %ours.id.short(), theirs = %theirs.id.short(), "merge is clean");
        return Ok(MergeResult::Clean(CleanIndex { index }));
    }

    let paths = index.conflicted_paths().map_err(failed)?;
    info!(count = paths.len(), "merge has conflicts");
    Ok(MergeResult::Conflicted { index, paths })
}
