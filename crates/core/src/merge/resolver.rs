//! Revision resolution.

use tracing::info;

use crate::errors::{MergeError, StoreError};
use crate::models::{ResolvedCommit, Side};
use crate::store::ObjectStore;

/// Resolve `reference` to a commit, following tags.
///
/// The error keeps `reference` and which `side` of the merge it was for.
pub fn resolve<S: ObjectStore>(
    store: &S,
    side: Side,
    reference: &str,
) -> Result<ResolvedCommit, MergeError> {
    let commit = store.resolve_commit(reference).map_err(|source| match source {
        StoreError::NotACommit { .. } => MergeError::NotAPeelableCommit {
            side,
            reference: reference.to_string(),
            source,
        },
        source => MergeError::ReferenceNotFound {
            side,
            reference: reference.to_string(),
            source,
        },
    })?;
    info!(%side, reference, commit = %commit.id, "resolved reference");
    Ok(commit)
}
