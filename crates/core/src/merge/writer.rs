//! Persisting a clean merge as a two-parent commit.

use tracing::{debug, info};

use super::engine::CleanIndex;
use crate::errors::MergeError;
use crate::models::{ObjectId, ResolvedCommit};
use crate::store::ObjectStore;

/// Ids of a freshly written merge commit and its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenCommit {
    pub commit: ObjectId,
    pub tree: ObjectId,
}

/// Write `index` as a tree and create a commit with parents `[ours, theirs]`.
///
/// Author and committer are both the store's default identity. No reference
/// is moved; the new commit is reachable only through the returned id.
pub fn write_merge_commit<S: ObjectStore>(
    store: &S,
    index: CleanIndex<S::Index>,
    ours: &ResolvedCommit,
    theirs: &ResolvedCommit,
    message: &str,
) -> Result<WrittenCommit, MergeError> {
    let tree = write_merged_tree(store, index)?;
    let commit = commit_merged_tree(store, tree, ours, theirs, message)?;
    Ok(WrittenCommit { commit, tree })
}

/// Persist a clean merge index as a tree. A tree already stored by content
/// is reused.
pub fn write_merged_tree<S: ObjectStore>(
    store: &S,
    mut index: CleanIndex<S::Index>,
) -> Result<ObjectId, MergeError> {
    let tree = store
        .write_tree(index.index_mut())
        .map_err(|source| MergeError::TreeWriteFailed { source })?;
    info!(tree = %tree, "wrote merged tree");
    Ok(tree)
}

/// Create the merge commit for `tree` using the store's default identity.
pub fn commit_merged_tree<S: ObjectStore>(
    store: &S,
    tree: ObjectId,
    ours: &ResolvedCommit,
    theirs: &ResolvedCommit,
    message: &str,
) -> Result<ObjectId, MergeError> {
    let identity = store
        .default_identity()
        .map_err(|source| MergeError::IdentityUnavailable { source })?;
    debug!(%identity, when = ?identity.timestamp(), "using default identity");

    store
        .create_commit(&identity, &identity, message, tree, &[ours.id, theirs.id])
        .map_err(|source| MergeError::CommitCreationFailed { tree, source })
}
