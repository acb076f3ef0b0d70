//! Repository store abstraction.
//!
//! The merge pipeline talks to the object database only through these
//! traits. [`git::GitStore`] backs them with libgit2; [`memory::MemoryStore`]
//! is an in-process store used by tests and embedders that do not have a
//! repository on disk.
//!
//! A store handle is acquired with [`StoreOpener::open`] and released when
//! it is dropped, so release happens exactly once on every exit path.

use std::path::Path;

use crate::config::MergeSettings;
use crate::errors::StoreError;
use crate::models::{Identity, ObjectId, ResolvedCommit};

pub mod git;
pub mod memory;

pub use git::{GitOpener, GitStore};
pub use memory::{MemoryRepository, MemoryStore};

/// Transient result of a three-way merge, before it is written as a tree.
pub trait MergeIndex {
    /// True if any path could not be resolved from base, ours and theirs.
    fn has_conflicts(&self) -> bool;

    /// Conflicted paths, sorted and deduplicated.
    fn conflicted_paths(&self) -> Result<Vec<String>, StoreError>;
}

/// Object database operations consumed by the merge pipeline.
pub trait ObjectStore {
    type Index: MergeIndex;

    /// Parse `revision` and peel the named object to a commit.
    fn resolve_commit(&self, revision: &str) -> Result<ResolvedCommit, StoreError>;

    /// Merge `ours` and `theirs` against their merge base.
    ///
    /// Conflicts are reported through the returned index, not as an error.
    fn merge_commits(
        &self,
        ours: &ResolvedCommit,
        theirs: &ResolvedCommit,
        settings: &MergeSettings,
    ) -> Result<Self::Index, StoreError>;

    /// Persist the index content as a tree.
    fn write_tree(&self, index: &mut Self::Index) -> Result<ObjectId, StoreError>;

    /// Identity configured for the repository.
    fn default_identity(&self) -> Result<Identity, StoreError>;

    /// Create a commit object. No reference is updated.
    fn create_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        message: &str,
        tree: ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId, StoreError>;
}

/// Opens store handles by path.
pub trait StoreOpener {
    type Store: ObjectStore;

    fn open(&self, path: &Path) -> Result<Self::Store, StoreError>;
}
