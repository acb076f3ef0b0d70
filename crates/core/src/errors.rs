//! Error types for the mergecommit core library.
//!
//! [`StoreError`] describes failures reported by a repository store (the
//! object database collaborator). [`MergeError`] wraps those failures with
//! the pipeline stage that hit them and the inputs of that stage, so the
//! printed chain reads "outer context: innermost cause".
//!
//! A merge that stops on conflicts is not an error; see
//! [`MergeOutcome::Conflicted`](crate::models::MergeOutcome::Conflicted).

use thiserror::Error;

use crate::models::{ObjectId, Side, Stage};

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors raised by an [`ObjectStore`](crate::store::ObjectStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path does not exist or is not a repository.
    #[error("no repository found at '{0}'")]
    RepositoryNotFound(String),

    /// The revision string does not name any object.
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),

    /// The revision names an object with no associated commit.
    #[error("'{revision}' names a {kind}, which does not peel to a commit")]
    NotACommit {
        revision: String,
        kind: String,
    },

    /// The two commits share no history.
    #[error("no merge base between {ours} and {theirs}")]
    NoMergeBase {
        ours: ObjectId,
        theirs: ObjectId,
    },

    /// Neither the repository nor the user configuration sets an identity.
    #[error("no default identity configured (set user.name and user.email)")]
    IdentityNotConfigured,

    /// The store refuses writes.
    #[error("object store is read-only")]
    ReadOnly,

    /// Attempted to write a tree from an index that still holds conflicts.
    #[error("index has unresolved conflicts")]
    UnmergedIndex,

    /// An object is missing or has the wrong type.
    #[error("corrupt object database: {0}")]
    Corrupt(String),

    /// A `git2` library error.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

// ---------------------------------------------------------------------------
// Merge pipeline errors
// ---------------------------------------------------------------------------

/// A failed merge invocation, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("could not open repository at '{path}'")]
    RepositoryOpenFailed {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("could not lookup {side} reference '{reference}'")]
    ReferenceNotFound {
        side: Side,
        reference: String,
        #[source]
        source: StoreError,
    },

    #[error("{side} reference '{reference}' is not a commit")]
    NotAPeelableCommit {
        side: Side,
        reference: String,
        #[source]
        source: StoreError,
    },

    #[error("could not merge commits {ours} and {theirs}")]
    MergeComputationFailed {
        ours: ObjectId,
        theirs: ObjectId,
        #[source]
        source: StoreError,
    },

    #[error("could not write merged tree")]
    TreeWriteFailed {
        #[source]
        source: StoreError,
    },

    #[error("could not get default signature")]
    IdentityUnavailable {
        #[source]
        source: StoreError,
    },

    #[error("could not create merge commit for tree {tree}")]
    CommitCreationFailed {
        tree: ObjectId,
        #[source]
        source: StoreError,
    },
}

impl MergeError {
    /// The pipeline stage at which this error was raised.
    pub fn stage(&self) -> Stage {
        match self {
            Self::RepositoryOpenFailed { .. } => Stage::OpenRepository,
            Self::ReferenceNotFound { side, .. } | Self::NotAPeelableCommit { side, .. } => {
                match side {
                    Side::Ours => Stage::ResolveOurs,
                    Side::Theirs => Stage::ResolveTheirs,
                }
            }
            Self::MergeComputationFailed { .. } => Stage::Merge,
            Self::TreeWriteFailed { .. } => Stage::WriteTree,
            Self::IdentityUnavailable { .. } => Stage::Identity,
            Self::CommitCreationFailed { .. } => Stage::CreateCommit,
        }
    }

    /// The store failure underneath this error.
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::RepositoryOpenFailed { source, .. }
            | Self::ReferenceNotFound { source, .. }
            | Self::NotAPeelableCommit { source, .. }
            | Self::MergeComputationFailed { source, .. }
            | Self::TreeWriteFailed { source }
            | Self::IdentityUnavailable { source }
            | Self::CommitCreationFailed { source, .. } => source,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from validating a [`MergeConfig`](crate::config::MergeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },
}
