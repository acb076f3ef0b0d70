//! mergecommit core library.
//!
//! Resolves two revisions of a repository, merges them three ways against
//! their merge base and, when the result is free of conflicts, writes it as
//! a new commit whose parents are `[ours, theirs]`. No reference is moved.
//!
//! The object database sits behind the [`store`] traits: [`store::GitStore`]
//! for real repositories, [`store::MemoryRepository`] for an in-process one.

pub mod config;
pub mod errors;
pub mod merge;
pub mod models;
pub mod store;

// Re-exports for convenience.
pub use config::{MergeConfig, MergeSettings};
pub use errors::{MergeError, StoreError};
pub use merge::{merge_repository, MergeOrchestrator};
pub use models::{MergeOutcome, MergeRequest, ObjectId};
