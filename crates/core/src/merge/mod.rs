//! The merge-and-commit pipeline.
//!
//! 1. **Resolution** -- turn the two revision strings into commits.
//! 2. **Merging** -- three-way merge of their trees against the merge base.
//! 3. **Writing** -- persist a clean merge as a tree and a two-parent commit.
//!
//! [`MergeOrchestrator`] sequences the three and is the only entry point the
//! binary uses.

pub mod engine;
pub mod orchestrator;
pub mod resolver;
pub mod writer;

pub use engine::{three_way_merge, CleanIndex, MergeResult};
pub use orchestrator::{merge_repository, MergeOrchestrator};
pub use resolver::resolve;
pub use writer::{commit_merged_tree, write_merge_commit, write_merged_tree, WrittenCommit};
