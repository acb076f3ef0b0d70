//! Merge orchestration.
//!
//! [`MergeOrchestrator::merge`] runs one invocation through the linear state
//! machine
//!
//! ```text
//! Start -> RepositoryOpened -> OursResolved -> TheirsResolved -> Merged
//!       -> Conflicted                          (terminal, nothing written)
//!       -> TreeWritten -> CommitCreated        (terminal, success)
//! ```
//!
//! Any failure aborts with a [`MergeError`] naming the stage and its inputs.
//! The store handle is owned by `merge` and dropped on every return path.

use std::path::Path;

use tracing::{info, instrument, warn};

use super::engine::{three_way_merge, MergeResult};
use super::resolver::resolve;
use super::writer::{commit_merged_tree, write_merged_tree};
use crate::config::MergeSettings;
use crate::errors::MergeError;
use crate::models::{ConflictReport, MergeOutcome, MergeRequest, MergeState, MergedCommit, Side};
use crate::store::{GitOpener, StoreOpener};

/// Runs merge invocations against stores produced by `O`.
#[derive(Debug, Clone)]
pub struct MergeOrchestrator<O> {
    opener: O,
    settings: MergeSettings,
}

impl<O: StoreOpener> MergeOrchestrator<O> {
    pub fn new(opener: O, settings: MergeSettings) -> Self {
        Self { opener, settings }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Merge `request.theirs` into `request.ours` and commit the result.
    ///
    /// Returns [`MergeOutcome::Conflicted`] without writing anything when the
    /// merge cannot be automated.
    #[instrument(
        skip(self, request),
        fields(repo = %request.repo_path.display(), ours = %request.ours, theirs = %request.theirs)
    )]
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome, MergeError> {
        let mut state = MergeState::Start;

        let store = self.opener.open(&request.repo_path).map_err(|source| {
            MergeError::RepositoryOpenFailed {
                path: request.repo_path.display().to_string(),
                source,
            }
        })?;
        advance(&mut state, MergeState::RepositoryOpened);

        let ours = resolve(&store, Side::Ours, &request.ours)?;
        advance(&mut state, MergeState::OursResolved);

        let theirs = resolve(&store, Side::Theirs, &request.theirs)?;
        advance(&mut state, MergeState::TheirsResolved);

        let result = three_way_merge(&store, &ours, &theirs, &self.settings)?;
        advance(&mut state, MergeState::Merged);

        let index = match result {
            MergeResult::Clean(index) => index,
            MergeResult::Conflicted { paths, .. } => {
                advance(&mut state, MergeState::Conflicted);
                warn!(count = paths.len(), "could not auto-merge due to conflicts");
                return Ok(MergeOutcome::Conflicted(ConflictReport {
                    ours: ours.id,
                    theirs: theirs.id,
                    ours_ref: request.ours.clone(),
                    theirs_ref: request.theirs.clone(),
                    paths,
                }));
            }
        };

        let tree = write_merged_tree(&store, index)?;
        advance(&mut state, MergeState::TreeWritten);

        let commit = commit_merged_tree(&store, tree, &ours, &theirs, &request.message)?;
        advance(&mut state, MergeState::CommitCreated);

        info!(
            %commit,
            "merged {} and {} into new commit",
            request.ours,
            request.theirs
        );
        Ok(MergeOutcome::Merged(MergedCommit {
            commit,
            tree,
            ours: ours.id,
            theirs: theirs.id,
            ours_ref: request.ours.clone(),
            theirs_ref: request.theirs.clone(),
        }))
    }
}

fn advance(state: &mut MergeState, next: MergeState) {
    info!(from = %state, to = %next, "merge state transition");
    *state = next;
}

/// Merge two revisions of the git repository at `path` with default settings.
pub fn merge_repository(
    path: impl AsRef<Path>,
    ours: &str,
    theirs: &str,
    message: &str,
) -> Result<MergeOutcome, MergeError> {
    let request = MergeRequest::new(path.as_ref(), ours, theirs, message);
    MergeOrchestrator::new(GitOpener, MergeSettings::default()).merge(&request)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::errors::StoreError;
    use crate::models::{ObjectId, Stage};
    use crate::store::MemoryRepository;

    struct Fixture {
        repo: MemoryRepository,
        a: ObjectId,
        b: ObjectId,
        c: ObjectId,
    }

    /// A (x=1) with children B (+y=2) and C (+z=3), D (x=2) and E (x=3).
    fn fixture() -> Fixture {
        let repo = MemoryRepository::new("/repo");
        let a = repo.commit_files(&[("x", "1")], &[], "A").unwrap();
        let b = repo.commit_files(&[("x", "1"), ("y", "2")], &[a], "B").unwrap();
        let c = repo.commit_files(&[("x", "1"), ("z", "3")], &[a], "C").unwrap();
        let d = repo.commit_files(&[("x", "2")], &[a], "D").unwrap();
        let e = repo.commit_files(&[("x", "3")], &[a], "E").unwrap();
        for (name, id) in [("a", a), ("b", b), ("c", c), ("d", d), ("e", e)] {
            repo.set_ref(name, id);
        }
        Fixture { repo, a, b, c }
    }

    fn orchestrator(repo: &MemoryRepository) -> MergeOrchestrator<MemoryRepository> {
        MergeOrchestrator::new(repo.clone(), MergeSettings::default())
    }

    fn request(ours: &str, theirs: &str) -> MergeRequest {
        MergeRequest::new("/repo", ours, theirs, "merge")
    }

    #[test]
    fn test_clean_merge_creates_commit_with_ordered_parents() {
        let f = fixture();
        let outcome = orchestrator(&f.repo).merge(&request("b", "c")).unwrap();

        let merged = match outcome {
            MergeOutcome::Merged(merged) => merged,
            other => panic!("expected a merge commit, got {other:?}"),
        };
        assert_eq!(merged.parents(), [f.b, f.c]);
        let commit = f.repo.find_commit(merged.commit).unwrap();
        assert_eq!(commit.parent_ids, vec![f.b, f.c]);

        let files = f.repo.tree_files(commit.tree_id).unwrap();
        let expected: BTreeMap<String, String> = [("x", "1"), ("y", "2"), ("z", "3")]
            .into_iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        assert_eq!(files, expected);
        assert_eq!(f.repo.release_count(), 1);
    }

    #[test]
    fn test_parent_order_follows_arguments() {
        let f = fixture();
        let outcome = orchestrator(&f.repo).merge(&request("c", "b")).unwrap();
        let commit = f.repo.find_commit(outcome.commit_id().unwrap()).unwrap();
        assert_eq!(commit.parent_ids, vec![f.c, f.b]);
    }

    #[test]
    fn test_rerun_yields_same_tree_new_commit() {
        let f = fixture();
        let orchestrator = orchestrator(&f.repo);
        let first = orchestrator.merge(&request("b", "c")).unwrap();
        let second = orchestrator.merge(&request("b", "c")).unwrap();
        match (first, second) {
            (MergeOutcome::Merged(first), MergeOutcome::Merged(second)) => {
                assert_eq!(first.tree, second.tree);
                assert_ne!(first.commit, second.commit);
            }
            other => panic!("expected two merge commits, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_writes_nothing() {
        let f = fixture();
        let objects = f.repo.object_count();
        let outcome = orchestrator(&f.repo).merge(&request("d", "e")).unwrap();

        match outcome {
            MergeOutcome::Conflicted(report) => {
                assert_eq!(report.paths, vec!["x".to_string()]);
                assert_eq!(report.ours_ref, "d");
                assert_eq!(report.theirs_ref, "e");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(f.repo.object_count(), objects);
        assert_eq!(f.repo.release_count(), 1);
    }

    #[test]
    fn test_missing_ours_fails_before_theirs_and_merge() {
        let f = fixture();
        let err = orchestrator(&f.repo).merge(&request("nope", "also-nope")).unwrap_err();
        match &err {
            MergeError::ReferenceNotFound { side, reference, .. } => {
                assert_eq!(*side, Side::Ours);
                assert_eq!(reference, "nope");
            }
            other => panic!("expected ReferenceNotFound, got {other:?}"),
        }
        assert_eq!(err.stage(), Stage::ResolveOurs);
        assert_eq!(f.repo.merge_count(), 0);
        assert_eq!(f.repo.release_count(), 1);
    }

    #[test]
    fn test_missing_theirs_fails_before_merge() {
        let f = fixture();
        let err = orchestrator(&f.repo).merge(&request("b", "nope")).unwrap_err();
        assert_eq!(err.stage(), Stage::ResolveTheirs);
        assert_eq!(f.repo.merge_count(), 0);
    }

    #[test]
    fn test_blob_reference_is_not_peelable() {
        let f = fixture();
        let blob = f.repo.write_blob(b"1").unwrap();
        let err = orchestrator(&f.repo).merge(&request("b", &blob.to_string())).unwrap_err();
        assert!(matches!(err, MergeError::NotAPeelableCommit { side: Side::Theirs, .. }));
    }

    #[test]
    fn test_open_failure_touches_nothing() {
        let f = fixture();
        let err = orchestrator(&f.repo)
            .merge(&MergeRequest::new("/elsewhere", "b", "c", "merge"))
            .unwrap_err();
        assert!(matches!(
            err,
            MergeError::RepositoryOpenFailed { ref path, .. } if path == "/elsewhere"
        ));
        assert_eq!(f.repo.open_count(), 0);
        assert_eq!(f.repo.release_count(), 0);
    }

    #[test]
    fn test_store_failures_map_to_stages_and_release() {
        let f = fixture();
        let orchestrator = orchestrator(&f.repo);

        f.repo.set_read_only(true);
        let err = orchestrator.merge(&request("b", "c")).unwrap_err();
        assert!(matches!(err, MergeError::TreeWriteFailed { source: StoreError::ReadOnly }));
        f.repo.set_read_only(false);

        f.repo.set_identity(None);
        let commits = f.repo.commit_count();
        let err = orchestrator.merge(&request("b", "c")).unwrap_err();
        assert_eq!(err.stage(), Stage::Identity);
        assert_eq!(f.repo.commit_count(), commits);
        f.repo.set_identity(Some(("Merge Bot", "merge@example.com")));

        let unrelated = f.repo.commit_files(&[("q", "1")], &[], "root").unwrap();
        f.repo.set_ref("unrelated", unrelated);
        let err = orchestrator.merge(&request("b", "unrelated")).unwrap_err();
        assert_eq!(err.stage(), Stage::Merge);

        assert_eq!(f.repo.open_count(), 3);
        assert_eq!(f.repo.release_count(), 3);
    }

    #[test]
    fn test_rejected_commit_maps_to_create_commit_stage() {
        let f = fixture();
        f.repo.set_fail_commits(true);
        let commits = f.repo.commit_count();

        let err = orchestrator(&f.repo).merge(&request("b", "c")).unwrap_err();
        assert_eq!(err.stage(), Stage::CreateCommit);
        match &err {
            MergeError::CommitCreationFailed { tree, .. } => {
                assert!(f.repo.tree_files(*tree).is_some());
            }
            other => panic!("expected CommitCreationFailed, got {other:?}"),
        }
        assert_eq!(f.repo.commit_count(), commits);
        assert_eq!(f.repo.open_count(), 1);
        assert_eq!(f.repo.release_count(), 1);
    }

    #[test]
    fn test_merging_ancestor_takes_descendant_tree() {
        let f = fixture();
        let outcome = orchestrator(&f.repo).merge(&request("a", "b")).unwrap();
        let commit = f.repo.find_commit(outcome.commit_id().unwrap()).unwrap();
        let b = f.repo.find_commit(f.b).unwrap();
        assert_eq!(commit.tree_id, b.tree_id);
        assert_eq!(commit.parent_ids, vec![f.a, f.b]);
    }
}
