//! End-to-end tests for merging two revisions of a real git repository.
//!
//! These tests exercise `merge_repository` and `MergeOrchestrator` with:
//! - Local git repos created in temporary directories via `git2`
//! - Commits built straight into the object database (no working copy)
//! - A repository-local `user.name` / `user.email` for the default identity
//!
//! No network I/O and no `git` binary required.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

use mergecommit_core::config::MergeSettings;
use mergecommit_core::errors::{MergeError, StoreError};
use mergecommit_core::models::{MergeOutcome, MergeRequest, Side, Stage};
use mergecommit_core::store::GitOpener;
use mergecommit_core::{merge_repository, MergeOrchestrator};

// ===========================================================================
// Helpers
// ===========================================================================

fn init_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Merge Test").unwrap();
    config.set_str("user.email", "merge@test.com").unwrap();
    (dir, repo)
}

/// Create a commit of flat `files` on `refs/heads/<branch>`.
fn commit_files(
    repo: &Repository,
    branch: &str,
    files: &[(&str, &str)],
    parents: &[Oid],
) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in files {
        let blob = repo.blob(content.as_bytes()).unwrap();
        builder.insert(*name, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let sig = Signature::now("Fixture", "fixture@test.com").unwrap();
    let parents: Vec<git2::Commit> =
        parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    let refname = format!("refs/heads/{branch}");
    repo.commit(Some(refname.as_str()), &sig, &sig, branch, &tree, &parent_refs).unwrap()
}

fn object_count(repo: &Repository) -> usize {
    let mut count = 0;
    repo.odb()
        .unwrap()
        .foreach(|_| {
            count += 1;
            true
        })
        .unwrap();
    count
}

fn tree_files(repo: &Repository, commit: Oid) -> BTreeMap<String, String> {
    let tree = repo.find_commit(commit).unwrap().tree().unwrap();
    tree.iter()
        .map(|entry| {
            let blob = repo.find_blob(entry.id()).unwrap();
            (
                entry.name().unwrap().to_string(),
                String::from_utf8_lossy(blob.content()).into_owned(),
            )
        })
        .collect()
}

/// A (x=1); B = A + y=2; C = A + z=3; D: x=2; E: x=3.
fn scenario_repo() -> (TempDir, Repository, [Oid; 5]) {
    let (dir, repo) = init_repo();
    let a = commit_files(&repo, "base", &[("x", "1")], &[]);
    let b = commit_files(&repo, "b", &[("x", "1"), ("y", "2")], &[a]);
    let c = commit_files(&repo, "c", &[("x", "1"), ("z", "3")], &[a]);
    let d = commit_files(&repo, "d", &[("x", "2")], &[a]);
    let e = commit_files(&repo, "e", &[("x", "3")], &[a]);
    (dir, repo, [a, b, c, d, e])
}

fn refs_snapshot(repo: &Repository) -> BTreeMap<String, Option<Oid>> {
    repo.references()
        .unwrap()
        .map(|r| {
            let r = r.unwrap();
            (r.name().unwrap().to_string(), r.target())
        })
        .collect()
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_non_overlapping_changes_merge_into_two_parent_commit() {
    let (dir, repo, [_, b, c, _, _]) = scenario_repo();
    let refs_before = refs_snapshot(&repo);

    let outcome = merge_repository(dir.path(), "b", "c", "Merge c into b").unwrap();
    let merged = match outcome {
        MergeOutcome::Merged(merged) => merged,
        other => panic!("expected a merge commit, got {other:?}"),
    };

    let commit = repo.find_commit(merged.commit.as_oid()).unwrap();
    let parents: Vec<Oid> = commit.parent_ids().collect();
    assert_eq!(parents, vec![b, c]);
    assert_eq!(commit.message(), Some("Merge c into b"));
    assert_eq!(commit.author().name(), Some("Merge Test"));
    assert_eq!(commit.committer().email(), Some("merge@test.com"));
    assert_eq!(commit.tree_id(), merged.tree.as_oid());

    let expected: BTreeMap<String, String> = [("x", "1"), ("y", "2"), ("z", "3")]
        .into_iter()
        .map(|(p, c)| (p.to_string(), c.to_string()))
        .collect();
    assert_eq!(tree_files(&repo, commit.id()), expected);

    // The merge commit is detached: no reference moved.
    assert_eq!(refs_snapshot(&repo), refs_before);
}

#[test]
fn test_divergent_change_is_a_conflict_and_writes_nothing() {
    let (dir, repo, [_, _, _, d, e]) = scenario_repo();
    let before = object_count(&repo);

    let outcome = merge_repository(dir.path(), "d", "e", "Merge e into d").unwrap();
    match outcome {
        MergeOutcome::Conflicted(report) => {
            assert_eq!(report.paths, vec!["x".to_string()]);
            assert_eq!(report.ours.as_oid(), d);
            assert_eq!(report.theirs.as_oid(), e);
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(object_count(&repo), before);
}

#[test]
fn test_rerun_produces_identical_tree() {
    let (dir, _repo, _) = scenario_repo();
    let first = merge_repository(dir.path(), "b", "c", "first").unwrap();
    let second = merge_repository(dir.path(), "b", "c", "second").unwrap();
    match (first, second) {
        (MergeOutcome::Merged(first), MergeOutcome::Merged(second)) => {
            assert_eq!(first.tree, second.tree);
            assert_ne!(first.commit, second.commit);
        }
        other => panic!("expected two merge commits, got {other:?}"),
    }
}

#[test]
fn test_resolves_ids_and_relative_expressions() {
    let (dir, repo, [a, b, c, _, _]) = scenario_repo();
    let c_short = &c.to_string()[..10];

    let outcome = merge_repository(dir.path(), "b", c_short, "merge").unwrap();
    let commit = repo.find_commit(outcome.commit_id().unwrap().as_oid()).unwrap();
    assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![b, c]);

    let outcome = merge_repository(dir.path(), "b~1", "c", "merge").unwrap();
    let commit = repo.find_commit(outcome.commit_id().unwrap().as_oid()).unwrap();
    assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![a, c]);
}

#[test]
fn test_annotated_tag_peels_to_commit() {
    let (dir, repo, [_, b, c, _, _]) = scenario_repo();
    let sig = Signature::now("Fixture", "fixture@test.com").unwrap();
    let target = repo.find_object(c, None).unwrap();
    repo.tag("v1.0", &target, &sig, "release", false).unwrap();

    let outcome = merge_repository(dir.path(), "b", "v1.0", "merge tag").unwrap();
    let commit = repo.find_commit(outcome.commit_id().unwrap().as_oid()).unwrap();
    assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![b, c]);
}

// ===========================================================================
// Failures
// ===========================================================================

#[test]
fn test_nonexistent_reference_fails_before_merge() {
    let (dir, repo, _) = scenario_repo();
    let before = object_count(&repo);

    let err = merge_repository(dir.path(), "does-not-exist", "c", "merge").unwrap_err();
    match &err {
        MergeError::ReferenceNotFound { side, reference, .. } => {
            assert_eq!(*side, Side::Ours);
            assert_eq!(reference, "does-not-exist");
        }
        other => panic!("expected ReferenceNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("does-not-exist"));
    assert_eq!(object_count(&repo), before);
}

#[test]
fn test_blob_reference_is_not_a_commit() {
    let (dir, repo, [_, b, _, _, _]) = scenario_repo();
    let blob = repo.find_commit(b).unwrap().tree().unwrap().get_name("y").unwrap().id();

    let err = merge_repository(dir.path(), "b", &blob.to_string(), "merge").unwrap_err();
    match err {
        MergeError::NotAPeelableCommit { side, reference, source } => {
            assert_eq!(side, Side::Theirs);
            assert_eq!(reference, blob.to_string());
            assert!(matches!(source, StoreError::NotACommit { .. }));
        }
        other => panic!("expected NotAPeelableCommit, got {other:?}"),
    }
}

#[test]
fn test_missing_repository() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let err = merge_repository(&missing, "a", "b", "merge").unwrap_err();
    assert_eq!(err.stage(), Stage::OpenRepository);
    assert!(matches!(err, MergeError::RepositoryOpenFailed { .. }));
}

#[test]
fn test_unrelated_histories_fail_merge_stage() {
    let (dir, repo, _) = scenario_repo();
    commit_files(&repo, "orphan", &[("q", "1")], &[]);

    let err = merge_repository(dir.path(), "b", "orphan", "merge").unwrap_err();
    assert_eq!(err.stage(), Stage::Merge);
    assert!(matches!(
        err,
        MergeError::MergeComputationFailed { source: StoreError::NoMergeBase { .. }, .. }
    ));
}

#[test]
fn test_orchestrator_honours_settings() {
    let (dir, repo, [_, b, c, _, _]) = scenario_repo();
    let settings = MergeSettings { find_renames: false, rename_threshold: 50 };
    let orchestrator = MergeOrchestrator::new(GitOpener, settings);

    let request = MergeRequest::new(dir.path(), "b", "c", "merge");
    let outcome = orchestrator.merge(&request).unwrap();
    let commit = repo.find_commit(outcome.commit_id().unwrap().as_oid()).unwrap();
    assert_eq!(commit.parent_ids().collect::<Vec<_>>(), vec![b, c]);
    assert!(!orchestrator.settings().find_renames);
    assert!(Path::new(&request.repo_path).exists());
}
