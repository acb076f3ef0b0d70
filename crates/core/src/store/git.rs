//! Repository store backed by a local git repository via `git2`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use git2::{ErrorCode, IndexEntry, Repository, Signature, Time};
use tracing::{debug, info, instrument};

use super::{MergeIndex, ObjectStore, StoreOpener};
use crate::config::MergeSettings;
use crate::errors::StoreError;
use crate::models::{Identity, ObjectId, ResolvedCommit};

/// Open handle on a git repository. The handle is released on drop.
pub struct GitStore {
    repo: Repository,
    repo_path: PathBuf,
}

/// Merge index produced by [`GitStore::merge_commits`].
pub struct GitMergeIndex(git2::Index);

/// Opens [`GitStore`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitOpener;

impl StoreOpener for GitOpener {
    type Store = GitStore;

    fn open(&self, path: &Path) -> Result<GitStore, StoreError> {
        GitStore::open(path)
    }
}

impl GitStore {
    /// Open an existing git repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<Self, StoreError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path).map_err(|e| {
            debug!(error = %e, "repository open failed");
            StoreError::RepositoryNotFound(path.display().to_string())
        })?;
        Ok(Self { repo, repo_path: path.to_path_buf() })
    }
}

impl Drop for GitStore {
    fn drop(&mut self) {
        debug!(path = %self.repo_path.display(), "releasing git repository");
    }
}

impl ObjectStore for GitStore {
    type Index = GitMergeIndex;

    #[instrument(skip(self))]
    fn resolve_commit(&self, revision: &str) -> Result<ResolvedCommit, StoreError> {
        let object = self.repo.revparse_single(revision).map_err(|e| match e.code() {
            ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
                debug!(error = %e, "revision did not parse");
                StoreError::UnknownRevision(revision.to_string())
            }
            _ => StoreError::Git2(e),
        })?;
        let commit = object.peel_to_commit().map_err(|e| {
            debug!(error = %e, "object does not peel to a commit");
            StoreError::NotACommit {
                revision: revision.to_string(),
                kind: object.kind().map(|k| k.str()).unwrap_or("object").to_string(),
            }
        })?;
        Ok(ResolvedCommit {
            id: commit.id().into(),
            tree_id: commit.tree_id().into(),
            parent_ids: commit.parent_ids().map(ObjectId::from).collect(),
            summary: commit.summary().unwrap_or("").to_string(),
        })
    }

    #[instrument(skip(self, ours, theirs), fields(ours = %ours.id, theirs = %theirs.id))]
    fn merge_commits(
        &self,
        ours: &ResolvedCommit,
        theirs: &ResolvedCommit,
        settings: &MergeSettings,
    ) -> Result<GitMergeIndex, StoreError> {
        let ours_commit = self.repo.find_commit(ours.id.as_oid())?;
        let theirs_commit = self.repo.find_commit(theirs.id.as_oid())?;

        // libgit2 would otherwise merge unrelated histories against an empty tree.
        let base = self
            .repo
            .merge_base(ours.id.as_oid(), theirs.id.as_oid())
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => StoreError::NoMergeBase { ours: ours.id, theirs: theirs.id },
                _ => StoreError::Git2(e),
            })?;
        debug!(%base, "computed merge base");

        let mut opts = git2::MergeOptions::new();
        opts.find_renames(settings.find_renames)
            .rename_threshold(settings.rename_threshold)
            .fail_on_conflict(false);
        let index = self.repo.merge_commits(&ours_commit, &theirs_commit, Some(&opts))?;
        Ok(GitMergeIndex(index))
    }

    fn write_tree(&self, index: &mut GitMergeIndex) -> Result<ObjectId, StoreError> {
        if index.0.has_conflicts() {
            return Err(StoreError::UnmergedIndex);
        }
        let oid = index.0.write_tree_to(&self.repo)?;
        debug!(tree = %oid, "wrote tree");
        Ok(oid.into())
    }

    fn default_identity(&self) -> Result<Identity, StoreError> {
        let signature = self.repo.signature().map_err(|e| match e.code() {
            ErrorCode::NotFound => StoreError::IdentityNotConfigured,
            _ => StoreError::Git2(e),
        })?;
        Ok(Identity {
            name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
            when: signature.when().seconds(),
            offset_minutes: signature.when().offset_minutes(),
        })
    }

    #[instrument(skip(self, author, committer, message))]
    fn create_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        message: &str,
        tree: ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId, StoreError> {
        let tree = self.repo.find_tree(tree.as_oid())?;
        let parents = parents
            .iter()
            .map(|id| self.repo.find_commit(id.as_oid()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let author = to_signature(author)?;
        let committer = to_signature(committer)?;
        let oid = self.repo.commit(None, &author, &committer, message, &tree, &parent_refs)?;
        info!(sha = %oid, "created commit");
        Ok(oid.into())
    }
}

impl MergeIndex for GitMergeIndex {
    fn has_conflicts(&self) -> bool {
        self.0.has_conflicts()
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, StoreError> {
        let mut paths = BTreeSet::new();
        for conflict in self.0.conflicts()? {
            let conflict = conflict?;
            let path = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(entry_path);
            if let Some(path) = path {
                paths.insert(path);
            }
        }
        Ok(paths.into_iter().collect())
    }
}

fn entry_path(entry: &IndexEntry) -> String {
    String::from_utf8_lossy(&entry.path).into_owned()
}

fn to_signature(identity: &Identity) -> Result<Signature<'static>, git2::Error> {
    let when = Time::new(identity.when, identity.offset_minutes);
    Signature::new(&identity.name, &identity.email, &when)
}
