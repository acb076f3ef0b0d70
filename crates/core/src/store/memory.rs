//! In-memory content-addressed repository store.
//!
//! Objects are hashed the way git hashes loose objects, so identical content
//! always yields the same [`ObjectId`]. Trees are flat maps from path to blob.
//! Merging follows path-level three-way rules: a path changed on one side
//! takes that side, a path changed identically on both sides takes that
//! version, anything else conflicts. Content inside a file is never merged,
//! and renames are not detected.
//!
//! [`MemoryRepository`] owns the shared state and opens [`MemoryStore`]
//! handles. It also exposes counters (objects, merges, opens, releases) and
//! failure switches (read-only store, rejected commits, missing identity)
//! for tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{MergeIndex, ObjectStore, StoreOpener};
use crate::config::MergeSettings;
use crate::errors::StoreError;
use crate::models::{Identity, ObjectId, ObjectKind, ResolvedCommit};

/// Start of the logical clock used to timestamp identities.
const CLOCK_START: i64 = 1_700_000_000;

/// Shortest abbreviated id accepted by revision parsing.
const MIN_ABBREV_LEN: usize = 4;

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(BTreeMap<String, ObjectId>),
    Commit(CommitRecord),
    Tag { target: ObjectId, name: String },
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag { .. } => ObjectKind::Tag,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Self::Blob(content) => content.clone(),
            Self::Tree(entries) => {
                let mut out = Vec::new();
                for (path, id) in entries {
                    out.extend_from_slice(format!("100644 {path}\0{id}\n").as_bytes());
                }
                out
            }
            Self::Commit(record) => {
                let mut out = format!("tree {}\n", record.tree);
                for parent in &record.parents {
                    out.push_str(&format!("parent {parent}\n"));
                }
                out.push_str(&format!("author {}\n", signature_line(&record.author)));
                out.push_str(&format!("committer {}\n", signature_line(&record.committer)));
                out.push('\n');
                out.push_str(&record.message);
                out.into_bytes()
            }
            Self::Tag { target, name } => format!("object {target}\ntag {name}\n").into_bytes(),
        }
    }
}

fn signature_line(identity: &Identity) -> String {
    let sign = if identity.offset_minutes < 0 { '-' } else { '+' };
    let offset = identity.offset_minutes.abs();
    format!(
        "{} <{}> {} {}{:02}{:02}",
        identity.name,
        identity.email,
        identity.when,
        sign,
        offset / 60,
        offset % 60
    )
}

#[derive(Debug, Clone)]
struct CommitRecord {
    tree: ObjectId,
    parents: Vec<ObjectId>,
    author: Identity,
    committer: Identity,
    message: String,
}

#[derive(Debug)]
struct MemoryState {
    objects: BTreeMap<ObjectId, Object>,
    refs: BTreeMap<String, ObjectId>,
    identity: Option<(String, String)>,
    clock: i64,
    read_only: bool,
    fail_commits: bool,
    opens: usize,
    releases: usize,
    merges: usize,
}

impl MemoryState {
    fn insert(&mut self, object: Object) -> Result<ObjectId, StoreError> {
        let id = ObjectId::hash(object.kind(), &object.encode())?;
        self.objects.entry(id).or_insert(object);
        Ok(id)
    }

    fn next_identity(&mut self) -> Result<Identity, StoreError> {
        let (name, email) = self.identity.clone().ok_or(StoreError::IdentityNotConfigured)?;
        self.clock += 1;
        Ok(Identity { name, email, when: self.clock, offset_minutes: 0 })
    }

    fn commit_record(&self, id: ObjectId) -> Result<&CommitRecord, StoreError> {
        match self.objects.get(&id) {
            Some(Object::Commit(record)) => Ok(record),
            Some(other) => Err(StoreError::Corrupt(format!(
                "{id} is a {}, expected a commit",
                other.kind()
            ))),
            None => Err(StoreError::Corrupt(format!("missing commit {id}"))),
        }
    }

    fn tree_entries(&self, id: ObjectId) -> Result<&BTreeMap<String, ObjectId>, StoreError> {
        match self.objects.get(&id) {
            Some(Object::Tree(entries)) => Ok(entries),
            _ => Err(StoreError::Corrupt(format!("missing tree {id}"))),
        }
    }

    fn resolved(&self, id: ObjectId) -> Result<ResolvedCommit, StoreError> {
        let record = self.commit_record(id)?;
        Ok(ResolvedCommit {
            id,
            tree_id: record.tree,
            parent_ids: record.parents.clone(),
            summary: record.message.lines().next().unwrap_or("").to_string(),
        })
    }

    // -- revision parsing ---------------------------------------------------

    fn lookup_name(&self, name: &str) -> Option<ObjectId> {
        let candidates = [
            name.to_string(),
            format!("refs/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/heads/{name}"),
        ];
        if let Some(id) = candidates.iter().find_map(|c| self.refs.get(c)) {
            return Some(*id);
        }
        if name.len() < MIN_ABBREV_LEN || !name.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let prefix = name.to_ascii_lowercase();
        let mut matches = self
            .objects
            .keys()
            .filter(|id| id.to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(*id),
            _ => None,
        }
    }

    /// Follow tags until a commit is reached.
    fn peel(&self, revision: &str, mut id: ObjectId) -> Result<ObjectId, StoreError> {
        let original = self.objects.get(&id).map(Object::kind);
        loop {
            match self.objects.get(&id) {
                Some(Object::Commit(_)) => return Ok(id),
                Some(Object::Tag { target, .. }) => id = *target,
                Some(_) | None => {
                    return Err(StoreError::NotACommit {
                        revision: revision.to_string(),
                        kind: original.map(|k| k.to_string()).unwrap_or_else(|| "object".into()),
                    })
                }
            }
        }
    }

    /// Resolve `name`, optionally followed by `~n` and `^n` suffixes.
    fn resolve(&self, revision: &str) -> Result<ObjectId, StoreError> {
        let unknown = || StoreError::UnknownRevision(revision.to_string());
        let split = revision.find(&['~', '^'][..]).unwrap_or(revision.len());
        let (name, mut suffix) = revision.split_at(split);
        if name.is_empty() {
            return Err(unknown());
        }
        let mut id = self.lookup_name(name).ok_or_else(unknown)?;

        while let Some(op) = suffix.chars().next() {
            let rest = &suffix[op.len_utf8()..];
            let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            let n: usize = if digits == 0 {
                1
            } else {
                rest[..digits].parse().map_err(|_| unknown())?
            };
            suffix = &rest[digits..];

            id = self.peel(revision, id)?;
            match (op, n) {
                ('~', _) => {
                    for _ in 0..n {
                        id = *self.commit_record(id)?.parents.first().ok_or_else(unknown)?;
                    }
                }
                ('^', 0) => {}
                ('^', _) => {
                    id = *self.commit_record(id)?.parents.get(n - 1).ok_or_else(unknown)?;
                }
                _ => return Err(unknown()),
            }
        }
        Ok(id)
    }

    // -- merging --------------------------------------------------------------

    fn ancestors(&self, start: ObjectId) -> Result<BTreeSet<ObjectId>, StoreError> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if seen.insert(id) {
                queue.extend(self.commit_record(id)?.parents.iter().copied());
            }
        }
        Ok(seen)
    }

    /// Best common ancestor: not itself an ancestor of another common
    /// ancestor. Ties go to the newest committer timestamp, then lowest id.
    fn merge_base(&self, ours: ObjectId, theirs: ObjectId) -> Result<Option<ObjectId>, StoreError> {
        let ours_ancestors = self.ancestors(ours)?;
        let common: Vec<ObjectId> = self
            .ancestors(theirs)?
            .into_iter()
            .filter(|id| ours_ancestors.contains(id))
            .collect();

        let mut best: Vec<ObjectId> = Vec::new();
        for candidate in &common {
            let mut dominated = false;
            for other in &common {
                if other != candidate && self.ancestors(*other)?.contains(candidate) {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                best.push(*candidate);
            }
        }

        let mut chosen: Option<(i64, ObjectId)> = None;
        for id in best {
            let when = self.commit_record(id)?.committer.when;
            chosen = match chosen {
                Some((w, c)) if w > when || (w == when && c < id) => Some((w, c)),
                _ => Some((when, id)),
            };
        }
        Ok(chosen.map(|(_, id)| id))
    }
}

/// Shared in-memory repository. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    /// Create an empty repository reachable at `path`, with a default identity.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let state = MemoryState {
            objects: BTreeMap::new(),
            refs: BTreeMap::new(),
            identity: Some(("Merge Bot".into(), "merge@example.com".into())),
            clock: CLOCK_START,
            read_only: false,
            fail_commits: false,
            opens: 0,
            releases: 0,
            merges: 0,
        };
        Self { path: path.into(), state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a blob.
    pub fn write_blob(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        self.state().insert(Object::Blob(content.to_vec()))
    }

    /// Store a tree of `(path, content)` files and a commit pointing at it.
    pub fn commit_files(
        &self,
        files: &[(&str, &str)],
        parents: &[ObjectId],
        message: &str,
    ) -> Result<ObjectId, StoreError> {
        let mut state = self.state();
        let mut entries = BTreeMap::new();
        for (path, content) in files {
            let blob = state.insert(Object::Blob(content.as_bytes().to_vec()))?;
            entries.insert((*path).to_string(), blob);
        }
        let tree = state.insert(Object::Tree(entries))?;
        for parent in parents {
            state.commit_record(*parent)?;
        }
        let identity = state.next_identity().unwrap_or_else(|_| Identity {
            name: "Fixture".into(),
            email: "fixture@example.com".into(),
            when: CLOCK_START,
            offset_minutes: 0,
        });
        state.insert(Object::Commit(CommitRecord {
            tree,
            parents: parents.to_vec(),
            author: identity.clone(),
            committer: identity,
            message: message.to_string(),
        }))
    }

    /// Point a reference at `target`. Bare names become branches.
    pub fn set_ref(&self, name: &str, target: ObjectId) {
        let full = if name.starts_with("refs/") {
            name.to_string()
        } else {
            format!("refs/heads/{name}")
        };
        self.state().refs.insert(full, target);
    }

    /// Create an annotated tag object and `refs/tags/<name>`.
    pub fn tag(&self, name: &str, target: ObjectId) -> Result<ObjectId, StoreError> {
        let mut state = self.state();
        let id = state.insert(Object::Tag { target, name: name.to_string() })?;
        state.refs.insert(format!("refs/tags/{name}"), id);
        Ok(id)
    }

    /// Replace the default identity. `None` makes identity lookups fail.
    pub fn set_identity(&self, identity: Option<(&str, &str)>) {
        self.state().identity = identity.map(|(n, e)| (n.to_string(), e.to_string()));
    }

    /// Make every write of a new object fail with [`StoreError::ReadOnly`].
    /// Writing a tree that is already stored still succeeds.
    pub fn set_read_only(&self, read_only: bool) {
        self.state().read_only = read_only;
    }

    /// Make commit creation fail while trees can still be written.
    pub fn set_fail_commits(&self, fail: bool) {
        self.state().fail_commits = fail;
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn commit_count(&self) -> usize {
        self.state().objects.values().filter(|o| matches!(o, Object::Commit(_))).count()
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn release_count(&self) -> usize {
        self.state().releases
    }

    pub fn merge_count(&self) -> usize {
        self.state().merges
    }

    /// Look up a commit by id.
    pub fn find_commit(&self, id: ObjectId) -> Option<ResolvedCommit> {
        self.state().resolved(id).ok()
    }

    /// Identity recorded as committer of `id`.
    pub fn committer(&self, id: ObjectId) -> Option<Identity> {
        self.state().commit_record(id).ok().map(|r| r.committer.clone())
    }

    /// Files of a tree as `path -> content`.
    pub fn tree_files(&self, tree: ObjectId) -> Option<BTreeMap<String, String>> {
        let state = self.state();
        let entries = state.tree_entries(tree).ok()?;
        let mut files = BTreeMap::new();
        for (path, blob) in entries {
            match state.objects.get(blob) {
                Some(Object::Blob(content)) => {
                    files.insert(path.clone(), String::from_utf8_lossy(content).into_owned());
                }
                _ => return None,
            }
        }
        Some(files)
    }
}

impl StoreOpener for MemoryRepository {
    type Store = MemoryStore;

    fn open(&self, path: &Path) -> Result<MemoryStore, StoreError> {
        if path != self.path {
            return Err(StoreError::RepositoryNotFound(path.display().to_string()));
        }
        self.state().opens += 1;
        info!(path = %path.display(), "opened in-memory repository");
        Ok(MemoryStore { repo: self.clone() })
    }
}

/// Open handle on a [`MemoryRepository`]. Dropping it counts a release.
#[derive(Debug)]
pub struct MemoryStore {
    repo: MemoryRepository,
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.repo.state().releases += 1;
        debug!(path = %self.repo.path.display(), "released in-memory repository");
    }
}

/// A conflicted path: its blob in the base, ours and theirs (`None` = absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    pub path: String,
    pub ancestor: Option<ObjectId>,
    pub ours: Option<ObjectId>,
    pub theirs: Option<ObjectId>,
}

/// Merge index produced by [`MemoryStore::merge_commits`].
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    entries: BTreeMap<String, ObjectId>,
    conflicts: Vec<PathConflict>,
}

impl MemoryIndex {
    /// Cleanly merged entries.
    pub fn entries(&self) -> &BTreeMap<String, ObjectId> {
        &self.entries
    }

    pub fn conflicts(&self) -> &[PathConflict] {
        &self.conflicts
    }
}

impl MergeIndex for MemoryIndex {
    fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, StoreError> {
        let paths: BTreeSet<String> = self.conflicts.iter().map(|c| c.path.clone()).collect();
        Ok(paths.into_iter().collect())
    }
}

impl ObjectStore for MemoryStore {
    type Index = MemoryIndex;

    fn resolve_commit(&self, revision: &str) -> Result<ResolvedCommit, StoreError> {
        let state = self.repo.state();
        let id = state.resolve(revision)?;
        let id = state.peel(revision, id)?;
        state.resolved(id)
    }

    fn merge_commits(
        &self,
        ours: &ResolvedCommit,
        theirs: &ResolvedCommit,
        settings: &MergeSettings,
    ) -> Result<MemoryIndex, StoreError> {
        let mut state = self.repo.state();
        state.merges += 1;
        if settings.find_renames {
            debug!("rename detection is not modelled by the in-memory store");
        }

        let base = state
            .merge_base(ours.id, theirs.id)?
            .ok_or(StoreError::NoMergeBase { ours: ours.id, theirs: theirs.id })?;
        debug!(base = %base.short(), "computed merge base");

        let base_tree = state.tree_entries(state.commit_record(base)?.tree)?;
        let ours_tree = state.tree_entries(ours.tree_id)?;
        let theirs_tree = state.tree_entries(theirs.tree_id)?;

        let paths: BTreeSet<&String> =
            base_tree.keys().chain(ours_tree.keys()).chain(theirs_tree.keys()).collect();

        let mut index = MemoryIndex::default();
        for path in paths {
            let ancestor = base_tree.get(path).copied();
            let o = ours_tree.get(path).copied();
            let t = theirs_tree.get(path).copied();
            let merged = if o == t {
                o
            } else if o == ancestor {
                t
            } else if t == ancestor {
                o
            } else {
                index.conflicts.push(PathConflict {
                    path: path.clone(),
                    ancestor,
                    ours: o,
                    theirs: t,
                });
                continue;
            };
            if let Some(blob) = merged {
                index.entries.insert(path.clone(), blob);
            }
        }
        Ok(index)
    }

    fn write_tree(&self, index: &mut MemoryIndex) -> Result<ObjectId, StoreError> {
        if index.has_conflicts() {
            return Err(StoreError::UnmergedIndex);
        }
        let tree = Object::Tree(index.entries.clone());
        let id = ObjectId::hash(tree.kind(), &tree.encode())?;
        let mut state = self.repo.state();
        if state.objects.contains_key(&id) {
            debug!(tree = %id.short(), "tree already stored");
            return Ok(id);
        }
        if state.read_only {
            return Err(StoreError::ReadOnly);
        }
        state.insert(tree)
    }

    fn default_identity(&self) -> Result<Identity, StoreError> {
        self.repo.state().next_identity()
    }

    fn create_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        message: &str,
        tree: ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId, StoreError> {
        let mut state = self.repo.state();
        if state.read_only {
            return Err(StoreError::ReadOnly);
        }
        if state.fail_commits {
            return Err(StoreError::Corrupt("commit object could not be written".into()));
        }
        state.tree_entries(tree)?;
        for parent in parents {
            state.commit_record(*parent)?;
        }
        let id = state.insert(Object::Commit(CommitRecord {
            tree,
            parents: parents.to_vec(),
            author: author.clone(),
            committer: committer.clone(),
            message: message.to_string(),
        }))?;
        info!(sha = %id, "created commit");
        Ok(id)
    }
}
