//! Domain model types shared by the merge pipeline and the stores.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use git2::{ObjectType, Oid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Object identifiers
// ---------------------------------------------------------------------------

/// Content-derived identifier of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Oid);

impl ObjectId {
    /// Hash `bytes` as an object of the given kind, the way git does.
    pub fn hash(kind: ObjectKind, bytes: &[u8]) -> Result<Self, git2::Error> {
        Oid::hash_object(kind.into(), bytes).map(Self)
    }

    pub fn as_oid(&self) -> Oid {
        self.0
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> String {
        let mut hex = self.0.to_string();
        hex.truncate(7);
        hex
    }
}

impl From<Oid> for ObjectId {
    fn from(oid: Oid) -> Self {
        Self(oid)
    }
}

impl From<ObjectId> for Oid {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = git2::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::from_str(s).map(Self)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl From<ObjectKind> for ObjectType {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Blob => ObjectType::Blob,
            ObjectKind::Tree => ObjectType::Tree,
            ObjectKind::Commit => ObjectType::Commit,
            ObjectKind::Tag => ObjectType::Tag,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

// ---------------------------------------------------------------------------
// Commits and identities
// ---------------------------------------------------------------------------

/// A commit looked up from a revision string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub id: ObjectId,
    pub tree_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub summary: String,
}

/// Author/committer identity used to stamp new commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub when: i64,
    /// Offset from UTC in minutes.
    pub offset_minutes: i32,
}

impl Identity {
    /// The identity's timestamp in its own offset, if representable.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)?;
        DateTime::from_timestamp(self.when, 0).map(|utc| utc.with_timezone(&offset))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Which input of the merge a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ours,
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// States of a single merge invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Start,
    RepositoryOpened,
    OursResolved,
    TheirsResolved,
    Merged,
    Conflicted,
    TreeWritten,
    CommitCreated,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::RepositoryOpened => write!(f, "repository_opened"),
            Self::OursResolved => write!(f, "ours_resolved"),
            Self::TheirsResolved => write!(f, "theirs_resolved"),
            Self::Merged => write!(f, "merged"),
            Self::Conflicted => write!(f, "conflicted"),
            Self::TreeWritten => write!(f, "tree_written"),
            Self::CommitCreated => write!(f, "commit_created"),
        }
    }
}

/// Pipeline stage that a [`MergeError`](crate::errors::MergeError) failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    OpenRepository,
    ResolveOurs,
    ResolveTheirs,
    Merge,
    WriteTree,
    Identity,
    CreateCommit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenRepository => write!(f, "open_repository"),
            Self::ResolveOurs => write!(f, "resolve_ours"),
            Self::ResolveTheirs => write!(f, "resolve_theirs"),
            Self::Merge => write!(f, "merge"),
            Self::WriteTree => write!(f, "write_tree"),
            Self::Identity => write!(f, "identity"),
            Self::CreateCommit => write!(f, "create_commit"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Inputs of one merge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub repo_path: PathBuf,
    pub ours: String,
    pub theirs: String,
    pub message: String,
}

impl MergeRequest {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            ours: ours.into(),
            theirs: theirs.into(),
            message: message.into(),
        }
    }
}

/// A merge commit written to the store. Its parents are `[ours, theirs]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedCommit {
    pub commit: ObjectId,
    pub tree: ObjectId,
    pub ours: ObjectId,
    pub theirs: ObjectId,
    pub ours_ref: String,
    pub theirs_ref: String,
}

impl MergedCommit {
    pub fn parents(&self) -> [ObjectId; 2] {
        [self.ours, self.theirs]
    }
}

/// A merge that could not be automated. Nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub ours: ObjectId,
    pub theirs: ObjectId,
    pub ours_ref: String,
    pub theirs_ref: String,
    /// Conflicted paths, sorted and deduplicated.
    pub paths: Vec<String>,
}

/// Terminal result of a merge invocation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged(MergedCommit),
    Conflicted(ConflictReport),
}

impl MergeOutcome {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted(_))
    }

    /// The new commit's id, if one was created.
    pub fn commit_id(&self) -> Option<ObjectId> {
        match self {
            Self::Merged(merged) => Some(merged.commit),
            Self::Conflicted(_) => None,
        }
    }
}
