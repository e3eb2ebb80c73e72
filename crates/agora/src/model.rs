//! Entities handed to and returned from the engine.
//!
//! Field names serialize with the names the HTTP layer exposes (`isEdited`,
//! `created`, `nickname`), so responses can be emitted without a mapping step.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatusCode;

/// Store-assigned post id. Monotonic with insertion.
pub type PostId = i64;

/// Store-assigned thread id.
pub type ThreadId = i64;

/// Parent id meaning "no parent".
pub const ROOT_PARENT: PostId = 0;

/// Current time at the precision `TIMESTAMPTZ` keeps (microseconds), so a
/// value handed back from a create compares equal to the one read later.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A materialized path: ids of every ancestor from the root down, ending with
/// the post's own id.
///
/// Ordering is lexicographic over the ids, the same order Postgres uses for
/// `BIGINT[]`, so a post sorts immediately before its whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PostId>);

impl Path {
    /// Path of a root post.
    pub fn root(id: PostId) -> Self {
        Path(vec![id])
    }

    /// Path of a direct child of this path's post.
    pub fn child(&self, id: PostId) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        Path(ids)
    }

    /// Id of the root post this path descends from.
    pub fn root_id(&self) -> Option<PostId> {
        self.0.first().copied()
    }

    /// Id of the post this path belongs to.
    pub fn leaf_id(&self) -> Option<PostId> {
        self.0.last().copied()
    }

    /// Number of ids in the path; 1 for a root post.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `ancestor` is a prefix of this path (a path is its own ancestor).
    pub fn descends_from(&self, ancestor: &Path) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    pub fn as_slice(&self) -> &[PostId] {
        &self.0
    }
}

impl From<Vec<PostId>> for Path {
    fn from(ids: Vec<PostId>) -> Self {
        Path(ids)
    }
}

impl From<Path> for Vec<PostId> {
    fn from(path: Path) -> Self {
        path.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

/// A post as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub parent: PostId,
    pub author: String,
    pub forum: String,
    pub thread: ThreadId,
    pub message: String,
    pub is_edited: bool,
    pub created: DateTime<Utc>,
    #[serde(skip)]
    pub path: Path,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.parent == ROOT_PARENT
    }
}

/// One element of a post batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub parent: PostId,
    pub author: String,
    pub message: String,
}

impl NewPost {
    pub fn new(parent: PostId, author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parent,
            author: author.into(),
            message: message.into(),
        }
    }

    /// A reply at the top level of the thread.
    pub fn root(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ROOT_PARENT, author, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub title: String,
    pub author: String,
    pub forum: String,
    pub message: String,
    pub votes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewThread {
    pub title: String,
    pub author: String,
    pub forum: String,
    pub message: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl NewThread {
    pub fn new(
        forum: impl Into<String>,
        author: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            forum: forum.into(),
            message: message.into(),
            slug: None,
            created: None,
        }
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// The slug to store: empty slugs are stored as absent.
    pub fn stored_slug(&self) -> Option<&str> {
        self.slug.as_deref().filter(|s| !s.is_empty())
    }
}

/// Partial thread edit. Empty strings leave the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ThreadUpdate {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|s| !s.is_empty())
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.title().is_none() && self.message().is_none()
    }
}

/// A thread reference as it arrives from a URL: numeric id or slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadRef {
    Id(ThreadId),
    Slug(String),
}

impl FromStr for ThreadRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<ThreadId>() {
            Ok(id) => ThreadRef::Id(id),
            Err(_) => ThreadRef::Slug(s.to_owned()),
        })
    }
}

impl From<ThreadId> for ThreadRef {
    fn from(id: ThreadId) -> Self {
        ThreadRef::Id(id)
    }
}

impl From<&str> for ThreadRef {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(r) => r,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadRef::Id(id) => write!(f, "{id}"),
            ThreadRef::Slug(slug) => f.write_str(slug),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub slug: String,
    pub title: String,
    pub user: String,
    pub threads: i64,
    pub posts: i64,
}

/// Input of forum creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewForum {
    pub slug: String,
    pub title: String,
    pub user: String,
}

impl NewForum {
    pub fn new(slug: impl Into<String>, title: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    pub fullname: String,
    pub email: String,
    pub about: String,
}

impl User {
    pub fn new(nickname: impl Into<String>, email: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            fullname: nickname.clone(),
            nickname,
            email: email.into(),
            about: String::new(),
        }
    }
}

/// Which related records to attach to a post lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Related {
    pub user: bool,
    pub forum: bool,
    pub thread: bool,
}

impl Related {
    pub fn none() -> Self {
        Self::default()
    }
}

impl FromStr for Related {
    type Err = std::convert::Infallible;

    /// Parses the comma separated `related` query value; unknown names are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut related = Related::none();
        for part in s.split(',').map(str::trim) {
            match part {
                "user" => related.user = true,
                "forum" => related.forum = true,
                "thread" => related.thread = true,
                _ => {}
            }
        }
        Ok(related)
    }
}

/// A post with the records requested through [`Related`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetails {
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum: Option<Forum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
}

/// Outcome of a create that tolerates duplicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<T> {
    /// A new row was written.
    Created(T),
    /// A row with the same unique key already existed; it is returned as is.
    Existing(T),
}

impl<T> Insert<T> {
    pub fn status(&self) -> StatusCode {
        match self {
            Insert::Created(_) => StatusCode::Ok,
            Insert::Existing(_) => StatusCode::Conflict,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Insert::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Insert::Created(t) | Insert::Existing(t) => t,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Insert::Created(t) | Insert::Existing(t) => t,
        }
    }
}
