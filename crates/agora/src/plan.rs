//! Query planning for thread post listings.
//!
//! Every sort mode is turned into the same [`PostQuery`] shape: a list of
//! predicates, a list of order keys, a limit and (for parent_tree) a root
//! selection. Stores execute that shape; none of them branch on the mode.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::model::{Path, Post, PostId, ThreadId, ThreadRef};

/// Page size used when a request does not name one.
pub const DEFAULT_LIMIT: u32 = 100;

/// Traversal order of a post listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    /// Creation order.
    #[default]
    Flat,
    /// Depth-first by materialized path.
    Tree,
    /// Depth-first, paginated by root posts.
    ParentTree,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Flat => "flat",
            SortMode::Tree => "tree",
            SortMode::ParentTree => "parent_tree",
        }
    }
}

impl FromStr for SortMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(SortMode::Flat),
            "tree" => Ok(SortMode::Tree),
            "parent_tree" => Ok(SortMode::ParentTree),
            other => Err(Error::InvalidSort(other.to_owned())),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to list a thread's posts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostsRequest {
    pub thread: ThreadRef,
    pub sort: SortMode,
    pub since: Option<Cursor>,
    /// `None` uses the configured default.
    pub limit: Option<u32>,
    pub desc: bool,
}

impl PostsRequest {
    pub fn new(thread: impl Into<ThreadRef>) -> Self {
        Self {
            thread: thread.into(),
            sort: SortMode::Flat,
            since: None,
            limit: None,
            desc: false,
        }
    }

    pub fn sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn since(mut self, cursor: Cursor) -> Self {
        self.since = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }
}

/// Where a path comparison gets its right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathBound {
    Literal(Path),
    /// The path of this post, looked up by the store. An unknown post bounds
    /// nothing in, so the page comes back empty.
    OfPost(PostId),
}

/// One filter condition. All predicates of a query must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    IdAfter(PostId),
    IdBefore(PostId),
    PathAfter(PathBound),
    PathBefore(PathBound),
}

/// A sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKey {
    Created,
    Id,
    Path,
    /// The root post id, `path[1]`.
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub key: OrderKey,
    pub desc: bool,
}

impl Order {
    pub fn new(key: OrderKey, desc: bool) -> Self {
        Self { key, desc }
    }

    pub fn asc(key: OrderKey) -> Self {
        Self::new(key, false)
    }

    /// Compare two posts on this key alone.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let ord = match self.key {
            OrderKey::Created => a.created.cmp(&b.created),
            OrderKey::Id => a.id.cmp(&b.id),
            OrderKey::Path => a.path.cmp(&b.path),
            OrderKey::Root => a.path.root_id().cmp(&b.path.root_id()),
        };
        if self.desc { ord.reverse() } else { ord }
    }
}

/// Compare two posts on a whole list of order keys.
pub fn compare_posts(order: &[Order], a: &Post, b: &Post) -> Ordering {
    order
        .iter()
        .map(|o| o.compare(a, b))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Page of root posts that parent_tree expands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSelection {
    /// Roots strictly past the root of this post are selected.
    pub after: Option<PostId>,
    pub desc: bool,
    pub limit: u32,
}

/// A planned post listing, independent of the store executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub thread: ThreadId,
    pub filter: Vec<Predicate>,
    pub order: Vec<Order>,
    pub limit: Option<u32>,
    /// When set, only posts under the selected roots are returned and
    /// `limit` counts roots, not posts.
    pub roots: Option<RootSelection>,
}

/// Turns requests into [`PostQuery`] values.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    default_limit: u32,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

impl Planner {
    pub fn new(default_limit: u32) -> Self {
        Self { default_limit }
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    /// Plan a listing of `thread`, already resolved from `req.thread`.
    pub fn plan(&self, req: &PostsRequest, thread: ThreadId) -> Result<PostQuery> {
        let limit = req.limit.unwrap_or(self.default_limit);
        let since = req.since.as_ref().filter(|c| !c.is_start());
        let desc = req.desc;

        let wrong_kind = |cursor: &Cursor| Error::InvalidCursor {
            cursor: cursor.to_string(),
            mode: req.sort.as_str(),
        };

        let mut query = PostQuery {
            thread,
            filter: Vec::new(),
            order: Vec::new(),
            limit: Some(limit),
            roots: None,
        };

        match req.sort {
            SortMode::Flat => {
                if let Some(cursor) = since {
                    let Cursor::Post(id) = cursor else {
                        return Err(wrong_kind(cursor));
                    };
                    query.filter.push(if desc {
                        Predicate::IdBefore(*id)
                    } else {
                        Predicate::IdAfter(*id)
                    });
                }
                query.order = vec![
                    Order::new(OrderKey::Created, desc),
                    Order::new(OrderKey::Id, desc),
                ];
            }
            SortMode::Tree => {
                if let Some(cursor) = since {
                    let bound = match cursor {
                        Cursor::Post(id) => PathBound::OfPost(*id),
                        Cursor::Path(path) => PathBound::Literal(path.clone()),
                    };
                    query.filter.push(if desc {
                        Predicate::PathBefore(bound)
                    } else {
                        Predicate::PathAfter(bound)
                    });
                }
                query.order = vec![Order::new(OrderKey::Path, desc)];
            }
            SortMode::ParentTree => {
                let after = match since {
                    None => None,
                    Some(Cursor::Post(id)) => Some(*id),
                    Some(cursor) => return Err(wrong_kind(cursor)),
                };
                query.roots = Some(RootSelection { after, desc, limit });
                query.limit = None;
                query.order = vec![
                    Order::new(OrderKey::Root, desc),
                    Order::asc(OrderKey::Path),
                ];
            }
        }

        Ok(query)
    }
}

/// One page of a post listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub posts: Vec<Post>,
    /// Pass back as `since` to get the following page.
    pub next_cursor: Option<Cursor>,
}

impl Page {
    pub fn new(posts: Vec<Post>, sort: SortMode) -> Self {
        let next_cursor = posts.last().map(|last| match sort {
            SortMode::Flat => Cursor::Post(last.id),
            SortMode::Tree => Cursor::Path(last.path.clone()),
            SortMode::ParentTree => Cursor::Post(last.path.root_id().unwrap_or(last.id)),
        });
        Self { posts, next_cursor }
    }
}

/// A request to list a forum's threads by creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForumThreadsRequest {
    pub forum: String,
    /// Inclusive bound: `created >= since` ascending, `created <= since`
    /// descending.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub desc: bool,
}

impl ForumThreadsRequest {
    pub fn new(forum: impl Into<String>) -> Self {
        Self {
            forum: forum.into(),
            since: None,
            limit: None,
            desc: false,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }
}
