//! Materialized path allocation.
//!
//! A post's path is fixed when it is created: `[id]` for a root post,
//! `parent.path + [id]` for a reply. Both stores run allocation inside the
//! same critical section (transaction or table lock) that assigns ids and
//! inserts rows, so two posts never end up with colliding paths.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::Error;
use crate::model::{NewPost, Path, PostId, ROOT_PARENT, ThreadId};

/// The parent facts path allocation depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRow {
    pub id: PostId,
    pub thread: ThreadId,
    pub path: Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("parent post {parent} belongs to thread {parent_thread}, not thread {thread}")]
    ParentMismatch {
        parent: PostId,
        parent_thread: ThreadId,
        thread: ThreadId,
    },
}

/// Compute the path of a new post with id `id` in `thread`.
///
/// `parent` is `None` for a root post. A parent from another thread is
/// rejected; a parent that does not exist at all must be rejected by the
/// caller before getting here.
pub fn allocate(
    parent: Option<&ParentRow>,
    thread: ThreadId,
    id: PostId,
) -> Result<Path, PathError> {
    match parent {
        None => Ok(Path::root(id)),
        Some(parent) if parent.thread != thread => Err(PathError::ParentMismatch {
            parent: parent.id,
            parent_thread: parent.thread,
            thread,
        }),
        Some(parent) => Ok(parent.path.child(id)),
    }
}

/// Distinct non-root parent ids referenced by a batch, in first-seen order.
pub fn parent_ids(posts: &[NewPost]) -> Vec<PostId> {
    let mut ids: Vec<PostId> = Vec::new();
    for post in posts {
        if post.parent != ROOT_PARENT && !ids.contains(&post.parent) {
            ids.push(post.parent);
        }
    }
    ids
}

/// Validate every parent of a batch before anything is written.
///
/// `parents` holds the rows found for [`parent_ids`]; any id missing from it
/// does not exist.
pub fn check_parents(
    posts: &[NewPost],
    parents: &HashMap<PostId, ParentRow>,
    thread: ThreadId,
) -> Result<(), Error> {
    for post in posts {
        if post.parent == ROOT_PARENT {
            continue;
        }
        let parent = parents.get(&post.parent).ok_or(Error::MissingParent {
            parent: post.parent,
            thread,
        })?;
        if parent.thread != thread {
            return Err(PathError::ParentMismatch {
                parent: parent.id,
                parent_thread: parent.thread,
                thread,
            }
            .into());
        }
    }
    Ok(())
}

/// Allocate paths for a whole batch, one id per post in order.
///
/// Fails without producing any path if a single parent is invalid.
pub fn allocate_batch(
    posts: &[NewPost],
    parents: &HashMap<PostId, ParentRow>,
    thread: ThreadId,
    ids: &[PostId],
) -> Result<Vec<Path>, Error> {
    debug_assert_eq!(posts.len(), ids.len());
    check_parents(posts, parents, thread)?;
    posts
        .iter()
        .zip(ids)
        .map(|(post, &id)| {
            let parent = match post.parent {
                ROOT_PARENT => None,
                parent => parents.get(&parent),
            };
            allocate(parent, thread, id).map_err(Error::from)
        })
        .collect()
}
