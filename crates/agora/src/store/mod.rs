//! Storage backends.
//!
//! Both backends enforce the same invariants and execute the same planned
//! [`PostQuery`], so every behavior test written against [`MemoryStore`]
//! holds against [`PgStore`] too.

use std::future::Future;

use crate::error::Result;
use crate::model::{
    Forum, Insert, NewForum, NewPost, NewThread, Post, PostId, Thread, ThreadRef, ThreadUpdate,
    User,
};
use crate::plan::{ForumThreadsRequest, PostQuery};
use crate::vote::Voice;

mod memory;
mod pg;
pub mod sql;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub(crate) use pg::get;

/// Persistence for users, forums, threads, posts and votes.
///
/// Writes that touch several rows (a post batch, a vote and the score it
/// changes) are atomic: on error nothing is written.
pub trait Store: Send + Sync {
    /// Register a user. A taken nickname or email returns the existing user.
    fn create_user(&self, user: User) -> impl Future<Output = Result<Insert<User>>> + Send;

    fn get_user(&self, nickname: &str) -> impl Future<Output = Result<User>> + Send;

    /// Register a forum owned by an existing user.
    fn create_forum(&self, forum: NewForum) -> impl Future<Output = Result<Insert<Forum>>> + Send;

    fn get_forum(&self, slug: &str) -> impl Future<Output = Result<Forum>> + Send;

    /// Create a thread. A taken slug returns the thread that holds it.
    fn create_thread(
        &self,
        thread: NewThread,
    ) -> impl Future<Output = Result<Insert<Thread>>> + Send;

    fn get_thread(&self, thread: &ThreadRef) -> impl Future<Output = Result<Thread>> + Send;

    /// Apply the non-empty fields of `update`.
    fn update_thread(
        &self,
        thread: &ThreadRef,
        update: &ThreadUpdate,
    ) -> impl Future<Output = Result<Thread>> + Send;

    /// Threads of a forum by creation time.
    fn forum_threads(
        &self,
        req: &ForumThreadsRequest,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Thread>>> + Send;

    /// Insert a batch of posts into one thread, all or nothing.
    fn create_posts(
        &self,
        thread: &ThreadRef,
        posts: Vec<NewPost>,
    ) -> impl Future<Output = Result<Vec<Post>>> + Send;

    fn get_post(&self, id: PostId) -> impl Future<Output = Result<Post>> + Send;

    /// Replace a post's message. An absent, empty or unchanged message leaves
    /// the post untouched.
    fn update_post(
        &self,
        id: PostId,
        message: Option<&str>,
    ) -> impl Future<Output = Result<Post>> + Send;

    /// Execute a planned listing.
    fn thread_posts(&self, query: &PostQuery) -> impl Future<Output = Result<Vec<Post>>> + Send;

    /// Record `nickname`'s vote on a thread and return the rescored thread.
    fn vote(
        &self,
        thread: &ThreadRef,
        nickname: &str,
        voice: Voice,
    ) -> impl Future<Output = Result<Thread>> + Send;

    /// Remove everything.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}
