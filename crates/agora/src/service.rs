//! The service the request layer calls.
//!
//! [`Agora`] resolves references, plans listings, validates raw request
//! values and keeps the [`Metrics`] counters. Storage is delegated to a
//! [`Store`].
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let agora = Agora::from_config(&config)?;
//! agora.migrate().await?;
//! let page = agora
//!     .thread_posts(&PostsRequest::new("rust-2024").sort(SortMode::Tree).limit(20))
//!     .await?;
//! ```

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, Status};
use crate::model::{
    Forum, Insert, NewForum, NewPost, NewThread, Post, PostDetails, PostId, Related, Thread,
    ThreadRef, ThreadUpdate, User,
};
use crate::plan::{ForumThreadsRequest, Page, Planner, PostsRequest};
use crate::store::{PgStore, Store};
use crate::vote::Voice;

pub struct Agora<S> {
    store: S,
    planner: Planner,
    metrics: Metrics,
}

impl Agora<PgStore> {
    /// Postgres-backed service configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = PgStore::connect(config)?;
        Ok(Self::new(store).with_planner(Planner::new(config.default_limit)))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<Vec<&'static str>> {
        let applied = self.store.migrate().await;
        log_outcome("migrate", applied)
    }
}

impl<S: Store> Agora<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            planner: Planner::default(),
            metrics: Metrics::new(),
        }
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Share counters with another owner, such as a status endpoint.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn create_user(&self, user: User) -> Result<Insert<User>> {
        tracing::debug!(nickname = %user.nickname, "create_user");
        let inserted = log_outcome("create_user", self.store.create_user(user).await)?;
        if inserted.is_created() {
            self.metrics.record_user();
        } else {
            tracing::debug!(nickname = %inserted.get().nickname, "user already exists");
        }
        Ok(inserted)
    }

    pub async fn get_user(&self, nickname: &str) -> Result<User> {
        log_outcome("get_user", self.store.get_user(nickname).await)
    }

    pub async fn create_forum(&self, forum: NewForum) -> Result<Insert<Forum>> {
        tracing::debug!(slug = %forum.slug, user = %forum.user, "create_forum");
        let inserted = log_outcome("create_forum", self.store.create_forum(forum).await)?;
        if inserted.is_created() {
            self.metrics.record_forum();
        } else {
            tracing::debug!(slug = %inserted.get().slug, "forum already exists");
        }
        Ok(inserted)
    }

    pub async fn get_forum(&self, slug: &str) -> Result<Forum> {
        log_outcome("get_forum", self.store.get_forum(slug).await)
    }

    pub async fn create_thread(&self, thread: NewThread) -> Result<Insert<Thread>> {
        tracing::debug!(forum = %thread.forum, slug = ?thread.slug, "create_thread");
        let inserted = log_outcome("create_thread", self.store.create_thread(thread).await)?;
        if inserted.is_created() {
            self.metrics.record_thread();
        } else {
            tracing::debug!(id = inserted.get().id, "thread slug already taken");
        }
        Ok(inserted)
    }

    pub async fn get_thread(&self, thread: &ThreadRef) -> Result<Thread> {
        log_outcome("get_thread", self.store.get_thread(thread).await)
    }

    pub async fn update_thread(&self, thread: &ThreadRef, update: &ThreadUpdate) -> Result<Thread> {
        tracing::debug!(%thread, "update_thread");
        log_outcome(
            "update_thread",
            self.store.update_thread(thread, update).await,
        )
    }

    /// Threads of a forum; the configured default limit applies when the
    /// request has none.
    pub async fn forum_threads(&self, req: &ForumThreadsRequest) -> Result<Vec<Thread>> {
        let limit = req.limit.unwrap_or(self.planner.default_limit());
        log_outcome(
            "forum_threads",
            self.store.forum_threads(req, limit).await,
        )
    }

    /// Insert a batch of posts into one thread. Either every post is
    /// created or none is.
    pub async fn create_posts(&self, thread: &ThreadRef, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        tracing::debug!(%thread, count = posts.len(), "create_posts");
        let created = log_outcome("create_posts", self.store.create_posts(thread, posts).await)?;
        self.metrics.record_posts(created.len() as u64);
        Ok(created)
    }

    /// A post with the related records asked for.
    pub async fn get_post(&self, id: PostId, related: Related) -> Result<PostDetails> {
        let details = async {
            let post = self.store.get_post(id).await?;
            let author = if related.user {
                Some(self.store.get_user(&post.author).await?)
            } else {
                None
            };
            let forum = if related.forum {
                Some(self.store.get_forum(&post.forum).await?)
            } else {
                None
            };
            let thread = if related.thread {
                Some(self.store.get_thread(&ThreadRef::Id(post.thread)).await?)
            } else {
                None
            };
            Ok::<_, Error>(PostDetails {
                post,
                author,
                forum,
                thread,
            })
        };
        log_outcome("get_post", details.await)
    }

    /// Replace a post's message. `None`, empty or unchanged leaves it as is.
    pub async fn update_post(&self, id: PostId, message: Option<&str>) -> Result<Post> {
        tracing::debug!(id, "update_post");
        log_outcome("update_post", self.store.update_post(id, message).await)
    }

    /// One page of a thread's posts.
    pub async fn thread_posts(&self, req: &PostsRequest) -> Result<Page> {
        let page = async {
            let thread = self.store.get_thread(&req.thread).await?;
            let query = self.planner.plan(req, thread.id)?;
            let posts = self.store.thread_posts(&query).await?;
            tracing::debug!(
                thread = thread.id,
                sort = %req.sort,
                desc = req.desc,
                rows = posts.len(),
                "thread_posts"
            );
            Ok::<_, Error>(Page::new(posts, req.sort))
        };
        log_outcome("thread_posts", page.await)
    }

    /// Cast or change `nickname`'s vote; `voice` must be -1 or 1.
    pub async fn vote(&self, thread: &ThreadRef, nickname: &str, voice: i32) -> Result<Thread> {
        let voted = async {
            let voice = Voice::try_from(voice)?;
            tracing::debug!(%thread, nickname, voice = voice.value(), "vote");
            self.store.vote(thread, nickname, voice).await
        };
        log_outcome("vote", voted.await)
    }

    /// Counters since start or the last [`Agora::clear`].
    pub fn status(&self) -> Status {
        self.metrics.status()
    }

    /// Remove every record and zero the counters.
    pub async fn clear(&self) -> Result<()> {
        log_outcome("clear", self.store.clear().await)?;
        self.metrics.reset();
        tracing::info!("store cleared");
        Ok(())
    }
}

fn log_outcome<T>(op: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        log_error(op, err);
    }
    result
}

fn log_error(op: &'static str, err: &Error) {
    if err.is_internal() {
        tracing::error!(op, error = %err, "operation failed");
    } else {
        tracing::debug!(op, status = %err.status(), error = %err, "request rejected");
    }
}
