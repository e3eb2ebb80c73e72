//! Post-hierarchy engine for a forum backend.
//!
//! Threads hold posts arranged as a reply tree. Every post stores its
//! materialized path (the ids from its root down to itself), fixed at
//! creation, so any traversal order is an index scan:
//!
//! - `flat`: creation order, paged by post id
//! - `tree`: depth-first pre-order, paged by path
//! - `parent_tree`: whole root subtrees, paged by root id
//!
//! # Naming Convention
//!
//! **Table names use singular form** (`post`, `thread`, `vote`). Users live
//! in `person` because `user` is reserved.
//!
//! # Stores
//!
//! [`Agora`] runs over any [`Store`]. [`PgStore`] is the production backend;
//! [`MemoryStore`] keeps everything in process and is what most tests use.
//!
//! ```ignore
//! let agora = Agora::new(MemoryStore::new());
//! agora.create_user(User::new("alice", "alice@example.com")).await?;
//! agora.create_forum(NewForum::new("rust", "Rust", "alice")).await?;
//! let thread = agora
//!     .create_thread(NewThread::new("rust", "alice", "Lifetimes", "...").slug("lifetimes"))
//!     .await?
//!     .into_inner();
//! agora
//!     .create_posts(&thread.id.into(), vec![NewPost::root("alice", "first")])
//!     .await?;
//! ```

pub mod config;
pub mod cursor;
mod error;
pub mod metrics;
pub mod model;
pub mod path;
pub mod plan;
pub mod schema;
mod service;
pub mod store;
mod traced;
pub mod value;
pub mod vote;

pub use config::{Config, ConfigError};
pub use cursor::Cursor;
pub use error::{Error, Result, StatusCode};
pub use metrics::{Metrics, Status};
pub use model::{
    Forum, Insert, NewForum, NewPost, NewThread, Path, Post, PostDetails, PostId, Related, Thread,
    ThreadId, ThreadRef, ThreadUpdate, User,
};
pub use path::{ParentRow, PathError};
pub use plan::{ForumThreadsRequest, Page, Planner, PostQuery, PostsRequest, SortMode};
pub use schema::{MigrationRunner, MigrationStatus};
pub use service::Agora;
pub use store::{MemoryStore, PgStore, Store};
pub use traced::{TracedObject, TracedPool, TracedTransaction};
pub use vote::Voice;
