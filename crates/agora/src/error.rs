use thiserror::Error;

use crate::model::{PostId, ThreadId, ThreadRef};
use crate::path::PathError;

/// Outcome class reported to the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    NotFound,
    Conflict,
    InvalidArgument,
    Internal,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::NotFound => "not-found",
            StatusCode::Conflict => "conflict",
            StatusCode::InvalidArgument => "invalid-argument",
            StatusCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadRef),

    #[error("post {0} not found")]
    PostNotFound(PostId),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("forum not found: {0}")]
    ForumNotFound(String),

    #[error("parent post {parent} does not exist in thread {thread}")]
    MissingParent { parent: PostId, thread: ThreadId },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("unrecognized sort mode: {0:?}")]
    InvalidSort(String),

    #[error("cursor {cursor} cannot page a {mode} listing")]
    InvalidCursor { cursor: String, mode: &'static str },

    #[error("invalid cursor: {0:?}")]
    MalformedCursor(String),

    #[error("vote voice must be -1 or 1, got {0}")]
    InvalidVoice(i32),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("cannot read {table}.{column}: {message}")]
    Decode {
        table: &'static str,
        column: &'static str,
        message: String,
    },

    #[error("statement references unbound parameter ${0}")]
    UnboundParam(String),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Classify this error for the request layer.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ThreadNotFound(_)
            | Error::PostNotFound(_)
            | Error::UserNotFound(_)
            | Error::ForumNotFound(_) => StatusCode::NotFound,
            Error::MissingParent { .. } | Error::Path(_) => StatusCode::Conflict,
            Error::InvalidSort(_)
            | Error::InvalidCursor { .. }
            | Error::MalformedCursor(_)
            | Error::InvalidVoice(_) => StatusCode::InvalidArgument,
            Error::Postgres(_)
            | Error::Pool(_)
            | Error::Decode { .. }
            | Error::UnboundParam(_)
            | Error::Config(_) => StatusCode::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::Internal
    }
}
