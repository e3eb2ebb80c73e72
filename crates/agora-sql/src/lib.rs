//! SQL AST and rendering for the agora post store.
//!
//! Statements are built as values, then rendered to Postgres SQL. While
//! building, parameters are referred to by name; [`render`] numbers them
//! `$1`, `$2`, ... in order of first appearance, reuses the number when a
//! name repeats, and returns the names in placeholder order so the caller can
//! bind values positionally.
//!
//! Every identifier is quoted, so reserved words such as `user` or `order`
//! are safe as table and column names.

mod expr;
pub use expr::*;

mod render;
pub use render::*;

mod stmt;
pub use stmt::*;

/// Rendered SQL text and the parameter names its placeholders stand for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSql {
    pub sql: String,

    /// `params[0]` is bound to `$1`, and so on.
    pub params: Vec<ParamName>,
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

name_type! {
    /// A table or FROM alias.
    TableName
}

name_type! {
    /// A column or select-list alias.
    ColumnName
}

name_type! {
    /// A named statement parameter.
    ParamName
}

fn quote(s: &str, mark: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(mark);
    for c in s.chars() {
        if c == mark {
            out.push(mark);
        }
        out.push(c);
    }
    out.push(mark);
    out
}

/// Double-quote an identifier, doubling embedded quotes.
///
/// ```
/// assert_eq!(agora_sql::quote_ident("user"), "\"user\"");
/// assert_eq!(agora_sql::quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    quote(name, '"')
}

/// Single-quote a string literal, doubling embedded quotes.
///
/// ```
/// assert_eq!(agora_sql::quote_literal("it's"), "'it''s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    quote(value, '\'')
}

/// `idx_{table}_{columns}`
///
/// ```
/// assert_eq!(agora_sql::index_name("post", &["thread", "path"]), "idx_post_thread_path");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    named("idx", table, columns)
}

/// `uq_{table}_{columns}`
///
/// ```
/// assert_eq!(agora_sql::unique_index_name("vote", &["author", "thread"]), "uq_vote_author_thread");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    named("uq", table, columns)
}

fn named(prefix: &str, table: &str, columns: &[impl AsRef<str>]) -> String {
    let columns: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    format!("{prefix}_{table}_{}", columns.join("_"))
}
