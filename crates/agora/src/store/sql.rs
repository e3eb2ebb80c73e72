//! Statements issued by the Postgres store.
//!
//! Each function builds an `agora_sql` AST, renders it and collects the named
//! parameter values next to it. Nothing here talks to the database, so the
//! generated SQL is checked with snapshots.

use chrono::{DateTime, Utc};

use agora_sql::{
    ConflictAction, Expr, FromClause, InsertStmt, OnConflict, OrderBy, Render, RenderedSql,
    SelectColumn, SelectStmt, UpdateAssignment, UpdateStmt, render,
};

use crate::error::Result;
use crate::model::{NewForum, Post, PostId, ROOT_PARENT, ThreadId, ThreadRef, ThreadUpdate, User};
use crate::plan::{ForumThreadsRequest, OrderKey, PathBound, PostQuery, Predicate};
use crate::value::{Params, SqlParam};
use crate::vote::Voice;

pub const POST_COLUMNS: &[&str] = &[
    "id",
    "parent",
    "author",
    "forum",
    "thread",
    "message",
    "is_edited",
    "created",
    "path",
];

pub const THREAD_COLUMNS: &[&str] = &[
    "id", "title", "author", "forum", "message", "votes", "slug", "created",
];

pub const FORUM_COLUMNS: &[&str] = &["slug", "title", "author", "threads", "posts"];

pub const USER_COLUMNS: &[&str] = &["nickname", "fullname", "email", "about"];

/// Rows per multi-row post insert; keeps the bind count far below the
/// protocol limit of 65535.
pub const INSERT_CHUNK: usize = 1000;

/// A rendered statement with the values for its parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    pub rendered: RenderedSql,
    pub params: Params,
}

impl Statement {
    fn new(stmt: &impl Render, params: Params) -> Self {
        Self {
            rendered: render(stmt),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.rendered.sql
    }

    /// Parameter values in placeholder order.
    pub fn bind(&self) -> Result<Vec<SqlParam<'_>>> {
        self.params.bind(&self.rendered)
    }
}

fn col(name: &str) -> Expr {
    Expr::column(name.into())
}

fn param(name: &str) -> Expr {
    Expr::param(name.into())
}

fn columns(names: &[&str]) -> Vec<SelectColumn> {
    names.iter().map(|n| SelectColumn::expr(col(n))).collect()
}

fn select(table: &str, names: &[&str]) -> SelectStmt {
    SelectStmt::new()
        .columns(columns(names))
        .from(FromClause::table(table.into()))
}

/// `(SELECT <expr> FROM post WHERE id = $since)`
fn of_post(expr: Expr) -> Expr {
    Expr::select(
        SelectStmt::new()
            .column(SelectColumn::expr(expr))
            .from(FromClause::table("post".into()))
            .where_(col("id").eq(param("since"))),
    )
}

fn order_expr(key: OrderKey) -> Expr {
    match key {
        OrderKey::Created => col("created"),
        OrderKey::Id => col("id"),
        OrderKey::Path => col("path"),
        OrderKey::Root => col("path").subscript(1),
    }
}

/// Lower a planned listing.
pub fn select_posts(query: &PostQuery) -> Statement {
    let mut params = Params::new().with("thread", query.thread);
    let mut stmt = select("post", POST_COLUMNS).where_(col("thread").eq(param("thread")));

    for predicate in &query.filter {
        let condition = match predicate {
            Predicate::IdAfter(id) => {
                params.set("since", *id);
                col("id").gt(param("since"))
            }
            Predicate::IdBefore(id) => {
                params.set("since", *id);
                col("id").lt(param("since"))
            }
            Predicate::PathAfter(bound) => col("path").gt(path_bound(bound, &mut params)),
            Predicate::PathBefore(bound) => col("path").lt(path_bound(bound, &mut params)),
        };
        stmt = stmt.and_where(condition);
    }

    if let Some(roots) = &query.roots {
        let mut selected = select("post", &["id"])
            .where_(col("thread").eq(param("thread")))
            .and_where(col("parent").eq(Expr::int(ROOT_PARENT)));
        if let Some(after) = roots.after {
            params.set("since", after);
            let bound = of_post(col("path").subscript(1));
            selected = selected.and_where(if roots.desc {
                col("id").lt(bound)
            } else {
                col("id").gt(bound)
            });
        }
        params.set("limit", i64::from(roots.limit));
        selected = selected
            .order_by(OrderBy::new(col("id"), roots.desc))
            .limit(param("limit"));
        stmt = stmt.and_where(col("path").subscript(1).in_select(selected));
    }

    for order in &query.order {
        stmt = stmt.order_by(OrderBy::new(order_expr(order.key), order.desc));
    }

    if let Some(limit) = query.limit {
        params.set("limit", i64::from(limit));
        stmt = stmt.limit(param("limit"));
    }

    Statement::new(&stmt, params)
}

fn path_bound(bound: &PathBound, params: &mut Params) -> Expr {
    match bound {
        PathBound::Literal(path) => {
            params.set("since_path", path.clone());
            param("since_path")
        }
        PathBound::OfPost(id) => {
            params.set("since", *id);
            of_post(col("path"))
        }
    }
}

fn thread_condition(thread: &ThreadRef, params: &mut Params) -> Expr {
    match thread {
        ThreadRef::Id(id) => {
            params.set("thread", *id);
            col("id").eq(param("thread"))
        }
        ThreadRef::Slug(slug) => {
            params.set("slug", slug.as_str());
            col("slug").eq(param("slug"))
        }
    }
}

/// A thread by id or slug, optionally locked for the rest of the transaction.
pub fn select_thread(thread: &ThreadRef, lock: bool) -> Statement {
    let mut params = Params::new();
    let mut stmt = select("thread", THREAD_COLUMNS).where_(thread_condition(thread, &mut params));
    if lock {
        stmt = stmt.for_update();
    }
    Statement::new(&stmt, params)
}

pub fn select_post(id: PostId) -> Statement {
    let stmt = select("post", POST_COLUMNS).where_(col("id").eq(param("id")));
    Statement::new(&stmt, Params::new().with("id", id))
}

pub fn select_user(nickname: &str) -> Statement {
    let stmt = select("person", USER_COLUMNS).where_(col("nickname").eq(param("nickname")));
    Statement::new(&stmt, Params::new().with("nickname", nickname))
}

/// Which of `nicknames` exist.
pub fn select_nicknames(nicknames: Vec<String>) -> Statement {
    let stmt = select("person", &["nickname"]).where_(col("nickname").any(param("nicknames")));
    Statement::new(&stmt, Params::new().with("nicknames", nicknames))
}

/// A user holding either the nickname or the email of `user`.
pub fn select_user_conflict(user: &User) -> Statement {
    let stmt = select("person", USER_COLUMNS)
        .where_(
            col("nickname")
                .eq(param("nickname"))
                .or(col("email").eq(param("email"))),
        )
        .order_by(OrderBy::desc(col("nickname").eq(param("nickname"))))
        .limit(Expr::int(1));
    let params = Params::new()
        .with("nickname", user.nickname.as_str())
        .with("email", user.email.as_str());
    Statement::new(&stmt, params)
}

pub fn insert_user(user: &User) -> Statement {
    let stmt = InsertStmt::new("person".into())
        .column("nickname".into(), param("nickname"))
        .column("fullname".into(), param("fullname"))
        .column("email".into(), param("email"))
        .column("about".into(), param("about"))
        .on_conflict(OnConflict {
            columns: vec![],
            action: ConflictAction::DoNothing,
        })
        .returning(USER_COLUMNS.iter().map(|&c| c.into()));
    let params = Params::new()
        .with("nickname", user.nickname.as_str())
        .with("fullname", user.fullname.as_str())
        .with("email", user.email.as_str())
        .with("about", user.about.as_str());
    Statement::new(&stmt, params)
}

pub fn select_forum(slug: &str) -> Statement {
    let stmt = select("forum", FORUM_COLUMNS).where_(col("slug").eq(param("slug")));
    Statement::new(&stmt, Params::new().with("slug", slug))
}

pub fn insert_forum(forum: &NewForum, owner: &str) -> Statement {
    let stmt = InsertStmt::new("forum".into())
        .column("slug".into(), param("slug"))
        .column("title".into(), param("title"))
        .column("author".into(), param("author"))
        .on_conflict(OnConflict {
            columns: vec!["slug".into()],
            action: ConflictAction::DoNothing,
        })
        .returning(FORUM_COLUMNS.iter().map(|&c| c.into()));
    let params = Params::new()
        .with("slug", forum.slug.as_str())
        .with("title", forum.title.as_str())
        .with("author", owner);
    Statement::new(&stmt, params)
}

/// `forum.<counter> = forum.<counter> + $count`
pub fn bump_forum(slug: &str, counter: &str, count: i64) -> Statement {
    let stmt = UpdateStmt::new("forum".into())
        .set(counter.into(), col(counter).add(param("count")))
        .where_(col("slug").eq(param("forum")));
    Statement::new(&stmt, Params::new().with("count", count).with("forum", slug))
}

/// Fields of a thread being inserted, with references already canonical.
pub struct ThreadRow<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub forum: &'a str,
    pub message: &'a str,
    pub slug: Option<&'a str>,
    pub created: DateTime<Utc>,
}

/// Insert a thread unless its slug is taken; returns no row on conflict.
pub fn insert_thread(row: &ThreadRow<'_>) -> Statement {
    let stmt = InsertStmt::new("thread".into())
        .column("title".into(), param("title"))
        .column("author".into(), param("author"))
        .column("forum".into(), param("forum"))
        .column("message".into(), param("message"))
        .column("slug".into(), param("slug"))
        .column("created".into(), param("created"))
        .on_conflict(OnConflict {
            columns: vec!["slug".into()],
            action: ConflictAction::DoNothing,
        })
        .returning(THREAD_COLUMNS.iter().map(|&c| c.into()));
    let params = Params::new()
        .with("title", row.title)
        .with("author", row.author)
        .with("forum", row.forum)
        .with("message", row.message)
        .with("slug", row.slug)
        .with("created", row.created);
    Statement::new(&stmt, params)
}

/// `None` when the update has nothing to set.
pub fn update_thread(thread: ThreadId, update: &ThreadUpdate) -> Option<Statement> {
    if update.is_empty() {
        return None;
    }
    let mut params = Params::new().with("thread", thread);
    let mut stmt = UpdateStmt::new("thread".into());
    if let Some(title) = update.title() {
        params.set("title", title);
        stmt = stmt.set("title".into(), param("title"));
    }
    if let Some(message) = update.message() {
        params.set("message", message);
        stmt = stmt.set("message".into(), param("message"));
    }
    let stmt = stmt
        .where_(col("id").eq(param("thread")))
        .returning(THREAD_COLUMNS.iter().map(|&c| c.into()));
    Some(Statement::new(&stmt, params))
}

pub fn forum_threads(req: &ForumThreadsRequest, limit: u32) -> Statement {
    let mut params = Params::new().with("forum", req.forum.as_str());
    let mut stmt = select("thread", THREAD_COLUMNS).where_(col("forum").eq(param("forum")));
    if let Some(since) = req.since {
        params.set("since", since);
        stmt = stmt.and_where(if req.desc {
            col("created").le(param("since"))
        } else {
            col("created").ge(param("since"))
        });
    }
    params.set("limit", i64::from(limit));
    let stmt = stmt
        .order_by(OrderBy::new(col("created"), req.desc))
        .order_by(OrderBy::new(col("id"), req.desc))
        .limit(param("limit"));
    Statement::new(&stmt, params)
}

/// `id`, `thread` and `path` of the given posts.
pub fn select_parents(ids: Vec<PostId>) -> Statement {
    let stmt = select("post", &["id", "thread", "path"]).where_(col("id").any(param("ids")));
    Statement::new(&stmt, Params::new().with("ids", ids))
}

/// Draw `count` ids from the post sequence.
pub fn next_post_ids(count: usize) -> Statement {
    let stmt = SelectStmt::new()
        .column(SelectColumn::aliased(
            Expr::func("nextval", [Expr::string("post_id_seq")]),
            "id".into(),
        ))
        .from(FromClause::function(
            Expr::func("generate_series", [Expr::int(1), param("count").cast("integer")]),
            "n".into(),
        ));
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    Statement::new(&stmt, Params::new().with("count", count))
}

/// Insert fully built posts. All posts of a batch share thread, forum and
/// creation time.
pub fn insert_posts(posts: &[Post]) -> Option<Statement> {
    let first = posts.first()?;
    let mut params = Params::new()
        .with("forum", first.forum.as_str())
        .with("thread", first.thread)
        .with("created", first.created);
    let mut stmt = InsertStmt::new("post".into()).columns(POST_COLUMNS.iter().map(|&c| c.into()));
    for (i, post) in posts.iter().enumerate() {
        let name = |field: &str| format!("{field}_{i}");
        params.set(name("id"), post.id);
        params.set(name("parent"), post.parent);
        params.set(name("author"), post.author.as_str());
        params.set(name("message"), post.message.as_str());
        params.set(name("path"), post.path.clone());
        stmt = stmt.row([
            Expr::param(name("id").into()),
            Expr::param(name("parent").into()),
            Expr::param(name("author").into()),
            param("forum"),
            param("thread"),
            Expr::param(name("message").into()),
            Expr::bool(false),
            param("created"),
            Expr::param(name("path").into()),
        ]);
    }
    Some(Statement::new(&stmt, params))
}

/// Replace the message unless it is unchanged; returns no row then.
pub fn update_post_message(id: PostId, message: &str) -> Statement {
    let stmt = UpdateStmt::new("post".into())
        .set("message".into(), param("message"))
        .set("is_edited".into(), Expr::bool(true))
        .where_(col("id").eq(param("id")))
        .and_where(col("message").ne(param("message")))
        .returning(POST_COLUMNS.iter().map(|&c| c.into()));
    Statement::new(&stmt, Params::new().with("message", message).with("id", id))
}

pub fn upsert_vote(thread: ThreadId, nickname: &str, voice: Voice) -> Statement {
    let stmt = InsertStmt::new("vote".into())
        .column("author".into(), param("author"))
        .column("thread".into(), param("thread"))
        .column("voice".into(), param("voice"))
        .on_conflict(OnConflict {
            columns: vec!["author".into(), "thread".into()],
            action: ConflictAction::DoUpdate(vec![UpdateAssignment::new(
                "voice".into(),
                Expr::excluded("voice".into()),
            )]),
        });
    let params = Params::new()
        .with("author", nickname)
        .with("thread", thread)
        .with("voice", voice.value());
    Statement::new(&stmt, params)
}

/// Set `thread.votes` to the sum of its vote rows.
pub fn rescore_thread(thread: ThreadId) -> Statement {
    let total = SelectStmt::new()
        .column(SelectColumn::expr(Expr::func(
            "COALESCE",
            [Expr::func("SUM", [col("voice")]), Expr::int(0)],
        )))
        .from(FromClause::table("vote".into()))
        .where_(col("thread").eq(param("thread")));
    let stmt = UpdateStmt::new("thread".into())
        .set("votes".into(), Expr::select(total))
        .where_(col("id").eq(param("thread")))
        .returning(THREAD_COLUMNS.iter().map(|&c| c.into()));
    Statement::new(&stmt, Params::new().with("thread", thread))
}
