//! Postgres store.
//!
//! Multi-row writes run in one transaction that first locks the thread row,
//! so concurrent batches and votes on the same thread are serialized while
//! other threads proceed in parallel.

use std::collections::{HashMap, HashSet};

use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    Forum, Insert, NewForum, NewPost, NewThread, Path, Post, PostId, Thread, ThreadRef,
    ThreadUpdate, User, now,
};
use crate::path::{ParentRow, allocate_batch, check_parents, parent_ids};
use crate::plan::{ForumThreadsRequest, PostQuery};
use crate::schema::{CLEAR_SQL, MigrationRunner, MigrationStatus};
use crate::store::Store;
use crate::store::sql::{self, INSERT_CHUNK, Statement, ThreadRow};
use crate::traced::{TracedObject, TracedPool, TracedTransaction};
use crate::value::as_refs;
use crate::vote::Voice;

/// Store backed by a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: TracedPool,
}

impl PgStore {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self {
            pool: TracedPool::new(pool),
        }
    }

    /// Build the pool described by `config`. No connection is opened yet.
    pub fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Apply pending schema migrations; returns the versions applied.
    pub async fn migrate(&self) -> Result<Vec<&'static str>> {
        let mut conn = self.pool.get().await?;
        MigrationRunner::new(&mut conn).migrate().await
    }

    pub async fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        let mut conn = self.pool.get().await?;
        MigrationRunner::new(&mut conn).status().await
    }
}

/// Run [`Statement`]s on a connection or inside a transaction.
trait Conn {
    async fn rows(&self, stmt: &Statement) -> Result<Vec<Row>>;
    async fn row(&self, stmt: &Statement) -> Result<Option<Row>>;
    async fn exec(&self, stmt: &Statement) -> Result<u64>;
}

macro_rules! impl_conn {
    ($($ty:ty),*) => {$(
        impl Conn for $ty {
            async fn rows(&self, stmt: &Statement) -> Result<Vec<Row>> {
                let params = stmt.bind()?;
                Ok(self.query(stmt.sql(), &as_refs(&params)).await?)
            }

            async fn row(&self, stmt: &Statement) -> Result<Option<Row>> {
                let params = stmt.bind()?;
                Ok(self.query_opt(stmt.sql(), &as_refs(&params)).await?)
            }

            async fn exec(&self, stmt: &Statement) -> Result<u64> {
                let params = stmt.bind()?;
                Ok(self.execute(stmt.sql(), &as_refs(&params)).await?)
            }
        }
    )*};
}

impl_conn!(TracedObject, TracedTransaction<'_>);

/// Read `column`, reporting a type mismatch as [`Error::Decode`].
pub(crate) fn get<'r, T: FromSql<'r>>(
    row: &'r Row,
    table: &'static str,
    column: &'static str,
) -> Result<T> {
    row.try_get(column).map_err(|e| Error::Decode {
        table,
        column,
        message: e.to_string(),
    })
}

fn decode_user(row: &Row) -> Result<User> {
    Ok(User {
        nickname: get(row, "person", "nickname")?,
        fullname: get(row, "person", "fullname")?,
        email: get(row, "person", "email")?,
        about: get(row, "person", "about")?,
    })
}

fn decode_forum(row: &Row) -> Result<Forum> {
    Ok(Forum {
        slug: get(row, "forum", "slug")?,
        title: get(row, "forum", "title")?,
        user: get(row, "forum", "author")?,
        threads: get(row, "forum", "threads")?,
        posts: get(row, "forum", "posts")?,
    })
}

fn decode_thread(row: &Row) -> Result<Thread> {
    Ok(Thread {
        id: get(row, "thread", "id")?,
        title: get(row, "thread", "title")?,
        author: get(row, "thread", "author")?,
        forum: get(row, "thread", "forum")?,
        message: get(row, "thread", "message")?,
        votes: get(row, "thread", "votes")?,
        slug: get(row, "thread", "slug")?,
        created: get(row, "thread", "created")?,
    })
}

fn decode_post(row: &Row) -> Result<Post> {
    Ok(Post {
        id: get(row, "post", "id")?,
        parent: get(row, "post", "parent")?,
        author: get(row, "post", "author")?,
        forum: get(row, "post", "forum")?,
        thread: get(row, "post", "thread")?,
        message: get(row, "post", "message")?,
        is_edited: get(row, "post", "is_edited")?,
        created: get(row, "post", "created")?,
        path: Path::from(get::<Vec<PostId>>(row, "post", "path")?),
    })
}

async fn find_thread(conn: &impl Conn, thread: &ThreadRef, lock: bool) -> Result<Thread> {
    let row = conn
        .row(&sql::select_thread(thread, lock))
        .await?
        .ok_or_else(|| Error::ThreadNotFound(thread.clone()))?;
    decode_thread(&row)
}

async fn find_user(conn: &impl Conn, nickname: &str) -> Result<User> {
    let row = conn
        .row(&sql::select_user(nickname))
        .await?
        .ok_or_else(|| Error::UserNotFound(nickname.to_owned()))?;
    decode_user(&row)
}

async fn find_forum(conn: &impl Conn, slug: &str) -> Result<Forum> {
    let row = conn
        .row(&sql::select_forum(slug))
        .await?
        .ok_or_else(|| Error::ForumNotFound(slug.to_owned()))?;
    decode_forum(&row)
}

async fn find_post(conn: &impl Conn, id: PostId) -> Result<Post> {
    let row = conn
        .row(&sql::select_post(id))
        .await?
        .ok_or(Error::PostNotFound(id))?;
    decode_post(&row)
}

/// Distinct authors of a batch, in first-seen order.
fn authors(posts: &[NewPost]) -> Vec<String> {
    let mut seen = HashSet::new();
    posts
        .iter()
        .filter(|p| seen.insert(p.author.as_str()))
        .map(|p| p.author.clone())
        .collect()
}

impl Store for PgStore {
    async fn create_user(&self, user: User) -> Result<Insert<User>> {
        let conn = self.pool.get().await?;
        if let Some(row) = conn.row(&sql::insert_user(&user)).await? {
            return Ok(Insert::Created(decode_user(&row)?));
        }
        let row = conn
            .row(&sql::select_user_conflict(&user))
            .await?
            .ok_or_else(|| Error::UserNotFound(user.nickname.clone()))?;
        Ok(Insert::Existing(decode_user(&row)?))
    }

    async fn get_user(&self, nickname: &str) -> Result<User> {
        let conn = self.pool.get().await?;
        find_user(&conn, nickname).await
    }

    async fn create_forum(&self, forum: NewForum) -> Result<Insert<Forum>> {
        let conn = self.pool.get().await?;
        let owner = find_user(&conn, &forum.user).await?;
        if let Some(row) = conn.row(&sql::insert_forum(&forum, &owner.nickname)).await? {
            return Ok(Insert::Created(decode_forum(&row)?));
        }
        Ok(Insert::Existing(find_forum(&conn, &forum.slug).await?))
    }

    async fn get_forum(&self, slug: &str) -> Result<Forum> {
        let conn = self.pool.get().await?;
        find_forum(&conn, slug).await
    }

    async fn create_thread(&self, thread: NewThread) -> Result<Insert<Thread>> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;
        let author = find_user(&tx, &thread.author).await?;
        let forum = find_forum(&tx, &thread.forum).await?;

        let slug = thread.stored_slug().map(ThreadRef::from);
        if let Some(slug) = &slug {
            if let Some(row) = tx.row(&sql::select_thread(slug, false)).await? {
                return Ok(Insert::Existing(decode_thread(&row)?));
            }
        }

        let row = ThreadRow {
            title: &thread.title,
            author: &author.nickname,
            forum: &forum.slug,
            message: &thread.message,
            slug: thread.stored_slug(),
            created: thread.created.unwrap_or_else(now),
        };
        let Some(inserted) = tx.row(&sql::insert_thread(&row)).await? else {
            // Lost a race for the slug; the winner is committed and visible now.
            drop(tx);
            let slug = slug.ok_or_else(|| Error::ThreadNotFound(ThreadRef::Id(0)))?;
            return Ok(Insert::Existing(find_thread(&conn, &slug, false).await?));
        };
        let created = decode_thread(&inserted)?;
        tx.exec(&sql::bump_forum(&forum.slug, "threads", 1)).await?;
        tx.commit().await?;
        Ok(Insert::Created(created))
    }

    async fn get_thread(&self, thread: &ThreadRef) -> Result<Thread> {
        let conn = self.pool.get().await?;
        find_thread(&conn, thread, false).await
    }

    async fn update_thread(&self, thread: &ThreadRef, update: &ThreadUpdate) -> Result<Thread> {
        let conn = self.pool.get().await?;
        let current = find_thread(&conn, thread, false).await?;
        let Some(stmt) = sql::update_thread(current.id, update) else {
            return Ok(current);
        };
        let row = conn
            .row(&stmt)
            .await?
            .ok_or_else(|| Error::ThreadNotFound(thread.clone()))?;
        decode_thread(&row)
    }

    async fn forum_threads(&self, req: &ForumThreadsRequest, limit: u32) -> Result<Vec<Thread>> {
        let conn = self.pool.get().await?;
        find_forum(&conn, &req.forum).await?;
        conn.rows(&sql::forum_threads(req, limit))
            .await?
            .iter()
            .map(decode_thread)
            .collect()
    }

    async fn create_posts(&self, thread: &ThreadRef, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;
        let thread = find_thread(&tx, thread, true).await?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let authors = authors(&posts);
        let found: HashSet<String> = tx
            .rows(&sql::select_nicknames(authors.clone()))
            .await?
            .iter()
            .map(|row| get(row, "person", "nickname"))
            .collect::<Result<_>>()?;
        if let Some(missing) = authors.into_iter().find(|a| !found.contains(a)) {
            return Err(Error::UserNotFound(missing));
        }

        let wanted = parent_ids(&posts);
        let mut parents = HashMap::with_capacity(wanted.len());
        if !wanted.is_empty() {
            for row in tx.rows(&sql::select_parents(wanted)).await? {
                let parent = ParentRow {
                    id: get(&row, "post", "id")?,
                    thread: get(&row, "post", "thread")?,
                    path: Path::from(get::<Vec<PostId>>(&row, "post", "path")?),
                };
                parents.insert(parent.id, parent);
            }
        }
        // Reject before drawing ids so a failed batch burns no sequence values.
        check_parents(&posts, &parents, thread.id)?;

        let ids: Vec<PostId> = tx
            .rows(&sql::next_post_ids(posts.len()))
            .await?
            .iter()
            .map(|row| get(row, "post", "id"))
            .collect::<Result<_>>()?;
        let paths = allocate_batch(&posts, &parents, thread.id, &ids)?;

        let created = now();
        let count = posts.len();
        let inserted: Vec<Post> = posts
            .into_iter()
            .zip(ids)
            .zip(paths)
            .map(|((post, id), path)| Post {
                id,
                parent: post.parent,
                author: post.author,
                forum: thread.forum.clone(),
                thread: thread.id,
                message: post.message,
                is_edited: false,
                created,
                path,
            })
            .collect();

        for chunk in inserted.chunks(INSERT_CHUNK) {
            if let Some(stmt) = sql::insert_posts(chunk) {
                tx.exec(&stmt).await?;
            }
        }
        tx.exec(&sql::bump_forum(&thread.forum, "posts", count as i64))
            .await?;
        tx.commit().await?;
        tracing::debug!(thread = thread.id, count, "inserted post batch");
        Ok(inserted)
    }

    async fn get_post(&self, id: PostId) -> Result<Post> {
        let conn = self.pool.get().await?;
        find_post(&conn, id).await
    }

    async fn update_post(&self, id: PostId, message: Option<&str>) -> Result<Post> {
        let conn = self.pool.get().await?;
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            if let Some(row) = conn.row(&sql::update_post_message(id, message)).await? {
                return decode_post(&row);
            }
        }
        find_post(&conn, id).await
    }

    async fn thread_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let conn = self.pool.get().await?;
        conn.rows(&sql::select_posts(query))
            .await?
            .iter()
            .map(decode_post)
            .collect()
    }

    async fn vote(&self, thread: &ThreadRef, nickname: &str, voice: Voice) -> Result<Thread> {
        let mut conn = self.pool.get().await?;
        let tx = conn.transaction().await?;
        let locked = find_thread(&tx, thread, true).await?;
        let voter = find_user(&tx, nickname).await?;
        tx.exec(&sql::upsert_vote(locked.id, &voter.nickname, voice))
            .await?;
        let row = tx
            .row(&sql::rescore_thread(locked.id))
            .await?
            .ok_or_else(|| Error::ThreadNotFound(thread.clone()))?;
        let rescored = decode_thread(&row)?;
        tx.commit().await?;
        Ok(rescored)
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(CLEAR_SQL).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_authors_are_distinct_in_order() {
        let posts = vec![
            NewPost::root("bob", "a"),
            NewPost::root("alice", "b"),
            NewPost::new(1, "bob", "c"),
        ];
        assert_eq!(authors(&posts), vec!["bob".to_owned(), "alice".to_owned()]);
    }

    #[test]
    fn test_connect_requires_database_url() {
        let err = PgStore::connect(&Config::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_internal());
    }
}
