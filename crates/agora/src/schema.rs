//! Database schema and migrations.
//!
//! Table names use singular form (`post`, `thread`, `vote`). Users live in
//! `person` since `user` is reserved.
//!
//! Migrations are applied in version order inside one transaction and
//! recorded in `__agora_migrations`, so running them twice is a no-op.
//!
//! ```ignore
//! let mut conn = pool.get().await?;
//! let applied = MigrationRunner::new(&mut conn).migrate().await?;
//! ```

use agora_sql::{index_name, quote_ident, unique_index_name};

use crate::error::Result;
use crate::store::get;
use crate::traced::TracedObject;

/// Bookkeeping table for applied migrations.
pub const MIGRATIONS_TABLE: &str = "__agora_migrations";

/// A versioned schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub name: &'static str,
    pub sql: fn() -> String,
}

/// All migrations, oldest first.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: "2024_11_02_000001",
        name: "create_tables",
        sql: create_tables_sql,
    },
    Migration {
        version: "2024_11_02_000002",
        name: "create_indexes",
        sql: create_indexes_sql,
    },
];

fn create_tables_sql() -> String {
    r#"
CREATE TABLE person (
    nickname TEXT PRIMARY KEY,
    fullname TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    about TEXT NOT NULL DEFAULT ''
);

CREATE TABLE forum (
    slug TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL REFERENCES person (nickname),
    threads BIGINT NOT NULL DEFAULT 0,
    posts BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE thread (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL REFERENCES person (nickname),
    forum TEXT NOT NULL REFERENCES forum (slug),
    message TEXT NOT NULL,
    slug TEXT UNIQUE,
    created TIMESTAMPTZ NOT NULL DEFAULT now(),
    votes BIGINT NOT NULL DEFAULT 0
);

CREATE SEQUENCE post_id_seq;

CREATE TABLE post (
    id BIGINT PRIMARY KEY DEFAULT nextval('post_id_seq'),
    parent BIGINT NOT NULL DEFAULT 0,
    author TEXT NOT NULL REFERENCES person (nickname),
    forum TEXT NOT NULL REFERENCES forum (slug),
    thread BIGINT NOT NULL REFERENCES thread (id),
    message TEXT NOT NULL,
    is_edited BOOLEAN NOT NULL DEFAULT FALSE,
    created TIMESTAMPTZ NOT NULL DEFAULT now(),
    path BIGINT[] NOT NULL
);

ALTER SEQUENCE post_id_seq OWNED BY post.id;

CREATE TABLE vote (
    author TEXT NOT NULL REFERENCES person (nickname),
    thread BIGINT NOT NULL REFERENCES thread (id),
    voice INTEGER NOT NULL CHECK (voice IN (-1, 1))
);
"#
    .to_owned()
}

/// `(table, columns, unique)`
const INDEXES: &[(&str, &[&str], bool)] = &[
    ("vote", &["author", "thread"], true),
    ("post", &["thread", "path"], false),
    ("post", &["thread", "created", "id"], false),
    ("post", &["thread", "parent", "id"], false),
    ("thread", &["forum", "created"], false),
];

fn create_indexes_sql() -> String {
    let mut sql = String::new();
    for (table, columns, unique) in INDEXES {
        let (kind, name) = if *unique {
            ("UNIQUE INDEX", unique_index_name(table, *columns))
        } else {
            ("INDEX", index_name(table, *columns))
        };
        let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        sql.push_str(&format!(
            "CREATE {kind} {} ON {} ({});\n",
            quote_ident(&name),
            quote_ident(table),
            columns.join(", ")
        ));
    }
    // parent_tree filters and orders on the root id
    sql.push_str("CREATE INDEX \"idx_post_root\" ON \"post\" ((\"path\"[1]));\n");
    sql
}

/// Remove every row and restart the id sequences.
pub const CLEAR_SQL: &str = "TRUNCATE vote, post, thread, forum, person RESTART IDENTITY CASCADE";

/// Whether a migration has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: &'static str,
    pub name: &'static str,
    pub applied: bool,
}

/// Applies [`MIGRATIONS`] over one connection.
pub struct MigrationRunner<'a> {
    conn: &'a mut TracedObject,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(conn: &'a mut TracedObject) -> Self {
        Self { conn }
    }

    async fn applied_versions(&self) -> Result<Vec<String>> {
        self.conn.batch_execute(&create_meta_table_sql()).await?;
        let rows = self
            .conn
            .query(
                &format!("SELECT version FROM {} ORDER BY version", quote_ident(MIGRATIONS_TABLE)),
                &[],
            )
            .await?;
        rows.iter().map(applied_version).collect()
    }

    /// Every known migration with its applied flag.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied_versions().await?;
        Ok(MIGRATIONS
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name,
                applied: applied.iter().any(|v| v == m.version),
            })
            .collect())
    }

    /// Apply every pending migration; returns the versions applied.
    pub async fn migrate(&mut self) -> Result<Vec<&'static str>> {
        self.conn.batch_execute(&create_meta_table_sql()).await?;

        let tx = self.conn.transaction().await?;
        // Concurrent runners wait here instead of racing on the same DDL.
        tx.batch_execute(&format!(
            "LOCK TABLE {} IN EXCLUSIVE MODE",
            quote_ident(MIGRATIONS_TABLE)
        ))
        .await?;
        let rows = tx
            .query(
                &format!("SELECT version FROM {}", quote_ident(MIGRATIONS_TABLE)),
                &[],
            )
            .await?;
        let applied = rows.iter().map(applied_version).collect::<Result<Vec<_>>>()?;

        let record = format!(
            "INSERT INTO {} (version, name) VALUES ($1, $2)",
            quote_ident(MIGRATIONS_TABLE)
        );
        let mut newly_applied = Vec::new();
        for migration in pending(MIGRATIONS, &applied) {
            tracing::info!(version = migration.version, name = migration.name, "applying migration");
            tx.batch_execute(&(migration.sql)()).await?;
            tx.execute(&record, &[&migration.version, &migration.name])
                .await?;
            newly_applied.push(migration.version);
        }
        tx.commit().await?;

        if newly_applied.is_empty() {
            tracing::debug!("schema is up to date");
        }
        Ok(newly_applied)
    }
}

fn applied_version(row: &tokio_postgres::Row) -> Result<String> {
    get(row, MIGRATIONS_TABLE, "version")
}

fn create_meta_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    version TEXT PRIMARY KEY,\n    name TEXT NOT NULL,\n    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n)",
        quote_ident(MIGRATIONS_TABLE)
    )
}

fn pending<'m>(
    migrations: &'m [Migration],
    applied: &'m [String],
) -> impl Iterator<Item = &'m Migration> {
    migrations
        .iter()
        .filter(move |m| !applied.iter().any(|v| v == m.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_sorted_and_unique() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_pending_skips_applied() {
        let applied = vec!["2024_11_02_000001".to_owned()];
        let pending: Vec<&str> = pending(MIGRATIONS, &applied).map(|m| m.name).collect();
        assert_eq!(pending, vec!["create_indexes"]);
    }

    #[test]
    fn test_index_statements() {
        insta::assert_snapshot!(create_indexes_sql().trim_end(), @r#"
CREATE UNIQUE INDEX "uq_vote_author_thread" ON "vote" ("author", "thread");
CREATE INDEX "idx_post_thread_path" ON "post" ("thread", "path");
CREATE INDEX "idx_post_thread_created_id" ON "post" ("thread", "created", "id");
CREATE INDEX "idx_post_thread_parent_id" ON "post" ("thread", "parent", "id");
CREATE INDEX "idx_thread_forum_created" ON "thread" ("forum", "created");
CREATE INDEX "idx_post_root" ON "post" (("path"[1]));
"#);
    }

    #[test]
    fn test_tables_cover_store() {
        let sql = create_tables_sql();
        for table in ["person", "forum", "thread", "post", "vote"] {
            assert!(sql.contains(&format!("CREATE TABLE {table} (")), "{table}");
        }
        assert!(sql.contains("path BIGINT[] NOT NULL"));
    }

    #[cfg(feature = "test-postgres")]
    #[tokio::test]
    async fn test_version_type_mismatch_is_decode_error() {
        use testcontainers::runners::AsyncRunner;
        use testcontainers_modules::postgres::Postgres;

        let (url, _container) = match std::env::var("POSTGRES_HOST") {
            Ok(host) => {
                let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".into());
                (format!("postgres://postgres:postgres@{host}:{port}/postgres"), None)
            }
            Err(_) => {
                let container = Postgres::default().start().await.unwrap();
                let host = container.get_host().await.unwrap();
                let port = container.get_host_port_ipv4(5432).await.unwrap();
                (
                    format!("postgres://postgres:postgres@{host}:{port}/postgres"),
                    Some(container),
                )
            }
        };
        let pool = crate::Config::default().with_database_url(url).create_pool().unwrap();
        let conn = crate::TracedPool::new(pool).get().await.unwrap();

        let rows = conn.query("SELECT 7 AS version", &[]).await.unwrap();
        let err = applied_version(&rows[0]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Decode { table: MIGRATIONS_TABLE, column: "version", .. }
        ));

        let rows = conn.query("SELECT '2024_11_02_000001' AS version", &[]).await.unwrap();
        assert_eq!(applied_version(&rows[0]).unwrap(), "2024_11_02_000001");
    }
}
