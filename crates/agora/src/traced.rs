//! Pool, connection and transaction wrappers that log every statement.
//!
//! Each statement runs inside a `db.*` debug span carrying its SQL and bind
//! count, and the span records how many rows came back or were touched, so
//! `RUST_LOG=agora=debug` shows what a request did to the database.

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

type Binds<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Pool whose connections come out as [`TracedObject`]s.
#[derive(Clone)]
pub struct TracedPool {
    pool: deadpool_postgres::Pool,
}

impl TracedPool {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<TracedObject, deadpool_postgres::PoolError> {
        let conn = self.pool.get().await?;
        Ok(TracedObject { conn })
    }
}

/// A pooled connection, returned to the pool on drop.
pub struct TracedObject {
    conn: deadpool_postgres::Object,
}

/// An open transaction. Rolled back on drop unless committed.
pub struct TracedTransaction<'a> {
    tx: deadpool_postgres::Transaction<'a>,
}

macro_rules! traced_client {
    ($ty:ty, $field:ident) => {
        impl $ty {
            pub async fn execute(&self, sql: &str, params: Binds<'_>) -> Result<u64, Error> {
                let span = tracing::debug_span!(
                    "db.execute",
                    sql = %sql,
                    params = params.len(),
                    affected = tracing::field::Empty,
                );
                let affected = self.$field.execute(sql, params).instrument(span.clone()).await?;
                span.record("affected", affected);
                Ok(affected)
            }

            pub async fn query(&self, sql: &str, params: Binds<'_>) -> Result<Vec<Row>, Error> {
                let span = tracing::debug_span!(
                    "db.query",
                    sql = %sql,
                    params = params.len(),
                    rows = tracing::field::Empty,
                );
                let rows = self.$field.query(sql, params).instrument(span.clone()).await?;
                span.record("rows", rows.len());
                Ok(rows)
            }

            pub async fn query_opt(
                &self,
                sql: &str,
                params: Binds<'_>,
            ) -> Result<Option<Row>, Error> {
                let span = tracing::debug_span!(
                    "db.query",
                    sql = %sql,
                    params = params.len(),
                    rows = tracing::field::Empty,
                );
                let row = self.$field.query_opt(sql, params).instrument(span.clone()).await?;
                span.record("rows", u64::from(row.is_some()));
                Ok(row)
            }

            /// Semicolon-separated statements without binds, e.g. DDL.
            pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
                let span = tracing::debug_span!("db.batch_execute", sql = %sql);
                self.$field.batch_execute(sql).instrument(span).await
            }
        }
    };
}

traced_client!(TracedObject, conn);
traced_client!(TracedTransaction<'_>, tx);

impl TracedObject {
    pub async fn transaction(&mut self) -> Result<TracedTransaction<'_>, Error> {
        let tx = self.conn.transaction().await?;
        tracing::trace!("db.begin");
        Ok(TracedTransaction { tx })
    }
}

impl TracedTransaction<'_> {
    pub async fn commit(self) -> Result<(), Error> {
        self.tx.commit().await?;
        tracing::trace!("db.commit");
        Ok(())
    }
}
