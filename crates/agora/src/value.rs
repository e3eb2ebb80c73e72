//! Runtime values for query parameters.
//!
//! Statements are rendered with named parameters; [`Params`] holds the value
//! for each name and binds them in the order the renderer numbered them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use postgres_types::{IsNull, ToSql, Type as PgTypeInfo, to_sql_checked};

use agora_sql::{ParamName, RenderedSql};

use crate::error::{Error, Result};

/// A bound parameter value, one variant per Postgres type the store sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    I32(i32),
    I64(i64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// `BIGINT[]`: paths and id lists
    I64Array(Vec<i64>),
    /// `TEXT[]`
    StringArray(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! value_from {
    ($($from:ty => $variant:ident),* $(,)?) => {$(
        impl From<$from> for Value {
            fn from(v: $from) -> Self {
                Value::$variant(v.into())
            }
        }
    )*};
}

value_from! {
    i32 => I32,
    i64 => I64,
    String => String,
    &str => String,
    DateTime<Utc> => Timestamp,
    Vec<i64> => I64Array,
    Vec<String> => StringArray,
    crate::model::Path => I64Array,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Borrowed [`Value`] handed to tokio-postgres.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &PgTypeInfo,
        out: &mut bytes::BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::I32(v) => v.to_sql(ty, out),
            Value::I64(v) => v.to_sql(ty, out),
            Value::String(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::I64Array(v) => v.to_sql(ty, out),
            Value::StringArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &PgTypeInfo) -> bool {
        matches!(
            *ty,
            PgTypeInfo::INT4
                | PgTypeInfo::INT8
                | PgTypeInfo::TEXT
                | PgTypeInfo::VARCHAR
                | PgTypeInfo::TIMESTAMPTZ
                | PgTypeInfo::INT8_ARRAY
                | PgTypeInfo::TEXT_ARRAY
                | PgTypeInfo::VARCHAR_ARRAY
        )
    }

    to_sql_checked!();
}

/// Named parameter values for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: IndexMap<ParamName, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an earlier value.
    pub fn set(&mut self, name: impl Into<ParamName>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`Params::set`].
    pub fn with(mut self, name: impl Into<ParamName>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Values in the positional order `rendered` expects.
    pub fn bind(&self, rendered: &RenderedSql) -> Result<Vec<SqlParam<'_>>> {
        rendered
            .params
            .iter()
            .map(|name| {
                self.values
                    .get(name)
                    .map(SqlParam)
                    .ok_or_else(|| Error::UnboundParam(name.to_string()))
            })
            .collect()
    }
}

/// Borrow bound params as the slice tokio-postgres expects.
pub fn as_refs<'a>(params: &'a [SqlParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}
