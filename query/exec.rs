//! Runs a [`super::generate::Compiled`] query against a live connection and decodes rows.

use serde::de::DeserializeOwned;
use sqlx::{Row, SqliteConnection};

use crate::error::StoreError;
use crate::query::generate::{Bind, Compiled};
use crate::serializer::Serializer;

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s.as_str()),
            Bind::Numeric(n) => query.bind(*n),
            Bind::Int(i) => query.bind(*i),
        };
    }
    query
}

/// A document row as fetched from `documents`: the raw fields plus the decoded value.
pub struct DecodedRow<T> {
    pub partition: String,
    pub id: String,
    pub value: T,
}

/// Runs `compiled` (expected to be a `select_documents` query) and decodes each `data` column
/// through `serializer`.
pub async fn fetch_documents<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    compiled: &Compiled,
    serializer: &dyn Serializer,
) -> Result<Vec<DecodedRow<T>>, StoreError> {
    let query = sqlx::query(&compiled.sql);
    let query = bind_all(query, &compiled.binds);
    let rows = query.fetch_all(&mut *conn).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let partition: String = row.try_get("partition")?;
        let id: String = row.try_get("id")?;
        let data: String = row.try_get("data")?;
        let value = serializer.deserialize(data.as_bytes())?;
        out.push(DecodedRow { partition, id, value });
    }
    Ok(out)
}

/// Runs a `SELECT COUNT(*)`-shaped query and returns the scalar.
pub async fn fetch_count(conn: &mut SqliteConnection, compiled: &Compiled) -> Result<i64, StoreError> {
    let mut query = sqlx::query_scalar::<_, i64>(&compiled.sql);
    for bind in &compiled.binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::Numeric(n) => query.bind(*n),
            Bind::Int(i) => query.bind(*i),
        };
    }
    Ok(query.fetch_one(&mut *conn).await?)
}

/// Runs a `DELETE`-shaped query and returns the number of rows affected.
pub async fn execute_delete(conn: &mut SqliteConnection, compiled: &Compiled) -> Result<u64, StoreError> {
    let query = sqlx::query(&compiled.sql);
    let query = bind_all(query, &compiled.binds);
    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
