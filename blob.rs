//! Opaque byte blobs keyed by `(partition, key)` (spec §3, §6.1).

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::serializer::Serializer;
use crate::store::{BulkResult, Store};

const DEFAULT_PARTITION: &str = "";

impl<S: Serializer> Store<S> {
    /// Writes `data` under `key`, replacing any existing blob at the same `(partition, key)`
    /// (spec §6.1). The whole reader is drained into memory before the write is dispatched: the
    /// store has no notion of streaming storage, only of byte blobs (spec §3).
    pub async fn write_blob(
        &self,
        key: &str,
        mut data: impl AsyncRead + Unpin,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).await.map_err(|e| StoreError::invalid_operation(e.to_string()))?;

        let partition = partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let key = key.to_string();

        self.dispatcher()
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    let existed: bool = sqlx::query_scalar::<_, i64>(
                        "SELECT EXISTS(SELECT 1 FROM blobs WHERE partition = ? AND key = ?)",
                    )
                    .bind(&partition)
                    .bind(&key)
                    .fetch_one(&mut *conn)
                    .await?
                        != 0;

                    sqlx::query(
                        "INSERT INTO blobs (partition, key, data) VALUES (?, ?, ?) \
                         ON CONFLICT (partition, key) DO UPDATE SET data = excluded.data",
                    )
                    .bind(&partition)
                    .bind(&key)
                    .bind(&bytes)
                    .execute(&mut *conn)
                    .await?;

                    Ok(!existed)
                })
            })
            .await
    }

    /// Reads a blob fully into memory, or `None` if it does not exist (spec §6.1).
    pub async fn read_blob(
        &self,
        key: &str,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let partition = partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let key = key.to_string();

        self.dispatcher()
            .read(cancel, move |conn| {
                Box::pin(async move {
                    let row: Option<(Vec<u8>,)> =
                        sqlx::query_as("SELECT data FROM blobs WHERE partition = ? AND key = ?")
                            .bind(&partition)
                            .bind(&key)
                            .fetch_optional(&mut *conn)
                            .await?;
                    Ok(row.map(|(data,)| data))
                })
            })
            .await
    }

    /// Deletes a single blob (spec §6.1).
    pub async fn delete_blob(
        &self,
        key: &str,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        let partition = partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let key = key.to_string();

        let affected = self
            .dispatcher()
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    let result = sqlx::query("DELETE FROM blobs WHERE partition = ? AND key = ?")
                        .bind(&partition)
                        .bind(&key)
                        .execute(&mut *conn)
                        .await?;
                    Ok(result.rows_affected())
                })
            })
            .await?;
        Ok(affected > 0)
    }

    /// Deletes every blob in `partition` (or every blob, if `partition` is `None`) (spec §6.1).
    pub async fn delete_blobs(
        &self,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<BulkResult, StoreError> {
        let partition = partition.map(|p| p.to_string());

        let rows_affected = self
            .dispatcher()
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    let result = match &partition {
                        Some(partition) => {
                            sqlx::query("DELETE FROM blobs WHERE partition = ?")
                                .bind(partition)
                                .execute(&mut *conn)
                                .await?
                        }
                        None => sqlx::query("DELETE FROM blobs").execute(&mut *conn).await?,
                    };
                    Ok(result.rows_affected())
                })
            })
            .await?;
        Ok(BulkResult { rows_affected })
    }
}
