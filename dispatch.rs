//! Single-writer command serializer (spec §4.H, §5).
//!
//! All engine access funnels through one [`Dispatcher`]: reads are throttled by a token-bucket
//! rate limiter and run against a locked connection; writes additionally serialize FIFO through
//! the same lock and may wrap themselves in a transaction. This mirrors the teacher's `DataConn`,
//! narrowed from a pool to the single persistent `sqlx::SqliteConnection` the spec calls for.

use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use sqlx::{ConnectOptions, SqliteConnection};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{ReadRateLimit, StoreOptions};
use crate::error::StoreError;

tokio::task_local! {
    static IN_WRITE: ();
}

pub struct Dispatcher {
    conn: Mutex<SqliteConnection>,
    read_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl Dispatcher {
    pub async fn open(options: &StoreOptions) -> Result<Self, StoreError> {
        let path = options.resolve_path();
        log::debug!("opening sqlite connection at {}", path.display());

        let mut connect_options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        connect_options = connect_options.disable_statement_logging();

        let mut conn = connect_options.connect().await?;
        if let Some(password) = &options.password {
            // Keying requires a SQLCipher-compatible SQLite build; this crate only issues the
            // pragma (SPEC_FULL.md §6.2), it does not implement key derivation itself.
            sqlx::query(&format!("PRAGMA key = '{}'", password.replace('\'', "''")))
                .execute(&mut conn)
                .await?;
        }

        let limiter = build_limiter(options.read_rate_limit);
        Ok(Dispatcher { conn: Mutex::new(conn), read_limiter: limiter })
    }

    /// Runs `f` against the connection under the read-rate limiter, honoring cancellation both
    /// before dispatch and while `f` is in flight (spec §5: "raised before dispatch aborts;
    /// raised during execution lets the engine call finish but discards the result").
    pub async fn read<F, T>(&self, cancel: &CancellationToken, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.read_limiter.until_ready().await;

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            guard = self.conn.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            result = f(&mut guard) => result,
        }
    }

    /// Runs `f` against the connection, optionally wrapped in a transaction that rolls back on
    /// error or cancellation (spec §4.H, §5). Writes do not go through the read rate limiter:
    /// there is only ever one writer, so there is nothing to throttle.
    ///
    /// Calling `write` again from inside `f` (a caller re-entering the dispatcher while already
    /// holding the write slot) is rejected rather than left to deadlock on the connection mutex.
    pub async fn write<F, T>(
        &self,
        cancel: &CancellationToken,
        with_transaction: bool,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if IN_WRITE.try_with(|_| ()).is_ok() {
            return Err(StoreError::invalid_operation(
                "nested transaction: a write was dispatched from within another write",
            ));
        }

        let fut = IN_WRITE.scope((), self.write_inner(cancel, with_transaction, f));
        fut.await
    }

    async fn write_inner<F, T>(
        &self,
        cancel: &CancellationToken,
        with_transaction: bool,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            guard = self.conn.lock() => guard,
        };

        if with_transaction {
            sqlx::query("BEGIN").execute(&mut *guard).await?;
            log::trace!("dispatcher began transaction");
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            result = f(&mut guard) => result,
        };

        if with_transaction {
            match &result {
                Ok(_) => {
                    sqlx::query("COMMIT").execute(&mut *guard).await?;
                    log::trace!("dispatcher committed transaction");
                }
                Err(_) => {
                    if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *guard).await {
                        log::debug!("rollback after failed write also failed: {rollback_err}");
                    } else {
                        log::trace!("dispatcher rolled back transaction");
                    }
                }
            }
        }

        result
    }
}

fn build_limiter(
    limit: ReadRateLimit,
) -> RateLimiter<NotKeyed, InMemoryState, DefaultClock> {
    let quota = Quota::per_second(limit.per_second).allow_burst(limit.burst);
    RateLimiter::direct(quota)
}
