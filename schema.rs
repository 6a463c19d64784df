//! Table layout for documents, blobs, index columns, and index metadata (spec §4.G, §3).

use sqlx::SqliteConnection;

pub const DOCUMENTS_TABLE: &str = "documents";
pub const BLOBS_TABLE: &str = "blobs";
pub const INDEXES_META_TABLE: &str = "indexes_meta";

/// Generated column name for a registered index.
///
/// All types share one physical `documents` table (spec §3), so the column name is namespaced by
/// `safe_type_name` as well as `index_name` — two different types may otherwise pick the same
/// index name for unrelated paths, which would collide on a single shared column. This is a
/// grounded refinement of the spec's literal `idx_<name>` (§3, §4.F): it keeps the same idea
/// (one generated column per index) while making column names unique across types.
pub fn index_column_name(safe_type_name: &str, index_name: &str) -> String {
    format!("idx_{safe_type_name}_{index_name}")
}

/// Creates the `documents` table if it does not already exist (spec §3's document row, §4.G's
/// "created lazily on first write"; this crate creates it eagerly at [`crate::Store::open`] for
/// simplicity instead of guarding every write — see DESIGN.md).
pub async fn ensure_documents_table(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    exec(
        conn,
        &format!(
            "CREATE TABLE IF NOT EXISTS {DOCUMENTS_TABLE} ( \
                partition TEXT NOT NULL, \
                full_type_name TEXT NOT NULL, \
                id TEXT NOT NULL, \
                data TEXT NOT NULL, \
                PRIMARY KEY (partition, full_type_name, id) \
            )"
        ),
    )
    .await
}

/// Creates the `blobs` table if it does not already exist (spec §3's blob row).
pub async fn ensure_blobs_table(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    exec(
        conn,
        &format!(
            "CREATE TABLE IF NOT EXISTS {BLOBS_TABLE} ( \
                partition TEXT NOT NULL, \
                key TEXT NOT NULL, \
                data BLOB NOT NULL, \
                PRIMARY KEY (partition, key) \
            )"
        ),
    )
    .await
}

/// Creates the `indexes_meta` table if it does not already exist (spec §3's index metadata row).
/// `created_at_millis` is an addition (SPEC_FULL.md §3) kept purely for operational visibility; it
/// plays no role in query planning.
pub async fn ensure_indexes_meta_table(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    exec(
        conn,
        &format!(
            "CREATE TABLE IF NOT EXISTS {INDEXES_META_TABLE} ( \
                full_type_name TEXT NOT NULL, \
                index_name TEXT NOT NULL, \
                json_path TEXT NOT NULL, \
                created_at_millis INTEGER NOT NULL, \
                PRIMARY KEY (full_type_name, index_name) \
            )"
        ),
    )
    .await
}

/// Drops and recreates `documents`, `blobs` and `indexes_meta` (spec §4.G's `rebuild_cache`,
/// resolved per SPEC_FULL.md §9 to also drop index metadata).
pub async fn rebuild(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    exec(conn, &format!("DROP TABLE IF EXISTS {DOCUMENTS_TABLE}")).await?;
    exec(conn, &format!("DROP TABLE IF EXISTS {BLOBS_TABLE}")).await?;
    exec(conn, &format!("DROP TABLE IF EXISTS {INDEXES_META_TABLE}")).await?;
    ensure_documents_table(conn).await?;
    ensure_blobs_table(conn).await?;
    ensure_indexes_meta_table(conn).await?;
    Ok(())
}

async fn exec(conn: &mut SqliteConnection, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::query(sql).execute(conn).await?;
    Ok(())
}
