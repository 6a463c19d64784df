//! Create/drop indexes backed by generated JSON-extract columns (spec §4.F).

use std::collections::HashMap;
use std::sync::RwLock;

use sqlx::SqliteConnection;

use crate::error::StoreError;
use crate::schema::{self, INDEXES_META_TABLE};
use crate::selector::Path;
use crate::util::sanitize_type_name as sanitize;

/// In-memory mirror of the `indexes_meta` table, kept alongside it so the SQL generator (spec
/// §4.E.5, "indexed-path optimisation") can substitute a generated column without an extra query
/// per predicate. Loaded once at [`crate::Store::open`] and kept in sync by [`create_index`] and
/// [`drop_index`], which always run inside the single-writer dispatcher (spec §4.H) alongside the
/// DDL that changes the underlying table, so the two never drift apart.
#[derive(Default)]
pub struct IndexCatalog {
    /// `full_type_name -> (json path, e.g. "$.a.b" -> generated column name)`.
    by_type: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        IndexCatalog { by_type: RwLock::new(HashMap::new()) }
    }

    /// Loads the catalog from the `indexes_meta` table (called once at open).
    pub async fn load(conn: &mut SqliteConnection) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let rows = sqlx::query(&format!(
            "SELECT full_type_name, index_name, json_path FROM {INDEXES_META_TABLE}"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let mut by_type: HashMap<String, HashMap<String, String>> = HashMap::new();
        for row in rows {
            let full_type_name: String = row.try_get("full_type_name")?;
            let index_name: String = row.try_get("index_name")?;
            let json_path: String = row.try_get("json_path")?;
            let safe_type_name = sanitize(&full_type_name);
            let col_name = schema::index_column_name(&safe_type_name, &index_name);
            by_type.entry(full_type_name).or_default().insert(json_path, col_name);
        }
        Ok(IndexCatalog { by_type: RwLock::new(by_type) })
    }

    /// Returns the generated column for `path` on `full_type_name`, if one is indexed (spec
    /// §4.E.5: "Before emission, each path is compared against the index metadata for T").
    pub fn lookup(&self, full_type_name: &str, path: &Path) -> Option<String> {
        let json_path = path.to_json_path();
        self.by_type.read().unwrap().get(full_type_name)?.get(&json_path).cloned()
    }

    fn insert(&self, full_type_name: &str, json_path: &str, col_name: &str) {
        self.by_type
            .write()
            .unwrap()
            .entry(full_type_name.to_string())
            .or_default()
            .insert(json_path.to_string(), col_name.to_string());
    }

    fn remove(&self, full_type_name: &str, json_path: &str) {
        if let Some(paths) = self.by_type.write().unwrap().get_mut(full_type_name) {
            paths.remove(json_path);
        }
    }

    /// Clears the catalog (used by `rebuild_cache = true`, spec §9).
    pub fn clear(&self) {
        self.by_type.write().unwrap().clear();
    }
}

/// Creates a persistent index over `path` for the type named `full_type_name`/`safe_type_name`:
/// adds a generated column, indexes it, and records it in `indexes_meta` (spec §4.F).
///
/// Idempotent when the same `name` already maps to the same `path`; fails on a mismatched path for
/// the same name.
pub async fn create_index(
    conn: &mut SqliteConnection,
    catalog: &IndexCatalog,
    full_type_name: &str,
    safe_type_name: &str,
    path: &Path,
    name: &str,
) -> Result<bool, StoreError> {
    use sqlx::Row;

    let json_path = path.to_json_path();
    let existing: Option<String> = sqlx::query(&format!(
        "SELECT json_path FROM {INDEXES_META_TABLE} WHERE full_type_name = ? AND index_name = ?"
    ))
    .bind(full_type_name)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| row.try_get::<String, _>("json_path"))
    .transpose()?;

    if let Some(existing_path) = existing {
        return if existing_path == json_path {
            Ok(false)
        } else {
            Err(StoreError::invalid_operation(format!(
                "index {name:?} on {full_type_name:?} already exists for a different path \
                 ({existing_path:?} != {json_path:?})"
            )))
        };
    }

    let col_name = schema::index_column_name(safe_type_name, name);
    let alter_sql = format!(
        "ALTER TABLE {} ADD COLUMN \"{}\" GENERATED ALWAYS AS (json_extract(data, ?)) STORED",
        schema::DOCUMENTS_TABLE,
        col_name,
    );
    sqlx::query(&alter_sql).bind(&json_path).execute(&mut *conn).await?;

    let index_sql = format!(
        "CREATE INDEX \"ix_{col_name}\" ON {} (partition, full_type_name, \"{col_name}\")",
        schema::DOCUMENTS_TABLE,
    );
    sqlx::query(&index_sql).execute(&mut *conn).await?;

    let created_at_millis = crate::util::now_millis();
    sqlx::query(&format!(
        "INSERT INTO {INDEXES_META_TABLE} (full_type_name, index_name, json_path, created_at_millis) \
         VALUES (?, ?, ?, ?)"
    ))
    .bind(full_type_name)
    .bind(name)
    .bind(&json_path)
    .bind(created_at_millis)
    .execute(&mut *conn)
    .await?;

    catalog.insert(full_type_name, &json_path, &col_name);
    Ok(true)
}

/// Reverses [`create_index`] in the opposite order: drop the secondary index, drop the generated
/// column, then remove the metadata row (spec §4.F: "Drop reverses the operations in inverse
/// order").
pub async fn drop_index(
    conn: &mut SqliteConnection,
    catalog: &IndexCatalog,
    full_type_name: &str,
    safe_type_name: &str,
    name: &str,
) -> Result<bool, StoreError> {
    use sqlx::Row;

    let json_path: Option<String> = sqlx::query(&format!(
        "SELECT json_path FROM {INDEXES_META_TABLE} WHERE full_type_name = ? AND index_name = ?"
    ))
    .bind(full_type_name)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| row.try_get::<String, _>("json_path"))
    .transpose()?;

    let Some(json_path) = json_path else {
        return Ok(false);
    };

    let col_name = schema::index_column_name(safe_type_name, name);
    sqlx::query(&format!("DROP INDEX \"ix_{col_name}\"")).execute(&mut *conn).await?;
    sqlx::query(&format!(
        "ALTER TABLE {} DROP COLUMN \"{col_name}\"",
        schema::DOCUMENTS_TABLE
    ))
    .execute(&mut *conn)
    .await?;
    sqlx::query(&format!(
        "DELETE FROM {INDEXES_META_TABLE} WHERE full_type_name = ? AND index_name = ?"
    ))
    .bind(full_type_name)
    .bind(name)
    .execute(&mut *conn)
    .await?;

    catalog.remove(full_type_name, &json_path);
    Ok(true)
}

