//! Public API surface (spec §6.1).

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::StoreOptions;
use crate::dispatch::Dispatcher;
use crate::error::StoreError;
use crate::filter::Filter;
use crate::index::{self, IndexCatalog};
use crate::query::{exec, generate};
use crate::registry::{IdSelectorFn, IdValue, Registry};
use crate::schema;
use crate::selector::{Path, TypeHint};
use crate::serializer::{JsonSerializer, Serializer};
use crate::sort::Sort;

/// Per-write knobs: target partition, an id override, a cancellation token, and whether the
/// write should be wrapped in its own transaction (spec §6.1, §4.H). `with_transaction` defaults
/// to `true`; a caller driving its own outer transaction-like batching can opt out.
pub struct WriteOptions<'a> {
    pub partition: Option<&'a str>,
    pub id: Option<IdValue>,
    pub cancel: CancellationToken,
    pub with_transaction: bool,
}

impl<'a> Default for WriteOptions<'a> {
    fn default() -> Self {
        WriteOptions {
            partition: None,
            id: None,
            cancel: CancellationToken::new(),
            with_transaction: true,
        }
    }
}

impl<'a> WriteOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn partition(mut self, partition: &'a str) -> Self {
        self.partition = Some(partition);
        self
    }
    #[must_use]
    pub fn id(mut self, id: impl Into<IdValue>) -> Self {
        self.id = Some(id.into());
        self
    }
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
    #[must_use]
    pub fn with_transaction(mut self, with_transaction: bool) -> Self {
        self.with_transaction = with_transaction;
        self
    }
}

/// Per-read knobs shared by the single-object read operations (spec §6.1).
pub struct ReadOptions<'a> {
    pub partition: Option<&'a str>,
    pub cancel: CancellationToken,
}

impl<'a> Default for ReadOptions<'a> {
    fn default() -> Self {
        ReadOptions { partition: None, cancel: CancellationToken::new() }
    }
}

impl<'a> ReadOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn partition(mut self, partition: &'a str) -> Self {
        self.partition = Some(partition);
        self
    }
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A multi-object read: partition scope, optional filter/sort, and an optional row limit.
#[derive(Default)]
pub struct ObjectQuery<'a> {
    pub partition: Option<&'a str>,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<i64>,
    pub cancel: CancellationToken,
}

impl<'a> ObjectQuery<'a> {
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn partition(mut self, partition: &'a str) -> Self {
        self.partition = Some(partition);
        self
    }
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The outcome of a bulk delete (spec §6.1 `delete_objects`/`delete_blobs`).
#[derive(Debug, Clone, Copy)]
pub struct BulkResult {
    pub rows_affected: u64,
}

const DEFAULT_PARTITION: &str = "";

/// The embedded JSON document store (spec §1, §2). Generic over the plug-in [`Serializer`];
/// defaults to [`JsonSerializer`] the way the teacher's `DataCtx` defaults its JSON handling to
/// `serde_json` without requiring callers to name it.
pub struct Store<S: Serializer = JsonSerializer> {
    dispatcher: Dispatcher,
    registry: Registry,
    index_catalog: IndexCatalog,
    serializer: S,
    require_type_registration: bool,
}

impl Store<JsonSerializer> {
    /// Opens (creating if needed) the database described by `options`, using the default
    /// [`JsonSerializer`].
    pub async fn open(options: StoreOptions) -> Result<Self, StoreError> {
        Self::open_with_serializer(options, JsonSerializer).await
    }
}

impl<S: Serializer> Store<S> {
    /// Opens (creating if needed) the database described by `options`, using a custom serializer
    /// (spec §6.4).
    pub async fn open_with_serializer(options: StoreOptions, serializer: S) -> Result<Self, StoreError> {
        let dispatcher = Dispatcher::open(&options).await?;
        let require_type_registration = options.require_type_registration;

        let index_catalog = dispatcher
            .write(&CancellationToken::new(), false, |conn| {
                Box::pin(async move {
                    if options.rebuild_cache {
                        schema::rebuild(conn).await?;
                    } else {
                        schema::ensure_documents_table(conn).await?;
                        schema::ensure_blobs_table(conn).await?;
                        schema::ensure_indexes_meta_table(conn).await?;
                    }
                    Ok(IndexCatalog::load(conn).await?)
                })
            })
            .await?;

        Ok(Store {
            dispatcher,
            registry: Registry::new(),
            index_catalog,
            serializer,
            require_type_registration,
        })
    }

    /// Registers `T` with an optional id selector (spec §4.B, §6.1).
    pub fn register<T: 'static>(&self, id_selector: Option<IdSelectorFn<T>>) -> Result<(), StoreError> {
        self.registry.register(id_selector)
    }

    /// Registers `T` with an id derived from a JSON property path (spec §4.B).
    pub fn register_with_expression<T: 'static>(&self, path: Path, hint: TypeHint) -> Result<(), StoreError> {
        self.registry.register_with_expression::<T>(path, hint)
    }

    fn check_registration<T: 'static>(&self) -> Result<(), StoreError> {
        if self.require_type_registration && !self.registry.is_registered::<T>() {
            return Err(StoreError::registration_required(format!(
                "{} must be registered before use (require_type_registration = true)",
                std::any::type_name::<T>()
            )));
        }
        Ok(())
    }

    fn resolve_id<T: 'static>(&self, obj: &T, json: &serde_json::Value, override_id: Option<IdValue>) -> Result<IdValue, StoreError> {
        if let Some(id) = override_id {
            return Ok(id);
        }
        let info = self.registry.lookup::<T>();
        if let Some(selector) = &info.id_selector {
            return Ok(selector(obj));
        }
        if let Some(path) = &info.id_property_path {
            let hint = if info.id_is_numeric {
                TypeHint::Numeric
            } else if info.id_is_bool {
                TypeHint::Bool
            } else {
                TypeHint::Text
            };
            if let Some(id) = extract_id_value(json, path, hint) {
                return Ok(id);
            }
            return Err(StoreError::registration_required(format!(
                "id property path {path} did not resolve against the serialized document"
            )));
        }
        Err(StoreError::registration_required(format!(
            "{} has no id mapping; pass WriteOptions::id or register one",
            std::any::type_name::<T>()
        )))
    }

    /// Inserts or replaces one object (spec §6.1). Returns `true` if this call inserted a new row,
    /// `false` if it replaced an existing one.
    pub async fn write_object<T>(&self, obj: &T, opts: WriteOptions<'_>) -> Result<bool, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.check_registration::<T>()?;
        let info = self.registry.lookup::<T>();
        let bytes = self.serializer.serialize(obj)?;
        let json_text = String::from_utf8(bytes).map_err(StoreError::serialization_failed)?;
        let json_value: serde_json::Value =
            serde_json::from_str(&json_text).map_err(StoreError::serialization_failed)?;
        let id = self.resolve_id(obj, &json_value, opts.id)?;
        let partition = opts.partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let full_type_name = info.full_type_name.clone();
        let id_text = id.to_storage_text();

        self.dispatcher
            .write(&opts.cancel, opts.with_transaction, move |conn| {
                Box::pin(async move {
                    let existed: bool = sqlx::query_scalar::<_, i64>(
                        "SELECT EXISTS(SELECT 1 FROM documents WHERE partition = ? AND full_type_name = ? AND id = ?)",
                    )
                    .bind(&partition)
                    .bind(&full_type_name)
                    .bind(&id_text)
                    .fetch_one(&mut *conn)
                    .await?
                        != 0;

                    sqlx::query(
                        "INSERT INTO documents (partition, full_type_name, id, data) VALUES (?, ?, ?, ?) \
                         ON CONFLICT (partition, full_type_name, id) DO UPDATE SET data = excluded.data",
                    )
                    .bind(&partition)
                    .bind(&full_type_name)
                    .bind(&id_text)
                    .bind(&json_text)
                    .execute(&mut *conn)
                    .await?;

                    Ok(!existed)
                })
            })
            .await
    }

    /// Inserts or replaces many objects in a single transaction (spec §6.1). Returns `true` once
    /// the whole batch committed; any single failure rolls the entire batch back.
    pub async fn write_objects<T>(&self, objs: &[T], opts: WriteOptions<'_>) -> Result<bool, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.check_registration::<T>()?;
        let info = self.registry.lookup::<T>();
        let partition = opts.partition.unwrap_or(DEFAULT_PARTITION).to_string();

        let mut rows = Vec::with_capacity(objs.len());
        for obj in objs {
            let bytes = self.serializer.serialize(obj)?;
            let json_text = String::from_utf8(bytes).map_err(StoreError::serialization_failed)?;
            let json_value: serde_json::Value =
                serde_json::from_str(&json_text).map_err(StoreError::serialization_failed)?;
            let id = self.resolve_id(obj, &json_value, None)?;
            rows.push((id.to_storage_text(), json_text));
        }

        let full_type_name = info.full_type_name.clone();
        self.dispatcher
            .write(&opts.cancel, opts.with_transaction, move |conn| {
                Box::pin(async move {
                    for (id_text, json_text) in &rows {
                        sqlx::query(
                            "INSERT INTO documents (partition, full_type_name, id, data) VALUES (?, ?, ?, ?) \
                             ON CONFLICT (partition, full_type_name, id) DO UPDATE SET data = excluded.data",
                        )
                        .bind(&partition)
                        .bind(&full_type_name)
                        .bind(id_text)
                        .bind(json_text)
                        .execute(&mut *conn)
                        .await?;
                    }
                    Ok(true)
                })
            })
            .await
    }

    /// Reads one object by id (spec §6.1).
    pub async fn read_object_by_id<T>(&self, id: &IdValue, opts: ReadOptions<'_>) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let info = self.registry.lookup::<T>();
        let full_type_name = info.full_type_name.clone();
        let partition = opts.partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let id_text = id.to_storage_text();
        let serializer = &self.serializer;

        self.dispatcher
            .read(&opts.cancel, |conn| {
                Box::pin(async move {
                    let row: Option<(String,)> = sqlx::query_as(
                        "SELECT data FROM documents WHERE partition = ? AND full_type_name = ? AND id = ?",
                    )
                    .bind(&partition)
                    .bind(&full_type_name)
                    .bind(&id_text)
                    .fetch_optional(&mut *conn)
                    .await?;
                    match row {
                        Some((data,)) => Ok(Some(serializer.deserialize(data.as_bytes())?)),
                        None => Ok(None),
                    }
                })
            })
            .await
    }

    /// Reads exactly one object matching `filter`. Fails with [`StoreError::NotFound`] on zero
    /// matches and [`StoreError::TooMany`] on more than one (spec §9: "TooMany always").
    pub async fn read_object<T>(&self, filter: Filter, opts: ReadOptions<'_>) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let info = self.registry.lookup::<T>();
        let compiled = generate::select_documents(
            &info.full_type_name,
            opts.partition,
            Some(&filter),
            None,
            Some(2),
            &self.index_catalog,
            &self.serializer,
        )?;
        let serializer = &self.serializer;
        let mut rows: Vec<exec::DecodedRow<T>> = self
            .dispatcher
            .read(&opts.cancel, |conn| Box::pin(async move { exec::fetch_documents(conn, &compiled, serializer).await }))
            .await?;

        match rows.len() {
            0 => Err(StoreError::NotFound),
            1 => Ok(rows.pop().unwrap().value),
            _ => Err(StoreError::TooMany),
        }
    }

    /// Reads the first object matching `filter`, ordered by `sort`, or `None` if nothing matches.
    pub async fn read_first_object<T>(
        &self,
        filter: Option<Filter>,
        sort: Option<Sort>,
        opts: ReadOptions<'_>,
    ) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let info = self.registry.lookup::<T>();
        let compiled = generate::select_documents(
            &info.full_type_name,
            opts.partition,
            filter.as_ref(),
            sort.as_ref(),
            Some(1),
            &self.index_catalog,
            &self.serializer,
        )?;
        let serializer = &self.serializer;
        let mut rows: Vec<exec::DecodedRow<T>> = self
            .dispatcher
            .read(&opts.cancel, |conn| Box::pin(async move { exec::fetch_documents(conn, &compiled, serializer).await }))
            .await?;
        Ok(rows.pop().map(|row| row.value))
    }

    /// Reads every object matching `query` (spec §6.1).
    pub async fn read_objects<T>(&self, query: ObjectQuery<'_>) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let info = self.registry.lookup::<T>();
        let compiled = generate::select_documents(
            &info.full_type_name,
            query.partition,
            query.filter.as_ref(),
            query.sort.as_ref(),
            query.limit,
            &self.index_catalog,
            &self.serializer,
        )?;
        let serializer = &self.serializer;
        let rows: Vec<exec::DecodedRow<T>> = self
            .dispatcher
            .read(&query.cancel, |conn| Box::pin(async move { exec::fetch_documents(conn, &compiled, serializer).await }))
            .await?;
        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    /// Reads every object matching `query`, decoding a projected sub-path of each document into
    /// `U` instead of the whole `T` (spec §6.1 `read_objects_as`).
    pub async fn read_objects_as<T, U>(&self, projection: Path, query: ObjectQuery<'_>) -> Result<Vec<U>, StoreError>
    where
        T: 'static,
        U: DeserializeOwned + Send + Sync + 'static,
    {
        let info = self.registry.lookup::<T>();
        let compiled = generate::select_projection(
            &info.full_type_name,
            query.partition,
            query.filter.as_ref(),
            query.sort.as_ref(),
            query.limit,
            &self.index_catalog,
            &self.serializer,
            &projection,
        )?;
        let serializer = &self.serializer;
        let rows: Vec<exec::DecodedRow<U>> = self
            .dispatcher
            .read(&query.cancel, |conn| Box::pin(async move { exec::fetch_documents(conn, &compiled, serializer).await }))
            .await?;
        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    /// Counts objects matching `filter` (spec §6.1).
    pub async fn count_objects<T: 'static>(
        &self,
        partition: Option<&str>,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<i64, StoreError> {
        let info = self.registry.lookup::<T>();
        let compiled =
            generate::count_documents(&info.full_type_name, partition, filter.as_ref(), &self.index_catalog, &self.serializer)?;
        self.dispatcher
            .read(cancel, |conn| Box::pin(async move { exec::fetch_count(conn, &compiled).await }))
            .await
    }

    /// Deletes a single object by id (spec §6.1).
    pub async fn delete_object<T: 'static>(
        &self,
        id: &IdValue,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        let info = self.registry.lookup::<T>();
        let full_type_name = info.full_type_name.clone();
        let partition = partition.unwrap_or(DEFAULT_PARTITION).to_string();
        let id_text = id.to_storage_text();

        let affected = self
            .dispatcher
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    let result =
                        sqlx::query("DELETE FROM documents WHERE partition = ? AND full_type_name = ? AND id = ?")
                            .bind(&partition)
                            .bind(&full_type_name)
                            .bind(&id_text)
                            .execute(&mut *conn)
                            .await?;
                    Ok(result.rows_affected())
                })
            })
            .await?;
        Ok(affected > 0)
    }

    /// Deletes every object matching `filter` (spec §6.1).
    pub async fn delete_objects<T: 'static>(
        &self,
        partition: Option<&str>,
        filter: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<BulkResult, StoreError> {
        let info = self.registry.lookup::<T>();
        let compiled =
            generate::delete_documents(&info.full_type_name, partition, filter.as_ref(), &self.index_catalog, &self.serializer)?;
        let rows_affected = self
            .dispatcher
            .write(cancel, false, |conn| Box::pin(async move { exec::execute_delete(conn, &compiled).await }))
            .await?;
        Ok(BulkResult { rows_affected })
    }

    /// Creates a persistent index over `path` for `T` (spec §4.F, §6.1).
    pub async fn create_index<T: 'static>(
        &self,
        path: Path,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        let info = self.registry.lookup::<T>();
        let full_type_name = info.full_type_name.clone();
        let safe_type_name = info.safe_type_name.clone();
        let catalog = &self.index_catalog;
        let name = name.to_string();

        self.dispatcher
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    index::create_index(conn, catalog, &full_type_name, &safe_type_name, &path, &name).await
                })
            })
            .await
    }

    /// Drops an index previously created by [`Store::create_index`] for `T` (spec §4.F, §6.1).
    pub async fn drop_index<T: 'static>(&self, name: &str, cancel: &CancellationToken) -> Result<bool, StoreError> {
        let info = self.registry.lookup::<T>();
        let full_type_name = info.full_type_name.clone();
        let safe_type_name = info.safe_type_name.clone();
        let catalog = &self.index_catalog;
        let name = name.to_string();

        self.dispatcher
            .write(cancel, false, move |conn| {
                Box::pin(async move {
                    index::drop_index(conn, catalog, &full_type_name, &safe_type_name, &name).await
                })
            })
            .await
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn serializer(&self) -> &S {
        &self.serializer
    }
}

/// Resolves `path` against a parsed JSON document, decoding the terminal value as `hint` dictates
/// (spec §4.B: "id_property_path ... resolved against the serialized document at write time").
fn extract_id_value(json: &serde_json::Value, path: &Path, hint: TypeHint) -> Option<IdValue> {
    let mut current = json;
    for segment in path.to_dotted().split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.get(segment)?;
    }
    match hint {
        TypeHint::Numeric => current.as_f64().map(IdValue::Numeric),
        TypeHint::Bool => current.as_bool().map(IdValue::Bool),
        TypeHint::Text | TypeHint::DateTime => current.as_str().map(|s| IdValue::Text(s.to_string())),
    }
}
