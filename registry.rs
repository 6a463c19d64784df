//! Type -> (table shape, id selector, id property path, numeric/bool flags) (spec §4.B).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::selector::{Path, TypeHint};
use crate::util::sanitize_type_name;

/// The value a registered type's id resolves to.
///
/// Stored rows always keep `id` as `TEXT` (spec §3's data model note); these variants only carry
/// the *logical* type, which drives `CAST` emission when the id is used in a filter or sort
/// (spec §4.B's `id_is_numeric`/`id_is_bool` flags).
#[derive(Debug, Clone, PartialEq)]
pub enum IdValue {
    Text(String),
    Numeric(f64),
    Bool(bool),
}

impl IdValue {
    /// The text representation stored in the `id` column.
    pub fn to_storage_text(&self) -> String {
        match self {
            IdValue::Text(s) => s.clone(),
            IdValue::Numeric(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            IdValue::Bool(b) => b.to_string(),
        }
    }

    pub fn type_hint(&self) -> TypeHint {
        match self {
            IdValue::Text(_) => TypeHint::Text,
            IdValue::Numeric(_) => TypeHint::Numeric,
            IdValue::Bool(_) => TypeHint::Bool,
        }
    }
}

impl From<&str> for IdValue {
    fn from(s: &str) -> Self {
        IdValue::Text(s.to_string())
    }
}
impl From<String> for IdValue {
    fn from(s: String) -> Self {
        IdValue::Text(s)
    }
}
impl From<i64> for IdValue {
    fn from(n: i64) -> Self {
        IdValue::Numeric(n as f64)
    }
}
impl From<f64> for IdValue {
    fn from(n: f64) -> Self {
        IdValue::Numeric(n)
    }
}
impl From<bool> for IdValue {
    fn from(b: bool) -> Self {
        IdValue::Bool(b)
    }
}

/// A pure function mapping an entity to its id (the "id selector" of spec §4.B).
pub type IdSelectorFn<T> = Arc<dyn Fn(&T) -> IdValue + Send + Sync>;

/// Where a registered type's id comes from.
#[derive(Clone)]
enum IdSource {
    /// No id mapping configured; writes must supply one explicitly or fail (spec's
    /// `requires_id_mapping`).
    None,
    /// `id_selector`: caller-provided pure function `T -> IdValue`. Stored type-erased because a
    /// single registry holds entries for many distinct `T`; downcast back to `IdSelectorFn<T>` at
    /// lookup time, keyed by `TypeId::of::<T>()`.
    Selector(Arc<dyn Any + Send + Sync>),
    /// `id_property_path`: a dotted JSON path inside `data`, resolved against the serialized
    /// document at write time instead of calling back into Rust.
    Path(Path, TypeHint),
}

struct Entry {
    full_type_name: String,
    safe_type_name: String,
    id_source: IdSource,
}

/// Registration info returned by [`Registry::lookup`].
#[derive(Clone)]
pub struct TypeInfo<T> {
    pub full_type_name: String,
    pub safe_type_name: String,
    pub id_selector: Option<IdSelectorFn<T>>,
    pub id_property_path: Option<Path>,
    pub id_is_numeric: bool,
    pub id_is_bool: bool,
    pub requires_id_mapping: bool,
}

/// Type -> storage-shape registry. Lives for the lifetime of the [`crate::Store`] handle.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<TypeId, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: RwLock::new(HashMap::new()) }
    }

    /// Registers `T` with an optional id selector. Idempotent: calling this again for the same
    /// `T` is a no-op if the new call agrees with the existing registration on *how* the id is
    /// derived (same presence/absence of a selector); it fails if the two calls disagree (e.g.
    /// one provides a selector and a later one tries to register a path instead). Function
    /// identity of the selector itself cannot be compared in Rust, so "compatible" is judged on
    /// the shape of the id source, not behavioral equivalence — see DESIGN.md.
    pub fn register<T: 'static>(&self, id_selector: Option<IdSelectorFn<T>>) -> Result<(), StoreError> {
        let type_id = TypeId::of::<T>();
        let full_type_name = std::any::type_name::<T>().to_string();
        let safe_type_name = sanitize_type_name(&full_type_name);
        let new_source = match id_selector {
            Some(f) => IdSource::Selector(Arc::new(f) as Arc<dyn Any + Send + Sync>),
            None => IdSource::None,
        };

        let mut entries = self.entries.write().unwrap();
        match entries.get(&type_id) {
            None => {
                entries.insert(type_id, Entry { full_type_name, safe_type_name, id_source: new_source });
                Ok(())
            }
            Some(existing) => match (&existing.id_source, &new_source) {
                (IdSource::None, IdSource::None) => Ok(()),
                (IdSource::Selector(_), IdSource::Selector(_)) => Ok(()),
                _ => Err(StoreError::invalid_operation(format!(
                    "type {full_type_name} is already registered with an incompatible id mapping"
                ))),
            },
        }
    }

    /// Registers `T` with an id derived from a property path inside the stored JSON, along with
    /// the terminal member's type hint (spec: "derives `id_property_path`, numeric/bool flags from
    /// the selector's terminal member type").
    pub fn register_with_expression<T: 'static>(&self, path: Path, hint: TypeHint) -> Result<(), StoreError> {
        let type_id = TypeId::of::<T>();
        let full_type_name = std::any::type_name::<T>().to_string();
        let safe_type_name = sanitize_type_name(&full_type_name);

        let mut entries = self.entries.write().unwrap();
        match entries.get(&type_id) {
            None => {
                entries.insert(
                    type_id,
                    Entry { full_type_name, safe_type_name, id_source: IdSource::Path(path, hint) },
                );
                Ok(())
            }
            Some(existing) => match &existing.id_source {
                IdSource::Path(existing_path, existing_hint)
                    if *existing_path == path && *existing_hint == hint =>
                {
                    Ok(())
                }
                _ => Err(StoreError::invalid_operation(format!(
                    "type {full_type_name} is already registered with an incompatible id mapping"
                ))),
            },
        }
    }

    /// Returns the registered info for `T`, or a default requiring explicit id mapping per write.
    pub fn lookup<T: 'static>(&self) -> TypeInfo<T> {
        let type_id = TypeId::of::<T>();
        let entries = self.entries.read().unwrap();
        match entries.get(&type_id) {
            Some(entry) => {
                let (id_selector, id_property_path, id_is_numeric, id_is_bool, requires_id_mapping) =
                    match &entry.id_source {
                        IdSource::None => (None, None, false, false, true),
                        IdSource::Selector(any_fn) => {
                            let f = match any_fn.clone().downcast::<IdSelectorFn<T>>() {
                                Ok(f) => f,
                                Err(_) => {
                                    unreachable!("TypeId keyed storage guarantees the downcast succeeds")
                                }
                            };
                            (Some((*f).clone()), None, false, false, false)
                        }
                        IdSource::Path(path, hint) => (
                            None,
                            Some(path.clone()),
                            hint.is_numeric(),
                            hint.is_bool(),
                            false,
                        ),
                    };
                TypeInfo {
                    full_type_name: entry.full_type_name.clone(),
                    safe_type_name: entry.safe_type_name.clone(),
                    id_selector,
                    id_property_path,
                    id_is_numeric,
                    id_is_bool,
                    requires_id_mapping,
                }
            }
            None => {
                let full_type_name = std::any::type_name::<T>().to_string();
                let safe_type_name = sanitize_type_name(&full_type_name);
                TypeInfo {
                    full_type_name,
                    safe_type_name,
                    id_selector: None,
                    id_property_path: None,
                    id_is_numeric: false,
                    id_is_bool: false,
                    requires_id_mapping: true,
                }
            }
        }
    }

    /// True if `T` has been registered (with any id mapping, including none).
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.entries.read().unwrap().contains_key(&TypeId::of::<T>())
    }
}
