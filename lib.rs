#![allow(clippy::needless_lifetimes)]

//! Embedded JSON document store over SQLite. See `Store` for the public entry point.

mod blob;
mod config;
mod dispatch;
mod error;
mod filter;
mod index;
mod query;
mod registry;
mod schema;
mod selector;
mod serializer;
mod sort;
mod sql_writer;
mod store;
mod util;

pub use config::{ReadRateLimit, StoreOptions};
pub use error::StoreError;
pub use filter::{Filter, FilterValue, Join, PredicateKind};
pub use registry::{IdSelectorFn, IdValue};
pub use selector::{Path, TypeHint};
pub use serializer::{JsonSerializer, Serializer};
pub use sort::{Direction, Sort};
pub use store::{BulkResult, ObjectQuery, ReadOptions, Store, WriteOptions};
