//! Pluggable JSON encode/decode capability (spec §6.4).
//!
//! JSON encode/decode is explicitly out of scope for the core (spec §1): the store only depends
//! on the [`Serializer`] contract, represented the idiomatic Rust way as a trait rather than the
//! inheritance hierarchy the design notes (spec §9) warn against. The default implementation,
//! [`JsonSerializer`], is backed by `serde_json`, matching every use of JSON in the teacher's
//! `datastore` crate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::error::StoreError;

/// Capability interface for encoding/decoding stored values and formatting datetimes for SQL
/// comparison (spec §4.E.2, §6.4).
///
/// Documents are acyclic JSON trees by contract (spec §9): a `T` whose `Serialize` impl would
/// produce a cyclic structure (e.g. through interior mutability) causes `serialize` to fail with
/// [`StoreError::SerializationFailed`] rather than looping forever — this falls naturally out of
/// delegating to `serde_json`, which has no notion of back-references.
pub trait Serializer: Send + Sync + 'static {
    fn serialize<T: Serialize>(&self, obj: &T) -> Result<Vec<u8>, StoreError>;
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError>;

    /// Formats a timestamp the way it is stored and compared in SQL (spec §4.E.2: "datetimes are
    /// formatted using the serializer-provided format string and compared as text").
    fn format_datetime(&self, dt: time::OffsetDateTime) -> String;

    /// Parses a stored timestamp back into a value, the inverse of [`Serializer::format_datetime`].
    fn parse_datetime(&self, text: &str) -> Result<time::OffsetDateTime, StoreError>;
}

/// Default [`Serializer`]: UTF-8 JSON via `serde_json`, RFC 3339 (with fractional seconds)
/// datetimes — the same convention the C# original's `DateTime` JSON encoding used.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, obj: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(obj).map_err(StoreError::serialization_failed)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(StoreError::serialization_failed)
    }

    fn format_datetime(&self, dt: time::OffsetDateTime) -> String {
        dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
    }

    fn parse_datetime(&self, text: &str) -> Result<time::OffsetDateTime, StoreError> {
        time::OffsetDateTime::parse(text, &Rfc3339).map_err(StoreError::serialization_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: i32,
        b: String,
    }

    #[test]
    fn round_trips_through_json() {
        let serializer = JsonSerializer;
        let sample = Sample { a: 1, b: "hello".into() };
        let bytes = serializer.serialize(&sample).unwrap();
        let decoded: Sample = serializer.deserialize(&bytes).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn datetime_format_round_trips() {
        let serializer = JsonSerializer;
        let dt = time::macros::datetime!(2024-03-05 12:30:00 UTC);
        let text = serializer.format_datetime(dt);
        let parsed = serializer.parse_datetime(&text).unwrap();
        assert_eq!(dt, parsed);
    }
}
