//! Neutral property-path values extracted from host selector trees (spec §4.A).
//!
//! Rust has no runtime reflection over property-access lambdas, so this module implements design
//! option (c) from `spec.md` §9: a small combinator built on top of a dotted-string path. A
//! [`Path`] is a sequence of field segments, optionally terminated by a "for each element" marker
//! that requests compilation via `json_each` (spec §4.A, §4.E.1).

use std::fmt;

/// One segment of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    /// Request that remaining segments be resolved against each element of the array at this
    /// point, via `json_each`. Only one `Each` segment is permitted per path (spec: "a predicate
    /// is said to be *list-any*"); nested list-any is not modeled.
    Each,
}

/// A JSON property path, rooted at the document's top-level value.
///
/// `Path::parse("a.b.c")` and `Path::root().field("a").field("b").field("c")` produce the same
/// value. `Path::root().field("values").each().field("x")` is the list-any form used by
/// `Filter::list_any` (spec §4.C) and compiles to a `json_each` join (spec §4.E.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, addressing the whole document.
    pub fn root() -> Self {
        Path { segments: Vec::new() }
    }

    /// Parses a dotted path string, e.g. `"Value.ValueC.IntProperty"`.
    pub fn parse(dotted: &str) -> Self {
        let segments = dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| Segment::Field(s.to_string()))
            .collect();
        Path { segments }
    }

    /// Appends a field-access segment.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Field(name.into()));
        self
    }

    /// Marks the path so far as a list to be expanded with `json_each`. Segments appended after
    /// this one are resolved against each array element (spec's list-any predicate).
    #[must_use]
    pub fn each(mut self) -> Self {
        self.segments.push(Segment::Each);
        self
    }

    /// Combines this path (the list to expand) with `inner` (the path resolved against each
    /// element), producing the single-path list-any form `Filter::list_any` stores.
    #[must_use]
    pub fn each_then(mut self, inner: Path) -> Self {
        self.segments.push(Segment::Each);
        self.segments.extend(inner.segments);
        self
    }

    /// True if this path contains an `each()` marker anywhere, i.e. it must compile through
    /// `json_each` rather than a plain `json_extract`.
    pub fn is_list_any(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Each))
    }

    /// Splits a list-any path into `(list_path, inner_path)`, the two halves the SQL generator
    /// needs: the array to expand and the path to extract from each element (spec §4.E.1).
    ///
    /// Panics if this path is not list-any; callers must check [`Path::is_list_any`] first.
    pub(crate) fn split_list_any(&self) -> (Path, Path) {
        let each_idx = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Each))
            .expect("split_list_any called on a non-list-any path");
        let list_path = Path { segments: self.segments[..each_idx].to_vec() };
        let inner_path = Path { segments: self.segments[each_idx + 1..].to_vec() };
        (list_path, inner_path)
    }

    /// Renders the path as a SQLite JSON path expression rooted at `$`, e.g. `$.a.b`.
    ///
    /// Returns `$` for the root path. Panics if called on a list-any path (split it first).
    pub(crate) fn to_json_path(&self) -> String {
        assert!(!self.is_list_any(), "to_json_path called on a list-any path");
        let mut out = String::from("$");
        for seg in &self.segments {
            match seg {
                Segment::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Segment::Each => unreachable!(),
            }
        }
        out
    }

    /// Renders the path as a dotted string, e.g. `"a.b.c"`. Used for index naming and diagnostics.
    pub fn to_dotted(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field(name) => Some(name.as_str()),
                Segment::Each => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted())
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse(dotted)
    }
}

impl From<String> for Path {
    fn from(dotted: String) -> Self {
        Path::parse(&dotted)
    }
}

/// Type hint carried by a predicate or sort path, driving SQL-level coercion (spec §4.A, §4.E.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Text,
    Numeric,
    Bool,
    DateTime,
}

impl TypeHint {
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeHint::Numeric)
    }

    pub fn is_bool(self) -> bool {
        matches!(self, TypeHint::Bool)
    }

    pub fn is_date_time(self) -> bool {
        matches!(self, TypeHint::DateTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_builder() {
        let parsed = Path::parse("Value.ValueC.IntProperty");
        let built = Path::root().field("Value").field("ValueC").field("IntProperty");
        assert_eq!(parsed, built);
        assert_eq!(parsed.to_json_path(), "$.Value.ValueC.IntProperty");
        assert_eq!(parsed.to_dotted(), "Value.ValueC.IntProperty");
    }

    #[test]
    fn root_path_is_dollar() {
        assert_eq!(Path::root().to_json_path(), "$");
    }

    #[test]
    fn list_any_splits() {
        let path = Path::root().field("Values").each().field("FloatProperty");
        assert!(path.is_list_any());
        let (list_path, inner_path) = path.split_list_any();
        assert_eq!(list_path.to_json_path(), "$.Values");
        assert_eq!(inner_path.to_json_path(), "$.FloatProperty");
    }
}
