//! Compose predicate trees with And/Or/groups (spec §4.C).

use crate::selector::{Path, TypeHint};

/// The comparison or text-match a predicate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    Eq,
    NotEq,
    StartsWith,
    EndsWith,
    Contains,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A scalar a predicate compares a path against.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Text(String),
    Numeric(f64),
    Bool(bool),
    DateTime(time::OffsetDateTime),
}

impl FilterValue {
    pub fn type_hint(&self) -> TypeHint {
        match self {
            FilterValue::Text(_) => TypeHint::Text,
            FilterValue::Numeric(_) => TypeHint::Numeric,
            FilterValue::Bool(_) => TypeHint::Bool,
            FilterValue::DateTime(_) => TypeHint::DateTime,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}
impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}
impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Numeric(n)
    }
}
impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Numeric(n as f64)
    }
}
impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        FilterValue::Numeric(n as f64)
    }
}
impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}
impl From<time::OffsetDateTime> for FilterValue {
    fn from(dt: time::OffsetDateTime) -> Self {
        FilterValue::DateTime(dt)
    }
}

/// How two adjacent terms in a filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub(crate) struct PredicateNode {
    pub kind: PredicateKind,
    /// For a plain predicate, the path compared directly. For a list-any predicate, the full
    /// `list.each().inner` path; the SQL generator splits it via [`Path::split_list_any`].
    pub path: Path,
    pub type_hint: TypeHint,
    pub value: FilterValue,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    GroupStart,
    GroupEnd,
    Join(Join),
    Predicate(PredicateNode),
}

/// A flat sequence of [`Node`]s compiled into a SQL `WHERE` clause by the query generator
/// (spec §4.E). Built by chaining predicate methods; adjacent predicates with no explicit `.and()`
/// / `.or()` between them default to an implicit `And` (spec §4.C, a design rule covered by
/// [`tests::implicit_and_between_adjacent_predicates`]).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub(crate) nodes: Vec<Node>,
}

impl Filter {
    pub fn new() -> Self {
        Filter { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a predicate comparing the scalar at `path` against `value`.
    #[must_use]
    pub fn predicate(self, kind: PredicateKind, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        let value = value.into();
        let type_hint = value.type_hint();
        self.push_term(Node::Predicate(PredicateNode { kind, path: path.into(), type_hint, value }))
    }

    pub fn eq(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::Eq, path, value)
    }
    pub fn not_eq(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::NotEq, path, value)
    }
    pub fn starts_with(self, path: impl Into<Path>, value: impl Into<String>) -> Self {
        self.predicate(PredicateKind::StartsWith, path, FilterValue::Text(value.into()))
    }
    pub fn ends_with(self, path: impl Into<Path>, value: impl Into<String>) -> Self {
        self.predicate(PredicateKind::EndsWith, path, FilterValue::Text(value.into()))
    }
    pub fn contains(self, path: impl Into<Path>, value: impl Into<String>) -> Self {
        self.predicate(PredicateKind::Contains, path, FilterValue::Text(value.into()))
    }
    pub fn gt(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::Gt, path, value)
    }
    pub fn ge(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::Ge, path, value)
    }
    pub fn lt(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::Lt, path, value)
    }
    pub fn le(self, path: impl Into<Path>, value: impl Into<FilterValue>) -> Self {
        self.predicate(PredicateKind::Le, path, value)
    }

    /// A predicate that holds when *some* element of the array at `list_path` satisfies `kind`
    /// against `value` at `inner_path` within that element (spec's list-any predicate, compiled
    /// via `json_each` — §4.E.1).
    #[must_use]
    pub fn list_any(
        self,
        kind: PredicateKind,
        list_path: impl Into<Path>,
        inner_path: impl Into<Path>,
        value: impl Into<FilterValue>,
    ) -> Self {
        let combined = list_path.into().each_then(inner_path.into());
        self.predicate(kind, combined, value)
    }

    /// Explicit `AND` join before the next term.
    #[must_use]
    pub fn and(self) -> Self {
        self.push_join(Join::And)
    }

    /// Explicit `OR` join before the next term.
    #[must_use]
    pub fn or(self) -> Self {
        self.push_join(Join::Or)
    }

    /// Wraps a sub-expression in parentheses (spec: "groups become parentheses").
    #[must_use]
    pub fn group(self, build: impl FnOnce(Filter) -> Filter) -> Self {
        let mut this = self.push_term(Node::GroupStart);
        let inner = build(Filter::new());
        this.nodes.extend(inner.nodes);
        this.nodes.push(Node::GroupEnd);
        this
    }

    fn push_join(mut self, join: Join) -> Self {
        self.nodes.push(Node::Join(join));
        self
    }

    /// Pushes a node that starts a new term (a predicate or a group). If the previous node is
    /// itself a completed term (a predicate or the end of a group) with no explicit join in
    /// between, an implicit `And` is inserted first.
    fn push_term(mut self, node: Node) -> Self {
        if let Some(last) = self.nodes.last() {
            if matches!(last, Node::Predicate(_) | Node::GroupEnd) {
                self.nodes.push(Node::Join(Join::And));
            }
        }
        self.nodes.push(node);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_and_between_adjacent_predicates() {
        let filter = Filter::new().eq("a", 1i64).eq("b", 2i64);
        assert_eq!(filter.nodes.len(), 3);
        assert!(matches!(filter.nodes[1], Node::Join(Join::And)));
    }

    #[test]
    fn explicit_or_is_preserved() {
        let filter = Filter::new().eq("a", 1i64).or().eq("b", 2i64);
        assert_eq!(filter.nodes.len(), 3);
        assert!(matches!(filter.nodes[1], Node::Join(Join::Or)));
    }

    #[test]
    fn group_wraps_with_parens_markers() {
        let filter = Filter::new()
            .eq("a", 1i64)
            .and()
            .group(|f| f.eq("b", 2i64).or().eq("c", 3i64));
        assert!(matches!(filter.nodes.first(), Some(Node::Predicate(_))));
        assert!(matches!(filter.nodes.last(), Some(Node::GroupEnd)));
    }

    #[test]
    fn implicit_and_before_group() {
        let filter = Filter::new().eq("a", 1i64).group(|f| f.eq("b", 2i64));
        // eq("a"), implicit And, GroupStart, eq("b"), GroupEnd
        assert_eq!(filter.nodes.len(), 5);
        assert!(matches!(filter.nodes[1], Node::Join(Join::And)));
        assert!(matches!(filter.nodes[2], Node::GroupStart));
    }
}
