//! Compiles [`Filter`]/[`Sort`] into SQL text + an ordered bind list (spec §4.E).

use std::collections::HashMap;

use crate::error::StoreError;
use crate::filter::{Filter, Join, Node, PredicateKind};
use crate::index::IndexCatalog;
use crate::selector::{Path, TypeHint};
use crate::serializer::Serializer;
use crate::sort::{Direction, Sort};
use crate::sql_writer::SqlWriter;

/// One bound value, in the order its `?` placeholder appears in the generated SQL.
#[derive(Debug, Clone)]
pub enum Bind {
    Text(String),
    Numeric(f64),
    Int(i64),
}

/// A fully assembled query: SQL text plus the binds it expects, in order.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub sql: String,
    pub binds: Vec<Bind>,
}

/// Tracks the `json_each` joins a query needs, one per distinct list-any path (spec §4.E.1:
/// "predicates over the same list share one FROM-clause alias").
#[derive(Default)]
struct Joins {
    alias_by_list_path: HashMap<String, String>,
    order: Vec<(String, String)>,
}

impl Joins {
    fn alias_for(&mut self, list_path: &Path) -> String {
        let key = list_path.to_dotted();
        if let Some(alias) = self.alias_by_list_path.get(&key) {
            return alias.clone();
        }
        let alias = format!("je_{}", self.order.len());
        self.alias_by_list_path.insert(key, alias.clone());
        self.order.push((list_path.to_json_path(), alias.clone()));
        alias
    }

    fn write_clauses(&self, w: &mut SqlWriter) {
        for (json_path, alias) in &self.order {
            w.write_str(" JOIN json_each(json_extract(d.data, ");
            w.write_literal_str(json_path);
            w.write_str(")) AS ");
            w.write_str(alias);
        }
    }
}

/// Resolves a (possibly list-any) path to a SQL scalar expression, recording a join in `joins`
/// when the path runs through `json_each`, and substituting a generated index column when the
/// index catalog has one for this exact path (spec §4.E.5).
fn resolve_expr(path: &Path, full_type_name: &str, catalog: &IndexCatalog, joins: &mut Joins) -> String {
    if path.is_list_any() {
        let (list_path, inner_path) = path.split_list_any();
        let alias = joins.alias_for(&list_path);
        if inner_path.to_json_path() == "$" {
            format!("{alias}.value")
        } else {
            format!("json_extract({alias}.value, '{}')", inner_path.to_json_path())
        }
    } else if let Some(column) = catalog.lookup(full_type_name, path) {
        format!("d.\"{column}\"")
    } else if path.to_json_path() == "$" {
        "d.data".to_string()
    } else {
        format!("json_extract(d.data, '{}')", path.to_json_path())
    }
}

/// Wraps a scalar SQL expression with the `CAST` the type hint calls for (spec §4.E.2).
fn cast_for_hint(expr: &str, hint: TypeHint) -> String {
    match hint {
        TypeHint::Numeric => format!("CAST({expr} AS REAL)"),
        TypeHint::Bool => format!("CAST({expr} AS INTEGER)"),
        TypeHint::Text | TypeHint::DateTime => expr.to_string(),
    }
}

/// Escapes `%`, `_` and `\` in a LIKE pattern fragment (spec §4.E.3: "LIKE patterns are escaped
/// with `ESCAPE '\'`").
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_predicate(
    w: &mut SqlWriter,
    binds: &mut Vec<Bind>,
    full_type_name: &str,
    catalog: &IndexCatalog,
    joins: &mut Joins,
    serializer: &dyn Serializer,
    node: &crate::filter::PredicateNode,
) -> Result<(), StoreError> {
    let expr = resolve_expr(&node.path, full_type_name, catalog, joins);

    match node.kind {
        PredicateKind::StartsWith | PredicateKind::EndsWith | PredicateKind::Contains => {
            let text = match &node.value {
                crate::filter::FilterValue::Text(s) => s.clone(),
                other => {
                    return Err(StoreError::invalid_operation(format!(
                        "LIKE predicate requires a text value, got {other:?}"
                    )))
                }
            };
            let escaped = escape_like(&text);
            let pattern = match node.kind {
                PredicateKind::StartsWith => format!("{escaped}%"),
                PredicateKind::EndsWith => format!("%{escaped}"),
                PredicateKind::Contains => format!("%{escaped}%"),
                _ => unreachable!(),
            };
            w.write_str(&expr);
            w.write_str(" LIKE ? ESCAPE '\\'");
            binds.push(Bind::Text(pattern));
        }
        _ => {
            let op = match node.kind {
                PredicateKind::Eq => "=",
                PredicateKind::NotEq => "!=",
                PredicateKind::Gt => ">",
                PredicateKind::Ge => ">=",
                PredicateKind::Lt => "<",
                PredicateKind::Le => "<=",
                _ => unreachable!(),
            };
            w.write_str(&cast_for_hint(&expr, node.type_hint));
            w.write_str(" ");
            w.write_str(op);
            w.write_str(" ?");
            binds.push(bind_for_value(&node.value, serializer));
        }
    }
    Ok(())
}

fn bind_for_value(value: &crate::filter::FilterValue, serializer: &dyn Serializer) -> Bind {
    use crate::filter::FilterValue;
    match value {
        FilterValue::Text(s) => Bind::Text(s.clone()),
        FilterValue::Numeric(n) => Bind::Numeric(*n),
        FilterValue::Bool(b) => Bind::Int(if *b { 1 } else { 0 }),
        FilterValue::DateTime(dt) => Bind::Text(serializer.format_datetime(*dt)),
    }
}

/// Emits the `WHERE` fragment for `filter` (without the leading `WHERE` keyword), recording joins
/// and binds as it goes. Returns an empty string (no parens, no output) for an empty filter.
fn write_filter(
    w: &mut SqlWriter,
    binds: &mut Vec<Bind>,
    full_type_name: &str,
    catalog: &IndexCatalog,
    joins: &mut Joins,
    serializer: &dyn Serializer,
    filter: &Filter,
) -> Result<(), StoreError> {
    for node in &filter.nodes {
        match node {
            Node::GroupStart => w.write_str("("),
            Node::GroupEnd => w.write_str(")"),
            Node::Join(Join::And) => w.write_str(" AND "),
            Node::Join(Join::Or) => w.write_str(" OR "),
            Node::Predicate(p) => push_predicate(w, binds, full_type_name, catalog, joins, serializer, p)?,
        }
    }
    Ok(())
}

/// Assembles the shared `FROM ... [JOIN ...] WHERE partition = ? AND full_type_name = ? [AND
/// (filter)]` core used by reads, counts, and deletes alike.
struct SelectCore {
    from_and_where: String,
    binds: Vec<Bind>,
}

fn build_core(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
) -> Result<SelectCore, StoreError> {
    let mut binds = Vec::new();
    let mut joins = Joins::default();

    let mut where_writer = SqlWriter::new();
    where_writer.write_str("d.full_type_name = ?");
    binds.push(Bind::Text(full_type_name.to_string()));
    if let Some(partition) = partition {
        where_writer.write_str(" AND d.partition = ?");
        binds.push(Bind::Text(partition.to_string()));
    }
    if let Some(filter) = filter {
        if !filter.is_empty() {
            where_writer.write_str(" AND (");
            write_filter(&mut where_writer, &mut binds, full_type_name, catalog, &mut joins, serializer, filter)?;
            where_writer.write_str(")");
        }
    }

    let mut from_writer = SqlWriter::new();
    from_writer.write_str("FROM documents d");
    joins.write_clauses(&mut from_writer);
    from_writer.write_str(" WHERE ");
    from_writer.write_str(where_writer.as_str());

    Ok(SelectCore { from_and_where: from_writer.build(), binds })
}

fn write_order_by(
    w: &mut SqlWriter,
    full_type_name: &str,
    catalog: &IndexCatalog,
    joins: &mut Joins,
    sort: &Sort,
) {
    if sort.is_empty() {
        return;
    }
    w.write_str(" ORDER BY ");
    for (i, entry) in sort.entries.iter().enumerate() {
        if i > 0 {
            w.write_str(", ");
        }
        let expr = resolve_expr(&entry.path, full_type_name, catalog, joins);
        w.write_str(&cast_for_hint(&expr, entry.type_hint));
        w.write_str(if entry.direction == Direction::Asc { " ASC" } else { " DESC" });
    }
}

/// Builds `SELECT DISTINCT d.partition, d.id, d.data FROM ... WHERE ... ORDER BY ... LIMIT ...`
/// (spec §4.E: the read path). `DISTINCT` guards against a document matching more than once
/// through a list-any join fanning a single row out across several array elements.
pub fn select_documents(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    sort: Option<&Sort>,
    limit: Option<i64>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
) -> Result<Compiled, StoreError> {
    select_with_data_expr(full_type_name, partition, filter, sort, limit, catalog, serializer, "d.data")
}

/// Like [`select_documents`] but projects a sub-path of each document's JSON instead of the whole
/// thing, as the `data` column (spec §6.1 `read_objects_as`'s projection).
pub fn select_projection(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    sort: Option<&Sort>,
    limit: Option<i64>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
    projection: &Path,
) -> Result<Compiled, StoreError> {
    // `json_extract` auto-unwraps a scalar (string/number/bool/null) leaf to a bare SQL value
    // rather than JSON text, which the deserializer then chokes on. `json_quote` re-quotes bare
    // scalars into valid JSON and passes already-JSON (object/array) results through unchanged.
    let expr = if projection.to_json_path() == "$" {
        "d.data".to_string()
    } else {
        format!("json_quote(json_extract(d.data, '{}'))", projection.to_json_path())
    };
    select_with_data_expr(full_type_name, partition, filter, sort, limit, catalog, serializer, &expr)
}

/// Builds `SELECT DISTINCT d.partition, d.id, <data_expr> AS data FROM ... WHERE ... ORDER BY ...
/// LIMIT ...` (spec §4.E: the read path). `DISTINCT` guards against a document matching more than
/// once through a list-any join fanning a single row out across several array elements.
fn select_with_data_expr(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    sort: Option<&Sort>,
    limit: Option<i64>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
    data_expr: &str,
) -> Result<Compiled, StoreError> {
    // ORDER BY may introduce its own list-any join, so the core is built once with a joins
    // tracker shared across WHERE and ORDER BY by re-deriving the FROM clause afterward.
    let mut joins = Joins::default();
    let mut binds = Vec::new();

    let mut where_writer = SqlWriter::new();
    where_writer.write_str("d.full_type_name = ?");
    binds.push(Bind::Text(full_type_name.to_string()));
    if let Some(partition) = partition {
        where_writer.write_str(" AND d.partition = ?");
        binds.push(Bind::Text(partition.to_string()));
    }
    if let Some(filter) = filter {
        if !filter.is_empty() {
            where_writer.write_str(" AND (");
            write_filter(&mut where_writer, &mut binds, full_type_name, catalog, &mut joins, serializer, filter)?;
            where_writer.write_str(")");
        }
    }

    let mut order_writer = SqlWriter::new();
    if let Some(sort) = sort {
        write_order_by(&mut order_writer, full_type_name, catalog, &mut joins, sort);
    }

    let mut sql = SqlWriter::new();
    sql.write_str("SELECT DISTINCT d.partition, d.id, ");
    sql.write_str(data_expr);
    sql.write_str(" AS data FROM documents d");
    joins.write_clauses(&mut sql);
    sql.write_str(" WHERE ");
    sql.write_str(where_writer.as_str());
    sql.write_str(order_writer.as_str());
    if let Some(limit) = limit {
        sql.write_str(" LIMIT ?");
        binds.push(Bind::Int(limit));
    }

    Ok(Compiled { sql: sql.build(), binds })
}

/// Builds `SELECT COUNT(*) FROM (SELECT DISTINCT d.rowid FROM ... WHERE ...)` (spec §6.1
/// `count_objects`).
pub fn count_documents(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
) -> Result<Compiled, StoreError> {
    let core = build_core(full_type_name, partition, filter, catalog, serializer)?;
    let sql = format!("SELECT COUNT(*) FROM (SELECT DISTINCT d.rowid {})", core.from_and_where);
    Ok(Compiled { sql, binds: core.binds })
}

/// Builds `DELETE FROM documents WHERE rowid IN (SELECT DISTINCT d.rowid FROM ... WHERE ...)`
/// (spec §6.1 `delete_objects`). SQLite's `DELETE` cannot itself carry a `JOIN`, so matching rows
/// are first collected by rowid through the same core used for reads.
pub fn delete_documents(
    full_type_name: &str,
    partition: Option<&str>,
    filter: Option<&Filter>,
    catalog: &IndexCatalog,
    serializer: &dyn Serializer,
) -> Result<Compiled, StoreError> {
    let core = build_core(full_type_name, partition, filter, catalog, serializer)?;
    let sql = format!(
        "DELETE FROM documents WHERE rowid IN (SELECT DISTINCT d.rowid {})",
        core.from_and_where
    );
    Ok(Compiled { sql, binds: core.binds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::serializer::JsonSerializer;

    fn empty_catalog() -> IndexCatalog {
        IndexCatalog::new()
    }

    #[test]
    fn plain_predicate_uses_json_extract() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let filter = Filter::new().eq("Value.IntProperty", 5i64);
        let compiled = select_documents("demo::Widget", None, Some(&filter), None, None, &catalog, &serializer).unwrap();
        assert!(compiled.sql.contains("json_extract(d.data, '$.Value.IntProperty')"));
        assert!(compiled.sql.contains("CAST("));
    }

    #[test]
    fn list_any_predicate_joins_json_each() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let filter = Filter::new().list_any(PredicateKind::Gt, "Values", "FloatProperty", 250.0);
        let compiled = select_documents("demo::Widget", None, Some(&filter), None, None, &catalog, &serializer).unwrap();
        assert!(compiled.sql.contains("JOIN json_each(json_extract(d.data, '$.Values')) AS je_0"));
        assert!(compiled.sql.contains("json_extract(je_0.value, '$.FloatProperty')"));
    }

    #[test]
    fn like_predicate_escapes_and_adds_clause() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let filter = Filter::new().contains("Name", "50%_off");
        let compiled = select_documents("demo::Widget", None, Some(&filter), None, None, &catalog, &serializer).unwrap();
        assert!(compiled.sql.contains("LIKE ? ESCAPE '\\'"));
        match &compiled.binds.last().unwrap() {
            Bind::Text(pattern) => assert_eq!(pattern, "%50\\%\\_off%"),
            other => panic!("expected text bind, got {other:?}"),
        }
    }

    #[test]
    fn delete_reuses_select_core_as_rowid_subquery() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let compiled = delete_documents("demo::Widget", Some("p1"), None, &catalog, &serializer).unwrap();
        assert!(compiled.sql.starts_with("DELETE FROM documents WHERE rowid IN (SELECT DISTINCT d.rowid"));
    }

    #[test]
    fn like_predicate_with_non_text_value_returns_error_instead_of_panicking() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let filter = Filter::new().predicate(PredicateKind::StartsWith, "Name", 5i64);
        let err = select_documents("demo::Widget", None, Some(&filter), None, None, &catalog, &serializer).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn projection_of_a_scalar_leaf_is_wrapped_in_json_quote() {
        let catalog = empty_catalog();
        let serializer = JsonSerializer;
        let projection = Path::parse("Name");
        let compiled =
            select_projection("demo::Widget", None, None, None, None, &catalog, &serializer, &projection).unwrap();
        assert!(compiled.sql.contains("json_quote(json_extract(d.data, '$.Name'))"));
    }
}
