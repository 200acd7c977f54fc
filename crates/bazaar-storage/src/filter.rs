//! Document filter language.
//!
//! A small MongoDB-style predicate language over JSON documents. Filters are
//! parsed once into a [`Filter`] tree; parsing rejects every operator it does
//! not understand, so evaluation itself is infallible.
//!
//! Supported: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//! `$in`, `$nin`, `$exists`, `$regex` (+ `$options`), `$and`, `$or`, `$nor`.
//! Dotted paths address nested fields and array indexes.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use bazaar_core::error::BazaarError;

fn invalid(msg: impl Into<String>) -> BazaarError {
    BazaarError::InvalidQuery(msg.into())
}

// =============================================================================
// Filter
// =============================================================================

/// Parsed predicate tree.
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, condition: Condition },
}

/// A condition on a single field.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    /// Several operators applied to the same field, e.g. `{"$gte": 1, "$lt": 5}`.
    All(Vec<Condition>),
}

impl Filter {
    /// A filter matching every document.
    pub fn match_all() -> Self {
        Filter::And(Vec::new())
    }

    /// Equality on one field.
    pub fn eq(path: &str, value: Value) -> Self {
        Filter::Field {
            path: path.to_string(),
            condition: Condition::Eq(value),
        }
    }

    /// Conjoin two filters.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut clauses) => {
                clauses.push(other);
                Filter::And(clauses)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Parse a JSON filter document.
    pub fn parse(value: &Value) -> Result<Self, BazaarError> {
        let map = value
            .as_object()
            .ok_or_else(|| invalid("filter must be a JSON object"))?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, val) in map {
            let clause = match key.as_str() {
                "$and" => Filter::And(parse_clause_list(key, val)?),
                "$or" => Filter::Or(parse_clause_list(key, val)?),
                "$nor" => Filter::Nor(parse_clause_list(key, val)?),
                k if k.starts_with('$') => {
                    return Err(invalid(format!("unsupported top-level operator {}", k)))
                }
                path => Filter::Field {
                    path: path.to_string(),
                    condition: Condition::parse(path, val)?,
                },
            };
            clauses.push(clause);
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        })
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Filter::Field { path, condition } => condition.matches(lookup(doc, path)),
        }
    }

    /// Every condition attached to `path`, anywhere in the tree.
    pub fn conditions_on<'a>(&'a self, path: &str) -> Vec<&'a Condition> {
        let mut found = Vec::new();
        self.collect_conditions(path, &mut found);
        found
    }

    fn collect_conditions<'a>(&'a self, path: &str, out: &mut Vec<&'a Condition>) {
        match self {
            Filter::And(clauses) | Filter::Or(clauses) | Filter::Nor(clauses) => {
                for clause in clauses {
                    clause.collect_conditions(path, out);
                }
            }
            Filter::Field {
                path: field,
                condition,
            } => {
                if field == path {
                    out.push(condition);
                }
            }
        }
    }

    /// Top-level scalar equalities on plain (undotted) fields.
    ///
    /// Every document matching the filter necessarily satisfies these, so the
    /// store can push them down into SQL as a pre-filter.
    pub fn equality_hints(&self) -> Vec<(&str, &Value)> {
        let mut hints = Vec::new();
        self.collect_hints(&mut hints);
        hints
    }

    fn collect_hints<'a>(&'a self, out: &mut Vec<(&'a str, &'a Value)>) {
        match self {
            Filter::And(clauses) => {
                for clause in clauses {
                    clause.collect_hints(out);
                }
            }
            Filter::Field {
                path,
                condition: Condition::Eq(value),
            } if is_plain_field(path) && is_scalar(value) => out.push((path.as_str(), value)),
            _ => {}
        }
    }
}

fn parse_clause_list(op: &str, value: &Value) -> Result<Vec<Filter>, BazaarError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} expects an array", op)))?;
    if items.is_empty() {
        return Err(invalid(format!("{} expects a non-empty array", op)));
    }
    items.iter().map(Filter::parse).collect()
}

fn is_plain_field(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

// =============================================================================
// Condition
// =============================================================================

impl Condition {
    fn parse(path: &str, value: &Value) -> Result<Self, BazaarError> {
        let ops = match value {
            Value::Object(map) if !map.is_empty() => map,
            other => return Ok(Condition::Eq(other.clone())),
        };

        let operator_keys = ops.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(Condition::Eq(value.clone()));
        }
        if operator_keys != ops.len() {
            return Err(invalid(format!(
                "field {} mixes operators and literal keys",
                path
            )));
        }

        let mut conditions = Vec::with_capacity(ops.len());
        for (op, operand) in ops {
            let condition = match op.as_str() {
                "$eq" => Condition::Eq(operand.clone()),
                "$ne" => Condition::Ne(operand.clone()),
                "$gt" => Condition::Gt(operand.clone()),
                "$gte" => Condition::Gte(operand.clone()),
                "$lt" => Condition::Lt(operand.clone()),
                "$lte" => Condition::Lte(operand.clone()),
                "$in" => Condition::In(array_operand(op, operand)?),
                "$nin" => Condition::Nin(array_operand(op, operand)?),
                "$exists" => Condition::Exists(truthy(operand).ok_or_else(|| {
                    invalid(format!("$exists on {} expects a boolean", path))
                })?),
                "$regex" => Condition::Regex(build_regex(path, operand, ops.get("$options"))?),
                "$options" => {
                    if !ops.contains_key("$regex") {
                        return Err(invalid(format!("$options on {} without $regex", path)));
                    }
                    continue;
                }
                other => {
                    return Err(invalid(format!(
                        "unsupported operator {} on field {}",
                        other, path
                    )))
                }
            };
            conditions.push(condition);
        }

        Ok(match conditions.len() {
            1 => conditions.remove(0),
            _ => Condition::All(conditions),
        })
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => equals(value, expected),
            Condition::Ne(expected) => !equals(value, expected),
            Condition::Gt(bound) => ordering(value, bound) == Some(Ordering::Greater),
            Condition::Gte(bound) => matches!(
                ordering(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(bound) => ordering(value, bound) == Some(Ordering::Less),
            Condition::Lte(bound) => matches!(
                ordering(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::In(options) => options.iter().any(|o| equals(value, o)),
            Condition::Nin(options) => !options.iter().any(|o| equals(value, o)),
            Condition::Exists(flag) => value.is_some() == *flag,
            Condition::Regex(re) => value
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(value)),
        }
    }
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>, BazaarError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("{} expects an array", op)))
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn build_regex(path: &str, pattern: &Value, options: Option<&Value>) -> Result<Regex, BazaarError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| invalid(format!("$regex on {} expects a string", path)))?;
    let options = match options {
        None => "",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(invalid(format!("$options on {} expects a string", path))),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(invalid(format!("unsupported regex option {}", other))),
        };
    }
    builder
        .size_limit(1 << 20)
        .build()
        .map_err(|e| invalid(format!("invalid regex on {}: {}", path, e)))
}

// =============================================================================
// Value helpers
// =============================================================================

/// Resolve a dotted path inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Equality with numeric cross-type comparison (`42 == 42.0`).
///
/// A missing field equals `null`, as in MongoDB.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) => values_equal(v, expected),
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering between values of the same kind; `None` across kinds.
fn ordering(value: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (value?, bound) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting, following MongoDB's cross-type ranking.
fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Field selection applied to result documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn parse(value: &Value) -> Result<Self, BazaarError> {
        let map = value
            .as_object()
            .ok_or_else(|| invalid("projection must be a JSON object"))?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (path, flag) in map {
            match truthy(flag) {
                Some(true) => include.push(path.clone()),
                Some(false) => exclude.push(path.clone()),
                None => {
                    return Err(invalid(format!(
                        "projection value for {} must be 0/1 or a boolean",
                        path
                    )))
                }
            }
        }

        // `_id` may be suppressed alongside an inclusion list.
        if !include.is_empty() {
            exclude.retain(|path| path != "_id");
        }

        match (include.is_empty(), exclude.is_empty()) {
            (false, false) => Err(invalid("projection cannot mix inclusion and exclusion")),
            (false, true) => Ok(Projection::Include(include)),
            _ => Ok(Projection::Exclude(exclude)),
        }
    }

    pub fn apply(&self, doc: &Value) -> Value {
        match self {
            Projection::Include(paths) => {
                let mut out = Value::Object(Map::new());
                for path in paths {
                    if let Some(v) = lookup(doc, path) {
                        set_path(&mut out, path, v.clone());
                    }
                }
                out
            }
            Projection::Exclude(paths) => {
                let mut out = doc.clone();
                for path in paths {
                    remove_path(&mut out, path);
                }
                out
            }
        }
    }
}

fn set_path(target: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut current = target;
    for segment in parents {
        let map = match current {
            Value::Object(map) => map,
            _ => return,
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = current {
        map.insert(leaf.to_string(), value);
    }
}

fn remove_path(target: &mut Value, path: &str) {
    match path.rsplit_once('.') {
        None => {
            if let Value::Object(map) = target {
                map.remove(path);
            }
        }
        Some((parent, leaf)) => {
            let mut current = target;
            for segment in parent.split('.') {
                current = match current {
                    Value::Object(map) => match map.get_mut(segment) {
                        Some(next) => next,
                        None => return,
                    },
                    _ => return,
                };
            }
            if let Value::Object(map) = current {
                map.remove(leaf);
            }
        }
    }
}

// =============================================================================
// Sort
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordered list of sort keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec(pub Vec<(String, SortDirection)>);

impl SortSpec {
    pub fn parse(value: &Value) -> Result<Self, BazaarError> {
        let map = value
            .as_object()
            .ok_or_else(|| invalid("sort must be a JSON object"))?;

        let mut keys = Vec::with_capacity(map.len());
        for (path, dir) in map {
            let direction = match dir {
                Value::Number(n) if n.as_f64() == Some(1.0) => SortDirection::Ascending,
                Value::Number(n) if n.as_f64() == Some(-1.0) => SortDirection::Descending,
                Value::String(s) if s == "asc" || s == "ascending" => SortDirection::Ascending,
                Value::String(s) if s == "desc" || s == "descending" => SortDirection::Descending,
                _ => {
                    return Err(invalid(format!(
                        "sort direction for {} must be 1 or -1",
                        path
                    )))
                }
            };
            keys.push((path.clone(), direction));
        }
        Ok(SortSpec(keys))
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (path, direction) in &self.0 {
            let ord = sort_compare(lookup(a, path), lookup(b, path));
            let ord = match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

// =============================================================================
// Tests
// =============================================================================
