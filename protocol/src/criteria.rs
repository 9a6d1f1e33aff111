use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::cmp::Ordering;
use strum_macros::Display;
use strum_macros::EnumString;

/// Content repositories a query can be routed to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Repository {
    Ingest,
    Archive,
    Published,
    Archived,
}

/// Backend routing hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "repos", rename_all = "snake_case")]
pub enum Routing {
    Single(Repository),
    FanOut(Vec<Repository>),
}

impl Routing {
    pub fn repositories(&self) -> Vec<Repository> {
        match self {
            Routing::Single(repo) => vec![*repo],
            Routing::FanOut(repos) => repos.clone(),
        }
    }

    pub fn includes(&self, repo: Repository) -> bool {
        match self {
            Routing::Single(single) => *single == repo,
            Routing::FanOut(repos) => repos.contains(&repo),
        }
    }
}

/// How spiked content is treated by the baseline predicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpikeMode {
    #[default]
    Exclude,
    Include,
    Only,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortOption {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

impl Default for SortOption {
    fn default() -> Self {
        Self::new("versioncreated", SortDirection::Desc)
    }
}

/// Filter predicate tree. Field names use dotted paths (`task.desk`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Term { field: String, value: Value },
    Terms { field: String, values: Vec<Value> },
    Exists { field: String },
    QueryString { query: String },
    Not { predicate: Box<Predicate> },
    And { predicates: Vec<Predicate> },
    Or { predicates: Vec<Predicate> },
}

impl Predicate {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Predicate::Exists {
            field: field.into(),
        }
    }

    pub fn query_string(query: impl Into<String>) -> Self {
        Predicate::QueryString {
            query: query.into(),
        }
    }

    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not {
            predicate: Box::new(predicate),
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And { predicates }
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or { predicates }
    }

    /// Every node of the tree, depth first, starting with `self`.
    pub fn nodes(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        out.push(self);
        match self {
            Predicate::Not { predicate } => predicate.collect_nodes(out),
            Predicate::And { predicates } | Predicate::Or { predicates } => {
                for predicate in predicates {
                    predicate.collect_nodes(out);
                }
            }
            Predicate::Term { .. }
            | Predicate::Terms { .. }
            | Predicate::Exists { .. }
            | Predicate::QueryString { .. } => {}
        }
    }

    /// Field the node constrains, for leaf predicates.
    pub fn field(&self) -> Option<&str> {
        match self {
            Predicate::Term { field, .. }
            | Predicate::Terms { field, .. }
            | Predicate::Exists { field } => Some(field),
            Predicate::QueryString { .. }
            | Predicate::Not { .. }
            | Predicate::And { .. }
            | Predicate::Or { .. } => None,
        }
    }

    /// Reference evaluation against an item's field map.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Predicate::Term { field, value } => lookup(fields, field)
                .iter()
                .any(|candidate| loosely_equal(candidate, value)),
            Predicate::Terms { field, values } => {
                let candidates = lookup(fields, field);
                values
                    .iter()
                    .any(|value| candidates.iter().any(|c| loosely_equal(c, value)))
            }
            Predicate::Exists { field } => lookup(fields, field).iter().any(|v| !v.is_null()),
            Predicate::QueryString { query } => query_string_matches(fields, query),
            Predicate::Not { predicate } => !predicate.matches(fields),
            Predicate::And { predicates } => predicates.iter().all(|p| p.matches(fields)),
            Predicate::Or { predicates } => predicates.iter().any(|p| p.matches(fields)),
        }
    }
}

/// Backend-agnostic request handed to the query service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Required predicates, all of which must hold.
    pub filters: Vec<Predicate>,
    /// Facet refinement applied after primary filtering; does not affect
    /// ranking or the aggregate total of the primary query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_filters: Vec<Predicate>,
    /// Query string derived from the saved search and the group query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub sort: SortOption,
    pub from: usize,
    pub size: usize,
    pub highlight: bool,
    pub routing: Routing,
}

impl QueryCriteria {
    pub fn with_window(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }

    /// Whether `fields` passes the required filters and the query string.
    pub fn matches_primary(&self, fields: &Map<String, Value>) -> bool {
        self.filters.iter().all(|p| p.matches(fields))
            && self
                .query
                .as_deref()
                .is_none_or(|query| query_string_matches(fields, query))
    }

    pub fn matches_post_filters(&self, fields: &Map<String, Value>) -> bool {
        self.post_filters.iter().all(|p| p.matches(fields))
    }

    /// Ordering of two field maps under this criteria's sort; missing
    /// values sort last regardless of direction.
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        let left = lookup(a, &self.sort.field).into_iter().next();
        let right = lookup(b, &self.sort.field).into_iter().next();
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                match self.sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    }
}

/// Resolves a dotted path, descending into arrays of objects and
/// flattening array leaves.
fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    if let Some(value) = fields.get(path) {
        return flatten(value);
    }
    let mut current: Vec<&Value> = Vec::new();
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return current;
    };
    match fields.get(first) {
        Some(value) => current.push(value),
        None => return current,
    }
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(entries) => {
                    for entry in entries {
                        if let Some(child) = entry.as_object().and_then(|m| m.get(segment)) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current.into_iter().flat_map(flatten).collect()
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(entries) => entries.iter().collect(),
        other => vec![other],
    }
}

fn loosely_equal(candidate: &Value, expected: &Value) -> bool {
    if candidate == expected {
        return true;
    }
    match (candidate, expected) {
        (Value::String(s), Value::Number(_) | Value::Bool(_)) => *s == expected.to_string(),
        (Value::Number(_) | Value::Bool(_), Value::String(s)) => candidate.to_string() == *s,
        _ => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Lenient approximation of a query string: every bare term must occur in
/// some string field; `field:value` terms must match that field.
fn query_string_matches(fields: &Map<String, Value>, query: &str) -> bool {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '(' || c == ')' || c == '"'))
        .filter(|token| !token.is_empty())
        .filter(|token| !matches!(*token, "AND" | "OR" | "NOT"))
        .map(str::to_lowercase)
        .collect();
    terms.iter().all(|term| match term.split_once(':') {
        Some((field, value)) if !field.is_empty() => lookup(fields, field)
            .iter()
            .any(|candidate| value_contains(candidate, value)),
        _ => fields.values().any(|candidate| value_contains(candidate, term)),
    })
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(_) | Value::Bool(_) => value.to_string() == needle,
        Value::Array(entries) => entries.iter().any(|entry| value_contains(entry, needle)),
        Value::Object(map) => map.values().any(|entry| value_contains(entry, needle)),
        Value::Null => false,
    }
}
