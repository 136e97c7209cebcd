use serde_json::Value;

use crate::{Document, StoreError, StoreResult};

/// Resolve a dotted path (`fullDocument.z`, `items.0`) inside `doc`.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = doc.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Equality filter: every path in `filter` must resolve to an equal value.
///
/// Query operators are not interpreted; `{ "x": { "$gt": 1 } }` only matches
/// a document whose `x` is literally that object.
pub(crate) fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(path, expected)| lookup(doc, path).is_some_and(|actual| same_value(actual, expected)))
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

/// A user pipeline stage appended after `$changeStream`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stage {
    Match(Document),
    /// Top-level inclusion (`true`) or exclusion (`false`) projection.
    Project { fields: Vec<String>, include: bool },
}

impl Stage {
    /// Parse one stage the way the server validates it.
    pub(crate) fn parse(stage: &Document) -> StoreResult<Self> {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreError::server(
                    40323,
                    "Location40323",
                    "A pipeline stage specification object must contain exactly one field.",
                ));
            }
        };
        match (name.as_str(), spec) {
            ("$match", Value::Object(filter)) => Ok(Stage::Match(filter.clone())),
            ("$match", _) => Err(StoreError::server(
                15959,
                "Location15959",
                "the match filter must be an expression in an object",
            )),
            ("$project", Value::Object(spec)) => parse_projection(spec),
            ("$project", _) => Err(StoreError::server(
                15969,
                "Location15969",
                "$project specification must be an object",
            )),
            (other, _) => Err(StoreError::server(
                40324,
                "Location40324",
                format!("Unrecognized pipeline stage name: '{other}'"),
            )),
        }
    }

    /// Apply the stage; `None` means the document is filtered out.
    pub(crate) fn apply(&self, doc: Document) -> Option<Document> {
        match self {
            Stage::Match(filter) => matches_filter(&doc, filter).then_some(doc),
            Stage::Project { fields, include } => Some(
                doc.into_iter()
                    .filter(|(key, _)| key == "_id" || fields.contains(key) == *include)
                    .collect(),
            ),
        }
    }
}

fn parse_projection(spec: &Document) -> StoreResult<Stage> {
    let mut include = None;
    let mut fields = Vec::with_capacity(spec.len());
    for (field, flag) in spec {
        let flag = match flag {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => {
                return Err(StoreError::server(
                    31325,
                    "Location31325",
                    format!("unsupported projection value for '{field}'"),
                ));
            }
        };
        if field == "_id" {
            continue;
        }
        match include {
            None => include = Some(flag),
            Some(mode) if mode != flag => {
                return Err(StoreError::server(
                    31254,
                    "Location31254",
                    "Cannot mix inclusion and exclusion in a projection",
                ));
            }
            Some(_) => {}
        }
        fields.push(field.clone());
    }
    Ok(Stage::Project {
        fields,
        include: include.unwrap_or(false),
    })
}
