//! Expected-driven partial matching of JSON values.
//!
//! The comparator walks the *expected* value. Every field and index named in
//! `expected` must be present and match in `actual`, but `actual` may carry
//! extra object keys and extra trailing array elements. The string `"42"` and
//! the number `42` are wildcards that accept any present, non-null value.
//!
//! ```rust
//! use serde_json::json;
//! use watchspec::matcher::matches;
//!
//! let actual = json!({ "_id": { "_data": "8264" }, "operationType": "insert", "x": 1 });
//! let expected = json!({ "_id": "42", "operationType": "insert" });
//! assert!(matches(Some(&actual), &expected).is_ok());
//! ```

use std::fmt;

use serde_json::Value;

/// The value classes the comparator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueClass {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueClass::Null,
            Value::Bool(_) => ValueClass::Boolean,
            Value::Number(_) => ValueClass::Number,
            Value::String(_) => ValueClass::String,
            Value::Array(_) => ValueClass::Array,
            Value::Object(_) => ValueClass::Object,
        }
    }
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueClass::Null => "null",
            ValueClass::Boolean => "boolean",
            ValueClass::Number => "number",
            ValueClass::String => "string",
            ValueClass::Array => "array",
            ValueClass::Object => "object",
        })
    }
}

/// How an expected value constrains the actual one.
#[derive(Debug, Clone, Copy)]
enum Shape<'a> {
    /// `"42"` or `42`: anything present and non-null.
    Wildcard,
    /// Only null or absent.
    Null,
    Array(&'a [Value]),
    Object(&'a serde_json::Map<String, Value>),
    Scalar(&'a Value),
}

impl<'a> Shape<'a> {
    fn of(expected: &'a Value) -> Self {
        if is_wildcard(expected) {
            return Shape::Wildcard;
        }
        match expected {
            Value::Null => Shape::Null,
            Value::Array(items) => Shape::Array(items),
            Value::Object(fields) => Shape::Object(fields),
            scalar => Shape::Scalar(scalar),
        }
    }
}

fn is_wildcard(expected: &Value) -> bool {
    match expected {
        Value::String(s) => s == "42",
        Value::Number(n) => n.as_f64() == Some(42.0),
        _ => false,
    }
}

/// What went wrong at the first differing position.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchKind {
    /// A wildcard met an absent or null value.
    MissingValue,
    /// The value classes differ. `actual` is `None` when the field is absent.
    TypeMismatch {
        expected: ValueClass,
        actual: Option<ValueClass>,
    },
    /// Expected null or absent, found a value.
    NotNull { actual: Value },
    /// Scalars of the same class that are not equal.
    NotEqual { expected: Value, actual: Value },
}

/// The first discrepancy found by [`matches`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("mismatch at {path}: {kind}")]
pub struct MismatchError {
    path: String,
    kind: MismatchKind,
}

impl MismatchError {
    /// Location of the mismatch, e.g. `$.0.operationType`.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> &MismatchKind {
        &self.kind
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::MissingValue => f.write_str("expected a value but found none"),
            MismatchKind::TypeMismatch {
                expected,
                actual: Some(actual),
            } => write!(f, "expected {expected} but found {actual}"),
            MismatchKind::TypeMismatch {
                expected,
                actual: None,
            } => write!(f, "expected {expected} but field is absent"),
            MismatchKind::NotNull { actual } => write!(f, "expected null but found {actual}"),
            MismatchKind::NotEqual { expected, actual } => {
                write!(f, "expected {expected} but found {actual}")
            }
        }
    }
}

/// Check that `actual` satisfies `expected`.
///
/// `actual` is `None` when the value is absent (a missing object field or an
/// array index past the end).
pub fn matches(actual: Option<&Value>, expected: &Value) -> Result<(), MismatchError> {
    let mut path = Path::root();
    match_at(&mut path, actual, expected)
}

fn match_at(path: &mut Path, actual: Option<&Value>, expected: &Value) -> Result<(), MismatchError> {
    let present = actual.filter(|v| !v.is_null());
    let shape = Shape::of(expected);
    match shape {
        Shape::Wildcard => {
            return match present {
                Some(_) => Ok(()),
                None => Err(path.error(MismatchKind::MissingValue)),
            };
        }
        Shape::Null => {
            return match present {
                None => Ok(()),
                Some(value) => Err(path.error(MismatchKind::NotNull {
                    actual: value.clone(),
                })),
            };
        }
        _ => {}
    }

    let expected_class = ValueClass::of(expected);
    let actual = match present {
        Some(value) if ValueClass::of(value) == expected_class => value,
        _ => {
            return Err(path.error(MismatchKind::TypeMismatch {
                expected: expected_class,
                actual: actual.map(ValueClass::of),
            }));
        }
    };

    match shape {
        Shape::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                path.push(Segment::Index(idx));
                match_at(path, actual.get(idx), item)?;
                path.pop();
            }
            Ok(())
        }
        Shape::Object(fields) => {
            for (key, item) in fields {
                path.push(Segment::Key(key.clone()));
                match_at(path, actual.get(key.as_str()), item)?;
                path.pop();
            }
            Ok(())
        }
        Shape::Scalar(scalar) if !scalars_equal(actual, scalar) => {
            Err(path.error(MismatchKind::NotEqual {
                expected: scalar.clone(),
                actual: actual.clone(),
            }))
        }
        _ => Ok(()),
    }
}

fn scalars_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return a == b;
            }
            if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                return a == b;
            }
            a.as_f64() == b.as_f64()
        }
        _ => actual == expected,
    }
}

enum Segment {
    Index(usize),
    Key(String),
}

struct Path(Vec<Segment>);

impl Path {
    fn root() -> Self {
        Path(Vec::new())
    }

    fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn error(&self, kind: MismatchKind) -> MismatchError {
        MismatchError {
            path: self.to_string(),
            kind,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                Segment::Index(idx) => write!(f, ".{idx}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}
