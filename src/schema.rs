//! Declarative shapes for request payloads and response bodies.
//!
//! A [`Shape`] is an explicit, tagged description of what a JSON value must
//! look like. Validation walks the value against the shape, coercing where the
//! shape allows it (numeric strings into numbers, `"true"`/`"false"` into
//! booleans) and failing on the first field that does not fit.
//!
//! Outbound data goes through [`validate_request`] and fails with a
//! [`ValidationError`]; inbound bodies go through [`validate_response`] and
//! fail with a [`SchemaMismatchError`]. Both are pure functions.
//!
//! # Examples
//!
//! ```
//! use mysale_client::schema::{validate_request, Constraint, Field, Record, Shape};
//! use serde_json::json;
//!
//! let shape: Shape = Record::new("LocationQuantity")
//!     .required("location", Shape::String)
//!     .field(Field::required("quantity", Shape::Integer).constraint(Constraint::Min(0.0)))
//!     .into();
//!
//! let data = validate_request(&shape, json!({"location": "Sydney", "quantity": "25"})).unwrap();
//! assert_eq!(data.as_value(), &json!({"location": "Sydney", "quantity": 25}));
//!
//! let err = validate_request(&shape, json!({"location": "Sydney", "quantity": -1})).unwrap_err();
//! assert_eq!(err.field, "$.quantity");
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::fmt;

/// The expected shape of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Any value, passed through untouched.
    Any,
    /// A JSON string.
    String,
    /// A whole number. Integral floats and numeric strings are coerced.
    Integer,
    /// Any number. Numeric strings are coerced.
    Number,
    /// A boolean. The strings `"true"` and `"false"` are coerced.
    Boolean,
    /// A string holding a UUID, normalized to lowercase hyphenated form.
    Uuid,
    /// An array whose elements all match the inner shape.
    Array(Box<Shape>),
    /// A keyed record.
    Record(Record),
    /// The inner shape, or `null`.
    Nullable(Box<Shape>),
}

impl Shape {
    /// Shorthand for `Shape::Array(Box::new(inner))`.
    pub fn array(inner: impl Into<Shape>) -> Self {
        Shape::Array(Box::new(inner.into()))
    }

    /// Shorthand for `Shape::Nullable(Box::new(inner))`.
    pub fn nullable(inner: impl Into<Shape>) -> Self {
        Shape::Nullable(Box::new(inner.into()))
    }

    fn accepts_null(&self) -> bool {
        matches!(self, Shape::Any | Shape::Nullable(_))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("any value"),
            Shape::String => f.write_str("string"),
            Shape::Integer => f.write_str("integer"),
            Shape::Number => f.write_str("number"),
            Shape::Boolean => f.write_str("boolean"),
            Shape::Uuid => f.write_str("uuid string"),
            Shape::Array(inner) => write!(f, "array of {}", inner),
            Shape::Record(record) => write!(f, "record `{}`", record.name),
            Shape::Nullable(inner) => write!(f, "{} or null", inner),
        }
    }
}

/// What to do with keys a [`Record`] does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    /// Keep them as-is.
    #[default]
    Allow,
    /// Drop them from the validated output.
    Strip,
    /// Fail validation.
    Reject,
}

/// A named, keyed record made of [`Field`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: String,
    fields: Vec<Field>,
    unknown_fields: UnknownFields,
}

impl Record {
    /// Creates an empty record that allows unknown fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unknown_fields: UnknownFields::default(),
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a required field without constraints.
    pub fn required(self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.field(Field::required(name, shape))
    }

    /// Adds an optional field without constraints.
    pub fn optional(self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.field(Field::optional(name, shape))
    }

    /// Sets the policy for undeclared keys.
    pub fn unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// The record name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl From<Record> for Shape {
    fn from(record: Record) -> Self {
        Shape::Record(record)
    }
}

/// A single field of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    shape: Shape,
    required: bool,
    constraints: Vec<Constraint>,
}

impl Field {
    /// A field that must be present and non-null (unless its shape is nullable).
    pub fn required(name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            required: true,
            constraints: Vec::new(),
        }
    }

    /// A field that may be absent. An explicit `null` counts as absent unless
    /// the shape is nullable.
    pub fn optional(name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self {
            required: false,
            ..Self::required(name, shape)
        }
    }

    /// Attaches a constraint, checked after coercion.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Value-level constraints on a [`Field`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Minimum character count for strings, element count for arrays.
    MinLength(usize),
    /// Maximum character count for strings, element count for arrays.
    MaxLength(usize),
    /// Inclusive lower bound for numbers.
    Min(f64),
    /// Inclusive upper bound for numbers.
    Max(f64),
    /// The string must be one of the listed values.
    OneOf(Vec<String>),
}

impl Constraint {
    fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Constraint::MinLength(min), Value::String(s)) if s.chars().count() < *min => {
                Err(format!("string of at least {} characters", min))
            }
            (Constraint::MaxLength(max), Value::String(s)) if s.chars().count() > *max => {
                Err(format!("string of at most {} characters", max))
            }
            (Constraint::MinLength(min), Value::Array(items)) if items.len() < *min => {
                Err(format!("at least {} elements", min))
            }
            (Constraint::MaxLength(max), Value::Array(items)) if items.len() > *max => {
                Err(format!("at most {} elements", max))
            }
            (Constraint::Min(min), Value::Number(n)) if n.as_f64().is_some_and(|v| v < *min) => {
                Err(format!("number >= {}", min))
            }
            (Constraint::Max(max), Value::Number(n)) if n.as_f64().is_some_and(|v| v > *max) => {
                Err(format!("number <= {}", max))
            }
            (Constraint::OneOf(allowed), Value::String(s)) if !allowed.contains(s) => {
                Err(format!("one of [{}]", allowed.join(", ")))
            }
            _ => Ok(()),
        }
    }
}

/// Data that has passed validation against a [`Shape`].
///
/// Only the validators in this module (and the dispatch core, for endpoints
/// without a response shape) construct it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedData(Value);

impl ValidatedData {
    pub(crate) fn empty() -> Self {
        ValidatedData(Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Looks up a top-level key of a validated record.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserializes the validated value into a typed model.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}

/// Outbound data did not match the declared shape. Nothing was sent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("field `{field}`: expected {expected}, found {actual}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `$.order_items[0].sku_qty`.
    pub field: String,
    /// Description of the declared shape or constraint.
    pub expected: String,
    /// Description of what was actually there.
    pub actual: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// An inbound body did not match the declared shape.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatchError {
    /// The body could not be parsed as JSON at all.
    #[error("response body is not valid JSON: {0}")]
    NotJson(String),

    /// A field did not fit the declared shape.
    #[error("response field `{field}`: expected {expected}, found {actual}")]
    Field {
        field: String,
        expected: String,
        actual: String,
    },

    /// The validated payload could not be turned into the requested model.
    #[error("response payload does not fit `{type_name}`: {message}")]
    Deserialize {
        type_name: &'static str,
        message: String,
    },
}

impl From<ValidationError> for SchemaMismatchError {
    fn from(e: ValidationError) -> Self {
        SchemaMismatchError::Field {
            field: e.field,
            expected: e.expected,
            actual: e.actual,
        }
    }
}

/// Validates and coerces outbound data.
pub fn validate_request(shape: &Shape, data: Value) -> Result<ValidatedData, ValidationError> {
    let mut path = String::from("$");
    conform(shape, data, &mut path).map(ValidatedData)
}

/// Parses and validates a raw response body.
///
/// An empty (or whitespace-only) body is treated as `null`.
pub fn validate_response(shape: &Shape, raw: &str) -> Result<ValidatedData, SchemaMismatchError> {
    let value = if raw.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).map_err(|e| SchemaMismatchError::NotJson(e.to_string()))?
    };
    let mut path = String::from("$");
    Ok(conform(shape, value, &mut path).map(ValidatedData)?)
}

fn mismatch(path: &str, expected: impl fmt::Display, actual: &Value) -> ValidationError {
    ValidationError::new(path, expected.to_string(), describe(actual))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) if s.chars().count() > 32 => {
            let head: String = s.chars().take(32).collect();
            format!("string \"{}...\"", head)
        }
        Value::String(s) => format!("string \"{}\"", s),
        Value::Array(items) => format!("array of {} elements", items.len()),
        Value::Object(_) => "object".to_string(),
    }
}

fn conform(shape: &Shape, value: Value, path: &mut String) -> Result<Value, ValidationError> {
    match shape {
        Shape::Any => Ok(value),
        Shape::Nullable(inner) => match value {
            Value::Null => Ok(Value::Null),
            other => conform(inner, other, path),
        },
        Shape::String => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(path, shape, &other)),
        },
        Shape::Integer => coerce_integer(&value).ok_or_else(|| mismatch(path, shape, &value)),
        Shape::Number => coerce_number(&value).ok_or_else(|| mismatch(path, shape, &value)),
        Shape::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(path, shape, &value)),
        },
        Shape::Uuid => match &value {
            Value::String(s) => uuid::Uuid::parse_str(s.trim())
                .map(|id| Value::String(id.hyphenated().to_string()))
                .map_err(|_| mismatch(path, shape, &value)),
            _ => Err(mismatch(path, shape, &value)),
        },
        Shape::Array(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{}]", index));
                    let item = conform(inner, item, path);
                    path.truncate(len);
                    out.push(item?);
                }
                Ok(Value::Array(out))
            }
            other => Err(mismatch(path, shape, &other)),
        },
        Shape::Record(record) => match value {
            Value::Object(map) => conform_record(record, map, path).map(Value::Object),
            other => Err(mismatch(path, shape, &other)),
        },
    }
}

fn conform_record(
    record: &Record,
    mut map: Map<String, Value>,
    path: &mut String,
) -> Result<Map<String, Value>, ValidationError> {
    let mut out = Map::new();

    for field in &record.fields {
        let len = path.len();
        path.push('.');
        path.push_str(&field.name);

        let result = match map.remove(&field.name) {
            Some(Value::Null) if field.shape.accepts_null() => Ok(Some(Value::Null)),
            None | Some(Value::Null) if field.required => Err(ValidationError::new(
                path.as_str(),
                field.shape.to_string(),
                "nothing",
            )),
            None | Some(Value::Null) => Ok(None),
            Some(value) => conform(&field.shape, value, path).and_then(|value| {
                for constraint in &field.constraints {
                    constraint
                        .check(&value)
                        .map_err(|expected| mismatch(path, expected, &value))?;
                }
                Ok(Some(value))
            }),
        };

        path.truncate(len);
        if let Some(value) = result? {
            out.insert(field.name.clone(), value);
        }
    }

    // Only undeclared keys remain in `map` at this point.
    for (key, value) in map {
        match record.unknown_fields {
            UnknownFields::Allow => {
                out.insert(key, value);
            }
            UnknownFields::Strip => {}
            UnknownFields::Reject => {
                return Err(ValidationError::new(
                    format!("{}.{}", path, key),
                    format!("no such field in record `{}`", record.name),
                    describe(&value),
                ));
            }
        }
    }

    Ok(out)
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => {
            let f = n.as_f64()?;
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Some(Value::Number(Number::from(f as i64)))
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}
