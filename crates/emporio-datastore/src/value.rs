//! Statement parameters and column values.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A value bound to a statement parameter or read from a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// SQL `NULL`.
    Null,
    /// `BOOL`.
    Bool(bool),
    /// Any integer column, widened.
    Int64(i64),
    /// Any floating point column, widened.
    Float64(f64),
    /// `TEXT`, `VARCHAR` and anything without a dedicated variant.
    Text(String),
    /// `UUID`.
    Uuid(Uuid),
    /// `TIMESTAMP` / `TIMESTAMPTZ`, normalised to UTC.
    Timestamp(DateTime<Utc>),
    /// `JSON` / `JSONB`.
    Json(serde_json::Value),
}

impl DbValue {
    /// Returns `true` for SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer value, if this is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// UUID value, if this is one.
    #[must_use]
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts to JSON for responses.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int64(v) => serde_json::Value::from(*v),
            Self::Float64(v) => serde_json::Value::from(*v),
            Self::Text(v) => serde_json::Value::String(v.clone()),
            Self::Uuid(v) => serde_json::Value::String(v.to_string()),
            Self::Timestamp(v) => serde_json::Value::String(v.to_rfc3339()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for DbValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row keyed by column name.
pub type Row = HashMap<String, DbValue>;
