//! Typed request descriptors with deterministic serialization.
//!
//! Parameters live in a `BTreeMap`, so iteration order depends only on key
//! names, never on insertion order or map internals. Two logically identical
//! requests therefore produce byte-identical cache keys and query strings.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single query parameter value.
///
/// Strings pass through untouched, scalars stringify the obvious way, and
/// structured values are carried as JSON and rendered compactly.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
}

impl ParamValue {
    /// Render the value the way it appears in a query string (before
    /// percent-encoding).
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(number) => number.to_string(),
            Self::Float(number) => number.to_string(),
            Self::Bool(flag) => flag.to_string(),
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Query parameters with stable iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, consuming and returning the set for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Add a parameter in place. Reinserting a key replaces its value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// A fully described gateway request: endpoint path plus parameters.
///
/// The endpoint is stored without a leading slash so `"items"` and
/// `"/items"` describe the same request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    endpoint: String,
    params: Params,
}

impl RequestDescriptor {
    /// Create a descriptor for `endpoint` with `params`.
    pub fn new(endpoint: impl Into<String>, params: Params) -> Self {
        let endpoint = endpoint.into();
        let endpoint = endpoint.trim_start_matches('/').to_string();
        Self { endpoint, params }
    }

    /// The endpoint path, relative to the portal base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Deterministic cache key: the endpoint, then `key=value` pairs in key
    /// order.
    pub fn cache_key(&self) -> String {
        if self.params.is_empty() {
            return self.endpoint.clone();
        }

        let query: Vec<String> = self
            .params
            .iter()
            .map(|(key, value)| format!("{key}={}", value.render()))
            .collect();
        format!("{}?{}", self.endpoint, query.join("&"))
    }
}
