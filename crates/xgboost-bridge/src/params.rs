//! Booster parameters.
//!
//! The native library takes parameters as `(name, value)` string pairs.
//! [`ParamValue`] is the closed set of value types this crate accepts and
//! [`Params`] keeps them in insertion order until they are encoded.
//!
//! Encoding is locale-independent: floats always use `.` as the decimal
//! separator and booleans render as `true` / `false`.
//!
//! # Example
//!
//! ```
//! use xgboost_bridge::Params;
//!
//! let params = Params::new()
//!     .with("objective", "multi:softprob")
//!     .with("num_class", 3)
//!     .with("eta", 0.3)
//!     .with("validate_parameters", true);
//!
//! assert_eq!(params.num_class().unwrap(), Some(3));
//! assert_eq!(params.encode()[2], ("eta".to_string(), "0.3".to_string()));
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Result, XgbError};

/// Name of the class-count parameter.
pub const NUM_CLASS: &str = "num_class";

// =============================================================================
// ParamValue
// =============================================================================

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    /// Canonical string passed to the native library.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for ParamValue {
    /// Widened through the shortest decimal form so `0.1f32` encodes as `0.1`.
    fn from(v: f32) -> Self {
        Self::Float(v.to_string().parse().unwrap_or(f64::from(v)))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// =============================================================================
// Params
// =============================================================================

/// Insertion-ordered parameter set.
///
/// Re-inserting a name replaces its value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: IndexMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.insert(name.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode every parameter to its canonical `(name, value)` string pair,
    /// in application order.
    pub fn encode(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.encode()))
            .collect()
    }

    /// The `num_class` parameter, if present.
    ///
    /// `0` is the native library's "not multi-class" default and yields
    /// `Some(1)`.
    ///
    /// # Errors
    ///
    /// `Configuration` if the value is not a non-negative integer (or a
    /// string holding one).
    pub fn num_class(&self) -> Result<Option<usize>> {
        let Some(value) = self.values.get(NUM_CLASS) else {
            return Ok(None);
        };
        let parsed = match value {
            ParamValue::Int(n) => usize::try_from(*n).ok(),
            ParamValue::Str(s) => s.trim().parse::<usize>().ok(),
            ParamValue::Float(_) | ParamValue::Bool(_) => None,
        };
        match parsed {
            Some(n) => Ok(Some(n.max(1))),
            None => Err(XgbError::Configuration(format!(
                "parameter '{NUM_CLASS}' must be a non-negative integer, got {} value {value}",
                value.type_name()
            ))),
        }
    }

    /// Build from a loosely typed JSON object.
    ///
    /// Numbers become `Int` when they are integral and fit in `i64`, `Float`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// `Configuration` if `json` is not an object, or a value is null, an
    /// array or an object. The message names the parameter and its type.
    pub fn from_json(json: &Value) -> Result<Self> {
        let Value::Object(map) = json else {
            return Err(XgbError::Configuration(format!(
                "parameters must be a JSON object, got {}",
                json_type_name(json)
            )));
        };
        let mut params = Self::new();
        for (name, value) in map {
            let value = match value {
                Value::Bool(b) => ParamValue::Bool(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => ParamValue::Int(i),
                    None => ParamValue::Float(n.as_f64().ok_or_else(|| {
                        XgbError::Configuration(format!("parameter '{name}' has unrepresentable number {n}"))
                    })?),
                },
                Value::String(s) => ParamValue::Str(s.clone()),
                other => {
                    return Err(XgbError::Configuration(format!(
                        "unsupported type for parameter '{name}': {}",
                        json_type_name(other)
                    )))
                }
            };
            params.insert(name.clone(), value);
        }
        Ok(params)
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl<K, V> Extend<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
