//! Values crossing the host/engine boundary
//!
//! Everything that travels between host threads and the engine thread is
//! expressed in this small value enum. Functions and promises never cross
//! by reference: they cross as opaque handles resolved against the engine
//! tables on the engine thread.

use rustc_hash::FxHashMap;

use crate::engine::promise::PromiseId;
use crate::error::ScriptError;

/// Opaque handle to a callable stored in the engine's function table.
pub type FunctionId = u64;

/// A script-level value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(FxHashMap<String, ScriptValue>),
    /// Handle to a promise in the engine's promise table
    Promise(PromiseId),
    /// Handle to a callable in the engine's function table
    Function(FunctionId),
}

impl ScriptValue {
    /// Build an object value from key/value pairs.
    pub fn object(entries: impl IntoIterator<Item = (String, ScriptValue)>) -> Self {
        Self::Object(entries.into_iter().collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a property on an object value.
    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// The string a script would see from `String(value)`.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Promise(_) => "[object Promise]".to_string(),
            Self::Function(_) => "function () { [native code] }".to_string(),
        }
    }

    /// Convert a JSON document into a value.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON document. Returns `None` for values with no JSON
    /// representation (promise and function handles, non-finite numbers
    /// become `null` as `JSON.stringify` does).
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Undefined | Self::Null => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Self::Number(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Self::String(s) => Some(serde_json::Value::String(s.clone())),
            Self::Array(items) => items
                .iter()
                .map(|v| v.to_json())
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Self::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Some(serde_json::Value::Object(out))
            }
            Self::Promise(_) | Self::Function(_) => None,
        }
    }
}

impl From<ScriptError> for ScriptValue {
    /// The object shape rejections travel in: `{ name, message }`.
    fn from(err: ScriptError) -> Self {
        Self::object([
            ("name".to_string(), Self::String(err.name)),
            ("message".to_string(), Self::String(err.message)),
        ])
    }
}

/// Format a number the way script string conversion does: integral values
/// print without a fractional part.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Result of invoking a script callable.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The callable returned a plain value
    Value(ScriptValue),
    /// The callable returned a pending or settled promise
    Promise(PromiseId),
}
