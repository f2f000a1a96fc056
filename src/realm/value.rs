//! JavaScript-style values
//!
//! The value universe the engine observes: primitives plus object handles.
//! Equality follows `===` semantics (object identity, `NaN != NaN`).

use std::fmt;

use super::object::JsObject;

/// A realm value
#[derive(Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(JsObject),
}

impl JsValue {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Create a number value
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// The `typeof` tag for this value
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(o) => {
                if o.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Borrow the object handle, if this is an object
    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Whether this value is a callable object
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Object(o) if o.is_callable())
    }

    /// Best-effort display rendering (ToString-like, for messages and logs)
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Object(o) => match o.function_name() {
                Some(name) => format!("function {}", name),
                None => format!("[object {}]", o.class()),
            },
        }
    }

    /// Best-effort JSON snapshot for event payloads.
    ///
    /// Strings are capped at `limit` characters; objects collapse to a
    /// summary string. The snapshot never aliases the live value, so
    /// logging cannot affect what the page observes.
    pub fn snapshot(&self, limit: usize) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(truncate(s, limit)),
            Self::Object(o) => {
                let summary = match o.function_name() {
                    Some(name) => format!("function {}", name),
                    None => format!("[object {}]", o.class()),
                };
                serde_json::Value::String(summary)
            }
        }
    }
}

fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => JsObject::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Object(o) => write!(f, "{:?}", o),
        }
    }
}
