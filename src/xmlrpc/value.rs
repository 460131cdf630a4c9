//! The XML-RPC value tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A decoded XML-RPC value.
///
/// Exactly one kind is held at a time. [`Value::Void`] stands for a `<value>`
/// element with nothing in it, and is also what the collector records when a
/// call for a station failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// `<int>` or `<i4>`
    Int(i32),
    Double(f64),
    /// `<boolean>`, `0` or `1` on the wire
    Boolean(bool),
    String(String),
    /// `<dateTime.iso8601>`, kept verbatim
    DateTime(String),
    /// `<base64>`, already decoded
    Base64(Vec<u8>),
    Struct(Vec<Member>),
    Array(Vec<Value>),
    /// Text directly inside `<value>` without a type tag.
    ///
    /// The pGuide service omits the `<string>` wrapper on some fields.
    RawText(String),
    Void,
}

/// One named entry of a struct. Order is preserved as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub value: Value,
}

impl Member {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl Value {
    /// Builds a struct value from `(name, value)` pairs.
    pub fn structure<N: Into<String>>(members: impl IntoIterator<Item = (N, Value)>) -> Self {
        Value::Struct(
            members
                .into_iter()
                .map(|(name, value)| Member::new(name, value))
                .collect(),
        )
    }

    /// Short name of the held kind, for log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::RawText(_) => "raw text",
            Value::Void => "void",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Text of a `<string>` or of an untyped value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::RawText(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Member]> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Looks up a struct member. Duplicated names resolve to the last one.
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.as_struct()?
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| &m.value)
    }
}

/// Indexes struct members by name; later duplicates overwrite earlier ones.
pub fn members_by_name(members: &[Member]) -> HashMap<&str, &Value> {
    let mut map = HashMap::with_capacity(members.len());
    for m in members {
        map.insert(m.name.as_str(), &m.value);
    }
    map
}
