//! Attribute values for identity table items
//!
//! The document store holds schemaless items: a map from attribute name to
//! a typed [`AttributeValue`]. Only the four shapes identity records need
//! are modelled.
//!
//! Absent optional attributes are omitted from the item rather than stored
//! as a null.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string
    S(String),
    /// Number, carried as its decimal text
    N(String),
    /// Boolean
    Bool(bool),
    /// Ordered list
    L(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::L(_) => "L",
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as list slice
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::L(l) => Some(l),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::S(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::N(n.to_string())
    }
}

/// One document store item
pub type Item = BTreeMap<String, AttributeValue>;

/// Incremental item construction that skips absent optionals
#[derive(Debug, Default)]
pub struct ItemBuilder {
    item: Item,
}

impl ItemBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute
    pub fn set(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.item.insert(name.to_string(), value.into());
        self
    }

    /// Set an attribute only when present
    pub fn set_opt(self, name: &str, value: Option<&String>) -> Self {
        match value {
            Some(v) => self.set(name, v.as_str()),
            None => self,
        }
    }

    /// Finish the item
    pub fn build(self) -> Item {
        self.item
    }
}
