//! Directory operation types
//!
//! Types for reads and writes: entries, attribute values, change records,
//! new-entry templates and search filters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dn::escape_filter_value;

/// A value for an attribute, which may be single or multi-valued.
///
/// Variant order matters for untagged deserialization: a YAML list of numbers
/// must become an `Array`, never `Binary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// Multiple values.
    Array(Vec<AttributeValue>),
    /// Binary data.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Get as an integer, parsing single string values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render a scalar value as text. Binary values are decoded as UTF-8.
    ///
    /// Returns `None` for multi-valued attributes.
    pub fn to_text(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Integer(i) => Some(i.to_string()),
            AttributeValue::Binary(b) => Some(String::from_utf8_lossy(b).into_owned()),
            AttributeValue::Array(_) => None,
        }
    }

    /// Flatten into the raw byte values sent over the wire.
    pub fn to_byte_values(&self) -> Vec<Vec<u8>> {
        match self {
            AttributeValue::String(s) => vec![s.as_bytes().to_vec()],
            AttributeValue::Integer(i) => vec![i.to_string().into_bytes()],
            AttributeValue::Binary(b) => vec![b.clone()],
            AttributeValue::Array(arr) => arr.iter().flat_map(Self::to_byte_values).collect(),
        }
    }

    /// Number of values held.
    pub fn value_count(&self) -> usize {
        match self {
            AttributeValue::Array(arr) => arr.len(),
            _ => 1,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect())
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::from).collect())
    }
}

/// A read-only snapshot of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Attribute name to value(s).
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get an attribute value. Attribute names are matched case-insensitively,
    /// preferring an exact match.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_string())
    }

    /// Get all string values of an attribute.
    pub fn get_strings(&self, name: &str) -> Vec<&str> {
        self.get(name).map(|v| v.as_strings()).unwrap_or_default()
    }

    /// Get an attribute as an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AttributeValue::as_i64)
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Check whether the entry carries an object class (case-insensitive).
    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.get_strings("objectClass")
            .iter()
            .any(|oc| oc.eq_ignore_ascii_case(object_class))
    }
}

/// A single attribute change bound to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOperation {
    /// Add values to an attribute.
    Add {
        attribute: String,
        values: Vec<AttributeValue>,
    },
    /// Remove values from an attribute.
    Delete {
        attribute: String,
        values: Vec<AttributeValue>,
    },
    /// Replace all values of an attribute.
    Replace {
        attribute: String,
        values: Vec<AttributeValue>,
    },
}

impl ChangeOperation {
    /// Create an add operation.
    pub fn add(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        ChangeOperation::Add {
            attribute: attribute.into(),
            values,
        }
    }

    /// Create a delete operation.
    pub fn delete(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        ChangeOperation::Delete {
            attribute: attribute.into(),
            values,
        }
    }

    /// Create a replace operation.
    pub fn replace(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        ChangeOperation::Replace {
            attribute: attribute.into(),
            values,
        }
    }

    /// The attribute this operation targets.
    pub fn attribute(&self) -> &str {
        match self {
            ChangeOperation::Add { attribute, .. }
            | ChangeOperation::Delete { attribute, .. }
            | ChangeOperation::Replace { attribute, .. } => attribute,
        }
    }

    /// The values carried by this operation.
    pub fn values(&self) -> &[AttributeValue] {
        match self {
            ChangeOperation::Add { values, .. }
            | ChangeOperation::Delete { values, .. }
            | ChangeOperation::Replace { values, .. } => values,
        }
    }

    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOperation::Add { .. } => "add",
            ChangeOperation::Delete { .. } => "delete",
            ChangeOperation::Replace { .. } => "replace",
        }
    }
}

/// A set of attribute changes applied to one entry in a single modify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Target distinguished name.
    pub dn: String,
    /// Operations, applied in order.
    pub operations: Vec<ChangeOperation>,
}

impl ChangeRecord {
    /// Create an empty change record for an entry.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            operations: Vec::new(),
        }
    }

    /// Append an operation using builder pattern.
    pub fn with(mut self, operation: ChangeOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Append an operation.
    pub fn push(&mut self, operation: ChangeOperation) {
        self.operations.push(operation);
    }

    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Names of the affected attributes, in operation order.
    pub fn attributes(&self) -> Vec<&str> {
        self.operations.iter().map(ChangeOperation::attribute).collect()
    }
}

/// An entry to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Distinguished name of the new entry.
    pub dn: String,
    /// Object classes of the new entry.
    pub object_classes: Vec<String>,
    /// Initial attributes (excluding `objectClass`).
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl NewEntry {
    /// Create a new entry template.
    pub fn new(dn: impl Into<String>, object_classes: Vec<String>) -> Self {
        Self {
            dn: dn.into(),
            object_classes,
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute using builder pattern.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match objects where attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Match objects where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a starts-with filter.
    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Object-class match, the usual first term of every search.
    pub fn object_class(object_class: impl Into<String>) -> Self {
        Filter::eq("objectClass", object_class)
    }
}

/// Renders the filter in RFC 4515 string form with escaped values.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And { filters } => {
                write!(f, "(&")?;
                for inner in filters {
                    write!(f, "{inner}")?;
                }
                write!(f, ")")
            }
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", attribute, escape_filter_value(value))
            }
            Filter::StartsWith { attribute, value } => {
                write!(f, "({}={}*)", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => write!(f, "({attribute}=*)"),
        }
    }
}
