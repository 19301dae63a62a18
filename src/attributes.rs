//! Typed attribute mappings and their wire encoding.
//!
//! Callers describe the item they want with an [`Attributes`] map of typed
//! [`AttributeValue`]s. Before a request leaves the client the map is checked
//! against a [`Schema`] and flattened into [`WireAttributes`], the string-keyed,
//! string-valued form the secret service understands:
//!
//! - strings pass through unchanged
//! - integers are 32-bit and become base-10 text (`"42"`, `"-7"`)
//! - booleans become `"true"` or `"false"`
//!
//! [`decode`] performs the inverse on attributes returned by the service.
use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::schema::{AttributeType, Schema};

/// String-keyed attribute map as carried on the wire.
pub type WireAttributes = BTreeMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("attribute '{attribute}' is not declared in schema '{schema}'")]
    Undeclared { schema: String, attribute: String },

    #[error("attribute '{attribute}' expects a {expected} value, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: AttributeType,
        found: AttributeType,
    },

    #[error("invalid {expected} value for attribute '{attribute}': '{value}'")]
    InvalidValue {
        attribute: String,
        expected: AttributeType,
        value: String,
    },
}

/// Reply attributes that do not fit the schema they were decoded with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reply does not match schema '{schema}': attribute '{attribute}' {reason}")]
pub struct SchemaMismatchError {
    pub schema: String,
    pub attribute: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    String(String),
    Integer(i32),
    Boolean(bool),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeType {
        match self {
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Integer(_) => AttributeType::Integer,
            AttributeValue::Boolean(_) => AttributeType::Boolean,
        }
    }

    /// Parses wire text into a value of the given type.
    pub fn parse(kind: AttributeType, text: &str) -> Option<Self> {
        match kind {
            AttributeType::String => Some(AttributeValue::String(text.to_string())),
            AttributeType::Integer => text.parse::<i32>().ok().map(AttributeValue::Integer),
            AttributeType::Boolean => match text {
                "true" => Some(AttributeValue::Boolean(true)),
                "false" => Some(AttributeValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

/// Typed attribute mapping used to identify a stored secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, replacing any previous value for the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a typed mapping from string-keyed, string-valued input, parsing each
    /// value according to the type the schema declares for it.
    ///
    /// Undeclared names are rejected unless the schema allows undefined
    /// attributes, in which case they are kept as strings.
    pub fn from_strings<I, K, V>(schema: &Schema, input: I) -> Result<Self, AttributeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Attributes::new();
        for (name, text) in input {
            let (name, text) = (name.as_ref(), text.as_ref());
            let value = match schema.attribute_type(name) {
                Some(kind) => {
                    AttributeValue::parse(kind, text).ok_or_else(|| AttributeError::InvalidValue {
                        attribute: name.to_string(),
                        expected: kind,
                        value: text.to_string(),
                    })?
                }
                None if schema.allows_undefined() => AttributeValue::String(text.to_string()),
                None => {
                    return Err(AttributeError::Undeclared {
                        schema: schema.name().to_string(),
                        attribute: name.to_string(),
                    });
                }
            };
            out.0.insert(name.to_string(), value);
        }
        Ok(out)
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Validates `attributes` against `schema` and converts them to wire form.
pub fn encode(schema: &Schema, attributes: &Attributes) -> Result<WireAttributes, AttributeError> {
    let mut wire = WireAttributes::new();
    for (name, value) in attributes.iter() {
        match schema.attribute_type(name) {
            Some(expected) if expected != value.kind() => {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.to_string(),
                    expected,
                    found: value.kind(),
                });
            }
            Some(_) => {}
            None if schema.allows_undefined() => {}
            None => {
                return Err(AttributeError::Undeclared {
                    schema: schema.name().to_string(),
                    attribute: name.to_string(),
                });
            }
        }
        wire.insert(name.to_string(), value.to_string());
    }
    Ok(wire)
}

/// Converts wire attributes back into typed values.
///
/// Keys the schema does not declare are dropped when the schema allows undefined
/// attributes and rejected otherwise.
pub fn decode(schema: &Schema, wire: &WireAttributes) -> Result<Attributes, SchemaMismatchError> {
    let mut out = Attributes::new();
    for (name, text) in wire {
        let Some(kind) = schema.attribute_type(name) else {
            if schema.allows_undefined() {
                continue;
            }
            return Err(SchemaMismatchError {
                schema: schema.name().to_string(),
                attribute: name.clone(),
                reason: "is not declared".to_string(),
            });
        };

        let value = AttributeValue::parse(kind, text).ok_or_else(|| SchemaMismatchError {
            schema: schema.name().to_string(),
            attribute: name.clone(),
            reason: format!("is not a valid {kind}: '{text}'"),
        })?;
        out.0.insert(name.clone(), value);
    }
    Ok(out)
}
