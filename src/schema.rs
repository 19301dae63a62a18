//! Attribute schemas.
//!
//! A [`Schema`] names a contract between the client and the secret service: which
//! attribute names an item may carry and the type of value each one holds. Every
//! request built by this crate is validated against a schema before anything is
//! written to the wire, and replies are decoded through the same schema.
//!
//! # Example
//! ```rust
//! use strongbox::schema::{AttributeType, Schema, SchemaFlags};
//!
//! let schema = Schema::define(
//!     "org.example.Password",
//!     SchemaFlags::NONE,
//!     [("user", AttributeType::String), ("port", AttributeType::Integer)],
//! )
//! .unwrap();
//!
//! assert_eq!(schema.attribute_type("port"), Some(AttributeType::Integer));
//! assert!(schema.attribute_type("host").is_none());
//! ```
//!
//! Schemas are immutable once defined and cheap to clone; clones share the same
//! declaration list.
use std::{fmt, ops::BitOr, sync::Arc};

use thiserror::Error;

/// Upper bound on the number of attributes a schema may declare.
pub const MAX_ATTRIBUTES: usize = 32;

pub const SCHEMA_GENERIC: &str = "org.freedesktop.Secret.Generic";
pub const SCHEMA_NETWORK: &str = "org.gnome.keyring.NetworkPassword";
pub const SCHEMA_NOTE: &str = "org.gnome.keyring.Note";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema name must not be empty")]
    EmptyName,

    #[error("schema '{schema}' declares an attribute with an empty name")]
    EmptyAttributeName { schema: String },

    #[error("schema '{schema}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute { schema: String, attribute: String },

    #[error("schema '{schema}' declares more than 32 attributes")]
    TooManyAttributes { schema: String },

    #[error("unrecognized attribute type '{0}'")]
    UnknownType(String),
}

/// Type of value an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    Integer,
    Boolean,
}

impl TryFrom<u8> for AttributeType {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AttributeType::String),
            1 => Ok(AttributeType::Integer),
            2 => Ok(AttributeType::Boolean),
            v => Err(SchemaError::UnknownType(v.to_string())),
        }
    }
}

impl TryFrom<&str> for AttributeType {
    type Error = SchemaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "string" | "str" => Ok(AttributeType::String),
            "integer" | "int" => Ok(AttributeType::Integer),
            "boolean" | "bool" => Ok(AttributeType::Boolean),
            _ => Err(SchemaError::UnknownType(value.to_string())),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Boolean => "boolean",
        };
        write!(f, "{name}")
    }
}

/// Matching strictness of a schema.
///
/// With [`SchemaFlags::NONE`] only declared attributes are accepted. With
/// [`SchemaFlags::ALLOW_UNDEFINED`] undeclared attributes are passed through as
/// strings when encoding and silently dropped when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SchemaFlags(u32);

impl SchemaFlags {
    pub const NONE: SchemaFlags = SchemaFlags(0);
    pub const ALLOW_UNDEFINED: SchemaFlags = SchemaFlags(1 << 0);

    pub fn contains(self, other: SchemaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for SchemaFlags {
    type Output = SchemaFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SchemaFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SchemaInner {
    name: String,
    flags: SchemaFlags,
    attributes: Vec<(String, AttributeType)>,
}

/// Named, typed attribute contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema(Arc<SchemaInner>);

impl Schema {
    /// Defines a new schema from an ordered list of attribute declarations.
    pub fn define<I, N>(name: &str, flags: SchemaFlags, attributes: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (N, AttributeType)>,
        N: Into<String>,
    {
        if name.is_empty() {
            return Err(SchemaError::EmptyName);
        }

        let mut declared: Vec<(String, AttributeType)> = Vec::new();
        for (attribute, kind) in attributes {
            let attribute = attribute.into();
            if attribute.is_empty() {
                return Err(SchemaError::EmptyAttributeName {
                    schema: name.to_string(),
                });
            }
            if declared.iter().any(|(n, _)| *n == attribute) {
                return Err(SchemaError::DuplicateAttribute {
                    schema: name.to_string(),
                    attribute,
                });
            }
            if declared.len() == MAX_ATTRIBUTES {
                return Err(SchemaError::TooManyAttributes {
                    schema: name.to_string(),
                });
            }
            declared.push((attribute, kind));
        }

        Ok(Self(Arc::new(SchemaInner {
            name: name.to_string(),
            flags,
            attributes: declared,
        })))
    }

    /// Like [`Schema::define`] but with attribute types given by name
    /// (`"string"`, `"integer"`, `"boolean"`).
    pub fn define_named<'a, I>(
        name: &str,
        flags: SchemaFlags,
        attributes: I,
    ) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let typed = attributes
            .into_iter()
            .map(|(n, t)| AttributeType::try_from(t).map(|t| (n, t)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::define(name, flags, typed)
    }

    /// Schema for generic secrets; accepts any attribute as a string.
    pub fn generic() -> Self {
        Self(Arc::new(SchemaInner {
            name: SCHEMA_GENERIC.to_string(),
            flags: SchemaFlags::ALLOW_UNDEFINED,
            attributes: Vec::new(),
        }))
    }

    /// Schema for network passwords.
    pub fn network() -> Self {
        let attributes = [
            ("user", AttributeType::String),
            ("domain", AttributeType::String),
            ("object", AttributeType::String),
            ("protocol", AttributeType::String),
            ("port", AttributeType::Integer),
            ("server", AttributeType::String),
            ("authtype", AttributeType::String),
        ];
        Self(Arc::new(SchemaInner {
            name: SCHEMA_NETWORK.to_string(),
            flags: SchemaFlags::NONE,
            attributes: attributes
                .into_iter()
                .map(|(n, t)| (n.to_string(), t))
                .collect(),
        }))
    }

    /// Schema for notes, which carry no attributes.
    pub fn note() -> Self {
        Self(Arc::new(SchemaInner {
            name: SCHEMA_NOTE.to_string(),
            flags: SchemaFlags::NONE,
            attributes: Vec::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn flags(&self) -> SchemaFlags {
        self.0.flags
    }

    pub fn allows_undefined(&self) -> bool {
        self.0.flags.contains(SchemaFlags::ALLOW_UNDEFINED)
    }

    /// Declared attributes, in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, AttributeType)> {
        self.0.attributes.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.0
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_keeps_declaration_order() {
        let schema = Schema::define(
            "org.mock.type.Store",
            SchemaFlags::NONE,
            [
                ("number", AttributeType::Integer),
                ("string", AttributeType::String),
                ("even", AttributeType::Boolean),
            ],
        )
        .unwrap();

        let names: Vec<&str> = schema.attributes().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["number", "string", "even"]);
        assert_eq!(schema.name(), "org.mock.type.Store");
        assert_eq!(schema.attribute_type("even"), Some(AttributeType::Boolean));
    }

    #[test]
    fn duplicate_attribute_rejected() {
        let err = Schema::define(
            "dup",
            SchemaFlags::NONE,
            [("a", AttributeType::String), ("a", AttributeType::Integer)],
        )
        .unwrap_err();

        assert_eq!(
            err,
            SchemaError::DuplicateAttribute {
                schema: "dup".into(),
                attribute: "a".into()
            }
        );
    }

    #[test]
    fn unknown_type_rejected() {
        let err = Schema::define_named("x", SchemaFlags::NONE, [("a", "float")]).unwrap_err();
        assert_eq!(err, SchemaError::UnknownType("float".into()));

        assert!(AttributeType::try_from(7_u8).is_err());
        assert_eq!(AttributeType::try_from(1_u8), Ok(AttributeType::Integer));
    }

    #[test]
    fn empty_names_rejected() {
        assert_eq!(
            Schema::define("", SchemaFlags::NONE, Vec::<(&str, AttributeType)>::new())
                .unwrap_err(),
            SchemaError::EmptyName
        );
        assert!(matches!(
            Schema::define("x", SchemaFlags::NONE, [("", AttributeType::String)]),
            Err(SchemaError::EmptyAttributeName { .. })
        ));
    }

    #[test]
    fn attribute_limit_enforced() {
        let attributes = (0..=MAX_ATTRIBUTES).map(|i| (format!("a{i}"), AttributeType::String));
        let err = Schema::define("big", SchemaFlags::NONE, attributes).unwrap_err();
        assert!(matches!(err, SchemaError::TooManyAttributes { .. }));
    }

    #[test]
    fn flags_combine() {
        let flags = SchemaFlags::NONE | SchemaFlags::ALLOW_UNDEFINED;
        assert!(flags.contains(SchemaFlags::ALLOW_UNDEFINED));
        assert!(!SchemaFlags::NONE.contains(SchemaFlags::ALLOW_UNDEFINED));
    }

    #[test]
    fn predefined_schemas() {
        assert!(Schema::generic().allows_undefined());
        assert_eq!(
            Schema::network().attribute_type("port"),
            Some(AttributeType::Integer)
        );
        assert_eq!(Schema::note().attributes().count(), 0);
    }
}
