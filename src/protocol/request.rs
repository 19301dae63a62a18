use bincode::{Decode, Encode};

use crate::{
    attributes::{self, AttributeError, Attributes, WireAttributes},
    schema::Schema,
    secret::Secret,
};

pub const DEFAULT_COLLECTION: &str = "default";

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum RequestKind {
    Lookup,
    Search,
    Store,
    Remove,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Request {
    Lookup {
        schema: String,
        attributes: WireAttributes,
    },
    Search {
        schema: String,
        attributes: WireAttributes,
    },
    Store {
        schema: String,
        attributes: WireAttributes,
        collection: String,
        label: String,
        secret: Secret,
    },
    Remove {
        schema: String,
        attributes: WireAttributes,
    },
    CloseConnection,
    Ping,
}

impl Request {
    /// Operation kind for item requests; `None` for connection control messages.
    pub fn kind(&self) -> Option<RequestKind> {
        match self {
            Request::Lookup { .. } => Some(RequestKind::Lookup),
            Request::Search { .. } => Some(RequestKind::Search),
            Request::Store { .. } => Some(RequestKind::Store),
            Request::Remove { .. } => Some(RequestKind::Remove),
            Request::CloseConnection | Request::Ping => None,
        }
    }
}

pub fn build_lookup(schema: &Schema, attributes: &Attributes) -> Result<Request, AttributeError> {
    Ok(Request::Lookup {
        schema: schema.name().to_string(),
        attributes: attributes::encode(schema, attributes)?,
    })
}

pub fn build_search(schema: &Schema, attributes: &Attributes) -> Result<Request, AttributeError> {
    Ok(Request::Search {
        schema: schema.name().to_string(),
        attributes: attributes::encode(schema, attributes)?,
    })
}

/// Builds a store request. Items go to [`DEFAULT_COLLECTION`] unless a
/// collection is given.
pub fn build_store(
    schema: &Schema,
    attributes: &Attributes,
    collection: Option<&str>,
    label: &str,
    secret: Secret,
) -> Result<Request, AttributeError> {
    Ok(Request::Store {
        schema: schema.name().to_string(),
        attributes: attributes::encode(schema, attributes)?,
        collection: collection.unwrap_or(DEFAULT_COLLECTION).to_string(),
        label: label.to_string(),
        secret,
    })
}

pub fn build_remove(schema: &Schema, attributes: &Attributes) -> Result<Request, AttributeError> {
    Ok(Request::Remove {
        schema: schema.name().to_string(),
        attributes: attributes::encode(schema, attributes)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::schema::{AttributeType, SchemaFlags};

    use super::*;

    fn schema() -> Schema {
        Schema::define(
            "org.mock.type.Store",
            SchemaFlags::NONE,
            [("number", AttributeType::Integer), ("string", AttributeType::String)],
        )
        .unwrap()
    }

    #[test]
    fn lookup_request_carries_schema_and_wire_attributes() {
        let attributes = Attributes::new().with("number", 1).with("string", "one");
        let request = build_lookup(&schema(), &attributes).unwrap();

        let mut expected = WireAttributes::new();
        expected.insert("number".into(), "1".into());
        expected.insert("string".into(), "one".into());
        assert_eq!(
            request,
            Request::Lookup {
                schema: "org.mock.type.Store".into(),
                attributes: expected
            }
        );
        assert_eq!(request.kind(), Some(RequestKind::Lookup));
    }

    #[test]
    fn store_request_defaults_collection() {
        let attributes = Attributes::new().with("number", 9);
        let request =
            build_store(&schema(), &attributes, None, "The number nine", Secret::text("999"))
                .unwrap();

        match request {
            Request::Store {
                collection, label, ..
            } => {
                assert_eq!(collection, DEFAULT_COLLECTION);
                assert_eq!(label, "The number nine");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn build_propagates_attribute_errors() {
        let attributes = Attributes::new().with("number", "one");

        let err = build_remove(&schema(), &attributes).unwrap_err();
        assert!(matches!(err, AttributeError::TypeMismatch { .. }));
        assert!(build_search(&schema(), &Attributes::new().with("x", 1)).is_err());
    }

    #[test]
    fn control_requests_have_no_kind() {
        assert_eq!(Request::Ping.kind(), None);
        assert_eq!(Request::CloseConnection.kind(), None);
    }
}
