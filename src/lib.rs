//! Client library for attribute-keyed secret storage services.
//!
//! Secrets are stored, found and removed by a set of typed attributes declared by
//! a [`Schema`] rather than by an opaque identifier.
//!
//! # Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use strongbox::{AttributeType, Client, ItemStore, Schema, SchemaFlags};
//!
//! let schema = Schema::define(
//!     "org.example.Store",
//!     SchemaFlags::NONE,
//!     [("number", AttributeType::Integer), ("even", AttributeType::Boolean)],
//! )
//! .unwrap();
//!
//! let client = Client::in_memory(Arc::new(Mutex::new(ItemStore::new())));
//! let attributes = [("number", "8"), ("even", "true")];
//!
//! assert!(client.store_password(&schema, &attributes, None, "eight", "888").unwrap());
//! assert_eq!(
//!     client.lookup_password(&schema, &attributes).unwrap().as_deref(),
//!     Some("888")
//! );
//! assert!(client.remove(&schema, &attributes).unwrap());
//! assert_eq!(client.lookup_password(&schema, &attributes).unwrap(), None);
//! ```
pub mod attributes;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod interpret;
pub mod protocol;
pub mod schema;
pub mod secret;

pub use attributes::{AttributeError, AttributeValue, Attributes};
pub use client::{Client, PendingOperation, ToAttributes};
pub use config::ClientConfig;
pub use connection::{Connection, MemoryTransport, TcpTransport, Transport};
pub use error::{ClientError, UsageError};
pub use interpret::{Found, OperationResult};
pub use protocol::{ItemStore, SecretServer};
pub use schema::{AttributeType, Schema, SchemaError, SchemaFlags};
pub use secret::{Item, Secret};
