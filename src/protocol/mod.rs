//! Client-server communication protocol.
//!
//! This module defines the messages exchanged between a strongbox client and a
//! secret service backend, the framing used to move them over a byte stream, and a
//! reference backend that answers them.
//!
//! # Overview
//!
//! Every item operation is a single [`Request`] answered by a single [`Response`].
//! Requests carry the operation kind, the name of the schema the attributes were
//! validated against, and the attributes themselves in wire form. Store requests
//! additionally carry the target collection, a display label and the secret.
//!
//! Replies distinguish three outcomes at the wire level:
//!
//! - a payload (`Item`, `Items`, `Stored`, `Removed`)
//! - an explicit `NotFound`, which is a successful answer
//! - a typed `Err` with a [`ResponseError`] code
//!
//! # Key Components
//!
//! - [`Request`] / [`Response`]: wire messages.
//! - [`build_lookup`], [`build_search`], [`build_store`], [`build_remove`]: schema
//!   validated request construction, no I/O.
//! - [`ProtocolTransport`]: framing over any `Read + Write` stream.
//! - [`SecretServer`] / [`ItemStore`]: TCP backend over an in-memory store.
//!
//! # Binary Format
//!
//! Messages are encoded with bincode using big-endian, fixed-width integers. Enum
//! discriminants are written first, so unknown message types fail to decode
//! rather than being misread.
//!
//! # See Also
//!
//! - [`connection`](crate::connection): sends requests and collects replies.
//! - [`interpret`](crate::interpret): turns replies into operation results.
mod request;
mod response;
mod server;
mod thread;
mod transport;

pub use request::{
    DEFAULT_COLLECTION, Request, RequestKind, build_lookup, build_remove, build_search,
    build_store,
};
pub use response::{Response, ResponseError, WireItem};
pub use server::{ItemStore, SecretServer, StoredItem};
pub use thread::ThreadPool;
pub use transport::{MAX_FRAME, ProtocolTransport, TransportError};
