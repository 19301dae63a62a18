use bincode::{Decode, Encode};

use crate::{attributes::WireAttributes, secret::Secret};

/// An item as it travels on the wire, attributes still in string form.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct WireItem {
    pub label: String,
    pub attributes: WireAttributes,
    pub secret: Secret,
}

/// Backend reply. `NotFound` is a successful answer, distinct from `Err`.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Response {
    Item(WireItem),
    Items(Vec<WireItem>),
    Stored,
    Removed,
    NotFound,
    Pong,
    Err {
        code: ResponseError,
        description: String,
    },
    ConnectionClosed,
}

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum ResponseError {
    PermissionDenied,
    SchemaMismatch,
    InvalidAttributes,
    Locked,
    Internal,
}
