//! Classification of backend replies.
//!
//! [`interpret`] is the only place a [`Response`] is given meaning. It keeps the
//! three outcomes apart: a matched item, an explicit "nothing matched", and a
//! failure. A reply that is neither a payload nor `NotFound` is always a failure,
//! so a caller can never mistake "could not check" for "nothing there".
use crate::{
    attributes,
    error::ClientError,
    protocol::{RequestKind, Response, WireItem},
    schema::Schema,
    secret::Item,
};

/// Payload of a successful, matching operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    Item(Item),
    Items(Vec<Item>),
    Stored,
    Removed,
}

#[derive(Debug)]
pub enum OperationResult {
    Found(Found),
    NotFound,
    Failed(ClientError),
}

impl OperationResult {
    pub fn is_found(&self) -> bool {
        matches!(self, OperationResult::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OperationResult::NotFound)
    }

    /// Moves `Failed` into the error channel.
    pub fn into_result(self) -> Result<Option<Found>, ClientError> {
        match self {
            OperationResult::Found(found) => Ok(Some(found)),
            OperationResult::NotFound => Ok(None),
            OperationResult::Failed(e) => Err(e),
        }
    }
}

impl From<ClientError> for OperationResult {
    fn from(value: ClientError) -> Self {
        OperationResult::Failed(value)
    }
}

fn decode_item(schema: &Schema, item: WireItem) -> Result<Item, ClientError> {
    Ok(Item {
        attributes: attributes::decode(schema, &item.attributes)?,
        label: item.label,
        secret: item.secret,
    })
}

fn unexpected(kind: RequestKind, response: &Response) -> ClientError {
    ClientError::Transport(format!("unexpected reply to {kind:?}: {response:?}"))
}

/// Classifies the reply to a `kind` request made with `schema`.
pub fn interpret(schema: &Schema, kind: RequestKind, response: Response) -> OperationResult {
    let found = match (kind, response) {
        (_, Response::NotFound) => return OperationResult::NotFound,
        (_, Response::Err { code, description }) => {
            return OperationResult::Failed(ClientError::Backend { code, description });
        }
        (RequestKind::Lookup, Response::Item(item)) => decode_item(schema, item).map(Found::Item),
        (RequestKind::Search, Response::Items(items)) => items
            .into_iter()
            .map(|item| decode_item(schema, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Found::Items),
        (RequestKind::Store, Response::Stored) => Ok(Found::Stored),
        (RequestKind::Remove, Response::Removed) => Ok(Found::Removed),
        (kind, other) => Err(unexpected(kind, &other)),
    };

    match found {
        Ok(found) => OperationResult::Found(found),
        Err(e) => OperationResult::Failed(e),
    }
}
