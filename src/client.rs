//! Blocking and callback-driven client calls.
//!
//! [`Client`] exposes each operation twice: a blocking form (`lookup`, `store`,
//! `remove`, `search`) and a non-blocking form (`lookup_async`, ...) whose callback
//! receives a [`PendingOperation`]. Both forms share request building and reply
//! interpretation, so the same schema, attributes and backend state always give
//! the same answer.
//!
//! Attributes may be passed as a typed [`Attributes`] map or as string-keyed pairs
//! (`[("number", "1"), ("even", "false")]`, a `HashMap<String, String>`, ...), which
//! are parsed according to the schema.
//!
//! Attribute and schema errors are reported before anything is sent. For the
//! asynchronous forms the callback then runs immediately, on the caller's thread.
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
    sync::{Arc, Mutex},
};

use log::{debug, warn};

use crate::{
    attributes::{AttributeError, Attributes},
    config::ClientConfig,
    connection::Connection,
    error::{ClientError, UsageError},
    interpret::{Found, OperationResult, interpret},
    protocol::{
        ItemStore, Request, RequestKind, Response, build_lookup, build_remove, build_search,
        build_store,
    },
    schema::Schema,
    secret::{Item, Secret},
};

/// Anything that can be turned into a typed attribute mapping for a schema.
pub trait ToAttributes {
    fn to_attributes(&self, schema: &Schema) -> Result<Attributes, AttributeError>;
}

impl ToAttributes for Attributes {
    fn to_attributes(&self, _schema: &Schema) -> Result<Attributes, AttributeError> {
        Ok(self.clone())
    }
}

impl<K, V, S> ToAttributes for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn to_attributes(&self, schema: &Schema) -> Result<Attributes, AttributeError> {
        Attributes::from_strings(schema, self.iter())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> ToAttributes for BTreeMap<K, V> {
    fn to_attributes(&self, schema: &Schema) -> Result<Attributes, AttributeError> {
        Attributes::from_strings(schema, self.iter())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> ToAttributes for [(K, V)] {
    fn to_attributes(&self, schema: &Schema) -> Result<Attributes, AttributeError> {
        Attributes::from_strings(schema, self.iter().map(|(k, v)| (k, v)))
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> ToAttributes for [(K, V); N] {
    fn to_attributes(&self, schema: &Schema) -> Result<Attributes, AttributeError> {
        self.as_slice().to_attributes(schema)
    }
}

fn mismatch(expected: &str, found: Found) -> ClientError {
    ClientError::Transport(format!("expected {expected} result, got {found:?}"))
}

fn lookup_outcome(result: OperationResult) -> Result<Option<Secret>, ClientError> {
    match result.into_result()? {
        Some(Found::Item(item)) => Ok(Some(item.secret)),
        Some(other) => Err(mismatch("lookup", other)),
        None => Ok(None),
    }
}

fn search_outcome(result: OperationResult) -> Result<Vec<Item>, ClientError> {
    match result.into_result()? {
        Some(Found::Items(items)) => Ok(items),
        Some(other) => Err(mismatch("search", other)),
        None => Ok(Vec::new()),
    }
}

fn store_outcome(result: OperationResult) -> Result<bool, ClientError> {
    match result.into_result()? {
        Some(Found::Stored) => Ok(true),
        Some(other) => Err(mismatch("store", other)),
        None => Ok(false),
    }
}

fn remove_outcome(result: OperationResult) -> Result<bool, ClientError> {
    match result.into_result()? {
        Some(Found::Removed) => Ok(true),
        Some(other) => Err(mismatch("remove", other)),
        None => Ok(false),
    }
}

fn into_text(secret: Option<Secret>) -> Result<Option<String>, ClientError> {
    match secret {
        Some(secret) => match secret.expose_text() {
            Some(text) => Ok(Some(text.to_string())),
            None => Err(ClientError::Transport(
                "password is not valid UTF-8".to_string(),
            )),
        },
        None => Ok(None),
    }
}

#[derive(Debug)]
enum Slot {
    Waiting,
    Ready(Result<Response, ClientError>),
    Finished,
}

struct PendingInner {
    kind: RequestKind,
    schema: Schema,
    connection: Arc<Connection>,
    slot: Mutex<Slot>,
}

/// Handle on an asynchronous call.
///
/// The handle returned by an `*_async` call and the one passed to its callback
/// refer to the same operation. Its result can be taken once, after the callback
/// has been invoked, through the `*_finish` method matching the call. Until the
/// reply arrives every `*_finish` fails with [`UsageError::NotReady`]. A finish
/// on another thread that races with the callback being invoked may see the result.
#[derive(Clone)]
pub struct PendingOperation(Arc<PendingInner>);

impl PendingOperation {
    fn new(kind: RequestKind, schema: &Schema, connection: Arc<Connection>) -> Self {
        Self(Arc::new(PendingInner {
            kind,
            schema: schema.clone(),
            connection,
            slot: Mutex::new(Slot::Waiting),
        }))
    }

    fn complete(&self, reply: Result<Response, ClientError>) {
        let mut slot = self.0.slot.lock().unwrap();
        match *slot {
            Slot::Waiting => *slot = Slot::Ready(reply),
            _ => warn!("{:?} operation completed twice", self.0.kind),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.0.kind
    }

    pub fn schema(&self) -> &Schema {
        &self.0.schema
    }

    /// The connection the operation was issued on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.0.connection
    }

    /// True once the reply (or failure) has arrived.
    pub fn is_complete(&self) -> bool {
        !matches!(*self.0.slot.lock().unwrap(), Slot::Waiting)
    }

    fn take(&self, expected: RequestKind) -> Result<OperationResult, ClientError> {
        if self.0.kind != expected {
            return Err(UsageError::WrongOperation {
                expected,
                actual: self.0.kind,
            }
            .into());
        }

        let mut slot = self.0.slot.lock().unwrap();
        match std::mem::replace(&mut *slot, Slot::Finished) {
            Slot::Ready(Ok(response)) => Ok(interpret(&self.0.schema, self.0.kind, response)),
            Slot::Ready(Err(e)) => Ok(OperationResult::Failed(e)),
            Slot::Waiting => {
                *slot = Slot::Waiting;
                Err(UsageError::NotReady.into())
            }
            Slot::Finished => Err(UsageError::AlreadyFinished.into()),
        }
    }

    pub fn lookup_finish(&self) -> Result<Option<Secret>, ClientError> {
        lookup_outcome(self.take(RequestKind::Lookup)?)
    }

    /// Like [`PendingOperation::lookup_finish`], for `text/plain` secrets.
    pub fn lookup_password_finish(&self) -> Result<Option<String>, ClientError> {
        into_text(self.lookup_finish()?)
    }

    pub fn search_finish(&self) -> Result<Vec<Item>, ClientError> {
        search_outcome(self.take(RequestKind::Search)?)
    }

    pub fn store_finish(&self) -> Result<bool, ClientError> {
        store_outcome(self.take(RequestKind::Store)?)
    }

    pub fn remove_finish(&self) -> Result<bool, ClientError> {
        remove_outcome(self.take(RequestKind::Remove)?)
    }
}

/// Secret service client.
#[derive(Clone)]
pub struct Client {
    connection: Arc<Connection>,
}

impl Client {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Arc::new(connection),
        }
    }

    /// Client for a networked backend; nothing is sent until the first call.
    pub fn connect(config: &ClientConfig) -> Self {
        Self::new(Connection::tcp(config))
    }

    /// Client backed by an in-process store.
    pub fn in_memory(store: Arc<Mutex<ItemStore>>) -> Self {
        Self::new(Connection::in_memory(store))
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Closes the connection; outstanding asynchronous calls fail with
    /// [`ClientError::Connection`].
    pub fn close(&self) {
        self.connection.close();
    }

    fn execute(&self, schema: &Schema, kind: RequestKind, request: Request) -> OperationResult {
        debug!("{kind:?} with schema '{}'", schema.name());
        match self.connection.call(&request) {
            Ok(response) => interpret(schema, kind, response),
            Err(e) => OperationResult::Failed(e),
        }
    }

    fn dispatch<F>(
        &self,
        schema: &Schema,
        kind: RequestKind,
        request: Result<Request, ClientError>,
        on_ready: F,
    ) -> PendingOperation
    where
        F: FnOnce(PendingOperation) + Send + 'static,
    {
        let pending = PendingOperation::new(kind, schema, Arc::clone(&self.connection));

        match request {
            Ok(request) => {
                debug!("{kind:?} with schema '{}' dispatched", schema.name());
                let handle = pending.clone();
                self.connection.call_async(request, move |reply| {
                    // The result only becomes takeable as the callback is handed it.
                    handle.complete(reply);
                    on_ready(handle);
                });
            }
            Err(e) => {
                pending.complete(Err(e));
                on_ready(pending.clone());
            }
        }
        pending
    }

    pub fn lookup<A>(&self, schema: &Schema, attributes: &A) -> Result<Option<Secret>, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        let request = build_lookup(schema, &attributes.to_attributes(schema)?)?;
        lookup_outcome(self.execute(schema, RequestKind::Lookup, request))
    }

    /// Looks up a `text/plain` secret and returns it as a string.
    pub fn lookup_password<A>(
        &self,
        schema: &Schema,
        attributes: &A,
    ) -> Result<Option<String>, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        into_text(self.lookup(schema, attributes)?)
    }

    pub fn search<A>(&self, schema: &Schema, attributes: &A) -> Result<Vec<Item>, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        let request = build_search(schema, &attributes.to_attributes(schema)?)?;
        search_outcome(self.execute(schema, RequestKind::Search, request))
    }

    /// Stores `secret`, replacing an item with identical attributes in the same
    /// collection. `collection` defaults to the `default` collection.
    pub fn store<A>(
        &self,
        schema: &Schema,
        attributes: &A,
        collection: Option<&str>,
        label: &str,
        secret: Secret,
    ) -> Result<bool, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        let request = build_store(
            schema,
            &attributes.to_attributes(schema)?,
            collection,
            label,
            secret,
        )?;
        store_outcome(self.execute(schema, RequestKind::Store, request))
    }

    pub fn store_password<A>(
        &self,
        schema: &Schema,
        attributes: &A,
        collection: Option<&str>,
        label: &str,
        password: &str,
    ) -> Result<bool, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        self.store(schema, attributes, collection, label, Secret::text(password))
    }

    /// Removes the first matching item. Returns whether one existed.
    pub fn remove<A>(&self, schema: &Schema, attributes: &A) -> Result<bool, ClientError>
    where
        A: ToAttributes + ?Sized,
    {
        let request = build_remove(schema, &attributes.to_attributes(schema)?)?;
        remove_outcome(self.execute(schema, RequestKind::Remove, request))
    }

    pub fn lookup_async<A, F>(&self, schema: &Schema, attributes: &A, on_ready: F) -> PendingOperation
    where
        A: ToAttributes + ?Sized,
        F: FnOnce(PendingOperation) + Send + 'static,
    {
        let request = attributes
            .to_attributes(schema)
            .and_then(|a| build_lookup(schema, &a))
            .map_err(ClientError::from);
        self.dispatch(schema, RequestKind::Lookup, request, on_ready)
    }

    pub fn search_async<A, F>(&self, schema: &Schema, attributes: &A, on_ready: F) -> PendingOperation
    where
        A: ToAttributes + ?Sized,
        F: FnOnce(PendingOperation) + Send + 'static,
    {
        let request = attributes
            .to_attributes(schema)
            .and_then(|a| build_search(schema, &a))
            .map_err(ClientError::from);
        self.dispatch(schema, RequestKind::Search, request, on_ready)
    }

    pub fn store_async<A, F>(
        &self,
        schema: &Schema,
        attributes: &A,
        collection: Option<&str>,
        label: &str,
        secret: Secret,
        on_ready: F,
    ) -> PendingOperation
    where
        A: ToAttributes + ?Sized,
        F: FnOnce(PendingOperation) + Send + 'static,
    {
        let request = attributes
            .to_attributes(schema)
            .and_then(|a| build_store(schema, &a, collection, label, secret))
            .map_err(ClientError::from);
        self.dispatch(schema, RequestKind::Store, request, on_ready)
    }

    pub fn remove_async<A, F>(&self, schema: &Schema, attributes: &A, on_ready: F) -> PendingOperation
    where
        A: ToAttributes + ?Sized,
        F: FnOnce(PendingOperation) + Send + 'static,
    {
        let request = attributes
            .to_attributes(schema)
            .and_then(|a| build_remove(schema, &a))
            .map_err(ClientError::from);
        self.dispatch(schema, RequestKind::Remove, request, on_ready)
    }
}
