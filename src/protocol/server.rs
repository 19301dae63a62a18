use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::{debug, info, warn};

use crate::{
    attributes::WireAttributes,
    protocol::{ProtocolTransport, Request, Response, ResponseError, WireItem},
    secret::Secret,
};

use super::{ThreadPool, transport::TransportError};

/// A single stored secret, as the backend keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub collection: String,
    pub schema: String,
    pub label: String,
    pub attributes: WireAttributes,
    pub secret: Secret,
}

impl StoredItem {
    /// An item matches when it was stored under `schema` and carries every
    /// queried attribute with an equal value.
    fn matches(&self, schema: &str, query: &WireAttributes) -> bool {
        self.schema == schema
            && query
                .iter()
                .all(|(k, v)| self.attributes.get(k).is_some_and(|own| own == v))
    }

    fn to_wire(&self) -> WireItem {
        WireItem {
            label: self.label.clone(),
            attributes: self.attributes.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// In-memory item store answering protocol requests.
///
/// This is the backend behind [`SecretServer`] and the in-process transport
/// used in tests; both reply with the same found / not-found / error contract.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: Vec<StoredItem>,
    locked: Vec<String>,
    read_only: bool,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item directly, bypassing the protocol.
    pub fn seed(
        &mut self,
        schema: &str,
        attributes: &[(&str, &str)],
        label: &str,
        secret: Secret,
    ) {
        self.items.push(StoredItem {
            collection: crate::protocol::DEFAULT_COLLECTION.to_string(),
            schema: schema.to_string(),
            label: label.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            secret,
        });
    }

    /// Items in a locked collection cannot be read, replaced or removed.
    pub fn lock(&mut self, collection: &str) {
        if !self.locked.iter().any(|c| c == collection) {
            self.locked.push(collection.to_string());
        }
    }

    pub fn unlock(&mut self, collection: &str) {
        self.locked.retain(|c| c != collection);
    }

    /// A read-only store refuses stores and removals.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn items(&self) -> &[StoredItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_locked(&self, collection: &str) -> bool {
        self.locked.iter().any(|c| c == collection)
    }

    fn locked_response(collection: &str) -> Response {
        Response::Err {
            code: ResponseError::Locked,
            description: format!("collection '{collection}' is locked"),
        }
    }

    fn read_only_response() -> Response {
        Response::Err {
            code: ResponseError::PermissionDenied,
            description: "store is read-only".to_string(),
        }
    }

    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::CloseConnection => Response::ConnectionClosed,
            Request::Lookup { schema, attributes } => {
                match self.items.iter().find(|i| i.matches(&schema, &attributes)) {
                    Some(item) if self.is_locked(&item.collection) => {
                        Self::locked_response(&item.collection)
                    }
                    Some(item) => Response::Item(item.to_wire()),
                    None => Response::NotFound,
                }
            }
            Request::Search { schema, attributes } => {
                let found: Vec<&StoredItem> = self
                    .items
                    .iter()
                    .filter(|i| i.matches(&schema, &attributes))
                    .collect();

                if let Some(item) = found.iter().find(|i| self.is_locked(&i.collection)) {
                    return Self::locked_response(&item.collection);
                }
                if found.is_empty() {
                    Response::NotFound
                } else {
                    Response::Items(found.into_iter().map(StoredItem::to_wire).collect())
                }
            }
            Request::Remove { schema, attributes } => {
                if self.read_only {
                    return Self::read_only_response();
                }
                match self.items.iter().position(|i| i.matches(&schema, &attributes)) {
                    Some(idx) if self.is_locked(&self.items[idx].collection) => {
                        Self::locked_response(&self.items[idx].collection)
                    }
                    Some(idx) => {
                        let item = self.items.remove(idx);
                        debug!("removed item '{}' from '{}'", item.label, item.collection);
                        Response::Removed
                    }
                    None => Response::NotFound,
                }
            }
            Request::Store {
                schema,
                attributes,
                collection,
                label,
                secret,
            } => {
                if self.read_only {
                    return Self::read_only_response();
                }
                if self.is_locked(&collection) {
                    return Self::locked_response(&collection);
                }

                let existing = self.items.iter_mut().find(|i| {
                    i.collection == collection && i.schema == schema && i.attributes == attributes
                });
                match existing {
                    Some(item) => {
                        debug!("replacing item '{}' in '{collection}'", item.label);
                        item.label = label;
                        item.secret = secret;
                    }
                    None => {
                        debug!("creating item '{label}' in '{collection}'");
                        self.items.push(StoredItem {
                            collection,
                            schema,
                            label,
                            attributes,
                            secret,
                        });
                    }
                }
                Response::Stored
            }
        }
    }
}

/// TCP front end for an [`ItemStore`].
///
/// Each connection holds one worker for as long as it stays open. Connections
/// beyond the worker count wait until an earlier one closes.
pub struct SecretServer {
    listener: TcpListener,
    store: Arc<Mutex<ItemStore>>,
    pool: ThreadPool,
    active: Arc<AtomicUsize>,
}

impl SecretServer {
    pub fn bind(
        address: SocketAddr,
        store: Arc<Mutex<ItemStore>>,
        workers: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)?;
        Ok(Self {
            listener,
            store,
            pool: ThreadPool::new(workers),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn listen(self) -> Result<(), TransportError> {
        info!("listening at {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.serve(stream),
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }

    /// Connections accepted and not yet closed, including those still waiting
    /// for a worker.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// True when some accepted connection has no worker to serve it.
    pub fn is_saturated(&self) -> bool {
        self.active_connections() > self.pool.size()
    }

    fn serve(&self, stream: TcpStream) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        if active > self.pool.size() {
            warn!(
                "all {} workers busy; connection {active} waits for one to free up",
                self.pool.size()
            );
        }

        let store = Arc::clone(&self.store);
        let counter = Arc::clone(&self.active);
        let queued = self.pool.execute(move || {
            if let Err(e) = handle_connection(stream, store) {
                warn!("connection failed: {e}");
            }
            counter.fetch_sub(1, Ordering::SeqCst);
        });
        if queued.is_err() {
            self.active.fetch_sub(1, Ordering::SeqCst);
            warn!("no workers left to handle connection");
        }
    }
}

fn handle_connection(stream: TcpStream, store: Arc<Mutex<ItemStore>>) -> Result<(), TransportError> {
    let peer = stream.peer_addr()?;
    let mut transport = ProtocolTransport::new(stream);
    debug!("accepted connection from {peer}");

    loop {
        let req = match transport.read_request() {
            Ok(req) => req,
            Err(e) if e.is_disconnect() => {
                debug!("{peer} disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        info!("received {:?} request from {peer}", req.kind());

        let close = req == Request::CloseConnection;
        let resp = store.lock().unwrap().handle(req);
        transport.write_response(&resp)?;

        if close {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    const SCHEMA: &str = "org.mock.type.Store";

    fn wire(pairs: &[(&str, &str)]) -> WireAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn seeded() -> ItemStore {
        let mut store = ItemStore::new();
        store.seed(
            SCHEMA,
            &[("number", "1"), ("string", "one"), ("even", "false")],
            "one",
            Secret::text("111"),
        );
        store.seed(
            SCHEMA,
            &[("number", "2"), ("string", "two"), ("even", "true")],
            "two",
            Secret::text("222"),
        );
        store
    }

    #[test]
    fn lookup_matches_attribute_subset() {
        let mut store = seeded();
        let resp = store.handle(Request::Lookup {
            schema: SCHEMA.into(),
            attributes: wire(&[("number", "1"), ("even", "false")]),
        });

        match resp {
            Response::Item(item) => assert_eq!(item.secret, Secret::text("111")),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn lookup_filters_by_schema_name() {
        let mut store = seeded();
        let resp = store.handle(Request::Lookup {
            schema: "org.other".into(),
            attributes: wire(&[("number", "1")]),
        });

        assert_eq!(resp, Response::NotFound);
    }

    #[test]
    fn remove_then_not_found() {
        let mut store = seeded();
        let request = Request::Remove {
            schema: SCHEMA.into(),
            attributes: wire(&[("number", "2"), ("string", "two")]),
        };

        assert_eq!(store.handle(request.clone()), Response::Removed);
        assert_eq!(store.handle(request), Response::NotFound);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_replaces_identical_attributes() {
        let mut store = seeded();
        let request = |secret: &str| Request::Store {
            schema: SCHEMA.into(),
            attributes: wire(&[("number", "9")]),
            collection: "default".into(),
            label: "nine".into(),
            secret: Secret::text(secret),
        };

        assert_eq!(store.handle(request("999")), Response::Stored);
        assert_eq!(store.handle(request("000")), Response::Stored);
        assert_eq!(store.len(), 3);
        assert_eq!(store.items()[2].secret, Secret::text("000"));
    }

    #[test]
    fn locked_and_read_only_report_errors() {
        let mut store = seeded();
        store.lock("default");
        let resp = store.handle(Request::Lookup {
            schema: SCHEMA.into(),
            attributes: wire(&[("number", "1")]),
        });
        assert!(matches!(
            resp,
            Response::Err {
                code: ResponseError::Locked,
                ..
            }
        ));

        store.unlock("default");
        store.set_read_only(true);
        let resp = store.handle(Request::Remove {
            schema: SCHEMA.into(),
            attributes: wire(&[("number", "1")]),
        });
        assert!(matches!(
            resp,
            Response::Err {
                code: ResponseError::PermissionDenied,
                ..
            }
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn connections_beyond_workers_are_reported() {
        let server = SecretServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(Mutex::new(seeded())),
            1,
        )
        .unwrap();
        let address = server.local_addr().unwrap();

        let first = TcpStream::connect(address).unwrap();
        server.serve(server.listener.accept().unwrap().0);
        assert!(!server.is_saturated());

        let second = TcpStream::connect(address).unwrap();
        server.serve(server.listener.accept().unwrap().0);
        assert_eq!(server.active_connections(), 2);
        assert!(server.is_saturated());

        drop(first);
        drop(second);
        let deadline = Instant::now() + Duration::from_secs(3);
        while server.active_connections() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.active_connections(), 0);
    }

    #[test]
    fn search_returns_all_matches() {
        let mut store = seeded();
        let resp = store.handle(Request::Search {
            schema: SCHEMA.into(),
            attributes: WireAttributes::new(),
        });

        match resp {
            Response::Items(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected response {other:?}"),
        }
    }
}
