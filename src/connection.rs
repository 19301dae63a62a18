//! Backend connection management.
//!
//! A [`Connection`] is the single point through which requests reach a secret
//! service. It knows nothing about what replies mean; it only moves a [`Request`]
//! to a [`Transport`] and hands back whatever [`Response`] came back, either by
//! blocking the caller ([`Connection::call`]) or by running the exchange on a worker
//! thread and reporting through a callback ([`Connection::call_async`]).
//!
//! Two transports are provided:
//!
//! - [`TcpTransport`]: a framed TCP stream to a [`SecretServer`](crate::protocol::SecretServer).
//! - [`MemoryTransport`]: an in-process [`ItemStore`], with the same reply contract.
use std::{
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, trace, warn};

use crate::{
    config::ClientConfig,
    error::ClientError,
    protocol::{ItemStore, ProtocolTransport, Request, Response, ThreadPool},
};

/// Something that can answer a request with a raw reply.
pub trait Transport: Send + Sync {
    /// Sends `request` and blocks until its reply arrives.
    fn call(&self, request: &Request) -> Result<Response, ClientError>;

    /// Tears the transport down. Later calls fail with [`ClientError::Connection`].
    fn close(&self);
}

/// Framed TCP link to a secret service.
///
/// The stream is opened on first use and reopened after a failure. One
/// request/reply exchange holds the stream at a time, so frames from concurrent
/// callers never interleave.
pub struct TcpTransport {
    address: SocketAddr,
    stream: Mutex<Option<ProtocolTransport<TcpStream>>>,
    // Second handle on the socket so close() can interrupt an exchange in flight.
    shutdown: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl TcpTransport {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            stream: Mutex::new(None),
            shutdown: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn closed_error() -> ClientError {
        ClientError::Connection("connection closed".to_string())
    }
}

impl Transport for TcpTransport {
    fn call(&self, request: &Request) -> Result<Response, ClientError> {
        let mut guard = self.stream.lock().unwrap();
        if self.closed.load(Ordering::SeqCst) {
            return Err(Self::closed_error());
        }

        if guard.is_none() {
            debug!("connecting to {}", self.address);
            let stream = TcpStream::connect(self.address).map_err(|e| {
                ClientError::Connection(format!("unable to reach {}: {e}", self.address))
            })?;
            let handle = stream
                .try_clone()
                .map_err(|e| ClientError::Connection(format!("unable to share socket: {e}")))?;
            *self.shutdown.lock().unwrap() = Some(handle);

            // close() may have run while we were connecting and found no socket.
            if self.closed.load(Ordering::SeqCst) {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(Self::closed_error());
            }
            *guard = Some(ProtocolTransport::new(stream));
        }
        let Some(transport) = guard.as_mut() else {
            return Err(Self::closed_error());
        };

        trace!("sending {:?} request", request.kind());
        match transport.exchange(request) {
            Ok(response) => Ok(response),
            Err(e) => {
                // A half-read frame leaves the stream unusable.
                *guard = None;
                Err(e.into())
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        // Say goodbye only if the stream is idle, and never wait for the reply.
        if let Ok(mut guard) = self.stream.try_lock() {
            if let Some(mut transport) = guard.take() {
                if let Err(e) = transport.write_request(&Request::CloseConnection) {
                    debug!("close notice failed: {e}");
                }
            }
        }
        if let Some(stream) = self.shutdown.lock().unwrap().take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("shutdown failed: {e}");
            }
        }
    }
}

/// In-process backend over a shared [`ItemStore`].
pub struct MemoryTransport {
    store: Arc<Mutex<ItemStore>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new(store: Arc<Mutex<ItemStore>>) -> Self {
        Self {
            store,
            closed: AtomicBool::new(false),
        }
    }
}

impl Transport for MemoryTransport {
    fn call(&self, request: &Request) -> Result<Response, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Connection("connection closed".to_string()));
        }
        Ok(self.store.lock().unwrap().handle(request.clone()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shared handle on a backend, with workers for non-blocking calls.
pub struct Connection {
    transport: Arc<dyn Transport>,
    pool: ThreadPool,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>, workers: usize) -> Self {
        Self {
            transport,
            pool: ThreadPool::new(workers.max(1)),
        }
    }

    /// Connection to a networked backend. The socket is opened on first use.
    pub fn tcp(config: &ClientConfig) -> Self {
        Self::new(Arc::new(TcpTransport::new(config.address)), config.workers)
    }

    pub fn in_memory(store: Arc<Mutex<ItemStore>>) -> Self {
        Self::new(Arc::new(MemoryTransport::new(store)), 1)
    }

    /// Blocks until the backend replies or the connection fails.
    pub fn call(&self, request: &Request) -> Result<Response, ClientError> {
        self.transport.call(request)
    }

    /// Runs the exchange on a worker thread and invokes `on_complete` there,
    /// exactly once, with the reply or the failure.
    ///
    /// Exchanges are serialised by the transport but callbacks are not. With
    /// more than one worker, callbacks of concurrent calls may run in any order.
    pub fn call_async<F>(&self, request: Request, on_complete: F)
    where
        F: FnOnce(Result<Response, ClientError>) + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let queued = self.pool.execute(move || {
            let reply = transport.call(&request);
            on_complete(reply);
        });

        if let Err(job) = queued {
            warn!("no workers available; completing call on the caller's thread");
            job();
        }
    }

    /// Tears down the backend link. Calls still queued, and any made later,
    /// complete with [`ClientError::Connection`].
    pub fn close(&self) {
        debug!("closing connection");
        self.transport.close();
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(ClientError::Transport(format!(
                "unexpected reply to ping: {other:?}"
            ))),
        }
    }
}
