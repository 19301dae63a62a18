use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const DEFAULT_PORT: u16 = 7370;
pub const DEFAULT_WORKERS: usize = 4;

/// Settings for a client talking to a networked secret service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the secret service backend.
    pub address: SocketAddr,
    /// Worker threads used to run asynchronous calls.
    pub workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ClientConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.address.port(), DEFAULT_PORT);
        assert!(config.address.ip().is_loopback());
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn worker_count_never_zero() {
        assert_eq!(ClientConfig::default().with_workers(0).workers, 1);
    }
}
