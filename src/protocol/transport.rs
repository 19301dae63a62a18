use std::io::{self, Read, Write};

use bincode::{
    config::{BigEndian, Configuration, Fixint, Limit},
    decode_from_std_read, encode_into_std_write,
};
use thiserror::Error;

use super::{Request, Response};

/// Largest frame either side will decode. Longer length prefixes fail with
/// `DecodeError::LimitExceeded` before anything is allocated.
pub const MAX_FRAME: usize = 1 << 20;

type WireConfig = Configuration<BigEndian, Fixint, Limit<MAX_FRAME>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True when the peer went away rather than sending something malformed.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Io(_) => true,
            TransportError::Deserialize(bincode::error::DecodeError::Io { inner, .. }) => matches!(
                inner.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Frames [`Request`]s and [`Response`]s over a byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: WireConfig,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding()
            .with_limit::<MAX_FRAME>();
        Self { stream, config }
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        encode_into_std_write(req, &mut self.stream, self.config)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        encode_into_std_write(resp, &mut self.stream, self.config)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        let resp: Response = decode_from_std_read(&mut self.stream, self.config)?;
        Ok(resp)
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        let req: Request = decode_from_std_read(&mut self.stream, self.config)?;
        Ok(req)
    }

    /// Writes `req` and waits for the matching reply.
    pub fn exchange(&mut self, req: &Request) -> Result<Response, TransportError> {
        self.write_request(req)?;
        self.read_response()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use crate::{
        attributes::WireAttributes,
        error::ClientError,
        protocol::{ResponseError, WireItem},
        secret::Secret,
    };

    use super::*;

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        let mut attributes = WireAttributes::new();
        attributes.insert("number".into(), "1".into());
        let req = Request::Remove {
            schema: "org.mock.type.Store".into(),
            attributes,
        };

        transport.write_request(&req).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(transport.read_request().unwrap(), req);
    }

    #[test]
    fn read_write_response() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        let item = Response::Item(WireItem {
            label: "one".into(),
            attributes: WireAttributes::new(),
            secret: Secret::text("111"),
        });
        let denied = Response::Err {
            code: ResponseError::PermissionDenied,
            description: "locked".into(),
        };

        transport.write_response(&item).unwrap();
        transport.write_response(&Response::NotFound).unwrap();
        transport.write_response(&denied).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();

        assert_eq!(transport.read_response().unwrap(), item);
        assert_eq!(transport.read_response().unwrap(), Response::NotFound);
        assert_eq!(transport.read_response().unwrap(), denied);
    }

    #[test]
    fn truncated_stream_is_a_disconnect() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        let err = transport.read_response().unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn garbage_is_not_a_disconnect() {
        let stream = Cursor::new(vec![0xff; 16]);
        let mut transport = ProtocolTransport::new(stream);

        let err = transport.read_response().unwrap_err();
        assert!(!err.is_disconnect());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        // `Item` tag followed by a label length of about a terabyte.
        let mut frame = vec![0, 0, 0, 0];
        frame.extend_from_slice(&0x0000_00FF_FFFF_FFFF_u64.to_be_bytes());
        let mut transport = ProtocolTransport::new(Cursor::new(frame));

        let err = transport.read_response().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Deserialize(bincode::error::DecodeError::LimitExceeded)
        ));
        assert!(!err.is_disconnect());
        assert!(matches!(ClientError::from(err), ClientError::Transport(_)));
    }

    #[test]
    fn oversized_request_is_rejected() {
        // `Lookup` tag followed by a schema name length past the limit.
        let mut frame = vec![0, 0, 0, 0];
        frame.extend_from_slice(&((MAX_FRAME as u64) + 1).to_be_bytes());
        let mut transport = ProtocolTransport::new(Cursor::new(frame));

        let err = transport.read_request().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Deserialize(bincode::error::DecodeError::LimitExceeded)
        ));
    }
}
