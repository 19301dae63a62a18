use std::fmt;

use bincode::{
    BorrowDecode, Decode, Encode,
    de::{BorrowDecoder, Decoder},
    enc::Encoder,
    error::{DecodeError, EncodeError},
};
use zeroize::{Zeroize, Zeroizing};

use crate::attributes::Attributes;

pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Opaque secret payload with its content type.
///
/// - The value is wiped from memory when the secret is dropped or zeroized
/// - `Debug` output shows `<redacted>` instead of the value
/// - The value is owned by the caller once returned and is never cached by the client
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    value: Zeroizing<Vec<u8>>,
    content_type: String,
}

impl Secret {
    pub fn new(value: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            value: Zeroizing::new(value.into()),
            content_type: content_type.into(),
        }
    }

    /// A `text/plain` secret, as used for passwords.
    pub fn text(password: &str) -> Self {
        Self::new(password.as_bytes(), CONTENT_TYPE_TEXT)
    }

    /// Exposes the secret value.
    ///
    /// Call this only where the plain value is actually needed.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.value
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Exposes the value as text when it is valid UTF-8.
    #[must_use]
    pub fn expose_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Zeroize for Secret {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

// Encoded as the value bytes followed by the content type, the same layout a
// derived impl over `Vec<u8>` and `String` produces.
impl Encode for Secret {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.value.as_slice().encode(encoder)?;
        self.content_type.encode(encoder)
    }
}

impl<Context> Decode<Context> for Secret {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let value = Zeroizing::new(<Vec<u8> as Decode<Context>>::decode(decoder)?);
        let content_type = <String as Decode<Context>>::decode(decoder)?;
        Ok(Self {
            value,
            content_type,
        })
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Secret {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        <Self as Decode<Context>>::decode(decoder)
    }
}

/// A stored item as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub label: String,
    pub attributes: Attributes,
    pub secret: Secret,
}
