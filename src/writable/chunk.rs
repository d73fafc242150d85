//! Chunk payloads and their encoding tags.

use crate::error::{Result, WriteError};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// One unit of data admitted to a writable endpoint.
#[derive(Clone)]
pub enum Chunk {
    Bytes(Bytes),
    Text(String),
    /// Opaque value, only accepted in object mode
    Object(Rc<dyn Any>),
}

impl Chunk {
    pub fn object<T: Any>(value: T) -> Self {
        Chunk::Object(Rc::new(value))
    }

    /// Size counted towards the endpoint length outside object mode.
    pub fn byte_len(&self) -> usize {
        match self {
            Chunk::Bytes(b) => b.len(),
            Chunk::Text(s) => s.len(),
            Chunk::Object(_) => 1,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Chunk::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Chunk::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Chunk::Object(v) => v.downcast_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Chunk::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Chunk::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<Bytes> for Chunk {
    fn from(b: Bytes) -> Self {
        Chunk::Bytes(b)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(v: Vec<u8>) -> Self {
        Chunk::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(s: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(s))
    }
}

impl From<String> for Chunk {
    fn from(s: String) -> Self {
        Chunk::Text(s)
    }
}

impl From<&str> for Chunk {
    fn from(s: &str) -> Self {
        Chunk::Text(s.to_owned())
    }
}

/// Encoding tag carried with every request.
///
/// `Buffer` marks raw bytes; the others describe how a text chunk maps to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    Buffer,
    #[default]
    Utf8,
    Latin1,
    Ascii,
    Utf16Le,
    Hex,
    Base64,
    Base64Url,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Buffer => "buffer",
            Encoding::Utf8 => "utf8",
            Encoding::Latin1 => "latin1",
            Encoding::Ascii => "ascii",
            Encoding::Utf16Le => "utf16le",
            Encoding::Hex => "hex",
            Encoding::Base64 => "base64",
            Encoding::Base64Url => "base64url",
        }
    }

    /// Convert `text` into the bytes this encoding describes.
    pub fn encode(&self, text: &str) -> Result<Bytes> {
        let bytes = match self {
            Encoding::Buffer | Encoding::Utf8 => Bytes::copy_from_slice(text.as_bytes()),
            // Code points above 0xFF keep their low byte
            Encoding::Latin1 | Encoding::Ascii => text.chars().map(|c| c as u32 as u8).collect(),
            Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Encoding::Hex => hex::decode(text)
                .map(Bytes::from)
                .map_err(|e| WriteError::InvalidChunk(format!("invalid hex text: {e}")))?,
            Encoding::Base64 => decode_base64(&BASE64, text)?,
            Encoding::Base64Url => decode_base64(&BASE64_URL, text)?,
        };
        Ok(bytes)
    }
}

fn decode_base64(engine: &GeneralPurpose, text: &str) -> Result<Bytes> {
    engine
        .decode(text.trim())
        .map(Bytes::from)
        .map_err(|e| WriteError::InvalidChunk(format!("invalid base64 text: {e}")))
}

impl FromStr for Encoding {
    type Err = WriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buffer" => Ok(Encoding::Buffer),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "ascii" => Ok(Encoding::Ascii),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Encoding::Utf16Le),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "base64url" => Ok(Encoding::Base64Url),
            _ => Err(WriteError::UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = WriteError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("binary".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("ucs2".parse::<Encoding>().unwrap(), Encoding::Utf16Le);
        assert!(matches!(
            "klingon".parse::<Encoding>(),
            Err(WriteError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(Encoding::Utf8.encode("héllo").unwrap().len(), 6);
        assert_eq!(Encoding::Latin1.encode("héllo").unwrap().as_ref(), b"h\xe9llo");
        assert_eq!(Encoding::Utf16Le.encode("ab").unwrap().as_ref(), b"a\0b\0");
        assert_eq!(Encoding::Hex.encode("cafe").unwrap().as_ref(), [0xca, 0xfe]);
        assert_eq!(Encoding::Base64.encode("aGk").unwrap().as_ref(), b"hi");
        assert_eq!(Encoding::Base64Url.encode("-_8=").unwrap().as_ref(), [0xfb, 0xff]);
    }

    #[test]
    fn test_encode_rejects_garbage() {
        assert!(matches!(
            Encoding::Hex.encode("xyz"),
            Err(WriteError::InvalidChunk(_))
        ));
        assert!(Encoding::Base64.encode("!!!").is_err());
    }

    #[test]
    fn test_chunk_accessors() {
        let chunk = Chunk::object(42u32);
        assert_eq!(chunk.downcast_ref::<u32>(), Some(&42));
        assert!(chunk.as_bytes().is_none());
        assert_eq!(Chunk::from("abc").byte_len(), 3);
        assert_eq!(format!("{:?}", chunk), "Object(..)");
    }
}
