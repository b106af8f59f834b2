//! Payload encoding for cache entries.
//!
//! Cached responses are stored as JSON bytes, gzipped once they cross the
//! configured size threshold. The cache owns the fallback policy (store raw
//! on compression failure, skip caching on serialization failure); this
//! module only does the byte work.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io::{Read, Write};

/// Error produced while encoding or decoding a payload.
#[derive(Debug)]
pub enum CodecError {
    /// JSON serialization or deserialization failed
    Serde(serde_json::Error),
    /// The gzip stream could not be written or read
    Gzip(std::io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Serde(e) => write!(f, "payload serialization failed: {}", e),
            CodecError::Gzip(e) => write!(f, "payload compression failed: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Serde(e) => Some(e),
            CodecError::Gzip(e) => Some(e),
        }
    }
}

/// Serialize a value to JSON bytes.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Serde)
}

/// Deserialize a value from JSON bytes.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Serde)
}

/// Gzip a serialized payload.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(CodecError::Gzip)?;
    encoder.finish().map_err(CodecError::Gzip)
}

/// Gunzip a compressed payload.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(CodecError::Gzip)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        text: String,
        score: u32,
    }

    #[test]
    fn test_serialize_round_trip() {
        let payload = Payload {
            text: "three taglines".to_string(),
            score: 7,
        };

        let bytes = serialize(&payload).unwrap();
        let back: Payload = deserialize(&bytes).unwrap();

        assert_eq!(back, payload);
    }

    #[test]
    fn test_compress_round_trip() {
        let original = "a ".repeat(10_000).into_bytes();

        let compressed = compress(&original).unwrap();
        assert!(compressed.len() < original.len());

        let back = decompress(&compressed).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let err = decompress(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, CodecError::Gzip(_)));
    }

    #[test]
    fn test_deserialize_rejects_mismatched_shape() {
        let bytes = serialize(&vec![1u32, 2, 3]).unwrap();
        let err = deserialize::<Payload>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Serde(_)));
    }

    #[test]
    fn test_error_display_names_the_stage() {
        let serde_err = deserialize::<Payload>(b"{").unwrap_err();
        assert!(serde_err.to_string().contains("serialization"));

        let gzip_err = decompress(b"nope").unwrap_err();
        assert!(gzip_err.to_string().contains("compression"));
    }
}
