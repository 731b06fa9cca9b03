//! Object framing and zlib compression.
//!
//! This is the single place that knows an object id is the SHA-1 of the
//! framed *uncompressed* bytes, not of the on-disk compressed file; every
//! other module only ever traffics in `(ObjectType, payload)` pairs.

use std::io::Write;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;

/// Produces `<kind> <len>\0<payload>` and its id.
pub fn frame(kind: ObjectType, payload: &[u8]) -> (ObjectId, Vec<u8>) {
    let mut framed = Vec::with_capacity(payload.len() + 32);
    write!(&mut framed, "{kind} {}\0", payload.len()).unwrap();
    framed.extend_from_slice(payload);

    let mut hasher = Sha1::new();
    hasher.update(&framed);
    let id = ObjectId::new(hasher.finalize().into());

    (id, framed)
}

/// Splits framed bytes at the first NUL and validates the declared length.
pub fn unframe(framed: &[u8]) -> Result<(ObjectType, &[u8])> {
    let nul = framed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Corrupt("object header has no NUL terminator".into()))?;

    let header = std::str::from_utf8(&framed[..nul])
        .map_err(|_| Error::Corrupt("object header is not valid UTF-8".into()))?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| Error::Corrupt(format!("malformed object header {header:?}")))?;

    let kind = ObjectType::parse(kind)?;
    let len: usize = len
        .parse()
        .map_err(|_| Error::Corrupt(format!("non-numeric object length {len:?}")))?;

    let payload = &framed[nul + 1..];
    if payload.len() != len {
        return Err(Error::Corrupt(format!(
            "declared length {len} does not match payload length {}",
            payload.len()
        )));
    }

    Ok((kind, payload))
}

pub fn compress(bytes: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(bytes, 6)
}

/// Decompresses a complete zlib stream. `expected_size`, when known, caps
/// the output buffer so a corrupt stream can't be used to exhaust memory.
pub fn decompress(bytes: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    let result = match expected_size {
        Some(size) => miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(bytes, size),
        None => miniz_oxide::inflate::decompress_to_vec_zlib(bytes),
    };

    result.map_err(|err| Error::Corrupt(format!("zlib decompression failed: {err:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_known_blob_id() {
        let (id, framed) = frame(ObjectType::Blob, b"hello world");
        assert_eq!(framed, b"blob 11\0hello world");
        assert_eq!(id.to_string(), "95d09f2b10159347eebef1b2d180b24acfd86a37");
    }

    #[test]
    fn empty_blob_id_is_well_known() {
        let (id, _) = frame(ObjectType::Blob, b"");
        assert_eq!(id.to_string(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn unframe_inverts_frame() {
        let (_, framed) = frame(ObjectType::Tree, b"some payload");
        let (kind, payload) = unframe(&framed).unwrap();
        assert_eq!(kind, ObjectType::Tree);
        assert_eq!(payload, b"some payload");
    }

    #[test]
    fn unframe_rejects_length_mismatch() {
        let mut framed = b"blob 4\0".to_vec();
        framed.extend_from_slice(b"abc");
        assert!(matches!(unframe(&framed), Err(Error::Corrupt(_))));
    }

    #[test]
    fn compress_decompress_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(&data);
        let decompressed = decompress(&compressed, None).unwrap();
        assert_eq!(decompressed, data);
    }
}
