//! Pack-file decoding and ref-delta resolution.
//!
//! Decoding is strictly sequential: ref-deltas may reference bases that
//! appeared earlier in the same pack (or already in the store), so objects
//! are written to `ObjectStore` as they're decoded rather than collected
//! first. Deltas whose base hasn't been seen yet are retried once the rest
//! of the pack has been processed.

use miniz_oxide::inflate::{
    core::{decompress, inflate_flags, DecompressorOxide},
    TINFLStatus,
};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;

const SIGNATURE: &[u8; 4] = b"PACK";
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 20;
const MSB: u8 = 0b1000_0000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RawType {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl RawType {
    fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            other => Err(Error::BadPack(format!("unknown object type code {other}"))),
        }
    }
}

struct PackCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PackCursor<'a> {
    fn new(buf: &'a [u8]) -> Result<(Self, usize)> {
        if buf.len() < HEADER_LEN || &buf[0..4] != SIGNATURE {
            return Err(Error::BadPack("missing PACK magic".into()));
        }

        let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if version != 2 {
            return Err(Error::BadPack(format!("unsupported pack version {version}")));
        }

        let count = u32::from_be_bytes(buf[8..12].try_into().unwrap()) as usize;
        Ok((Self { buf, pos: HEADER_LEN }, count))
    }

    /// First byte: bit7 continuation, bits6..4 type, bits3..0 low size bits.
    /// Subsequent bytes: bit7 continuation, bits6..0 contribute 7 more bits
    /// each, shifted by `4 + 7*(i-1)`. Distinct from the pure LEB128 used
    /// inside delta streams (see `read_leb128`); don't conflate the two.
    fn read_preamble(&mut self) -> Result<(RawType, usize)> {
        let first = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::BadPack("truncated pack: object preamble".into()))?;
        self.pos += 1;

        let raw_type = RawType::from_code((first >> 4) & 0b111)?;
        let mut size = (first & 0x0f) as usize;
        let mut shift = 4;
        let mut byte = first;

        while byte & MSB != 0 {
            byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| Error::BadPack("truncated pack: object preamble".into()))?;
            self.pos += 1;
            size |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
        }

        Ok((raw_type, size))
    }

    fn read_base_id(&mut self) -> Result<ObjectId> {
        let slice = self
            .buf
            .get(self.pos..self.pos + ObjectId::LEN)
            .ok_or_else(|| Error::BadPack("truncated pack: ref-delta base id".into()))?;
        let mut array = [0u8; ObjectId::LEN];
        array.copy_from_slice(slice);
        self.pos += ObjectId::LEN;
        Ok(ObjectId::new(array))
    }

    /// Inflates the zlib stream starting at the cursor into exactly
    /// `expected_size` bytes, advancing the cursor past the bytes consumed.
    fn inflate(&mut self, expected_size: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; expected_size];
        let flags = inflate_flags::TINFL_FLAG_USING_NON_WRAPPING_OUTPUT_BUF
            | inflate_flags::TINFL_FLAG_PARSE_ZLIB_HEADER;

        let mut decompressor = DecompressorOxide::new();
        let (status, consumed, written) =
            decompress(&mut decompressor, &self.buf[self.pos..], &mut out, 0, flags);

        if status != TINFLStatus::Done || written != expected_size {
            return Err(Error::BadPack(format!(
                "zlib object stream decode failed: {status:?} (wrote {written}, wanted {expected_size})"
            )));
        }

        self.pos += consumed;
        Ok(out)
    }
}

/// Decodes every object in `buf` and writes it to `store`. Returns the ids
/// of the objects in encounter order. `verify_checksum` checks the trailing
/// 20-byte SHA-1 against a running hash of the preceding bytes; core decode
/// does not require it, but callers driving a clone should pass `true`.
pub fn decode_and_store(
    store: &ObjectStore,
    buf: &[u8],
    verify_checksum: bool,
) -> Result<Vec<ObjectId>> {
    let (mut cursor, count) = PackCursor::new(buf)?;
    let mut written = Vec::with_capacity(count);
    let mut pending: Vec<(ObjectId, Vec<u8>)> = Vec::new();

    for _ in 0..count {
        let (raw_type, size) = cursor.read_preamble()?;

        match raw_type {
            RawType::OfsDelta => {
                return Err(Error::Unsupported("ofs-delta objects are not supported".into()))
            }
            RawType::RefDelta => {
                let base = cursor.read_base_id()?;
                let delta = cursor.inflate(size)?;

                if store.has(base) {
                    written.push(resolve_and_store(store, base, &delta)?);
                } else {
                    log::trace!("delta base {base} not yet seen, deferring");
                    pending.push((base, delta));
                }
            }
            _ => {
                let kind = match raw_type {
                    RawType::Commit => ObjectType::Commit,
                    RawType::Tree => ObjectType::Tree,
                    RawType::Blob => ObjectType::Blob,
                    RawType::Tag => ObjectType::Tag,
                    RawType::OfsDelta | RawType::RefDelta => unreachable!(),
                };
                let payload = cursor.inflate(size)?;
                let id = store.write(kind, &payload)?;
                log::trace!("stored {kind} {id}");
                written.push(id);
            }
        }
    }

    resolve_pending(store, pending, &mut written)?;

    if verify_checksum {
        verify_trailer(buf, cursor.pos)?;
    }

    Ok(written)
}

fn resolve_pending(
    store: &ObjectStore,
    mut pending: Vec<(ObjectId, Vec<u8>)>,
    written: &mut Vec<ObjectId>,
) -> Result<()> {
    while !pending.is_empty() {
        let mut progressed = false;
        let mut i = 0;

        while i < pending.len() {
            if store.has(pending[i].0) {
                let (base, delta) = pending.remove(i);
                written.push(resolve_and_store(store, base, &delta)?);
                progressed = true;
            } else {
                i += 1;
            }
        }

        if !progressed {
            return Err(Error::MissingBase(pending[0].0));
        }
    }

    Ok(())
}

fn resolve_and_store(store: &ObjectStore, base: ObjectId, delta: &[u8]) -> Result<ObjectId> {
    let (base_type, base_payload) = store.read(base)?;
    let target = apply_delta(delta, &base_payload)?;
    let id = store.write(base_type, &target)?;
    log::trace!("reconstructed {base_type} {id} from base {base}");
    Ok(id)
}

fn verify_trailer(buf: &[u8], objects_end: usize) -> Result<()> {
    let trailer = buf
        .get(objects_end..objects_end + TRAILER_LEN)
        .ok_or_else(|| Error::BadPack("pack is missing its trailing checksum".into()))?;

    let mut hasher = Sha1::new();
    hasher.update(&buf[..objects_end]);
    let expected: [u8; TRAILER_LEN] = hasher.finalize().into();

    if trailer != expected {
        return Err(Error::BadPack("pack checksum does not match its contents".into()));
    }

    Ok(())
}

/// A pure LEB128 varint: 7 bits per byte, continuation in bit 7. Used for
/// delta source/target sizes, which is a different encoding from the pack
/// object preamble above; mixing the two up silently corrupts offsets.
fn read_leb128(delta: &[u8], i: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0;

    loop {
        let byte = *delta
            .get(*i)
            .ok_or_else(|| Error::BadDelta("truncated size varint".into()))?;
        *i += 1;
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;

        if byte & MSB == 0 {
            break;
        }
    }

    Ok(value)
}

/// Reconstructs a target payload from a base payload and a delta stream of
/// copy/insert opcodes.
fn apply_delta(delta: &[u8], base: &[u8]) -> Result<Vec<u8>> {
    let mut i = 0;
    let source_size = read_leb128(delta, &mut i)?;
    let target_size = read_leb128(delta, &mut i)?;

    if source_size != base.len() {
        return Err(Error::BadDelta(format!(
            "delta source size {source_size} does not match base length {}",
            base.len()
        )));
    }

    let mut target = Vec::with_capacity(target_size);

    while i < delta.len() {
        let op = delta[i];
        i += 1;

        if op & MSB != 0 {
            let mut copy_offset = 0usize;
            for bit in 0..4 {
                if op & (1 << bit) != 0 {
                    let byte = *delta
                        .get(i)
                        .ok_or_else(|| Error::BadDelta("truncated copy offset".into()))?;
                    copy_offset |= (byte as usize) << (8 * bit);
                    i += 1;
                }
            }

            let mut copy_len = 0usize;
            for bit in 0..3 {
                if op & (1 << (4 + bit)) != 0 {
                    let byte = *delta
                        .get(i)
                        .ok_or_else(|| Error::BadDelta("truncated copy length".into()))?;
                    copy_len |= (byte as usize) << (8 * bit);
                    i += 1;
                }
            }

            // A zero-length field means 0x10000, not 0.
            if copy_len == 0 {
                copy_len = 0x10000;
            }

            let end = copy_offset
                .checked_add(copy_len)
                .ok_or_else(|| Error::BadDelta("copy range overflows".into()))?;
            let slice = base
                .get(copy_offset..end)
                .ok_or_else(|| Error::BadDelta("copy range out of bounds".into()))?;
            target.extend_from_slice(slice);
        } else if op != 0 {
            let len = op as usize;
            let slice = delta
                .get(i..i + len)
                .ok_or_else(|| Error::BadDelta("truncated insert payload".into()))?;
            target.extend_from_slice(slice);
            i += len;
        } else {
            return Err(Error::BadDelta("opcode 0 is reserved".into()));
        }
    }

    if target.len() != target_size {
        return Err(Error::BadDelta(format!(
            "reconstructed target is {} bytes, declared size was {target_size}",
            target.len()
        )));
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_pack(objects: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&(objects.len() as u32).to_be_bytes());

        for (type_code, payload) in objects {
            write_preamble(&mut buf, *type_code, payload.len());
            buf.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(payload, 6));
        }

        let mut hasher = Sha1::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize());
        buf
    }

    fn write_preamble(buf: &mut Vec<u8>, type_code: u8, mut size: usize) {
        let mut first = (type_code << 4) | (size as u8 & 0x0f);
        size >>= 4;
        if size > 0 {
            first |= MSB;
        }
        buf.push(first);

        while size > 0 {
            let mut byte = (size & 0x7f) as u8;
            size >>= 7;
            if size > 0 {
                byte |= MSB;
            }
            buf.push(byte);
        }
    }

    #[test]
    fn decodes_a_single_blob() {
        let pack = build_pack(&[(3, b"hello world")]);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let ids = decode_and_store(&store, &pack, true).unwrap();
        assert_eq!(ids.len(), 1);

        let (kind, payload) = store.read(ids[0]).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, b"hello world");
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let result = decode_and_store(&store, b"not a pack file at all!", false);
        assert!(matches!(result, Err(Error::BadPack(_))));
    }

    #[test]
    fn ref_delta_reconstructs_against_stored_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let base_id = store.write(ObjectType::Blob, b"hello world").unwrap();

        // delta: source_size=11, target_size=17, copy[0..11], insert "!!!!!!"
        let mut delta = Vec::new();
        delta.push(11); // source_size varint (fits in one byte)
        delta.push(17); // target_size varint
        delta.push(0b1001_0001); // copy op: offset byte + size byte present
        delta.push(0); // offset = 0
        delta.push(11); // length = 11
        delta.push(6); // insert 6 bytes
        delta.extend_from_slice(b"!!!!!!");

        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        write_preamble(&mut buf, 7, delta.len());
        buf.extend_from_slice(base_id.as_bytes());
        buf.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(&delta, 6));
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize());

        let ids = decode_and_store(&store, &buf, true).unwrap();
        assert_eq!(ids.len(), 1);

        let (kind, payload) = store.read(ids[0]).unwrap();
        assert_eq!(kind, ObjectType::Blob);
        assert_eq!(payload, b"hello world!!!!!!");
    }

    #[test]
    fn zero_length_copy_means_0x10000_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let base_payload = vec![7u8; 0x10000];
        let base_id = store.write(ObjectType::Blob, &base_payload).unwrap();

        // copy op with offset=0 and no length bytes present at all -> 0x10000
        let mut delta = Vec::new();
        delta.extend_from_slice(&encode_leb128(0x10000));
        delta.extend_from_slice(&encode_leb128(0x10000));
        delta.push(0b1000_0001); // only offset byte present, size bits absent
        delta.push(0);

        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        write_preamble(&mut buf, 7, delta.len());
        buf.extend_from_slice(base_id.as_bytes());
        buf.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(&delta, 6));
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize());

        let ids = decode_and_store(&store, &buf, true).unwrap();
        let (_, payload) = store.read(ids[0]).unwrap();
        assert_eq!(payload.len(), 0x10000);
        assert_eq!(payload, base_payload);
    }

    fn encode_leb128(mut value: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value > 0 {
                byte |= MSB;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
        out
    }

    #[test]
    fn missing_base_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let delta = vec![0, 0]; // source_size=0, target_size=0, no opcodes
        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        write_preamble(&mut buf, 7, delta.len());
        buf.extend_from_slice(ObjectId::new([0x42; 20]).as_bytes());
        buf.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(&delta, 6));
        buf.extend_from_slice(&[0u8; TRAILER_LEN]);

        let result = decode_and_store(&store, &buf, false);
        assert!(matches!(result, Err(Error::MissingBase(_))));
    }

    #[test]
    fn ofs_delta_is_unsupported() {
        let pack = build_pack(&[(6, b"ignored")]);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        assert!(matches!(
            decode_and_store(&store, &pack, false),
            Err(Error::Unsupported(_))
        ));
    }
}
