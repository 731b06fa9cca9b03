//! HTTP clone driver: `ls-refs` + `fetch` over smart HTTP protocol v2.

use core::str::from_utf8;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::http::HttpTransport;
use crate::objectstore::ObjectStore;
use crate::packfile;
use crate::protocol::{encode, PacketLine, PktLine, PktLineReader};

/// Which ref to resolve `HEAD` to after a clone: the remote's advertised
/// `HEAD`, or a specific branch.
#[derive(Debug)]
pub enum Reference<'a> {
    Head,
    Branch(&'a str),
}

/// The outcome of a clone: every advertised ref (for informational purposes)
/// and the resolved id that `HEAD` should now point at.
pub struct ClonedRefs {
    pub refs: BTreeMap<String, ObjectId>,
    pub head: ObjectId,
}

/// Runs the `ls-refs` then `fetch` exchange against `transport`, storing
/// every object the remote sends into `store`, and returns the resolved
/// ref set. `reference` selects which ref becomes `HEAD` locally.
pub fn clone(transport: &HttpTransport, store: &ObjectStore, reference: Reference) -> Result<ClonedRefs> {
    let refs = ls_refs(transport)?;
    log::debug!("remote advertised {} refs", refs.len());

    let head = match reference {
        Reference::Head => *refs
            .get("HEAD")
            .ok_or_else(|| Error::GitProtocolError("remote did not advertise HEAD".into()))?,
        Reference::Branch(branch) => {
            let full = format!("refs/heads/{branch}");
            *refs
                .get(&full)
                .ok_or_else(|| Error::GitProtocolError(format!("no such branch {branch:?} on remote")))?
        }
    };

    let pack_bytes = fetch(transport, head)?;
    log::debug!("received {} bytes of pack data", pack_bytes.len());

    packfile::decode_and_store(store, &pack_bytes, true)?;

    Ok(ClonedRefs { refs, head })
}

fn ls_refs(transport: &HttpTransport) -> Result<BTreeMap<String, ObjectId>> {
    let request = encode(&[
        PacketLine::String("command=ls-refs\n"),
        PacketLine::DelimiterPacket,
        PacketLine::String("peel\n"),
        PacketLine::String("symrefs\n"),
        PacketLine::FlushPacket,
    ]);

    let response = transport.post_upload_pack(request)?;
    let mut refs = BTreeMap::new();

    let mut reader = PktLineReader::new(&response);
    while let Some(line) = reader.next_line()? {
        let PktLine::Data(data) = line else { continue };
        let text = from_utf8(data)
            .map_err(|_| Error::GitProtocolError("non-utf8 ls-refs line".into()))?
            .trim_end();

        let (hash_hex, rest) = text
            .split_once(' ')
            .ok_or_else(|| Error::GitProtocolError(format!("malformed ls-refs line {text:?}")))?;
        let ref_name = rest.split(' ').next().unwrap_or(rest);

        let id = ObjectId::from_hex(hash_hex)
            .ok_or_else(|| Error::GitProtocolError(format!("bad ref id {hash_hex:?}")))?;
        refs.insert(ref_name.to_string(), id);
    }

    Ok(refs)
}

fn fetch(transport: &HttpTransport, want: ObjectId) -> Result<Vec<u8>> {
    let want_line = format!("want {want}\n");

    let request = encode(&[
        PacketLine::String("command=fetch\n"),
        PacketLine::DelimiterPacket,
        PacketLine::String(&want_line),
        PacketLine::String("no-progress\n"),
        PacketLine::String("done\n"),
        PacketLine::FlushPacket,
    ]);

    let response = transport.post_upload_pack(request)?;
    demux_pack(&response)
}

/// `fetch` responses carry a literal `"packfile\n"` marker line followed by
/// sideband-tagged data lines: the first byte of each payload is the
/// channel (1 = pack data, 2 = progress text, 3 = fatal error).
fn demux_pack(response: &[u8]) -> Result<Vec<u8>> {
    let mut reader = PktLineReader::new(response);
    let mut saw_marker = false;
    let mut pack = Vec::new();

    while let Some(line) = reader.next_line()? {
        let data = match line {
            PktLine::Data(data) => data,
            PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => continue,
        };

        if !saw_marker {
            if data == b"packfile\n" {
                saw_marker = true;
            }
            continue;
        }

        let (channel, payload) = data
            .split_first()
            .ok_or_else(|| Error::GitProtocolError("empty sideband line".into()))?;

        match channel {
            1 => pack.extend_from_slice(payload),
            2 => log::debug!("remote: {}", String::from_utf8_lossy(payload).trim_end()),
            3 => {
                return Err(Error::GitProtocolError(format!(
                    "remote reported an error: {}",
                    String::from_utf8_lossy(payload).trim_end()
                )))
            }
            other => {
                return Err(Error::GitProtocolError(format!(
                    "unknown sideband channel {other}"
                )))
            }
        }
    }

    if !saw_marker {
        return Err(Error::GitProtocolError("fetch response had no packfile marker".into()));
    }

    Ok(pack)
}
