//! Tree entries, canonical serialization/parsing, and canonical ordering.

use core::fmt;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;

/// A tree entry's file mode. Only the four modes spec'd for this store are
/// represented; anything else is a parse error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Mode {
    Directory = 0o40000,
    RegularFile = 0o100644,
    ExecutableFile = 0o100755,
    SymbolicLink = 0o120000,
}

impl Mode {
    pub fn from_octal_str(text: &str) -> Result<Self> {
        let value = u32::from_str_radix(text, 8)
            .map_err(|_| Error::MalformedTree(format!("invalid mode {text:?}")))?;

        match value {
            0o40000 => Ok(Self::Directory),
            0o100644 => Ok(Self::RegularFile),
            0o100755 => Ok(Self::ExecutableFile),
            0o120000 => Ok(Self::SymbolicLink),
            _ => Err(Error::MalformedTree(format!("unsupported mode {text:?}"))),
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Zero-padded six-digit octal form, as printed by `ls-tree`.
    pub fn padded_octal(self) -> String {
        format!("{:06o}", self as u32)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", *self as u32)
    }
}

#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub mode: Mode,
    pub name: String,
    pub id: ObjectId,
}

/// Directory names sort as though a trailing `/` were appended, matching
/// the reference implementation rather than pure lexicographic order.
fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

/// Serializes entries into the canonical `<mode> <name>\0<20-byte-id>…`
/// payload, sorting them first.
pub fn serialize(mut entries: Vec<TreeEntry>) -> Vec<u8> {
    entries.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut out = Vec::new();
    for entry in &entries {
        out.extend_from_slice(entry.mode.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

/// Inverse of `serialize`.
pub fn parse(payload: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::MalformedTree("missing space after mode".into()))?;
        let mode_text = std::str::from_utf8(&rest[..space])
            .map_err(|_| Error::MalformedTree("non-utf8 mode".into()))?;
        let mode = Mode::from_octal_str(mode_text)?;

        let after_mode = &rest[space + 1..];
        let nul = after_mode
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::MalformedTree("missing NUL after name".into()))?;
        let name = std::str::from_utf8(&after_mode[..nul])
            .map_err(|_| Error::MalformedTree("non-utf8 entry name".into()))?
            .to_string();

        let id_start = nul + 1;
        let id_bytes = after_mode
            .get(id_start..id_start + ObjectId::LEN)
            .ok_or_else(|| Error::MalformedTree("tree entry truncated before object id".into()))?;
        let mut array = [0u8; ObjectId::LEN];
        array.copy_from_slice(id_bytes);

        entries.push(TreeEntry {
            mode,
            name,
            id: ObjectId::new(array),
        });

        rest = &after_mode[id_start + ObjectId::LEN..];
    }

    Ok(entries)
}

pub fn write(store: &ObjectStore, entries: Vec<TreeEntry>) -> Result<ObjectId> {
    let payload = serialize(entries);
    store.write(ObjectType::Tree, &payload)
}

pub fn read(store: &ObjectStore, id: ObjectId) -> Result<Vec<TreeEntry>> {
    let (kind, payload) = store.read(id)?;
    if kind != ObjectType::Tree {
        return Err(Error::MalformedTree(format!(
            "object {id} is a {kind}, not a tree"
        )));
    }
    parse(&payload)
}
