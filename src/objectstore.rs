//! Content-addressed filesystem object store: `.git/objects/xx/yyyy…`.

use std::fs;
use std::path::PathBuf;

use sha1::{Digest, Sha1};

use crate::codec;
use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// `objects_dir` is the `.git/objects` directory; it need not exist yet.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: objects_dir.into(),
        }
    }

    fn path_for(&self, id: ObjectId) -> PathBuf {
        let (dir, file) = id.object_path_parts();
        self.root.join(dir).join(file)
    }

    /// Writes `(kind, payload)`, returning its id. A no-op if the id is
    /// already present: objects are write-once, and two objects with the
    /// same id are byte-identical by construction.
    pub fn write(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let (id, framed) = codec::frame(kind, payload);
        let path = self.path_for(id);

        if path.exists() {
            return Ok(id);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let compressed = codec::compress(&framed);
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &compressed)?;
        fs::rename(&tmp_path, &path)?;

        log::trace!("wrote {kind} {id}");

        Ok(id)
    }

    pub fn has(&self, id: ObjectId) -> bool {
        self.path_for(id).exists()
    }

    /// Reads and unframes an object. Does not check the id against the
    /// content's hash; use `read_verified` when that matters.
    pub fn read(&self, id: ObjectId) -> Result<(ObjectType, Vec<u8>)> {
        let framed = self.read_framed(id)?;
        let (kind, payload) = codec::unframe(&framed)?;
        Ok((kind, payload.to_vec()))
    }

    /// Reads an object and fails with `HashMismatch` if its framed bytes do
    /// not hash back to `id`.
    pub fn read_verified(&self, id: ObjectId) -> Result<(ObjectType, Vec<u8>)> {
        let framed = self.read_framed(id)?;

        let mut hasher = Sha1::new();
        hasher.update(&framed);
        let actual = ObjectId::new(hasher.finalize().into());

        if actual != id {
            return Err(Error::HashMismatch { expected: id, actual });
        }

        let (kind, payload) = codec::unframe(&framed)?;
        Ok((kind, payload.to_vec()))
    }

    fn read_framed(&self, id: ObjectId) -> Result<Vec<u8>> {
        let path = self.path_for(id);
        let compressed = fs::read(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(id),
            _ => Error::Io(err),
        })?;
        codec::decompress(&compressed, None)
    }
}
