//! On-disk repository layout: `.git/objects`, `.git/refs`, and `.git/HEAD`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commit::{self, Identity};
use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;
use crate::snapshot;
use crate::tree::TreeEntry;

const GIT_DIR: &str = ".git";

/// Identity and timezone defaults, sourced from the environment the way
/// the real git client reads `GIT_AUTHOR_*`/`GIT_COMMITTER_*`.
pub struct Config {
    pub author: Identity,
    pub committer: Identity,
    pub tz_offset: String,
}

impl Config {
    pub fn from_env() -> Self {
        let author = Identity {
            name: env::var("GIT_AUTHOR_NAME").unwrap_or_else(|_| "mingit".to_string()),
            email: env::var("GIT_AUTHOR_EMAIL").unwrap_or_else(|_| "mingit@localhost".to_string()),
        };
        let committer = Identity {
            name: env::var("GIT_COMMITTER_NAME").unwrap_or_else(|_| author.name.clone()),
            email: env::var("GIT_COMMITTER_EMAIL").unwrap_or_else(|_| author.email.clone()),
        };
        let tz_offset = env::var("GIT_AUTHOR_DATE_TZ").unwrap_or_else(|_| "+0000".to_string());

        Self { author, committer, tz_offset }
    }
}

/// A repository rooted at `root`, with its object store at `root/.git/objects`.
pub struct Repository {
    pub root: PathBuf,
    pub git_dir: PathBuf,
    pub objects: ObjectStore,
}

impl Repository {
    /// Creates a fresh `.git` layout under `root`, which must not already
    /// contain one.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let git_dir = root.join(GIT_DIR);

        if git_dir.exists() {
            return Err(Error::PathError(format!("{} is already a repository", git_dir.display())));
        }

        fs::create_dir_all(&git_dir)?;
        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs").join("heads"))?;
        fs::write(git_dir.join("HEAD"), b"ref: refs/heads/main\n")?;

        log::debug!("initialized repository at {}", git_dir.display());

        let objects = ObjectStore::new(git_dir.join("objects"));
        Ok(Self { root, git_dir, objects })
    }

    /// Opens an existing repository rooted at `root`.
    pub fn discover(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let git_dir = root.join(GIT_DIR);

        if !git_dir.is_dir() {
            return Err(Error::PathError(format!("{} is not a git repository", root.display())));
        }

        let objects = ObjectStore::new(git_dir.join("objects"));
        Ok(Self { root, git_dir, objects })
    }

    /// Writes a direct ref (`refs/heads/<name>` or `HEAD`) pointing at `id`.
    pub fn write_ref(&self, name: &str, id: ObjectId) -> Result<()> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{id}\n"))?;
        Ok(())
    }

    /// Reads a direct or symbolic ref, following exactly one level of
    /// `ref: ` indirection (enough for `HEAD -> refs/heads/<branch>`).
    pub fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let path = self.ref_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Io(err)),
        };
        let contents = contents.trim();

        if let Some(target) = contents.strip_prefix("ref: ") {
            return self.read_ref(target);
        }

        ObjectId::from_hex(contents)
            .map(Some)
            .ok_or_else(|| Error::Corrupt(format!("malformed ref contents {contents:?} in {name}")))
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        if name == "HEAD" {
            self.git_dir.join("HEAD")
        } else {
            self.git_dir.join(name)
        }
    }

    pub fn write_tree(&self, entries: Vec<TreeEntry>) -> Result<ObjectId> {
        crate::tree::write(&self.objects, entries)
    }

    /// Snapshots the working directory into a tree object.
    pub fn snapshot_worktree(&self) -> Result<ObjectId> {
        snapshot::snapshot(&self.objects, &self.root)
    }

    /// Writes a commit object on top of `tree` with the given `parent`.
    /// Does not move any ref; callers that want `HEAD` to follow a commit
    /// must call `write_ref` themselves.
    pub fn commit_tree(
        &self,
        config: &Config,
        tree: ObjectId,
        parent: Option<ObjectId>,
        message: &str,
    ) -> Result<ObjectId> {
        commit::write_commit(
            &self.objects,
            tree,
            parent,
            &config.author,
            &config.committer,
            None,
            &config.tz_offset,
            message,
        )
    }

    pub fn read_object(&self, id: ObjectId) -> Result<(ObjectType, Vec<u8>)> {
        self.objects.read(id)
    }

    pub fn worktree_path(&self) -> &Path {
        &self.root
    }
}
