//! Recursive working-directory snapshotter: `write-tree`.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;
use crate::tree::{self, Mode, TreeEntry};

/// Snapshots `dir` into a tree object, writing every blob and subtree it
/// references along the way. Always produces a tree object, even if `dir`
/// (at the root) is empty.
pub fn snapshot(store: &ObjectStore, dir: &Path) -> Result<ObjectId> {
    let entries = collect_entries(store, dir)?;
    tree::write(store, entries)
}

fn collect_entries(store: &ObjectStore, dir: &Path) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name();
        if name == ".git" {
            continue;
        }

        let name = match name.into_string() {
            Ok(name) => name,
            Err(_) => {
                log::warn!("skipping non-utf8 entry name in {}", dir.display());
                continue;
            }
        };

        let file_type = dir_entry.file_type()?;
        let path = dir_entry.path();

        if file_type.is_dir() {
            let sub_entries = collect_entries(store, &path)?;
            if sub_entries.is_empty() {
                // empty directories are dropped, not represented
                continue;
            }
            let id = tree::write(store, sub_entries)?;
            entries.push(TreeEntry { mode: Mode::Directory, name, id });
        } else if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let bytes = target.to_string_lossy().into_owned().into_bytes();
            let id = store.write(ObjectType::Blob, &bytes)?;
            entries.push(TreeEntry { mode: Mode::SymbolicLink, name, id });
        } else if file_type.is_file() {
            let bytes = fs::read(&path)?;
            let id = store.write(ObjectType::Blob, &bytes)?;
            let mode = executable_mode(&dir_entry)?;
            entries.push(TreeEntry { mode, name, id });
        } else {
            log::warn!("skipping unsupported directory entry {}", path.display());
        }
    }

    Ok(entries)
}

#[cfg(unix)]
fn executable_mode(entry: &fs::DirEntry) -> Result<Mode> {
    use std::os::unix::fs::PermissionsExt;
    let perms = entry.metadata()?.permissions();
    Ok(if perms.mode() & 0o111 != 0 {
        Mode::ExecutableFile
    } else {
        Mode::RegularFile
    })
}

#[cfg(not(unix))]
fn executable_mode(_entry: &fs::DirEntry) -> Result<Mode> {
    Ok(Mode::RegularFile)
}
