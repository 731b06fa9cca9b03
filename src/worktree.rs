//! Materializes a commit's tree onto disk as a working tree.

use std::fs;
use std::path::Path;

use crate::commit;
use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;
use crate::tree::{self, Mode};

/// Checks out the tree referenced by `commit_id` into `dest`, which must
/// already exist and be empty of any conflicting entries.
pub fn materialize(store: &ObjectStore, commit_id: ObjectId, dest: &Path) -> Result<()> {
    let (kind, payload) = store.read(commit_id)?;
    if kind != ObjectType::Commit {
        return Err(Error::MalformedCommit(format!(
            "{commit_id} is a {kind}, not a commit"
        )));
    }

    let (tree_id, _, _) = commit::parse(&payload)?;
    materialize_tree(store, tree_id, dest)
}

fn materialize_tree(store: &ObjectStore, tree_id: ObjectId, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;

    for entry in tree::read(store, tree_id)? {
        let path = dest.join(&entry.name);

        match entry.mode {
            Mode::Directory => materialize_tree(store, entry.id, &path)?,
            Mode::SymbolicLink => {
                let (_, target) = store.read(entry.id)?;
                let target = String::from_utf8(target)
                    .map_err(|_| Error::Corrupt(format!("symlink target for {path:?} is not utf-8")))?;
                symlink(&target, &path)?;
            }
            Mode::RegularFile | Mode::ExecutableFile => {
                let (_, bytes) = store.read(entry.id)?;
                fs::write(&path, &bytes)?;
                set_executable(&path, entry.mode == Mode::ExecutableFile)?;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn symlink(target: &str, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(target: &str, path: &Path) -> Result<()> {
    // no native symlink support; fall back to writing the link target as a
    // regular file so a clone at least doesn't lose data
    fs::write(path, target)?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if executable {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{write_commit, Identity};

    #[test]
    fn materializes_a_single_file_commit() {
        let objects_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(objects_dir.path());

        let blob_id = store.write(ObjectType::Blob, b"hello world").unwrap();
        let tree_id = tree::write(
            &store,
            vec![tree::TreeEntry {
                mode: Mode::RegularFile,
                name: "hello.txt".into(),
                id: blob_id,
            }],
        )
        .unwrap();

        let identity = Identity { name: "A".into(), email: "a@example.com".into() };
        let commit_id = write_commit(&store, tree_id, None, &identity, &identity, Some(0), "+0000", "msg")
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        materialize(&store, commit_id, dest.path()).unwrap();

        let content = fs::read(dest.path().join("hello.txt")).unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn materializes_nested_directories() {
        let objects_dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(objects_dir.path());

        let blob_id = store.write(ObjectType::Blob, b"nested").unwrap();
        let inner_tree = tree::write(
            &store,
            vec![tree::TreeEntry { mode: Mode::RegularFile, name: "b.txt".into(), id: blob_id }],
        )
        .unwrap();
        let outer_tree = tree::write(
            &store,
            vec![tree::TreeEntry { mode: Mode::Directory, name: "sub".into(), id: inner_tree }],
        )
        .unwrap();

        let identity = Identity { name: "A".into(), email: "a@example.com".into() };
        let commit_id =
            write_commit(&store, outer_tree, None, &identity, &identity, Some(0), "+0000", "msg").unwrap();

        let dest = tempfile::tempdir().unwrap();
        materialize(&store, commit_id, dest.path()).unwrap();

        let content = fs::read(dest.path().join("sub").join("b.txt")).unwrap();
        assert_eq!(content, b"nested");
    }
}
