//! Commit object writing and parsing.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::ObjectType;
use crate::objectstore::ObjectStore;

/// An author or committer identity: a display name and an email address.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

fn validate_identity_field(field: &str) -> Result<()> {
    if field.contains('\n') || field.contains('<') || field.contains('>') {
        return Err(Error::MalformedCommit(format!(
            "identity field {field:?} contains an illegal character"
        )));
    }
    Ok(())
}

/// Writes `tree <id>\n[parent <id>\n]author …\ncommitter …\n\n<message>\n`,
/// framed as `commit`. `author`/`committer` MUST be emitted in that order;
/// swapping them is a format error downstream tools will reject silently.
#[allow(clippy::too_many_arguments)]
pub fn write_commit(
    store: &ObjectStore,
    tree: ObjectId,
    parent: Option<ObjectId>,
    author: &Identity,
    committer: &Identity,
    timestamp: Option<u64>,
    tz_offset: &str,
    message: &str,
) -> Result<ObjectId> {
    for field in [&author.name, &author.email, &committer.name, &committer.email] {
        validate_identity_field(field)?;
    }

    let timestamp = timestamp.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    });

    let mut payload = Vec::new();
    payload.extend_from_slice(format!("tree {tree}\n").as_bytes());
    if let Some(parent) = parent {
        payload.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }
    payload.extend_from_slice(
        format!(
            "author {} <{}> {timestamp} {tz_offset}\n",
            author.name, author.email
        )
        .as_bytes(),
    );
    payload.extend_from_slice(
        format!(
            "committer {} <{}> {timestamp} {tz_offset}\n",
            committer.name, committer.email
        )
        .as_bytes(),
    );
    payload.push(b'\n');
    payload.extend_from_slice(message.as_bytes());
    if !message.ends_with('\n') {
        payload.push(b'\n');
    }

    store.write(ObjectType::Commit, &payload)
}

/// Extracts `(tree, parents, message)` from a commit payload.
pub fn parse(payload: &[u8]) -> Result<(ObjectId, Vec<ObjectId>, &str)> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::MalformedCommit("commit is not valid UTF-8".into()))?;
    let (header, message) = text
        .split_once("\n\n")
        .ok_or_else(|| Error::MalformedCommit("missing blank line between header and message".into()))?;

    let mut tree = None;
    let mut parents = Vec::new();

    for line in header.lines() {
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| Error::MalformedCommit(format!("malformed header line {line:?}")))?;

        match key {
            "tree" => {
                tree = Some(
                    ObjectId::from_hex(value)
                        .ok_or_else(|| Error::MalformedCommit(format!("bad tree id {value:?}")))?,
                );
            }
            "parent" => parents.push(
                ObjectId::from_hex(value)
                    .ok_or_else(|| Error::MalformedCommit(format!("bad parent id {value:?}")))?,
            ),
            _ => {}
        }
    }

    let tree = tree.ok_or_else(|| Error::MalformedCommit("commit is missing a tree header".into()))?;
    Ok((tree, parents, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::new([byte; 20])
    }

    #[test]
    fn writes_canonical_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let tree = id(0xaa);
        let parent = id(0xbb);
        let author = Identity { name: "A".into(), email: "a@example.com".into() };
        let committer = Identity { name: "C".into(), email: "c@example.com".into() };

        let commit_id = write_commit(
            &store,
            tree,
            Some(parent),
            &author,
            &committer,
            Some(1000),
            "+0000",
            "msg",
        )
        .unwrap();

        let (_, payload) = store.read(commit_id).unwrap();
        let text = String::from_utf8(payload).unwrap();
        let expected_prefix = format!(
            "tree {tree}\nparent {parent}\nauthor A <a@example.com> 1000 +0000\ncommitter C <c@example.com> 1000 +0000\n\nmsg\n"
        );
        assert_eq!(text, expected_prefix);
    }

    #[test]
    fn rejects_identity_with_angle_bracket() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let author = Identity { name: "A>".into(), email: "a@example.com".into() };
        let committer = Identity { name: "C".into(), email: "c@example.com".into() };

        let result = write_commit(&store, id(1), None, &author, &committer, Some(0), "+0000", "m");
        assert!(matches!(result, Err(Error::MalformedCommit(_))));
    }

    #[test]
    fn parse_extracts_tree_and_parents() {
        let payload = b"tree aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\nparent bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\nauthor a <a@b> 1 +0000\ncommitter a <a@b> 1 +0000\n\nhi\n";
        let (tree, parents, message) = parse(payload).unwrap();
        assert_eq!(tree.to_string(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(parents.len(), 1);
        assert_eq!(message, "hi\n");
    }
}
