use core::fmt;

use crate::hash::ObjectId;

/// Errors surfaced by the object store, pack decoder, and protocol client.
///
/// Every variant carries enough context (an id or a short message) to print
/// a single diagnostic line, per the CLI's error reporting contract.
#[derive(Debug)]
pub enum Error {
    NotFound(ObjectId),
    Corrupt(String),
    HashMismatch { expected: ObjectId, actual: ObjectId },
    MalformedTree(String),
    MalformedCommit(String),
    BadPack(String),
    BadDelta(String),
    MissingBase(ObjectId),
    Unsupported(String),
    PathError(String),
    GitProtocolError(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(id) => write!(f, "NotFound: object {id} does not exist"),
            Error::Corrupt(msg) => write!(f, "Corrupt: {msg}"),
            Error::HashMismatch { expected, actual } => {
                write!(f, "HashMismatch: expected {expected}, computed {actual}")
            }
            Error::MalformedTree(msg) => write!(f, "MalformedTree: {msg}"),
            Error::MalformedCommit(msg) => write!(f, "MalformedCommit: {msg}"),
            Error::BadPack(msg) => write!(f, "BadPack: {msg}"),
            Error::BadDelta(msg) => write!(f, "BadDelta: {msg}"),
            Error::MissingBase(id) => write!(f, "MissingBase: {id}"),
            Error::Unsupported(msg) => write!(f, "Unsupported: {msg}"),
            Error::PathError(msg) => write!(f, "PathError: {msg}"),
            Error::GitProtocolError(msg) => write!(f, "GitProtocolError: {msg}"),
            Error::Io(err) => write!(f, "Io: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::GitProtocolError(err.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
