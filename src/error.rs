//! Public error taxonomy
//!
//! Internal plumbing propagates `anyhow::Result` with `.context(...)` the
//! way the rest of this codebase does; at each public API boundary the
//! `anyhow::Error` is downcast into one of these typed variants so callers
//! outside the crate can match on error *kind* rather than message text.

use crate::hash::Hash;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("already a repository: {0}")]
    AlreadyARepository(PathBuf),

    #[error("io error at {path}: {cause}")]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("corrupt object {0}")]
    CorruptObject(Hash),

    #[error("corrupt index")]
    CorruptIndex,

    #[error("corrupt ref {0}")]
    CorruptRef(String),

    #[error("no such object {0}")]
    NoSuchObject(Hash),

    #[error("no such ref {0}")]
    NoSuchRef(String),

    #[error("no such remote {0}")]
    NoSuchRemote(String),

    #[error("no commits yet")]
    NoCommits,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid ignore pattern on line {line}: {pattern}")]
    InvalidIgnorePattern { line: usize, pattern: String },

    #[error("ref {0} is currently checked out")]
    RefInUse(String),

    #[error("branch {0} has no commits")]
    EmptyBranch(String),

    #[error("merge conflict (reserved, not implemented)")]
    MergeConflict,

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed")]
    AuthFailed,

    #[error("rate limited by remote")]
    RateLimited,

    #[error("transient network error: {0}")]
    NetworkTransient(String),

    #[error("http error {code}: {body}")]
    HttpError { code: u16, body: String },

    #[error("upload failed for {path}: {cause}")]
    UploadFailed { path: PathBuf, cause: String },

    #[error("file too large: {path} ({size} bytes)")]
    FileTooLarge { path: PathBuf, size: u64 },

    #[error("file is not a regular file: {0}")]
    RegularFileRequired(PathBuf),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for CLI collaborators, per the external-interfaces contract.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::CorruptObject(_) | Error::CorruptIndex | Error::CorruptRef(_) => 2,
        Error::AuthRequired
        | Error::AuthFailed
        | Error::RateLimited
        | Error::NetworkTransient(_)
        | Error::HttpError { .. }
        | Error::UploadFailed { .. } => 3,
        _ => 1,
    }
}
