//! Core repository components
//!
//! - `database`: content-addressed object store (blobs, trees, commits)
//! - `cache`: in-memory LRU cache fronting the object store
//! - `index`: staging area tracking file changes
//! - `refs`: branch and HEAD management
//! - `workspace`: working-directory scanning and ignore rules
//! - `config`: `.gyatt/config` reader/writer
//! - `pool`: connection reuse, response caching, and rate limiting for remotes
//! - `remote`: push pipeline and GitHub REST client
//! - `repository`: coordinates all of the above

pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod database;
pub(crate) mod ignore_rules;
pub(crate) mod index;
pub(crate) mod pool;
pub(crate) mod refs;
pub mod remote;
pub mod repository;
pub(crate) mod workspace;
