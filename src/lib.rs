//! Content-addressed, Git-compatible version control engine.
//!
//! This crate implements the core data plane: an object store, a staging
//! index, a commit DAG rooted at named refs, a working-tree scanner, and a
//! client that pushes repository state to a GitHub-compatible REST host.
//! The crate only emits `tracing` events; installing a subscriber is left
//! to embedding applications (the `gyatt` binary installs one in `main`).

pub mod areas;
pub mod artifacts;
pub mod compress;
pub mod error;
pub mod hash;

pub use areas::repository::Repository;
pub use error::{Error, Result};
pub use hash::Hash;
