//! Working tree status classification
//!
//! Compares the working tree, the index, and the HEAD commit's tree to
//! produce a single flat status per path.

pub mod status_info;
