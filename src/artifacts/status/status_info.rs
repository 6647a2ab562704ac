//! Working-tree status classification
//!
//! Flat per-path status, collapsing the workspace-vs-index and
//! index-vs-HEAD comparisons into a single classification: a path is
//! `Untracked`, `Deleted`, `Modified`, `Staged`, or `Clean`, never more
//! than one at a time.

use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::objects::object::Object;
use crate::hash::Hash;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Untracked,
    Modified,
    Staged,
    Deleted,
    Clean,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Untracked => "??",
            Status::Modified => "M",
            Status::Staged => "A",
            Status::Deleted => "D",
            Status::Clean => " ",
        }
    }
}

/// Classify every path touched by the working tree, the index, or the HEAD
/// tree. `head_tree` maps repo-relative paths to the blob hash recorded in
/// the last commit; pass an empty map when there is no commit yet.
pub fn statuses(
    workspace: &Workspace,
    index: &Index,
    head_tree: &BTreeMap<PathBuf, Hash>,
) -> anyhow::Result<BTreeMap<PathBuf, Status>> {
    let mut result = BTreeMap::new();

    for path in workspace.list_files()? {
        if index.entry_by_path(&path).is_none() {
            result.insert(path, Status::Untracked);
        }
    }

    for entry in index.entries() {
        let path = entry.name.clone();

        if !workspace.exists(&path) {
            result.insert(path, Status::Deleted);
            continue;
        }

        let current_hash = workspace.parse_blob(&path)?.hash()?;
        let status = if current_hash != entry.hash {
            Status::Modified
        } else {
            match head_tree.get(&path) {
                Some(head_hash) if *head_hash == entry.hash => Status::Clean,
                _ => Status::Staged,
            }
        };
        result.insert(path, status);
    }

    Ok(result)
}
