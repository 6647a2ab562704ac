//! Database entry representation
//!
//! Database entries represent references to objects stored in the object database.
//! They contain the object hash and mode information, used when reading tree objects.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::hash::Hash;
use derive_new::new;

/// Entry from a tree object in the database
///
/// Contains the object hash and entry mode for a file or subtree.
/// Used when traversing tree objects during status and checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct DatabaseEntry {
    /// Hash of the referenced object
    pub hash: Hash,
    /// Entry mode (file permissions and type)
    pub mode: EntryMode,
}

impl DatabaseEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}
