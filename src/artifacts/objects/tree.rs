//! Tree object: an ordered directory listing
//!
//! On disk: `tree <size>\0<entries>`, each entry `<mode-octal> <name>\0<20-byte-hash>`.
//! Entries are kept in a `BTreeMap<String, _>` so serialization is always in
//! sorted-by-name order, which is what makes tree encoding canonical
//! regardless of the order entries were added in.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_type::ObjectType;
use crate::hash::Hash;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::marker::PhantomData;
use std::path::Path;

#[derive(Debug, Clone)]
enum TreeEntry<'e> {
    File(IndexEntry),
    Directory(Tree<'e>),
}

impl TreeEntry<'_> {
    fn object_type(&self) -> ObjectType {
        match self {
            TreeEntry::File(_) => ObjectType::Blob,
            TreeEntry::Directory(_) => ObjectType::Tree,
        }
    }

    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::File(entry) => entry.metadata.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn hash(&self) -> anyhow::Result<Hash> {
        match self {
            TreeEntry::File(entry) => Ok(entry.hash),
            TreeEntry::Directory(tree) => tree.hash(),
        }
    }
}

/// Directory snapshot, sorted by entry name.
///
/// Trees built from index entries populate `writeable_entries`; trees read
/// back from the object store populate `readable_entries`. The two never
/// mix within a single instance.
#[derive(Debug, Clone, Default)]
pub struct Tree<'tree> {
    readable_entries: BTreeMap<String, DatabaseEntry>,
    writeable_entries: BTreeMap<String, TreeEntry<'tree>>,
    _marker: PhantomData<&'tree ()>,
}

impl<'tree> Tree<'tree> {
    /// Group a flat list of index entries into a nested tree by path
    /// component, leaves becoming blob entries and directory groups
    /// recursing into nested trees.
    pub fn build(entries: impl Iterator<Item = &'tree IndexEntry> + 'tree) -> anyhow::Result<Self> {
        let mut root = Self::default();
        for entry in entries {
            let parents = entry.parent_dirs()?;
            root.add_entry(&parents, entry)?;
        }
        Ok(root)
    }

    /// Post-order traversal (children before parents), required so a
    /// directory's hash is known before its parent tree is serialized.
    pub fn traverse<F>(&self, func: &F) -> anyhow::Result<()>
    where
        F: Fn(&Tree<'tree>) -> anyhow::Result<()>,
    {
        for entry in self.writeable_entries.values() {
            if let TreeEntry::Directory(tree) = entry {
                tree.traverse(func)?;
            }
        }
        func(self)
    }

    fn add_entry(&mut self, parents: &[&Path], entry: &IndexEntry) -> anyhow::Result<()> {
        if parents.is_empty() {
            self.writeable_entries.insert(
                entry.basename()?.to_string(),
                TreeEntry::File(entry.clone()),
            );
            return Ok(());
        }

        let name = parents[0]
            .file_name()
            .and_then(|s| s.to_str())
            .context("invalid parent path component")?
            .to_string();
        let key = format!("{name}/");

        let tree = match self.writeable_entries.entry(key) {
            std::collections::btree_map::Entry::Occupied(e) => match e.into_mut() {
                TreeEntry::Directory(tree) => tree,
                TreeEntry::File(_) => anyhow::bail!("path conflict: {name} is both file and dir"),
            },
            std::collections::btree_map::Entry::Vacant(e) => {
                match e.insert(TreeEntry::Directory(Self::default())) {
                    TreeEntry::Directory(tree) => tree,
                    TreeEntry::File(_) => unreachable!(),
                }
            }
        };
        tree.add_entry(&parents[1..], entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.readable_entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.readable_entries.into_iter()
    }
}

impl Packable for Tree<'_> {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();

        for (name, tree_entry) in &self.writeable_entries {
            if name.contains('\0') {
                anyhow::bail!("tree entry name contains NUL: {name}");
            }
            let name = name.trim_end_matches('/');
            if name.contains('/') {
                anyhow::bail!("tree entry name contains '/': {name}");
            }

            let header = format!("{:o} {}", tree_entry.mode().as_u32(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            tree_entry.hash()?.write_raw(&mut content_bytes)?;
        }

        let mut tree_bytes = Vec::with_capacity(content_bytes.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree<'_> {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break;
            }
            if *mode_bytes.last().unwrap() != b' ' {
                anyhow::bail!("unexpected EOF in tree entry mode");
            }
            mode_bytes.pop();

            let mode_str = std::str::from_utf8(&mode_bytes)?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || *name_bytes.last().unwrap() != 0 {
                anyhow::bail!("unexpected EOF in tree entry name");
            }
            name_bytes.pop();
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let hash = Hash::read_raw(&mut reader).context("unexpected EOF in tree entry hash")?;

            entries.insert(name, DatabaseEntry::new(hash, mode));
        }

        Ok(Tree {
            readable_entries: entries,
            writeable_entries: Default::default(),
            _marker: Default::default(),
        })
    }
}

impl Object for Tree<'_> {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.writeable_entries
            .iter()
            .map(|(name, tree_entry)| {
                let name = name.trim_end_matches('/');
                format!(
                    "{:06o} {} {}\t{}",
                    tree_entry.mode().as_u32(),
                    tree_entry.object_type().as_str(),
                    tree_entry.hash().map(|h| h.to_hex()).unwrap_or_default(),
                    name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use std::path::PathBuf;

    fn entry(path: &str, hash: Hash) -> IndexEntry {
        IndexEntry {
            name: PathBuf::from(path),
            hash,
            metadata: EntryMetadata {
                mode: EntryMode::File(crate::artifacts::index::entry_mode::FileMode::Regular),
                ..Default::default()
            },
        }
    }

    #[test]
    fn single_file_tree_matches_git_entry_layout() {
        let h = crate::hash::hash_bytes(b"blob 6\0hello\n");
        let entries = vec![entry("a.txt", h)];
        let tree = Tree::build(entries.iter()).unwrap();
        let bytes = tree.serialize().unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"100644 a.txt\0");
        h.write_raw(&mut expected).unwrap();
        let header = format!("tree {}\0", expected.len());
        let mut full = header.into_bytes();
        full.extend_from_slice(&expected);
        assert_eq!(&bytes[..], &full[..]);
    }

    #[test]
    fn tree_entries_are_sorted_regardless_of_insertion_order() {
        let h1 = crate::hash::hash_bytes(b"one");
        let h2 = crate::hash::hash_bytes(b"two");
        let entries_a = vec![entry("b.txt", h2), entry("a.txt", h1)];
        let entries_b = vec![entry("a.txt", h1), entry("b.txt", h2)];
        let tree_a = Tree::build(entries_a.iter()).unwrap();
        let tree_b = Tree::build(entries_b.iter()).unwrap();
        assert_eq!(tree_a.serialize().unwrap(), tree_b.serialize().unwrap());
    }
}
