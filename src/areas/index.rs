//! Staging index: path -> (hash, mode, size, mtime)
//!
//! Binary format: 12-byte header (signature, version, entry count), then
//! each entry in ascending path order (2-byte path length, path bytes,
//! 20-byte hash, 4-byte mode, 8-byte size, 8-byte mtime, 4-byte flags, all
//! little-endian, padded to an 8-byte boundary), then a trailing 20-byte
//! SHA-1 checksum of everything before it.

use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{ENTRY_BLOCK, EntryMetadata, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::error::Error;
use anyhow::anyhow;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

/// Staging area tracking which files will be included in the next commit.
#[derive(Debug, Clone)]
pub struct Index {
    path: Box<Path>,
    entries: BTreeMap<Box<Path>, IndexEntry>,
    children: BTreeMap<Box<Path>, BTreeSet<Box<Path>>>,
    header: IndexHeader,
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::new(String::from(SIGNATURE), VERSION, 0),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
    }

    /// Load the index from disk under a shared lock, verifying the trailing
    /// checksum. A missing or empty file is equivalent to an empty index.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        if !self.path().exists() {
            self.clear();
            std::fs::File::create(self.path())?;
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(self.path())?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        self.clear();

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(&mut *lock as &mut std::fs::File);
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify().map_err(|_| anyhow::anyhow!(Error::CorruptIndex))
    }

    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }

    fn parse_header<T: std::io::Read>(&self, reader: &mut Checksum<T>) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE).map_err(|_| anyhow!(Error::CorruptIndex))?;
        let header = IndexHeader::deserialize(std::io::Cursor::new(header_bytes.to_vec()))
            .map_err(|_| anyhow!(Error::CorruptIndex))?;

        if header.marker != SIGNATURE || header.version != VERSION {
            return Err(anyhow!(Error::CorruptIndex));
        }

        Ok(header.entries_count)
    }

    /// Each entry is self-describing: a 2-byte path length tells us exactly
    /// how many more bytes of path/hash/metadata follow, after which we read
    /// and discard whatever NUL padding brings the entry to an
    /// `ENTRY_BLOCK`-byte boundary.
    fn parse_entries<T: std::io::Read>(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<T>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let len_bytes = reader.read(2).map_err(|_| anyhow!(Error::CorruptIndex))?;
            let name_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;

            let rest_len = name_len + 20 + 4 + 8 + 8 + 4;
            let rest_bytes = reader.read(rest_len).map_err(|_| anyhow!(Error::CorruptIndex))?;

            let mut raw = Vec::with_capacity(2 + rest_len);
            raw.extend_from_slice(&len_bytes);
            raw.extend_from_slice(&rest_bytes);

            let padded_len = raw.len().div_ceil(ENTRY_BLOCK) * ENTRY_BLOCK;
            let padding_len = padded_len - raw.len();
            if padding_len > 0 {
                reader.read(padding_len).map_err(|_| anyhow!(Error::CorruptIndex))?;
            }

            let entry = IndexEntry::deserialize(std::io::Cursor::new(raw)).map_err(|_| anyhow!(Error::CorruptIndex))?;
            self.store_entry(&entry)?;
        }

        self.header.entries_count = entries_count;
        Ok(())
    }

    fn discard_conflicts(&mut self, entry: &IndexEntry) -> anyhow::Result<()> {
        entry
            .parent_dirs()?
            .into_iter()
            .map(|parent| self.remove_entry(parent))
            .collect::<Result<Vec<_>, _>>()?;
        self.remove_children(&entry.name)
    }

    fn store_entry(&mut self, entry: &IndexEntry) -> anyhow::Result<()> {
        let entry_parents = entry
            .parent_dirs()?
            .into_iter()
            .map(|parent| parent.to_owned().into_boxed_path())
            .collect::<BTreeSet<_>>();

        self.entries
            .insert(entry.name.clone().into_boxed_path(), entry.clone());

        for parent in entry_parents {
            self.children
                .entry(parent)
                .or_default()
                .insert(entry.name.clone().into_boxed_path());
        }

        Ok(())
    }

    fn remove_children(&mut self, path_name: &Path) -> anyhow::Result<()> {
        if let Some(children) = self.children.remove(path_name) {
            for child in children {
                self.remove_entry(&child)?;
            }
        }
        Ok(())
    }

    fn remove_entry(&mut self, path_name: &Path) -> anyhow::Result<()> {
        match self.entries.remove(path_name) {
            None => Ok(()),
            Some(entry) => {
                for parent in entry.parent_dirs()? {
                    let parent = parent.to_owned().into_boxed_path();
                    if let Some(children) = self.children.get_mut(&parent) {
                        children.remove(path_name);
                        if children.is_empty() {
                            self.children.remove(&parent);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub fn add(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        self.discard_conflicts(&entry)?;
        self.store_entry(&entry)?;

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
        Ok(())
    }

    pub fn remove(&mut self, path: PathBuf) -> anyhow::Result<()> {
        self.remove_entry(&path)?;
        self.remove_children(&path)?;

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
        Ok(())
    }

    /// Write-temp-then-rename so a crash mid-write leaves either the old
    /// index or nothing, never a torn file.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let dir = self
            .path()
            .parent()
            .ok_or_else(|| anyhow!("index path has no parent directory"))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

        {
            let mut writer = Checksum::new(tmp.as_file_mut());

            self.header = IndexHeader {
                entries_count: self.entries.len() as u32,
                ..self.header.clone()
            };
            writer.write(&self.header.serialize()?)?;

            for entry in self.entries() {
                writer.write(&entry.serialize()?)?;
            }

            writer.write_checksum()?;
        }

        tmp.persist(self.path())?;
        self.changed = false;
        Ok(())
    }

    pub fn update_entry_stat(&mut self, entry: &IndexEntry, stat: EntryMetadata) {
        let entry_key = entry.name.clone().into_boxed_path();
        if let Some(existing_entry) = self.entries.get_mut(&entry_key) {
            existing_entry.metadata = stat;
            self.changed = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_values()
    }

    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|entry_path| {
                path == Path::new(".") || entry_path.starts_with(path) || entry_path.as_ref() == path
            })
            .map(|p| p.to_path_buf())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use tempfile::tempdir;

    fn entry(name: &str) -> IndexEntry {
        IndexEntry::new(
            PathBuf::from(name),
            crate::hash::hash_bytes(name.as_bytes()),
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                size: 4,
                mtime: 1_700_000_000,
                ..Default::default()
            },
        )
    }

    #[test]
    fn add_write_rehydrate_round_trip() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index");

        let mut index = Index::new(index_path.clone().into_boxed_path());
        index.add(entry("a.txt")).unwrap();
        index.add(entry("b/c.txt")).unwrap();
        index.write_updates().unwrap();

        let mut reloaded = Index::new(index_path.into_boxed_path());
        reloaded.rehydrate().unwrap();

        assert_eq!(reloaded.entries().count(), 2);
        assert!(reloaded.entry_by_path(Path::new("a.txt")).is_some());
        assert!(reloaded.is_directly_tracked(Path::new("b")));
    }

    #[test]
    fn adding_file_over_existing_directory_removes_children() {
        let dir = tempdir().unwrap();
        let mut index = Index::new(dir.path().join("index").into_boxed_path());

        index.add(entry("a/b.txt")).unwrap();
        assert!(index.is_directly_tracked(Path::new("a")));

        index.add(entry("a")).unwrap();
        assert!(index.entry_by_path(Path::new("a")).is_some());
        assert!(index.entry_by_path(Path::new("a/b.txt")).is_none());
    }

    #[test]
    fn truncated_index_file_surfaces_corrupt_index() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index");

        let mut index = Index::new(index_path.clone().into_boxed_path());
        index.add(entry("a.txt")).unwrap();
        index.write_updates().unwrap();

        let bytes = std::fs::read(&index_path).unwrap();
        std::fs::write(&index_path, &bytes[..bytes.len() - 4]).unwrap();

        let mut reloaded = Index::new(index_path.into_boxed_path());
        let err = reloaded.rehydrate().unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::CorruptIndex)));
    }
}
