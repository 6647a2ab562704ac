//! Index entry representation
//!
//! Binary layout per entry, all integers little-endian:
//! 2-byte path length, path bytes, 20-byte hash, 4-byte mode, 8-byte size,
//! 8-byte mtime, 4-byte flags, then padded with NUL bytes to an
//! `ENTRY_BLOCK`-byte boundary so the following entry starts aligned.

use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::hash::Hash;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::fs::Metadata;
use std::io::{BufRead, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

pub const ENTRY_BLOCK: usize = 8;
/// Smallest possible on-disk entry: 2 (path len) + 0 (empty path, never
/// happens in practice but bounds the minimum read) + 20 + 4 + 8 + 8 + 4.
pub const ENTRY_MIN_SIZE: usize = 46;

#[derive(Debug, Clone, Default, new)]
pub struct IndexEntry {
    pub name: PathBuf,
    pub hash: Hash,
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid file name"))
    }

    pub fn parent_dirs(&self) -> anyhow::Result<Vec<&Path>> {
        let mut dirs = Vec::new();
        let mut parent = self.name.parent();

        while let Some(new_parent) = parent {
            if new_parent.as_os_str().is_empty() {
                break;
            }
            dirs.push(new_parent);
            parent = new_parent.parent();
        }
        dirs.reverse();
        Ok(dirs)
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.size == other.size && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.mtime == other.mtime && self.metadata.mtime_nsec == other.mtime_nsec
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryMetadata {
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub mode: EntryMode,
    pub size: u64,
    pub flags: u32,
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("invalid entry name"))?;
        if name.len() > u16::MAX as usize {
            anyhow::bail!("entry path too long: {name}");
        }

        let mut bytes = Vec::new();
        bytes.write_u16::<byteorder::LittleEndian>(name.len() as u16)?;
        bytes.write_all(name.as_bytes())?;
        self.hash.write_raw(&mut bytes)?;
        bytes.write_u32::<byteorder::LittleEndian>(self.metadata.mode.as_u32())?;
        bytes.write_u64::<byteorder::LittleEndian>(self.metadata.size)?;
        bytes.write_i64::<byteorder::LittleEndian>(self.metadata.mtime)?;
        bytes.write_u32::<byteorder::LittleEndian>(self.metadata.flags)?;

        while bytes.len() % ENTRY_BLOCK != 0 {
            bytes.push(0);
        }

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let bytes = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        if bytes.len() < 2 {
            anyhow::bail!("index entry too short to contain path length");
        }
        let name_len = byteorder::LittleEndian::read_u16(&bytes[0..2]) as usize;
        let name_start = 2;
        let name_end = name_start + name_len;
        let hash_start = name_end;
        let hash_end = hash_start + 20;
        let mode_end = hash_end + 4;
        let size_end = mode_end + 8;
        let mtime_end = size_end + 8;
        let flags_end = mtime_end + 4;

        if bytes.len() < flags_end {
            anyhow::bail!("index entry truncated");
        }

        let name = PathBuf::from(
            std::str::from_utf8(&bytes[name_start..name_end])
                .map_err(|_| anyhow::anyhow!("invalid UTF-8 in entry name"))?,
        );
        let hash = Hash::read_raw(&mut std::io::Cursor::new(&bytes[hash_start..hash_end]))?;
        let mode = EntryMode::from(byteorder::LittleEndian::read_u32(&bytes[hash_end..mode_end]));
        let size = byteorder::LittleEndian::read_u64(&bytes[mode_end..size_end]);
        let mtime = byteorder::LittleEndian::read_i64(&bytes[size_end..mtime_end]) as i64;
        let flags = byteorder::LittleEndian::read_u32(&bytes[mtime_end..flags_end]);

        Ok(IndexEntry {
            name,
            hash,
            metadata: EntryMetadata {
                mtime,
                mtime_nsec: 0,
                mode,
                size,
                flags,
            },
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        Ok(Self {
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            mode,
            size: metadata.size(),
            flags: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn hash() -> Hash {
        crate::hash::hash_bytes(b"test data")
    }

    #[fixture]
    fn entry_metadata() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::Directory,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_entry_parent_dirs(hash: Hash, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), hash, entry_metadata);
        let dirs = entry.parent_dirs().unwrap();
        pretty_assertions::assert_eq!(dirs, vec![Path::new("a"), Path::new("a/b")]);
    }

    #[rstest]
    fn test_entry_parent_dirs_root(hash: Hash, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a"), hash, entry_metadata);
        let dirs = entry.parent_dirs().unwrap();
        pretty_assertions::assert_eq!(dirs, Vec::<&Path>::new());
    }

    #[rstest]
    fn test_entry_basename(hash: Hash, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), hash, entry_metadata);
        pretty_assertions::assert_eq!(entry.basename().unwrap(), "c");
    }

    #[rstest]
    fn serialize_deserialize_round_trip(hash: Hash) {
        let entry = IndexEntry::new(
            PathBuf::from("a.txt"),
            hash,
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                size: 6,
                mtime: 1_700_000_000,
                ..Default::default()
            },
        );
        let bytes = entry.serialize().unwrap();
        let reader = std::io::Cursor::new(bytes.to_vec());
        let parsed = IndexEntry::deserialize(reader).unwrap();
        pretty_assertions::assert_eq!(parsed.name, entry.name);
        pretty_assertions::assert_eq!(parsed.hash, entry.hash);
        pretty_assertions::assert_eq!(parsed.metadata.size, entry.metadata.size);
    }
}
