//! Content-addressed object store
//!
//! Objects are stored zlib-compressed at `.gyatt/objects/<first-2-hex>/<rest>`,
//! written via a temp-file-then-rename so a crash never leaves a torn object
//! on disk. Reads go through an in-memory LRU cache keyed by hash.

use crate::areas::cache::{ObjectCache, read_object_file};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::compress::{self, CompressionLevel};
use crate::hash::Hash;
use anyhow::Context;
use bytes::Bytes;
use std::collections::HashSet;
use std::io::{BufRead, Cursor};
use std::path::Path;

/// Depth at which [`Database::walk`] gives up rather than trust a commit
/// graph whose parent chain it hasn't already proven acyclic via the
/// visited-hash set. Comfortably above any realistic history length.
const WALK_MAX_DEPTH: usize = 1_000_000;

/// Object database, rooted at `.gyatt/objects`.
pub struct Database {
    path: Box<Path>,
    cache: ObjectCache,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database {
            path,
            cache: ObjectCache::default(),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.path.join(hash.to_shard_path()).exists()
    }

    /// Serialize and store any object, returning its hash. A no-op if the
    /// object already exists.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<Hash> {
        let hash = object.hash()?;
        if self.exists(&hash) {
            return Ok(hash);
        }

        let content = object.serialize()?;
        self.write_raw(hash, &content)?;
        self.cache.insert(hash, content);
        Ok(hash)
    }

    pub fn write_blob(&self, content: Vec<u8>) -> anyhow::Result<Hash> {
        self.store(&Blob::new(content))
    }

    pub fn write_tree(&self, tree: &Tree<'_>) -> anyhow::Result<Hash> {
        self.store(tree)
    }

    pub fn write_commit(&self, commit: &Commit) -> anyhow::Result<Hash> {
        self.store(commit)
    }

    fn write_raw(&self, hash: Hash, content: &[u8]) -> anyhow::Result<()> {
        let object_path = self.path.join(hash.to_shard_path());
        let object_dir = object_path
            .parent()
            .with_context(|| format!("invalid object path {}", object_path.display()))?;
        std::fs::create_dir_all(object_dir)
            .with_context(|| format!("unable to create object directory {}", object_dir.display()))?;

        let level = CompressionLevel::adaptive_for(content);
        let compressed = compress::compress(content, level)?;

        let mut tmp = tempfile::NamedTempFile::new_in(object_dir)
            .with_context(|| format!("unable to create temp file in {}", object_dir.display()))?;
        std::io::Write::write_all(&mut tmp, &compressed)
            .with_context(|| format!("unable to write object {}", object_path.display()))?;
        tmp.persist(&object_path)
            .with_context(|| format!("unable to finalize object {}", object_path.display()))?;

        Ok(())
    }

    pub fn load(&self, hash: &Hash) -> anyhow::Result<Bytes> {
        self.read_object(*hash)
    }

    pub fn parse_object(&self, hash: &Hash) -> anyhow::Result<ObjectBox<'_>> {
        let (object_type, reader) = self.parse_object_as_bytes(hash)?;

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(reader)?))),
        }
    }

    pub fn parse_object_as_blob(&self, hash: &Hash) -> anyhow::Result<Option<Blob>> {
        let (object_type, reader) = self.parse_object_as_bytes(hash)?;
        match object_type {
            ObjectType::Blob => Ok(Some(Blob::deserialize(reader)?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, hash: &Hash) -> anyhow::Result<Option<Tree<'_>>> {
        let (object_type, reader) = self.parse_object_as_bytes(hash)?;
        match object_type {
            ObjectType::Tree => Ok(Some(Tree::deserialize(reader)?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, hash: &Hash) -> anyhow::Result<Option<Commit>> {
        let (object_type, reader) = self.parse_object_as_bytes(hash)?;
        match object_type {
            ObjectType::Commit => Ok(Some(Commit::deserialize(reader)?)),
            _ => Ok(None),
        }
    }

    fn parse_object_as_bytes(&self, hash: &Hash) -> anyhow::Result<(ObjectType, impl BufRead + use<>)> {
        let content = self.read_object(*hash)?;
        let mut reader = Cursor::new(content);
        let object_type = ObjectType::parse_object_type(&mut reader)?;
        Ok((object_type, reader))
    }

    fn read_object(&self, hash: Hash) -> anyhow::Result<Bytes> {
        if let Some(cached) = self.cache.get(&hash) {
            return Ok(cached);
        }

        let object_path = self.path.join(hash.to_shard_path());
        let raw = read_object_file(&object_path)
            .with_context(|| format!("unable to read object file {}", object_path.display()))?;
        // Compressed size is a reasonable starting guess for the inflated
        // size (the object's own header, which names its exact payload
        // size, is itself inside the compressed bytes); decompress() grows
        // from there per §4.3's doubling-buffer strategy.
        let content: Bytes = compress::decompress(&raw, raw.len(), hash)?.into();

        self.cache.insert(hash, content.clone());
        Ok(content)
    }

    pub fn get_object_type(&self, hash: &Hash) -> anyhow::Result<ObjectType> {
        let (object_type, _) = self.parse_object_as_bytes(hash)?;
        Ok(object_type)
    }

    /// Lazily walk the commit graph starting at `start_hash`, following
    /// `Commit::parent()` until a commit with no parent is reached. Each
    /// hash is visited at most once; a repeated hash (a cycle, which a
    /// well-formed history never contains, but object files can be hand
    /// edited) ends the walk instead of looping forever.
    pub fn walk(&self, start_hash: Hash) -> CommitWalk<'_> {
        CommitWalk {
            database: self,
            next: Some(start_hash),
            visited: HashSet::new(),
            depth: 0,
        }
    }

    /// Resolve every object whose hash starts with `prefix`, used to expand
    /// abbreviated hashes. More than one match means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<Hash>> {
        let mut matches = Vec::new();

        if prefix.len() >= 2 {
            let dir_name = &prefix[..2];
            let file_prefix = &prefix[2..];
            self.scan_shard(dir_name, file_prefix, &mut matches)?;
        } else {
            for i in 0..=255u8 {
                let dir_name = format!("{i:02x}");
                self.scan_shard(&dir_name, prefix, &mut matches)?;
            }
        }

        Ok(matches)
    }

    fn scan_shard(&self, dir_name: &str, file_prefix: &str, matches: &mut Vec<Hash>) -> anyhow::Result<()> {
        let dir_path = self.path.join(dir_name);
        if !dir_path.is_dir() {
            return Ok(());
        }

        for entry in std::fs::read_dir(&dir_path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(file_prefix) {
                let full = format!("{dir_name}{file_name}");
                if let Ok(hash) = full.parse::<Hash>() {
                    matches.push(hash);
                }
            }
        }
        Ok(())
    }
}

/// Lazy parent-chain traversal produced by [`Database::walk`]. Yields
/// `(Hash, Commit)` pairs, oldest-reachable-parent last.
pub struct CommitWalk<'a> {
    database: &'a Database,
    next: Option<Hash>,
    visited: HashSet<Hash>,
    depth: usize,
}

impl Iterator for CommitWalk<'_> {
    type Item = anyhow::Result<(Hash, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;

        if self.depth >= WALK_MAX_DEPTH || !self.visited.insert(hash) {
            return None;
        }
        self.depth += 1;

        let commit = match self.database.parse_object_as_commit(&hash) {
            Ok(Some(commit)) => commit,
            Ok(None) => return Some(Err(anyhow::anyhow!("{hash} is not a commit"))),
            Err(err) => return Some(Err(err)),
        };

        self.next = commit.parent();
        Some(Ok((hash, commit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().to_path_buf().into_boxed_path());
        (dir, db)
    }

    #[test]
    fn write_and_read_blob_round_trips() {
        let (_dir, db) = db();
        let hash = db.write_blob(b"hello\n".to_vec()).unwrap();
        assert_eq!(hash.to_hex(), "e965047ad7c57865823c7d992b1d046ea66edf78");
        assert!(db.exists(&hash));

        let blob = db.parse_object_as_blob(&hash).unwrap().unwrap();
        assert_eq!(blob.content(), b"hello\n");
    }

    #[test]
    fn storing_existing_object_is_a_no_op() {
        let (_dir, db) = db();
        let h1 = db.write_blob(b"same".to_vec()).unwrap();
        let h2 = db.write_blob(b"same".to_vec()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn find_objects_by_prefix_resolves_abbreviation() {
        let (_dir, db) = db();
        let hash = db.write_blob(b"abbreviated".to_vec()).unwrap();
        let prefix = &hash.to_hex()[..6];
        let matches = db.find_objects_by_prefix(prefix).unwrap();
        assert_eq!(matches, vec![hash]);
    }

    #[test]
    fn walk_follows_parent_chain_oldest_last() {
        let (_dir, db) = db();
        let blob_hash = db.write_blob(b"content".to_vec()).unwrap();
        let entry = IndexEntry::new(
            PathBuf::from("a.txt"),
            blob_hash,
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                ..Default::default()
            },
        );
        let tree = Tree::build(std::iter::once(&entry)).unwrap();
        let tree_hash = db.write_tree(&tree).unwrap();

        let author = crate::artifacts::objects::commit::Author::new_with_timestamp(
            "Ada Lovelace".into(),
            "ada@example.com".into(),
            chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00+00:00").unwrap(),
        );

        let root = Commit::new(vec![], tree_hash, author.clone(), "root".into());
        let root_hash = db.write_commit(&root).unwrap();

        let child = Commit::new(vec![root_hash], tree_hash, author, "child".into());
        let child_hash = db.write_commit(&child).unwrap();

        let history: Vec<_> = db.walk(child_hash).map(|item| item.unwrap()).collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, child_hash);
        assert_eq!(history[1].0, root_hash);
    }

    #[test]
    fn walk_stops_instead_of_looping_on_a_cycle() {
        let (_dir, db) = db();
        let blob_hash = db.write_blob(b"content".to_vec()).unwrap();
        let entry = IndexEntry::new(
            PathBuf::from("a.txt"),
            blob_hash,
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                ..Default::default()
            },
        );
        let tree = Tree::build(std::iter::once(&entry)).unwrap();
        let tree_hash = db.write_tree(&tree).unwrap();

        let author = crate::artifacts::objects::commit::Author::new_with_timestamp(
            "Ada Lovelace".into(),
            "ada@example.com".into(),
            chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00+00:00").unwrap(),
        );

        // A real commit's hash is derived from its own content, so a true
        // cycle can't arise through `write_commit`. Write two raw objects
        // under hashes unrelated to their content instead, each naming the
        // other as parent, to exercise the visited-set guard directly.
        let hash_a = crate::hash::hash_bytes(b"node-a");
        let hash_b = crate::hash::hash_bytes(b"node-b");
        let commit_a = Commit::new(vec![hash_b], tree_hash, author.clone(), "a".into());
        let commit_b = Commit::new(vec![hash_a], tree_hash, author, "b".into());
        db.write_raw(hash_a, &commit_a.serialize().unwrap()).unwrap();
        db.write_raw(hash_b, &commit_b.serialize().unwrap()).unwrap();

        let history: Vec<_> = db.walk(hash_a).map(|item| item.unwrap()).collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, hash_a);
        assert_eq!(history[1].0, hash_b);
    }

    #[test]
    fn tree_round_trips_through_store() {
        let (_dir, db) = db();
        let blob_hash = db.write_blob(b"content".to_vec()).unwrap();
        let entry = IndexEntry::new(
            PathBuf::from("a.txt"),
            blob_hash,
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                ..Default::default()
            },
        );
        let tree = Tree::build(std::iter::once(&entry)).unwrap();
        let tree_hash = db.write_tree(&tree).unwrap();

        let loaded = db.parse_object_as_tree(&tree_hash).unwrap().unwrap();
        let entries: Vec<_> = loaded.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "a.txt");
    }
}
