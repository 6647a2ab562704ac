//! Core object traits
//!
//! All three object kinds are stored as `<kind> <size>\0<payload>`, and the
//! object's `Hash` is the SHA-1 digest of that entire byte sequence.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::hash::{self, Hash};
use anyhow::Result;
use bytes::Bytes;
use std::io::BufRead;
use std::path::PathBuf;

pub trait Packable {
    /// Serialize the object to bytes, including the `<kind> <size>\0` header.
    fn serialize(&self) -> Result<Bytes>;
}

pub trait Unpackable {
    /// Deserialize the object from a reader with the header already consumed.
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    /// The object's content address: SHA-1 of the serialized form.
    fn hash(&self) -> Result<Hash> {
        let content = self.serialize()?;
        Ok(hash::hash_bytes(&content))
    }

    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.hash()?.to_shard_path())
    }
}

/// Type-erased object container, used when the kind isn't known until a
/// header has been parsed.
pub enum ObjectBox<'o> {
    Blob(Box<Blob>),
    Tree(Box<Tree<'o>>),
    Commit(Box<Commit>),
}
