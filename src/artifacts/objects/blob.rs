//! Blob object: opaque file content, exactly the bytes on disk
//!
//! On disk: `blob <size>\0<content>`. Content is kept as raw bytes rather
//! than `String` so binary files round-trip exactly.

use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Vec<u8>,
}

impl Blob {
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut blob_bytes = Vec::with_capacity(self.content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), self.content.len());
        blob_bytes.write_all(header.as_bytes())?;
        blob_bytes.write_all(&self.content)?;
        Ok(Bytes::from(blob_bytes))
    }
}

impl Unpackable for Blob {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        Ok(Self::new(content))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_git_compatible_header() {
        let blob = Blob::new(b"hello\n".to_vec());
        let bytes = blob.serialize().unwrap();
        assert_eq!(&bytes[..], b"blob 6\0hello\n");
    }

    #[test]
    fn hash_matches_known_blob() {
        let blob = Blob::new(b"hello\n".to_vec());
        assert_eq!(
            blob.hash().unwrap().to_hex(),
            "e965047ad7c57865823c7d992b1d046ea66edf78"
        );
    }
}
