//! Index file header: signature, version, entry count

use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::object::{Packable, Unpackable};
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub marker: String,
    pub version: u32,
    pub entries_count: u32,
}

impl IndexHeader {
    pub fn new(marker: String, version: u32, entries_count: u32) -> Self {
        Self {
            marker,
            version,
            entries_count,
        }
    }

    pub fn empty() -> Self {
        Self::new(String::from(crate::artifacts::index::SIGNATURE), crate::artifacts::index::VERSION, 0)
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(self.marker.as_bytes())?;
        bytes.write_u32::<byteorder::LittleEndian>(self.version)?;
        bytes.write_u32::<byteorder::LittleEndian>(self.entries_count)?;
        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexHeader {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let bytes = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;
        if bytes.len() != HEADER_SIZE {
            anyhow::bail!("invalid index header size: {}", bytes.len());
        }

        let marker = std::str::from_utf8(&bytes[0..4])?.to_string();
        let version = byteorder::LittleEndian::read_u32(&bytes[4..8]);
        let entries_count = byteorder::LittleEndian::read_u32(&bytes[8..12]);

        Ok(Self {
            marker,
            version,
            entries_count,
        })
    }
}
