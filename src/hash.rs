//! SHA-1 content hashing
//!
//! Every stored object is keyed by the SHA-1 digest of its serialized form
//! (header + payload). Unlike the legacy `ObjectId(String)` representation,
//! `Hash` is a 20-byte `Copy` value type so it can move through the rest of
//! the engine without heap allocation.

use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

pub const HASH_BYTES: usize = 20;
pub const HASH_HEX_LEN: usize = HASH_BYTES * 2;

/// A 20-byte SHA-1 digest, the canonical identity of a stored object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_BYTES]);

impl Hash {
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }

    /// Parse a 40-character hex string into a `Hash`.
    pub fn parse_hex(hex: &str) -> anyhow::Result<Self> {
        if hex.len() != HASH_HEX_LEN {
            anyhow::bail!("invalid hash length: {}", hex.len());
        }
        let mut out = [0u8; HASH_BYTES];
        for (i, byte) in out.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow::anyhow!("invalid hex digit in hash: {hex}"))?;
        }
        Ok(Self(out))
    }

    /// Write the raw 20 bytes to a writer (used by tree/commit encoders).
    pub fn write_raw<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Read the raw 20 bytes from a reader.
    pub fn read_raw<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; HASH_BYTES];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Sharded on-disk path: `<first-2-hex>/<remaining-38-hex>`.
    pub fn to_shard_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    pub fn to_short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(HASH_HEX_LEN);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

/// Hash an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> Hash {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    Hash(hasher.finalize().into())
}

/// Hash a file's contents, streaming through an 8 KiB buffer so large
/// files never need to be loaded whole.
pub fn hash_file(path: &std::path::Path) -> io::Result<Hash> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Hash(hasher.finalize().into()))
}

/// Incremental hasher for callers that build content piecewise.
#[derive(Default)]
pub struct Hasher(Sha1);

impl Hasher {
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_hello_matches_git_blob_hash() {
        let blob_header = b"blob 6\0hello\n";
        let hash = hash_bytes(blob_header);
        assert_eq!(hash.to_hex(), "e965047ad7c57865823c7d992b1d046ea66edf78");
    }

    #[test]
    fn hex_round_trips() {
        let hash = hash_bytes(b"anything");
        let parsed = Hash::parse_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Hash::parse_hex("abc").is_err());
    }
}
