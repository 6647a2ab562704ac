//! Running-SHA1 reader/writer wrapper around the locked index file
//!
//! Every byte read or written through a `Checksum` feeds a SHA-1 digest in
//! parallel; `write_checksum` appends the trailing 20-byte digest, and
//! `verify` checks a freshly-read digest against the trailing bytes found
//! on disk. This is the integrity mechanism the index file format relies on.

use crate::artifacts::index::CHECKSUM_SIZE;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

pub struct Checksum<T> {
    inner: T,
    digest: Sha1,
    read_trailer: Vec<u8>,
}

impl<T> Checksum<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            digest: Sha1::new(),
            read_trailer: Vec::new(),
        }
    }
}

impl<T: Read> Checksum<T> {
    /// Read exactly `n` bytes, feeding them into the running digest.
    pub fn read(&mut self, n: usize) -> anyhow::Result<Bytes> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.digest.update(&buf);
        Ok(Bytes::from(buf))
    }

    /// Read the trailing checksum and compare it against the digest of
    /// everything read so far.
    pub fn verify(&mut self) -> anyhow::Result<()> {
        let mut trailer = vec![0u8; CHECKSUM_SIZE];
        self.inner.read_exact(&mut trailer)?;

        let computed = self.digest.clone().finalize();
        if computed.as_slice() != trailer.as_slice() {
            anyhow::bail!("index checksum mismatch");
        }
        self.read_trailer = trailer;
        Ok(())
    }
}

impl<T: Write> Checksum<T> {
    /// Write bytes, feeding them into the running digest.
    pub fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(bytes)?;
        self.digest.update(bytes);
        Ok(())
    }

    /// Append the trailing SHA-1 of everything written so far.
    pub fn write_checksum(&mut self) -> anyhow::Result<()> {
        let digest = self.digest.clone().finalize();
        self.inner.write_all(&digest)?;
        Ok(())
    }
}
