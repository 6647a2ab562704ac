//! zlib compression with adaptive level selection and a prefix/suffix delta
//! codec, grounded on the original project's `advanced_compression.h`
//! variant enum (`CompressionType::{ZLIB_FAST, ZLIB_BALANCED, ADAPTIVE, ...}`)
//! collapsed to the two levels this engine actually needs. Per the
//! "tagged variant over open interface" guidance, there is no trait object
//! hierarchy of compressor backends — just this fixed enum.

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::hash::Hash;

/// Threshold in bytes sampled from the front of the payload to decide
/// whether the content looks already-dense (compressed/binary) and should
/// use the fastest level rather than burn cycles on the balanced one.
const ADAPTIVE_SAMPLE_SIZE: usize = 4096;
/// Byte-entropy threshold (bits per byte, out of 8) above which content is
/// treated as already dense.
const ADAPTIVE_ENTROPY_THRESHOLD: f64 = 7.5;

const DOUBLING_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Fastest,
    Balanced,
}

impl CompressionLevel {
    fn to_flate2(self) -> Compression {
        match self {
            CompressionLevel::Fastest => Compression::fast(),
            CompressionLevel::Balanced => Compression::new(6),
        }
    }

    /// Sample the first `ADAPTIVE_SAMPLE_SIZE` bytes and pick a level by
    /// Shannon entropy: dense-looking content compresses poorly, so spend
    /// less effort on it.
    pub fn adaptive_for(payload: &[u8]) -> Self {
        let sample = &payload[..payload.len().min(ADAPTIVE_SAMPLE_SIZE)];
        if sample.is_empty() {
            return CompressionLevel::Balanced;
        }

        let mut counts = [0u32; 256];
        for &b in sample {
            counts[b as usize] += 1;
        }

        let len = sample.len() as f64;
        let entropy: f64 = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / len;
                -p * p.log2()
            })
            .sum();

        if entropy > ADAPTIVE_ENTROPY_THRESHOLD {
            CompressionLevel::Fastest
        } else {
            CompressionLevel::Balanced
        }
    }
}

pub fn compress(payload: &[u8], level: CompressionLevel) -> anyhow::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.to_flate2());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}

pub fn compress_adaptive(payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    compress(payload, CompressionLevel::adaptive_for(payload))
}

/// Decompress, doubling the output buffer up to `DOUBLING_ATTEMPTS` times
/// starting from `expected_size_hint` when the caller doesn't know the
/// exact inflated size ahead of time.
pub fn decompress(compressed: &[u8], expected_size_hint: usize, hash: Hash) -> Result<Vec<u8>> {
    let mut capacity = expected_size_hint.max(64);

    for _ in 0..DOUBLING_ATTEMPTS {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut buf = vec![0u8; capacity];
        match decoder.read(&mut buf) {
            Ok(n) if n < capacity => {
                // Confirm we actually reached EOF rather than a short read.
                let mut probe = [0u8; 1];
                if decoder.read(&mut probe).unwrap_or(0) == 0 {
                    buf.truncate(n);
                    return Ok(buf);
                }
            }
            Ok(_) => {}
            Err(_) => return Err(Error::CorruptObject(hash)),
        }
        capacity *= 2;
    }

    Err(Error::CorruptObject(hash))
}

/// A delta record: shared prefix length, shared suffix length, and the
/// literal bytes in between. `apply_delta(base, delta) == target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub common_prefix_len: usize,
    pub common_suffix_len: usize,
    pub middle_bytes: Vec<u8>,
}

/// Worthwhile iff the encoded delta is smaller than `DELTA_WORTHWHILE_RATIO`
/// times the target size. The threshold is a heuristic carried over
/// unjustified from the original implementation; treat it as tunable.
pub const DELTA_WORTHWHILE_RATIO: f64 = 0.8;

pub fn make_delta(base: &[u8], target: &[u8]) -> Delta {
    let max_prefix = base.len().min(target.len());
    let common_prefix_len = (0..max_prefix)
        .find(|&i| base[i] != target[i])
        .unwrap_or(max_prefix);

    let max_suffix = base.len().min(target.len()) - common_prefix_len;
    let common_suffix_len = (0..max_suffix)
        .find(|&i| {
            base[base.len() - 1 - i] != target[target.len() - 1 - i]
        })
        .unwrap_or(max_suffix);

    let middle_bytes = target[common_prefix_len..target.len() - common_suffix_len].to_vec();

    Delta {
        common_prefix_len,
        common_suffix_len,
        middle_bytes,
    }
}

pub fn delta_is_worthwhile(delta: &Delta, target_len: usize) -> bool {
    let encoded_size = delta.middle_bytes.len() + 2 * std::mem::size_of::<usize>();
    (encoded_size as f64) < DELTA_WORTHWHILE_RATIO * (target_len as f64)
}

pub fn apply_delta(base: &[u8], delta: &Delta) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        delta.common_prefix_len + delta.middle_bytes.len() + delta.common_suffix_len,
    );
    out.extend_from_slice(&base[..delta.common_prefix_len]);
    out.extend_from_slice(&delta.middle_bytes);
    out.extend_from_slice(&base[base.len() - delta.common_suffix_len..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_roundtrip() {
        let data = b"hello world, hello world, hello world".repeat(10);
        let compressed = compress_adaptive(&data).unwrap();
        let hash = crate::hash::hash_bytes(&data);
        let decompressed = decompress(&compressed, data.len(), hash).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn decompress_fails_closed_on_truncated_input() {
        let data = vec![b'x'; 10_000];
        let compressed = compress(&data, CompressionLevel::Balanced).unwrap();
        let hash = crate::hash::hash_bytes(&data);
        let truncated = &compressed[..compressed.len() / 2];
        assert!(decompress(truncated, data.len(), hash).is_err());
    }

    #[test]
    fn delta_round_trip() {
        let base = b"the quick brown fox jumps over the lazy dog".to_vec();
        let target = b"the quick brown cat jumps over the lazy dog".to_vec();
        let delta = make_delta(&base, &target);
        assert_eq!(apply_delta(&base, &delta), target);
    }

    #[test]
    fn delta_worthwhile_for_small_edit() {
        let base = vec![b'a'; 1000];
        let mut target = base.clone();
        target[500] = b'b';
        let delta = make_delta(&base, &target);
        assert!(delta_is_worthwhile(&delta, target.len()));
    }
}
