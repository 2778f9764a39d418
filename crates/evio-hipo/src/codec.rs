//! Payload compression codecs.
//!
//! A record's payload is compressed as one unit; the compression type nibble
//! in the record header selects the codec. LZ4 uses the `lz4_flex` block
//! format (no size prefix, the header already carries both lengths); gzip
//! goes through `flate2`. The "LZ4 best" wire nibble is honored on read and
//! write but maps onto the same block encoder as "LZ4 fast" — LZ4 block
//! decompression is mode-agnostic, so the wire stays compatible.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Compression type nibble stored in word 9 of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None,
    Lz4,
    Lz4Best,
    Gzip,
}

impl CompressionType {
    pub fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            2 => Ok(CompressionType::Lz4Best),
            3 => Ok(CompressionType::Gzip),
            other => Err(Error::Codec(format!("unknown compression type {other}"))),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
            CompressionType::Lz4Best => 2,
            CompressionType::Gzip => 3,
        }
    }

    pub fn is_compressed(self) -> bool {
        self != CompressionType::None
    }
}

/// Narrow compression contract: compress appends to `dst` and returns bytes
/// produced; decompress fills the pre-sized `dst` exactly.
pub trait Codec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize>;
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;
}

pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        let start = dst.len();
        dst.resize(start + lz4_flex::block::get_maximum_output_size(src.len()), 0);
        let n = lz4_flex::block::compress_into(src, &mut dst[start..])
            .map_err(|e| Error::Codec(format!("lz4 compress: {e}")))?;
        dst.truncate(start + n);
        Ok(n)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        lz4_flex::block::decompress_into(src, dst)
            .map_err(|e| Error::Codec(format!("lz4 decompress: {e}")))
    }
}

pub struct GzipCodec {
    level: flate2::Compression,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipCodec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        let start = dst.len();
        let mut encoder = flate2::write::GzEncoder::new(dst, self.level);
        encoder
            .write_all(src)
            .map_err(|e| Error::Codec(format!("gzip compress: {e}")))?;
        let dst = encoder
            .finish()
            .map_err(|e| Error::Codec(format!("gzip finish: {e}")))?;
        Ok(dst.len() - start)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let mut decoder = flate2::read::GzDecoder::new(src);
        decoder
            .read_exact(dst)
            .map_err(|e| Error::Codec(format!("gzip decompress: {e}")))?;
        Ok(dst.len())
    }
}

/// Codec instance for a compression type; `None` when the data is stored raw.
pub fn codec_for(ct: CompressionType) -> Option<Box<dyn Codec>> {
    match ct {
        CompressionType::None => None,
        CompressionType::Lz4 | CompressionType::Lz4Best => Some(Box::new(Lz4Codec)),
        CompressionType::Gzip => Some(Box::new(GzipCodec::new())),
    }
}

/// Compress `src` with the given type, appending to `dst`. For
/// `CompressionType::None` the bytes are copied through unchanged.
pub fn compress_into(ct: CompressionType, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
    match codec_for(ct) {
        Some(codec) => codec.compress(src, dst),
        None => {
            dst.extend_from_slice(src);
            Ok(src.len())
        }
    }
}

/// Decompress `src` into the exactly-sized `dst`.
pub fn decompress_into(ct: CompressionType, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    match codec_for(ct) {
        Some(codec) => codec.decompress(src, dst),
        None => {
            if src.len() < dst.len() {
                return Err(Error::Codec(format!(
                    "raw payload of {} bytes shorter than expected {}",
                    src.len(),
                    dst.len()
                )));
            }
            dst.copy_from_slice(&src[..dst.len()]);
            Ok(dst.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ct: CompressionType) {
        let src: Vec<u8> = (0..4096u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let mut compressed = Vec::new();
        let n = compress_into(ct, &src, &mut compressed).unwrap();
        assert_eq!(n, compressed.len());

        let mut out = vec![0u8; src.len()];
        decompress_into(ct, &compressed, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_round_trip_none() {
        round_trip(CompressionType::None);
    }

    #[test]
    fn test_round_trip_lz4() {
        round_trip(CompressionType::Lz4);
    }

    #[test]
    fn test_round_trip_lz4_best() {
        round_trip(CompressionType::Lz4Best);
    }

    #[test]
    fn test_round_trip_gzip() {
        round_trip(CompressionType::Gzip);
    }

    #[test]
    fn test_lz4_shrinks_repetitive_data() {
        let src = vec![0xABu8; 64 * 1024];
        let mut compressed = Vec::new();
        compress_into(CompressionType::Lz4, &src, &mut compressed).unwrap();
        assert!(compressed.len() < src.len() / 2);
    }

    #[test]
    fn test_nibble_round_trip() {
        for ct in [
            CompressionType::None,
            CompressionType::Lz4,
            CompressionType::Lz4Best,
            CompressionType::Gzip,
        ] {
            assert_eq!(CompressionType::from_nibble(ct.nibble()).unwrap(), ct);
        }
        assert!(CompressionType::from_nibble(9).is_err());
    }

    #[test]
    fn test_corrupt_lz4_fails() {
        let mut out = vec![0u8; 128];
        let garbage = [0xFFu8; 16];
        assert!(decompress_into(CompressionType::Lz4, &garbage, &mut out).is_err());
    }
}
