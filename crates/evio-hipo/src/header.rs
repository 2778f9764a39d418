//! Record and File Header Codec
//!
//! Every record and every file starts with the same 14-word (56-byte)
//! header shape. Word 7 is the magic number 0xC0DA0100 and doubles as the
//! endian oracle: a reader decodes word 7 first, and if it comes out
//! byte-reversed the whole stream is in the opposite byte order.
//!
//! ```text
//! RECORD HEADER (14 x 32-bit words)              FILE HEADER
//!
//!  0 | record length (words, inclusive)      0 | file id 0x4556494F "EVIO"
//!  1 | record number                         1 | file (split) number
//!  2 | header length (14 words)              2 | header length (14 words)
//!  3 | event count                           3 | record count
//!  4 | index array length (bytes)            4 | index array length (bytes)
//!  5 | bit info | version                    5 | bit info | version
//!  6 | user header length (bytes)            6 | user header length (bytes)
//!  7 | magic 0xC0DA0100                      7 | magic 0xC0DA0100
//!  8 | uncompressed data length (bytes)      8 | uncompressed data length
//!  9 | compression type:4 | compressed       9 | compression type:4 | ...
//!    |   data length (words):28                |
//! 10 | user register 1 (64 bits)            10 | trailer position (64 bits)
//! 11 |   ...                                11 |   ...
//! 12 | user register 2 (64 bits)            12 | user register 1 (32 bits)
//! 13 |   ...                                13 | user register 2 (32 bits)
//! ```
//!
//! Bit info word (low byte is the version):
//!
//! ```text
//!  8     has dictionary
//!  9     record: is last record / file: has first event
//! 10     record: has first event / file: trailer-with-index exists
//! 20-21  user header padding (bytes)
//! 22-23  compressed data padding (bytes)
//! 24-25  uncompressed data padding (bytes)
//! 28-31  general header type
//! ```
//!
//! The two 64-bit register fields are written and read as single 64-bit
//! quantities in the stream's byte order. Swapping them as two independent
//! 32-bit words produces garbage; the raw-image swap helpers at the bottom
//! of this module get that right.

use std::fmt;

use evio_core::ByteOrder;

use crate::codec::CompressionType;
use crate::error::{Error, Result};

/// The endian oracle present in word 7 of every header.
pub const HEADER_MAGIC: u32 = 0xC0DA_0100;

/// File id in word 0 of a file header ("EVIO" in ASCII).
pub const EVIO_FILE_ID: u32 = 0x4556_494F;

pub const HEADER_SIZE_WORDS: usize = 14;
pub const HEADER_SIZE_BYTES: usize = 56;

/// Bytes needed to pad a region of `n` bytes to a 4-byte boundary.
pub fn pad4(n: usize) -> usize {
    n.wrapping_neg() & 3
}

/// Byte length of a region padded to a 4-byte boundary.
pub fn padded4(n: usize) -> usize {
    n + pad4(n)
}

/// General header type, bits 28-31 of the bit info word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    EvioRecord,
    EvioFile,
    EvioFileExtended,
    EvioTrailer,
    HipoRecord,
    HipoFile,
    HipoFileExtended,
    HipoTrailer,
}

impl HeaderType {
    pub fn from_bits(bits: u32) -> Option<HeaderType> {
        Some(match bits {
            0 => HeaderType::EvioRecord,
            1 => HeaderType::EvioFile,
            2 => HeaderType::EvioFileExtended,
            3 => HeaderType::EvioTrailer,
            4 => HeaderType::HipoRecord,
            5 => HeaderType::HipoFile,
            6 => HeaderType::HipoFileExtended,
            7 => HeaderType::HipoTrailer,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        match self {
            HeaderType::EvioRecord => 0,
            HeaderType::EvioFile => 1,
            HeaderType::EvioFileExtended => 2,
            HeaderType::EvioTrailer => 3,
            HeaderType::HipoRecord => 4,
            HeaderType::HipoFile => 5,
            HeaderType::HipoFileExtended => 6,
            HeaderType::HipoTrailer => 7,
        }
    }

    pub fn is_trailer(self) -> bool {
        matches!(self, HeaderType::EvioTrailer | HeaderType::HipoTrailer)
    }

    pub fn is_file_header(self) -> bool {
        matches!(
            self,
            HeaderType::EvioFile
                | HeaderType::EvioFileExtended
                | HeaderType::HipoFile
                | HeaderType::HipoFileExtended
        )
    }
}

/// Decoded record header. Primary length fields are stored in bytes; the
/// on-wire word counts and padding bits are derived on write and checked on
/// read.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub header_type: HeaderType,
    /// Record length in words, inclusive of this header.
    pub record_length_words: u32,
    pub record_number: u32,
    pub header_length_words: u32,
    pub entries: u32,
    /// Index array length in bytes (4 x entries when present).
    pub index_length: u32,
    /// User header length in bytes, unpadded.
    pub user_header_length: u32,
    /// Uncompressed data length in bytes, unpadded.
    pub data_length: u32,
    /// Compressed data length in bytes, unpadded. Zero when uncompressed.
    pub compressed_data_length: u32,
    pub compression_type: CompressionType,
    pub user_register_first: u64,
    pub user_register_second: u64,
    pub version: u8,
    pub has_dictionary: bool,
    pub is_last_record: bool,
    pub has_first_event: bool,
    /// Byte order the header was read in (or should be written in).
    pub byte_order: ByteOrder,
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::new(HeaderType::EvioRecord)
    }
}

impl RecordHeader {
    pub fn new(header_type: HeaderType) -> Self {
        Self {
            header_type,
            record_length_words: HEADER_SIZE_WORDS as u32,
            record_number: 0,
            header_length_words: HEADER_SIZE_WORDS as u32,
            entries: 0,
            index_length: 0,
            user_header_length: 0,
            data_length: 0,
            compressed_data_length: 0,
            compression_type: CompressionType::None,
            user_register_first: 0,
            user_register_second: 0,
            version: 6,
            has_dictionary: false,
            is_last_record: false,
            has_first_event: false,
            byte_order: ByteOrder::native(),
        }
    }

    pub fn reset(&mut self) {
        let ht = self.header_type;
        let order = self.byte_order;
        *self = Self::new(ht);
        self.byte_order = order;
    }

    pub fn header_bytes(&self) -> usize {
        self.header_length_words as usize * 4
    }

    pub fn record_bytes(&self) -> usize {
        self.record_length_words as usize * 4
    }

    pub fn user_header_pad(&self) -> usize {
        pad4(self.user_header_length as usize)
    }

    pub fn data_pad(&self) -> usize {
        pad4(self.data_length as usize)
    }

    pub fn compressed_pad(&self) -> usize {
        pad4(self.compressed_data_length as usize)
    }

    pub fn compressed_words(&self) -> u32 {
        (padded4(self.compressed_data_length as usize) / 4) as u32
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_type.is_compressed()
    }

    /// Byte length of the payload region as stored on the wire: compressed
    /// (padded) when a codec is in use, uncompressed (padded) otherwise.
    pub fn stored_payload_bytes(&self) -> usize {
        if self.is_compressed() {
            padded4(self.compressed_data_length as usize)
        } else {
            padded4(self.data_length as usize)
        }
    }

    /// Recompute word 0 from the other length fields.
    pub fn update_record_length(&mut self) {
        let total = self.header_bytes()
            + self.index_length as usize
            + padded4(self.user_header_length as usize)
            + self.stored_payload_bytes();
        self.record_length_words = (total / 4) as u32;
    }

    fn bit_info_word(&self) -> u32 {
        let mut word = self.version as u32;
        if self.has_dictionary {
            word |= 1 << 8;
        }
        if self.is_last_record {
            word |= 1 << 9;
        }
        if self.has_first_event {
            word |= 1 << 10;
        }
        word |= (self.user_header_pad() as u32) << 20;
        word |= (self.compressed_pad() as u32) << 22;
        word |= (self.data_pad() as u32) << 24;
        word |= self.header_type.bits() << 28;
        word
    }

    /// Serialize to the first 56 bytes of `out` in the given order.
    pub fn write(&self, out: &mut [u8], order: ByteOrder) -> Result<()> {
        if out.len() < HEADER_SIZE_BYTES {
            return Err(Error::Truncated(format!(
                "record header needs 56 bytes, have {}",
                out.len()
            )));
        }
        order.write_u32(&mut out[0..], self.record_length_words);
        order.write_u32(&mut out[4..], self.record_number);
        order.write_u32(&mut out[8..], self.header_length_words);
        order.write_u32(&mut out[12..], self.entries);
        order.write_u32(&mut out[16..], self.index_length);
        order.write_u32(&mut out[20..], self.bit_info_word());
        order.write_u32(&mut out[24..], self.user_header_length);
        order.write_u32(&mut out[28..], HEADER_MAGIC);
        order.write_u32(&mut out[32..], self.data_length);
        let compression_word = ((self.compression_type.nibble() as u32) << 28)
            | (self.compressed_words() & 0x0FFF_FFFF);
        order.write_u32(&mut out[36..], compression_word);
        order.write_u64(&mut out[40..], self.user_register_first);
        order.write_u64(&mut out[48..], self.user_register_second);
        Ok(())
    }

    /// Parse a header from `src`, detecting byte order from the magic word.
    ///
    /// `assumed` seeds the detection; the order actually found is recorded
    /// in the returned header's `byte_order`.
    pub fn read(src: &[u8], assumed: ByteOrder) -> Result<RecordHeader> {
        if src.len() < HEADER_SIZE_BYTES {
            return Err(Error::Truncated(format!(
                "record header needs 56 bytes, have {}",
                src.len()
            )));
        }

        let raw_magic = assumed.read_u32(&src[28..]);
        let order = if raw_magic == HEADER_MAGIC {
            assumed
        } else if raw_magic == HEADER_MAGIC.swap_bytes() {
            assumed.swapped()
        } else {
            return Err(Error::BadMagic(raw_magic));
        };

        let bit_info = order.read_u32(&src[20..]);
        let version = (bit_info & 0xFF) as u8;
        if version < 6 {
            return Err(Error::UnsupportedVersion(version));
        }

        let compression_word = order.read_u32(&src[36..]);
        let compression_type = CompressionType::from_nibble((compression_word >> 28) as u8)?;
        let compressed_words = compression_word & 0x0FFF_FFFF;
        let compressed_pad = ((bit_info >> 22) & 0x3) as usize;

        Ok(RecordHeader {
            header_type: HeaderType::from_bits(bit_info >> 28)
                .unwrap_or(HeaderType::EvioRecord),
            record_length_words: order.read_u32(&src[0..]),
            record_number: order.read_u32(&src[4..]),
            header_length_words: order.read_u32(&src[8..]),
            entries: order.read_u32(&src[12..]),
            index_length: order.read_u32(&src[16..]),
            user_header_length: order.read_u32(&src[24..]),
            data_length: order.read_u32(&src[32..]),
            compressed_data_length: (compressed_words as usize * 4)
                .saturating_sub(compressed_pad) as u32,
            compression_type,
            user_register_first: order.read_u64(&src[40..]),
            user_register_second: order.read_u64(&src[48..]),
            version,
            has_dictionary: bit_info & (1 << 8) != 0,
            is_last_record: bit_info & (1 << 9) != 0,
            has_first_event: bit_info & (1 << 10) != 0,
            byte_order: order,
        })
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>24} : {}", "version", self.version)?;
        writeln!(f, "{:>24} : {}", "record #", self.record_number)?;
        writeln!(f, "{:>24} : {:?}", "type", self.header_type)?;
        writeln!(
            f,
            "{:>24} : {:8} / {:8} / {:8}",
            "user header length",
            self.user_header_length,
            padded4(self.user_header_length as usize) / 4,
            self.user_header_pad()
        )?;
        writeln!(
            f,
            "{:>24} : {:8} / {:8} / {:8}",
            "data length",
            self.data_length,
            padded4(self.data_length as usize) / 4,
            self.data_pad()
        )?;
        writeln!(
            f,
            "{:>24} : {:8} / {:8}",
            "record length",
            self.record_bytes(),
            self.record_length_words
        )?;
        writeln!(
            f,
            "{:>24} : {:8} / {:8} / {:8}",
            "compressed length",
            self.compressed_data_length,
            self.compressed_words(),
            self.compressed_pad()
        )?;
        writeln!(f, "{:>24} : {}", "header length", self.header_bytes())?;
        writeln!(f, "{:>24} : 0x{:X}", "magic word", HEADER_MAGIC)?;
        writeln!(f, "{:>24} : {}", "record entries", self.entries)?;
        writeln!(
            f,
            "{:>24} : {}",
            "compression type",
            self.compression_type.nibble()
        )?;
        writeln!(f, "{:>24} : {}", "index length", self.index_length)?;
        writeln!(f, "{:>24} : {}", "user register #1", self.user_register_first)?;
        write!(f, "{:>24} : {}", "user register #2", self.user_register_second)
    }
}

/// Decoded file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub header_type: HeaderType,
    pub file_id: u32,
    pub file_number: u32,
    pub header_length_words: u32,
    /// Number of records in the file.
    pub entries: u32,
    /// File-level index array length in bytes (8 per record when present).
    pub index_length: u32,
    pub user_header_length: u32,
    pub version: u8,
    pub has_dictionary: bool,
    pub has_first_event: bool,
    pub has_trailer_with_index: bool,
    /// Byte offset of the trailer record; 0 when no trailer exists.
    pub trailer_position: u64,
    pub user_register_first: u32,
    pub user_register_second: u32,
    pub byte_order: ByteOrder,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            header_type: HeaderType::EvioFile,
            file_id: EVIO_FILE_ID,
            file_number: 0,
            header_length_words: HEADER_SIZE_WORDS as u32,
            entries: 0,
            index_length: 0,
            user_header_length: 0,
            version: 6,
            has_dictionary: false,
            has_first_event: false,
            has_trailer_with_index: false,
            trailer_position: 0,
            user_register_first: 0,
            user_register_second: 0,
            byte_order: ByteOrder::native(),
        }
    }

    pub fn header_bytes(&self) -> usize {
        self.header_length_words as usize * 4
    }

    pub fn user_header_pad(&self) -> usize {
        pad4(self.user_header_length as usize)
    }

    /// Offset of the first data record in the file.
    pub fn first_record_position(&self) -> u64 {
        (self.header_bytes() + self.index_length as usize
            + padded4(self.user_header_length as usize)) as u64
    }

    fn bit_info_word(&self) -> u32 {
        let mut word = self.version as u32;
        if self.has_dictionary {
            word |= 1 << 8;
        }
        if self.has_first_event {
            word |= 1 << 9;
        }
        if self.has_trailer_with_index {
            word |= 1 << 10;
        }
        word |= (self.user_header_pad() as u32) << 20;
        word |= self.header_type.bits() << 28;
        word
    }

    pub fn write(&self, out: &mut [u8], order: ByteOrder) -> Result<()> {
        if out.len() < HEADER_SIZE_BYTES {
            return Err(Error::Truncated(format!(
                "file header needs 56 bytes, have {}",
                out.len()
            )));
        }
        order.write_u32(&mut out[0..], self.file_id);
        order.write_u32(&mut out[4..], self.file_number);
        order.write_u32(&mut out[8..], self.header_length_words);
        order.write_u32(&mut out[12..], self.entries);
        order.write_u32(&mut out[16..], self.index_length);
        order.write_u32(&mut out[20..], self.bit_info_word());
        order.write_u32(&mut out[24..], self.user_header_length);
        order.write_u32(&mut out[28..], HEADER_MAGIC);
        order.write_u32(&mut out[32..], 0); // no payload on a file header
        order.write_u32(&mut out[36..], 0);
        order.write_u64(&mut out[40..], self.trailer_position);
        order.write_u32(&mut out[48..], self.user_register_first);
        order.write_u32(&mut out[52..], self.user_register_second);
        Ok(())
    }

    pub fn read(src: &[u8], assumed: ByteOrder) -> Result<FileHeader> {
        if src.len() < HEADER_SIZE_BYTES {
            return Err(Error::Truncated(format!(
                "file header needs 56 bytes, have {}",
                src.len()
            )));
        }

        let raw_magic = assumed.read_u32(&src[28..]);
        let order = if raw_magic == HEADER_MAGIC {
            assumed
        } else if raw_magic == HEADER_MAGIC.swap_bytes() {
            assumed.swapped()
        } else {
            return Err(Error::BadMagic(raw_magic));
        };

        let bit_info = order.read_u32(&src[20..]);
        let version = (bit_info & 0xFF) as u8;
        if version < 6 {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok(FileHeader {
            header_type: HeaderType::from_bits(bit_info >> 28).unwrap_or(HeaderType::EvioFile),
            file_id: order.read_u32(&src[0..]),
            file_number: order.read_u32(&src[4..]),
            header_length_words: order.read_u32(&src[8..]),
            entries: order.read_u32(&src[12..]),
            index_length: order.read_u32(&src[16..]),
            user_header_length: order.read_u32(&src[24..]),
            version,
            has_dictionary: bit_info & (1 << 8) != 0,
            has_first_event: bit_info & (1 << 9) != 0,
            has_trailer_with_index: bit_info & (1 << 10) != 0,
            trailer_position: order.read_u64(&src[40..]),
            user_register_first: order.read_u32(&src[48..]),
            user_register_second: order.read_u32(&src[52..]),
            byte_order: order,
        })
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>24} : {}", "version", self.version)?;
        writeln!(f, "{:>24} : 0x{:08X}", "file id", self.file_id)?;
        writeln!(f, "{:>24} : {}", "file #", self.file_number)?;
        writeln!(f, "{:>24} : {}", "records", self.entries)?;
        writeln!(f, "{:>24} : {}", "index length", self.index_length)?;
        writeln!(
            f,
            "{:>24} : {:8} / {:8}",
            "user header length",
            self.user_header_length,
            self.user_header_pad()
        )?;
        writeln!(f, "{:>24} : {}", "trailer position", self.trailer_position)?;
        writeln!(f, "{:>24} : {}", "has dictionary", self.has_dictionary)?;
        writeln!(f, "{:>24} : {}", "has first event", self.has_first_event)?;
        write!(
            f,
            "{:>24} : {}",
            "trailer with index", self.has_trailer_with_index
        )
    }
}

/// Build a complete trailer record: a lone header with the last-record bit
/// set and, optionally, the file-wide index of (record length, event count)
/// pairs as its "index array".
pub fn build_trailer(
    record_number: u32,
    order: ByteOrder,
    index: Option<&[(u32, u32)]>,
) -> Vec<u8> {
    let pairs = index.map(|p| p.len()).unwrap_or(0);
    let mut header = RecordHeader::new(HeaderType::EvioTrailer);
    header.record_number = record_number;
    header.is_last_record = true;
    header.byte_order = order;
    header.entries = pairs as u32;
    header.index_length = (pairs * 8) as u32;
    header.update_record_length();

    let mut out = vec![0u8; HEADER_SIZE_BYTES + pairs * 8];
    header
        .write(&mut out, order)
        .expect("trailer buffer is sized above");
    if let Some(pairs) = index {
        for (i, (len, count)) in pairs.iter().enumerate() {
            order.write_u32(&mut out[HEADER_SIZE_BYTES + 8 * i..], *len);
            order.write_u32(&mut out[HEADER_SIZE_BYTES + 8 * i + 4..], *count);
        }
    }
    out
}

/// Swap a raw 56-byte record header image in place, keeping words 10-13
/// as two 64-bit register values.
pub fn swap_record_header_image(header: &mut [u8]) {
    for chunk in header[..40].chunks_exact_mut(4) {
        chunk.reverse();
    }
    header[40..48].reverse();
    header[48..56].reverse();
}

/// Swap a raw 56-byte file header image in place, keeping the 64-bit
/// trailer position in words 10-11 intact.
pub fn swap_file_header_image(header: &mut [u8]) {
    for chunk in header[..40].chunks_exact_mut(4) {
        chunk.reverse();
    }
    header[40..48].reverse();
    for chunk in header[48..56].chunks_exact_mut(4) {
        chunk.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record_header() -> RecordHeader {
        let mut h = RecordHeader::new(HeaderType::EvioRecord);
        h.record_number = 23;
        h.entries = 3;
        h.index_length = 12;
        h.user_header_length = 459;
        h.data_length = 12457;
        h.compressed_data_length = 861;
        h.compression_type = CompressionType::Lz4;
        h.user_register_first = 1_234_567;
        h.user_register_second = 0xDEAD_BEEF_CAFE_F00D;
        h.has_dictionary = true;
        h.update_record_length();
        h
    }

    #[test]
    fn test_record_header_round_trip() {
        let h = sample_record_header();
        let mut buf = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, ByteOrder::LittleEndian).unwrap();

        let back = RecordHeader::read(&buf, ByteOrder::LittleEndian).unwrap();
        assert_eq!(back.record_number, 23);
        assert_eq!(back.entries, 3);
        assert_eq!(back.index_length, 12);
        assert_eq!(back.user_header_length, 459);
        assert_eq!(back.data_length, 12457);
        assert_eq!(back.compressed_data_length, 861);
        assert_eq!(back.compression_type, CompressionType::Lz4);
        assert_eq!(back.user_register_first, 1_234_567);
        assert_eq!(back.user_register_second, 0xDEAD_BEEF_CAFE_F00D);
        assert!(back.has_dictionary);
        assert!(!back.is_last_record);
        assert_eq!(back.record_length_words, h.record_length_words);
        assert_eq!(back.byte_order, ByteOrder::LittleEndian);
    }

    #[test]
    fn test_cross_endian_read_flips_order() {
        let h = sample_record_header();
        let mut buf = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, ByteOrder::BigEndian).unwrap();

        // Reader assumes little-endian, discovers big
        let back = RecordHeader::read(&buf, ByteOrder::LittleEndian).unwrap();
        assert_eq!(back.byte_order, ByteOrder::BigEndian);
        assert_eq!(back.data_length, 12457);
        assert_eq!(back.user_register_first, 1_234_567);
        assert_eq!(back.user_register_second, 0xDEAD_BEEF_CAFE_F00D);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = [0u8; HEADER_SIZE_BYTES];
        let h = sample_record_header();
        h.write(&mut buf, ByteOrder::LittleEndian).unwrap();
        buf[28] ^= 0xFF;
        assert!(matches!(
            RecordHeader::read(&buf, ByteOrder::LittleEndian),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn test_old_version_rejected() {
        let mut h = sample_record_header();
        h.version = 4;
        let mut buf = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, ByteOrder::LittleEndian).unwrap();
        assert!(matches!(
            RecordHeader::read(&buf, ByteOrder::LittleEndian),
            Err(Error::UnsupportedVersion(4))
        ));
    }

    #[test]
    fn test_record_length_invariant() {
        let mut h = RecordHeader::new(HeaderType::EvioRecord);
        h.entries = 2;
        h.index_length = 8;
        h.user_header_length = 5; // pads to 8
        h.data_length = 100;
        h.update_record_length();
        assert_eq!(
            h.record_bytes(),
            56 + 8 + 8 + 100,
            "uncompressed payload: 56 + index + padded user + padded data"
        );

        h.compression_type = CompressionType::Gzip;
        h.compressed_data_length = 37; // pads to 40
        h.update_record_length();
        assert_eq!(h.record_bytes(), 56 + 8 + 8 + 40);
    }

    #[test]
    fn test_padding_bits_round_trip() {
        let mut h = RecordHeader::new(HeaderType::HipoRecord);
        h.user_header_length = 3;
        h.data_length = 101;
        h.compression_type = CompressionType::Lz4;
        h.compressed_data_length = 61;
        h.update_record_length();

        let mut buf = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut buf, ByteOrder::LittleEndian).unwrap();
        let back = RecordHeader::read(&buf, ByteOrder::LittleEndian).unwrap();
        assert_eq!(back.user_header_pad(), 1);
        assert_eq!(back.data_pad(), 3);
        assert_eq!(back.compressed_pad(), 3);
        assert_eq!(back.compressed_data_length, 61);
        assert_eq!(back.header_type, HeaderType::HipoRecord);
    }

    #[test]
    fn test_file_header_round_trip() {
        let mut fh = FileHeader::new();
        fh.file_number = 2;
        fh.entries = 17;
        fh.user_header_length = 120;
        fh.has_dictionary = true;
        fh.has_first_event = true;
        fh.has_trailer_with_index = true;
        fh.trailer_position = 0x1_0000_0004;
        fh.user_register_first = 42;

        let mut buf = [0u8; HEADER_SIZE_BYTES];
        fh.write(&mut buf, ByteOrder::BigEndian).unwrap();
        let back = FileHeader::read(&buf, ByteOrder::BigEndian).unwrap();
        assert_eq!(back.file_id, EVIO_FILE_ID);
        assert_eq!(back.file_number, 2);
        assert_eq!(back.entries, 17);
        assert_eq!(back.user_header_length, 120);
        assert!(back.has_dictionary && back.has_first_event && back.has_trailer_with_index);
        assert_eq!(back.trailer_position, 0x1_0000_0004);
        assert_eq!(back.user_register_first, 42);
        assert_eq!(back.byte_order, ByteOrder::BigEndian);
        assert_eq!(back.first_record_position(), 56 + 120);
    }

    #[test]
    fn test_trailer_layout() {
        let pairs = [(160u32, 3u32), (96, 1)];
        let bytes = build_trailer(7, ByteOrder::LittleEndian, Some(&pairs));
        assert_eq!(bytes.len(), 56 + 16);

        let h = RecordHeader::read(&bytes, ByteOrder::LittleEndian).unwrap();
        assert!(h.is_last_record);
        assert_eq!(h.header_type, HeaderType::EvioTrailer);
        assert_eq!(h.entries, 2);
        assert_eq!(h.index_length, 16);
        assert_eq!(h.record_bytes(), 56 + 16);
        assert_eq!(h.data_length, 0);

        let le = ByteOrder::LittleEndian;
        assert_eq!(le.read_u32(&bytes[56..]), 160);
        assert_eq!(le.read_u32(&bytes[60..]), 3);
        assert_eq!(le.read_u32(&bytes[64..]), 96);
        assert_eq!(le.read_u32(&bytes[68..]), 1);
    }

    #[test]
    fn test_header_image_swap_keeps_registers() {
        let h = sample_record_header();
        let mut le = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut le, ByteOrder::LittleEndian).unwrap();
        let mut be = [0u8; HEADER_SIZE_BYTES];
        h.write(&mut be, ByteOrder::BigEndian).unwrap();

        swap_record_header_image(&mut le);
        assert_eq!(le, be);
    }

    #[test]
    fn test_pad4() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 3);
        assert_eq!(pad4(2), 2);
        assert_eq!(pad4(3), 1);
        assert_eq!(pad4(4), 0);
        assert_eq!(padded4(5), 8);
    }
}
