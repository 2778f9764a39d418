//! Record reader for the read path.
//!
//! `RecordInput` pulls one record from a file offset or a buffer offset,
//! decompresses the payload through the codec named by the header's
//! compression nibble, and exposes events by index through the record's
//! event-length index. The internal uncompressed image keeps the on-wire
//! layout (header, index, padded user header, padded payload) so user
//! header and events can be handed out as plain sub-slices.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use evio_core::ByteOrder;

use crate::codec;
use crate::error::{Error, Result};
use crate::header::{padded4, RecordHeader, HEADER_SIZE_BYTES};

pub struct RecordInput {
    header: RecordHeader,
    order: ByteOrder,
    /// Canonical uncompressed record image.
    buffer: Vec<u8>,
    /// (start, len) of each event within `buffer`.
    event_ranges: Vec<(usize, usize)>,
    /// Scratch for raw record bytes read from a file.
    scratch: Vec<u8>,
}

impl RecordInput {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            header: RecordHeader::default(),
            order,
            buffer: Vec::new(),
            event_ranges: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn entries(&self) -> usize {
        self.event_ranges.len()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Read one record from a file at the given byte offset.
    pub fn read_from_file(&mut self, file: &mut File, offset: u64) -> Result<()> {
        file.seek(SeekFrom::Start(offset))?;

        let mut head = [0u8; HEADER_SIZE_BYTES];
        file.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Truncated(format!("record header at offset {offset} past end of file"))
            } else {
                Error::Io(e)
            }
        })?;
        let header = RecordHeader::read(&head, self.order)?;

        let total = header.record_bytes();
        self.scratch.clear();
        self.scratch.resize(total, 0);
        self.scratch[..HEADER_SIZE_BYTES].copy_from_slice(&head);
        file.read_exact(&mut self.scratch[HEADER_SIZE_BYTES..])
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::Truncated(format!(
                        "record at offset {offset} claims {total} bytes past end of file"
                    ))
                } else {
                    Error::Io(e)
                }
            })?;

        let src = std::mem::take(&mut self.scratch);
        let result = self.populate(header, &src);
        self.scratch = src;
        result
    }

    /// Read one record from a byte slice at the given offset.
    pub fn read_from_buffer(&mut self, src: &[u8], offset: usize) -> Result<()> {
        if offset + HEADER_SIZE_BYTES > src.len() {
            return Err(Error::Truncated(format!(
                "record header at offset {offset} exceeds buffer of {} bytes",
                src.len()
            )));
        }
        let header = RecordHeader::read(&src[offset..], self.order)?;
        let total = header.record_bytes();
        if offset + total > src.len() {
            return Err(Error::Truncated(format!(
                "record at offset {offset} claims {total} bytes, buffer holds {}",
                src.len() - offset
            )));
        }
        self.populate(header, &src[offset..offset + total])
    }

    /// Fill the canonical uncompressed image and the event ranges from the
    /// raw record bytes in `src`.
    fn populate(&mut self, header: RecordHeader, src: &[u8]) -> Result<()> {
        self.order = header.byte_order;

        let header_bytes = header.header_bytes();
        let index_len = header.index_length as usize;
        let user_padded = padded4(header.user_header_length as usize);
        let data_padded = padded4(header.data_length as usize);
        let prefix = header_bytes + index_len + user_padded;

        if header.entries > 0 && index_len != header.entries as usize * 4 {
            return Err(Error::Truncated(format!(
                "index of {index_len} bytes cannot describe {} events",
                header.entries
            )));
        }
        if prefix + header.stored_payload_bytes() > src.len() {
            return Err(Error::Truncated(format!(
                "record regions total {} bytes, record holds {}",
                prefix + header.stored_payload_bytes(),
                src.len()
            )));
        }

        self.buffer.clear();
        self.buffer.resize(prefix + data_padded, 0);
        // header, index, and user header are stored uncompressed; copy verbatim
        self.buffer[..prefix].copy_from_slice(&src[..prefix]);

        let payload_src = &src[prefix..];
        if header.is_compressed() {
            codec::decompress_into(
                header.compression_type,
                &payload_src[..header.compressed_data_length as usize],
                &mut self.buffer[prefix..],
            )?;
        } else {
            self.buffer[prefix..].copy_from_slice(&payload_src[..data_padded]);
        }

        // Prefix sums over the index give each event's byte range.
        self.event_ranges.clear();
        let mut event_pos = prefix;
        for i in 0..header.entries as usize {
            let len = self.order.read_u32(&self.buffer[header_bytes + 4 * i..]) as usize;
            if event_pos + len > self.buffer.len() {
                return Err(Error::Truncated(format!(
                    "event {i} of {len} bytes overruns record payload"
                )));
            }
            self.event_ranges.push((event_pos, len));
            event_pos += len;
        }

        self.header = header;
        Ok(())
    }

    /// Borrow event `i`, or `None` when out of range. O(1) via the index.
    pub fn get_event(&self, i: usize) -> Option<&[u8]> {
        let (start, len) = *self.event_ranges.get(i)?;
        Some(&self.buffer[start..start + len])
    }

    /// Copy event `i` into `dst`, returning its length.
    pub fn get_event_into(&self, dst: &mut Vec<u8>, i: usize) -> Option<usize> {
        let event = self.get_event(i)?;
        dst.clear();
        dst.extend_from_slice(event);
        Some(event.len())
    }

    /// The record's user header bytes (unpadded).
    pub fn user_header(&self) -> &[u8] {
        let start = self.header.header_bytes() + self.header.index_length as usize;
        &self.buffer[start..start + self.header.user_header_length as usize]
    }

    /// Expand the record at `src[offset..]` into its canonical uncompressed
    /// image, appended to `dst`. The copied header is rewritten with the
    /// compression cleared and lengths recomputed so the expansion itself
    /// is a valid uncompressed record. Returns the parsed original header
    /// and the byte length of the original (possibly compressed) record.
    pub fn uncompress_record(
        order_hint: ByteOrder,
        src: &[u8],
        offset: usize,
        dst: &mut Vec<u8>,
    ) -> Result<(RecordHeader, usize)> {
        if offset + HEADER_SIZE_BYTES > src.len() {
            return Err(Error::Truncated(format!(
                "record header at offset {offset} exceeds buffer of {} bytes",
                src.len()
            )));
        }
        let header = RecordHeader::read(&src[offset..], order_hint)?;
        let total = header.record_bytes();
        if offset + total > src.len() {
            return Err(Error::Truncated(format!(
                "record at offset {offset} claims {total} bytes, buffer holds {}",
                src.len() - offset
            )));
        }
        let src = &src[offset..offset + total];

        let header_bytes = header.header_bytes();
        let index_len = header.index_length as usize;
        let user_padded = padded4(header.user_header_length as usize);
        let data_padded = padded4(header.data_length as usize);
        let prefix = header_bytes + index_len + user_padded;

        if prefix + header.stored_payload_bytes() > src.len() {
            return Err(Error::Truncated(format!(
                "record regions total {} bytes, record holds {}",
                prefix + header.stored_payload_bytes(),
                src.len()
            )));
        }

        let start = dst.len();
        dst.resize(start + prefix + data_padded, 0);
        dst[start..start + prefix].copy_from_slice(&src[..prefix]);

        if header.is_compressed() {
            codec::decompress_into(
                header.compression_type,
                &src[prefix..prefix + header.compressed_data_length as usize],
                &mut dst[start + prefix..],
            )?;
        } else {
            dst[start + prefix..].copy_from_slice(&src[prefix..prefix + data_padded]);
        }

        // Rewrite the expanded copy's header as an uncompressed record.
        let mut expanded = header.clone();
        expanded.compression_type = crate::codec::CompressionType::None;
        expanded.compressed_data_length = 0;
        expanded.update_record_length();
        expanded.write(&mut dst[start..], header.byte_order)?;

        Ok((header, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionType;
    use crate::record::RecordOutput;

    fn events() -> Vec<Vec<u8>> {
        (0u8..5)
            .map(|i| {
                let mut e = vec![i; 4 * (i as usize + 1)];
                e[0] = 0xF0 | i;
                e
            })
            .collect()
    }

    fn build_record(order: ByteOrder, ct: CompressionType, user_header: &[u8]) -> Vec<u8> {
        let mut out = RecordOutput::new(order, 0, 0, ct);
        for e in events() {
            assert!(out.try_add_event(&e));
        }
        out.set_record_number(3);
        out.build_with_user_header(user_header).unwrap();
        out.as_bytes().to_vec()
    }

    #[test]
    fn test_read_uncompressed_from_buffer() {
        let bytes = build_record(ByteOrder::LittleEndian, CompressionType::None, b"userdata");
        let mut input = RecordInput::new(ByteOrder::LittleEndian);
        input.read_from_buffer(&bytes, 0).unwrap();

        assert_eq!(input.entries(), 5);
        assert_eq!(input.user_header(), b"userdata");
        for (i, e) in events().iter().enumerate() {
            assert_eq!(input.get_event(i).unwrap(), &e[..]);
        }
        assert!(input.get_event(5).is_none());
    }

    #[test]
    fn test_read_compressed_variants() {
        for ct in [
            CompressionType::Lz4,
            CompressionType::Lz4Best,
            CompressionType::Gzip,
        ] {
            let bytes = build_record(ByteOrder::LittleEndian, ct, &[]);
            let mut input = RecordInput::new(ByteOrder::LittleEndian);
            input.read_from_buffer(&bytes, 0).unwrap();
            assert_eq!(input.entries(), 5, "{ct:?}");
            for (i, e) in events().iter().enumerate() {
                assert_eq!(input.get_event(i).unwrap(), &e[..], "{ct:?} event {i}");
            }
        }
    }

    #[test]
    fn test_read_opposite_endian_record() {
        let bytes = build_record(ByteOrder::BigEndian, CompressionType::None, &[]);
        // Reader assumes little-endian and must adapt
        let mut input = RecordInput::new(ByteOrder::LittleEndian);
        input.read_from_buffer(&bytes, 0).unwrap();
        assert_eq!(input.byte_order(), ByteOrder::BigEndian);
        assert_eq!(input.get_event(2).unwrap(), &events()[2][..]);
    }

    #[test]
    fn test_read_from_file_at_offset() {
        use std::io::Write;
        let bytes = build_record(ByteOrder::LittleEndian, CompressionType::Lz4, &[]);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xEE; 128]).unwrap(); // leading junk
        tmp.write_all(&bytes).unwrap();
        tmp.flush().unwrap();

        let mut file = File::open(tmp.path()).unwrap();
        let mut input = RecordInput::new(ByteOrder::LittleEndian);
        input.read_from_file(&mut file, 128).unwrap();
        assert_eq!(input.entries(), 5);
        assert_eq!(input.get_event(4).unwrap(), &events()[4][..]);
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = build_record(ByteOrder::LittleEndian, CompressionType::None, &[]);
        let mut input = RecordInput::new(ByteOrder::LittleEndian);
        let err = input.read_from_buffer(&bytes[..bytes.len() - 8], 0);
        assert!(matches!(err, Err(Error::Truncated(_))));
    }

    #[test]
    fn test_get_event_into() {
        let bytes = build_record(ByteOrder::LittleEndian, CompressionType::None, &[]);
        let mut input = RecordInput::new(ByteOrder::LittleEndian);
        input.read_from_buffer(&bytes, 0).unwrap();

        let mut dst = Vec::new();
        let n = input.get_event_into(&mut dst, 1).unwrap();
        assert_eq!(n, events()[1].len());
        assert_eq!(dst, events()[1]);
    }

    #[test]
    fn test_uncompress_record_yields_canonical_image() {
        let compressed = build_record(ByteOrder::LittleEndian, CompressionType::Gzip, b"uh");
        let plain = build_record(ByteOrder::LittleEndian, CompressionType::None, b"uh");

        let mut dst = Vec::new();
        let (orig, consumed) =
            RecordInput::uncompress_record(ByteOrder::LittleEndian, &compressed, 0, &mut dst)
                .unwrap();
        assert_eq!(consumed, compressed.len());
        assert_eq!(orig.compression_type, CompressionType::Gzip);
        assert_eq!(dst, plain, "expansion equals the uncompressed build");
    }
}
