//! Record builder for the write path.
//!
//! A `RecordOutput` accumulates events into a pre-sized buffer until the
//! next one would overflow the event-count or byte cap, then `build()`
//! compresses the payload once and lays down header, index, user header,
//! and payload as one contiguous wire image. `reset()` clears the counts
//! but keeps the allocations, so writers (and ring slots in particular)
//! reuse one instance per record cycle.

use bytes::{BufMut, BytesMut};
use evio_core::ByteOrder;

use crate::codec::{self, CompressionType};
use crate::error::Result;
use crate::header::{pad4, HeaderType, RecordHeader, HEADER_SIZE_BYTES};

use super::{DEFAULT_MAX_EVENT_COUNT, DEFAULT_MAX_RECORD_BYTES};

pub struct RecordOutput {
    header: RecordHeader,
    order: ByteOrder,
    compression: CompressionType,
    max_event_count: usize,
    max_data_bytes: usize,

    /// Per-event uncompressed byte lengths, in append order.
    index: Vec<u32>,
    /// Concatenated event bytes.
    events: BytesMut,
    /// Scratch for the compressed payload.
    compressed: Vec<u8>,
    /// The finished wire image, valid after `build()`.
    built: Vec<u8>,
    is_built: bool,
}

impl RecordOutput {
    pub fn new(
        order: ByteOrder,
        max_event_count: usize,
        max_data_bytes: usize,
        compression: CompressionType,
    ) -> Self {
        let max_event_count = if max_event_count == 0 {
            DEFAULT_MAX_EVENT_COUNT
        } else {
            max_event_count
        };
        let max_data_bytes = if max_data_bytes == 0 {
            DEFAULT_MAX_RECORD_BYTES
        } else {
            max_data_bytes
        };
        let mut header = RecordHeader::new(HeaderType::EvioRecord);
        header.byte_order = order;
        Self {
            header,
            order,
            compression,
            max_event_count,
            max_data_bytes,
            index: Vec::new(),
            events: BytesMut::with_capacity(max_data_bytes.min(DEFAULT_MAX_RECORD_BYTES)),
            compressed: Vec::new(),
            built: Vec::new(),
            is_built: false,
        }
    }

    pub fn entries(&self) -> usize {
        self.index.len()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Uncompressed payload bytes accepted so far.
    pub fn data_bytes(&self) -> usize {
        self.events.len()
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn set_record_number(&mut self, number: u32) {
        self.header.record_number = number;
    }

    pub fn set_last_record(&mut self, last: bool) {
        self.header.is_last_record = last;
    }

    pub fn set_user_registers(&mut self, first: u64, second: u64) {
        self.header.user_register_first = first;
        self.header.user_register_second = second;
    }

    /// Try to append one event. Returns `false` when the event would push
    /// the record past either cap; the caller must then `build()` and
    /// `reset()` before retrying.
    ///
    /// A single event larger than the byte cap is still accepted into an
    /// empty record, so oversized events round-trip in a record of their
    /// own.
    pub fn try_add_event(&mut self, event: &[u8]) -> bool {
        if !self.index.is_empty()
            && (self.events.len() + event.len() > self.max_data_bytes
                || self.index.len() + 1 > self.max_event_count)
        {
            return false;
        }
        self.events.put_slice(event);
        self.index.push(event.len() as u32);
        self.is_built = false;
        true
    }

    /// Produce the wire-format record with an empty user header.
    pub fn build(&mut self) -> Result<()> {
        self.build_with_user_header(&[])
    }

    /// Produce the wire-format record. The payload is compressed as one
    /// unit with this record's compression type; header fields are derived
    /// from what was accumulated.
    pub fn build_with_user_header(&mut self, user_header: &[u8]) -> Result<()> {
        let data_len = self.events.len();
        let data_padded = data_len + pad4(data_len);

        self.header.entries = self.index.len() as u32;
        self.header.index_length = (self.index.len() * 4) as u32;
        self.header.user_header_length = user_header.len() as u32;
        self.header.data_length = data_len as u32;
        self.header.compression_type = self.compression;
        self.header.byte_order = self.order;

        let payload: &[u8] = if self.compression.is_compressed() {
            // Compress the padded data region so the uncompressed image is
            // word-aligned on expansion.
            self.events.resize(data_padded, 0);
            self.compressed.clear();
            let n = codec::compress_into(self.compression, &self.events, &mut self.compressed)?;
            self.events.truncate(data_len);
            self.header.compressed_data_length = n as u32;
            &self.compressed
        } else {
            self.header.compressed_data_length = 0;
            &self.events
        };

        self.header.update_record_length();

        let total = self.header.record_bytes();
        self.built.clear();
        self.built.resize(total, 0);
        self.header.write(&mut self.built, self.order)?;

        let mut pos = HEADER_SIZE_BYTES;
        for len in &self.index {
            self.order.write_u32(&mut self.built[pos..], *len);
            pos += 4;
        }

        self.built[pos..pos + user_header.len()].copy_from_slice(user_header);
        pos += user_header.len() + pad4(user_header.len());

        self.built[pos..pos + payload.len()].copy_from_slice(payload);
        // trailing padding bytes stay zero from the resize

        self.is_built = true;
        Ok(())
    }

    /// The record produced by the last `build()`.
    pub fn as_bytes(&self) -> &[u8] {
        debug_assert!(self.is_built, "record accessed before build()");
        &self.built
    }

    /// Mutable access to the built record; the sink patches the record
    /// number word through this.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        debug_assert!(self.is_built, "record accessed before build()");
        &mut self.built
    }

    /// Clear counts and lengths for the next record; buffers are reused.
    pub fn reset(&mut self) {
        self.index.clear();
        self.events.clear();
        self.compressed.clear();
        self.built.clear();
        self.is_built = false;
        self.header.reset();
        self.header.byte_order = self.order;
    }
}
