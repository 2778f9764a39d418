//! File and buffer reader.
//!
//! A `Reader` opens a file (or wraps a buffer), locates every record, and
//! dispenses events by global ordinal. Record positions come from the
//! cheapest available source:
//!
//! 1. the trailer's record index, when the file header says one exists;
//! 2. the index array following the file header, when present;
//! 3. a linear walk of the records (`force_scan`).
//!
//! From the per-record event counts a [`FileEventIndex`] answers
//! `event ordinal -> (record, slot)` in O(log records); sequential
//! `get_next_event` / `get_prev_event` share that cursor with random
//! `get_event(i)`, compensating by one step on direction flips so no event
//! is returned twice.
//!
//! Buffer-backed readers additionally build an [`EvioNode`] index over
//! every event and substructure, and support in-place structural mutation
//! (`add_structure` / `remove_structure`) with cascading length updates and
//! a rescan; all outstanding nodes are invalidated by a mutation.
//!
//! Compressed buffers are expanded before scanning. If the caller's buffer
//! has the capacity, the expansion is copied back so the caller's buffer
//! stays canonical; otherwise a larger buffer is allocated and exposed via
//! [`Reader::buffer`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use evio_core::{ByteBuffer, ByteOrder, DataType};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event_index::FileEventIndex;
use crate::header::{padded4, FileHeader, RecordHeader, HEADER_SIZE_BYTES};
use crate::node::{EvioNode, NodeArena, NodeId};
use crate::record::RecordInput;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Ignore in-file and trailer indices, walk the records instead.
    pub force_scan: bool,
    /// Fail with `BadSequence` unless records are numbered 1, 2, 3, ...
    pub check_record_number_sequence: bool,
}

/// Location of one record within the file or buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordPosition {
    pub position: u64,
    pub length: u32,
    pub event_count: u32,
}

pub struct Reader {
    file: Option<File>,
    file_name: Option<PathBuf>,
    file_size: u64,
    from_file: bool,

    buffer: Option<ByteBuffer>,
    buffer_offset: usize,
    buffer_limit: usize,

    file_header: Option<FileHeader>,
    first_record_header: Option<RecordHeader>,
    byte_order: ByteOrder,
    version: u8,
    compressed: bool,

    dictionary_xml: Option<String>,
    first_event: Option<Vec<u8>>,
    dict_extracted: bool,

    record_positions: Vec<RecordPosition>,
    event_index: FileEventIndex,
    input_record: RecordInput,
    current_record: usize,
    record_loaded: bool,

    sequential_index: i64,
    last_called_seq_next: bool,

    arena: NodeArena,
    event_nodes: Vec<NodeId>,

    options: ReaderOptions,
    closed: bool,
}

impl Reader {
    /// Open a file, using any in-file or trailer index before scanning.
    pub fn open(path: impl AsRef<Path>) -> Result<Reader> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Reader> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut reader = Reader {
            file: Some(file),
            file_name: Some(path.to_path_buf()),
            file_size,
            from_file: true,
            buffer: None,
            buffer_offset: 0,
            buffer_limit: 0,
            file_header: None,
            first_record_header: None,
            byte_order: ByteOrder::LittleEndian,
            version: 6,
            compressed: false,
            dictionary_xml: None,
            first_event: None,
            dict_extracted: false,
            record_positions: Vec::new(),
            event_index: FileEventIndex::new(),
            input_record: RecordInput::new(ByteOrder::LittleEndian),
            current_record: 0,
            record_loaded: false,
            sequential_index: -1,
            last_called_seq_next: false,
            arena: NodeArena::new(),
            event_nodes: Vec::new(),
            options,
            closed: false,
        };
        reader.scan_file()?;
        Ok(reader)
    }

    /// Read records from a buffer. Position and limit must frame the data.
    pub fn from_buffer(buffer: ByteBuffer) -> Result<Reader> {
        Self::from_buffer_with(buffer, ReaderOptions::default())
    }

    pub fn from_buffer_with(buffer: ByteBuffer, options: ReaderOptions) -> Result<Reader> {
        let mut reader = Reader {
            file: None,
            file_name: None,
            file_size: 0,
            from_file: false,
            buffer_offset: buffer.position(),
            buffer_limit: buffer.limit(),
            buffer: Some(buffer),
            file_header: None,
            first_record_header: None,
            byte_order: ByteOrder::LittleEndian,
            version: 6,
            compressed: false,
            dictionary_xml: None,
            first_event: None,
            dict_extracted: false,
            record_positions: Vec::new(),
            event_index: FileEventIndex::new(),
            input_record: RecordInput::new(ByteOrder::LittleEndian),
            current_record: 0,
            record_loaded: false,
            sequential_index: -1,
            last_called_seq_next: false,
            arena: NodeArena::new(),
            event_nodes: Vec::new(),
            options,
            closed: false,
        };
        reader.scan_buffer()?;
        Ok(reader)
    }

    /// Re-target this reader at another buffer, resetting every index and
    /// cursor. Outstanding nodes are invalidated.
    pub fn set_buffer(&mut self, buffer: ByteBuffer) -> Result<()> {
        self.file = None;
        self.file_name = None;
        self.file_size = 0;
        self.from_file = false;
        self.buffer_offset = buffer.position();
        self.buffer_limit = buffer.limit();
        self.buffer = Some(buffer);
        self.file_header = None;
        self.first_record_header = None;
        self.compressed = false;
        self.dictionary_xml = None;
        self.first_event = None;
        self.dict_extracted = false;
        self.record_positions.clear();
        self.event_index.clear();
        self.input_record = RecordInput::new(self.byte_order);
        self.current_record = 0;
        self.record_loaded = false;
        self.sequential_index = -1;
        self.last_called_seq_next = false;
        self.arena.mark_all_obsolete();
        self.event_nodes.clear();
        self.closed = false;
        self.scan_buffer()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn is_file(&self) -> bool {
        self.from_file
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.file = None;
            self.closed = true;
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Was the source compressed? (Buffer readers expand on scan, so the
    /// data dispensed is always uncompressed.)
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    pub fn first_record_header(&self) -> Option<&RecordHeader> {
        self.first_record_header.as_ref()
    }

    pub fn event_count(&self) -> usize {
        self.event_index.max_events()
    }

    pub fn record_count(&self) -> usize {
        self.record_positions.len()
    }

    pub fn record_positions(&self) -> &[RecordPosition] {
        &self.record_positions
    }

    /// Index of the record currently loaded in the input stream.
    pub fn current_record(&self) -> usize {
        self.current_record
    }

    /// Number of events in the currently loaded record.
    pub fn record_event_count(&self) -> usize {
        self.input_record.entries()
    }

    pub fn num_events_remaining(&self) -> usize {
        self.event_index.max_events() - self.sequential_index.max(0) as usize
    }

    /// The buffer being read, when buffer-backed. After scanning a
    /// compressed buffer that was too small for its expansion, this is the
    /// replacement buffer.
    pub fn buffer(&self) -> Option<&ByteBuffer> {
        self.buffer.as_ref()
    }

    // ------------------------------------------------------------------
    // Event access
    // ------------------------------------------------------------------

    /// Copy out event `i` (global ordinal), or `None` past the end.
    pub fn get_event(&mut self, i: usize) -> Result<Option<Vec<u8>>> {
        if i >= self.event_index.max_events() {
            return Ok(None);
        }
        let record_changed = self.event_index.set_event(i);
        if record_changed || !self.record_loaded {
            self.read_record(self.event_index.record_number())?;
        }
        let mut out = Vec::new();
        match self
            .input_record
            .get_event_into(&mut out, self.event_index.record_event_number())
        {
            Some(_) => Ok(Some(out)),
            None => Ok(None),
        }
    }

    /// Copy event `i` into `dst`, returning its length, or `None` past the
    /// end.
    pub fn get_event_into(&mut self, dst: &mut Vec<u8>, i: usize) -> Result<Option<usize>> {
        if i >= self.event_index.max_events() {
            return Ok(None);
        }
        let record_changed = self.event_index.set_event(i);
        if record_changed || !self.record_loaded {
            self.read_record(self.event_index.record_number())?;
        }
        Ok(self
            .input_record
            .get_event_into(dst, self.event_index.record_event_number()))
    }

    /// Next event in sequential order, `None` once exhausted. Interleaves
    /// correctly with `get_prev_event`.
    pub fn get_next_event(&mut self) -> Result<Option<Vec<u8>>> {
        if self.sequential_index < 0 {
            self.sequential_index = 0;
        } else if !self.last_called_seq_next {
            self.sequential_index += 1;
        }
        self.last_called_seq_next = true;

        let ev = self.get_event(self.sequential_index as usize)?;
        if ev.is_some() {
            self.sequential_index += 1;
        }
        Ok(ev)
    }

    /// Previous event in sequential order, `None` at (or before) the first.
    pub fn get_prev_event(&mut self) -> Result<Option<Vec<u8>>> {
        if self.sequential_index >= 0 && self.last_called_seq_next {
            self.sequential_index -= 1;
        }
        self.last_called_seq_next = false;

        if self.sequential_index <= 0 {
            self.sequential_index = self.sequential_index.max(0);
            return Ok(None);
        }
        let ev = self.get_event(self.sequential_index as usize - 1)?;
        if ev.is_some() {
            self.sequential_index -= 1;
        }
        Ok(ev)
    }

    pub fn has_next(&self) -> bool {
        (self.sequential_index.max(0) as usize) < self.event_index.max_events()
    }

    pub fn has_prev(&self) -> bool {
        self.sequential_index > 0
    }

    /// Load the record at `index` into the input stream.
    pub fn read_record(&mut self, index: usize) -> Result<()> {
        let pos = self
            .record_positions
            .get(index)
            .copied()
            .ok_or_else(|| Error::Truncated(format!("no record at index {index}")))?;
        if self.from_file {
            let file = self.file.as_mut().ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "reader is closed",
                ))
            })?;
            self.input_record.read_from_file(file, pos.position)?;
        } else {
            let buffer = self.buffer.as_ref().expect("buffer-backed reader");
            self.input_record
                .read_from_buffer(&buffer.as_bytes()[..self.buffer_limit], pos.position as usize)?;
        }
        self.current_record = index;
        self.record_loaded = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dictionary / first event / user header
    // ------------------------------------------------------------------

    pub fn has_dictionary(&self) -> bool {
        match (&self.file_header, &self.first_record_header) {
            (Some(fh), _) if self.from_file => fh.has_dictionary,
            (_, Some(rh)) => rh.has_dictionary,
            _ => false,
        }
    }

    pub fn has_first_event(&self) -> bool {
        match (&self.file_header, &self.first_record_header) {
            (Some(fh), _) if self.from_file => fh.has_first_event,
            (_, Some(rh)) => rh.has_first_event,
            _ => false,
        }
    }

    /// The XML dictionary carried in the user-header region, if any.
    pub fn dictionary(&mut self) -> Result<Option<String>> {
        self.extract_dictionary_and_first_event()?;
        Ok(self.dictionary_xml.clone())
    }

    /// The "first event" carried in the user-header region, if any.
    pub fn first_event(&mut self) -> Result<Option<Vec<u8>>> {
        self.extract_dictionary_and_first_event()?;
        Ok(self.first_event.clone())
    }

    /// Raw user-header bytes of the file header (file readers) or of the
    /// first record header (buffer readers).
    pub fn read_user_header(&mut self) -> Result<Vec<u8>> {
        if self.from_file {
            let fh = self
                .file_header
                .as_ref()
                .ok_or_else(|| Error::Truncated("no file header".into()))?;
            let len = fh.user_header_length as usize;
            let offset = (fh.header_bytes() + fh.index_length as usize) as u64;
            let file = self.file.as_mut().ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "reader is closed",
                ))
            })?;
            let mut bytes = vec![0u8; len];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut bytes)?;
            Ok(bytes)
        } else {
            let rh = self
                .first_record_header
                .as_ref()
                .ok_or_else(|| Error::Truncated("no record header".into()))?;
            let len = rh.user_header_length as usize;
            let start =
                self.buffer_offset + rh.header_bytes() + rh.index_length as usize;
            let buffer = self.buffer.as_ref().expect("buffer-backed reader");
            if start + len > self.buffer_limit {
                return Err(Error::Truncated("user header overruns buffer".into()));
            }
            Ok(buffer.as_bytes()[start..start + len].to_vec())
        }
    }

    fn extract_dictionary_and_first_event(&mut self) -> Result<()> {
        if self.dict_extracted {
            return Ok(());
        }
        self.dict_extracted = true;

        let (has_dict, has_first) = (self.has_dictionary(), self.has_first_event());
        if !has_dict && !has_first {
            return Ok(());
        }
        let user_header = self.read_user_header()?;
        // 8 bytes is below any framed record; nothing to parse
        if user_header.len() < HEADER_SIZE_BYTES {
            return Ok(());
        }

        // The user-header region is itself framed as a record.
        let mut record = RecordInput::new(self.byte_order);
        record.read_from_buffer(&user_header, 0)?;

        let mut index = 0;
        if has_dict {
            if let Some(bytes) = record.get_event(index) {
                let text: String = bytes
                    .iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect();
                self.dictionary_xml = Some(text);
            }
            index += 1;
        }
        if has_first {
            self.first_event = record.get_event(index).map(|b| b.to_vec());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Node handle of event `i`. Only buffer-backed readers build nodes.
    pub fn get_event_node(&self, i: usize) -> Option<NodeId> {
        self.event_nodes.get(i).copied()
    }

    pub fn node(&self, id: NodeId) -> Result<&EvioNode> {
        self.arena.get(id)
    }

    /// The structure's bytes, header included.
    pub fn node_bytes(&self, id: NodeId) -> Result<&[u8]> {
        let node = self.arena.get(id)?;
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("nodes require a buffer-backed reader".into()))?;
        Ok(&buffer.as_bytes()[node.pos..node.pos + node.total_bytes()])
    }

    /// The structure's payload bytes.
    pub fn node_data(&self, id: NodeId) -> Result<&[u8]> {
        let node = self.arena.get(id)?;
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("nodes require a buffer-backed reader".into()))?;
        Ok(&buffer.as_bytes()[node.data_pos..node.data_pos + node.data_bytes()])
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Remove a substructure from its event: shift the following bytes
    /// down, shrink every ancestor's length word, patch the owning record
    /// header and index entry, and rescan. All outstanding nodes become
    /// obsolete; the removed structure's bytes are returned.
    pub fn remove_structure(&mut self, id: NodeId) -> Result<Vec<u8>> {
        if self.from_file {
            return Err(Error::InvalidConfig(
                "structural mutation requires a buffer-backed reader".into(),
            ));
        }
        let node = self.arena.get(id)?;
        if node.is_event() {
            return Err(Error::InvalidConfig(
                "cannot remove an event root, only substructures".into(),
            ));
        }

        let removed_pos = node.pos;
        let removed_bytes = node.total_bytes();
        let record_pos = node.record_pos;
        let place = node.place;

        // Ancestor header positions, gathered before any byte moves.
        let mut ancestors: Vec<(usize, DataType)> = Vec::new();
        let mut cursor = node.parent_id();
        while let Some(pid) = cursor {
            let parent = self.arena.get(pid)?;
            ancestors.push((parent.pos, parent.kind));
            cursor = parent.parent_id();
        }

        let index_slot = self.record_index_slot(record_pos, place)?;
        let order = self.byte_order;
        let new_limit = self.buffer_limit - removed_bytes;

        let buffer = self.buffer.as_mut().expect("buffer-backed reader");
        let data = buffer.as_bytes_mut();
        let cut = data[removed_pos..removed_pos + removed_bytes].to_vec();

        // 1. close the gap
        data.copy_within(removed_pos + removed_bytes..self.buffer_limit, removed_pos);

        // 2. shrink ancestors
        let removed_words = (removed_bytes / 4) as u32;
        for (pos, kind) in ancestors {
            shift_length_word(data, pos, kind, order, removed_words, false);
        }

        // 3. patch the record header and the event's index entry
        let w0 = order.read_u32(&data[record_pos..]);
        order.write_u32(&mut data[record_pos..], w0 - removed_words);
        let w8 = order.read_u32(&data[record_pos + 32..]);
        order.write_u32(&mut data[record_pos + 32..], w8 - removed_bytes as u32);
        let slot_pos = record_pos + HEADER_SIZE_BYTES + 4 * index_slot;
        let entry = order.read_u32(&data[slot_pos..]);
        order.write_u32(&mut data[slot_pos..], entry - removed_bytes as u32);

        buffer.set_limit(new_limit).expect("limit shrinks");
        self.buffer_limit = new_limit;

        // 4. rescan; old handles stay observably obsolete
        self.arena.mark_all_obsolete();
        self.record_loaded = false;
        self.scan_uncompressed_buffer()?;
        debug!(removed_bytes, "removed structure and rescanned buffer");
        Ok(cut)
    }

    /// Append a serialized structure to the end of event `event_ordinal`'s
    /// payload, growing the event, the record header, and the index entry,
    /// then rescan. All outstanding nodes become obsolete.
    pub fn add_structure(&mut self, event_ordinal: usize, add: &[u8]) -> Result<()> {
        if self.from_file {
            return Err(Error::InvalidConfig(
                "structural mutation requires a buffer-backed reader".into(),
            ));
        }
        if add.is_empty() || add.len() % 4 != 0 {
            return Err(Error::InvalidConfig(format!(
                "added structure must be a whole number of words, got {} bytes",
                add.len()
            )));
        }
        let event_id = *self.event_nodes.get(event_ordinal).ok_or_else(|| {
            Error::InvalidConfig(format!("no event at ordinal {event_ordinal}"))
        })?;
        let event = self.arena.get(event_id)?;
        let insert_pos = event.pos + event.total_bytes();
        let event_pos = event.pos;
        let record_pos = event.record_pos;
        let place = event.place;

        let index_slot = self.record_index_slot(record_pos, place)?;
        let order = self.byte_order;
        let added_bytes = add.len();
        let added_words = (added_bytes / 4) as u32;

        // splice into the backing storage
        let buffer = self.buffer.take().expect("buffer-backed reader");
        let offset = self.buffer_offset;
        let mut data = buffer.into_vec();
        data.truncate(self.buffer_limit);
        data.splice(insert_pos..insert_pos, add.iter().copied());

        // grow the event, the record header, and the index entry
        shift_length_word(&mut data, event_pos, DataType::Bank, order, added_words, true);
        let w0 = order.read_u32(&data[record_pos..]);
        order.write_u32(&mut data[record_pos..], w0 + added_words);
        let w8 = order.read_u32(&data[record_pos + 32..]);
        order.write_u32(&mut data[record_pos + 32..], w8 + added_bytes as u32);
        let slot_pos = record_pos + HEADER_SIZE_BYTES + 4 * index_slot;
        let entry = order.read_u32(&data[slot_pos..]);
        order.write_u32(&mut data[slot_pos..], entry + added_bytes as u32);

        let new_limit = data.len();
        let mut rebuilt = ByteBuffer::wrap(data);
        rebuilt.set_order(order);
        rebuilt.set_position(offset).expect("offset within data");
        self.buffer = Some(rebuilt);
        self.buffer_limit = new_limit;

        self.arena.mark_all_obsolete();
        self.record_loaded = false;
        self.scan_uncompressed_buffer()?;
        debug!(added_bytes, event_ordinal, "added structure and rescanned buffer");
        Ok(())
    }

    /// Index of `place` (a global event ordinal) within the record starting
    /// at `record_pos`.
    fn record_index_slot(&self, record_pos: usize, place: usize) -> Result<usize> {
        let mut first_ordinal = 0usize;
        for rp in &self.record_positions {
            if rp.position as usize == record_pos {
                return Ok(place - first_ordinal);
            }
            first_ordinal += rp.event_count as usize;
        }
        Err(Error::Truncated(format!(
            "no record at position {record_pos}"
        )))
    }

    // ------------------------------------------------------------------
    // File scanning
    // ------------------------------------------------------------------

    fn scan_file(&mut self) -> Result<()> {
        let mut head = [0u8; HEADER_SIZE_BYTES];
        {
            let file = self.file.as_mut().expect("file-backed reader");
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut head).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::Truncated("file too small for a file header".into())
                } else {
                    Error::Io(e)
                }
            })?;
        }
        let fh = FileHeader::read(&head, ByteOrder::LittleEndian)?;
        self.byte_order = fh.byte_order;
        self.version = fh.version;
        self.input_record = RecordInput::new(fh.byte_order);

        let first_record_pos = fh.first_record_position();

        let mut indexed = false;
        if !self.options.force_scan {
            if fh.has_trailer_with_index && fh.trailer_position > 0 {
                match self.read_trailer_index(&fh) {
                    Ok(pairs) => {
                        self.apply_index_pairs(first_record_pos, &pairs);
                        indexed = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "unusable trailer index, falling back to scan");
                    }
                }
            } else if fh.index_length >= 8 {
                let pairs = self.read_file_header_index(&fh)?;
                self.apply_index_pairs(first_record_pos, &pairs);
                indexed = true;
            }
        }
        self.file_header = Some(fh);
        if !indexed {
            self.force_scan_file(first_record_pos)?;
        }

        // First record header fixes the compression flag for the stream.
        if let Some(first) = self.record_positions.first().copied() {
            let file = self.file.as_mut().expect("file-backed reader");
            file.seek(SeekFrom::Start(first.position))?;
            let mut rec_head = [0u8; HEADER_SIZE_BYTES];
            file.read_exact(&mut rec_head)?;
            let rh = RecordHeader::read(&rec_head, self.byte_order)?;
            self.compressed = rh.is_compressed();
            self.first_record_header = Some(rh);
        }

        debug!(
            records = self.record_positions.len(),
            events = self.event_index.max_events(),
            order = ?self.byte_order,
            "scanned file"
        );
        Ok(())
    }

    fn read_trailer_index(&mut self, fh: &FileHeader) -> Result<Vec<(u32, u32)>> {
        let file = self.file.as_mut().expect("file-backed reader");
        file.seek(SeekFrom::Start(fh.trailer_position))?;
        let mut head = [0u8; HEADER_SIZE_BYTES];
        file.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Truncated("trailer position past end of file".into())
            } else {
                Error::Io(e)
            }
        })?;
        let trailer = RecordHeader::read(&head, fh.byte_order)?;
        if !trailer.header_type.is_trailer() && !trailer.is_last_record {
            return Err(Error::Truncated(
                "record at trailer position is not a trailer".into(),
            ));
        }

        let mut raw = vec![0u8; trailer.index_length as usize];
        file.read_exact(&mut raw)?;
        Ok(raw
            .chunks_exact(8)
            .map(|pair| {
                (
                    fh.byte_order.read_u32(&pair[0..4]),
                    fh.byte_order.read_u32(&pair[4..8]),
                )
            })
            .collect())
    }

    fn read_file_header_index(&mut self, fh: &FileHeader) -> Result<Vec<(u32, u32)>> {
        let file = self.file.as_mut().expect("file-backed reader");
        file.seek(SeekFrom::Start(fh.header_bytes() as u64))?;
        let mut raw = vec![0u8; fh.index_length as usize];
        file.read_exact(&mut raw)?;
        Ok(raw
            .chunks_exact(8)
            .map(|pair| {
                (
                    fh.byte_order.read_u32(&pair[0..4]),
                    fh.byte_order.read_u32(&pair[4..8]),
                )
            })
            .collect())
    }

    fn apply_index_pairs(&mut self, first_record_pos: u64, pairs: &[(u32, u32)]) {
        self.record_positions.clear();
        self.event_index.clear();
        let mut pos = first_record_pos;
        for &(length, event_count) in pairs {
            self.record_positions.push(RecordPosition {
                position: pos,
                length,
                event_count,
            });
            self.event_index.add_event_count(event_count);
            pos += length as u64;
        }
    }

    /// Walk records linearly by their length words.
    fn force_scan_file(&mut self, first_record_pos: u64) -> Result<()> {
        self.record_positions.clear();
        self.event_index.clear();

        let file = self.file.as_mut().expect("file-backed reader");
        let mut pos = first_record_pos;
        let mut expected = 1u32;
        let mut head = [0u8; HEADER_SIZE_BYTES];

        while pos + HEADER_SIZE_BYTES as u64 <= self.file_size {
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut head)?;
            let header = RecordHeader::read(&head, self.byte_order)?;
            if header.header_type.is_trailer() {
                break;
            }
            if self.options.check_record_number_sequence {
                if header.record_number != expected {
                    return Err(Error::BadSequence {
                        expected,
                        found: header.record_number,
                    });
                }
                expected += 1;
            }
            let length = header.record_bytes() as u64;
            if length < HEADER_SIZE_BYTES as u64 || pos + length > self.file_size {
                return Err(Error::Truncated(format!(
                    "record at offset {pos} claims {length} bytes of {} in file",
                    self.file_size
                )));
            }
            self.record_positions.push(RecordPosition {
                position: pos,
                length: length as u32,
                event_count: header.entries,
            });
            self.event_index.add_event_count(header.entries);
            if header.is_last_record {
                break;
            }
            pos += length;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Buffer scanning
    // ------------------------------------------------------------------

    fn scan_buffer(&mut self) -> Result<()> {
        let offset = self.buffer_offset;
        let first = {
            let buffer = self.buffer.as_ref().expect("buffer-backed reader");
            RecordHeader::read(&buffer.as_bytes()[offset..self.buffer_limit], buffer.order())?
        };
        self.byte_order = first.byte_order;
        self.version = first.version;
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.set_order(first.byte_order);
        }
        self.input_record = RecordInput::new(first.byte_order);

        if first.is_compressed() {
            self.compressed = true;
            self.expand_compressed_buffer()?;
        }
        self.scan_uncompressed_buffer()
    }

    /// Expand every record of a compressed buffer into its canonical
    /// uncompressed image. If the existing buffer can hold the expansion it
    /// is reused (staging then copy-back); otherwise a larger buffer
    /// replaces it.
    fn expand_compressed_buffer(&mut self) -> Result<()> {
        let offset = self.buffer_offset;
        let order = self.byte_order;

        // Headers-only walk for total uncompressed size.
        let (total_uncompressed, _records) = {
            let buffer = self.buffer.as_ref().expect("buffer-backed reader");
            let data = &buffer.as_bytes()[..self.buffer_limit];
            let mut pos = offset;
            let mut total = 0usize;
            let mut records = 0usize;
            loop {
                if pos + HEADER_SIZE_BYTES > data.len() {
                    break;
                }
                let h = RecordHeader::read(&data[pos..], order)?;
                total += h.header_bytes()
                    + h.index_length as usize
                    + padded4(h.user_header_length as usize)
                    + padded4(h.data_length as usize);
                records += 1;
                pos += h.record_bytes();
                if h.is_last_record {
                    break;
                }
            }
            (total, records)
        };

        let mut staging = Vec::with_capacity(offset + total_uncompressed);
        {
            let buffer = self.buffer.as_ref().expect("buffer-backed reader");
            let data = &buffer.as_bytes()[..self.buffer_limit];
            // bytes ahead of the scan region are preserved as-is
            staging.extend_from_slice(&data[..offset]);
            let mut pos = offset;
            loop {
                if pos + HEADER_SIZE_BYTES > data.len() {
                    break;
                }
                let (header, consumed) =
                    RecordInput::uncompress_record(order, data, pos, &mut staging)?;
                pos += consumed;
                if header.is_last_record {
                    break;
                }
            }
        }

        let expanded_limit = staging.len();
        let buffer = self.buffer.as_mut().expect("buffer-backed reader");
        if buffer.capacity() >= expanded_limit {
            // caller's buffer stays canonical
            buffer.as_bytes_mut()[..expanded_limit].copy_from_slice(&staging);
            buffer.clear();
            buffer.set_limit(expanded_limit).expect("fits capacity");
            buffer.set_position(offset).expect("offset below limit");
        } else {
            let mut replacement = ByteBuffer::wrap(staging);
            replacement.set_order(order);
            replacement.set_position(offset).expect("offset below limit");
            *buffer = replacement;
        }
        self.buffer_limit = expanded_limit;
        debug!(
            expanded_bytes = expanded_limit - offset,
            "expanded compressed buffer"
        );
        Ok(())
    }

    /// Index every record, event, and substructure of the (uncompressed)
    /// buffer region.
    fn scan_uncompressed_buffer(&mut self) -> Result<()> {
        self.record_positions.clear();
        self.event_index.clear();
        self.event_nodes.clear();

        let buffer = self.buffer.as_ref().expect("buffer-backed reader");
        let data = &buffer.as_bytes()[..self.buffer_limit];
        let order = self.byte_order;

        let mut pos = self.buffer_offset;
        let mut expected = 1u32;
        let mut place = 0usize;
        let mut first = true;

        while pos + HEADER_SIZE_BYTES <= data.len() {
            let header = RecordHeader::read(&data[pos..], order)?;
            if header.header_type.is_trailer() {
                break;
            }
            if first {
                self.first_record_header = Some(header.clone());
                first = false;
            }
            if self.options.check_record_number_sequence {
                if header.record_number != expected {
                    return Err(Error::BadSequence {
                        expected,
                        found: header.record_number,
                    });
                }
                expected += 1;
            }

            let length = header.record_bytes();
            if length < HEADER_SIZE_BYTES || pos + length > data.len() {
                return Err(Error::Truncated(format!(
                    "record at offset {pos} claims {length} bytes, buffer holds {}",
                    data.len() - pos
                )));
            }

            self.record_positions.push(RecordPosition {
                position: pos as u64,
                length: length as u32,
                event_count: header.entries,
            });
            self.event_index.add_event_count(header.entries);

            // index the events through their nodes
            let index_start = pos + header.header_bytes();
            let mut event_pos = index_start
                + header.index_length as usize
                + padded4(header.user_header_length as usize);
            for e in 0..header.entries as usize {
                let id = self
                    .arena
                    .extract_event_node(data, order, pos, event_pos, place)?;
                self.event_nodes.push(id);
                let event_len = order.read_u32(&data[index_start + 4 * e..]) as usize;
                event_pos += event_len;
                place += 1;
            }

            if header.is_last_record {
                break;
            }
            pos += length;
        }

        debug!(
            records = self.record_positions.len(),
            events = place,
            "scanned buffer"
        );
        Ok(())
    }
}

/// Adjust the length word of a structure header in place.
fn shift_length_word(
    data: &mut [u8],
    pos: usize,
    kind: DataType,
    order: ByteOrder,
    words: u32,
    grow: bool,
) {
    let w0 = order.read_u32(&data[pos..]);
    let updated = if kind.is_bank() {
        if grow {
            w0 + words
        } else {
            w0 - words
        }
    } else {
        // segment / tagsegment keep their length in the low 16 bits
        let len = w0 & 0xFFFF;
        let len = if grow { len + words } else { len - words };
        (w0 & 0xFFFF_0000) | (len & 0xFFFF)
    };
    order.write_u32(&mut data[pos..], updated);
}
