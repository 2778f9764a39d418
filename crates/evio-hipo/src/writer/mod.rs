//! Write path: configuration, file sink, and the single-threaded writer.
//!
//! [`Writer`] appends events into a [`RecordOutput`] until a cap is hit,
//! then builds the record and hands the bytes to a [`FileSink`]. The sink
//! owns everything file-shaped: filename rendering, the file header (with
//! optional dictionary / first-event user-header record), size-based
//! splitting, record numbering, the trailer, and append mode. The ring
//! writer in [`ring`] drives the same sink from its I/O thread, so
//! single-threaded and ring output are byte-identical.

pub mod ring;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use evio_core::{ByteBuffer, ByteOrder};
use tracing::{debug, info};

use crate::codec::CompressionType;
use crate::error::{Error, Result};
use crate::header::{
    build_trailer, pad4, FileHeader, RecordHeader, HEADER_SIZE_BYTES,
};
use crate::node::NodeId;
use crate::reader::Reader;
use crate::record::RecordOutput;

/// Writer configuration. Field semantics follow the on-disk format
/// contract; `validate()` is called by every writer constructor.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub byte_order: ByteOrder,
    pub compression: CompressionType,
    /// Cap on a record's uncompressed payload bytes (0 = default 8 MiB).
    pub max_record_bytes: usize,
    /// Cap on events per record (0 = default 1M).
    pub max_event_count: usize,
    /// Split files at this many bytes (0 = never split).
    pub split_size: u64,
    pub run_number: u32,
    pub stream_id: u32,
    pub stream_count: u32,
    /// First split number used in filenames.
    pub split_number: u32,
    pub split_increment: u32,
    /// Compression worker threads for the ring writer.
    pub comp_threads: usize,
    /// Ring slot count for the ring writer; must be a power of two.
    pub ring_size: usize,
    /// Reopen an existing file and continue it.
    pub append: bool,
    pub overwrite_ok: bool,
    /// Write a trailer record on close.
    pub add_trailer: bool,
    /// Write the file-wide record index into the trailer (implies a
    /// trailer).
    pub add_trailer_index: bool,
    /// Restart record numbering at 1 in each split file instead of
    /// continuing monotonically.
    pub reset_record_number_per_split: bool,
    /// XML dictionary written at the top of every split's user header.
    pub dictionary_xml: Option<String>,
    /// Event written into every split's user header so each split is
    /// self-contained.
    pub first_event: Option<Vec<u8>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            compression: CompressionType::None,
            max_record_bytes: 0,
            max_event_count: 0,
            split_size: 0,
            run_number: 0,
            stream_id: 0,
            stream_count: 1,
            split_number: 0,
            split_increment: 1,
            comp_threads: 2,
            ring_size: 16,
            append: false,
            overwrite_ok: true,
            add_trailer: false,
            add_trailer_index: false,
            reset_record_number_per_split: false,
            dictionary_xml: None,
            first_event: None,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.ring_size.is_power_of_two() || self.ring_size < 4 {
            return Err(Error::InvalidConfig(format!(
                "ring size {} must be a power of two >= 4",
                self.ring_size
            )));
        }
        if self.comp_threads < 1 || self.comp_threads > self.ring_size - 2 {
            return Err(Error::InvalidConfig(format!(
                "comp threads {} must be in 1..={}",
                self.comp_threads,
                self.ring_size - 2
            )));
        }
        if self.split_increment == 0 {
            return Err(Error::InvalidConfig("split increment must be >= 1".into()));
        }
        if self.append && self.split_size > 0 {
            return Err(Error::InvalidConfig(
                "append mode cannot be combined with file splitting".into(),
            ));
        }
        Ok(())
    }

    fn wants_trailer(&self) -> bool {
        self.add_trailer || self.add_trailer_index
    }
}

/// Substitute run / split / stream specifiers into a filename template.
///
/// Up to three `%d` / `%x` style specifiers are filled in order with the
/// run number, split number, and stream id. A width without a leading zero
/// is normalised to zero-padded so filenames never contain spaces. When the
/// writer needs a distinguisher the template lacks, it is appended as
/// `.streamId` / `.splitN`.
pub(crate) fn render_file_name(
    template: &str,
    run: u32,
    split: u32,
    stream_id: u32,
    stream_count: u32,
    splitting: bool,
) -> String {
    let values = [run, split, stream_id];
    let mut used = 0usize;
    let mut out = String::with_capacity(template.len() + 8);

    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut width = String::new();
        while let Some(d) = chars.peek().copied() {
            if d.is_ascii_digit() {
                width.push(d);
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek().copied() {
            Some(conv @ ('d' | 'x')) if used < values.len() => {
                chars.next();
                let value = values[used];
                used += 1;
                let w: usize = width.parse().unwrap_or(0);
                let rendered = if conv == 'x' {
                    format!("{value:0w$x}")
                } else {
                    format!("{value:0w$}")
                };
                out.push_str(&rendered);
            }
            _ => {
                // not a specifier we consume; emit verbatim
                out.push('%');
                out.push_str(&width);
            }
        }
    }

    // Missing distinguishers are appended so parallel streams and splits
    // never collide.
    if stream_count > 1 && used < 3 {
        out.push_str(&format!(".{stream_id}"));
    }
    if splitting && used < 2 {
        out.push_str(&format!(".{split}"));
    }
    out
}

/// Build the user-header record carrying the dictionary and first event.
/// Returns an empty vec when neither is configured.
fn build_user_header_record(config: &WriterConfig) -> Result<Vec<u8>> {
    if config.dictionary_xml.is_none() && config.first_event.is_none() {
        return Ok(Vec::new());
    }
    let mut record = RecordOutput::new(config.byte_order, 0, 0, CompressionType::None);
    if let Some(xml) = &config.dictionary_xml {
        // dictionary text is stored null-padded to a word boundary
        let mut bytes = xml.as_bytes().to_vec();
        bytes.resize(bytes.len() + pad4(bytes.len()), 0);
        record.try_add_event(&bytes);
    }
    if let Some(event) = &config.first_event {
        record.try_add_event(event);
    }
    record.build()?;
    Ok(record.as_bytes().to_vec())
}

/// Owns the output file(s): header, user-header record, splitting, record
/// numbering, and trailer. The record number word of every record is
/// patched here, which keeps on-disk bytes identical no matter which
/// thread built the record.
pub(crate) struct FileSink {
    config: WriterConfig,
    template: String,
    order: ByteOrder,

    file: Option<File>,
    file_header: FileHeader,
    current_path: PathBuf,
    split_number: u32,
    bytes_written: u64,
    records_in_file: u32,
    record_lengths: Vec<(u32, u32)>,
    next_record_number: u32,
    user_header_record: Vec<u8>,
}

impl FileSink {
    pub(crate) fn new(template: &str, config: WriterConfig) -> Result<FileSink> {
        let user_header_record = build_user_header_record(&config)?;
        let mut sink = FileSink {
            order: config.byte_order,
            template: template.to_string(),
            split_number: config.split_number,
            config,
            file: None,
            file_header: FileHeader::new(),
            current_path: PathBuf::new(),
            bytes_written: 0,
            records_in_file: 0,
            record_lengths: Vec::new(),
            next_record_number: 1,
            user_header_record,
        };
        if sink.config.append && Path::new(&sink.render_name()).exists() {
            sink.open_append()?;
        } else {
            sink.open_next()?;
        }
        Ok(sink)
    }

    pub(crate) fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub(crate) fn current_path(&self) -> &Path {
        &self.current_path
    }

    fn render_name(&self) -> String {
        render_file_name(
            &self.template,
            self.config.run_number,
            self.split_number,
            self.config.stream_id,
            self.config.stream_count,
            self.config.split_size > 0,
        )
    }

    fn open_next(&mut self) -> Result<()> {
        let path = PathBuf::from(self.render_name());
        if path.exists() && !self.config.overwrite_ok {
            return Err(Error::InvalidConfig(format!(
                "{} exists and overwriting is disabled",
                path.display()
            )));
        }
        let mut file = File::create(&path)?;

        let mut header = FileHeader::new();
        header.file_number = self.split_number;
        header.user_header_length = self.user_header_record.len() as u32;
        header.has_dictionary = self.config.dictionary_xml.is_some();
        header.has_first_event = self.config.first_event.is_some();
        header.byte_order = self.order;

        let mut image = vec![0u8; HEADER_SIZE_BYTES];
        header.write(&mut image, self.order)?;
        image.extend_from_slice(&self.user_header_record);
        image.resize(image.len() + pad4(self.user_header_record.len()), 0);
        file.write_all(&image)?;

        self.bytes_written = image.len() as u64;
        self.records_in_file = 0;
        self.record_lengths.clear();
        if self.config.reset_record_number_per_split {
            self.next_record_number = 1;
        }
        self.file_header = header;
        self.file = Some(file);
        self.current_path = path;
        info!(path = %self.current_path.display(), split = self.split_number, "opened output file");
        Ok(())
    }

    /// Reopen an existing file: honor its byte order regardless of the
    /// configured one, drop any old trailer, and continue record numbering
    /// where the file left off.
    fn open_append(&mut self) -> Result<()> {
        let path = PathBuf::from(self.render_name());
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut head = [0u8; HEADER_SIZE_BYTES];
        file.read_exact(&mut head)?;
        let mut header = FileHeader::read(&head, self.order)?;
        self.order = header.byte_order;

        // walk existing records to find the end and the numbering
        let file_size = file.metadata()?.len();
        let mut pos = header.first_record_position();
        let mut last_number = 0u32;
        self.record_lengths.clear();
        self.records_in_file = 0;
        while pos + HEADER_SIZE_BYTES as u64 <= file_size {
            file.seek(SeekFrom::Start(pos))?;
            let mut rec_head = [0u8; HEADER_SIZE_BYTES];
            file.read_exact(&mut rec_head)?;
            let rh = RecordHeader::read(&rec_head, self.order)?;
            if rh.header_type.is_trailer() {
                break;
            }
            last_number = rh.record_number;
            self.record_lengths
                .push((rh.record_bytes() as u32, rh.entries));
            self.records_in_file += 1;
            pos += rh.record_bytes() as u64;
        }

        // the trailer (if any) is rewritten on close
        file.set_len(pos)?;
        file.seek(SeekFrom::End(0))?;
        header.has_trailer_with_index = false;
        header.trailer_position = 0;

        self.bytes_written = pos;
        self.next_record_number = last_number + 1;
        self.file_header = header;
        self.file = Some(file);
        self.current_path = path;
        info!(
            path = %self.current_path.display(),
            records = self.records_in_file,
            next_record = self.next_record_number,
            order = ?self.order,
            "opened file for append"
        );
        Ok(())
    }

    /// Write one built record, splitting the file first when the size cap
    /// would be crossed. The record number word is patched in place.
    pub(crate) fn write_record_bytes(&mut self, record: &mut [u8], entries: u32) -> Result<()> {
        if self.file.is_none() {
            self.open_next()?;
        }
        let len = record.len() as u64;
        if self.config.split_size > 0
            && self.records_in_file > 0
            && self.bytes_written + len > self.config.split_size
        {
            debug!(
                bytes_written = self.bytes_written,
                record_bytes = len,
                split_size = self.config.split_size,
                "record would cross split boundary, rolling file"
            );
            self.close_current()?;
            self.open_next()?;
        }

        self.order
            .write_u32(&mut record[4..8], self.next_record_number);
        self.file
            .as_mut()
            .expect("file opened above")
            .write_all(record)?;

        self.record_lengths.push((record.len() as u32, entries));
        self.records_in_file += 1;
        self.bytes_written += len;
        self.next_record_number += 1;
        Ok(())
    }

    /// Finish the current file: optional trailer, then rewrite the file
    /// header with the final record count and trailer location.
    fn close_current(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        if self.config.wants_trailer() {
            let trailer_position = self.bytes_written;
            let index = self
                .config
                .add_trailer_index
                .then_some(self.record_lengths.as_slice());
            let trailer = build_trailer(self.next_record_number, self.order, index);
            file.write_all(&trailer)?;
            self.bytes_written += trailer.len() as u64;

            self.file_header.trailer_position = trailer_position;
            self.file_header.has_trailer_with_index = self.config.add_trailer_index;
        }

        self.file_header.entries = self.records_in_file;
        let mut image = [0u8; HEADER_SIZE_BYTES];
        self.file_header.write(&mut image, self.order)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&image)?;
        file.flush()?;

        info!(
            path = %self.current_path.display(),
            records = self.records_in_file,
            bytes = self.bytes_written,
            "closed output file"
        );
        self.split_number += self.config.split_increment;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.close_current()
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn split_size(&self) -> u64 {
        self.config.split_size
    }
}

/// Single-threaded writer: append events, split files on size, emit a
/// trailer (with optional index) on close. Also carries the event-level
/// semantics: dictionary and first event are written at the start of every
/// split file, and append mode continues an existing file.
pub struct Writer {
    sink: FileSink,
    record: RecordOutput,
    closed: bool,
}

impl Writer {
    pub fn new(path_template: impl AsRef<str>, config: WriterConfig) -> Result<Writer> {
        config.validate()?;
        let sink = FileSink::new(path_template.as_ref(), config.clone())?;
        // append mode may have flipped the byte order to match the file
        let record = RecordOutput::new(
            sink.byte_order(),
            config.max_event_count,
            config.max_record_bytes,
            config.compression,
        );
        Ok(Writer {
            sink,
            record,
            closed: false,
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.sink.byte_order()
    }

    pub fn current_path(&self) -> &Path {
        self.sink.current_path()
    }

    /// Append one event (serialized bank bytes).
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidConfig("writer is closed".into()));
        }
        // When splitting, flush early so a file boundary can fall between
        // events instead of only between full records.
        let split_size = self.sink.split_size();
        if split_size > 0 && self.record.entries() > 0 {
            let projected = self.sink.bytes_written()
                + HEADER_SIZE_BYTES as u64
                + 4 * (self.record.entries() as u64 + 1)
                + self.record.data_bytes() as u64
                + event.len() as u64;
            if projected > split_size {
                self.flush_record()?;
            }
        }
        if self.record.try_add_event(event) {
            return Ok(());
        }
        self.flush_record()?;
        if !self.record.try_add_event(event) {
            // an empty record accepts any event size
            return Err(Error::InvalidConfig(format!(
                "event of {} bytes rejected by empty record",
                event.len()
            )));
        }
        Ok(())
    }

    /// Append the readable region of a buffer as one event.
    pub fn add_event_buffer(&mut self, event: &ByteBuffer) -> Result<()> {
        self.add_event(event.readable())
    }

    /// Append an already-scanned structure as one event.
    pub fn add_event_node(&mut self, reader: &Reader, node: NodeId) -> Result<()> {
        let bytes = reader.node_bytes(node)?.to_vec();
        self.add_event(&bytes)
    }

    /// Write a caller-built record, after flushing any partial record so
    /// submission order is preserved.
    pub fn write_record(&mut self, record: &mut RecordOutput) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidConfig("writer is closed".into()));
        }
        self.flush_record()?;
        let entries = record.entries() as u32;
        record.build()?;
        self.sink
            .write_record_bytes(record.as_mut_bytes(), entries)
    }

    /// Build and write the current partial record, if any.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_record()
    }

    fn flush_record(&mut self) -> Result<()> {
        if self.record.entries() == 0 {
            return Ok(());
        }
        let entries = self.record.entries() as u32;
        self.record.build()?;
        self.sink
            .write_record_bytes(self.record.as_mut_bytes(), entries)?;
        self.record.reset();
        Ok(())
    }

    /// Flush, write the trailer, and finalize the file header.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_record()?;
        self.sink.close()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "writer close failed in drop");
            }
        }
    }
}
