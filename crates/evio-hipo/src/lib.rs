//! EVIO-6 / HIPO record layer.
//!
//! This crate implements the record pipeline of the EVIO version 6 binary
//! format used by nuclear-physics data acquisition: bit-exact record and
//! file headers with endian detection, record building and reading with
//! whole-payload compression, a file reader with a global event index, a
//! lazy zero-copy structure index with in-place mutation, and two writers —
//! single-threaded and ring-based multi-threaded — that produce identical
//! bytes.
//!
//! ```text
//! write path:  caller ─▶ Writer / RingWriter ─▶ RecordOutput ─▶ FileSink ─▶ disk
//! read path:   file/buffer ─▶ Reader ─▶ RecordInput ─▶ events / EvioNode
//! ```
//!
//! Structure-level machinery (buffers, bank headers, the endian swapper)
//! lives in `evio-core`.

pub mod codec;
pub mod error;
pub mod event_index;
pub mod header;
pub mod node;
pub mod reader;
pub mod record;
pub mod writer;

pub use codec::{Codec, CompressionType};
pub use error::{Error, Result};
pub use event_index::FileEventIndex;
pub use header::{FileHeader, HeaderType, RecordHeader};
pub use node::{EvioNode, NodeId};
pub use reader::{Reader, ReaderOptions, RecordPosition};
pub use record::{RecordInput, RecordOutput};
pub use writer::ring::RingWriter;
pub use writer::{Writer, WriterConfig};
