//! EVIO structure layer.
//!
//! Everything below the record framing lives here: the byte-ordered buffer
//! every other layer reads through, the bank/segment/tagsegment header
//! codecs, the payload type codes, and the endian swapper (including the
//! format-driven composite swapper). The record and file layers are in the
//! `evio-hipo` crate.

pub mod buffer;
pub mod composite;
pub mod data_type;
pub mod error;
pub mod order;
pub mod structure;
pub mod swap;

pub use buffer::{ByteBuffer, ByteSlice};
pub use data_type::DataType;
pub use error::{Error, Result};
pub use order::ByteOrder;
pub use structure::{StructureHeader, StructureKind};
