//! Record-layer error types.
//!
//! Format errors (`BadMagic`, `UnsupportedVersion`, `Truncated`,
//! `BadSequence`) are fatal to the operation that raised them but leave the
//! reader or writer usable. Worker errors in the ring writer are latched and
//! re-raised on the next public call. `ObsoleteNode` marks use of a node
//! handle invalidated by a structural mutation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic word 0x{0:08X}")]
    BadMagic(u32),

    #[error("unsupported evio version {0} (need >= 6)")]
    UnsupportedVersion(u8),

    #[error("truncated data: {0}")]
    Truncated(String),

    #[error("record number out of sequence: expected {expected}, found {found}")]
    BadSequence { expected: u32, found: u32 },

    #[error("node was invalidated by a structural mutation")]
    ObsoleteNode,

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] evio_core::Error),
}

impl Error {
    /// Clone-ish helper for latched worker errors, which may need to be
    /// surfaced more than once.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::BadMagic(m) => Error::BadMagic(*m),
            Error::UnsupportedVersion(v) => Error::UnsupportedVersion(*v),
            Error::Truncated(s) => Error::Truncated(s.clone()),
            Error::BadSequence { expected, found } => Error::BadSequence {
                expected: *expected,
                found: *found,
            },
            Error::ObsoleteNode => Error::ObsoleteNode,
            Error::Codec(s) => Error::Codec(s.clone()),
            Error::InvalidConfig(s) => Error::InvalidConfig(s.clone()),
            Error::Core(e) => Error::Codec(e.to_string()),
        }
    }
}
