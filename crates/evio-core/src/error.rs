//! Error types for the structure layer.
//!
//! Buffer accessors fail with `OutOfBounds`, structure walks fail with
//! `BadLength` when a child's length word is inconsistent with its parent,
//! and the composite-format machinery fails with `BadFormat` when a format
//! string cannot be parsed or does not line up with the data it describes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("access of {len} bytes at position {pos} exceeds bound {bound}")]
    OutOfBounds { pos: usize, len: usize, bound: usize },

    #[error("bad structure length: {0}")]
    BadLength(String),

    #[error("bad composite format: {0}")]
    BadFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;
