//! Record framing: building records for output and reading them back.
//!
//! A record is the unit of on-disk framing and of durability:
//!
//! ```text
//! | RecordHeader (14 x 32-bit words)                      |
//! | event index: entries x u32 (uncompressed event bytes) |
//! | user header, padded to 4 bytes                        |
//! | event payload, padded to 4 bytes;                     |
//! |   possibly compressed as one unit                     |
//! ```
//!
//! [`RecordOutput`] accumulates events until a cap is hit and then builds
//! the wire image in one shot; [`RecordInput`] does the reverse, exposing
//! events by index in O(1) via the index array.

mod input;
mod output;

pub use input::RecordInput;
pub use output::RecordOutput;

/// Default cap on a record's uncompressed payload (bytes).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 8 * 1024 * 1024;

/// Default cap on events per record.
pub const DEFAULT_MAX_EVENT_COUNT: usize = 1_000_000;
