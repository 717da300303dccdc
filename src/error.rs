//! Error taxonomy for the page layer.
//!
//! Mirrors the teacher's flat `thiserror` enum (one variant per failure
//! category, each carrying just enough context to act on) rather than a
//! hierarchy of nested error types.

use thiserror::Error;

use crate::common::NodeKey;

#[derive(Error, Debug)]
pub enum PageError {
    /// A key or slot index falls outside its addressable bound. `bound` is
    /// exclusive: valid values satisfy `min <= value < bound`.
    #[error("value {value} out of range [{min}, {bound})")]
    OutOfRange { value: u64, min: u64, bound: u64 },

    /// Generic page-body corruption detected during decode (e.g. a
    /// bit-packed read past the end of its buffer).
    #[error("corrupt page: {reason}")]
    CorruptPage { reason: String },

    /// A populated slot's directory entry fails its bounds check
    /// (spec §4.4 `getSlot`); carries a hex dump of the bytes around the
    /// offending offset.
    #[error("corrupt slot: {reason} (near offset {offset}): {hex_dump}")]
    CorruptSlot {
        offset: usize,
        reason: String,
        hex_dump: String,
    },

    #[error("page is full: {reason}")]
    PageFull { reason: String },

    #[error("bitmap chunk is in Delta mode; combine with its base before querying membership")]
    DeltaMustBeCombined,

    #[error("operation {operation} not valid on a deleted (tombstone) chunk")]
    Deleted { operation: String },

    #[error("guard misuse: {reason}")]
    GuardMisuse { reason: String },

    #[error("unsupported binary encoding version {version} for page kind tag {tag}")]
    VersionUnsupported { tag: u8, version: u8 },

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("overflow entry missing for node key {0:?}")]
    OverflowMissing(NodeKey),

    #[error("no child index matches the search key")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, PageError>;

/// Render a hex dump of the bytes surrounding `offset`, for the
/// `CorruptPage` report contract ("a hex dump of the surrounding 64 bytes").
pub fn hex_dump_around(buf: &[u8], offset: usize, window: usize) -> String {
    let start = offset.saturating_sub(window / 2).min(buf.len());
    let end = (start + window).min(buf.len());
    buf[start..end]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
