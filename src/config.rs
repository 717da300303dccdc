//! Recognized configuration options (spec §6), realized as a concrete
//! struct in the teacher's `Config`/`BufferPoolConfig` style: a plain
//! struct of options with a `Default` impl, passed down to the pieces that
//! need it rather than read from a global.

/// String compression strategy for a leaf page's columnar/string payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCompression {
    None,
    Fsst,
}

/// The fixed 64K-key width of a bitmap chunk range. Encoded per-chunk as an
/// explicit `[rangeStart, rangeEnd)` pair rather than hardcoded everywhere,
/// so a future non-uniform chunk size remains a non-breaking change.
pub const DEFAULT_CHUNK_SIZE: u32 = 65_536;

/// Current binary encoding version this crate's encoders emit. Decoders
/// read the body-local version byte and dispatch; only this one version is
/// understood today.
pub const CURRENT_BINARY_ENCODING_VERSION: u8 = 1;

/// Number of addressable slots in a unified leaf page (spec §3, N = 1024).
pub const DEFAULT_RECORD_CAPACITY: u32 = 1024;

#[derive(Debug, Clone)]
pub struct PageStoreConfig {
    /// Inline DeweyIDs in every record's heap trailer when true; omit
    /// entirely when false.
    pub dewey_ids_stored: bool,

    /// Enables page-local FSST symbol-table construction for string
    /// payloads.
    pub string_compression: StringCompression,

    /// Tracked per page; decoders switch on it. See
    /// [`CURRENT_BINARY_ENCODING_VERSION`].
    pub binary_encoding_version: u8,

    /// Width of a bitmap chunk's key range. Fixed at
    /// [`DEFAULT_CHUNK_SIZE`] today.
    pub chunk_size: u32,

    /// Writes string bytes into a second contiguous region alongside the
    /// record heap, keeping the record heap itself compact.
    pub columnar_strings: bool,

    /// N: the number of addressable slots in a unified leaf page.
    pub record_capacity: u32,

    /// Fragmentation ratio above which a leaf page becomes eligible for
    /// heap compaction (spec P7).
    pub compaction_threshold: f32,

    /// Minimum fractional savings a trial FSST table must demonstrate over
    /// the sample set before it is adopted.
    pub fsst_adoption_threshold: f32,

    /// Minimum number of string samples required before a trial FSST table
    /// is even built.
    pub fsst_min_samples: usize,
}

impl Default for PageStoreConfig {
    fn default() -> Self {
        Self {
            dewey_ids_stored: false,
            string_compression: StringCompression::None,
            binary_encoding_version: CURRENT_BINARY_ENCODING_VERSION,
            chunk_size: DEFAULT_CHUNK_SIZE,
            columnar_strings: false,
            record_capacity: DEFAULT_RECORD_CAPACITY,
            compaction_threshold: 0.25,
            fsst_adoption_threshold: 0.15,
            fsst_min_samples: 16,
        }
    }
}
