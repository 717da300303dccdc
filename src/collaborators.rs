//! External collaborators this crate depends on but does not own: the
//! segment allocator, the byte-handler (compression/encryption) pipeline,
//! the record serializer, and the intent log (spec §6 "Collaborator
//! contracts"). Grounded on how the teacher's buffer pool depends on
//! `storage::disk::DiskManager` through a narrow interface without owning
//! disk I/O itself — here those collaborators are traits because this
//! crate ships no concrete WAL, no concrete encryption, and no concrete
//! record format.

use bytes::Bytes;

use crate::common::{NodeKey, PageKey};
use crate::error::Result;

/// A block of memory handed out by the allocator pool. Concrete allocators
/// may back this with a pooled arena; the page layer only requires the
/// byte view and the ability to hand ownership back on release.
pub trait MemorySegment: AsRef<[u8]> + AsMut<[u8]> + Send {
    fn len(&self) -> usize {
        self.as_ref().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemorySegment for Box<[u8]> {}

/// `allocate(size) -> segment`, `release(segment)`. Must return zeroed
/// memory, or the core zeros before use.
pub trait SegmentAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> Box<[u8]>;
    fn release(&self, segment: Box<[u8]>) {
        drop(segment);
    }
}

/// Simple allocator that zero-fills a fresh heap allocation per request.
/// Stands in for a pooled native-memory arena allocator in tests and for
/// callers that don't need pooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapSegmentAllocator;

impl SegmentAllocator for HeapSegmentAllocator {
    fn allocate(&self, size: usize) -> Box<[u8]> {
        vec![0u8; size].into_boxed_slice()
    }
}

/// Ownership of a decompressed buffer handed back by the byte-handler
/// pipeline on decode. If `transfer_ownership` is called, the returned
/// releaser must run exactly once, when the page that adopted the buffer
/// closes.
pub struct DecompressionResult {
    pub bytes: Bytes,
    releaser: Option<Box<dyn FnOnce() + Send>>,
}

impl DecompressionResult {
    pub fn new(bytes: Bytes, releaser: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            bytes,
            releaser: Some(releaser),
        }
    }

    pub fn owned(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            releaser: None,
        }
    }

    /// Hand over the one-shot releaser closure. Returns `None` if this
    /// result carries no backing buffer to release (e.g. a freshly
    /// allocated, non-zero-copy decode).
    pub fn transfer_ownership(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        self.releaser.take()
    }
}

/// `compress(segment) -> segment` / streaming variant;
/// `decompress(bytes) -> DecompressionResult`.
pub trait ByteHandlerPipeline: Send + Sync {
    fn compress(&self, plain: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, compressed: &[u8]) -> Result<DecompressionResult>;

    /// Whether this pipeline can hand back a segment-backed zero-copy
    /// result for the given input, versus requiring a streamed copy.
    fn supports_zero_copy(&self) -> bool {
        false
    }
}

/// Pass-through pipeline (no compression). Used by default and in tests;
/// a real deployment plugs in an LZ4/Zstd/encryption pipeline here without
/// this crate needing to know which.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPipeline;

impl ByteHandlerPipeline for IdentityPipeline {
    fn compress(&self, plain: &[u8]) -> Result<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> Result<DecompressionResult> {
        Ok(DecompressionResult::owned(compressed.to_vec()))
    }
}

/// `serialize(record, sink)`; `deserialize(source, nodeKey) -> record`.
/// Called per-slot at commit by the owning system's concrete record
/// (node) type; this crate only needs the byte-length contract to decide
/// when a record must be promoted to an overflow page.
pub trait RecordCodec<R> {
    fn serialize(&self, record: &R, sink: &mut Vec<u8>) -> Result<()>;
    fn deserialize(&self, source: &[u8], node_key: NodeKey) -> Result<R>;
}

/// `put(ref, container)`; `get(ref) -> container`. Opaque holder for a
/// (working, base) page pair, owned by the write-ahead intent log.
pub trait IntentLog<C>: Send + Sync {
    fn put(&self, key: PageKey, container: C);
    fn get(&self, key: PageKey) -> Option<C>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_allocator_zero_fills() {
        let alloc = HeapSegmentAllocator;
        let seg = alloc.allocate(16);
        assert!(seg.iter().all(|&b| b == 0));
        assert_eq!(seg.len(), 16);
    }

    #[test]
    fn identity_pipeline_round_trips() {
        let pipeline = IdentityPipeline;
        let data = b"hello page".to_vec();
        let compressed = pipeline.compress(&data).unwrap();
        let mut result = pipeline.decompress(&compressed).unwrap();
        assert_eq!(result.bytes.as_ref(), data.as_slice());
        assert!(result.transfer_ownership().is_none());
    }
}
