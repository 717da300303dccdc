//! `KeyValueLeafPage` — the unified leaf page (spec §3 "Data model",
//! §4.4). Grounded on `buffer::page_cache::PageBuffer`/`BufferFrame` (a
//! fixed region with a populated/dirty bookkeeping layer sitting beside
//! it) generalized from a fixed 4KB frame to a variable-length
//! bump-allocated heap, and on `index::btree`'s leaf-node slot/heap
//! bookkeeping for the directory-plus-heap split.
//!
//! This crate does not parse the bytes of a record (that is the
//! `RecordCodec` collaborator's job, see [`crate::collaborators`]); the
//! page only ever manipulates opaque byte ranges tagged with a one-byte
//! node-kind id, a length, and a heap offset.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{NodeKey, PageKey};
use crate::config::PageStoreConfig;
use crate::error::{hex_dump_around, PageError, Result};
use crate::page::fsst::FsstTable;
use crate::page::guard::{GuardState, LifecycleState};
use crate::page::reference::PageReference;
use crate::page::slot_codec;
use crate::page::varint::{read_u16, read_u32, read_u64, read_u8, read_varint, write_varint};

const HEX_DUMP_WINDOW: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct SlotEntry {
    offset: u32,
    length: u32,
    kind: u8,
}

/// The page's off-heap region (spec §9 "Memory-segment pooling with
/// separate externally-allocated vs. pool-allocated paths"; AMBIENT 4.4):
/// either a buffer this page owns outright, or a zero-copy slice of a
/// decompression buffer it has adopted. Mutation always copies out of
/// `ZeroCopy` first (copy-on-write) — only a freshly decoded, unmodified
/// page stays zero-copy.
#[derive(Debug)]
enum HeapStorage {
    Owned(Vec<u8>),
    ZeroCopy(Bytes),
}

impl HeapStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            HeapStorage::Owned(v) => v,
            HeapStorage::ZeroCopy(b) => b.as_ref(),
        }
    }

    /// Returns a mutable owned buffer, copying a `ZeroCopy` region out to
    /// `Owned` on first write.
    fn to_mut(&mut self) -> &mut Vec<u8> {
        if let HeapStorage::ZeroCopy(bytes) = self {
            *self = HeapStorage::Owned(bytes.as_ref().to_vec());
        }
        match self {
            HeapStorage::Owned(v) => v,
            HeapStorage::ZeroCopy(_) => unreachable!("just converted to Owned"),
        }
    }

    fn is_zero_copy(&self) -> bool {
        matches!(self, HeapStorage::ZeroCopy(_))
    }
}

/// One-shot release callback for a page that adopted a zero-copy
/// decompression buffer, invoked exactly once when the page transitions
/// to `Closed` (spec §8 "Zero-copy page release"). Wrapped for a manual
/// `Debug` impl since `Box<dyn FnOnce() + Send>` doesn't derive one.
#[derive(Default)]
struct Releaser(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl std::fmt::Debug for Releaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Releaser").field("armed", &self.0.lock().is_some()).finish()
    }
}

impl Releaser {
    fn none() -> Self {
        Self(Mutex::new(None))
    }

    fn armed(callback: Box<dyn FnOnce() + Send>) -> Self {
        Self(Mutex::new(Some(callback)))
    }

    /// Runs the callback at most once; subsequent calls (e.g. a repeated
    /// `close()`) are no-ops.
    fn fire(&self) {
        if let Some(callback) = self.0.lock().take() {
            callback();
        }
    }
}

/// The unified leaf page: a slot directory over a bump-allocated record
/// heap, with optional overflow promotion, preservation-on-commit, page
/// FSST string compression, and an optional columnar string region.
#[derive(Debug)]
pub struct KeyValueLeafPage {
    page_key: PageKey,
    revision: u32,
    index_type: u8,
    capacity: usize,
    last_slot_index: u32,

    populated: Vec<bool>,
    directory: Vec<SlotEntry>,
    dewey_ids: Vec<Option<Vec<u8>>>,

    heap: HeapStorage,
    heap_capacity: usize,
    heap_end: usize,
    heap_used: usize,

    overflow_map: std::collections::HashMap<NodeKey, PageReference<super::overflow::OverflowPage>>,
    /// Which slots were promoted to overflow, for the presence bitmap in
    /// the encoded body (spec §4.6 item 8). Indexed by the slot that was
    /// promoted, not the overflow map's `NodeKey`, since a decoder needs a
    /// bounded index space to rebuild the bitmap.
    overflow_slots: Vec<bool>,

    base: Option<Arc<KeyValueLeafPage>>,
    preservation: Vec<bool>,

    fixed_tagged: Vec<bool>,

    has_fsst_table: bool,
    fsst_table: Option<FsstTable>,

    columnar_strings: Vec<u8>,
    columnar_offsets: Vec<Option<u32>>,

    guard: GuardState,
    /// Fires exactly once on a fresh `close()` transition when this page
    /// adopted a zero-copy decompression buffer; a no-op `Releaser::none()`
    /// otherwise (spec §9 "OwnedByAllocator / OwnedByDecompressionBuffer").
    releaser: Releaser,
}

impl KeyValueLeafPage {
    pub fn new(page_key: PageKey, revision: u32, index_type: u8, config: &PageStoreConfig, heap_capacity: usize) -> Self {
        let capacity = config.record_capacity as usize;
        Self {
            page_key,
            revision,
            index_type,
            capacity,
            last_slot_index: 0,
            populated: vec![false; capacity],
            directory: vec![SlotEntry::default(); capacity],
            dewey_ids: vec![None; capacity],
            heap: HeapStorage::Owned(vec![0u8; heap_capacity]),
            heap_capacity,
            heap_end: 0,
            heap_used: 0,
            overflow_map: std::collections::HashMap::new(),
            overflow_slots: vec![false; capacity],
            base: None,
            preservation: vec![false; capacity],
            fixed_tagged: vec![false; capacity],
            has_fsst_table: false,
            fsst_table: None,
            columnar_strings: Vec::new(),
            columnar_offsets: vec![None; capacity],
            guard: GuardState::new(),
            releaser: Releaser::none(),
        }
    }

    /// Whether this page's heap is still a zero-copy slice of an adopted
    /// decompression buffer (true only immediately after
    /// [`Self::decode_zero_copy`], before any mutating call).
    pub fn is_zero_copy(&self) -> bool {
        self.heap.is_zero_copy()
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn populated_count(&self) -> usize {
        self.populated.iter().filter(|&&b| b).count()
    }

    pub fn is_populated(&self, slot: usize) -> bool {
        self.populated.get(slot).copied().unwrap_or(false)
    }

    fn check_slot_bound(&self, slot: usize) -> Result<()> {
        if slot >= self.capacity {
            return Err(PageError::OutOfRange {
                value: slot as u64,
                min: 0,
                bound: self.capacity as u64,
            });
        }
        Ok(())
    }

    /// `getSlot(i)` (spec §4.4): validates the directory entry and returns
    /// a zero-copy view into the heap.
    pub fn get_slot(&self, slot: usize) -> Result<&[u8]> {
        self.check_slot_bound(slot)?;
        if !self.populated[slot] {
            return Err(PageError::OutOfRange {
                value: slot as u64,
                min: 0,
                bound: self.capacity as u64,
            });
        }
        let entry = self.directory[slot];
        let end = entry.offset as usize + entry.length as usize;
        if entry.length == 0 || end > self.heap_end {
            return Err(PageError::CorruptSlot {
                offset: entry.offset as usize,
                reason: format!(
                    "slot {} directory entry (offset={}, length={}) exceeds heapEnd={}",
                    slot, entry.offset, entry.length, self.heap_end
                ),
                hex_dump: hex_dump_around(&self.heap.as_slice()[..self.heap_end], entry.offset as usize, HEX_DUMP_WINDOW),
            });
        }
        Ok(&self.heap.as_slice()[entry.offset as usize..end])
    }

    pub fn slot_kind(&self, slot: usize) -> Result<u8> {
        self.check_slot_bound(slot)?;
        if !self.populated[slot] {
            return Err(PageError::OutOfRange {
                value: slot as u64,
                min: 0,
                bound: self.capacity as u64,
            });
        }
        Ok(self.directory[slot].kind)
    }

    fn bump_allocate(&mut self, len: usize) -> Result<usize> {
        if self.heap_end + len > self.heap_capacity {
            return Err(PageError::PageFull {
                reason: format!("heap bump allocation of {} bytes exceeds capacity {}", len, self.heap_capacity),
            });
        }
        let offset = self.heap_end;
        self.heap.to_mut()[offset..offset + len].copy_from_slice(&vec![0u8; len]);
        self.heap_end += len;
        Ok(offset)
    }

    /// `setSlot(i, bytes)` (spec §4.4): in-place overwrite when the new
    /// record fits in the old footprint, otherwise bump-allocate anew and
    /// abandon the old bytes.
    pub fn set_slot(&mut self, slot: usize, bytes: &[u8], kind: u8) -> Result<()> {
        self.check_slot_bound(slot)?;
        if self.populated[slot] {
            let old = self.directory[slot];
            if bytes.len() <= old.length as usize {
                let start = old.offset as usize;
                self.heap.to_mut()[start..start + bytes.len()].copy_from_slice(bytes);
                self.heap_used -= old.length as usize - bytes.len();
                self.directory[slot] = SlotEntry {
                    offset: old.offset,
                    length: bytes.len() as u32,
                    kind,
                };
            } else {
                self.heap_used -= old.length as usize;
                let offset = self.bump_allocate(bytes.len())?;
                self.heap.to_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
                self.heap_used += bytes.len();
                self.directory[slot] = SlotEntry {
                    offset: offset as u32,
                    length: bytes.len() as u32,
                    kind,
                };
            }
        } else {
            let offset = self.bump_allocate(bytes.len())?;
            self.heap.to_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            self.heap_used += bytes.len();
            self.directory[slot] = SlotEntry {
                offset: offset as u32,
                length: bytes.len() as u32,
                kind,
            };
            self.populated[slot] = true;
        }
        self.last_slot_index = self.last_slot_index.max(slot as u32);
        self.guard.mark_hot();
        Ok(())
    }

    /// Shrink an existing slot's bytes in place; used by the fixed→compact
    /// projection, which is guaranteed never to grow a record.
    fn shrink_in_place(&mut self, slot: usize, bytes: &[u8]) -> Result<()> {
        self.check_slot_bound(slot)?;
        let old = self.directory[slot];
        if bytes.len() > old.length as usize {
            return Err(PageError::CorruptPage {
                reason: format!(
                    "fixed->compact projection for slot {} grew from {} to {} bytes",
                    slot,
                    old.length,
                    bytes.len()
                ),
            });
        }
        let start = old.offset as usize;
        self.heap.to_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.heap_used -= old.length as usize - bytes.len();
        self.directory[slot].length = bytes.len() as u32;
        Ok(())
    }

    /// Re-encodes every slot tagged "fixed format" into its compact form
    /// via `compactor`, in place (spec §4.4 "Fixed → compact slot
    /// projection").
    pub fn project_fixed_to_compact(&mut self, mut compactor: impl FnMut(&[u8]) -> Vec<u8>) -> Result<()> {
        for slot in 0..self.capacity {
            if self.fixed_tagged[slot] && self.populated[slot] {
                let compact = {
                    let bytes = self.get_slot(slot)?;
                    compactor(bytes)
                };
                self.shrink_in_place(slot, &compact)?;
                self.fixed_tagged[slot] = false;
            }
        }
        Ok(())
    }

    pub fn tag_fixed(&mut self, slot: usize) -> Result<()> {
        self.check_slot_bound(slot)?;
        self.fixed_tagged[slot] = true;
        Ok(())
    }

    /// Promotes a slot to an [`OverflowPage`](super::overflow::OverflowPage)
    /// reference: clears the inline slot and records an overflow-map entry
    /// keyed by `node_key` (spec §4.4 "Overflow").
    pub fn promote_to_overflow(
        &mut self,
        slot: usize,
        node_key: NodeKey,
        overflow_ref: PageReference<super::overflow::OverflowPage>,
    ) -> Result<()> {
        self.check_slot_bound(slot)?;
        if self.populated[slot] {
            self.heap_used -= self.directory[slot].length as usize;
            self.populated[slot] = false;
            self.directory[slot] = SlotEntry::default();
        }
        self.overflow_slots[slot] = true;
        self.overflow_map.insert(node_key, overflow_ref);
        Ok(())
    }

    pub fn overflow_reference(&self, node_key: NodeKey) -> Option<&PageReference<super::overflow::OverflowPage>> {
        self.overflow_map.get(&node_key)
    }

    pub fn set_base(&mut self, base: Arc<KeyValueLeafPage>) {
        self.base = Some(base);
    }

    pub fn mark_preserved(&mut self, slot: usize) -> Result<()> {
        self.check_slot_bound(slot)?;
        self.preservation[slot] = true;
        Ok(())
    }

    /// `addReferences` (spec §4.4 "Preservation"): copies every slot the
    /// base contributes but this page has not overwritten, verbatim
    /// (record bytes and DeweyID).
    pub fn apply_preservation(&mut self) -> Result<()> {
        let base = match &self.base {
            Some(base) => Arc::clone(base),
            None => return Ok(()),
        };
        for slot in 0..self.capacity {
            if self.preservation[slot] && !self.populated[slot] {
                let kind = base.slot_kind(slot)?;
                let bytes = base.get_slot(slot)?.to_vec();
                self.set_slot(slot, &bytes, kind)?;
                if let Some(dewey) = base.dewey_ids[slot].clone() {
                    self.dewey_ids[slot] = Some(dewey);
                }
            }
        }
        Ok(())
    }

    pub fn fragmentation(&self) -> f32 {
        if self.heap_end == 0 {
            0.0
        } else {
            1.0 - (self.heap_used as f32 / self.heap_end as f32)
        }
    }

    /// Heap compaction (spec §4.4): walks populated slots in directory
    /// order, copying each record forward to the next free position.
    /// Never changes `populatedCount` or the populated bitmap.
    pub fn compact(&mut self, threshold: f32) -> bool {
        if self.fragmentation() <= threshold {
            return false;
        }
        let mut new_heap = vec![0u8; self.heap_capacity];
        let mut cursor = 0usize;
        for slot in 0..self.capacity {
            if self.populated[slot] {
                let entry = self.directory[slot];
                let start = entry.offset as usize;
                let len = entry.length as usize;
                new_heap[cursor..cursor + len].copy_from_slice(&self.heap.as_slice()[start..start + len]);
                self.directory[slot].offset = cursor as u32;
                cursor += len;
            }
        }
        self.heap = HeapStorage::Owned(new_heap);
        self.heap_end = cursor;
        self.heap_used = cursor;
        true
    }

    pub fn write_columnar_string(&mut self, slot: usize, bytes: &[u8]) -> Result<()> {
        self.check_slot_bound(slot)?;
        let offset = self.columnar_strings.len() as u32;
        self.columnar_strings.extend_from_slice(bytes);
        self.columnar_offsets[slot] = Some(offset);
        Ok(())
    }

    pub fn columnar_string(&self, slot: usize, len: usize) -> Option<&[u8]> {
        let offset = self.columnar_offsets.get(slot).copied().flatten()? as usize;
        self.columnar_strings.get(offset..offset + len)
    }

    /// Trials and, if it clears the configured savings threshold, adopts a
    /// page-local FSST symbol table over the given string samples,
    /// rewriting each named slot's bytes to its compressed form (spec
    /// §4.4 "FSST string compression").
    pub fn apply_fsst_compression(&mut self, samples: &[(usize, Vec<u8>, u8)], config: &PageStoreConfig) -> Result<bool> {
        let owned: Vec<&[u8]> = samples.iter().map(|(_, bytes, _)| bytes.as_slice()).collect();
        let table = match crate::page::fsst::trial_adopt(&owned, config.fsst_min_samples, config.fsst_adoption_threshold) {
            Some(table) => table,
            None => return Ok(false),
        };
        for (slot, bytes, kind) in samples {
            let compressed = table.compress(bytes);
            self.set_slot(*slot, &compressed, *kind)?;
        }
        self.has_fsst_table = true;
        self.fsst_table = Some(table);
        Ok(true)
    }

    pub fn has_fsst_table(&self) -> bool {
        self.has_fsst_table
    }

    pub fn fsst_table(&self) -> Option<&FsstTable> {
        self.fsst_table.as_ref()
    }

    pub fn try_acquire_guard(&self) -> Result<()> {
        self.guard.try_acquire_guard()
    }

    /// Releases a guard (spec §4.4 "Guard lifecycle & eviction"). If this
    /// release is the last guard on an already-orphaned page, the page
    /// transitions straight to `Closed` here — the releaser fires on that
    /// transition, not only on an explicit later [`Self::close`] call.
    pub fn release_guard(&self) -> Result<LifecycleState> {
        let state = self.guard.release_guard()?;
        if state == LifecycleState::Closed {
            self.releaser.fire();
        }
        Ok(state)
    }

    pub fn mark_orphaned(&self) {
        self.guard.mark_orphaned()
    }

    /// Closes the page, invoking the zero-copy releaser (if any) exactly
    /// once on a fresh transition (spec §8 "Zero-copy page release"). A
    /// repeated `close()` on an already-`Closed` page is a no-op and does
    /// not re-fire the releaser.
    pub fn close(&self) -> Result<bool> {
        let fresh = self.guard.close()?;
        if fresh {
            self.releaser.fire();
        }
        Ok(fresh)
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.guard.state()
    }

    /// Encodes the page body per spec §4.6: varint page key, u32 revision,
    /// u8 index type, u32 lastSlotIndex, the slot-offset codec over
    /// per-slot (length, kind) alongside offsets (an addition this crate
    /// needs since it does not parse record bytes to recover lengths —
    /// see `DESIGN.md`), u32 used-heap-bytes, the heap region verbatim,
    /// and, when configured, the DeweyID region.
    pub fn encode(&self, config: &PageStoreConfig) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.push(self.index_type);
        out.extend_from_slice(&self.last_slot_index.to_le_bytes());

        let offsets: Vec<Option<u32>> = self
            .populated
            .iter()
            .zip(self.directory.iter())
            .map(|(&pop, entry)| if pop { Some(entry.offset) } else { None })
            .collect();
        let offset_codec = slot_codec::encode(&offsets);
        out.extend_from_slice(&(offset_codec.len() as u32).to_le_bytes());
        out.extend_from_slice(&offset_codec);

        for (pop, entry) in self.populated.iter().zip(self.directory.iter()) {
            if *pop {
                out.extend_from_slice(&entry.length.to_le_bytes());
                out.push(entry.kind);
            }
        }

        out.extend_from_slice(&(self.heap_used as u32).to_le_bytes());
        out.extend_from_slice(&(self.heap_end as u32).to_le_bytes());
        out.extend_from_slice(&self.heap.as_slice()[..self.heap_end]);

        if config.dewey_ids_stored {
            let dewey_present: Vec<Option<u32>> = self
                .dewey_ids
                .iter()
                .enumerate()
                .map(|(i, d)| d.as_ref().map(|_| i as u32))
                .collect();
            let mut dewey_blob = Vec::new();
            let mut dewey_lengths = Vec::new();
            for d in &self.dewey_ids {
                if let Some(bytes) = d {
                    dewey_lengths.push(bytes.len() as u16);
                    dewey_blob.extend_from_slice(bytes);
                }
            }
            let presence = slot_codec::encode(&dewey_present);
            out.extend_from_slice(&(presence.len() as u32).to_le_bytes());
            out.extend_from_slice(&presence);
            out.extend_from_slice(&(dewey_lengths.len() as u32).to_le_bytes());
            for len in dewey_lengths {
                out.extend_from_slice(&len.to_le_bytes());
            }
            out.extend_from_slice(&(dewey_blob.len() as u32).to_le_bytes());
            out.extend_from_slice(&dewey_blob);
        }

        // Item 8: presence bitmap of overflow entries, count, overflow
        // page keys (sentinel 0 when a reference has no persistent key
        // assigned yet).
        let overflow_presence: Vec<Option<u32>> = self
            .overflow_slots
            .iter()
            .enumerate()
            .map(|(i, &promoted)| if promoted { Some(i as u32) } else { None })
            .collect();
        let overflow_bitmap = slot_codec::encode(&overflow_presence);
        out.extend_from_slice(&(overflow_bitmap.len() as u32).to_le_bytes());
        out.extend_from_slice(&overflow_bitmap);
        let overflow_entries: Vec<(NodeKey, u64)> = self
            .overflow_map
            .iter()
            .map(|(node_key, reference)| (*node_key, reference.persistent_key().map(|k| k.value()).unwrap_or(0)))
            .collect();
        out.extend_from_slice(&(overflow_entries.len() as u32).to_le_bytes());
        for (node_key, overflow_page_key) in &overflow_entries {
            out.extend_from_slice(&node_key.value().to_le_bytes());
            out.extend_from_slice(&overflow_page_key.to_le_bytes());
        }

        // Item 9: FSST symbol-table length (0 if absent) + table bytes.
        match &self.fsst_table {
            Some(table) if self.has_fsst_table => {
                let bytes = table.encode();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&bytes);
            }
            _ => out.extend_from_slice(&0u32.to_le_bytes()),
        }

        // Item 10: has-columnar-strings flag; if set, size + offset codec
        // + string region verbatim.
        if config.columnar_strings {
            out.push(1);
            out.extend_from_slice(&(self.columnar_strings.len() as u32).to_le_bytes());
            let columnar_codec = slot_codec::encode(&self.columnar_offsets);
            out.extend_from_slice(&(columnar_codec.len() as u32).to_le_bytes());
            out.extend_from_slice(&columnar_codec);
            out.extend_from_slice(&self.columnar_strings);
        } else {
            out.push(0);
        }

        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey, config: &PageStoreConfig, heap_capacity: usize) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        let revision = read_u32(buf, &mut cursor)?;
        let index_type = read_u8(buf, &mut cursor)?;
        let last_slot_index = read_u32(buf, &mut cursor)?;

        let codec_len = read_u32(buf, &mut cursor)? as usize;
        let codec_bytes = buf.get(cursor..cursor + codec_len).ok_or_else(|| PageError::CorruptPage {
            reason: "slot-offset codec region truncated".to_string(),
        })?;
        cursor += codec_len;
        let capacity = config.record_capacity as usize;
        let offsets = slot_codec::decode(codec_bytes, capacity)?;

        let mut populated = vec![false; capacity];
        let mut directory = vec![SlotEntry::default(); capacity];
        for (slot, offset) in offsets.iter().enumerate() {
            if *offset >= 0 {
                let length = read_u32(buf, &mut cursor)?;
                let kind = read_u8(buf, &mut cursor)?;
                populated[slot] = true;
                directory[slot] = SlotEntry {
                    offset: *offset as u32,
                    length,
                    kind,
                };
            }
        }

        let heap_used = read_u32(buf, &mut cursor)? as usize;
        let heap_end = read_u32(buf, &mut cursor)? as usize;
        let heap_bytes = buf.get(cursor..cursor + heap_end).ok_or_else(|| PageError::CorruptPage {
            reason: "heap region truncated".to_string(),
        })?;
        cursor += heap_end;
        let mut heap_vec = vec![0u8; heap_capacity.max(heap_end)];
        heap_vec[..heap_end].copy_from_slice(heap_bytes);
        let heap = HeapStorage::Owned(heap_vec);

        let mut dewey_ids = vec![None; capacity];
        if config.dewey_ids_stored {
            let presence_len = read_u32(buf, &mut cursor)? as usize;
            let presence = buf.get(cursor..cursor + presence_len).ok_or_else(|| PageError::CorruptPage {
                reason: "dewey presence region truncated".to_string(),
            })?;
            cursor += presence_len;
            let dewey_present = slot_codec::decode(presence, capacity)?;

            let length_count = read_u32(buf, &mut cursor)? as usize;
            let mut lengths = Vec::with_capacity(length_count);
            for _ in 0..length_count {
                lengths.push(read_u16(buf, &mut cursor)?);
            }
            let blob_len = read_u32(buf, &mut cursor)? as usize;
            let blob = buf.get(cursor..cursor + blob_len).ok_or_else(|| PageError::CorruptPage {
                reason: "dewey blob region truncated".to_string(),
            })?;
            cursor += blob_len;

            let mut blob_cursor = 0usize;
            let mut length_iter = lengths.into_iter();
            for (slot, present) in dewey_present.iter().enumerate() {
                if *present >= 0 {
                    let len = length_iter.next().ok_or_else(|| PageError::CorruptPage {
                        reason: "dewey length array shorter than presence count".to_string(),
                    })? as usize;
                    let bytes = blob.get(blob_cursor..blob_cursor + len).ok_or_else(|| PageError::CorruptPage {
                        reason: "dewey blob truncated mid-entry".to_string(),
                    })?;
                    dewey_ids[slot] = Some(bytes.to_vec());
                    blob_cursor += len;
                }
            }
        }

        let overflow_bitmap_len = read_u32(buf, &mut cursor)? as usize;
        let overflow_bitmap_bytes = buf.get(cursor..cursor + overflow_bitmap_len).ok_or_else(|| PageError::CorruptPage {
            reason: "overflow presence bitmap region truncated".to_string(),
        })?;
        cursor += overflow_bitmap_len;
        let overflow_presence = slot_codec::decode(overflow_bitmap_bytes, capacity)?;
        let mut overflow_slots = vec![false; capacity];
        for (slot, present) in overflow_presence.iter().enumerate() {
            overflow_slots[slot] = *present >= 0;
        }

        let overflow_entry_count = read_u32(buf, &mut cursor)? as usize;
        let mut overflow_map = std::collections::HashMap::with_capacity(overflow_entry_count);
        for _ in 0..overflow_entry_count {
            let node_key = NodeKey::new(read_u64(buf, &mut cursor)?);
            let overflow_page_key = read_u64(buf, &mut cursor)?;
            let mut reference = PageReference::new(0, 0);
            if overflow_page_key != 0 {
                reference.set_persistent_key(Some(PageKey::new(overflow_page_key)));
            }
            overflow_map.insert(node_key, reference);
        }

        let fsst_len = read_u32(buf, &mut cursor)? as usize;
        let (has_fsst_table, fsst_table) = if fsst_len > 0 {
            let bytes = buf.get(cursor..cursor + fsst_len).ok_or_else(|| PageError::CorruptPage {
                reason: "fsst table region truncated".to_string(),
            })?;
            cursor += fsst_len;
            let (table, _) = FsstTable::decode(bytes)?;
            (true, Some(table))
        } else {
            (false, None)
        };

        let has_columnar = read_u8(buf, &mut cursor)? != 0;
        let mut columnar_strings = Vec::new();
        let mut columnar_offsets = vec![None; capacity];
        if has_columnar {
            let region_len = read_u32(buf, &mut cursor)? as usize;
            let codec_len = read_u32(buf, &mut cursor)? as usize;
            let codec_bytes = buf.get(cursor..cursor + codec_len).ok_or_else(|| PageError::CorruptPage {
                reason: "columnar offset codec region truncated".to_string(),
            })?;
            cursor += codec_len;
            let decoded_offsets = slot_codec::decode(codec_bytes, capacity)?;
            columnar_offsets = decoded_offsets.iter().map(|&o| if o >= 0 { Some(o as u32) } else { None }).collect();
            let region = buf.get(cursor..cursor + region_len).ok_or_else(|| PageError::CorruptPage {
                reason: "columnar string region truncated".to_string(),
            })?;
            cursor += region_len;
            columnar_strings = region.to_vec();
        }
        let _ = cursor;

        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded page key {} does not match expected {}", decoded_key, page_key),
            });
        }

        Ok(Self {
            page_key,
            revision,
            index_type,
            capacity,
            last_slot_index,
            populated,
            directory,
            dewey_ids,
            heap,
            heap_capacity: heap_capacity.max(heap_end),
            heap_end,
            heap_used,
            overflow_map,
            overflow_slots,
            base: None,
            preservation: vec![false; capacity],
            fixed_tagged: vec![false; capacity],
            has_fsst_table,
            fsst_table,
            columnar_strings,
            columnar_offsets,
            guard: GuardState::new(),
            releaser: Releaser::none(),
        })
    }

    /// Decodes a page body the same way [`Self::decode`] does, but adopts
    /// `source` as the backing store for the heap region as a zero-copy
    /// `Bytes` slice instead of copying it into a fresh buffer (spec §4.6
    /// "Decode ... may take ownership of that buffer and use slices of it
    /// as the page's heap ... directly — no copy"). `releaser`, if given,
    /// fires exactly once on this page's first fresh `close()`.
    ///
    /// The heap stays zero-copy only until the first mutating call
    /// (`set_slot`, `compact`, ...), which copies it out via
    /// [`HeapStorage::to_mut`] — ordinary copy-on-write.
    pub fn decode_zero_copy(
        source: &Bytes,
        page_key: PageKey,
        config: &PageStoreConfig,
        heap_capacity: usize,
        releaser: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Self> {
        let buf = source.as_ref();
        let mut page = Self::decode(buf, page_key, config, heap_capacity)?;

        // Re-locate the heap region within `source` precisely as `decode`
        // parsed it, so the adopted slice is the exact on-buffer range
        // rather than a guess: everything up to and including `heapEnd`
        // is a deterministic function of the header fields already
        // re-derived by the `decode` call above.
        let mut cursor = 0usize;
        let (_, n) = read_varint(buf, cursor)?;
        cursor += n;
        cursor += 4; // revision
        cursor += 1; // index_type
        cursor += 4; // last_slot_index
        let codec_len = read_u32(buf, &mut cursor)? as usize;
        cursor += codec_len;
        cursor += page.populated_count() * 5; // (length: u32, kind: u8) per populated slot
        cursor += 4; // heap_used
        cursor += 4; // heap_end
        let heap_start = cursor;
        let heap_end = page.heap_end;

        page.heap = HeapStorage::ZeroCopy(source.slice(heap_start..heap_start + heap_end));
        page.releaser = match releaser {
            Some(callback) => Releaser::armed(callback),
            None => Releaser::none(),
        };
        Ok(page)
    }
}
