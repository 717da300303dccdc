//! HOT leaf page (spec §3 "HOT leaf page", §4.8): sorted key/value entries
//! in a bump-allocated off-heap region, found by binary search.
//!
//! Grounded on `index::btree`'s sorted-entry leaf node (binary search,
//! split-to-sibling) for the entry layout and split algorithm, and
//! `index::swiss_table`'s branchless-probe style for the key compare —
//! here a plain `&[u8]` `Ord` comparison already *is* the "vectorized
//! mismatch then unsigned-byte compare" the spec describes, since Rust
//! slice comparison is unsigned-byte lexicographic and LLVM vectorizes it
//! on its own; no hand-rolled SIMD intrinsic buys anything over it.
//!
//! The spec's `-(insertion + 1)` sentinel encoding for a miss (needed in
//! languages without a sum-type return) is replaced by the idiomatic
//! `Result<usize, usize>` that `[T]::binary_search` already uses:
//! `Ok(index)` is a hit, `Err(insertion_index)` is where the key would go.

use crate::common::PageKey;
use crate::error::{PageError, Result};
use crate::page::guard::GuardState;

/// A length-prefixed, dynamically-sized compressed bitmap used as a HOT
/// leaf entry's value when it represents a set of node references. Unlike
/// [`crate::page::bitmap_chunk::CompressedBitmap`] (fixed to one 64K-wide
/// chunk range) this has no fixed width — grounded on
/// `index::bitmap::CompressedBitmap::or`'s run-based union, adapted to a
/// flat `u64` word vector since HOT leaf values are small, sparse node-key
/// sets rather than dense 64K ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeRefBitmap {
    words: Vec<u64>,
}

impl NodeRefBitmap {
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    pub fn from_keys(keys: impl IntoIterator<Item = u64>) -> Self {
        let mut bitmap = Self::empty();
        for key in keys {
            bitmap.set(key);
        }
        bitmap
    }

    pub fn set(&mut self, key: u64) {
        let word = (key / 64) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (key % 64);
    }

    pub fn contains(&self, key: u64) -> bool {
        let word = (key / 64) as usize;
        self.words
            .get(word)
            .map(|w| (w >> (key % 64)) & 1 == 1)
            .unwrap_or(false)
    }

    /// OR-merges `other` into `self` (spec §3 "merging two entries with
    /// the same key OR-merges their roaring-bitmap values").
    pub fn or_merge(&mut self, other: &NodeRefBitmap) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, ow) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= ow;
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.words.len() * 8);
        out.extend_from_slice(&(self.words.len() as u32).to_le_bytes());
        for w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(PageError::CorruptPage {
                reason: "node-ref bitmap truncated before length prefix".to_string(),
            });
        }
        let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut words = Vec::with_capacity(count);
        let mut cursor = 4;
        for _ in 0..count {
            let word = buf.get(cursor..cursor + 8).ok_or_else(|| PageError::CorruptPage {
                reason: "node-ref bitmap truncated mid-word".to_string(),
            })?;
            words.push(u64::from_le_bytes(word.try_into().unwrap()));
            cursor += 8;
        }
        Ok(Self { words })
    }
}

/// Sorted key/value entries over a bump-allocated heap, addressed by a
/// parallel offset array in ascending-key order.
#[derive(Debug)]
pub struct HotLeafPage {
    page_key: PageKey,
    revision: u32,
    heap: Vec<u8>,
    heap_capacity: usize,
    used_size: usize,
    /// Byte offset into `heap` of each entry, in ascending-key order.
    offsets: Vec<u32>,
    max_entries: usize,
    guard: GuardState,
}

/// {keyLen: u16, key, valLen: u16, value}.
fn write_entry(heap: &mut [u8], offset: usize, key: &[u8], value: &[u8]) {
    let mut cursor = offset;
    heap[cursor..cursor + 2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    cursor += 2;
    heap[cursor..cursor + key.len()].copy_from_slice(key);
    cursor += key.len();
    heap[cursor..cursor + 2].copy_from_slice(&(value.len() as u16).to_le_bytes());
    cursor += 2;
    heap[cursor..cursor + value.len()].copy_from_slice(value);
}

fn entry_len(key_len: usize, value_len: usize) -> usize {
    2 + key_len + 2 + value_len
}

fn read_entry(heap: &[u8], offset: usize) -> Result<(&[u8], &[u8])> {
    let key_len = read_u16_at(heap, offset)? as usize;
    let key_start = offset + 2;
    let key = heap.get(key_start..key_start + key_len).ok_or_else(|| PageError::CorruptPage {
        reason: "hot leaf entry key truncated".to_string(),
    })?;
    let value_len_offset = key_start + key_len;
    let value_len = read_u16_at(heap, value_len_offset)? as usize;
    let value_start = value_len_offset + 2;
    let value = heap.get(value_start..value_start + value_len).ok_or_else(|| PageError::CorruptPage {
        reason: "hot leaf entry value truncated".to_string(),
    })?;
    Ok((key, value))
}

fn read_u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    let bytes = buf.get(offset..offset + 2).ok_or_else(|| PageError::CorruptPage {
        reason: "hot leaf entry length field truncated".to_string(),
    })?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

impl HotLeafPage {
    pub fn new(page_key: PageKey, revision: u32, heap_capacity: usize, max_entries: usize) -> Self {
        Self {
            page_key,
            revision,
            heap: vec![0u8; heap_capacity],
            heap_capacity,
            used_size: 0,
            offsets: Vec::new(),
            max_entries,
            guard: GuardState::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn guard(&self) -> &GuardState {
        &self.guard
    }

    fn entry_at(&self, index: usize) -> Result<(&[u8], &[u8])> {
        let offset = *self.offsets.get(index).ok_or_else(|| PageError::OutOfRange {
            value: index as u64,
            min: 0,
            bound: self.offsets.len() as u64,
        })?;
        read_entry(&self.heap, offset as usize)
    }

    pub fn key_at(&self, index: usize) -> Result<&[u8]> {
        self.entry_at(index).map(|(k, _)| k)
    }

    pub fn value_at(&self, index: usize) -> Result<&[u8]> {
        self.entry_at(index).map(|(_, v)| v)
    }

    /// `findEntry(key)` (spec §4.8): `Ok(index)` on an exact match,
    /// `Err(insertion_index)` otherwise.
    pub fn find_entry(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.offsets.binary_search_by(|&offset| {
            let (k, _) = read_entry(&self.heap, offset as usize).expect("populated offset decodes");
            k.cmp(key)
        })
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.find_entry(key) {
            Ok(idx) => self.value_at(idx).ok(),
            Err(_) => None,
        }
    }

    fn bump_allocate(&mut self, len: usize) -> Result<usize> {
        if self.used_size + len > self.heap_capacity {
            return Err(PageError::PageFull {
                reason: format!("hot leaf heap bump allocation of {} bytes exceeds capacity {}", len, self.heap_capacity),
            });
        }
        let offset = self.used_size;
        self.used_size += len;
        Ok(offset)
    }

    /// `put(key, value)` (spec §4.8): updates in place when the new value
    /// fits in the old footprint, otherwise bump-allocates a fresh entry
    /// and re-threads the offset table.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        match self.find_entry(key) {
            Ok(idx) => {
                let offset = self.offsets[idx] as usize;
                let (existing_key, existing_value) = read_entry(&self.heap, offset)?;
                if value.len() <= existing_value.len() {
                    let existing_key_len = existing_key.len();
                    write_entry(&mut self.heap, offset, key, value);
                    // Value may have shrunk; the valLen field already
                    // reflects the new length, leaving any trailing bytes
                    // as abandoned heap space (same policy as the unified
                    // leaf page's in-place shrink).
                    let _ = existing_key_len;
                    Ok(())
                } else {
                    self.offsets.remove(idx);
                    let new_len = entry_len(key.len(), value.len());
                    let new_offset = self.bump_allocate(new_len)?;
                    write_entry(&mut self.heap, new_offset, key, value);
                    let insert_at = self.offsets.binary_search_by(|&o| {
                        let (k, _) = read_entry(&self.heap, o as usize).expect("populated offset decodes");
                        k.cmp(key)
                    });
                    let insert_at = insert_at.unwrap_or_else(|pos| pos);
                    self.offsets.insert(insert_at, new_offset as u32);
                    Ok(())
                }
            }
            Err(insert_at) => {
                if self.offsets.len() >= self.max_entries {
                    return Err(PageError::PageFull {
                        reason: format!("hot leaf entry count at capacity {}", self.max_entries),
                    });
                }
                let new_len = entry_len(key.len(), value.len());
                let offset = self.bump_allocate(new_len)?;
                write_entry(&mut self.heap, offset, key, value);
                self.offsets.insert(insert_at, offset as u32);
                Ok(())
            }
        }
    }

    /// `mergeWithNodeRefs(key, value)` (spec §4.8): OR-merges a
    /// [`NodeRefBitmap`]-encoded value into the existing entry for `key`,
    /// or inserts it fresh if absent.
    pub fn merge_with_node_refs(&mut self, key: &[u8], value: &NodeRefBitmap) -> Result<()> {
        match self.find_entry(key) {
            Ok(idx) => {
                let existing = NodeRefBitmap::decode(self.value_at(idx)?)?;
                let mut merged = existing;
                merged.or_merge(value);
                self.put(key, &merged.encode())
            }
            Err(_) => self.put(key, &value.encode()),
        }
    }

    /// `splitTo(target)` (spec §4.8): moves the upper half of entries into
    /// `target` (assumed empty with adequate capacity), truncates `self`
    /// to the lower half, and returns the split key (`target`'s first
    /// key after the move).
    pub fn split_to(&mut self, target: &mut HotLeafPage) -> Result<Vec<u8>> {
        let mid = self.offsets.len() / 2;
        let upper_count = self.offsets.len() - mid;
        let mut moved: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(upper_count);
        for &offset in &self.offsets[mid..] {
            let (k, v) = read_entry(&self.heap, offset as usize)?;
            moved.push((k.to_vec(), v.to_vec()));
        }
        self.offsets.truncate(mid);
        for (k, v) in &moved {
            target.put(k, v)?;
        }
        Ok(moved.first().map(|(k, _)| k.clone()).unwrap_or_default())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        crate::page::varint::write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        for &offset in &self.offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&(self.used_size as u32).to_le_bytes());
        out.extend_from_slice(&self.heap[..self.used_size]);
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey, heap_capacity: usize, max_entries: usize) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = crate::page::varint::read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded hot leaf page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = crate::page::varint::read_u32(buf, &mut cursor)?;
        let entry_count = crate::page::varint::read_u32(buf, &mut cursor)? as usize;
        let mut offsets = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            offsets.push(crate::page::varint::read_u32(buf, &mut cursor)?);
        }
        let used_size = crate::page::varint::read_u32(buf, &mut cursor)? as usize;
        let heap_bytes = buf.get(cursor..cursor + used_size).ok_or_else(|| PageError::CorruptPage {
            reason: "hot leaf heap region truncated".to_string(),
        })?;
        let capacity = heap_capacity.max(used_size);
        let mut heap = vec![0u8; capacity];
        heap[..used_size].copy_from_slice(heap_bytes);

        Ok(Self {
            page_key,
            revision,
            heap,
            heap_capacity: capacity,
            used_size,
            offsets,
            max_entries,
            guard: GuardState::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> HotLeafPage {
        HotLeafPage::new(PageKey::new(1), 0, 4096, 64)
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut p = page();
        p.put(b"alpha", b"1").unwrap();
        p.put(b"bravo", b"2").unwrap();
        assert_eq!(p.get(b"alpha"), Some(b"1".as_slice()));
        assert_eq!(p.get(b"bravo"), Some(b"2".as_slice()));
        assert_eq!(p.get(b"missing"), None);
    }

    #[test]
    fn entries_stay_in_ascending_key_order() {
        let mut p = page();
        for k in [b"delta".as_slice(), b"alpha".as_slice(), b"charlie".as_slice(), b"bravo".as_slice()] {
            p.put(k, b"v").unwrap();
        }
        let keys: Vec<&[u8]> = (0..p.entry_count()).map(|i| p.key_at(i).unwrap()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn find_entry_returns_insertion_point_on_miss() {
        let mut p = page();
        p.put(b"b", b"1").unwrap();
        p.put(b"d", b"2").unwrap();
        assert_eq!(p.find_entry(b"c"), Err(1));
        assert_eq!(p.find_entry(b"a"), Err(0));
        assert_eq!(p.find_entry(b"e"), Err(2));
        assert_eq!(p.find_entry(b"b"), Ok(0));
    }

    #[test]
    fn shrinking_update_reuses_offset() {
        let mut p = page();
        p.put(b"key", b"a long value here").unwrap();
        let offset_before = p.offsets[0];
        p.put(b"key", b"short").unwrap();
        assert_eq!(p.offsets[0], offset_before);
        assert_eq!(p.get(b"key"), Some(b"short".as_slice()));
    }

    #[test]
    fn growing_update_reallocates() {
        let mut p = page();
        p.put(b"key", b"s").unwrap();
        let offset_before = p.offsets[0];
        p.put(b"key", b"a much longer value than before").unwrap();
        assert_ne!(p.offsets[0], offset_before);
        assert_eq!(p.get(b"key"), Some(b"a much longer value than before".as_slice()));
        assert_eq!(p.entry_count(), 1);
    }

    #[test]
    fn merge_with_node_refs_or_merges_bitmaps() {
        let mut p = page();
        let a = NodeRefBitmap::from_keys([1, 5, 9]);
        let b = NodeRefBitmap::from_keys([5, 20]);
        p.merge_with_node_refs(b"k", &a).unwrap();
        p.merge_with_node_refs(b"k", &b).unwrap();
        let merged = NodeRefBitmap::decode(p.get(b"k").unwrap()).unwrap();
        for k in [1, 5, 9, 20] {
            assert!(merged.contains(k));
        }
        assert!(!merged.contains(2));
    }

    #[test]
    fn split_to_moves_upper_half_and_returns_split_key() {
        let mut p = page();
        for k in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice(), b"d".as_slice()] {
            p.put(k, b"v").unwrap();
        }
        let mut target = HotLeafPage::new(PageKey::new(2), 0, 4096, 64);
        let split_key = p.split_to(&mut target).unwrap();
        assert_eq!(split_key, b"c");
        assert_eq!(p.entry_count(), 2);
        assert_eq!(target.entry_count(), 2);
        assert_eq!(p.get(b"a"), Some(b"v".as_slice()));
        assert_eq!(target.get(b"c"), Some(b"v".as_slice()));
    }

    #[test]
    fn entry_count_at_capacity_is_page_full() {
        let mut p = HotLeafPage::new(PageKey::new(1), 0, 4096, 2);
        p.put(b"a", b"1").unwrap();
        p.put(b"b", b"2").unwrap();
        assert!(matches!(p.put(b"c", b"3"), Err(PageError::PageFull { .. })));
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut p = page();
        p.put(b"alpha", b"1").unwrap();
        p.put(b"bravo", b"22").unwrap();
        let bytes = p.encode();
        let decoded = HotLeafPage::decode(&bytes, PageKey::new(1), 4096, 64).unwrap();
        assert_eq!(decoded.get(b"alpha"), Some(b"1".as_slice()));
        assert_eq!(decoded.get(b"bravo"), Some(b"22".as_slice()));
        assert_eq!(decoded.revision(), 0);
    }
}
