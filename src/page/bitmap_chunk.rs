//! `BitmapChunkPage` — versioned compressed bitmap for a 64K-key range
//! (spec §4.3). Grounded on `index::bitmap_compressed::WahBitmap`'s
//! word-aligned-hybrid fill-word compression, kept as a hand-rolled
//! container (no external roaring-bitmap crate) because the teacher never
//! depended on one either.

use crate::common::PageKey;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{PageError, Result};
use crate::common::IndexType;

const WORDS_PER_CHUNK: usize = DEFAULT_CHUNK_SIZE as usize / 64;

/// A word-aligned-hybrid compressed bitmap over exactly one chunk's worth
/// of bits (`DEFAULT_CHUNK_SIZE`). Literal words have bit 63 clear; fill
/// words have bit 63 set, bit 62 carrying the fill value, and the low 62
/// bits a run length in raw words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBitmap {
    words: Vec<u64>,
}

impl CompressedBitmap {
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    pub fn from_raw_words(raw: &[u64; WORDS_PER_CHUNK]) -> Self {
        let mut words = Vec::new();
        let mut i = 0;
        while i < raw.len() {
            let word = raw[i];
            if word == 0 || word == u64::MAX {
                let mut run = 1;
                while i + run < raw.len() && raw[i + run] == word {
                    run += 1;
                }
                let fill_bit = if word == u64::MAX { 1u64 << 62 } else { 0 };
                words.push((1u64 << 63) | fill_bit | (run as u64 & ((1u64 << 62) - 1)));
                i += run;
            } else {
                words.push(word & !(1u64 << 63));
                i += 1;
            }
        }
        Self { words }
    }

    pub fn to_raw_words(&self) -> Box<[u64; WORDS_PER_CHUNK]> {
        let mut raw = vec![0u64; WORDS_PER_CHUNK].into_boxed_slice();
        let mut pos = 0usize;
        for &word in &self.words {
            if word & (1u64 << 63) != 0 {
                let fill_value = word & (1u64 << 62) != 0;
                let count = (word & ((1u64 << 62) - 1)) as usize;
                let fill = if fill_value { u64::MAX } else { 0 };
                for _ in 0..count {
                    if pos < raw.len() {
                        raw[pos] = fill;
                        pos += 1;
                    }
                }
            } else {
                if pos < raw.len() {
                    raw[pos] = word;
                    pos += 1;
                }
            }
        }
        raw.try_into().expect("WORDS_PER_CHUNK sized")
    }

    pub fn get_bit(&self, bit: usize) -> bool {
        let raw = self.to_raw_words();
        (raw[bit / 64] >> (bit % 64)) & 1 == 1
    }

    pub fn set_bit(&mut self, bit: usize) {
        let mut raw = self.to_raw_words();
        raw[bit / 64] |= 1u64 << (bit % 64);
        *self = Self::from_raw_words(&raw);
    }

    pub fn clear_bit(&mut self, bit: usize) {
        let mut raw = self.to_raw_words();
        raw[bit / 64] &= !(1u64 << (bit % 64));
        *self = Self::from_raw_words(&raw);
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| {
            if w & (1u64 << 63) != 0 {
                w & (1u64 << 62) == 0
            } else {
                w == 0
            }
        })
    }

    /// Length-prefixed payload: u32 word count, then each word LE.
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.words.len() as u32).to_le_bytes());
        for &w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 4 {
            return Err(PageError::CorruptPage {
                reason: "bitmap payload truncated before length prefix".to_string(),
            });
        }
        let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut cursor = 4;
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            if cursor + 8 > buf.len() {
                return Err(PageError::CorruptPage {
                    reason: "bitmap payload truncated mid-word".to_string(),
                });
            }
            words.push(u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
            cursor += 8;
        }
        Ok((Self { words }, cursor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChunkState {
    Full(CompressedBitmap),
    Delta {
        additions: CompressedBitmap,
        removals: CompressedBitmap,
    },
    Tombstone,
}

/// Versioned, range-scoped compressed bitmap (spec §4.3). Identity is
/// `(page_key, revision, index_type, range_start, range_end)`; the range is
/// always exactly [`DEFAULT_CHUNK_SIZE`] wide.
#[derive(Debug, Clone)]
pub struct BitmapChunkPage {
    page_key: PageKey,
    revision: u32,
    index_type: IndexType,
    range_start: u64,
    range_end: u64,
    state: ChunkState,
}

impl BitmapChunkPage {
    fn new(
        page_key: PageKey,
        revision: u32,
        index_type: IndexType,
        range_start: u64,
        state: ChunkState,
    ) -> Self {
        Self {
            page_key,
            revision,
            index_type,
            range_start,
            range_end: range_start + DEFAULT_CHUNK_SIZE as u64,
            state,
        }
    }

    pub fn create_full(
        page_key: PageKey,
        revision: u32,
        index_type: IndexType,
        range_start: u64,
        bitmap: CompressedBitmap,
    ) -> Self {
        Self::new(page_key, revision, index_type, range_start, ChunkState::Full(bitmap))
    }

    pub fn create_empty_full(page_key: PageKey, revision: u32, index_type: IndexType, range_start: u64) -> Self {
        Self::create_full(page_key, revision, index_type, range_start, CompressedBitmap::empty())
    }

    pub fn create_delta(
        page_key: PageKey,
        revision: u32,
        index_type: IndexType,
        range_start: u64,
        additions: CompressedBitmap,
        removals: CompressedBitmap,
    ) -> Self {
        Self::new(
            page_key,
            revision,
            index_type,
            range_start,
            ChunkState::Delta { additions, removals },
        )
    }

    pub fn create_empty_delta(page_key: PageKey, revision: u32, index_type: IndexType, range_start: u64) -> Self {
        Self::create_delta(
            page_key,
            revision,
            index_type,
            range_start,
            CompressedBitmap::empty(),
            CompressedBitmap::empty(),
        )
    }

    pub fn create_tombstone(page_key: PageKey, revision: u32, index_type: IndexType, range_start: u64) -> Self {
        Self::new(page_key, revision, index_type, range_start, ChunkState::Tombstone)
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn range_start(&self) -> u64 {
        self.range_start
    }

    pub fn range_end(&self) -> u64 {
        self.range_end
    }

    fn bit_offset(&self, key: u64) -> Result<usize> {
        if key < self.range_start || key >= self.range_end {
            return Err(PageError::OutOfRange {
                value: key,
                min: self.range_start,
                bound: self.range_end,
            });
        }
        Ok((key - self.range_start) as usize)
    }

    pub fn add_key(&mut self, key: u64) -> Result<()> {
        let bit = self.bit_offset(key)?;
        match &mut self.state {
            ChunkState::Full(bitmap) => {
                bitmap.set_bit(bit);
                Ok(())
            }
            ChunkState::Delta { additions, removals } => {
                additions.set_bit(bit);
                removals.clear_bit(bit);
                Ok(())
            }
            ChunkState::Tombstone => Err(PageError::Deleted {
                operation: "addKey".to_string(),
            }),
        }
    }

    pub fn remove_key(&mut self, key: u64) -> Result<()> {
        let bit = self.bit_offset(key)?;
        match &mut self.state {
            ChunkState::Full(bitmap) => {
                bitmap.clear_bit(bit);
                Ok(())
            }
            ChunkState::Delta { additions, removals } => {
                removals.set_bit(bit);
                additions.clear_bit(bit);
                Ok(())
            }
            ChunkState::Tombstone => Ok(()),
        }
    }

    pub fn contains_key(&self, key: u64) -> Result<bool> {
        let bit = self.bit_offset(key)?;
        match &self.state {
            ChunkState::Full(bitmap) => Ok(bitmap.get_bit(bit)),
            ChunkState::Delta { .. } | ChunkState::Tombstone => Err(PageError::DeltaMustBeCombined),
        }
    }

    pub fn copy(&self, new_revision: u32) -> Self {
        Self {
            page_key: self.page_key,
            revision: new_revision,
            index_type: self.index_type,
            range_start: self.range_start,
            range_end: self.range_end,
            state: self.state.clone(),
        }
    }

    /// Clones this chunk to Full mode. On a Delta (or Tombstone) chunk this
    /// yields an *empty* Full bitmap rather than failing — preserved as
    /// specified; the caller is responsible for combining with a base
    /// chunk first.
    pub fn copy_as_full(&self, new_revision: u32) -> Self {
        let bitmap = match &self.state {
            ChunkState::Full(bitmap) => bitmap.clone(),
            ChunkState::Delta { .. } | ChunkState::Tombstone => CompressedBitmap::empty(),
        };
        Self::new(self.page_key, new_revision, self.index_type, self.range_start, ChunkState::Full(bitmap))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut flags = 0u8;
        if matches!(self.state, ChunkState::Delta { .. }) {
            flags |= 0b01;
        }
        if matches!(self.state, ChunkState::Tombstone) {
            flags |= 0b10;
        }
        out.push(flags);
        out.extend_from_slice(&self.range_start.to_le_bytes());
        out.extend_from_slice(&self.range_end.to_le_bytes());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.push(self.index_type);
        match &self.state {
            ChunkState::Full(bitmap) => bitmap.encode(&mut out),
            ChunkState::Delta { additions, removals } => {
                additions.encode(&mut out);
                removals.encode(&mut out);
            }
            ChunkState::Tombstone => {}
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        if buf.len() < 1 + 8 + 8 + 4 + 1 {
            return Err(PageError::CorruptPage {
                reason: "bitmap chunk header truncated".to_string(),
            });
        }
        let flags = buf[0];
        let is_delta = flags & 0b01 != 0;
        let is_tombstone = flags & 0b10 != 0;
        let mut cursor = 1;
        let range_start = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let range_end = u64::from_le_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let revision = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let index_type = buf[cursor];
        cursor += 1;

        if range_end.wrapping_sub(range_start) != DEFAULT_CHUNK_SIZE as u64 {
            return Err(PageError::CorruptPage {
                reason: format!(
                    "bitmap chunk range width {} != {}",
                    range_end.wrapping_sub(range_start),
                    DEFAULT_CHUNK_SIZE
                ),
            });
        }

        let state = if is_tombstone {
            ChunkState::Tombstone
        } else if is_delta {
            let (additions, consumed) = CompressedBitmap::decode(&buf[cursor..])?;
            cursor += consumed;
            let (removals, consumed) = CompressedBitmap::decode(&buf[cursor..])?;
            cursor += consumed;
            ChunkState::Delta { additions, removals }
        } else {
            let (bitmap, consumed) = CompressedBitmap::decode(&buf[cursor..])?;
            cursor += consumed;
            ChunkState::Full(bitmap)
        };
        let _ = cursor;

        Ok(Self {
            page_key,
            revision,
            index_type,
            range_start,
            range_end,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wah_round_trips_sparse_and_dense_runs() {
        let mut raw = [0u64; WORDS_PER_CHUNK];
        raw[0] = 0b1010;
        raw[5] = u64::MAX;
        raw[6] = u64::MAX;
        let compressed = CompressedBitmap::from_raw_words(&raw);
        assert_eq!(*compressed.to_raw_words(), raw);
    }

    #[test]
    fn add_and_remove_key_in_full_mode() {
        let mut chunk = BitmapChunkPage::create_empty_full(PageKey::new(1), 0, 7, 0);
        chunk.add_key(5).unwrap();
        assert!(chunk.contains_key(5).unwrap());
        chunk.remove_key(5).unwrap();
        assert!(!chunk.contains_key(5).unwrap());
    }

    #[test]
    fn out_of_range_key_fails() {
        let mut chunk = BitmapChunkPage::create_empty_full(PageKey::new(1), 0, 7, 0);
        assert!(matches!(chunk.add_key(70_000), Err(PageError::OutOfRange { .. })));
    }

    #[test]
    fn delta_keeps_additions_and_removals_disjoint() {
        let mut chunk = BitmapChunkPage::create_empty_delta(PageKey::new(1), 0, 7, 0);
        chunk.add_key(50).unwrap();
        chunk.remove_key(50).unwrap();
        if let ChunkState::Delta { additions, removals } = &chunk.state {
            assert!(!additions.get_bit(50));
            assert!(removals.get_bit(50));
        } else {
            panic!("expected delta state");
        }
    }

    #[test]
    fn contains_key_on_delta_fails() {
        let chunk = BitmapChunkPage::create_empty_delta(PageKey::new(1), 0, 7, 0);
        assert!(matches!(chunk.contains_key(1), Err(PageError::DeltaMustBeCombined)));
    }

    #[test]
    fn tombstone_remove_is_noop_add_fails() {
        let mut chunk = BitmapChunkPage::create_tombstone(PageKey::new(1), 0, 7, 0);
        assert!(chunk.remove_key(1).is_ok());
        assert!(matches!(chunk.add_key(1), Err(PageError::Deleted { .. })));
    }

    #[test]
    fn copy_as_full_of_delta_yields_empty_full() {
        let mut chunk = BitmapChunkPage::create_empty_delta(PageKey::new(1), 0, 7, 0);
        chunk.add_key(1).unwrap();
        let full = chunk.copy_as_full(1);
        assert!(matches!(full.state, ChunkState::Full(ref b) if b.is_empty()));
    }

    #[test]
    fn delta_merge_matches_logical_union_minus_removals() {
        let mut base = BitmapChunkPage::create_empty_full(PageKey::new(1), 0, 7, 0);
        for k in [1u64, 100, 65_535] {
            base.add_key(k).unwrap();
        }
        let mut delta = BitmapChunkPage::create_empty_delta(PageKey::new(1), 1, 7, 0);
        delta.add_key(50).unwrap();
        delta.remove_key(100).unwrap();

        let (additions, removals) = match &delta.state {
            ChunkState::Delta { additions, removals } => (additions.clone(), removals.clone()),
            _ => unreachable!(),
        };
        let base_bitmap = match &base.state {
            ChunkState::Full(b) => b.clone(),
            _ => unreachable!(),
        };

        let mut merged_words = *base_bitmap.to_raw_words();
        let add_words = additions.to_raw_words();
        let rem_words = removals.to_raw_words();
        for i in 0..WORDS_PER_CHUNK {
            merged_words[i] = (merged_words[i] | add_words[i]) & !rem_words[i];
        }
        let merged = CompressedBitmap::from_raw_words(&merged_words);
        assert!(merged.get_bit(1));
        assert!(merged.get_bit(50));
        assert!(!merged.get_bit(100));
        assert!(merged.get_bit(65_535));
    }

    #[test]
    fn encode_decode_round_trips_full_and_delta() {
        let mut full = BitmapChunkPage::create_empty_full(PageKey::new(9), 3, 2, 65_536);
        full.add_key(65_600).unwrap();
        let bytes = full.encode();
        let decoded = BitmapChunkPage::decode(&bytes, PageKey::new(9)).unwrap();
        assert!(decoded.contains_key(65_600).unwrap());
        assert_eq!(decoded.revision(), 3);
        assert_eq!(decoded.range_start(), 65_536);

        let mut delta = BitmapChunkPage::create_empty_delta(PageKey::new(9), 4, 2, 0);
        delta.add_key(10).unwrap();
        delta.remove_key(20).unwrap();
        let bytes = delta.encode();
        let decoded = BitmapChunkPage::decode(&bytes, PageKey::new(9)).unwrap();
        assert!(matches!(decoded.state, ChunkState::Delta { .. }));
    }

    #[test]
    fn tombstone_round_trips() {
        let tomb = BitmapChunkPage::create_tombstone(PageKey::new(1), 0, 1, 0);
        let bytes = tomb.encode();
        let decoded = BitmapChunkPage::decode(&bytes, PageKey::new(1)).unwrap();
        assert!(matches!(decoded.state, ChunkState::Tombstone));
    }
}
