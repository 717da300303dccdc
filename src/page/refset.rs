//! Reference-set delegates for interior pages (spec §3/§4.2).
//!
//! Three representations of a fixed-arity reference array, density-graded
//! from sparse to dense, with a one-way upgrade rule: `Sparse4 → Bitmap →
//! Dense`, never the reverse. Grounded on `index::mod::Index`'s
//! enum-of-variants dispatch (one match per concrete representation, no
//! trait object) and the redesign flag that unifies every delegate's
//! insert outcome into one clean enum instead of the source's inverted
//! per-variant booleans.

use crate::page::reference::PageReference;

/// Outcome of `ReferenceSet::set_or_create`. Replaces the source's
/// per-variant inverted boolean return (spec §9 redesign flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Updated,
    /// The delegate cannot hold another distinct offset at its current
    /// density; the caller (here, `ReferenceSet` itself) must upgrade to
    /// the next-denser layout and retry.
    MustUpgrade,
}

/// Density threshold (fraction of `arity`) above which `BitmapSparse`
/// reports `MustUpgrade` rather than keep growing its dense entry array.
/// Not pinned by the spec's text; chosen so that past half occupancy,
/// direct indexing (Dense) beats the popcount-ranked lookup.
const BITMAP_UPGRADE_DENSITY: f64 = 0.5;

struct Sparse4<P> {
    slots: [Option<(usize, PageReference<P>)>; 4],
}

impl<P> Sparse4<P> {
    fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    fn get(&self, offset: usize) -> Option<&PageReference<P>> {
        self.slots
            .iter()
            .find_map(|s| s.as_ref().filter(|(o, _)| *o == offset).map(|(_, r)| r))
    }

    fn get_mut(&mut self, offset: usize) -> Option<&mut PageReference<P>> {
        self.slots
            .iter_mut()
            .find_map(|s| s.as_mut().filter(|(o, _)| *o == offset).map(|(_, r)| r))
    }

    fn try_insert(
        &mut self,
        offset: usize,
        reference: PageReference<P>,
    ) -> Result<InsertOutcome, PageReference<P>> {
        if let Some(slot) = self.get_mut(offset) {
            *slot = reference;
            return Ok(InsertOutcome::Updated);
        }
        if let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) {
            *free = Some((offset, reference));
            return Ok(InsertOutcome::Inserted);
        }
        Err(reference)
    }

    fn into_entries(self) -> Vec<(usize, PageReference<P>)> {
        self.slots.into_iter().flatten().collect()
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &PageReference<P>)> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(o, r)| (*o, r)))
    }
}

struct BitmapSparse<P> {
    arity: usize,
    /// One bit per offset; bit i set iff offset i is populated.
    presence: Vec<u64>,
    /// Populated entries in ascending-offset order, parallel to the set
    /// bits of `presence`.
    entries: Vec<PageReference<P>>,
}

impl<P> BitmapSparse<P> {
    fn new(arity: usize) -> Self {
        Self {
            arity,
            presence: vec![0u64; arity.div_ceil(64)],
            entries: Vec::new(),
        }
    }

    fn is_set(&self, offset: usize) -> bool {
        (self.presence[offset / 64] >> (offset % 64)) & 1 == 1
    }

    fn set_bit(&mut self, offset: usize) {
        self.presence[offset / 64] |= 1u64 << (offset % 64);
    }

    /// Rank (number of set bits strictly before `offset`), which is also
    /// the entry's position in `entries`.
    fn rank(&self, offset: usize) -> usize {
        let word = offset / 64;
        let bit = offset % 64;
        let mut count = 0usize;
        for w in self.presence.iter().take(word) {
            count += w.count_ones() as usize;
        }
        if bit > 0 {
            count += (self.presence[word] & ((1u64 << bit) - 1)).count_ones() as usize;
        }
        count
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, offset: usize) -> Option<&PageReference<P>> {
        if !self.is_set(offset) {
            return None;
        }
        self.entries.get(self.rank(offset))
    }

    fn get_mut(&mut self, offset: usize) -> Option<&mut PageReference<P>> {
        if !self.is_set(offset) {
            return None;
        }
        let idx = self.rank(offset);
        self.entries.get_mut(idx)
    }

    fn try_insert(
        &mut self,
        offset: usize,
        reference: PageReference<P>,
    ) -> Result<InsertOutcome, PageReference<P>> {
        if self.is_set(offset) {
            let idx = self.rank(offset);
            self.entries[idx] = reference;
            return Ok(InsertOutcome::Updated);
        }
        let density = self.len() as f64 / self.arity.max(1) as f64;
        if density >= BITMAP_UPGRADE_DENSITY {
            return Err(reference);
        }
        let idx = self.rank(offset);
        self.entries.insert(idx, reference);
        self.set_bit(offset);
        Ok(InsertOutcome::Inserted)
    }

    fn into_entries(self) -> Vec<(usize, PageReference<P>)> {
        let mut offsets = Vec::with_capacity(self.entries.len());
        for word_idx in 0..self.presence.len() {
            let mut word = self.presence[word_idx];
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                offsets.push(word_idx * 64 + bit);
                word &= word - 1;
            }
        }
        offsets.into_iter().zip(self.entries).collect()
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &PageReference<P>)> {
        let mut offsets = Vec::with_capacity(self.entries.len());
        for (word_idx, &word) in self.presence.iter().enumerate() {
            let mut word = word;
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                offsets.push(word_idx * 64 + bit);
                word &= word - 1;
            }
        }
        offsets.into_iter().zip(self.entries.iter())
    }
}

struct Dense<P> {
    entries: Vec<Option<PageReference<P>>>,
}

impl<P> Dense<P> {
    fn new(arity: usize) -> Self {
        let mut entries = Vec::with_capacity(arity);
        entries.resize_with(arity, || None);
        Self { entries }
    }

    fn get(&self, offset: usize) -> Option<&PageReference<P>> {
        self.entries.get(offset).and_then(|s| s.as_ref())
    }

    fn get_mut(&mut self, offset: usize) -> Option<&mut PageReference<P>> {
        self.entries.get_mut(offset).and_then(|s| s.as_mut())
    }

    fn try_insert(
        &mut self,
        offset: usize,
        reference: PageReference<P>,
    ) -> Result<InsertOutcome, PageReference<P>> {
        match self.entries.get_mut(offset) {
            Some(slot) => {
                let outcome = if slot.is_some() {
                    InsertOutcome::Updated
                } else {
                    InsertOutcome::Inserted
                };
                *slot = Some(reference);
                Ok(outcome)
            }
            None => Err(reference),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &PageReference<P>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(o, s)| s.as_ref().map(|r| (o, r)))
    }
}

enum Delegate<P> {
    Sparse4(Sparse4<P>),
    Bitmap(BitmapSparse<P>),
    Dense(Dense<P>),
}

/// A fixed-arity reference array with automatic density upgrade. Never
/// downgrades: once `Bitmap`, never back to `Sparse4`; once `Dense`, never
/// back down.
pub struct ReferenceSet<P> {
    arity: usize,
    database_tag: u64,
    resource_tag: u64,
    delegate: Delegate<P>,
}

impl<P> ReferenceSet<P> {
    pub fn new(arity: usize, database_tag: u64, resource_tag: u64) -> Self {
        Self {
            arity,
            database_tag,
            resource_tag,
            delegate: Delegate::Sparse4(Sparse4::new()),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn get(&self, offset: usize) -> Option<&PageReference<P>> {
        match &self.delegate {
            Delegate::Sparse4(d) => d.get(offset),
            Delegate::Bitmap(d) => d.get(offset),
            Delegate::Dense(d) => d.get(offset),
        }
    }

    pub fn get_mut(&mut self, offset: usize) -> Option<&mut PageReference<P>> {
        match &mut self.delegate {
            Delegate::Sparse4(d) => d.get_mut(offset),
            Delegate::Bitmap(d) => d.get_mut(offset),
            Delegate::Dense(d) => d.get_mut(offset),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.get(offset).is_some()
    }

    fn upgrade_from_sparse4(&mut self) {
        let arity = self.arity;
        let placeholder = Delegate::Bitmap(BitmapSparse::new(arity));
        if let Delegate::Sparse4(old) = std::mem::replace(&mut self.delegate, placeholder) {
            let mut bitmap = BitmapSparse::new(arity);
            for (offset, reference) in old.into_entries() {
                bitmap
                    .try_insert(offset, reference)
                    .ok()
                    .expect("reinsert during sparse4->bitmap upgrade must fit");
            }
            self.delegate = Delegate::Bitmap(bitmap);
        }
    }

    fn upgrade_from_bitmap(&mut self) {
        let arity = self.arity;
        let placeholder = Delegate::Dense(Dense::new(arity));
        if let Delegate::Bitmap(old) = std::mem::replace(&mut self.delegate, placeholder) {
            let mut dense = Dense::new(arity);
            for (offset, reference) in old.into_entries() {
                dense
                    .try_insert(offset, reference)
                    .ok()
                    .expect("reinsert during bitmap->dense upgrade must fit");
            }
            self.delegate = Delegate::Dense(dense);
        }
    }

    /// Attempt insertion at the current layout; on `MustUpgrade`, replace
    /// the delegate with the next-denser layout and retry (spec §4.2).
    pub fn set_or_create(&mut self, offset: usize, mut reference: PageReference<P>) -> InsertOutcome {
        loop {
            let attempt = match &mut self.delegate {
                Delegate::Sparse4(d) => d.try_insert(offset, reference),
                Delegate::Bitmap(d) => d.try_insert(offset, reference),
                Delegate::Dense(d) => {
                    return d
                        .try_insert(offset, reference)
                        .expect("dense insert never fails for offset < arity");
                }
            };
            match attempt {
                Ok(outcome) => return outcome,
                Err(back) => {
                    reference = back;
                    match &self.delegate {
                        Delegate::Sparse4(_) => self.upgrade_from_sparse4(),
                        Delegate::Bitmap(_) => self.upgrade_from_bitmap(),
                        Delegate::Dense(_) => unreachable!("dense delegate never reports full"),
                    }
                }
            }
        }
    }

    /// Fetch the reference at `offset`, creating a fresh default one (with
    /// this set's database/resource tags) if absent.
    pub fn get_or_create(&mut self, offset: usize) -> &mut PageReference<P> {
        if !self.contains(offset) {
            let fresh = PageReference::new(self.database_tag, self.resource_tag);
            self.set_or_create(offset, fresh);
        }
        self.get_mut(offset).expect("just inserted")
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (usize, &PageReference<P>)> + '_> {
        match &self.delegate {
            Delegate::Sparse4(d) => Box::new(d.iter()),
            Delegate::Bitmap(d) => Box::new(d.iter()),
            Delegate::Dense(d) => Box::new(d.iter()),
        }
    }

    #[cfg(test)]
    fn layout_name(&self) -> &'static str {
        match &self.delegate {
            Delegate::Sparse4(_) => "sparse4",
            Delegate::Bitmap(_) => "bitmap",
            Delegate::Dense(_) => "dense",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(tag: u64) -> PageReference<u8> {
        let mut r = PageReference::new(1, 2);
        r.set_content_hash(tag);
        r
    }

    #[test]
    fn upgrades_progress_sparse_to_bitmap_to_dense() {
        let mut set: ReferenceSet<u8> = ReferenceSet::new(64, 1, 2);
        assert_eq!(set.layout_name(), "sparse4");

        for i in 0..4 {
            set.set_or_create(i, reference(i as u64));
        }
        assert_eq!(set.layout_name(), "sparse4");

        set.set_or_create(10, reference(10));
        assert_eq!(set.layout_name(), "bitmap");

        // Push density past the bitmap->dense threshold (>= 32 of 64 entries).
        for i in 20..50 {
            set.set_or_create(i, reference(i as u64));
        }
        assert_eq!(set.layout_name(), "dense");
    }

    #[test]
    fn no_downgrade_after_upgrade() {
        let mut set: ReferenceSet<u8> = ReferenceSet::new(8, 1, 2);
        for i in 0..8 {
            set.set_or_create(i, reference(i as u64));
        }
        assert_eq!(set.layout_name(), "dense");
        // Removing entries isn't supported (no remove op in spec); layout
        // stays Dense regardless of subsequent reads.
        assert!(set.get(0).is_some());
        assert_eq!(set.layout_name(), "dense");
    }

    #[test]
    fn set_then_get_returns_last_written_value() {
        let mut set: ReferenceSet<u8> = ReferenceSet::new(32, 1, 2);
        for i in 0..20 {
            set.set_or_create(i, reference(i as u64));
        }
        for i in 0..20 {
            assert_eq!(set.get(i).unwrap().content_hash(), i as u64);
        }
        for i in 20..32 {
            assert!(set.get(i).is_none());
        }
    }

    #[test]
    fn update_existing_offset_reports_updated() {
        let mut set: ReferenceSet<u8> = ReferenceSet::new(16, 1, 2);
        assert_eq!(set.set_or_create(0, reference(1)), InsertOutcome::Inserted);
        assert_eq!(set.set_or_create(0, reference(2)), InsertOutcome::Updated);
        assert_eq!(set.get(0).unwrap().content_hash(), 2);
    }

    #[test]
    fn get_or_create_default_constructs_missing_offset() {
        let mut set: ReferenceSet<u8> = ReferenceSet::new(16, 7, 8);
        let r = set.get_or_create(3);
        assert_eq!(r.database_tag(), 7);
        assert_eq!(r.resource_tag(), 8);
        assert!(set.contains(3));
    }
}
