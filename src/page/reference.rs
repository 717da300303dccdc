//! `PageReference` — the edge of the page graph (spec §4.1).
//!
//! Grounded on `buffer::page_cache::BufferFrame`'s atomic pin-count plus
//! `index::IndexKey`'s split between derived and hand-rolled trait impls:
//! here we hand-roll `Hash`/`PartialEq`/`Eq` because the spec pins their
//! exact field set and a cached hash that derive can't express.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::common::PageKey;
use crate::error::{PageError, Result};

/// The edge of the page graph: a logical pointer to a child page.
///
/// Equality and hash are determined exactly by `{database_tag,
/// resource_tag, intent_log_key, persistent_key}` (spec P-invariant in
/// §3); the in-memory pointer, content hash, and fragment list are mutable
/// after insertion into hash-based containers and must never be consulted.
pub struct PageReference<P> {
    in_memory_page: Option<Arc<P>>,
    persistent_key: Option<PageKey>,
    intent_log_key: Option<PageKey>,
    database_tag: u64,
    resource_tag: u64,
    content_hash: u64,
    prior_fragments: Vec<PageKey>,
    guard_count: AtomicU32,
    cached_hash: Cell<Option<u64>>,
}

impl<P> PageReference<P> {
    pub fn new(database_tag: u64, resource_tag: u64) -> Self {
        Self {
            in_memory_page: None,
            persistent_key: None,
            intent_log_key: None,
            database_tag,
            resource_tag,
            content_hash: 0,
            prior_fragments: Vec::new(),
            guard_count: AtomicU32::new(0),
            cached_hash: Cell::new(None),
        }
    }

    pub fn persistent_key(&self) -> Option<PageKey> {
        self.persistent_key
    }

    pub fn intent_log_key(&self) -> Option<PageKey> {
        self.intent_log_key
    }

    pub fn database_tag(&self) -> u64 {
        self.database_tag
    }

    pub fn resource_tag(&self) -> u64 {
        self.resource_tag
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    pub fn prior_fragments(&self) -> &[PageKey] {
        &self.prior_fragments
    }

    pub fn in_memory_page(&self) -> Option<&Arc<P>> {
        self.in_memory_page.as_ref()
    }

    pub fn set_in_memory_page(&mut self, page: Option<Arc<P>>) {
        // Not part of the cached-equality key: no invalidation needed.
        self.in_memory_page = page;
    }

    pub fn set_persistent_key(&mut self, key: Option<PageKey>) {
        self.persistent_key = key;
        self.invalidate_hash();
    }

    pub fn set_intent_log_key(&mut self, key: Option<PageKey>) {
        self.intent_log_key = key;
        self.invalidate_hash();
    }

    pub fn set_database_tag(&mut self, tag: u64) {
        self.database_tag = tag;
        self.invalidate_hash();
    }

    pub fn set_resource_tag(&mut self, tag: u64) {
        self.resource_tag = tag;
        self.invalidate_hash();
    }

    pub fn set_content_hash(&mut self, hash: u64) {
        self.content_hash = hash;
    }

    pub fn add_prior_fragment(&mut self, key: PageKey) {
        self.prior_fragments.push(key);
    }

    fn invalidate_hash(&mut self) {
        self.cached_hash.set(None);
    }

    /// Increment the guard count, preventing eviction while held.
    pub fn acquire_guard(&self) {
        self.guard_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the guard count. Fails with [`PageError::GuardMisuse`] if
    /// the count would underflow.
    pub fn release_guard(&self) -> Result<()> {
        let prev = self.guard_count.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |count| count.checked_sub(1),
        );
        match prev {
            Ok(_) => Ok(()),
            Err(_) => Err(PageError::GuardMisuse {
                reason: "released a page reference guard below zero".to_string(),
            }),
        }
    }

    pub fn guard_count(&self) -> u32 {
        self.guard_count.load(Ordering::Acquire)
    }

    pub fn is_guarded(&self) -> bool {
        self.guard_count() > 0
    }

    fn identity_fields(&self) -> (u64, u64, Option<PageKey>, Option<PageKey>) {
        (
            self.database_tag,
            self.resource_tag,
            self.intent_log_key,
            self.persistent_key,
        )
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.identity_fields().hash(&mut hasher);
        hasher.finish()
    }

    /// The cached identity hash, computing and memoizing it if the last
    /// mutation invalidated the cache.
    pub fn identity_hash(&self) -> u64 {
        if let Some(h) = self.cached_hash.get() {
            return h;
        }
        let h = self.compute_hash();
        self.cached_hash.set(Some(h));
        h
    }
}

impl<P> fmt::Debug for PageReference<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageReference")
            .field("database_tag", &self.database_tag)
            .field("resource_tag", &self.resource_tag)
            .field("intent_log_key", &self.intent_log_key)
            .field("persistent_key", &self.persistent_key)
            .field("guard_count", &self.guard_count())
            .field("has_in_memory_page", &self.in_memory_page.is_some())
            .finish()
    }
}

impl<P> PartialEq for PageReference<P> {
    fn eq(&self, other: &Self) -> bool {
        self.identity_fields() == other.identity_fields()
    }
}

impl<P> Eq for PageReference<P> {}

impl<P> Hash for PageReference<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_hash().hash(state);
    }
}
