//! Metadata pages (spec §2/§3 component table: "Roots and directories
//! referring to index trees and naming tables"): `UberPage`,
//! `RevisionRootPage`, `IndirectPage`, `NamePage`, `PathPage`,
//! `PathSummaryPage`, `CasPage`, `DeweyIdPage`.
//!
//! Grounded on `storage::page::Page` (id + raw bytes + dirty flag) as the
//! minimal "plain data with an identity" shape, extended per page type
//! with the fields the spec's component table names for it. The spec
//! leaves these pages' internals unspecified beyond "roots and
//! directories referring to index trees and naming tables" (§2), so the
//! field sets below are a direct, unembellished reading of that sentence
//! rather than a reverse-engineering of any particular source layout.

use std::collections::HashMap;

use crate::common::{NodeKey, PageKey};
use crate::error::{PageError, Result};
use crate::page::kv_leaf::KeyValueLeafPage;
use crate::page::reference::PageReference;
use crate::page::refset::ReferenceSet;
use crate::page::varint::{read_u16, read_u32, read_u64, read_u8, read_varint, write_varint};

/// A generic interior reference-set page (spec tag 4, "Indirect page"):
/// the persisted form of a [`ReferenceSet`]. Only `(offset, persistentKey)`
/// pairs are durable; the in-memory pointer, content hash, and guard
/// count are runtime/cache bookkeeping that is reconstructed, not stored.
pub struct IndirectPage<P> {
    page_key: PageKey,
    revision: u32,
    references: ReferenceSet<P>,
}

impl<P> IndirectPage<P> {
    pub fn new(page_key: PageKey, revision: u32, arity: usize, database_tag: u64, resource_tag: u64) -> Self {
        Self {
            page_key,
            revision,
            references: ReferenceSet::new(arity, database_tag, resource_tag),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn references(&self) -> &ReferenceSet<P> {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut ReferenceSet<P> {
        &mut self.references
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.references.arity() as u32).to_le_bytes());
        let entries: Vec<(usize, PageKey)> = self
            .references
            .iter()
            .filter_map(|(offset, reference)| reference.persistent_key().map(|key| (offset, key)))
            .collect();
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (offset, key) in entries {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&key.value().to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey, database_tag: u64, resource_tag: u64) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded indirect page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let arity = read_u32(buf, &mut cursor)? as usize;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = IndirectPage::new(page_key, revision, arity, database_tag, resource_tag);
        for _ in 0..count {
            let offset = read_u32(buf, &mut cursor)? as usize;
            let key = PageKey::new(read_u64(buf, &mut cursor)?);
            let reference = page.references.get_or_create(offset);
            reference.set_persistent_key(Some(key));
        }
        Ok(page)
    }
}

/// The tree of unified leaf pages hangs off one level of [`IndirectPage`]
/// indirection per revision; deeper fan-out is represented by further
/// `IndirectPage<KeyValueLeafPage>` instances chained through
/// `PageReference`, matching how `ReferenceSet` already treats every
/// entry as an opaque child reference regardless of depth.
pub type NodeIndirectPage = IndirectPage<KeyValueLeafPage>;

/// The durable root: one reference per revision into that revision's
/// [`RevisionRootPage`] (spec tag 3).
pub struct UberPage {
    page_key: PageKey,
    revision_count: u32,
    revision_roots: ReferenceSet<RevisionRootPage>,
}

/// Upper bound on the number of revisions a single `UberPage` reference
/// set can address before the store would need to chain to a further
/// `UberPage` (not yet needed by anything in this crate, but bounds the
/// `BitmapSparse`/`Dense` delegate allocations to a sane size up front).
const MAX_REVISIONS: usize = 1 << 20;

impl UberPage {
    pub fn new(page_key: PageKey, database_tag: u64, resource_tag: u64) -> Self {
        Self {
            page_key,
            revision_count: 0,
            revision_roots: ReferenceSet::new(MAX_REVISIONS, database_tag, resource_tag),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    /// Appends a new revision root, returning its revision number.
    pub fn commit_revision(&mut self, reference: PageReference<RevisionRootPage>) -> u32 {
        let revision = self.revision_count;
        self.revision_roots.set_or_create(revision as usize, reference);
        self.revision_count += 1;
        revision
    }

    pub fn revision_root(&self, revision: u32) -> Option<&PageReference<RevisionRootPage>> {
        self.revision_roots.get(revision as usize)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision_count.to_le_bytes());
        let entries: Vec<(usize, PageKey)> = self
            .revision_roots
            .iter()
            .filter_map(|(offset, reference)| reference.persistent_key().map(|key| (offset, key)))
            .collect();
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (offset, key) in entries {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&key.value().to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey, database_tag: u64, resource_tag: u64) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded uber page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision_count = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = UberPage::new(page_key, database_tag, resource_tag);
        page.revision_count = revision_count;
        for _ in 0..count {
            let offset = read_u32(buf, &mut cursor)? as usize;
            let key = PageKey::new(read_u64(buf, &mut cursor)?);
            let reference = page.revision_roots.get_or_create(offset);
            reference.set_persistent_key(Some(key));
        }
        Ok(page)
    }
}

/// The root of one committed revision: pointers into that revision's node
/// tree and the naming/index side-tables (spec tag 5).
pub struct RevisionRootPage {
    page_key: PageKey,
    revision: u32,
    revision_timestamp_millis: u64,
    node_tree: PageReference<NodeIndirectPage>,
    name_page: PageReference<NamePage>,
    path_summary_page: PageReference<PathSummaryPage>,
    cas_page: PageReference<CasPage>,
    path_page: PageReference<PathPage>,
}

impl RevisionRootPage {
    pub fn new(page_key: PageKey, revision: u32, revision_timestamp_millis: u64, database_tag: u64, resource_tag: u64) -> Self {
        Self {
            page_key,
            revision,
            revision_timestamp_millis,
            node_tree: PageReference::new(database_tag, resource_tag),
            name_page: PageReference::new(database_tag, resource_tag),
            path_summary_page: PageReference::new(database_tag, resource_tag),
            cas_page: PageReference::new(database_tag, resource_tag),
            path_page: PageReference::new(database_tag, resource_tag),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn revision_timestamp_millis(&self) -> u64 {
        self.revision_timestamp_millis
    }

    pub fn node_tree(&self) -> &PageReference<NodeIndirectPage> {
        &self.node_tree
    }

    pub fn node_tree_mut(&mut self) -> &mut PageReference<NodeIndirectPage> {
        &mut self.node_tree
    }

    pub fn name_page(&self) -> &PageReference<NamePage> {
        &self.name_page
    }

    pub fn name_page_mut(&mut self) -> &mut PageReference<NamePage> {
        &mut self.name_page
    }

    pub fn path_summary_page(&self) -> &PageReference<PathSummaryPage> {
        &self.path_summary_page
    }

    pub fn path_summary_page_mut(&mut self) -> &mut PageReference<PathSummaryPage> {
        &mut self.path_summary_page
    }

    pub fn cas_page(&self) -> &PageReference<CasPage> {
        &self.cas_page
    }

    pub fn cas_page_mut(&mut self) -> &mut PageReference<CasPage> {
        &mut self.cas_page
    }

    pub fn path_page(&self) -> &PageReference<PathPage> {
        &self.path_page
    }

    pub fn path_page_mut(&mut self) -> &mut PageReference<PathPage> {
        &mut self.path_page
    }

    fn write_optional_key(out: &mut Vec<u8>, key: Option<PageKey>) {
        out.extend_from_slice(&key.map(|k| k.value()).unwrap_or(0).to_le_bytes());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&self.revision_timestamp_millis.to_le_bytes());
        Self::write_optional_key(&mut out, self.node_tree.persistent_key());
        Self::write_optional_key(&mut out, self.name_page.persistent_key());
        Self::write_optional_key(&mut out, self.path_summary_page.persistent_key());
        Self::write_optional_key(&mut out, self.cas_page.persistent_key());
        Self::write_optional_key(&mut out, self.path_page.persistent_key());
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey, database_tag: u64, resource_tag: u64) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded revision root page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let revision_timestamp_millis = read_u64(buf, &mut cursor)?;
        let mut page = RevisionRootPage::new(page_key, revision, revision_timestamp_millis, database_tag, resource_tag);
        let node_tree_key = read_u64(buf, &mut cursor)?;
        if node_tree_key != 0 {
            page.node_tree.set_persistent_key(Some(PageKey::new(node_tree_key)));
        }
        let name_key = read_u64(buf, &mut cursor)?;
        if name_key != 0 {
            page.name_page.set_persistent_key(Some(PageKey::new(name_key)));
        }
        let path_summary_key = read_u64(buf, &mut cursor)?;
        if path_summary_key != 0 {
            page.path_summary_page.set_persistent_key(Some(PageKey::new(path_summary_key)));
        }
        let cas_key = read_u64(buf, &mut cursor)?;
        if cas_key != 0 {
            page.cas_page.set_persistent_key(Some(PageKey::new(cas_key)));
        }
        let path_key = read_u64(buf, &mut cursor)?;
        if path_key != 0 {
            page.path_page.set_persistent_key(Some(PageKey::new(path_key)));
        }
        Ok(page)
    }
}

/// The naming dictionary: interned name id → UTF-8 name bytes (spec tag 2).
pub struct NamePage {
    page_key: PageKey,
    revision: u32,
    names: HashMap<u32, Vec<u8>>,
}

impl NamePage {
    pub fn new(page_key: PageKey, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            names: HashMap::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn insert(&mut self, name_id: u32, name: Vec<u8>) {
        self.names.insert(name_id, name);
    }

    pub fn name(&self, name_id: u32) -> Option<&[u8]> {
        self.names.get(&name_id).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.names.len() as u32).to_le_bytes());
        for (id, name) in &self.names {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(name);
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded name page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = NamePage::new(page_key, revision);
        for _ in 0..count {
            let id = read_u32(buf, &mut cursor)?;
            let len = read_u16(buf, &mut cursor)? as usize;
            let bytes = buf.get(cursor..cursor + len).ok_or_else(|| PageError::CorruptPage {
                reason: "name page entry truncated".to_string(),
            })?;
            cursor += len;
            page.names.insert(id, bytes.to_vec());
        }
        Ok(page)
    }
}

/// One entry of the path summary/path dictionary: a path node's parent
/// link and the name it was reached by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNodeEntry {
    pub path_node_id: u64,
    pub parent_path_node_id: u64,
    pub name_id: u32,
}

/// The distinct-paths dictionary (spec tag 10): `path_node_id → (parent,
/// name)`, from which a full path string is reconstructed by walking
/// parent links.
pub struct PathPage {
    page_key: PageKey,
    revision: u32,
    entries: Vec<PathNodeEntry>,
}

impl PathPage {
    pub fn new(page_key: PageKey, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            entries: Vec::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn insert(&mut self, entry: PathNodeEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PathNodeEntry] {
        &self.entries
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.path_node_id.to_le_bytes());
            out.extend_from_slice(&entry.parent_path_node_id.to_le_bytes());
            out.extend_from_slice(&entry.name_id.to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded path page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = PathPage::new(page_key, revision);
        for _ in 0..count {
            let path_node_id = read_u64(buf, &mut cursor)?;
            let parent_path_node_id = read_u64(buf, &mut cursor)?;
            let name_id = read_u32(buf, &mut cursor)?;
            page.entries.push(PathNodeEntry {
                path_node_id,
                parent_path_node_id,
                name_id,
            });
        }
        Ok(page)
    }
}

/// Indexes node keys by the path they were reached through (spec tag 6):
/// `path_node_id → HOT secondary index root` over node keys sharing that
/// path.
pub struct PathSummaryPage {
    page_key: PageKey,
    revision: u32,
    path_index_roots: HashMap<u64, PageKey>,
}

impl PathSummaryPage {
    pub fn new(page_key: PageKey, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            path_index_roots: HashMap::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn set_root(&mut self, path_node_id: u64, root: PageKey) {
        self.path_index_roots.insert(path_node_id, root);
    }

    pub fn root(&self, path_node_id: u64) -> Option<PageKey> {
        self.path_index_roots.get(&path_node_id).copied()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.path_index_roots.len() as u32).to_le_bytes());
        for (path_node_id, root) in &self.path_index_roots {
            out.extend_from_slice(&path_node_id.to_le_bytes());
            out.extend_from_slice(&root.value().to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded path summary page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = PathSummaryPage::new(page_key, revision);
        for _ in 0..count {
            let path_node_id = read_u64(buf, &mut cursor)?;
            let root = PageKey::new(read_u64(buf, &mut cursor)?);
            page.path_index_roots.insert(path_node_id, root);
        }
        Ok(page)
    }
}

/// Content-addressable-storage index (spec tag 8): typed atomic-value hash
/// → the set of node keys holding that value, for value-equality lookups.
pub struct CasPage {
    page_key: PageKey,
    revision: u32,
    entries: Vec<(u8, u64, NodeKey)>,
}

impl CasPage {
    pub fn new(page_key: PageKey, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            entries: Vec::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    /// `type_tag` identifies the atomic value's type (the record
    /// serializer's domain); `value_hash` is its content hash.
    pub fn insert(&mut self, type_tag: u8, value_hash: u64, node_key: NodeKey) {
        self.entries.push((type_tag, value_hash, node_key));
    }

    pub fn entries_for(&self, type_tag: u8, value_hash: u64) -> impl Iterator<Item = NodeKey> + '_ {
        self.entries
            .iter()
            .filter(move |(t, h, _)| *t == type_tag && *h == value_hash)
            .map(|(_, _, key)| *key)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (type_tag, value_hash, node_key) in &self.entries {
            out.push(*type_tag);
            out.extend_from_slice(&value_hash.to_le_bytes());
            out.extend_from_slice(&node_key.value().to_le_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded cas page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = CasPage::new(page_key, revision);
        for _ in 0..count {
            let type_tag = read_u8(buf, &mut cursor)?;
            let value_hash = read_u64(buf, &mut cursor)?;
            let node_key = NodeKey::new(read_u64(buf, &mut cursor)?);
            page.entries.push((type_tag, value_hash, node_key));
        }
        Ok(page)
    }
}

/// DeweyID assignment table (spec tag 11): node key → its DeweyID path
/// bytes, for pages that keep DeweyIDs out of the leaf page trailer.
pub struct DeweyIdPage {
    page_key: PageKey,
    revision: u32,
    entries: HashMap<NodeKey, Vec<u8>>,
}

impl DeweyIdPage {
    pub fn new(page_key: PageKey, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            entries: HashMap::new(),
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn set(&mut self, node_key: NodeKey, dewey_id: Vec<u8>) {
        self.entries.insert(node_key, dewey_id);
    }

    pub fn get(&self, node_key: NodeKey) -> Option<&[u8]> {
        self.entries.get(&node_key).map(|v| v.as_slice())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.page_key.value());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (node_key, dewey_id) in &self.entries {
            out.extend_from_slice(&node_key.value().to_le_bytes());
            out.extend_from_slice(&(dewey_id.len() as u16).to_le_bytes());
            out.extend_from_slice(dewey_id);
        }
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> Result<Self> {
        let mut cursor = 0usize;
        let (decoded_key, n) = read_varint(buf, cursor)?;
        cursor += n;
        if decoded_key != page_key.value() {
            return Err(PageError::CorruptPage {
                reason: format!("decoded dewey id page key {} does not match expected {}", decoded_key, page_key),
            });
        }
        let revision = read_u32(buf, &mut cursor)?;
        let count = read_u32(buf, &mut cursor)? as usize;
        let mut page = DeweyIdPage::new(page_key, revision);
        for _ in 0..count {
            let node_key = NodeKey::new(read_u64(buf, &mut cursor)?);
            let len = read_u16(buf, &mut cursor)? as usize;
            let bytes = buf.get(cursor..cursor + len).ok_or_else(|| PageError::CorruptPage {
                reason: "dewey id page entry truncated".to_string(),
            })?;
            cursor += len;
            page.entries.insert(node_key, bytes.to_vec());
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uber_page_commits_revisions_in_order() {
        let mut page = UberPage::new(PageKey::new(1), 1, 1);
        let mut root_ref = PageReference::new(1, 1);
        root_ref.set_persistent_key(Some(PageKey::new(100)));
        let revision = page.commit_revision(root_ref);
        assert_eq!(revision, 0);
        assert_eq!(page.revision_count(), 1);
        assert_eq!(page.revision_root(0).unwrap().persistent_key(), Some(PageKey::new(100)));
    }

    #[test]
    fn uber_page_encode_decode_round_trips() {
        let mut page = UberPage::new(PageKey::new(1), 1, 1);
        let mut root_ref = PageReference::new(1, 1);
        root_ref.set_persistent_key(Some(PageKey::new(42)));
        page.commit_revision(root_ref);
        let bytes = page.encode();
        let decoded = UberPage::decode(&bytes, PageKey::new(1), 1, 1).unwrap();
        assert_eq!(decoded.revision_count(), 1);
        assert_eq!(decoded.revision_root(0).unwrap().persistent_key(), Some(PageKey::new(42)));
    }

    #[test]
    fn revision_root_page_encode_decode_round_trips() {
        let mut page = RevisionRootPage::new(PageKey::new(5), 3, 1_700_000_000_000, 1, 1);
        page.node_tree_mut().set_persistent_key(Some(PageKey::new(10)));
        page.name_page_mut().set_persistent_key(Some(PageKey::new(11)));
        let bytes = page.encode();
        let decoded = RevisionRootPage::decode(&bytes, PageKey::new(5), 1, 1).unwrap();
        assert_eq!(decoded.revision(), 3);
        assert_eq!(decoded.revision_timestamp_millis(), 1_700_000_000_000);
        assert_eq!(decoded.node_tree().persistent_key(), Some(PageKey::new(10)));
        assert_eq!(decoded.name_page().persistent_key(), Some(PageKey::new(11)));
        assert_eq!(decoded.cas_page().persistent_key(), None);
    }

    #[test]
    fn name_page_encode_decode_round_trips() {
        let mut page = NamePage::new(PageKey::new(2), 0);
        page.insert(1, b"book".to_vec());
        page.insert(2, b"author".to_vec());
        let bytes = page.encode();
        let decoded = NamePage::decode(&bytes, PageKey::new(2)).unwrap();
        assert_eq!(decoded.name(1), Some(b"book".as_slice()));
        assert_eq!(decoded.name(2), Some(b"author".as_slice()));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn path_page_encode_decode_round_trips() {
        let mut page = PathPage::new(PageKey::new(3), 0);
        page.insert(PathNodeEntry {
            path_node_id: 1,
            parent_path_node_id: 0,
            name_id: 7,
        });
        let bytes = page.encode();
        let decoded = PathPage::decode(&bytes, PageKey::new(3)).unwrap();
        assert_eq!(decoded.entries().len(), 1);
        assert_eq!(decoded.entries()[0].name_id, 7);
    }

    #[test]
    fn path_summary_page_encode_decode_round_trips() {
        let mut page = PathSummaryPage::new(PageKey::new(4), 0);
        page.set_root(1, PageKey::new(77));
        let bytes = page.encode();
        let decoded = PathSummaryPage::decode(&bytes, PageKey::new(4)).unwrap();
        assert_eq!(decoded.root(1), Some(PageKey::new(77)));
    }

    #[test]
    fn cas_page_looks_up_entries_by_type_and_hash() {
        let mut page = CasPage::new(PageKey::new(6), 0);
        page.insert(1, 0xABCD, NodeKey::new(42));
        page.insert(1, 0xABCD, NodeKey::new(43));
        page.insert(2, 0xABCD, NodeKey::new(99));
        let bytes = page.encode();
        let decoded = CasPage::decode(&bytes, PageKey::new(6)).unwrap();
        let matches: Vec<NodeKey> = decoded.entries_for(1, 0xABCD).collect();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&NodeKey::new(42)));
        assert!(matches.contains(&NodeKey::new(43)));
    }

    #[test]
    fn dewey_id_page_encode_decode_round_trips() {
        let mut page = DeweyIdPage::new(PageKey::new(7), 0);
        page.set(NodeKey::new(1), vec![1, 2, 3]);
        let bytes = page.encode();
        let decoded = DeweyIdPage::decode(&bytes, PageKey::new(7)).unwrap();
        assert_eq!(decoded.get(NodeKey::new(1)), Some([1u8, 2, 3].as_slice()));
    }

    #[test]
    fn indirect_page_encode_decode_round_trips() {
        let mut page: IndirectPage<KeyValueLeafPage> = IndirectPage::new(PageKey::new(8), 0, 16, 1, 1);
        let mut child_ref = PageReference::new(1, 1);
        child_ref.set_persistent_key(Some(PageKey::new(55)));
        page.references_mut().set_or_create(3, child_ref);
        let bytes = page.encode();
        let decoded: IndirectPage<KeyValueLeafPage> = IndirectPage::decode(&bytes, PageKey::new(8), 1, 1).unwrap();
        assert_eq!(decoded.references().get(3).unwrap().persistent_key(), Some(PageKey::new(55)));
    }
}
