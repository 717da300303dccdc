// Encode/decode round trips for every page kind through the shared
// PageKind envelope, exercised as a caller outside the crate would.

use sirix_pages::config::PageStoreConfig;
use sirix_pages::page::bitmap_chunk::BitmapChunkPage;
use sirix_pages::page::hot::indirect::{HotChildRef, HotIndirectNode};
use sirix_pages::page::hot::HotLeafPage;
use sirix_pages::page::kind::{DecodeContext, PageKind};
use sirix_pages::page::kv_leaf::KeyValueLeafPage;
use sirix_pages::page::meta::{
    CasPage, DeweyIdPage, IndirectPage, NamePage, NodeIndirectPage, PathNodeEntry, PathPage, PathSummaryPage, RevisionRootPage,
    UberPage,
};
use sirix_pages::page::overflow::OverflowPage;
use sirix_pages::page::reference::PageReference;
use sirix_pages::{NodeKey, PageKey};

const HEAP_CAPACITY: usize = 4096;

fn ctx<'a>(page_key: PageKey, config: &'a PageStoreConfig) -> DecodeContext<'a> {
    DecodeContext {
        page_key,
        config,
        heap_capacity: HEAP_CAPACITY,
        hot_max_entries: 64,
        database_tag: 1,
        resource_tag: 1,
    }
}

fn round_trip(kind: PageKind, config: &PageStoreConfig, page_key: PageKey) -> PageKind {
    let encoded = kind.encode(config);
    PageKind::decode(&encoded, &ctx(page_key, config)).expect("envelope round trip should decode")
}

#[test]
fn unified_leaf_page_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let mut page = KeyValueLeafPage::new(PageKey::new(1), 3, 1, &config, HEAP_CAPACITY);
    page.set_slot(0, b"alpha", 1).unwrap();
    page.set_slot(1, b"beta", 1).unwrap();

    let decoded = round_trip(PageKind::UnifiedLeaf(page), &config, PageKey::new(1));
    match decoded {
        PageKind::UnifiedLeaf(p) => {
            assert_eq!(p.slot(0).unwrap(), b"alpha");
            assert_eq!(p.slot(1).unwrap(), b"beta");
        }
        other => panic!("expected UnifiedLeaf, got {other:?}"),
    }
}

#[test]
fn hot_leaf_page_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let mut page = HotLeafPage::new(PageKey::new(2), 0, HEAP_CAPACITY, 64);
    page.put(b"key-001", b"value-a").unwrap();
    page.put(b"key-002", b"value-b").unwrap();

    let decoded = round_trip(PageKind::HotLeaf(page), &config, PageKey::new(2));
    match decoded {
        PageKind::HotLeaf(p) => {
            assert_eq!(p.get(b"key-001"), Some(&b"value-a"[..]));
            assert_eq!(p.get(b"key-002"), Some(&b"value-b"[..]));
            assert_eq!(p.entry_count(), 2);
        }
        other => panic!("expected HotLeaf, got {other:?}"),
    }
}

#[test]
fn hot_indirect_bi_node_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let node = HotIndirectNode::new_bi_node(0, 1, [HotChildRef::Leaf(PageKey::new(10)), HotChildRef::Leaf(PageKey::new(11))]);

    let decoded = round_trip(
        PageKind::HotIndirect {
            page_key: PageKey::new(3),
            revision: 5,
            node,
        },
        &config,
        PageKey::new(3),
    );
    match decoded {
        PageKind::HotIndirect { page_key, revision, node } => {
            assert_eq!(page_key, PageKey::new(3));
            assert_eq!(revision, 5);
            assert_eq!(node.children(), &[HotChildRef::Leaf(PageKey::new(10)), HotChildRef::Leaf(PageKey::new(11))]);
        }
        other => panic!("expected HotIndirect, got {other:?}"),
    }
}

#[test]
fn overflow_page_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let page = OverflowPage::new(PageKey::new(4), NodeKey::new(99), 1, b"a very long payload".to_vec());

    let decoded = round_trip(PageKind::Overflow(page), &config, PageKey::new(4));
    match decoded {
        PageKind::Overflow(p) => {
            assert_eq!(p.node_key(), NodeKey::new(99));
            assert_eq!(p.payload(), b"a very long payload");
        }
        other => panic!("expected Overflow, got {other:?}"),
    }
}

#[test]
fn bitmap_chunk_page_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let mut chunk = BitmapChunkPage::create_full(PageKey::new(5), 0, 1u8, 0, 0u64);
    chunk.add_key(7).unwrap();
    chunk.add_key(70).unwrap();

    let decoded = round_trip(PageKind::BitmapChunk(chunk), &config, PageKey::new(5));
    match decoded {
        PageKind::BitmapChunk(c) => {
            assert!(c.contains_key(7).unwrap());
            assert!(c.contains_key(70).unwrap());
            assert!(!c.contains_key(8).unwrap());
        }
        other => panic!("expected BitmapChunk, got {other:?}"),
    }
}

#[test]
fn name_page_round_trips_through_pagekind() {
    let config = PageStoreConfig::default();
    let mut page = NamePage::new(PageKey::new(6), 0);
    page.insert(1, b"tagname".to_vec());

    let decoded = round_trip(PageKind::Name(page), &config, PageKey::new(6));
    match decoded {
        PageKind::Name(p) => assert_eq!(p.name(1), Some(&b"tagname"[..])),
        other => panic!("expected Name, got {other:?}"),
    }
}

#[test]
fn path_summary_cas_dewey_and_path_pages_round_trip() {
    let config = PageStoreConfig::default();

    let mut summary = PathSummaryPage::new(PageKey::new(7), 0);
    summary.set_root(42, PageKey::new(900));
    let decoded = round_trip(PageKind::PathSummary(summary), &config, PageKey::new(7));
    match decoded {
        PageKind::PathSummary(p) => assert_eq!(p.root(42), Some(PageKey::new(900))),
        other => panic!("expected PathSummary, got {other:?}"),
    }

    let mut cas = CasPage::new(PageKey::new(8), 0);
    cas.insert(1, 0xdead_beef, NodeKey::new(5));
    let decoded = round_trip(PageKind::Cas(cas), &config, PageKey::new(8));
    match decoded {
        PageKind::Cas(p) => assert_eq!(p.entries_for(1, 0xdead_beef).collect::<Vec<_>>(), vec![NodeKey::new(5)]),
        other => panic!("expected Cas, got {other:?}"),
    }

    let mut dewey = DeweyIdPage::new(PageKey::new(9), 0);
    dewey.set(NodeKey::new(1), vec![1, 3, 5]);
    let decoded = round_trip(PageKind::DeweyId(dewey), &config, PageKey::new(9));
    match decoded {
        PageKind::DeweyId(p) => assert_eq!(p.get(NodeKey::new(1)), Some(&[1u8, 3, 5][..])),
        other => panic!("expected DeweyId, got {other:?}"),
    }

    let mut path = PathPage::new(PageKey::new(10), 0);
    path.insert(PathNodeEntry {
        path_node_id: 1,
        parent_path_node_id: 0,
        name_id: 2,
    });
    let decoded = round_trip(PageKind::Path(path), &config, PageKey::new(10));
    match decoded {
        PageKind::Path(p) => {
            assert_eq!(p.entries().len(), 1);
            assert_eq!(p.entries()[0].name_id, 2);
        }
        other => panic!("expected Path, got {other:?}"),
    }
}

#[test]
fn indirect_and_revision_root_and_uber_pages_round_trip() {
    let config = PageStoreConfig::default();

    let mut indirect: NodeIndirectPage = IndirectPage::new(PageKey::new(11), 0, 8, 1, 1);
    let mut leaf_ref = PageReference::new(1, 1);
    leaf_ref.set_persistent_key(Some(PageKey::new(77)));
    indirect.references_mut().set_or_create(3, leaf_ref);
    let decoded = round_trip(PageKind::Indirect(indirect), &config, PageKey::new(11));
    match decoded {
        PageKind::Indirect(p) => {
            assert_eq!(p.references().get(3).unwrap().persistent_key(), Some(PageKey::new(77)));
        }
        other => panic!("expected Indirect, got {other:?}"),
    }

    let mut root = RevisionRootPage::new(PageKey::new(12), 1, 1_700_000_000_000, 1, 1);
    root.node_tree_mut().set_persistent_key(Some(PageKey::new(500)));
    let decoded = round_trip(PageKind::RevisionRoot(root), &config, PageKey::new(12));
    match decoded {
        PageKind::RevisionRoot(p) => assert_eq!(p.node_tree().persistent_key(), Some(PageKey::new(500))),
        other => panic!("expected RevisionRoot, got {other:?}"),
    }

    let mut uber = UberPage::new(PageKey::new(13), 1, 1);
    let mut revision_ref = PageReference::new(1, 1);
    revision_ref.set_persistent_key(Some(PageKey::new(600)));
    let revision = uber.commit_revision(revision_ref);
    assert_eq!(revision, 0);
    let decoded = round_trip(PageKind::Uber(uber), &config, PageKey::new(13));
    match decoded {
        PageKind::Uber(p) => {
            assert_eq!(p.revision_count(), 1);
            assert_eq!(p.revision_root(0).unwrap().persistent_key(), Some(PageKey::new(600)));
        }
        other => panic!("expected Uber, got {other:?}"),
    }
}

#[test]
fn corrupted_envelope_is_rejected_before_any_tag_specific_decode_runs() {
    let config = PageStoreConfig::default();
    let page = KeyValueLeafPage::new(PageKey::new(1), 0, 1, &config, HEAP_CAPACITY);
    let mut encoded = PageKind::UnifiedLeaf(page).encode(&config);
    let last = encoded.len() - 1;
    encoded[last] ^= 0xff;

    let result = PageKind::decode(&encoded, &ctx(PageKey::new(1), &config));
    assert!(result.is_err());
}

#[test]
fn decode_from_decompression_adopts_unified_leaf_buffer_zero_copy() {
    use sirix_pages::collaborators::DecompressionResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let config = PageStoreConfig::default();
    let mut page = KeyValueLeafPage::new(PageKey::new(20), 0, 1, &config, HEAP_CAPACITY);
    page.set_slot(0, b"adopted", 1).unwrap();
    let encoded = PageKind::UnifiedLeaf(page).encode(&config);

    let fire_count = std::sync::Arc::new(AtomicUsize::new(0));
    let counter = fire_count.clone();
    let releaser: Box<dyn FnOnce() + Send> = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let result = DecompressionResult::new(bytes::Bytes::from(encoded), releaser);

    let decoded = PageKind::decode_from_decompression(result, &ctx(PageKey::new(20), &config)).unwrap();
    match decoded {
        PageKind::UnifiedLeaf(p) => {
            assert!(p.is_zero_copy());
            assert_eq!(p.get_slot(0).unwrap(), b"adopted");
            assert_eq!(fire_count.load(Ordering::SeqCst), 0);
            assert!(p.close().unwrap());
            assert_eq!(fire_count.load(Ordering::SeqCst), 1);
            assert!(!p.close().unwrap());
            assert_eq!(fire_count.load(Ordering::SeqCst), 1);
        }
        other => panic!("expected UnifiedLeaf, got {other:?}"),
    }
}

#[test]
fn decode_from_decompression_falls_through_for_non_unified_leaf_tags() {
    let config = PageStoreConfig::default();
    let overflow = OverflowPage::new(PageKey::new(21), NodeKey::new(1), 0, b"payload".to_vec());
    let encoded = PageKind::Overflow(overflow).encode(&config);
    let result = sirix_pages::collaborators::DecompressionResult::owned(encoded);

    let decoded = PageKind::decode_from_decompression(result, &ctx(PageKey::new(21), &config)).unwrap();
    match decoded {
        PageKind::Overflow(p) => assert_eq!(p.payload(), b"payload"),
        other => panic!("expected Overflow, got {other:?}"),
    }
}
