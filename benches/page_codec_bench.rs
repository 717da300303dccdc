// Page codec benchmarks.
// Exercises the hot path every revision commit goes through: encoding and
// decoding the unified leaf page, the HOT leaf page, and the PageKind
// envelope dispatcher, at a few fill levels.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sirix_pages::config::PageStoreConfig;
use sirix_pages::page::hot::HotLeafPage;
use sirix_pages::page::kind::{DecodeContext, PageKind};
use sirix_pages::page::kv_leaf::KeyValueLeafPage;
use sirix_pages::{NodeKey, PageKey};

const HEAP_CAPACITY: usize = 16 * 1024;

fn filled_leaf_page(config: &PageStoreConfig, slots: usize) -> KeyValueLeafPage {
    let mut page = KeyValueLeafPage::new(PageKey::new(1), 0, 1, config, HEAP_CAPACITY);
    for slot in 0..slots {
        let value = format!("value-{slot:04}");
        page.set_slot(slot, value.as_bytes(), 1).unwrap();
    }
    page
}

fn bench_kv_leaf_encode(c: &mut Criterion) {
    let config = PageStoreConfig::default();
    let mut group = c.benchmark_group("kv_leaf_encode");

    for slots in [16usize, 128, 512] {
        let page = filled_leaf_page(&config, slots);
        group.bench_with_input(BenchmarkId::from_parameter(slots), &page, |b, page| {
            b.iter(|| black_box(page.encode(black_box(&config))));
        });
    }

    group.finish();
}

fn bench_kv_leaf_decode(c: &mut Criterion) {
    let config = PageStoreConfig::default();
    let mut group = c.benchmark_group("kv_leaf_decode");

    for slots in [16usize, 128, 512] {
        let page = filled_leaf_page(&config, slots);
        let encoded = page.encode(&config);
        group.bench_with_input(BenchmarkId::from_parameter(slots), &encoded, |b, encoded| {
            b.iter(|| {
                black_box(KeyValueLeafPage::decode(black_box(encoded), PageKey::new(1), &config, HEAP_CAPACITY).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_hot_leaf_put(c: &mut Criterion) {
    c.bench_function("hot_leaf_put_sequential", |b| {
        b.iter(|| {
            let mut page = HotLeafPage::new(PageKey::new(2), 0, HEAP_CAPACITY, 256);
            for i in 0..200u32 {
                let key = i.to_be_bytes();
                page.put(black_box(&key), black_box(b"payload")).unwrap();
            }
            black_box(page);
        });
    });
}

fn bench_page_kind_envelope_round_trip(c: &mut Criterion) {
    let config = PageStoreConfig::default();
    let page = filled_leaf_page(&config, 64);
    let kind = PageKind::UnifiedLeaf(page);
    let encoded = kind.encode(&config);

    let mut group = c.benchmark_group("page_kind_envelope");

    group.bench_function("encode", |b| {
        b.iter(|| black_box(kind.encode(black_box(&config))));
    });

    group.bench_function("decode", |b| {
        let ctx = DecodeContext {
            page_key: PageKey::new(1),
            config: &config,
            heap_capacity: HEAP_CAPACITY,
            hot_max_entries: 256,
            database_tag: 1,
            resource_tag: 1,
        };
        b.iter(|| black_box(PageKind::decode(black_box(&encoded), black_box(&ctx)).unwrap()));
    });

    group.finish();
}

fn bench_overflow_promotion(c: &mut Criterion) {
    let config = PageStoreConfig::default();

    c.bench_function("kv_leaf_promote_to_overflow", |b| {
        b.iter(|| {
            let mut page = filled_leaf_page(&config, 32);
            for i in 0..8usize {
                let mut reference = sirix_pages::page::reference::PageReference::new(1, 1);
                reference.set_persistent_key(Some(PageKey::new(1000 + i as u64)));
                page.promote_to_overflow(i, NodeKey::new(i as u64), reference).unwrap();
            }
            black_box(page);
        });
    });
}

criterion_group!(
    benches,
    bench_kv_leaf_encode,
    bench_kv_leaf_decode,
    bench_hot_leaf_put,
    bench_page_kind_envelope_round_trip,
    bench_overflow_promotion
);
criterion_main!(benches);
