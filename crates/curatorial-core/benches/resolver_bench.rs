use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use curatorial_core::{
    Currency, HierarchyEntry, HierarchyMerger, ParentId, Point, Record, RecordIndex,
    TemporalResolver,
};

fn mk_gallery(index: usize) -> Record {
    let id = 1_914_600_000 + i64::try_from(index).unwrap_or_default();
    let year = 2000 + index % 25;
    Record {
        id,
        name: format!("Gallery {index}"),
        parent_id: ParentId(1_914_600_993),
        inception: Some(format!("{year}-01-01")),
        cessation: if index % 3 == 0 { None } else { Some(format!("{}-12-31", year + 2)) },
        currency: if index % 3 == 0 { Currency::Current } else { Currency::NotCurrent },
        hierarchy: vec![HierarchyEntry::new()
            .with("building_id", 1_914_600_993)
            .with("wing_id", i64::try_from(index % 7).unwrap_or_default())],
        supersedes: Vec::new(),
        superseded_by: Vec::new(),
        geometry: None,
        centroid_hint: Some(Point::new(-122.38, 37.61)),
        properties: BTreeMap::new(),
    }
}

fn bench_resolve(c: &mut Criterion) {
    let candidates = (0..1_000).map(mk_gallery).map(Arc::new).collect::<Vec<_>>();
    let resolver = TemporalResolver::new();

    c.bench_function("resolve_as_of_1000_candidates", |b| {
        b.iter(|| {
            let resolution = resolver.resolve_as_of("bench", &candidates, "2012-06-17");
            if let Err(err) = resolution {
                panic!("as-of benchmark resolution failed: {err}");
            }
        });
    });
}

fn bench_index_and_merge(c: &mut Criterion) {
    let records = (0..1_000).map(mk_gallery).collect::<Vec<_>>();
    let merger = HierarchyMerger::new();

    c.bench_function("index_build_1000_records", |b| {
        b.iter(|| RecordIndex::build(records.iter().cloned()));
    });

    c.bench_function("merge_1000_candidates", |b| {
        b.iter(|| merger.merge(&records));
    });
}

criterion_group!(resolver_benches, bench_resolve, bench_index_and_merge);
criterion_main!(resolver_benches);
