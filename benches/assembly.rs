//! Benchmarks for view assembly and document decoding.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use timeline_sync::{AssetRef, Document, Entry, EntryId, Note, NoteId, Timestamp, ViewAssembler};

fn make_batch(entries: usize, notes_per_entry: usize) -> Vec<(Entry, Vec<Note>)> {
    (0..entries)
        .map(|i| {
            let entry = Entry {
                id: EntryId(format!("e{}", i)),
                title: format!("entry {}", i),
                body: Some("body".to_string()),
                asset_ref: AssetRef(format!("memory://{}", i)),
                // Every tenth entry still waiting on its server timestamp
                created_at: (i % 10 != 0).then(|| Timestamp((i * 7919 % 1000) as i64)),
            };
            let notes = (0..notes_per_entry)
                .map(|j| Note {
                    id: NoteId(format!("n{}-{}", i, j)),
                    text: format!("note {}", j),
                    created_at: Some(Timestamp(((notes_per_entry - j) * 31) as i64)),
                })
                .collect();
            (entry, notes)
        })
        .collect()
}

/// Benchmark sorting a batch with varying entry counts
fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    for entries in [10, 100, 1000] {
        let batch = make_batch(entries, 5);
        group.bench_with_input(BenchmarkId::new("entries", entries), &batch, |b, batch| {
            b.iter(|| black_box(ViewAssembler::assemble(batch.clone())));
        });
    }

    group.finish();
}

/// Benchmark decoding delivered entry documents
fn bench_decode_entries(c: &mut Criterion) {
    let docs: Vec<Document> = (0..500)
        .map(|i| Document {
            id: format!("e{}", i),
            data: json!({
                "title": format!("entry {}", i),
                "body": "some body text",
                "assetUrl": format!("memory://app/users/u/assets/{}", i),
                "createdAt": i,
            }),
        })
        .collect();

    c.bench_function("decode_500_entries", |b| {
        b.iter(|| {
            let decoded: Vec<Entry> = docs
                .iter()
                .map(|d| Entry::from_document(d).unwrap())
                .collect();
            black_box(decoded)
        });
    });
}

criterion_group!(benches, bench_assemble, bench_decode_entries);
criterion_main!(benches);
