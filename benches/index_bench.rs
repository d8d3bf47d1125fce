//! Benchmarks for the aggregation index
//!
//! Run with: cargo bench

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use strata::metrics::codec;
use strata::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 14, 30, 0).unwrap()
}

fn create_test_entries(count: i32) -> Vec<IndexEntry> {
    let slice = Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap();
    (0..count)
        .map(|i| IndexEntry {
            bucket: Bucket::Raw,
            day: Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap(),
            partition: (i % 10) as u32,
            collection_time_slice: slice,
            start_schedule_id: i * 5,
            insert_time_slice: slice,
            schedule_ids: (i * 5..i * 5 + 5).collect(),
        })
        .collect()
}

/// Installed in-memory store holding `schedules` ids in the current raw slice
/// and the same number in each of the previous 3 days
async fn seeded_dao(schedules: i32) -> Arc<MetricsDao> {
    let store = StoreConfig::default();
    let cluster: Arc<EmbeddedCluster> = Arc::new(EmbeddedCluster::in_memory(vec![]).unwrap());
    let schema = SchemaManager::with_scripts(cluster, &store, Arc::new(ScriptSet::bundled()));
    schema.install().await.unwrap();

    let session = schema.connect().await.unwrap();
    let dao = Arc::new(MetricsDao::new(session, Arc::new(MetricsPolicy::default())));

    for days_ago in 0..4 {
        let slice = dao.policy().current_time_slice(Bucket::Raw, now()) - Duration::days(days_ago)
            - Duration::hours(days_ago.min(1));
        dao.index_schedules(Bucket::Raw, slice, 0..schedules, slice)
            .await
            .unwrap();
    }
    dao
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [100, 1000] {
        let rows: Vec<Row> = create_test_entries(size)
            .iter()
            .map(|e| Row::new(codec::encode(e)))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("decode_{}", size), |b| {
            b.iter(|| codec::decode_all(black_box(&rows)).unwrap())
        });
    }

    group.finish();
}

fn bench_loader(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("loader");
    group.sample_size(10);

    for schedules in [1_000, 10_000] {
        let dao = rt.block_on(seeded_dao(schedules));
        let loader = IndexEntriesLoader::new(dao.clone(), now());

        group.throughput(Throughput::Elements(schedules as u64));

        group.bench_function(format!("current_{}", schedules), |b| {
            b.iter(|| {
                rt.block_on(loader.load_current_index_entries(Bucket::Raw, 250))
                    .unwrap()
            })
        });

        let start = dao.policy().past_window_start(now());
        group.bench_function(format!("past_{}", schedules), |b| {
            b.iter(|| rt.block_on(loader.load_past_index_entries(black_box(start))).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_loader);
criterion_main!(benches);
