use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use football_harvest::aggregate::AggregateMap;
use football_harvest::datasets::{AttendanceDataset, Dataset, MarketValueDataset, TransferDataset};
use football_harvest::normalize::normalize_currency;
use football_harvest::records::AttendanceRecord;

fn bench_currency_normalize(c: &mut Criterion) {
    let samples = ["1,5 mi. €", "750 mil €", "12,30 bi. €", "2 bilhões €", "-"];
    c.bench_function("currency_normalize", |b| {
        b.iter(|| {
            for sample in samples {
                black_box(normalize_currency(black_box(sample)));
            }
        })
    });
}

fn bench_attendance_extract(c: &mut Criterion) {
    c.bench_function("attendance_extract", |b| {
        b.iter(|| {
            let extraction = AttendanceDataset.extract("2023/2024", black_box(ATTENDANCE_HTML));
            black_box(extraction.records.len());
        })
    });
}

fn bench_market_value_extract(c: &mut Criterion) {
    let dataset = MarketValueDataset {
        country: "Brasil".to_string(),
    };
    c.bench_function("market_value_extract", |b| {
        b.iter(|| {
            let extraction = dataset.extract("2023", black_box(MARKET_VALUES_HTML));
            black_box(extraction.records.len());
        })
    });
}

fn bench_transfer_extract(c: &mut Criterion) {
    c.bench_function("transfer_extract", |b| {
        b.iter(|| {
            let extraction = TransferDataset.extract("alpha-league", black_box(TRANSFERS_HTML));
            black_box(extraction.records.len());
        })
    });
}

fn bench_aggregate_merge(c: &mut Criterion) {
    let seasons = (2000..2024)
        .map(|year| {
            AttendanceDataset
                .extract(&format!("{year}/{}", year + 1), ATTENDANCE_HTML)
                .records
        })
        .collect::<Vec<_>>();
    c.bench_function("aggregate_merge", |b| {
        b.iter(|| {
            let mut map: AggregateMap<AttendanceRecord> = AggregateMap::new();
            for records in &seasons {
                map.merge_all(records.iter().cloned());
            }
            black_box(map.record_count());
        })
    });
}

criterion_group!(
    perf,
    bench_currency_normalize,
    bench_attendance_extract,
    bench_market_value_extract,
    bench_transfer_extract,
    bench_aggregate_merge
);
criterion_main!(perf);

static ATTENDANCE_HTML: &str = include_str!("../tests/fixtures/attendance_season.html");
static MARKET_VALUES_HTML: &str = include_str!("../tests/fixtures/market_values.html");
static TRANSFERS_HTML: &str = include_str!("../tests/fixtures/transfers.html");
