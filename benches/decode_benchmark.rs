//! Row decoding and literal formatting benchmarks.
//!
//! Runs entirely against the scripted mock client, so no server is needed.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run one group
//! cargo bench --bench decode_benchmark -- decode_row
//!
//! # Save baseline for future comparison
//! cargo bench -- --save-baseline main
//! ```

use std::sync::Arc;
use std::time::Duration;

use adbc_core::{Connection, Database, Statement};
use adbc_rtdb::dsn::Location;
use adbc_rtdb::format::format_args;
use adbc_rtdb::native::NativeClient;
use adbc_rtdb::native::mock::{MockClient, raw_field};
use adbc_rtdb::row::{RowBuf, RowBuilder, decode_row};
use adbc_rtdb::types::{FieldDescriptor, FieldType, Value};
use adbc_rtdb::{ClientFactory, Config, Result, RtdbDatabase};
use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const SMALL_ROWS: usize = 1_000;
const MEDIUM_ROWS: usize = 100_000;

const MIXED_QUERY: &str = "SELECT ts, val, name, is_flag, rate FROM readings";

fn mixed_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("ts", FieldType::DateTime),
        FieldDescriptor::new("val", FieldType::Int32),
        FieldDescriptor::new("name", FieldType::String).nullable(true),
        FieldDescriptor::new("is_flag", FieldType::Bool),
        FieldDescriptor::new("rate", FieldType::Float32).nullable(true),
    ]
}

fn mixed_rows(count: usize) -> Vec<RowBuf> {
    let now = 1_700_000_000_000i64;
    (0..count)
        .map(|i| {
            let mut builder = RowBuilder::with_capacity(5);
            builder
                .push_i64(now + i as i64 * 1000)
                .push_i32(i as i32)
                .push_text(&format!("sensor_{}", i % 10))
                .push_bool(i % 2 == 0);
            if i % 7 == 0 {
                builder.push_null();
            } else {
                builder.push_f32(i as f32 * 1.5);
            }
            builder.finish()
        })
        .collect()
}

/// Decodes prebuilt row spans into values.
fn benchmark_decode_row(c: &mut Criterion) {
    let fields = mixed_fields();
    let rows = mixed_rows(SMALL_ROWS);
    let mut group = c.benchmark_group("decode_row");

    group.bench_function(BenchmarkId::new("mixed_types", SMALL_ROWS), |b| {
        b.iter(|| {
            let mut decoded = 0;
            for row in &rows {
                let values = decode_row(black_box(row), &fields).unwrap();
                decoded += values.len();
            }
            decoded
        })
    });

    group.finish();
}

/// Substitutes arguments into query text.
fn benchmark_format_args(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let args: Vec<Value> = vec![
        ts.into(),
        42i32.into(),
        "sensor_1".into(),
        true.into(),
        1.5f64.into(),
        Value::Null,
    ];
    let query = "INSERT INTO readings VALUES (?, ?, ?, ?, ?, ?)";
    let shanghai = Location::from_name("Asia/Shanghai").unwrap();
    let mut group = c.benchmark_group("format_args");

    group.bench_function("utc", |b| {
        b.iter(|| format_args(black_box(query), black_box(&args), &Location::Utc).unwrap())
    });
    group.bench_function("zone", |b| {
        b.iter(|| format_args(black_box(query), black_box(&args), &shanghai).unwrap())
    });

    group.finish();
}

/// Streams a mock result through the ADBC statement into record batches.
fn benchmark_record_batches(c: &mut Criterion) {
    let rows = mixed_rows(MEDIUM_ROWS);
    let factory: ClientFactory = Arc::new(move |_config: &Config| -> Result<Box<dyn NativeClient>> {
        let client = MockClient::new().with_result(
            MIXED_QUERY,
            vec![
                raw_field("ts", FieldType::DateTime, false),
                raw_field("val", FieldType::Int32, false),
                raw_field("name", FieldType::String, true),
                raw_field("is_flag", FieldType::Bool, false),
                raw_field("rate", FieldType::Float32, true),
            ],
            rows.clone(),
        );
        Ok(Box::new(client))
    });
    let db = RtdbDatabase::default().with_client_factory(factory);

    let mut group = c.benchmark_group("record_batches");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(BenchmarkId::new("mixed_types", MEDIUM_ROWS), |b| {
        b.iter(|| {
            let mut conn = db.new_connection().unwrap();
            let mut stmt = conn.new_statement().unwrap();
            stmt.set_sql_query(MIXED_QUERY).unwrap();

            let mut reader = black_box(stmt.execute().unwrap());
            let mut total_rows = 0;
            while let Some(batch_result) = black_box(reader.next()) {
                total_rows += batch_result.unwrap().num_rows();
            }

            assert_eq!(total_rows, MEDIUM_ROWS);
            total_rows
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_decode_row,
    benchmark_format_args,
    benchmark_record_batches
);
criterion_main!(benches);
