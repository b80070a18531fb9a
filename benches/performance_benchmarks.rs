use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;
use wattmetrics::{
    ActivityInput, ActivityMetricsPipeline, AggregationWindow, EngineConfig, PmcCalculator,
    PowerAnalyzer, RawPoint, RiderConfig, RollingAggregator, SampleSeries, StreamKind,
    SummaryPeriod,
};

/// Performance benchmarks for the metrics engine
///
/// These benchmarks test the core calculations with varying stream lengths and batch sizes
/// to confirm they scale linearly.

/// Power that drifts between 150 and 350 W, with a gap every 600 s
fn power_values(seconds: usize) -> Vec<Option<f64>> {
    (0..seconds)
        .map(|t| {
            if t % 600 == 599 {
                None
            } else {
                Some(250.0 + 100.0 * ((t as f64) / 45.0).sin())
            }
        })
        .collect()
}

fn create_activity(id: usize, seconds: usize) -> ActivityInput {
    let power: Vec<RawPoint> = power_values(seconds)
        .into_iter()
        .enumerate()
        .map(|(t, v)| RawPoint::new(t as i64, v))
        .collect();
    let heart_rate: Vec<RawPoint> = (0..seconds)
        .step_by(2)
        .map(|t| RawPoint::new(t as i64, Some(130.0 + (t % 40) as f64)))
        .collect();

    let mut streams = BTreeMap::new();
    streams.insert(StreamKind::Power, power);
    streams.insert(StreamKind::HeartRate, heart_rate);

    ActivityInput {
        id: format!("bench-{}", id),
        start_time: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::days(id as i64),
        distance_meters: 9.0 * seconds as f64,
        moving_time_seconds: seconds as u32,
        streams,
    }
}

fn bench_rolling_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rolling Mean");

    for &seconds in &[600, 3600, 14_400] {
        let series = SampleSeries::regular(1, power_values(seconds)).unwrap();

        group.throughput(Throughput::Elements(seconds as u64));
        group.bench_with_input(BenchmarkId::new("window_1200s", seconds), &series, |b, series| {
            b.iter(|| {
                let windows = RollingAggregator::rolling_mean(black_box(series), 1200).unwrap();
                black_box(windows.flatten().count())
            });
        });
    }

    group.finish();
}

fn bench_normalized_power(c: &mut Criterion) {
    let mut group = c.benchmark_group("Normalized Power");

    for &seconds in &[600, 3600, 14_400] {
        let series = SampleSeries::regular(1, power_values(seconds)).unwrap();

        group.throughput(Throughput::Elements(seconds as u64));
        group.bench_with_input(BenchmarkId::new("normalized_power", seconds), &series, |b, series| {
            b.iter(|| PowerAnalyzer::normalized_power(black_box(series)));
        });
    }

    group.finish();
}

fn bench_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resampling");

    for &seconds in &[3600, 14_400] {
        let raw: Vec<RawPoint> = (0..seconds as i64)
            .step_by(3)
            .map(|t| RawPoint::new(t, Some(200.0 + (t % 17) as f64)))
            .collect();
        let series = SampleSeries::construct(&raw).unwrap();

        group.throughput(Throughput::Elements(seconds as u64));
        group.bench_with_input(BenchmarkId::new("to_1hz", seconds), &series, |b, series| {
            b.iter(|| black_box(series).resample_to_fixed_interval(1).unwrap());
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let pipeline = ActivityMetricsPipeline::new(EngineConfig::for_rider(RiderConfig::new(260.0, 188))).unwrap();
    let mut group = c.benchmark_group("Activity Pipeline");
    group.sample_size(20);

    for &seconds in &[3600, 14_400] {
        let activity = create_activity(0, seconds);
        group.bench_with_input(BenchmarkId::new("run", seconds), &activity, |b, activity| {
            b.iter(|| pipeline.run(black_box(activity)).unwrap());
        });
    }

    for &count in &[8, 32] {
        let activities: Vec<ActivityInput> = (0..count).map(|i| create_activity(i, 3600)).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("run_batch", count), &activities, |b, activities| {
            b.iter(|| pipeline.run_batch(black_box(activities)).unwrap());
        });
    }

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let pipeline = ActivityMetricsPipeline::new(EngineConfig::default()).unwrap();
    let activities: Vec<ActivityInput> = (0..365).map(|i| create_activity(i, 900)).collect();
    let records = pipeline.run_batch(&activities).unwrap().into_metrics();

    let mut group = c.benchmark_group("Aggregation");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("weekly_fold_365", |b| {
        b.iter(|| AggregationWindow::fold(SummaryPeriod::IsoWeek, black_box(&records)));
    });

    let calculator = PmcCalculator::new();
    group.bench_function("pmc_series_365", |b| {
        b.iter(|| {
            let daily = calculator.aggregate_daily_tss(black_box(&records));
            let start = records[0].start_time.date_naive();
            let end = records[records.len() - 1].start_time.date_naive();
            calculator.calculate_series(&daily, start, end).unwrap()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_rolling_mean,
    bench_normalized_power,
    bench_resampling,
    bench_pipeline,
    bench_aggregation
);
criterion_main!(benches);
