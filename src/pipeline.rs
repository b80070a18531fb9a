//! Per-activity metrics pipeline and parallel batch runner
//!
//! Each activity moves through `Pending → StreamsValidated → MetricsComputed → Assembled`.
//! The stages are separate types, so a stage can only be reached from the one before it and
//! the assembled [`ActivityMetrics`] cannot be touched again by the pipeline.
//!
//! Only a structurally broken stream aborts an activity. Missing or degenerate streams flow
//! through as absent metrics with a diagnostic each.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, warn};

use crate::config::EngineConfig;
use crate::efficiency::EfficiencyCalculator;
use crate::error::{MetricResult, MetricsError, Result};
use crate::logging::DiagnosticReport;
use crate::models::{
    ActivityInput, ActivityMetrics, EfficiencyFactor, MetricDiagnostic, StreamKind,
    StreamStatus, StreamSummary, ZoneDistribution,
};
use crate::power::PowerAnalyzer;
use crate::series::SampleSeries;
use crate::summary::StreamSummarizer;
use crate::tss::TssCalculator;
use crate::zones::ZoneCalculator;

/// Pipeline state of one activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Pending,
    StreamsValidated,
    MetricsComputed,
    Assembled,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Pending => write!(f, "pending"),
            PipelineStage::StreamsValidated => write!(f, "streams_validated"),
            PipelineStage::MetricsComputed => write!(f, "metrics_computed"),
            PipelineStage::Assembled => write!(f, "assembled"),
        }
    }
}

/// Activity accepted by the pipeline, streams not yet checked
pub struct PendingActivity<'a> {
    input: &'a ActivityInput,
}

/// Activity whose streams are all valid series (possibly not present or empty)
pub struct ValidatedActivity<'a> {
    input: &'a ActivityInput,
    streams: BTreeMap<StreamKind, SampleSeries>,
    status: BTreeMap<StreamKind, StreamStatus>,
    not_present: SampleSeries,
}

/// Activity with every calculator's outcome, not yet packaged
pub struct ComputedActivity<'a> {
    input: &'a ActivityInput,
    status: BTreeMap<StreamKind, StreamStatus>,
    results: CalculatorResults,
}

/// Raw calculator outcomes before absence is turned into `None` plus a diagnostic
#[derive(Debug, Clone)]
pub struct CalculatorResults {
    pub normalized_power: MetricResult<f64>,
    pub intensity_factor: MetricResult<f64>,
    pub tss: MetricResult<f64>,
    pub efficiency_factor: MetricResult<EfficiencyFactor>,
    pub variability_index: MetricResult<f64>,
    pub zone_distribution: ZoneDistribution,
    pub heart_rate_zone_distribution: MetricResult<ZoneDistribution>,
    pub fatigue_index: MetricResult<f64>,
    pub best_efforts: BTreeMap<u32, MetricResult<f64>>,
    pub power: MetricResult<StreamSummary>,
    pub heart_rate: MetricResult<StreamSummary>,
    pub cadence: MetricResult<StreamSummary>,
    pub speed: MetricResult<StreamSummary>,
    pub work_kilojoules: MetricResult<f64>,
    pub elevation_gain_meters: MetricResult<f64>,
}

impl<'a> PendingActivity<'a> {
    pub fn new(input: &'a ActivityInput) -> Self {
        Self { input }
    }

    pub fn stage(&self) -> PipelineStage {
        PipelineStage::Pending
    }

    /// Build a series per stream kind. A stream missing from the input, or sent with no
    /// points, is recorded as not present.
    pub fn validate_streams(self) -> Result<ValidatedActivity<'a>> {
        let mut streams = BTreeMap::new();
        let mut status = BTreeMap::new();

        for kind in StreamKind::ALL {
            let (series, stream_status) = match self.input.streams.get(&kind) {
                None => (SampleSeries::not_present(), StreamStatus::NotPresent),
                Some(points) if points.is_empty() => {
                    (SampleSeries::not_present(), StreamStatus::NotPresent)
                }
                Some(points) => {
                    let series = SampleSeries::construct(points)
                        .map_err(|defect| defect.into_metrics_error(&self.input.id, kind))?;
                    let stream_status = if series.is_empty() {
                        StreamStatus::Empty
                    } else {
                        StreamStatus::Present
                    };
                    (series, stream_status)
                }
            };
            streams.insert(kind, series);
            status.insert(kind, stream_status);
        }

        debug!(stage = %PipelineStage::StreamsValidated, streams = ?status, "Streams validated");
        Ok(ValidatedActivity {
            input: self.input,
            streams,
            status,
            not_present: SampleSeries::not_present(),
        })
    }
}

impl<'a> ValidatedActivity<'a> {
    pub fn stage(&self) -> PipelineStage {
        PipelineStage::StreamsValidated
    }

    pub fn stream_status(&self, kind: StreamKind) -> StreamStatus {
        self.status
            .get(&kind)
            .copied()
            .unwrap_or(StreamStatus::NotPresent)
    }

    /// Validated series for one stream kind
    pub fn series(&self, kind: StreamKind) -> &SampleSeries {
        self.streams.get(&kind).unwrap_or(&self.not_present)
    }

    /// Run every calculator; none of them can stop the others
    pub fn compute(self, config: &EngineConfig) -> ComputedActivity<'a> {
        let rider = &config.rider;
        let power = self.series(StreamKind::Power);
        let heart_rate = self.series(StreamKind::HeartRate);

        let normalized_power = PowerAnalyzer::normalized_power(power);
        let intensity_factor = PowerAnalyzer::intensity_factor(&normalized_power, rider.ftp_watts);
        let tss = TssCalculator::training_stress_score(
            power.duration_seconds(),
            &normalized_power,
            &intensity_factor,
            rider.ftp_watts,
        );
        let average_power = PowerAnalyzer::average_power(power);
        let variability_index = PowerAnalyzer::variability_index(&normalized_power, &average_power);
        let efficiency_factor =
            EfficiencyCalculator::efficiency_factor(&normalized_power, power, heart_rate);

        let results = CalculatorResults {
            normalized_power,
            intensity_factor,
            tss,
            efficiency_factor,
            variability_index,
            zone_distribution: ZoneCalculator::power_zone_distribution(power, rider),
            heart_rate_zone_distribution: ZoneCalculator::heart_rate_zone_distribution(
                heart_rate, rider,
            ),
            fatigue_index: PowerAnalyzer::fatigue_index(power),
            best_efforts: PowerAnalyzer::best_efforts(power, &config.best_effort_durations),
            power: StreamSummarizer::summarize(power, StreamKind::Power),
            heart_rate: StreamSummarizer::summarize(heart_rate, StreamKind::HeartRate),
            cadence: StreamSummarizer::summarize(
                self.series(StreamKind::Cadence),
                StreamKind::Cadence,
            ),
            speed: StreamSummarizer::summarize(self.series(StreamKind::Speed), StreamKind::Speed),
            work_kilojoules: PowerAnalyzer::work_kilojoules(power),
            elevation_gain_meters: StreamSummarizer::elevation_gain(
                self.series(StreamKind::Elevation),
            ),
        };

        debug!(stage = %PipelineStage::MetricsComputed, "Metrics computed");
        ComputedActivity {
            input: self.input,
            status: self.status,
            results,
        }
    }
}

impl<'a> ComputedActivity<'a> {
    pub fn stage(&self) -> PipelineStage {
        PipelineStage::MetricsComputed
    }

    pub fn results(&self) -> &CalculatorResults {
        &self.results
    }

    /// Package the results; absent metrics become `None` with a diagnostic
    pub fn assemble(self) -> ActivityMetrics {
        let mut diagnostics = Vec::new();
        let r = self.results;

        let best_efforts = r
            .best_efforts
            .into_iter()
            .map(|(duration, result)| {
                let metric = format!("best_effort_{}s", duration);
                (duration, keep(&metric, result, &mut diagnostics))
            })
            .collect();

        let metrics = ActivityMetrics {
            activity_id: self.input.id.clone(),
            start_time: self.input.start_time,
            distance_meters: self.input.distance_meters,
            moving_time_seconds: self.input.moving_time_seconds,
            normalized_power: keep("normalized_power", r.normalized_power, &mut diagnostics),
            intensity_factor: keep("intensity_factor", r.intensity_factor, &mut diagnostics),
            tss: keep("tss", r.tss, &mut diagnostics),
            efficiency_factor: keep("efficiency_factor", r.efficiency_factor, &mut diagnostics),
            variability_index: keep("variability_index", r.variability_index, &mut diagnostics),
            zone_distribution: r.zone_distribution,
            heart_rate_zone_distribution: keep(
                "heart_rate_zone_distribution",
                r.heart_rate_zone_distribution,
                &mut diagnostics,
            ),
            fatigue_index: keep("fatigue_index", r.fatigue_index, &mut diagnostics),
            best_efforts,
            power: keep("power", r.power, &mut diagnostics),
            heart_rate: keep("heart_rate", r.heart_rate, &mut diagnostics),
            cadence: keep("cadence", r.cadence, &mut diagnostics),
            speed: keep("speed", r.speed, &mut diagnostics),
            work_kilojoules: keep("work_kilojoules", r.work_kilojoules, &mut diagnostics),
            elevation_gain_meters: keep(
                "elevation_gain_meters",
                r.elevation_gain_meters,
                &mut diagnostics,
            ),
            stream_status: self.status,
            diagnostics,
        };

        debug!(
            stage = %PipelineStage::Assembled,
            absent = metrics.diagnostics.len(),
            "Activity metrics assembled"
        );
        metrics
    }
}

fn keep<T>(metric: &str, result: MetricResult<T>, diagnostics: &mut Vec<MetricDiagnostic>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(reason) => {
            diagnostics.push(MetricDiagnostic {
                metric: metric.to_string(),
                reason,
            });
            None
        }
    }
}

/// Outcome of one activity in a batch
#[derive(Debug)]
pub enum ActivityOutcome {
    Completed(Box<ActivityMetrics>),
    Failed(MetricsError),
    /// Not started because the batch deadline had passed
    Skipped,
}

/// Per-activity entry of a [`BatchReport`]
#[derive(Debug)]
pub struct ActivityReport {
    pub activity_id: String,
    pub outcome: ActivityOutcome,
    pub duration_ms: u128,
}

/// Results of a batch run, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<ActivityReport>,
    pub total_duration_ms: u128,
}

impl BatchReport {
    /// Metrics of every completed activity
    pub fn completed(&self) -> impl Iterator<Item = &ActivityMetrics> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ActivityOutcome::Completed(metrics) => Some(metrics.as_ref()),
            _ => None,
        })
    }

    /// Activity ids with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &MetricsError)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ActivityOutcome::Failed(err) => Some((r.activity_id.as_str(), err)),
            _ => None,
        })
    }

    pub fn completed_count(&self) -> usize {
        self.completed().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ActivityOutcome::Skipped))
            .count()
    }

    /// Consume the report, keeping completed metrics only
    pub fn into_metrics(self) -> Vec<ActivityMetrics> {
        self.results
            .into_iter()
            .filter_map(|r| match r.outcome {
                ActivityOutcome::Completed(metrics) => Some(*metrics),
                _ => None,
            })
            .collect()
    }

    /// Summary for troubleshooting, ready to be saved as JSON
    pub fn diagnostic_report(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::new("activity batch");
        report.set_duration(Duration::from_millis(self.total_duration_ms as u64));
        report.add_context("activities", self.results.len().to_string());
        report.add_context("completed", self.completed_count().to_string());

        for (activity_id, err) in self.failures() {
            report.add_error(err, Some(activity_id));
        }
        let skipped = self.skipped_count();
        if skipped > 0 {
            report.add_warning(format!("{} activities skipped after the deadline", skipped));
        }
        for metrics in self.completed() {
            if metrics.normalized_power.is_none() {
                report.add_warning(format!(
                    "activity {}: normalized power absent",
                    metrics.activity_id
                ));
            }
            // TSS spans the power series, which the zone distribution always covers
            let seconds = metrics.zone_distribution.total_seconds();
            if let Some(tss) = metrics.tss.filter(|&tss| !TssCalculator::is_plausible(tss, seconds)) {
                report.add_warning(format!(
                    "activity {}: implausible TSS {:.0} over {} s, check FTP",
                    metrics.activity_id, tss, seconds
                ));
            }
        }

        report.set_success(self.failed_count() == 0 && skipped == 0);
        report
    }
}

/// Computes [`ActivityMetrics`] from activity inputs under one engine configuration
#[derive(Debug, Clone)]
pub struct ActivityMetricsPipeline {
    config: EngineConfig,
}

impl ActivityMetricsPipeline {
    /// Validates the configuration up front; a bad FTP fails here, not mid-run
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one activity through every stage
    pub fn run(&self, input: &ActivityInput) -> Result<ActivityMetrics> {
        let span = debug_span!("activity", activity_id = %input.id);
        let _enter = span.enter();

        let pending = PendingActivity::new(input);
        debug!(stage = %pending.stage(), "Processing activity");
        let validated = pending.validate_streams()?;
        let computed = validated.compute(&self.config);
        Ok(computed.assemble())
    }

    /// Run many activities in parallel, honouring the configured thread count and deadline
    pub fn run_batch(&self, inputs: &[ActivityInput]) -> Result<BatchReport> {
        let deadline = self
            .config
            .batch
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        match self.config.batch.num_threads {
            Some(num_threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| {
                        MetricsError::Configuration(format!("Failed to create thread pool: {}", e))
                    })?;
                Ok(pool.install(|| self.run_batch_until(inputs, deadline)))
            }
            None => Ok(self.run_batch_until(inputs, deadline)),
        }
    }

    /// Run many activities in parallel on the current rayon pool.
    ///
    /// Activities not yet started when `deadline` passes are reported as skipped; work already
    /// finished is kept.
    pub fn run_batch_until(&self, inputs: &[ActivityInput], deadline: Option<Instant>) -> BatchReport {
        let start = Instant::now();
        info!(activities = inputs.len(), "Starting activity batch");

        let results: Vec<ActivityReport> = inputs
            .par_iter()
            .map(|input| self.run_reported(input, deadline))
            .collect();

        let report = BatchReport {
            results,
            total_duration_ms: start.elapsed().as_millis(),
        };

        info!(
            completed = report.completed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            duration_ms = report.total_duration_ms as u64,
            "Activity batch finished"
        );
        report
    }

    fn run_reported(&self, input: &ActivityInput, deadline: Option<Instant>) -> ActivityReport {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            debug!(activity_id = %input.id, "Deadline passed, activity not started");
            return ActivityReport {
                activity_id: input.id.clone(),
                outcome: ActivityOutcome::Skipped,
                duration_ms: 0,
            };
        }

        let started = Instant::now();
        let outcome = match self.run(input) {
            Ok(metrics) => ActivityOutcome::Completed(Box::new(metrics)),
            Err(err) => {
                warn!(activity_id = %input.id, error = %err, "Activity failed");
                ActivityOutcome::Failed(err)
            }
        };

        ActivityReport {
            activity_id: input.id.clone(),
            outcome,
            duration_ms: started.elapsed().as_millis(),
        }
    }
}
