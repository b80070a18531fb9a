//! Weekly and monthly rollups of per-activity metrics
//!
//! Records are folded in start-time order. Once a record from a later period arrives, every
//! earlier bucket is closed and never changes again. Efficiency factor means are kept as
//! `(sum, count)` pairs per provenance, so activities without the metric do not drag the mean
//! toward zero and the two EF formulas are never averaged together.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::models::{ActivityMetrics, EfficiencyProvenance};

/// Fraction of the mean EF per period below which a slope counts as flat
const TREND_STABLE_FRACTION: f64 = 0.01;

/// Calendar period a window buckets by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPeriod {
    IsoWeek,
    Month,
}

impl SummaryPeriod {
    /// Bucket key for an activity starting at `start_time` (UTC)
    pub fn key_for(&self, start_time: DateTime<Utc>) -> PeriodKey {
        let date = start_time.date_naive();
        match self {
            SummaryPeriod::IsoWeek => {
                let iso = date.iso_week();
                PeriodKey::IsoWeek {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            SummaryPeriod::Month => PeriodKey::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }
}

/// Identity of a summary bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum PeriodKey {
    IsoWeek { year: i32, week: u32 },
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    /// First calendar day of the period
    pub fn first_day(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::IsoWeek { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon),
            PeriodKey::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
        }
    }

    /// Last calendar day of the period
    pub fn last_day(&self) -> Option<NaiveDate> {
        match *self {
            PeriodKey::IsoWeek { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Sun),
            PeriodKey::Month { year, month } => {
                let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
            }
        }
    }

    /// Whole periods from `origin` to this key; `None` for keys of different kinds
    pub fn periods_since(&self, origin: &PeriodKey) -> Option<i64> {
        match (*self, *origin) {
            (PeriodKey::IsoWeek { .. }, PeriodKey::IsoWeek { .. }) => {
                let days = (self.first_day()? - origin.first_day()?).num_days();
                Some(days / 7)
            }
            (PeriodKey::Month { year, month }, PeriodKey::Month { year: y0, month: m0 }) => {
                Some((i64::from(year) - i64::from(y0)) * 12 + i64::from(month) - i64::from(m0))
            }
            _ => None,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::IsoWeek { year, week } => write!(f, "{}-W{:02}", year, week),
            PeriodKey::Month { year, month } => write!(f, "{}-{:02}", year, month),
        }
    }
}

/// Mean kept as a running sum and count so it can be merged exactly
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningMean {
    pub sum: f64,
    pub count: u32,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &RunningMean) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// `None` when nothing was pushed
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / f64::from(self.count))
        }
    }
}

/// Totals for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub key: PeriodKey,
    pub total_distance_meters: f64,
    pub total_moving_time_seconds: u64,

    /// Sum of TSS over activities that have one
    pub total_tss: f64,
    pub activity_count: u32,

    /// Activities contributing to `total_tss`
    pub tss_count: u32,

    /// NP-based efficiency factors
    pub efficiency_np: RunningMean,

    /// Average-power efficiency factors
    pub efficiency_average_power: RunningMean,
}

pub type WeeklySummary = PeriodSummary;
pub type MonthlySummary = PeriodSummary;

impl PeriodSummary {
    pub fn new(key: PeriodKey) -> Self {
        PeriodSummary {
            key,
            total_distance_meters: 0.0,
            total_moving_time_seconds: 0,
            total_tss: 0.0,
            activity_count: 0,
            tss_count: 0,
            efficiency_np: RunningMean::default(),
            efficiency_average_power: RunningMean::default(),
        }
    }

    /// Fold one activity into the totals
    pub fn add(&mut self, record: &ActivityMetrics) {
        self.total_distance_meters += record.distance_meters;
        self.total_moving_time_seconds += u64::from(record.moving_time_seconds);
        self.activity_count += 1;

        if let Some(tss) = record.tss {
            self.total_tss += tss;
            self.tss_count += 1;
        }
        if let Some(ef) = &record.efficiency_factor {
            match ef.provenance {
                EfficiencyProvenance::NormalizedPower => self.efficiency_np.push(ef.value),
                EfficiencyProvenance::AveragePower => self.efficiency_average_power.push(ef.value),
            }
        }
    }

    /// Combine with a summary of the same period
    pub fn merge(&mut self, other: &PeriodSummary) -> Result<()> {
        if self.key != other.key {
            return Err(MetricsError::Validation(format!(
                "cannot merge summaries of {} and {}",
                self.key, other.key
            )));
        }
        self.total_distance_meters += other.total_distance_meters;
        self.total_moving_time_seconds += other.total_moving_time_seconds;
        self.total_tss += other.total_tss;
        self.activity_count += other.activity_count;
        self.tss_count += other.tss_count;
        self.efficiency_np.merge(&other.efficiency_np);
        self.efficiency_average_power.merge(&other.efficiency_average_power);
        Ok(())
    }

    /// Mean NP-based efficiency factor over activities that have one
    pub fn mean_efficiency_factor(&self) -> Option<f64> {
        self.mean_efficiency_factor_for(EfficiencyProvenance::NormalizedPower)
    }

    pub fn mean_efficiency_factor_for(&self, provenance: EfficiencyProvenance) -> Option<f64> {
        match provenance {
            EfficiencyProvenance::NormalizedPower => self.efficiency_np.mean(),
            EfficiencyProvenance::AveragePower => self.efficiency_average_power.mean(),
        }
    }
}

/// Direction of a metric across consecutive periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

/// Folds activity metrics into period summaries in start-time order
#[derive(Debug, Clone)]
pub struct AggregationWindow {
    period: SummaryPeriod,
    closed: Vec<PeriodSummary>,
    open: Option<PeriodSummary>,
    last_start: Option<DateTime<Utc>>,
}

impl AggregationWindow {
    pub fn new(period: SummaryPeriod) -> Self {
        AggregationWindow {
            period,
            closed: Vec::new(),
            open: None,
            last_start: None,
        }
    }

    pub fn period(&self) -> SummaryPeriod {
        self.period
    }

    /// Fold one record. Records must not go back in time; a record from a later period closes
    /// the open bucket.
    pub fn push(&mut self, record: &ActivityMetrics) -> Result<()> {
        if let Some(last) = self.last_start {
            if record.start_time < last {
                return Err(MetricsError::Validation(format!(
                    "out of order: activity {} starts at {}, before previous record at {}",
                    record.activity_id, record.start_time, last
                )));
            }
        }
        self.absorb(record);
        Ok(())
    }

    fn absorb(&mut self, record: &ActivityMetrics) {
        let key = self.period.key_for(record.start_time);

        let same_bucket = self.open.as_ref().map_or(false, |open| open.key == key);
        if !same_bucket {
            if let Some(done) = self.open.take() {
                debug!(period = %done.key, activities = done.activity_count, "Period closed");
                self.closed.push(done);
            }
            self.open = Some(PeriodSummary::new(key));
        }

        if let Some(open) = self.open.as_mut() {
            open.add(record);
        }
        self.last_start = Some(record.start_time);
    }

    /// Summaries that can no longer change, ordered by key
    pub fn closed(&self) -> &[PeriodSummary] {
        &self.closed
    }

    /// Bucket still accepting records
    pub fn current(&self) -> Option<&PeriodSummary> {
        self.open.as_ref()
    }

    /// Close the open bucket and return every summary, ordered by key
    pub fn finish(mut self) -> Vec<PeriodSummary> {
        if let Some(open) = self.open.take() {
            self.closed.push(open);
        }
        self.closed
    }

    /// Sort records by start time and fold them all
    pub fn fold(period: SummaryPeriod, records: &[ActivityMetrics]) -> Vec<PeriodSummary> {
        let mut sorted: Vec<&ActivityMetrics> = records.iter().collect();
        sorted.sort_by_key(|r| r.start_time);

        let mut window = AggregationWindow::new(period);
        for record in sorted {
            window.absorb(record);
        }
        window.finish()
    }
}

/// Trend of the NP-based mean efficiency factor across `summaries`.
///
/// Each summary sits at its calendar position, in periods since the first summary's key, so
/// idle weeks or months between summaries stretch the fit. Periods without the metric are
/// skipped. `None` when fewer than two periods carry a value.
pub fn efficiency_trend(summaries: &[PeriodSummary]) -> Option<TrendDirection> {
    let origin = summaries.first()?.key;
    let points: Vec<(f64, f64)> = summaries
        .iter()
        .filter_map(|s| {
            let x = s.key.periods_since(&origin)?;
            s.mean_efficiency_factor().map(|ef| (x as f64, ef))
        })
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let covariance: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let variance: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if variance == 0.0 {
        return None;
    }
    let slope = covariance / variance;

    let threshold = TREND_STABLE_FRACTION * mean_y.abs();
    let direction = if slope > threshold {
        TrendDirection::Increasing
    } else if slope < -threshold {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    Some(direction)
}
