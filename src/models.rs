use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MetricAbsence;

/// Sample stream types delivered by the activity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Power,
    HeartRate,
    Cadence,
    Speed,
    Elevation,
}

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::Power,
        StreamKind::HeartRate,
        StreamKind::Cadence,
        StreamKind::Speed,
        StreamKind::Elevation,
    ];
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Power => write!(f, "power"),
            StreamKind::HeartRate => write!(f, "heart rate"),
            StreamKind::Cadence => write!(f, "cadence"),
            StreamKind::Speed => write!(f, "speed"),
            StreamKind::Elevation => write!(f, "elevation"),
        }
    }
}

/// One provider stream sample, before validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Seconds from activity start; negative offsets are malformed
    pub offset_seconds: i64,

    /// Sample value; `None` for a recording gap
    pub value: Option<f64>,
}

impl RawPoint {
    pub fn new(offset_seconds: i64, value: Option<f64>) -> Self {
        Self {
            offset_seconds,
            value,
        }
    }
}

/// Activity as handed over by the ingestion collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityInput {
    /// Unique identifier for the activity
    pub id: String,

    /// Start of the activity
    pub start_time: DateTime<Utc>,

    /// Total distance in meters
    pub distance_meters: f64,

    /// Total moving time in seconds
    pub moving_time_seconds: u32,

    /// Raw sample streams; a missing key means the provider did not record that stream
    #[serde(default)]
    pub streams: BTreeMap<StreamKind, Vec<RawPoint>>,
}

/// Whether a stream was usable for this activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Valid series with at least one present value
    Present,
    /// Valid series in which every value is absent
    Empty,
    /// The provider did not send this stream
    NotPresent,
}

/// Which formula produced an efficiency factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyProvenance {
    /// EF = NP / average HR
    NormalizedPower,
    /// EF = average power / average HR
    AveragePower,
}

/// Efficiency factor tagged with the formula used
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyFactor {
    pub value: f64,
    pub provenance: EfficiencyProvenance,
}

/// Seconds spent in each zone, plus time with no sample to classify
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ZoneDistribution {
    /// Zone number (1-based) to seconds in zone
    pub seconds: BTreeMap<u8, u32>,

    /// Seconds covered by absent samples
    pub uncategorized_seconds: u32,
}

impl ZoneDistribution {
    /// Distribution with every zone present at zero seconds
    pub fn with_zones(zone_count: u8) -> Self {
        Self {
            seconds: (1..=zone_count).map(|z| (z, 0)).collect(),
            uncategorized_seconds: 0,
        }
    }

    /// Seconds spent in `zone`
    pub fn zone_seconds(&self, zone: u8) -> u32 {
        self.seconds.get(&zone).copied().unwrap_or(0)
    }

    /// Seconds classified into any zone
    pub fn categorized_seconds(&self) -> u32 {
        self.seconds.values().sum()
    }

    /// Categorized plus uncategorized seconds
    pub fn total_seconds(&self) -> u32 {
        self.categorized_seconds() + self.uncategorized_seconds
    }

    /// Share of total time spent in `zone`, as a percentage
    pub fn zone_percent(&self, zone: u8) -> Option<f64> {
        let total = self.total_seconds();
        if total == 0 {
            return None;
        }
        Some(self.zone_seconds(zone) as f64 * 100.0 / total as f64)
    }
}

/// Average, maximum and coverage of one stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub average: f64,
    pub maximum: f64,
    /// Seconds covered by present samples
    pub present_seconds: u32,
}

/// Why a metric on an [`ActivityMetrics`] record is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDiagnostic {
    /// Metric name, e.g. `normalized_power` or `best_effort_1200s`
    pub metric: String,
    pub reason: MetricAbsence,
}

/// Derived metrics for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    pub activity_id: String,
    pub start_time: DateTime<Utc>,
    pub distance_meters: f64,
    pub moving_time_seconds: u32,

    /// Normalized Power in watts
    pub normalized_power: Option<f64>,

    /// Intensity Factor - NP as a fraction of FTP
    pub intensity_factor: Option<f64>,

    /// Training Stress Score
    pub tss: Option<f64>,

    /// Efficiency Factor with the formula used
    pub efficiency_factor: Option<EfficiencyFactor>,

    /// Variability Index - NP / average power
    pub variability_index: Option<f64>,

    /// Power-zone distribution against FTP
    pub zone_distribution: ZoneDistribution,

    /// Heart-rate zone distribution against max HR
    pub heart_rate_zone_distribution: Option<ZoneDistribution>,

    /// Relative drop in mean power from the first to the last fifth of the activity
    pub fatigue_index: Option<f64>,

    /// Best average power per target duration (seconds)
    pub best_efforts: BTreeMap<u32, Option<f64>>,

    pub power: Option<StreamSummary>,
    pub heart_rate: Option<StreamSummary>,
    pub cadence: Option<StreamSummary>,
    pub speed: Option<StreamSummary>,

    /// Mechanical work in kilojoules
    pub work_kilojoules: Option<f64>,

    /// Total positive elevation change in meters
    pub elevation_gain_meters: Option<f64>,

    /// Status of every known stream kind
    pub stream_status: BTreeMap<StreamKind, StreamStatus>,

    /// One entry per absent metric
    pub diagnostics: Vec<MetricDiagnostic>,
}

impl ActivityMetrics {
    /// Record carrying only identity fields, for summaries built outside the pipeline
    pub fn empty(activity_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        ActivityMetrics {
            activity_id: activity_id.into(),
            start_time,
            distance_meters: 0.0,
            moving_time_seconds: 0,
            normalized_power: None,
            intensity_factor: None,
            tss: None,
            efficiency_factor: None,
            variability_index: None,
            zone_distribution: ZoneDistribution::default(),
            heart_rate_zone_distribution: None,
            fatigue_index: None,
            best_efforts: BTreeMap::new(),
            power: None,
            heart_rate: None,
            cadence: None,
            speed: None,
            work_kilojoules: None,
            elevation_gain_meters: None,
            stream_status: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Best average power for `duration_seconds`, if computed
    pub fn best_effort(&self, duration_seconds: u32) -> Option<f64> {
        self.best_efforts.get(&duration_seconds).copied().flatten()
    }

    /// Absence reason recorded for `metric`
    pub fn absence_reason(&self, metric: &str) -> Option<&MetricAbsence> {
        self.diagnostics
            .iter()
            .find(|d| d.metric == metric)
            .map(|d| &d.reason)
    }

    /// Status of one stream kind
    pub fn stream_status(&self, kind: StreamKind) -> StreamStatus {
        self.stream_status
            .get(&kind)
            .copied()
            .unwrap_or(StreamStatus::NotPresent)
    }
}
