// Library interface for WattMetrics
// Derived training metrics for cycling activities: per-activity metrics, period rollups and
// training-load charts over in-memory sample streams.

pub mod aggregation;
pub mod config;
pub mod efficiency;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod pmc;
pub mod power;
pub mod rolling;
pub mod series;
pub mod summary;
pub mod tss;
pub mod zones;

// Re-export commonly used types for convenience
pub use models::*;
pub use aggregation::{
    efficiency_trend, AggregationWindow, MonthlySummary, PeriodKey, PeriodSummary, SummaryPeriod,
    TrendDirection, WeeklySummary,
};
pub use config::{BatchConfig, EngineConfig, RiderConfig};
pub use error::{MetricAbsence, MetricResult, MetricsError, Result};
pub use logging::{init_logging, DiagnosticReport, LogConfig, LogFormat, LogLevel};
pub use pipeline::{ActivityMetricsPipeline, ActivityOutcome, BatchReport, PipelineStage};
pub use pmc::{DailyLoad, PmcCalculator, PmcConfig, PmcPoint, TsbInterpretation};
pub use power::PowerAnalyzer;
pub use rolling::RollingAggregator;
pub use series::SampleSeries;
pub use tss::TssCalculator;
pub use zones::ZoneCalculator;
