//! Unified error hierarchy for wattmetrics
//!
//! Errors here are contract violations and structurally broken input. A metric that cannot be
//! computed because data is missing is not an error: see [`MetricAbsence`], which calculators
//! return instead and which the pipeline records as a diagnostic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StreamKind;

/// Top-level error type for all wattmetrics operations
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A provider stream could not be turned into a usable series
    #[error("Invalid {stream} stream in activity {activity_id}: {reason}")]
    InvalidStream {
        activity_id: String,
        stream: StreamKind,
        reason: String,
    },

    /// Invalid slice, window or resampling request
    #[error("Range error: {0}")]
    Range(String),

    /// Rider or engine configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input violates an ordering or shape requirement
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors (configuration files, diagnostic reports)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// Result type alias for wattmetrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    /// Stream construction failure with owned strings
    pub fn invalid_stream(
        activity_id: impl Into<String>,
        stream: StreamKind,
        reason: impl Into<String>,
    ) -> Self {
        MetricsError::InvalidStream {
            activity_id: activity_id.into(),
            stream,
            reason: reason.into(),
        }
    }

    /// Activity this error is scoped to, if any
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            MetricsError::InvalidStream { activity_id, .. } => Some(activity_id.as_str()),
            _ => None,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MetricsError::InvalidStream { .. } => ErrorSeverity::Warning,
            MetricsError::Validation(_) => ErrorSeverity::Warning,
            MetricsError::Range(_) => ErrorSeverity::Error,
            MetricsError::Configuration(_)
            | MetricsError::ConfigParse(_)
            | MetricsError::ConfigSerialize(_) => ErrorSeverity::Critical,
            MetricsError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            MetricsError::InvalidStream {
                activity_id,
                stream,
                ..
            } => format!(
                "Activity {} was skipped: its {} data is unreadable.",
                activity_id, stream
            ),
            MetricsError::Configuration(reason) => {
                format!("Rider configuration is invalid: {}", reason)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Nothing can be computed until this is fixed
    Critical,
    /// Operation failed but the run can continue
    Error,
    /// A single activity or record was rejected
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

/// Why a metric is `None`.
///
/// Returned by calculators in place of a value. Never a failure of the activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MetricAbsence {
    /// The provider did not send the stream, or it holds no present values
    #[error("{0} stream not available")]
    StreamUnavailable(StreamKind),

    /// Not enough present data to compute the metric
    #[error("insufficient data: need {required}, have {available}")]
    InsufficientData { required: String, available: String },

    /// The activity is shorter than the requested window
    #[error("activity of {duration_seconds}s is shorter than {window_seconds}s window")]
    ShorterThanWindow {
        window_seconds: u32,
        duration_seconds: u32,
    },

    /// A divisor was zero
    #[error("zero divisor: {0}")]
    ZeroDivisor(String),

    /// An intermediate result was NaN or infinite
    #[error("non-finite result: {0}")]
    NonFinite(String),

    /// Metric depends on another metric that is absent
    #[error("depends on {0}, which is absent")]
    Dependency(String),

    /// The rolling window could not be laid over the series
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

/// Result of a metric calculation: a value, or the reason it is absent
pub type MetricResult<T> = std::result::Result<T, MetricAbsence>;

/// Reject NaN and infinities, preserving what produced them
pub fn finite(value: f64, what: &str) -> MetricResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricAbsence::NonFinite(format!("{} = {}", what, value)))
    }
}
