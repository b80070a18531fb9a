//! Cycling power metrics
//!
//! Normalized Power, Intensity Factor, best efforts, fatigue index, variability index and
//! mechanical work. Everything that slides a window works on the power series resampled to one
//! value per second, so NP and best efforts share one grid.

use std::collections::BTreeMap;

use crate::error::{finite, MetricAbsence, MetricResult};
use crate::models::StreamKind;
use crate::rolling::{peak, RollingAggregator};
use crate::series::SampleSeries;

/// Rolling window used for Normalized Power (seconds)
pub const NP_WINDOW_SECONDS: u32 = 30;

/// Share of the activity, by time, compared at each end for the fatigue index
pub const FATIGUE_SEGMENT_FRACTION: f64 = 0.2;

/// Power calculations
pub struct PowerAnalyzer;

impl PowerAnalyzer {
    /// Normalized Power: 4th root of the mean of 4th powers of 30 s rolling means.
    ///
    /// Absent when the power stream is unavailable, has fewer than 30 present seconds, or has
    /// no 30 s stretch free of gaps.
    pub fn normalized_power(power: &SampleSeries) -> MetricResult<f64> {
        if power.is_empty() {
            return Err(MetricAbsence::StreamUnavailable(StreamKind::Power));
        }

        let one_hz = power.to_one_second();
        let valid_seconds = one_hz.present_count();
        if valid_seconds < NP_WINDOW_SECONDS as usize {
            return Err(MetricAbsence::InsufficientData {
                required: format!("{} s of power", NP_WINDOW_SECONDS),
                available: format!("{} s", valid_seconds),
            });
        }

        let windows = RollingAggregator::rolling_mean(&one_hz, NP_WINDOW_SECONDS)
            .map_err(|e| MetricAbsence::InvalidWindow(e.to_string()))?;

        let (sum_fourth, count) = windows
            .flatten()
            .fold((0.0f64, 0usize), |(sum, n), mean| (sum + mean.powi(4), n + 1));

        if count == 0 {
            return Err(MetricAbsence::InsufficientData {
                required: format!("one {} s window without gaps", NP_WINDOW_SECONDS),
                available: "none".to_string(),
            });
        }

        finite((sum_fourth / count as f64).powf(0.25), "normalized_power")
    }

    /// Intensity Factor: NP / FTP
    pub fn intensity_factor(np: &MetricResult<f64>, ftp_watts: f64) -> MetricResult<f64> {
        let np = np
            .as_ref()
            .map_err(|_| MetricAbsence::Dependency("normalized_power".to_string()))?;
        if ftp_watts <= 0.0 {
            return Err(MetricAbsence::ZeroDivisor("ftp_watts".to_string()));
        }
        finite(np / ftp_watts, "intensity_factor")
    }

    /// Variability Index: NP / average power
    pub fn variability_index(
        np: &MetricResult<f64>,
        average_power: &MetricResult<f64>,
    ) -> MetricResult<f64> {
        let np = np
            .as_ref()
            .map_err(|_| MetricAbsence::Dependency("normalized_power".to_string()))?;
        let avg = average_power
            .as_ref()
            .map_err(|_| MetricAbsence::Dependency("average_power".to_string()))?;
        if *avg == 0.0 {
            return Err(MetricAbsence::ZeroDivisor("average_power".to_string()));
        }
        finite(np / avg, "variability_index")
    }

    /// Mean of present power samples
    pub fn average_power(power: &SampleSeries) -> MetricResult<f64> {
        power
            .mean()
            .ok_or(MetricAbsence::StreamUnavailable(StreamKind::Power))
            .and_then(|avg| finite(avg, "average_power"))
    }

    /// Best average power for each target duration
    pub fn best_efforts(
        power: &SampleSeries,
        durations: &[u32],
    ) -> BTreeMap<u32, MetricResult<f64>> {
        if power.is_empty() {
            return durations
                .iter()
                .map(|&d| (d, Err(MetricAbsence::StreamUnavailable(StreamKind::Power))))
                .collect();
        }

        let one_hz = power.to_one_second();
        let activity_seconds = one_hz.duration_seconds();

        durations
            .iter()
            .map(|&duration| (duration, Self::best_effort(&one_hz, duration, activity_seconds)))
            .collect()
    }

    fn best_effort(one_hz: &SampleSeries, duration: u32, activity_seconds: u32) -> MetricResult<f64> {
        if activity_seconds < duration {
            return Err(MetricAbsence::ShorterThanWindow {
                window_seconds: duration,
                duration_seconds: activity_seconds,
            });
        }

        let windows = RollingAggregator::rolling_mean(one_hz, duration)
            .map_err(|e| MetricAbsence::InvalidWindow(e.to_string()))?;

        match peak(windows) {
            Some(best) => finite(best, "best_effort"),
            None => Err(MetricAbsence::InsufficientData {
                required: format!("one {} s window without gaps", duration),
                available: "none".to_string(),
            }),
        }
    }

    /// Fatigue index: relative drop in mean power between the first and last fifth of the
    /// activity, measured by time so irregular sampling does not skew the segments
    pub fn fatigue_index(power: &SampleSeries) -> MetricResult<f64> {
        if power.is_empty() {
            return Err(MetricAbsence::StreamUnavailable(StreamKind::Power));
        }

        let (first, duration) = match power.first_offset() {
            Some(first) if power.duration_seconds() > 0 => (first, power.duration_seconds()),
            _ => {
                return Err(MetricAbsence::InsufficientData {
                    required: "a positive duration".to_string(),
                    available: "0 s".to_string(),
                })
            }
        };

        let segment = (duration as f64 * FATIGUE_SEGMENT_FRACTION).floor() as u32;
        if segment == 0 {
            return Err(MetricAbsence::InsufficientData {
                required: "5 s of activity".to_string(),
                available: format!("{} s", duration),
            });
        }

        let end = first.saturating_add(duration);
        let mean_first = Self::segment_mean(power, first, first.saturating_add(segment), "first")?;
        let mean_last = Self::segment_mean(power, end - segment, end, "last")?;

        if mean_first == 0.0 {
            return Err(MetricAbsence::ZeroDivisor(
                "mean power of first segment".to_string(),
            ));
        }

        finite((mean_first - mean_last) / mean_first, "fatigue_index")
    }

    fn segment_mean(power: &SampleSeries, start: u32, end: u32, label: &str) -> MetricResult<f64> {
        let insufficient = || MetricAbsence::InsufficientData {
            required: format!("power samples in the {} segment", label),
            available: "none".to_string(),
        };
        power
            .slice(start, end)
            .map_err(|_| insufficient())?
            .mean()
            .ok_or_else(insufficient)
    }

    /// Mechanical work in kilojoules, each sample weighted by the time it covers
    pub fn work_kilojoules(power: &SampleSeries) -> MetricResult<f64> {
        if power.is_empty() {
            return Err(MetricAbsence::StreamUnavailable(StreamKind::Power));
        }
        let joules: f64 = power
            .weighted_samples()
            .filter_map(|(value, secs)| value.map(|w| w * secs as f64))
            .sum();
        finite(joules / 1000.0, "work_kilojoules")
    }
}
