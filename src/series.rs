//! Validated, time-ordered sample series
//!
//! Every calculator works on a [`SampleSeries`]. Construction repairs what can be repaired
//! (duplicate or backwards offsets are dropped, non-finite values become gaps) and rejects
//! what cannot. Gaps in the recording are absent values, never skipped indices.
//!
//! A step longer than [`PAUSE_INTERVALS`] nominal intervals is a recording pause: construction
//! inserts an absent marker one interval after the last sample before it, so the paused time is
//! accounted as missing rather than credited to that sample.
//!
//! Resampling uses linear interpolation between the two raw samples bracketing each output
//! offset. If either bracketing sample is absent the output sample is absent, so a gap is never
//! bridged with invented data.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use thiserror::Error;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::models::{RawPoint, StreamKind};

/// Steps longer than this many nominal intervals are pauses
pub const PAUSE_INTERVALS: u32 = 2;

/// Longest first-to-last span a series may cover (30 days)
pub const MAX_SPAN_SECONDS: u32 = 30 * 24 * 3600;

/// Structural problems found while building a series
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamDefect {
    #[error("negative offset {offset} at index {index}")]
    NegativeOffset { index: usize, offset: i64 },
    #[error("offset {offset} at index {index} exceeds the supported range")]
    OffsetOverflow { index: usize, offset: i64 },
    #[error("only {remaining} usable point(s) after removing out-of-order timestamps")]
    TooFewPoints { remaining: usize },
    #[error("series spans {span}s, more than the {limit}s limit")]
    SpanTooLong { span: u32, limit: u32 },
}

impl StreamDefect {
    /// Scope this defect to an activity stream
    pub fn into_metrics_error(self, activity_id: &str, stream: StreamKind) -> MetricsError {
        MetricsError::invalid_stream(activity_id, stream, self.to_string())
    }
}

/// One validated sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub offset_seconds: u32,
    pub value: Option<f64>,
}

/// Immutable series of samples with strictly increasing offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<Sample>,
    sampling_interval_seconds: u32,
}

impl SampleSeries {
    /// Build a series from provider points.
    ///
    /// Points whose offset does not increase past the last kept offset are dropped, keeping the
    /// first occurrence. Fails when fewer than two points survive, since no sampling interval can
    /// be established from them, or when the points span more than [`MAX_SPAN_SECONDS`].
    pub fn construct(raw_points: &[RawPoint]) -> std::result::Result<Self, StreamDefect> {
        let mut samples: Vec<Sample> = Vec::with_capacity(raw_points.len());
        let mut dropped = 0usize;

        for (index, point) in raw_points.iter().enumerate() {
            if point.offset_seconds < 0 {
                return Err(StreamDefect::NegativeOffset {
                    index,
                    offset: point.offset_seconds,
                });
            }
            let offset = u32::try_from(point.offset_seconds).map_err(|_| {
                StreamDefect::OffsetOverflow {
                    index,
                    offset: point.offset_seconds,
                }
            })?;

            if let Some(last) = samples.last() {
                if offset <= last.offset_seconds {
                    dropped += 1;
                    continue;
                }
            }

            samples.push(Sample {
                offset_seconds: offset,
                value: point.value.filter(|v| v.is_finite()),
            });
        }

        if samples.len() < 2 {
            return Err(StreamDefect::TooFewPoints {
                remaining: samples.len(),
            });
        }

        if dropped > 0 {
            debug!(dropped, kept = samples.len(), "Dropped out-of-order stream points");
        }

        let span = samples[samples.len() - 1].offset_seconds - samples[0].offset_seconds;
        if span > MAX_SPAN_SECONDS {
            return Err(StreamDefect::SpanTooLong {
                span,
                limit: MAX_SPAN_SECONDS,
            });
        }

        let sampling_interval_seconds = Self::nominal_interval(&samples);
        let samples = Self::mark_pauses(samples, sampling_interval_seconds);
        Ok(Self {
            samples,
            sampling_interval_seconds,
        })
    }

    /// Insert an absent sample one interval into every pause
    fn mark_pauses(samples: Vec<Sample>, interval: u32) -> Vec<Sample> {
        let limit = interval.saturating_mul(PAUSE_INTERVALS);
        let pauses = samples
            .windows(2)
            .filter(|w| w[1].offset_seconds - w[0].offset_seconds > limit)
            .count();
        if pauses == 0 {
            return samples;
        }
        debug!(pauses, interval, "Marked recording pauses");

        let mut marked = Vec::with_capacity(samples.len() + pauses);
        for (i, sample) in samples.iter().enumerate() {
            marked.push(*sample);
            if let Some(next) = samples.get(i + 1) {
                if next.offset_seconds - sample.offset_seconds > limit {
                    // interval < limit < delta, so the marker sits strictly inside the pause
                    marked.push(Sample {
                        offset_seconds: sample.offset_seconds + interval,
                        value: None,
                    });
                }
            }
        }
        marked
    }

    /// Series for a stream the provider did not record
    pub fn not_present() -> Self {
        Self {
            samples: Vec::new(),
            sampling_interval_seconds: 1,
        }
    }

    /// Fixed-interval series starting at offset zero
    pub fn regular(interval_seconds: u32, values: Vec<Option<f64>>) -> Result<Self> {
        if interval_seconds == 0 {
            return Err(MetricsError::Range(
                "sampling interval must be positive".to_string(),
            ));
        }
        let span = u32::try_from(values.len().saturating_sub(1))
            .ok()
            .and_then(|steps| steps.checked_mul(interval_seconds))
            .filter(|&span| span <= MAX_SPAN_SECONDS);
        if span.is_none() {
            return Err(MetricsError::Range(format!(
                "{} samples at {}s exceed the {}s span limit",
                values.len(),
                interval_seconds,
                MAX_SPAN_SECONDS
            )));
        }
        let samples = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Sample {
                offset_seconds: i as u32 * interval_seconds,
                value: value.filter(|v| v.is_finite()),
            })
            .collect();
        Ok(Self {
            samples,
            sampling_interval_seconds: interval_seconds,
        })
    }

    /// Median of consecutive offset deltas, at least one second
    fn nominal_interval(samples: &[Sample]) -> u32 {
        let deltas: Vec<f64> = samples
            .windows(2)
            .map(|w| (w[1].offset_seconds - w[0].offset_seconds) as f64)
            .collect();
        if deltas.is_empty() {
            return 1;
        }
        let median = Data::new(deltas).median();
        (median.round() as u32).max(1)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the series has no samples at all
    pub fn has_no_samples(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when no sample carries a value; calculators treat this as unavailable
    pub fn is_empty(&self) -> bool {
        self.samples.iter().all(|s| s.value.is_none())
    }

    pub fn sampling_interval_seconds(&self) -> u32 {
        self.sampling_interval_seconds
    }

    pub fn first_offset(&self) -> Option<u32> {
        self.samples.first().map(|s| s.offset_seconds)
    }

    pub fn last_offset(&self) -> Option<u32> {
        self.samples.last().map(|s| s.offset_seconds)
    }

    /// Time covered by the series: first to last offset plus one nominal interval
    pub fn duration_seconds(&self) -> u32 {
        match (self.first_offset(), self.last_offset()) {
            (Some(first), Some(last)) => (last - first).saturating_add(self.sampling_interval_seconds),
            _ => 0,
        }
    }

    /// True when every delta equals the nominal interval
    pub fn is_fixed_interval(&self) -> bool {
        self.samples.windows(2).all(|w| {
            w[1].offset_seconds - w[0].offset_seconds == self.sampling_interval_seconds
        })
    }

    /// Present values in order
    pub fn present_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().filter_map(|s| s.value)
    }

    pub fn present_count(&self) -> usize {
        self.present_values().count()
    }

    /// Each sample with the seconds it accounts for.
    ///
    /// A sample covers the time up to the next sample; the last one covers one nominal interval.
    /// Pause markers carry the paused time as absent.
    /// The covered seconds always sum to [`duration_seconds`](Self::duration_seconds).
    pub fn weighted_samples(&self) -> impl Iterator<Item = (Option<f64>, u32)> + '_ {
        let interval = self.sampling_interval_seconds;
        self.samples.iter().enumerate().map(move |(i, sample)| {
            let covered = match self.samples.get(i + 1) {
                Some(next) => next.offset_seconds - sample.offset_seconds,
                None => interval,
            };
            (sample.value, covered)
        })
    }

    /// Seconds covered by present samples
    pub fn present_seconds(&self) -> u32 {
        self.weighted_samples()
            .filter(|(value, _)| value.is_some())
            .map(|(_, secs)| secs)
            .sum()
    }

    /// Arithmetic mean of present values
    pub fn mean(&self) -> Option<f64> {
        let (sum, count) = self
            .present_values()
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Largest present value
    pub fn max(&self) -> Option<f64> {
        self.present_values().reduce(f64::max)
    }

    /// One value per `interval_seconds`, linearly interpolated between bracketing samples
    pub fn resample_to_fixed_interval(&self, interval_seconds: u32) -> Result<SampleSeries> {
        if interval_seconds == 0 {
            return Err(MetricsError::Range(
                "resampling interval must be positive".to_string(),
            ));
        }
        Ok(self.resample_with(interval_seconds))
    }

    /// Resampled to one value per second, the grid NP and best efforts work on
    pub fn to_one_second(&self) -> SampleSeries {
        if self.sampling_interval_seconds == 1 && self.is_fixed_interval() {
            return self.clone();
        }
        self.resample_with(1)
    }

    // interval_seconds > 0
    fn resample_with(&self, interval_seconds: u32) -> SampleSeries {
        let (first, last) = match (self.first_offset(), self.last_offset()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return SampleSeries {
                    samples: Vec::new(),
                    sampling_interval_seconds: interval_seconds,
                }
            }
        };

        let mut resampled =
            Vec::with_capacity(((last - first) / interval_seconds) as usize + 1);
        let mut cursor = 0usize;
        let mut t = first;

        while t <= last {
            while cursor + 1 < self.samples.len() && self.samples[cursor + 1].offset_seconds <= t
            {
                cursor += 1;
            }

            let left = self.samples[cursor];
            let value = if left.offset_seconds == t {
                left.value
            } else {
                match (left.value, self.samples.get(cursor + 1)) {
                    (Some(v0), Some(right)) => right.value.map(|v1| {
                        let span = (right.offset_seconds - left.offset_seconds) as f64;
                        let frac = (t - left.offset_seconds) as f64 / span;
                        v0 + (v1 - v0) * frac
                    }),
                    _ => None,
                }
            };

            resampled.push(Sample {
                offset_seconds: t,
                value,
            });

            t = match t.checked_add(interval_seconds) {
                Some(next) => next,
                None => break,
            };
        }

        SampleSeries {
            samples: resampled,
            sampling_interval_seconds: interval_seconds,
        }
    }

    /// Sub-series for the half-open offset range `[start_offset, end_offset)`.
    ///
    /// An empty range at any offset within the span yields an empty series.
    pub fn slice(&self, start_offset: u32, end_offset: u32) -> Result<SampleSeries> {
        if start_offset > end_offset {
            return Err(MetricsError::Range(format!(
                "slice start {} is after end {}",
                start_offset, end_offset
            )));
        }

        let (first, last) = match (self.first_offset(), self.last_offset()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(MetricsError::Range(
                    "cannot slice a series without samples".to_string(),
                ))
            }
        };

        let outside = if start_offset == end_offset {
            start_offset < first || start_offset > last
        } else {
            end_offset <= first || start_offset > last
        };
        if outside {
            return Err(MetricsError::Range(format!(
                "slice [{}, {}) lies outside series span [{}, {}]",
                start_offset, end_offset, first, last
            )));
        }

        let lo = self
            .samples
            .partition_point(|s| s.offset_seconds < start_offset);
        let hi = self.samples.partition_point(|s| s.offset_seconds < end_offset);

        Ok(SampleSeries {
            samples: self.samples[lo..hi].to_vec(),
            sampling_interval_seconds: self.sampling_interval_seconds,
        })
    }
}
