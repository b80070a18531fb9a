//! Fixed-window rolling statistics over a fixed-interval series
//!
//! Both iterators slide one sample at a time and do constant work per step: the mean keeps a
//! running sum, the max keeps a monotonic deque. A window containing any absent sample yields
//! `None` rather than the mean of a shorter window, so missing data is never averaged away.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use crate::error::{MetricsError, Result};
use crate::series::{Sample, SampleSeries};

/// Rolling statistics over a [`SampleSeries`]
pub struct RollingAggregator;

impl RollingAggregator {
    /// Rolling mean over `window_seconds`; one item per window position
    pub fn rolling_mean(series: &SampleSeries, window_seconds: u32) -> Result<RollingMean<'_>> {
        let window = Self::window_samples(series, window_seconds)?;
        Ok(RollingMean {
            samples: series.samples(),
            window,
            start: 0,
            end: 0,
            sum: 0.0,
            absent: 0,
        })
    }

    /// Rolling maximum over `window_seconds`; one item per window position
    pub fn rolling_max(series: &SampleSeries, window_seconds: u32) -> Result<RollingMax<'_>> {
        let window = Self::window_samples(series, window_seconds)?;
        Ok(RollingMax {
            samples: series.samples(),
            window,
            start: 0,
            end: 0,
            absent: 0,
            deque: VecDeque::with_capacity(window),
        })
    }

    /// Window width in samples.
    ///
    /// The series must be on a fixed interval that divides the window evenly.
    pub fn window_samples(series: &SampleSeries, window_seconds: u32) -> Result<usize> {
        if window_seconds == 0 {
            return Err(MetricsError::Range("window must be at least one second".to_string()));
        }
        if !series.is_fixed_interval() {
            return Err(MetricsError::Range(
                "rolling windows need a fixed-interval series; resample first".to_string(),
            ));
        }
        let interval = series.sampling_interval_seconds();
        if window_seconds % interval != 0 {
            return Err(MetricsError::Range(format!(
                "window of {}s is not a multiple of the {}s sampling interval",
                window_seconds, interval
            )));
        }
        Ok((window_seconds / interval) as usize)
    }
}

/// Largest present value of a rolling sequence
pub fn peak<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values.into_iter().flatten().reduce(f64::max)
}

fn remaining_windows(len: usize, window: usize, start: usize) -> usize {
    (len + 1).saturating_sub(window).saturating_sub(start)
}

/// Lazy rolling mean; see [`RollingAggregator::rolling_mean`]
#[derive(Debug, Clone)]
pub struct RollingMean<'a> {
    samples: &'a [Sample],
    window: usize,
    start: usize,
    end: usize,
    sum: f64,
    absent: usize,
}

impl Iterator for RollingMean<'_> {
    type Item = Option<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start + self.window > self.samples.len() {
            return None;
        }

        while self.end < self.start + self.window {
            match self.samples[self.end].value {
                Some(v) => self.sum += v,
                None => self.absent += 1,
            }
            self.end += 1;
        }

        let mean = if self.absent == 0 {
            Some(self.sum / self.window as f64)
        } else {
            None
        };

        match self.samples[self.start].value {
            Some(v) => self.sum -= v,
            None => self.absent -= 1,
        }
        self.start += 1;

        Some(mean)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining_windows(self.samples.len(), self.window, self.start);
        (n, Some(n))
    }
}

impl ExactSizeIterator for RollingMean<'_> {}
impl FusedIterator for RollingMean<'_> {}

/// Lazy rolling maximum; see [`RollingAggregator::rolling_max`]
#[derive(Debug, Clone)]
pub struct RollingMax<'a> {
    samples: &'a [Sample],
    window: usize,
    start: usize,
    end: usize,
    absent: usize,
    // (index, value), values strictly decreasing front to back
    deque: VecDeque<(usize, f64)>,
}

impl Iterator for RollingMax<'_> {
    type Item = Option<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start + self.window > self.samples.len() {
            return None;
        }

        while self.end < self.start + self.window {
            match self.samples[self.end].value {
                Some(v) => {
                    while matches!(self.deque.back(), Some(&(_, back)) if back <= v) {
                        self.deque.pop_back();
                    }
                    self.deque.push_back((self.end, v));
                }
                None => self.absent += 1,
            }
            self.end += 1;
        }

        while matches!(self.deque.front(), Some(&(idx, _)) if idx < self.start) {
            self.deque.pop_front();
        }

        let max = if self.absent == 0 {
            self.deque.front().map(|&(_, v)| v)
        } else {
            None
        };

        if self.samples[self.start].value.is_none() {
            self.absent -= 1;
        }
        self.start += 1;

        Some(max)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining_windows(self.samples.len(), self.window, self.start);
        (n, Some(n))
    }
}

impl ExactSizeIterator for RollingMax<'_> {}
impl FusedIterator for RollingMax<'_> {}
