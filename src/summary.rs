use crate::error::{finite, MetricAbsence, MetricResult};
use crate::models::{StreamKind, StreamSummary};
use crate::series::SampleSeries;

/// Per-stream descriptive statistics
pub struct StreamSummarizer;

impl StreamSummarizer {
    /// Average, maximum and present seconds of a stream
    pub fn summarize(series: &SampleSeries, kind: StreamKind) -> MetricResult<StreamSummary> {
        let (average, maximum) = match (series.mean(), series.max()) {
            (Some(avg), Some(max)) => (avg, max),
            _ => return Err(MetricAbsence::StreamUnavailable(kind)),
        };
        Ok(StreamSummary {
            average: finite(average, "average")?,
            maximum: finite(maximum, "maximum")?,
            present_seconds: series.present_seconds(),
        })
    }

    /// Sum of rises between consecutive present elevation samples
    pub fn elevation_gain(elevation: &SampleSeries) -> MetricResult<f64> {
        if elevation.is_empty() {
            return Err(MetricAbsence::StreamUnavailable(StreamKind::Elevation));
        }

        let mut values = elevation.present_values();
        let mut previous = match values.next() {
            Some(first) => first,
            None => return Err(MetricAbsence::StreamUnavailable(StreamKind::Elevation)),
        };

        let mut gain = 0.0;
        for current in values {
            if current > previous {
                gain += current - previous;
            }
            previous = current;
        }

        finite(gain, "elevation_gain")
    }
}
