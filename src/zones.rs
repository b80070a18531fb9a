use crate::config::RiderConfig;
use crate::error::{MetricAbsence, MetricResult};
use crate::models::{StreamKind, ZoneDistribution};
use crate::series::SampleSeries;

/// Number of zones in both the power and heart rate models
pub const ZONE_COUNT: u8 = 5;

/// Zone calculation utilities
pub struct ZoneCalculator;

impl ZoneCalculator {
    /// Zone (1-based) for a value given ascending upper bounds of the lower zones.
    ///
    /// A value equal to a bound belongs to the zone above it.
    pub fn classify(value: f64, thresholds: &[f64; 4]) -> u8 {
        1 + thresholds.iter().filter(|&&t| value >= t).count() as u8
    }

    /// Seconds per power zone, thresholds at `zone_boundaries * ftp`.
    ///
    /// Always produced: without power every second of the series is uncategorized.
    pub fn power_zone_distribution(power: &SampleSeries, rider: &RiderConfig) -> ZoneDistribution {
        Self::distribution(power, &rider.power_thresholds())
    }

    /// Seconds per heart rate zone, thresholds at `hr_zone_boundaries * max_hr`
    pub fn heart_rate_zone_distribution(
        heart_rate: &SampleSeries,
        rider: &RiderConfig,
    ) -> MetricResult<ZoneDistribution> {
        if heart_rate.is_empty() {
            return Err(MetricAbsence::StreamUnavailable(StreamKind::HeartRate));
        }
        Ok(Self::distribution(heart_rate, &rider.hr_thresholds()))
    }

    /// Zone seconds plus uncategorized seconds add up to the series duration
    fn distribution(series: &SampleSeries, thresholds: &[f64; 4]) -> ZoneDistribution {
        let mut dist = ZoneDistribution::with_zones(ZONE_COUNT);

        for (value, secs) in series.weighted_samples() {
            match value {
                Some(v) => {
                    let zone = Self::classify(v, thresholds);
                    *dist.seconds.entry(zone).or_insert(0) += secs;
                }
                None => dist.uncategorized_seconds += secs,
            }
        }

        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPoint;
    use proptest::prelude::*;

    fn rider() -> RiderConfig {
        RiderConfig::new(200.0, 180)
    }

    #[test]
    fn test_classify_boundaries() {
        let thresholds = rider().power_thresholds(); // 110, 150, 180, 210
        assert_eq!(ZoneCalculator::classify(0.0, &thresholds), 1);
        assert_eq!(ZoneCalculator::classify(109.9, &thresholds), 1);
        assert_eq!(ZoneCalculator::classify(110.0, &thresholds), 2);
        assert_eq!(ZoneCalculator::classify(179.0, &thresholds), 3);
        assert_eq!(ZoneCalculator::classify(209.0, &thresholds), 4);
        assert_eq!(ZoneCalculator::classify(210.0, &thresholds), 5);
        assert_eq!(ZoneCalculator::classify(1500.0, &thresholds), 5);
    }

    #[test]
    fn test_power_zone_distribution() {
        let values = vec![Some(100.0), Some(120.0), None, Some(200.0), Some(400.0), None];
        let power = SampleSeries::regular(1, values).unwrap();
        let dist = ZoneCalculator::power_zone_distribution(&power, &rider());

        assert_eq!(dist.zone_seconds(1), 1);
        assert_eq!(dist.zone_seconds(2), 1);
        assert_eq!(dist.zone_seconds(3), 0);
        assert_eq!(dist.zone_seconds(4), 1);
        assert_eq!(dist.zone_seconds(5), 1);
        assert_eq!(dist.uncategorized_seconds, 2);
        assert_eq!(dist.total_seconds(), power.duration_seconds());
    }

    #[test]
    fn test_irregular_samples_weighted_by_time() {
        let raw = vec![
            RawPoint::new(0, Some(100.0)),
            RawPoint::new(1, Some(100.0)),
            RawPoint::new(5, Some(300.0)),
            RawPoint::new(6, Some(300.0)),
        ];
        let power = SampleSeries::construct(&raw).unwrap();
        let dist = ZoneCalculator::power_zone_distribution(&power, &rider());
        // the 4 s step is a pause at 1 s sampling: one second ridden, three missing
        assert_eq!(dist.zone_seconds(1), 2);
        assert_eq!(dist.uncategorized_seconds, 3);
        assert_eq!(dist.zone_seconds(5), 2);
        assert_eq!(dist.total_seconds(), 7);
    }

    #[test]
    fn test_pause_is_not_credited_to_last_zone() {
        let mut raw: Vec<RawPoint> = (0..60).map(|t| RawPoint::new(t, Some(100.0))).collect();
        raw.extend((3600..3660).map(|t| RawPoint::new(t, Some(300.0))));
        let power = SampleSeries::construct(&raw).unwrap();

        let dist = ZoneCalculator::power_zone_distribution(&power, &rider());
        assert_eq!(dist.zone_seconds(1), 60);
        assert_eq!(dist.zone_seconds(5), 60);
        assert_eq!(dist.uncategorized_seconds, 3540);
        assert_eq!(dist.total_seconds(), 3660);
    }

    #[test]
    fn test_missing_power_distribution_is_zero() {
        let dist = ZoneCalculator::power_zone_distribution(&SampleSeries::not_present(), &rider());
        assert_eq!(dist.total_seconds(), 0);
        assert_eq!(dist.seconds.len(), 5);
    }

    #[test]
    fn test_heart_rate_zones() {
        // thresholds 108, 126, 144, 162
        let hr = SampleSeries::regular(1, vec![Some(100.0), Some(130.0), Some(170.0)]).unwrap();
        let dist = ZoneCalculator::heart_rate_zone_distribution(&hr, &rider()).unwrap();
        assert_eq!(dist.zone_seconds(1), 1);
        assert_eq!(dist.zone_seconds(3), 1);
        assert_eq!(dist.zone_seconds(5), 1);

        assert_eq!(
            ZoneCalculator::heart_rate_zone_distribution(&SampleSeries::not_present(), &rider()),
            Err(MetricAbsence::StreamUnavailable(StreamKind::HeartRate))
        );
    }

    proptest! {
        #[test]
        fn test_zone_accounting_covers_duration(
            points in prop::collection::vec((1i64..6i64, prop::option::of(0u16..1200u16)), 2..300),
            ftp in 150u16..400u16,
        ) {
            let mut offset = 0i64;
            let raw: Vec<RawPoint> = points
                .iter()
                .map(|&(step, value)| {
                    offset += step;
                    RawPoint::new(offset, value.map(f64::from))
                })
                .collect();
            let power = SampleSeries::construct(&raw).unwrap();
            let dist = ZoneCalculator::power_zone_distribution(&power, &RiderConfig::new(ftp as f64, 185));

            prop_assert_eq!(dist.total_seconds(), power.duration_seconds());
        }
    }
}
