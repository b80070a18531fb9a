//! Efficiency Factor: power output per unit of heart rate.
//!
//! Two formulas are in common use. NP-based EF is preferred; average-power EF is only used
//! when NP is absent and the result carries a provenance tag, so trends never mix the two.

use crate::error::{finite, MetricAbsence, MetricResult};
use crate::models::{EfficiencyFactor, EfficiencyProvenance, StreamKind};
use crate::series::SampleSeries;

pub struct EfficiencyCalculator;

impl EfficiencyCalculator {
    pub fn efficiency_factor(
        normalized_power: &MetricResult<f64>,
        power: &SampleSeries,
        heart_rate: &SampleSeries,
    ) -> MetricResult<EfficiencyFactor> {
        let avg_hr = heart_rate
            .mean()
            .ok_or(MetricAbsence::StreamUnavailable(StreamKind::HeartRate))?;
        if avg_hr == 0.0 {
            return Err(MetricAbsence::ZeroDivisor("average heart rate".to_string()));
        }

        let (numerator, provenance) = match normalized_power {
            Ok(np) => (*np, EfficiencyProvenance::NormalizedPower),
            Err(_) => {
                let avg_power = power
                    .mean()
                    .ok_or(MetricAbsence::StreamUnavailable(StreamKind::Power))?;
                (avg_power, EfficiencyProvenance::AveragePower)
            }
        };

        let value = finite(numerator / avg_hr, "efficiency_factor")?;
        Ok(EfficiencyFactor { value, provenance })
    }
}
