use crate::error::{finite, MetricAbsence, MetricResult};

/// Upper bound on plausible TSS per hour; a full hour at 150% FTP scores 225
const MAX_TSS_PER_HOUR: f64 = 250.0;

/// Training Stress Score calculation
pub struct TssCalculator;

impl TssCalculator {
    /// TSS = (duration_seconds * NP * IF) / (FTP * 3600) * 100
    pub fn training_stress_score(
        duration_seconds: u32,
        normalized_power: &MetricResult<f64>,
        intensity_factor: &MetricResult<f64>,
        ftp_watts: f64,
    ) -> MetricResult<f64> {
        let np = normalized_power
            .as_ref()
            .map_err(|_| MetricAbsence::Dependency("normalized_power".to_string()))?;
        let intensity = intensity_factor
            .as_ref()
            .map_err(|_| MetricAbsence::Dependency("intensity_factor".to_string()))?;
        if duration_seconds == 0 {
            return Err(MetricAbsence::InsufficientData {
                required: "a positive duration".to_string(),
                available: "0 s".to_string(),
            });
        }
        if ftp_watts <= 0.0 {
            return Err(MetricAbsence::ZeroDivisor("ftp_watts".to_string()));
        }

        let tss = (duration_seconds as f64 * np * intensity) / (ftp_watts * 3600.0) * 100.0;
        finite(tss, "tss")
    }

    /// Sanity check: false when TSS is negative or exceeds what a human can produce
    pub fn is_plausible(tss: f64, duration_seconds: u32) -> bool {
        let hours = duration_seconds as f64 / 3600.0;
        tss >= 0.0 && tss <= MAX_TSS_PER_HOUR * hours.max(1.0 / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_tss_value() {
        // one hour at 200 W with FTP 250
        let tss = TssCalculator::training_stress_score(3600, &Ok(200.0), &Ok(0.8), 250.0).unwrap();
        assert!((tss - 64.0).abs() < 1e-9);
        assert!(TssCalculator::is_plausible(tss, 3600));
    }

    #[test]
    fn test_one_hour_at_ftp_is_100() {
        let tss = TssCalculator::training_stress_score(3600, &Ok(250.0), &Ok(1.0), 250.0).unwrap();
        assert!((tss - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_inputs() {
        let absent: MetricResult<f64> = Err(MetricAbsence::InsufficientData {
            required: "30 s of power".to_string(),
            available: "10 s".to_string(),
        });

        assert_eq!(
            TssCalculator::training_stress_score(600, &absent, &Ok(0.8), 250.0),
            Err(MetricAbsence::Dependency("normalized_power".to_string()))
        );
        assert_eq!(
            TssCalculator::training_stress_score(600, &Ok(200.0), &absent, 250.0),
            Err(MetricAbsence::Dependency("intensity_factor".to_string()))
        );
        assert!(matches!(
            TssCalculator::training_stress_score(0, &Ok(200.0), &Ok(0.8), 250.0),
            Err(MetricAbsence::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_plausibility() {
        assert!(!TssCalculator::is_plausible(-1.0, 3600));
        assert!(!TssCalculator::is_plausible(600.0, 3600));
        assert!(TssCalculator::is_plausible(450.0, 7200));
    }

    proptest! {
        #[test]
        fn test_tss_scales_linearly_with_duration(
            np in 100.0f64..400.0,
            ftp in 150.0f64..350.0,
            duration in 60u32..10_000u32,
            factor in 2u32..5u32,
        ) {
            let intensity = np / ftp;
            let base = TssCalculator::training_stress_score(duration, &Ok(np), &Ok(intensity), ftp).unwrap();
            let scaled = TssCalculator::training_stress_score(duration * factor, &Ok(np), &Ok(intensity), ftp).unwrap();
            prop_assert!((scaled - base * factor as f64).abs() < 1e-6 * scaled.max(1.0));
        }
    }
}
