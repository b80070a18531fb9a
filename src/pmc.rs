use crate::error::{MetricsError, Result};
use crate::models::ActivityMetrics;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Daily training load, the sum of every activity's TSS on that date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoad {
    /// UTC date of the training day
    pub date: NaiveDate,

    /// Total TSS for the day
    pub total_tss: f64,

    /// Activities on this day, including those without TSS
    pub activity_count: u16,
}

/// Performance Management Chart values for a specific date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmcPoint {
    pub date: NaiveDate,

    /// Chronic Training Load
    pub ctl: f64,

    /// Acute Training Load
    pub atl: f64,

    /// Training Stress Balance: yesterday's CTL minus today's ATL
    pub tsb: f64,

    /// TSS used for this day (0 on rest days)
    pub daily_tss: f64,
}

impl PmcPoint {
    /// Readiness band for this day's TSB
    pub fn form(&self) -> TsbInterpretation {
        TsbInterpretation::from_tsb(self.tsb)
    }
}

/// PMC configuration with customizable time constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmcConfig {
    /// CTL time constant in days (default: 42)
    pub ctl_time_constant: u16,

    /// ATL time constant in days (default: 7)
    pub atl_time_constant: u16,
}

impl Default for PmcConfig {
    fn default() -> Self {
        PmcConfig {
            ctl_time_constant: 42,
            atl_time_constant: 7,
        }
    }
}

impl PmcConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ctl_time_constant == 0 || self.atl_time_constant == 0 {
            return Err(MetricsError::Configuration(
                "pmc time constants must be at least 1 day".to_string(),
            ));
        }
        Ok(())
    }
}

/// Training Stress Balance interpretation ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsbInterpretation {
    VeryFresh,    // +25 and above
    Fresh,        // +5 to +25
    Neutral,      // -10 to +5
    Fatigued,     // -30 to -10
    VeryFatigued, // Below -30
}

impl TsbInterpretation {
    pub fn from_tsb(tsb: f64) -> Self {
        if tsb >= 25.0 {
            TsbInterpretation::VeryFresh
        } else if tsb >= 5.0 {
            TsbInterpretation::Fresh
        } else if tsb >= -10.0 {
            TsbInterpretation::Neutral
        } else if tsb >= -30.0 {
            TsbInterpretation::Fatigued
        } else {
            TsbInterpretation::VeryFatigued
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TsbInterpretation::VeryFresh => "Very fresh (may be losing fitness)",
            TsbInterpretation::Fresh => "Fresh and ready for hard training/racing",
            TsbInterpretation::Neutral => "Neutral (normal training)",
            TsbInterpretation::Fatigued => "Fatigued (monitor closely)",
            TsbInterpretation::VeryFatigued => "Very fatigued (rest needed)",
        }
    }
}

/// Core PMC calculation engine
pub struct PmcCalculator {
    config: PmcConfig,
}

impl PmcCalculator {
    /// Create new PMC calculator with default configuration
    pub fn new() -> Self {
        PmcCalculator {
            config: PmcConfig::default(),
        }
    }

    /// Create new PMC calculator with custom configuration
    pub fn with_config(config: PmcConfig) -> Self {
        PmcCalculator { config }
    }

    /// Group TSS by UTC start date. Activities without TSS count toward the day but add no load.
    pub fn aggregate_daily_tss(&self, records: &[ActivityMetrics]) -> BTreeMap<NaiveDate, DailyLoad> {
        let mut daily: BTreeMap<NaiveDate, DailyLoad> = BTreeMap::new();

        for record in records {
            let date = record.start_time.date_naive();
            let tss = record.tss.unwrap_or(0.0);

            daily
                .entry(date)
                .and_modify(|day| {
                    day.total_tss += tss;
                    day.activity_count += 1;
                })
                .or_insert(DailyLoad {
                    date,
                    total_tss: tss,
                    activity_count: 1,
                });
        }

        daily
    }

    /// Calculate PMC values for every day in `[start_date, end_date]`.
    ///
    /// Loads are accumulated from `ctl_time_constant` days before `start_date`; days missing
    /// from `daily` are rest days.
    pub fn calculate_series(
        &self,
        daily: &BTreeMap<NaiveDate, DailyLoad>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PmcPoint>> {
        if start_date > end_date {
            return Err(MetricsError::Range(format!(
                "start date {} is after end date {}",
                start_date, end_date
            )));
        }
        self.config.validate()?;

        let ctl_factor = 1.0 / f64::from(self.config.ctl_time_constant);
        let atl_factor = 1.0 / f64::from(self.config.atl_time_constant);

        let warm_up_start = start_date
            .checked_sub_days(chrono::Days::new(u64::from(self.config.ctl_time_constant)))
            .unwrap_or(start_date);

        let mut series = Vec::new();
        let mut ctl = 0.0;
        let mut atl = 0.0;

        for date in warm_up_start.iter_days().take_while(|d| *d <= end_date) {
            let daily_tss = daily.get(&date).map(|d| d.total_tss).unwrap_or(0.0);

            let previous_ctl = ctl;
            ctl += (daily_tss - ctl) * ctl_factor;
            atl += (daily_tss - atl) * atl_factor;

            if date >= start_date {
                series.push(PmcPoint {
                    date,
                    ctl,
                    atl,
                    tsb: previous_ctl - atl,
                    daily_tss,
                });
            }
        }

        debug!(
            days = series.len(),
            start = %start_date,
            end = %end_date,
            form = ?series.last().map(PmcPoint::form),
            "PMC series calculated"
        );
        Ok(series)
    }
}

impl Default for PmcCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, y: i32, m: u32, d: u32, hour: u32, tss: Option<f64>) -> ActivityMetrics {
        let mut metrics = ActivityMetrics::empty(id, Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap());
        metrics.tss = tss;
        metrics
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_tss_aggregation() {
        let calculator = PmcCalculator::new();
        let records = vec![
            record("a", 2024, 9, 23, 6, Some(50.0)),
            record("b", 2024, 9, 23, 18, Some(30.0)),
            record("c", 2024, 9, 23, 20, None),
            record("d", 2024, 9, 24, 7, Some(40.0)),
        ];

        let daily = calculator.aggregate_daily_tss(&records);
        assert_eq!(daily.len(), 2);

        let day = &daily[&date(2024, 9, 23)];
        assert_eq!(day.total_tss, 80.0);
        assert_eq!(day.activity_count, 3);
        assert_eq!(daily[&date(2024, 9, 24)].total_tss, 40.0);
    }

    #[test]
    fn test_first_day_values() {
        let calculator = PmcCalculator::new();
        let records = vec![record("a", 2024, 9, 1, 8, Some(100.0))];
        let daily = calculator.aggregate_daily_tss(&records);

        let series = calculator
            .calculate_series(&daily, date(2024, 9, 1), date(2024, 9, 2))
            .unwrap();
        assert_eq!(series.len(), 2);

        let first = &series[0];
        assert!((first.ctl - 100.0 / 42.0).abs() < 1e-9);
        assert!((first.atl - 100.0 / 7.0).abs() < 1e-9);
        assert!((first.tsb - (0.0 - 100.0 / 7.0)).abs() < 1e-9);
        assert_eq!(first.daily_tss, 100.0);

        // rest day: loads decay, TSB uses the previous CTL
        let second = &series[1];
        assert_eq!(second.daily_tss, 0.0);
        assert!(second.ctl < first.ctl);
        assert!(second.atl < first.atl);
        assert!((second.tsb - (first.ctl - second.atl)).abs() < 1e-9);
    }

    #[test]
    fn test_warm_up_counts_earlier_load() {
        let calculator = PmcCalculator::new();
        let records = vec![record("early", 2024, 8, 25, 8, Some(200.0))];
        let daily = calculator.aggregate_daily_tss(&records);

        let series = calculator
            .calculate_series(&daily, date(2024, 9, 1), date(2024, 9, 1))
            .unwrap();
        assert_eq!(series.len(), 1);
        assert!(series[0].ctl > 0.0);
        assert!(series[0].atl > 0.0);
    }

    #[test]
    fn test_steady_load_converges() {
        let calculator = PmcCalculator::with_config(PmcConfig {
            ctl_time_constant: 7,
            atl_time_constant: 3,
        });
        let mut daily = BTreeMap::new();
        for d in date(2024, 1, 1).iter_days().take(120) {
            daily.insert(
                d,
                DailyLoad {
                    date: d,
                    total_tss: 60.0,
                    activity_count: 1,
                },
            );
        }

        let series = calculator
            .calculate_series(&daily, date(2024, 4, 1), date(2024, 4, 10))
            .unwrap();
        let last = series.last().unwrap();
        assert!((last.ctl - 60.0).abs() < 0.1);
        assert!((last.atl - 60.0).abs() < 0.1);
        assert_eq!(last.form(), TsbInterpretation::Neutral);
    }

    #[test]
    fn test_invalid_range() {
        let calculator = PmcCalculator::new();
        let result = calculator.calculate_series(&BTreeMap::new(), date(2024, 9, 2), date(2024, 9, 1));
        assert!(matches!(result, Err(MetricsError::Range(_))));
    }

    #[test]
    fn test_zero_time_constant_rejected() {
        let config = PmcConfig {
            ctl_time_constant: 0,
            atl_time_constant: 7,
        };
        assert!(matches!(config.validate(), Err(MetricsError::Configuration(_))));
    }

    #[test]
    fn test_tsb_interpretation() {
        assert_eq!(TsbInterpretation::from_tsb(30.0), TsbInterpretation::VeryFresh);
        assert_eq!(TsbInterpretation::from_tsb(10.0), TsbInterpretation::Fresh);
        assert_eq!(TsbInterpretation::from_tsb(0.0), TsbInterpretation::Neutral);
        assert_eq!(TsbInterpretation::from_tsb(-20.0), TsbInterpretation::Fatigued);
        assert_eq!(TsbInterpretation::from_tsb(-40.0), TsbInterpretation::VeryFatigued);
        assert!(!TsbInterpretation::Fresh.description().is_empty());
    }
}
