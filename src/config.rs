use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MetricsError, Result};
use crate::logging::LogConfig;
use crate::pmc::PmcConfig;

/// Standard Coggan-style boundaries for a 5-zone power model, as fractions of FTP
pub const DEFAULT_POWER_ZONE_BOUNDARIES: [f64; 4] = [0.55, 0.75, 0.90, 1.05];

/// Boundaries for a 5-zone heart rate model, as fractions of max HR
pub const DEFAULT_HR_ZONE_BOUNDARIES: [f64; 4] = [0.60, 0.70, 0.80, 0.90];

/// Best-effort durations computed when none are configured (seconds)
pub const DEFAULT_BEST_EFFORT_DURATIONS: [u32; 5] = [5, 60, 300, 1200, 3600];

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rider thresholds shared by every activity in a run
    pub rider: RiderConfig,

    /// Target durations for best-effort extraction, in seconds
    pub best_effort_durations: Vec<u32>,

    /// Batch execution settings
    pub batch: BatchConfig,

    /// Training-load chart settings
    pub pmc: PmcConfig,

    /// Logging settings
    pub logging: LogConfig,
}

/// Rider thresholds.
///
/// Loaded once per run and never mutated while activities are processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderConfig {
    /// Functional Threshold Power in watts
    pub ftp_watts: f64,

    /// Maximum heart rate in beats per minute
    pub max_hr_bpm: u16,

    /// Upper bounds of power zones 1-4 as fractions of FTP; zone 5 is open-ended
    #[serde(default = "default_power_zones")]
    pub zone_boundaries: [f64; 4],

    /// Upper bounds of heart rate zones 1-4 as fractions of max HR
    #[serde(default = "default_hr_zones")]
    pub hr_zone_boundaries: [f64; 4],
}

fn default_power_zones() -> [f64; 4] {
    DEFAULT_POWER_ZONE_BOUNDARIES
}

fn default_hr_zones() -> [f64; 4] {
    DEFAULT_HR_ZONE_BOUNDARIES
}

/// Batch execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; `None` uses the rayon default (number of CPUs)
    pub num_threads: Option<usize>,

    /// Stop starting new activities after this many milliseconds
    pub deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            rider: RiderConfig::default(),
            best_effort_durations: DEFAULT_BEST_EFFORT_DURATIONS.to_vec(),
            batch: BatchConfig::default(),
            pmc: PmcConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for RiderConfig {
    fn default() -> Self {
        RiderConfig {
            ftp_watts: 250.0,
            max_hr_bpm: 190,
            zone_boundaries: DEFAULT_POWER_ZONE_BOUNDARIES,
            hr_zone_boundaries: DEFAULT_HR_ZONE_BOUNDARIES,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            num_threads: None,
            deadline_ms: None,
        }
    }
}

impl RiderConfig {
    /// Rider with default zone boundaries
    pub fn new(ftp_watts: f64, max_hr_bpm: u16) -> Self {
        RiderConfig {
            ftp_watts,
            max_hr_bpm,
            ..RiderConfig::default()
        }
    }

    /// Check thresholds and zone boundaries
    pub fn validate(&self) -> Result<()> {
        if !self.ftp_watts.is_finite() || self.ftp_watts <= 0.0 {
            return Err(MetricsError::Configuration(format!(
                "ftp_watts must be a positive number, got {}",
                self.ftp_watts
            )));
        }
        if self.max_hr_bpm == 0 {
            return Err(MetricsError::Configuration(
                "max_hr_bpm must be positive".to_string(),
            ));
        }
        Self::validate_boundaries("zone_boundaries", &self.zone_boundaries, None)?;
        Self::validate_boundaries("hr_zone_boundaries", &self.hr_zone_boundaries, Some(1.0))?;
        Ok(())
    }

    fn validate_boundaries(name: &str, bounds: &[f64; 4], ceiling: Option<f64>) -> Result<()> {
        for (i, &b) in bounds.iter().enumerate() {
            if !b.is_finite() || b <= 0.0 {
                return Err(MetricsError::Configuration(format!(
                    "{}[{}] must be a positive fraction, got {}",
                    name, i, b
                )));
            }
            if let Some(max) = ceiling {
                if b > max {
                    return Err(MetricsError::Configuration(format!(
                        "{}[{}] must not exceed {}, got {}",
                        name, i, max, b
                    )));
                }
            }
        }
        if bounds.windows(2).any(|w| w[1] <= w[0]) {
            return Err(MetricsError::Configuration(format!(
                "{} must be strictly increasing: {:?}",
                name, bounds
            )));
        }
        Ok(())
    }

    /// Absolute power thresholds (watts) separating zones 1-5
    pub fn power_thresholds(&self) -> [f64; 4] {
        self.zone_boundaries.map(|f| f * self.ftp_watts)
    }

    /// Absolute heart rate thresholds (bpm) separating zones 1-5
    pub fn hr_thresholds(&self) -> [f64; 4] {
        let max_hr = f64::from(self.max_hr_bpm);
        self.hr_zone_boundaries.map(|f| f * max_hr)
    }
}

impl EngineConfig {
    /// Engine configuration around a rider with defaults elsewhere
    pub fn for_rider(rider: RiderConfig) -> Self {
        EngineConfig {
            rider,
            ..EngineConfig::default()
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.rider.validate()?;

        if self.best_effort_durations.iter().any(|&d| d == 0) {
            return Err(MetricsError::Configuration(
                "best_effort_durations must be positive".to_string(),
            ));
        }
        if self.batch.num_threads == Some(0) {
            return Err(MetricsError::Configuration(
                "batch.num_threads must be at least 1".to_string(),
            ));
        }
        self.pmc.validate()?;
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        info!(
            ftp = config.rider.ftp_watts,
            max_hr = config.rider.max_hr_bpm,
            "Configuration loaded from {}",
            path.display()
        );
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Default configuration file location
    pub fn default_config_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("wattmetrics").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when no file exists
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        } else {
            info!("No configuration at {}, using defaults", path.display());
            Ok(EngineConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.best_effort_durations, vec![5, 60, 300, 1200, 3600]);
    }

    #[test]
    fn test_rider_validation() {
        assert!(RiderConfig::new(250.0, 185).validate().is_ok());

        let negative_ftp = RiderConfig::new(-10.0, 185);
        assert!(matches!(
            negative_ftp.validate(),
            Err(MetricsError::Configuration(_))
        ));

        let nan_ftp = RiderConfig::new(f64::NAN, 185);
        assert!(nan_ftp.validate().is_err());

        assert!(RiderConfig::new(250.0, 0).validate().is_err());

        let mut unordered = RiderConfig::new(250.0, 185);
        unordered.zone_boundaries = [0.55, 0.90, 0.75, 1.05];
        assert!(unordered.validate().is_err());

        let mut hr_over_max = RiderConfig::new(250.0, 185);
        hr_over_max.hr_zone_boundaries = [0.6, 0.7, 0.8, 1.1];
        assert!(hr_over_max.validate().is_err());
    }

    #[test]
    fn test_thresholds() {
        let rider = RiderConfig::new(200.0, 180);
        assert_eq!(rider.power_thresholds(), [110.0, 150.0, 180.0, 210.0]);
        let hr = rider.hr_thresholds();
        assert!((hr[0] - 108.0).abs() < 1e-9);
        assert!((hr[3] - 162.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::for_rider(RiderConfig::new(285.0, 178));
        config.best_effort_durations = vec![60, 1200];
        config.batch.num_threads = Some(2);
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[rider]\nftp_watts = 310.0\nmax_hr_bpm = 192\n",
        )
        .unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.rider.ftp_watts, 310.0);
        assert_eq!(loaded.rider.zone_boundaries, DEFAULT_POWER_ZONE_BOUNDARIES);
        assert_eq!(loaded.best_effort_durations, DEFAULT_BEST_EFFORT_DURATIONS.to_vec());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rider]\nftp_watts = 0.0\nmax_hr_bpm = 180\n").unwrap();
        assert!(matches!(
            EngineConfig::load_from_file(&path),
            Err(MetricsError::Configuration(_))
        ));

        std::fs::write(&path, "rider = [not toml").unwrap();
        assert!(matches!(
            EngineConfig::load_from_file(&path),
            Err(MetricsError::ConfigParse(_))
        ));
    }
}
