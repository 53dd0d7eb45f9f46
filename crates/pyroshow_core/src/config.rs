use crate::error::{CoreError, Result};
use crate::types::TimeUs;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the clock does when master time runs past the end of the show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndOfShow {
    /// Pause and rewind master time to zero.
    #[default]
    StopAndRewind,
    /// Pause and keep master time at the end.
    HoldAtEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub drift_tolerance_secs: f64,
    pub extend_margin_secs: f64,
    pub min_total_duration_secs: f64,
    pub default_total_duration_secs: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub end_of_show: EndOfShow,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_secs: 0.3,
            extend_margin_secs: 10.0,
            min_total_duration_secs: 10.0,
            default_total_duration_secs: 60.0,
            min_zoom: 0.5,
            max_zoom: 4.0,
            end_of_show: EndOfShow::StopAndRewind,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("drift_tolerance_secs", self.drift_tolerance_secs),
            ("extend_margin_secs", self.extend_margin_secs),
            ("min_total_duration_secs", self.min_total_duration_secs),
            ("default_total_duration_secs", self.default_total_duration_secs),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.min_zoom <= 0.0 || self.min_zoom > self.max_zoom {
            return Err(CoreError::InvalidConfig(format!(
                "zoom range [{}, {}] is empty",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.min_total_duration_secs <= 0.0 {
            return Err(CoreError::InvalidConfig(
                "min_total_duration_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn drift_tolerance(&self) -> TimeUs {
        TimeUs::from_seconds(self.drift_tolerance_secs)
    }

    pub fn extend_margin(&self) -> TimeUs {
        TimeUs::from_seconds(self.extend_margin_secs)
    }

    pub fn min_total_duration(&self) -> TimeUs {
        TimeUs::from_seconds(self.min_total_duration_secs)
    }

    /// Default show length, never below the user minimum.
    pub fn default_total_duration(&self) -> TimeUs {
        TimeUs::from_seconds(self.default_total_duration_secs).max(self.min_total_duration())
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return 1.0_f64.clamp(self.min_zoom, self.max_zoom);
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}
