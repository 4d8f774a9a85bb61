use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::signal::SignalConfig;
use crate::speed::SpeedCalibration;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Processing cadence of the background loop
    pub target_fps: u32,
    pub intersection_id: String,
    /// Detections of the current frame kept in the snapshot
    pub recent_detections: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            intersection_id: "main-intersection".to_string(),
            recent_detections: 10,
        }
    }
}

impl SessionConfig {
    #[inline]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub speed: SpeedCalibration,
    pub signal: SignalConfig,
    pub session: SessionConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracker;
        t.counting_line.validate()?;

        if !(t.max_distance.is_finite() && t.max_distance > 0.0) {
            return Err(Error::config(format!(
                "tracker.max_distance must be positive, got {}",
                t.max_distance
            )));
        }

        if t.position_history < 2 || t.speed_history == 0 {
            return Err(Error::config(
                "tracker.position_history must be at least 2 and speed_history at least 1",
            ));
        }

        self.speed.validate()?;
        self.signal.validate()?;

        if self.session.target_fps == 0 {
            return Err(Error::config("session.target_fps must be positive"));
        }

        Ok(())
    }
}
