use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

use crate::circular_queue::CircularQueue;
use crate::classifier::Congestion;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Red,
    Green,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenTimings {
    pub normal: u64,
    pub moderate: u64,
    pub severe: u64,
}

impl Default for GreenTimings {
    fn default() -> Self {
        Self {
            normal: 30,
            moderate: 45,
            severe: 60,
        }
    }
}

impl GreenTimings {
    #[inline]
    pub fn for_congestion(&self, congestion: Congestion) -> u64 {
        match congestion {
            Congestion::Normal => self.normal,
            Congestion::Moderate => self.moderate,
            Congestion::Severe => self.severe,
        }
    }
}

/// Phase durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub red_secs: u64,
    pub yellow_secs: u64,
    pub green_secs: GreenTimings,
    pub alert_capacity: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            red_secs: 10,
            yellow_secs: 5,
            green_secs: GreenTimings::default(),
            alert_capacity: 5,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        let g = &self.green_secs;
        if [self.red_secs, self.yellow_secs, g.normal, g.moderate, g.severe].contains(&0) {
            return Err(Error::config("signal phase durations must be positive"));
        }

        if self.alert_capacity == 0 {
            return Err(Error::config("signal alert_capacity must be positive"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub congestion: Congestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalStatus {
    pub phase: Phase,
    /// Seconds left in the current phase, never negative.
    pub remaining_time: f32,
    pub congestion_level: Congestion,
    pub green_time: u64,
}

/// Adaptive RED -> GREEN -> YELLOW -> RED cycle whose green time follows the
/// last observed congestion level.
#[derive(Debug, Clone)]
pub struct SignalController {
    config: SignalConfig,
    phase: Phase,
    phase_started: Instant,
    last_congestion: Congestion,
    alerts: CircularQueue<Alert>,
}

impl SignalController {
    pub fn new(config: SignalConfig) -> Self {
        Self::started_at(config, Instant::now())
    }

    pub fn started_at(config: SignalConfig, now: Instant) -> Self {
        Self {
            config,
            phase: Phase::Red,
            phase_started: now,
            last_congestion: Congestion::Normal,
            alerts: CircularQueue::with_capacity(config.alert_capacity),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn last_congestion(&self) -> Congestion {
        self.last_congestion
    }

    /// Green duration for the last observed congestion level.
    #[inline]
    pub fn green_time(&self) -> u64 {
        self.config.green_secs.for_congestion(self.last_congestion)
    }

    pub fn phase_duration(&self, phase: Phase) -> Duration {
        let secs = match phase {
            Phase::Red => self.config.red_secs,
            Phase::Green => self.green_time(),
            Phase::Yellow => self.config.yellow_secs,
        };

        Duration::from_secs(secs)
    }

    /// Records the classifier's congestion level, raising an alert when it changed.
    pub fn update_congestion(&mut self, congestion: Congestion) -> Option<&Alert> {
        self.update_congestion_at(congestion, Utc::now())
    }

    pub fn update_congestion_at(
        &mut self,
        congestion: Congestion,
        now: DateTime<Utc>,
    ) -> Option<&Alert> {
        if congestion == self.last_congestion {
            return None;
        }

        let alert = Alert {
            message: format!(
                "{} congestion detected. Signal timing adjusted.",
                congestion.label()
            ),
            timestamp: now,
            congestion,
        };
        info!("{}", alert.message);

        self.alerts.push(alert);
        self.last_congestion = congestion;

        self.alerts.latest()
    }

    pub fn advance(&mut self) -> Option<Phase> {
        self.advance_at(Instant::now())
    }

    /// Moves to the next phase if the current one has run its course; at most
    /// one transition per call. Returns the new phase on transition.
    pub fn advance_at(&mut self, now: Instant) -> Option<Phase> {
        let elapsed = now.saturating_duration_since(self.phase_started);
        if elapsed < self.phase_duration(self.phase) {
            return None;
        }

        self.phase = match self.phase {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Yellow,
            Phase::Yellow => Phase::Red,
        };
        self.phase_started = now;

        Some(self.phase)
    }

    /// Time left in the current phase, recomputed from wall time on every call.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.phase_started);

        self.phase_duration(self.phase).saturating_sub(elapsed)
    }

    pub fn status(&self) -> SignalStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> SignalStatus {
        SignalStatus {
            phase: self.phase,
            remaining_time: self.remaining_at(now).as_secs_f32(),
            congestion_level: self.last_congestion,
            green_time: self.green_time(),
        }
    }

    /// Recent congestion alerts, oldest first.
    pub fn decisions(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }
}

impl Default for SignalController {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}
