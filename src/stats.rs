use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::classifier::{classify, Classification};
use crate::detection::{ClassCounts, Detection, VehicleClass};
use crate::frame::Frame;
use crate::track::{Track, TrackView};
use crate::tracker::{Tracker, VehicleCounts};

#[inline]
fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpeedStats {
    pub average_speed: f32,
    pub max_speed: f32,
    pub min_speed: f32,
    pub speeding_count: u64,
    pub speed_by_type: ClassCounts<f32>,
}

impl SpeedStats {
    /// Statistics over alive tracks that currently have a positive speed.
    pub fn from_tracks(tracks: &[Track], speed_limit_kmh: f32) -> Self {
        let mut sums = ClassCounts::<(f32, u32)>::default();
        let mut total = 0.0f32;
        let mut n = 0u32;
        let mut max = f32::MIN;
        let mut min = f32::MAX;
        let mut speeding = 0u64;

        for t in tracks.iter().filter(|t| t.speed > 0.0) {
            total += t.speed;
            n += 1;
            max = max.max(t.speed);
            min = min.min(t.speed);

            if t.speed > speed_limit_kmh {
                speeding += 1;
            }

            let entry = sums.get_mut(t.class);
            entry.0 += t.speed;
            entry.1 += 1;
        }

        if n == 0 {
            return Self::default();
        }

        let mut speed_by_type = ClassCounts::default();
        for class in VehicleClass::ALL {
            let (sum, count) = *sums.get(class);
            if count > 0 {
                *speed_by_type.get_mut(class) = round2(sum / count as f32);
            }
        }

        Self {
            average_speed: round2(total / n as f32),
            max_speed: round2(max),
            min_speed: round2(min),
            speeding_count: speeding,
            speed_by_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDetection {
    pub frame: u64,
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub class: VehicleClass,
    /// Percent, two decimals
    pub confidence: f32,
    pub bbox: BBox<Ltrb>,
}

impl RecentDetection {
    fn new(frame: &Frame, det: &Detection) -> Self {
        Self {
            frame: frame.index,
            timestamp: frame.timestamp,
            class: det.class,
            confidence: round2(det.confidence * 100.0),
            bbox: det.bbox,
        }
    }
}

/// Everything the transport layer reads, recomputed once per processed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficSnapshot {
    pub frame: u64,
    pub timestamp: f64,
    /// Vehicles visible in the current frame
    #[serde(flatten)]
    pub visible: ClassCounts<u64>,
    pub total: u64,
    /// Mean detection confidence of the current frame, percent
    pub confidence: f32,
    pub recent_detections: Vec<RecentDetection>,
    pub vehicle_count: u64,
    pub counts_by_type: ClassCounts<u64>,
    pub speed_stats: SpeedStats,
    #[serde(flatten)]
    pub classification: Option<Classification>,
    pub tracks: Vec<TrackView>,
}

impl TrafficSnapshot {
    pub fn compute(
        frame: &Frame,
        tracker: &Tracker,
        speed_limit_kmh: f32,
        recent_capacity: usize,
    ) -> Self {
        let mut visible = ClassCounts::<u64>::default();
        let mut conf_sum = 0.0f32;
        for det in frame.iter() {
            *visible.get_mut(det.class) += 1;
            conf_sum += det.confidence;
        }

        let total = frame.len() as u64;
        let confidence = if total > 0 {
            round2(conf_sum / total as f32 * 100.0)
        } else {
            0.0
        };

        let speed_stats = SpeedStats::from_tracks(tracker.tracks(), speed_limit_kmh);
        let VehicleCounts {
            vehicle_count,
            counts_by_type,
        } = *tracker.counts();

        Self {
            frame: frame.index,
            timestamp: frame.timestamp,
            visible,
            total,
            confidence,
            recent_detections: frame
                .iter()
                .take(recent_capacity)
                .map(|d| RecentDetection::new(frame, d))
                .collect(),
            vehicle_count,
            counts_by_type,
            speed_stats,
            classification: Some(classify(total, speed_stats.average_speed)),
            tracks: tracker.views(),
        }
    }

    /// Recomputes everything derived from the track set, keeping the per-frame
    /// detection fields of the last processed frame.
    pub fn refreshed(&self, tracker: &Tracker, speed_limit_kmh: f32) -> Self {
        let speed_stats = SpeedStats::from_tracks(tracker.tracks(), speed_limit_kmh);
        let VehicleCounts {
            vehicle_count,
            counts_by_type,
        } = *tracker.counts();

        Self {
            vehicle_count,
            counts_by_type,
            speed_stats,
            classification: self
                .classification
                .map(|_| classify(self.total, speed_stats.average_speed)),
            tracks: tracker.views(),
            ..self.clone()
        }
    }
}
