use serde_derive::Serialize;

use crate::circular_queue::CircularQueue;
use crate::detection::{Detection, VehicleClass};
use crate::geometry::Point;

pub const POSITION_HISTORY: usize = 10;
pub const SPEED_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackSample {
    pub x: f32,
    pub y: f32,
    pub ts: f64,
}

impl TrackSample {
    #[inline]
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Persistent identity of one vehicle across frames.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub position: Point,
    pub class: VehicleClass,
    pub confidence: f32,
    pub counted: bool,
    pub disappeared: u32,
    pub last_seen: f64,
    /// km/h
    pub speed: f32,
    pub(crate) positions: CircularQueue<TrackSample>,
    pub(crate) speeds: CircularQueue<f32>,
}

impl Track {
    pub fn new(id: u64, ts: f64, det: &Detection) -> Self {
        Self::with_capacity(id, ts, det, POSITION_HISTORY, SPEED_HISTORY)
    }

    pub fn with_capacity(
        id: u64,
        ts: f64,
        det: &Detection,
        position_history: usize,
        speed_history: usize,
    ) -> Self {
        let position = det.centroid();
        let mut positions = CircularQueue::with_capacity(position_history);
        positions.push(TrackSample {
            x: position.x,
            y: position.y,
            ts,
        });

        Self {
            id,
            position,
            class: det.class,
            confidence: det.confidence,
            counted: false,
            disappeared: 0,
            last_seen: ts,
            speed: 0.0,
            positions,
            speeds: CircularQueue::with_capacity(speed_history),
        }
    }

    /// Applies a matched detection. History and speed are handled by the speed estimator.
    pub(crate) fn observe(&mut self, ts: f64, det: &Detection, speed: f32) {
        self.position = det.centroid();
        self.class = det.class;
        self.confidence = det.confidence;
        self.disappeared = 0;
        self.last_seen = ts;
        self.speed = speed;
    }

    /// Marks one unmatched frame; returns `true` once the track is past `max_disappeared`.
    #[inline]
    pub(crate) fn miss(&mut self, max_disappeared: u32) -> bool {
        self.disappeared += 1;
        self.disappeared > max_disappeared
    }

    #[inline]
    pub fn positions(&self) -> impl Iterator<Item = &TrackSample> {
        self.positions.iter()
    }

    #[inline]
    pub fn speeds(&self) -> impl Iterator<Item = &f32> {
        self.speeds.iter()
    }

    #[inline]
    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn num_speeds(&self) -> usize {
        self.speeds.len()
    }
}

/// Read-only copy of a track handed out to annotation and API consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackView {
    pub id: u64,
    pub position: (f32, f32),
    #[serde(rename = "type")]
    pub class: VehicleClass,
    pub counted: bool,
    pub disappeared: u32,
    pub speed: f32,
    pub trajectory: Vec<TrackSample>,
}

impl From<&Track> for TrackView {
    fn from(t: &Track) -> TrackView {
        TrackView {
            id: t.id,
            position: (t.position.x, t.position.y),
            class: t.class,
            counted: t.counted,
            disappeared: t.disappeared,
            speed: t.speed,
            trajectory: t.positions.iter().copied().collect(),
        }
    }
}
