use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assignment::{distance_matrix, AssignmentKind, AssignmentStrategy};
use crate::detection::{ClassCounts, Detection, VehicleClass};
use crate::error::Result;
use crate::geometry::{CountingLine, Point};
use crate::speed::SpeedEstimator;
use crate::track::{Track, TrackView, POSITION_HISTORY, SPEED_HISTORY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Unmatched frames a track survives; it is dropped on the next miss.
    pub max_disappeared: u32,
    /// Gating distance in pixels between a track and a detection.
    pub max_distance: f32,
    pub position_history: usize,
    pub speed_history: usize,
    pub assignment: AssignmentKind,
    pub counting_line: CountingLine,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 30,
            max_distance: 100.0,
            position_history: POSITION_HISTORY,
            speed_history: SPEED_HISTORY,
            assignment: AssignmentKind::Greedy,
            counting_line: CountingLine::default(),
        }
    }
}

/// Cumulative line-crossing counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VehicleCounts {
    pub vehicle_count: u64,
    pub counts_by_type: ClassCounts<u64>,
}

impl VehicleCounts {
    fn record(&mut self, class: VehicleClass) {
        self.vehicle_count += 1;
        *self.counts_by_type.get_mut(class) += 1;
    }
}

/// Frame-to-frame multi-object tracker with one-shot line counting.
pub struct Tracker {
    config: TrackerConfig,
    strategy: Box<dyn AssignmentStrategy>,
    tracks: Vec<Track>,
    next_id: u64,
    counts: VehicleCounts,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let strategy = config.assignment.build();

        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(
        config: TrackerConfig,
        strategy: Box<dyn AssignmentStrategy>,
    ) -> Result<Self> {
        config.counting_line.validate()?;

        Ok(Self {
            config,
            strategy,
            tracks: Vec::with_capacity(64),
            next_id: 0,
            counts: VehicleCounts::default(),
        })
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn views(&self) -> Vec<TrackView> {
        self.tracks.iter().map(Into::into).collect()
    }

    #[inline]
    pub fn counts(&self) -> &VehicleCounts {
        &self.counts
    }

    #[inline]
    pub fn line(&self) -> &CountingLine {
        &self.config.counting_line
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Replaces the counting line. Existing `counted` flags refer to the old
    /// geometry, so tracks and cumulative counts are cleared with it.
    pub fn set_line(&mut self, line: CountingLine) -> Result<()> {
        line.validate()?;
        self.config.counting_line = line;
        self.reset();

        Ok(())
    }

    /// Clears all tracks and zeroes the cumulative counts. Ids keep increasing.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.counts = VehicleCounts::default();
    }

    /// Drops all tracks, keeping cumulative counts.
    pub fn clear_tracks(&mut self) {
        self.tracks.clear();
    }

    fn spawn(&mut self, ts: f64, det: &Detection) {
        let id = self.next_id;
        self.next_id += 1;

        self.tracks.push(Track::with_capacity(
            id,
            ts,
            det,
            self.config.position_history,
            self.config.speed_history,
        ));
    }

    fn age_out(&mut self, matched: &[bool]) {
        let max_disappeared = self.config.max_disappeared;
        let mut idx = 0;

        self.tracks.retain_mut(|t| {
            let keep = matched.get(idx).copied().unwrap_or(false) || !t.miss(max_disappeared);
            if !keep {
                debug!("track {} dropped after {} missed frames", t.id, t.disappeared);
            }
            idx += 1;
            keep
        });
    }

    /// Advances the tracker by one frame of detections taken at `ts` (seconds).
    pub fn update(&mut self, detections: &[Detection], ts: f64, speed: &SpeedEstimator) -> &[Track] {
        if detections.is_empty() {
            let matched = vec![false; self.tracks.len()];
            self.age_out(&matched);
            return &self.tracks;
        }

        if self.tracks.is_empty() {
            for det in detections {
                self.spawn(ts, det);
            }
            return &self.tracks;
        }

        let track_points: Vec<Point> = self.tracks.iter().map(|t| t.position).collect();
        let det_points: Vec<Point> = detections.iter().map(Detection::centroid).collect();
        let distances = distance_matrix(&track_points, &det_points);
        let pairs = self
            .strategy
            .assign(distances.view(), self.config.max_distance);

        let mut matched_tracks = vec![false; self.tracks.len()];
        let mut matched_dets = vec![false; detections.len()];
        let line = self.config.counting_line;

        for (row, col) in pairs {
            if matched_tracks[row] || matched_dets[col] {
                continue;
            }
            matched_tracks[row] = true;
            matched_dets[col] = true;

            let det = &detections[col];
            let curr = det_points[col];
            let track = &mut self.tracks[row];

            if !track.counted && line.is_crossed(&track.position, &curr) {
                track.counted = true;
                self.counts.record(det.class);
                info!(
                    "vehicle {} ({}) crossed the line, total count: {}",
                    track.id, det.class, self.counts.vehicle_count
                );
            }

            let kmh = speed.estimate(track, curr, ts);
            track.observe(ts, det, kmh);
        }

        self.age_out(&matched_tracks);

        for (det, _) in detections
            .iter()
            .zip(matched_dets)
            .filter(|(_, matched)| !matched)
        {
            self.spawn(ts, det);
        }

        &self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::error::Error;
    use std::collections::HashSet;

    fn det_at(x: f32, y: f32) -> Detection {
        det_class_at(x, y, VehicleClass::Car)
    }

    fn det_class_at(x: f32, y: f32, class: VehicleClass) -> Detection {
        Detection::new(BBox::ltrb(x - 10.0, y - 10.0, x + 10.0, y + 10.0), class, 0.9)
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default()).unwrap()
    }

    #[test]
    fn creates_tracks_for_first_detections() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        let tracks = t.update(&[det_at(10.0, 10.0), det_at(300.0, 10.0)], 0.0, &est);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, 0);
        assert_eq!(tracks[1].id, 1);
        assert!(tracks.iter().all(|t| !t.counted && t.disappeared == 0));
        assert!(tracks.iter().all(|t| t.num_positions() == 1));
    }

    #[test]
    fn follows_a_moving_object() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        for i in 0..5 {
            t.update(&[det_at(10.0 + i as f32 * 20.0, 10.0)], i as f64, &est);
        }

        assert_eq!(t.tracks().len(), 1);
        let track = &t.tracks()[0];
        assert_eq!(track.id, 0);
        assert_eq!(track.position, Point::new(90.0, 10.0));
        assert!(track.speed > 0.0);
    }

    #[test]
    fn far_detection_spawns_new_track() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(0.0, 0.0)], 0.0, &est);
        let tracks = t.update(&[det_at(150.0, 0.0)], 0.1, &est);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].disappeared, 1);
        assert_eq!(tracks[1].id, 1);
        assert_eq!(tracks[1].position, Point::new(150.0, 0.0));
    }

    #[test]
    fn aging_threshold() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(0.0, 0.0)], 0.0, &est);
        for i in 0..30 {
            t.update(&[], i as f64, &est);
        }
        assert_eq!(t.tracks().len(), 1);
        assert_eq!(t.tracks()[0].disappeared, 30);

        t.update(&[], 31.0, &est);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn unmatched_tracks_age_while_others_match() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(0.0, 0.0), det_at(500.0, 500.0)], 0.0, &est);
        for i in 1..=31 {
            t.update(&[det_at(0.0, 0.0)], i as f64, &est);
        }

        assert_eq!(t.tracks().len(), 1);
        assert_eq!(t.tracks()[0].id, 0);
        assert_eq!(t.tracks()[0].disappeared, 0);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut t = tracker();
        let est = SpeedEstimator::default();
        let mut seen = HashSet::new();

        for round in 0..3 {
            t.update(&[det_at(0.0, 0.0), det_at(400.0, 0.0)], 0.0, &est);
            for track in t.tracks() {
                seen.insert(track.id);
            }
            t.reset();
            assert!(t.tracks().is_empty(), "round {}", round);
        }

        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn crossing_is_counted_once() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        // default line is y = 300 between x = 100 and x = 500
        let path = [280.0, 320.0, 280.0, 320.0, 280.0];
        for (i, y) in path.iter().enumerate() {
            t.update(&[det_class_at(300.0, *y, VehicleClass::Truck)], i as f64, &est);
        }

        assert_eq!(t.tracks().len(), 1);
        assert!(t.tracks()[0].counted);
        assert_eq!(t.counts().vehicle_count, 1);
        assert_eq!(t.counts().counts_by_type.trucks, 1);
        assert_eq!(t.counts().counts_by_type.cars, 0);
    }

    #[test]
    fn counted_under_class_of_crossing_detection() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_class_at(200.0, 290.0, VehicleClass::Car)], 0.0, &est);
        t.update(&[det_class_at(200.0, 310.0, VehicleClass::Bus)], 1.0, &est);

        assert_eq!(t.counts().counts_by_type.buses, 1);
        assert_eq!(t.tracks()[0].class, VehicleClass::Bus);
    }

    #[test]
    fn first_frame_never_counts() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(300.0, 300.0)], 0.0, &est);

        assert_eq!(t.counts().vehicle_count, 0);
    }

    #[test]
    fn set_line_clears_tracks_and_counts() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(300.0, 290.0)], 0.0, &est);
        t.update(&[det_at(300.0, 310.0)], 1.0, &est);
        assert_eq!(t.counts().vehicle_count, 1);

        let line = CountingLine::new((0.0, 100.0), (600.0, 100.0)).unwrap();
        t.set_line(line).unwrap();

        assert!(t.tracks().is_empty());
        assert_eq!(t.counts(), &VehicleCounts::default());
        assert_eq!(t.line(), &line);
    }

    #[test]
    fn invalid_line_leaves_state_untouched() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(300.0, 290.0)], 0.0, &est);
        let bad = CountingLine {
            start: (1.0, 1.0),
            end: (1.0, 1.0),
        };

        assert!(matches!(t.set_line(bad), Err(Error::InvalidLine(_))));
        assert_eq!(t.tracks().len(), 1);
        assert_eq!(t.line(), &CountingLine::default());
    }

    #[test]
    fn reset_is_idempotent() {
        let mut t = tracker();
        let est = SpeedEstimator::default();

        t.update(&[det_at(300.0, 290.0)], 0.0, &est);
        t.update(&[det_at(300.0, 310.0)], 1.0, &est);

        t.reset();
        let once = (t.tracks().len(), *t.counts());
        t.reset();
        let twice = (t.tracks().len(), *t.counts());

        assert_eq!(once, twice);
        assert_eq!(once, (0, VehicleCounts::default()));
    }

    #[test]
    fn hungarian_strategy_is_pluggable() {
        let config = TrackerConfig {
            assignment: AssignmentKind::Hungarian,
            ..Default::default()
        };
        let mut t = Tracker::new(config).unwrap();
        let est = SpeedEstimator::default();

        t.update(&[det_at(0.0, 0.0), det_at(60.0, 0.0)], 0.0, &est);
        t.update(&[det_at(5.0, 0.0), det_at(65.0, 0.0)], 1.0, &est);

        assert_eq!(t.tracks().len(), 2);
        assert_eq!(t.tracks()[0].position, Point::new(5.0, 0.0));
        assert_eq!(t.tracks()[1].position, Point::new(65.0, 0.0));
    }

    #[test]
    fn custom_strategy_still_validates_line() {
        let config = TrackerConfig {
            counting_line: CountingLine {
                start: (f32::NAN, 0.0),
                end: (10.0, 0.0),
            },
            ..Default::default()
        };

        let built = Tracker::with_strategy(config, AssignmentKind::Greedy.build());
        assert!(matches!(built, Err(Error::InvalidLine(_))));

        let strategy = AssignmentKind::Hungarian.build();
        assert!(Tracker::with_strategy(TrackerConfig::default(), strategy).is_ok());
    }
}
