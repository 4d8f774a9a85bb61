use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::track::{Track, TrackSample};

const MPS_TO_KMH: f32 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedCalibration {
    /// Meters per pixel
    pub pixel_to_meter_ratio: f32,
    pub speed_limit_kmh: f32,
}

impl Default for SpeedCalibration {
    fn default() -> Self {
        Self {
            pixel_to_meter_ratio: 0.05,
            speed_limit_kmh: 60.0,
        }
    }
}

impl SpeedCalibration {
    pub fn validate(&self) -> Result<()> {
        if !(self.pixel_to_meter_ratio.is_finite() && self.pixel_to_meter_ratio > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "pixel_to_meter_ratio must be positive, got {}",
                self.pixel_to_meter_ratio
            )));
        }

        if !(self.speed_limit_kmh.is_finite() && self.speed_limit_kmh > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "speed_limit_kmh must be positive, got {}",
                self.speed_limit_kmh
            )));
        }

        Ok(())
    }
}

/// Converts a track's position history into a smoothed real-world speed.
///
/// Two windows are involved: the last samples of the position history give the
/// instantaneous speed, and the bounded speed history of the track is averaged
/// to produce the reported value.
#[derive(Debug, Clone, Default)]
pub struct SpeedEstimator {
    calibration: SpeedCalibration,
}

impl SpeedEstimator {
    pub fn new(calibration: SpeedCalibration) -> Result<Self> {
        calibration.validate()?;

        Ok(Self { calibration })
    }

    #[inline]
    pub fn calibration(&self) -> &SpeedCalibration {
        &self.calibration
    }

    #[inline]
    pub fn speed_limit(&self) -> f32 {
        self.calibration.speed_limit_kmh
    }

    /// Updates the calibration; either value may be left unchanged. Nothing is
    /// applied unless both resulting values are valid.
    pub fn calibrate(&mut self, ratio: Option<f32>, speed_limit: Option<f32>) -> Result<SpeedCalibration> {
        let mut next = self.calibration;
        if let Some(ratio) = ratio {
            next.pixel_to_meter_ratio = ratio;
        }

        if let Some(limit) = speed_limit {
            next.speed_limit_kmh = limit;
        }

        next.validate()?;
        self.calibration = next;

        Ok(next)
    }

    /// Pixel speed to km/h.
    #[inline]
    pub fn to_kmh(&self, px_per_sec: f32) -> f32 {
        px_per_sec * self.calibration.pixel_to_meter_ratio * MPS_TO_KMH
    }

    /// Instantaneous km/h between two samples; 0 for non-increasing timestamps.
    pub fn instantaneous(&self, prev: &TrackSample, curr: &TrackSample) -> f32 {
        let dt = curr.ts - prev.ts;
        if !(dt > 0.0) {
            return 0.0;
        }

        let dl = na::distance(&prev.point(), &curr.point());
        let kmh = self.to_kmh((dl as f64 / dt) as f32);

        if kmh.is_finite() {
            kmh
        } else {
            0.0
        }
    }

    /// Records `position` at `ts` into the track history and returns the smoothed speed.
    pub fn estimate(&self, track: &mut Track, position: Point, ts: f64) -> f32 {
        track.positions.push(TrackSample {
            x: position.x,
            y: position.y,
            ts,
        });

        let (prev, curr) = match track.positions.latest_pair() {
            Some(pair) => pair,
            None => return 0.0,
        };

        let dt = curr.ts - prev.ts;
        if !(dt > 0.0) {
            return 0.0;
        }

        let kmh = self.instantaneous(prev, curr);
        track.speeds.push(kmh);

        if track.speeds.len() > 1 {
            track.speeds.mean().unwrap_or(kmh)
        } else {
            kmh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::circular_queue::CircularQueue;
    use crate::detection::{Detection, VehicleClass};
    use crate::track::POSITION_HISTORY;
    use approx::assert_relative_eq;

    fn track_at(x: f32, y: f32, ts: f64) -> Track {
        let det = Detection::new(
            BBox::ltrb(x - 5.0, y - 5.0, x + 5.0, y + 5.0),
            VehicleClass::Car,
            0.9,
        );
        Track::new(0, ts, &det)
    }

    #[test]
    fn first_sample_has_no_speed() {
        let est = SpeedEstimator::default();
        let mut track = Track::new(
            0,
            0.0,
            &Detection::new(BBox::ltrb(0.0, 0.0, 0.0, 0.0), VehicleClass::Car, 1.0),
        );
        track.positions = CircularQueue::with_capacity(POSITION_HISTORY);

        assert_eq!(est.estimate(&mut track, Point::new(0.0, 0.0), 0.0), 0.0);
        assert_eq!(track.num_speeds(), 0);
    }

    #[test]
    fn ten_pixels_in_one_second() {
        let est = SpeedEstimator::default();
        let mut track = track_at(0.0, 0.0, 0.0);

        let speed = est.estimate(&mut track, Point::new(10.0, 0.0), 1.0);
        assert_eq!(speed, 1.8);
    }

    #[test]
    fn duplicate_timestamp_is_zero() {
        let est = SpeedEstimator::default();
        let mut track = track_at(0.0, 0.0, 1.0);

        assert_eq!(est.estimate(&mut track, Point::new(10.0, 0.0), 1.0), 0.0);
        assert_eq!(est.estimate(&mut track, Point::new(20.0, 0.0), 0.5), 0.0);
        assert_eq!(track.num_speeds(), 0);
    }

    #[test]
    fn smoothed_over_speed_window() {
        let est = SpeedEstimator::default();
        let mut track = track_at(0.0, 0.0, 0.0);

        // 10 px/s then 30 px/s
        est.estimate(&mut track, Point::new(10.0, 0.0), 1.0);
        let speed = est.estimate(&mut track, Point::new(40.0, 0.0), 2.0);

        assert_relative_eq!(speed, 20.0 * 0.05 * 3.6, epsilon = 1e-5);
    }

    #[test]
    fn histories_stay_bounded() {
        let est = SpeedEstimator::default();
        let mut track = track_at(0.0, 0.0, 0.0);

        for i in 1..50 {
            est.estimate(&mut track, Point::new(i as f32, 0.0), i as f64);
        }

        assert_eq!(track.num_positions(), 10);
        assert_eq!(track.num_speeds(), 5);
    }

    #[test]
    fn calibrate_rejects_invalid_values_without_partial_update() {
        let mut est = SpeedEstimator::default();

        assert!(matches!(
            est.calibrate(Some(0.1), Some(-1.0)),
            Err(Error::InvalidCalibration(_))
        ));
        assert_eq!(est.calibration(), &SpeedCalibration::default());

        let cal = est.calibrate(Some(0.1), None).unwrap();
        assert_eq!(cal.pixel_to_meter_ratio, 0.1);
        assert_eq!(cal.speed_limit_kmh, 60.0);
    }
}
