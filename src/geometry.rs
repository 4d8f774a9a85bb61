use crate::error::{Error, Result};
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

pub type Point = na::Point2<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

/// Orientation of the ordered triplet `(p, q, r)` from the sign of the cross product.
pub fn orientation(p: &Point, q: &Point, r: &Point) -> Orientation {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);

    if val == 0.0 {
        Orientation::Collinear
    } else if val > 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::CounterClockwise
    }
}

/// General-position segment intersection test.
///
/// Collinear configurations are not treated specially, so a movement segment
/// lying on the line (or touching it with a zero orientation on both sides) is
/// not reported.
pub fn segments_cross(a1: &Point, a2: &Point, b1: &Point, b2: &Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    o1 != o2 && o3 != o4
}

/// Directed reference segment for counting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

impl Default for CountingLine {
    fn default() -> Self {
        Self {
            start: (100.0, 300.0),
            end: (500.0, 300.0),
        }
    }
}

impl CountingLine {
    pub fn new(start: (f32, f32), end: (f32, f32)) -> Result<Self> {
        let line = Self { start, end };
        line.validate()?;

        Ok(line)
    }

    pub fn validate(&self) -> Result<()> {
        let coords = [self.start.0, self.start.1, self.end.0, self.end.1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(Error::InvalidLine(format!(
                "coordinates must be finite, got {:?} -> {:?}",
                self.start, self.end
            )));
        }

        if self.start == self.end {
            return Err(Error::InvalidLine(format!(
                "start and end must differ, got {:?}",
                self.start
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn start_point(&self) -> Point {
        Point::new(self.start.0, self.start.1)
    }

    #[inline]
    pub fn end_point(&self) -> Point {
        Point::new(self.end.0, self.end.1)
    }

    /// Whether movement from `prev` to `curr` crosses this line.
    pub fn is_crossed(&self, prev: &Point, curr: &Point) -> bool {
        segments_cross(&self.start_point(), &self.end_point(), prev, curr)
    }
}
