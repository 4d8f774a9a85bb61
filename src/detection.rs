use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::geometry::Point;

/// Vehicle taxonomy tracked by the core.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
    Bike,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Truck,
        VehicleClass::Bus,
        VehicleClass::Bike,
    ];

    /// Maps a detector label onto the taxonomy; `None` for non-vehicles.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "car" => Some(Self::Car),
            "truck" => Some(Self::Truck),
            "bus" => Some(Self::Bus),
            "bike" | "bicycle" | "motorcycle" => Some(Self::Bike),
            _ => None,
        }
    }

    /// Aggregate bucket key used in counts and statistics.
    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Car => "cars",
            Self::Truck => "trucks",
            Self::Bus => "buses",
            Self::Bike => "bikes",
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Car => "car",
            Self::Truck => "truck",
            Self::Bus => "bus",
            Self::Bike => "bike",
        };

        f.write_str(name)
    }
}

/// One value per aggregate bucket, serialized with the plural bucket keys.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassCounts<T> {
    pub cars: T,
    pub trucks: T,
    pub buses: T,
    pub bikes: T,
}

impl<T> ClassCounts<T> {
    pub fn get(&self, class: VehicleClass) -> &T {
        match class {
            VehicleClass::Car => &self.cars,
            VehicleClass::Truck => &self.trucks,
            VehicleClass::Bus => &self.buses,
            VehicleClass::Bike => &self.bikes,
        }
    }

    pub fn get_mut(&mut self, class: VehicleClass) -> &mut T {
        match class {
            VehicleClass::Car => &mut self.cars,
            VehicleClass::Truck => &mut self.trucks,
            VehicleClass::Bus => &mut self.buses,
            VehicleClass::Bike => &mut self.bikes,
        }
    }
}

/// One object seen by the detector in one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "type")]
    pub class: VehicleClass,
    /// In [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox<Ltrb>, class: VehicleClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
        }
    }

    /// Builds a detection from a raw detector label, skipping non-vehicle classes.
    pub fn from_label(label: &str, bbox: BBox<Ltrb>, confidence: f32) -> Option<Self> {
        VehicleClass::from_label(label).map(|class| Self::new(bbox, class, confidence))
    }

    #[inline(always)]
    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bbox.is_finite() && self.confidence.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mapping() {
        assert_eq!(VehicleClass::from_label("car"), Some(VehicleClass::Car));
        assert_eq!(VehicleClass::from_label("Truck"), Some(VehicleClass::Truck));
        assert_eq!(VehicleClass::from_label("bus"), Some(VehicleClass::Bus));
        assert_eq!(VehicleClass::from_label("bicycle"), Some(VehicleClass::Bike));
        assert_eq!(
            VehicleClass::from_label("motorcycle"),
            Some(VehicleClass::Bike)
        );
        assert_eq!(VehicleClass::from_label("person"), None);
    }

    #[test]
    fn buckets_are_plural() {
        let buckets: Vec<_> = VehicleClass::ALL.iter().map(|c| c.bucket()).collect();
        assert_eq!(buckets, vec!["cars", "trucks", "buses", "bikes"]);
    }

    #[test]
    fn deserializes_detector_json() {
        let det: Detection =
            serde_json::from_str(r#"{"bbox":[0,0,20,10],"type":"bus","confidence":0.9}"#)
                .unwrap();

        assert_eq!(det.class, VehicleClass::Bus);
        assert_eq!(det.centroid(), Point::new(10.0, 5.0));
    }
}
