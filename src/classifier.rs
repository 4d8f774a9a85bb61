use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Density {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Congestion {
    #[default]
    Normal,
    Moderate,
    Severe,
}

impl Congestion {
    pub fn label(&self) -> &'static str {
        match self {
            Congestion::Normal => "Normal",
            Congestion::Moderate => "Moderate",
            Congestion::Severe => "Severe",
        }
    }
}

impl std::fmt::Display for Congestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Congestion::Normal => "NORMAL",
            Congestion::Moderate => "MODERATE",
            Congestion::Severe => "SEVERE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub density: Density,
    pub congestion: Congestion,
    pub queue_length: u64,
}

pub fn classify_density(vehicle_count: u64) -> Density {
    if vehicle_count < 15 {
        Density::Low
    } else if vehicle_count <= 35 {
        Density::Medium
    } else {
        Density::High
    }
}

/// Count and speed are independent triggers; the severe check runs first.
pub fn classify_congestion(vehicle_count: u64, average_speed: f32) -> Congestion {
    if vehicle_count > 40 || average_speed < 5.0 {
        Congestion::Severe
    } else if vehicle_count > 25 || average_speed < 15.0 {
        Congestion::Moderate
    } else {
        Congestion::Normal
    }
}

/// A count proxy, not a physical queue model.
#[inline]
pub fn queue_length(vehicle_count: u64) -> u64 {
    vehicle_count.saturating_sub(10)
}

pub fn classify(vehicle_count: u64, average_speed: f32) -> Classification {
    Classification {
        density: classify_density(vehicle_count),
        congestion: classify_congestion(vehicle_count, average_speed),
        queue_length: queue_length(vehicle_count),
    }
}

/// Classifier output with the metadata handed to traffic management consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficData {
    pub intersection_id: String,
    pub vehicle_count: u64,
    pub average_speed: f32,
    #[serde(rename = "traffic_density")]
    pub density: Density,
    #[serde(rename = "congestion_level")]
    pub congestion: Congestion,
    pub queue_length: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TrafficData {
    pub fn new<S: Into<String>>(intersection_id: S) -> Self {
        Self {
            intersection_id: intersection_id.into(),
            vehicle_count: 0,
            average_speed: 0.0,
            density: Density::Low,
            congestion: Congestion::Normal,
            queue_length: 0,
            last_updated: None,
        }
    }

    pub fn update(&mut self, vehicle_count: u64, average_speed: f32, now: DateTime<Utc>) {
        let c = classify(vehicle_count, average_speed);

        self.vehicle_count = vehicle_count;
        self.average_speed = average_speed;
        self.density = c.density;
        self.congestion = c.congestion;
        self.queue_length = c.queue_length;
        self.last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_boundaries() {
        assert_eq!(classify_density(0), Density::Low);
        assert_eq!(classify_density(14), Density::Low);
        assert_eq!(classify_density(15), Density::Medium);
        assert_eq!(classify_density(35), Density::Medium);
        assert_eq!(classify_density(36), Density::High);
    }

    #[test]
    fn congestion_rules() {
        assert_eq!(classify_congestion(41, 20.0), Congestion::Severe);
        assert_eq!(classify_congestion(20, 4.0), Congestion::Severe);
        assert_eq!(classify_congestion(30, 20.0), Congestion::Moderate);
        assert_eq!(classify_congestion(10, 14.9), Congestion::Moderate);
        assert_eq!(classify_congestion(10, 20.0), Congestion::Normal);
        assert_eq!(classify_congestion(25, 15.0), Congestion::Normal);
    }

    #[test]
    fn queue_length_floors_at_zero() {
        assert_eq!(queue_length(3), 0);
        assert_eq!(queue_length(10), 0);
        assert_eq!(queue_length(17), 7);
    }

    #[test]
    fn traffic_data_serializes_upper_case_categories() {
        let mut data = TrafficData::new("main-intersection");
        data.update(36, 20.0, Utc::now());

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["traffic_density"], "HIGH");
        assert_eq!(json["congestion_level"], "MODERATE");
        assert_eq!(json["queue_length"], 26);
        assert_eq!(json["intersection_id"], "main-intersection");
    }
}
