pub mod assignment;
pub mod bbox;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod service;
pub mod signal;
pub mod speed;
pub mod stats;
pub mod tracker;

mod circular_queue;
mod track;

pub use classifier::{Congestion, Density, TrafficData};
pub use config::Config;
pub use detection::{Detection, VehicleClass};
pub use error::{Error, Result};
pub use frame::{Frame, FrameSource, RecordedSource, SeekRequest};
pub use geometry::CountingLine;
pub use service::{Health, SpeedReport, TrafficService};
pub use signal::{Alert, Phase, SignalController, SignalStatus};
pub use speed::{SpeedCalibration, SpeedEstimator};
pub use stats::{SpeedStats, TrafficSnapshot};
pub use track::{Track, TrackSample, TrackView};
pub use tracker::{Tracker, TrackerConfig, VehicleCounts};
