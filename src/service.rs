use chrono::Utc;
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use serde_derive::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::classifier::TrafficData;
use crate::config::{Config, SessionConfig};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameSource, SeekRequest};
use crate::geometry::CountingLine;
use crate::signal::{Alert, SignalController, SignalStatus};
use crate::speed::{SpeedCalibration, SpeedEstimator};
use crate::stats::{SpeedStats, TrafficSnapshot};
use crate::tracker::Tracker;

#[inline]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedReport {
    #[serde(flatten)]
    pub stats: SpeedStats,
    pub speed_limit_kmh: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub running: bool,
    pub paused: bool,
    pub frames_processed: u64,
}

/// State written only by the frame pipeline, all behind one lock.
struct Core {
    tracker: Tracker,
    speed: SpeedEstimator,
    snapshot: TrafficSnapshot,
    traffic: TrafficData,
    signal: SignalController,
    session: SessionConfig,
}

impl Core {
    fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            tracker: Tracker::new(config.tracker.clone())?,
            speed: SpeedEstimator::new(config.speed)?,
            snapshot: TrafficSnapshot::default(),
            traffic: TrafficData::new(config.session.intersection_id.clone()),
            signal: SignalController::new(config.signal),
            session: config.session.clone(),
        })
    }

    /// Tracker -> counts/speed -> snapshot -> classification -> signal, in that order.
    fn process(&mut self, mut frame: Frame, now: Instant) -> Result<()> {
        if !frame.timestamp.is_finite() {
            return Err(Error::InvalidFrame {
                index: frame.index,
                reason: format!("non-finite timestamp {}", frame.timestamp),
            });
        }

        let received = frame.len();
        frame.detections.retain(|d| d.is_valid());
        if frame.len() < received {
            warn!(
                "frame {}: dropped {} detection(s) with non-finite values",
                frame.index,
                received - frame.len()
            );
        }

        self.tracker
            .update(&frame.detections, frame.timestamp, &self.speed);

        let snapshot = TrafficSnapshot::compute(
            &frame,
            &self.tracker,
            self.speed.speed_limit(),
            self.session.recent_detections,
        );

        self.traffic
            .update(snapshot.total, snapshot.speed_stats.average_speed, Utc::now());
        self.signal.update_congestion(self.traffic.congestion);
        if let Some(phase) = self.signal.advance_at(now) {
            debug!("signal phase -> {:?}", phase);
        }

        debug!(
            "frame {}: {} detections, {} tracks, {} counted",
            frame.index,
            snapshot.total,
            snapshot.tracks.len(),
            snapshot.vehicle_count
        );
        self.snapshot = snapshot;

        Ok(())
    }

    /// Brings the published snapshot and traffic data in line with tracker
    /// state changed outside the pipeline.
    fn refresh_snapshot(&mut self) {
        self.snapshot = self
            .snapshot
            .refreshed(&self.tracker, self.speed.speed_limit());

        if self.snapshot.classification.is_some() {
            self.traffic.update(
                self.snapshot.total,
                self.snapshot.speed_stats.average_speed,
                Utc::now(),
            );
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    /// Also the seek gate: the loop never reads while a seek holds it.
    source: Mutex<Option<Box<dyn FrameSource>>>,
    running: AtomicBool,
    paused: AtomicBool,
    frames_processed: AtomicU64,
}

impl Shared {
    fn process(&self, frame: Frame) -> Result<()> {
        lock(&self.core).process(frame, Instant::now())?;
        self.frames_processed.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// One loop iteration: read at most one frame and run it through the pipeline.
    fn step(&self) {
        let next = {
            let mut source = lock(&self.source);
            match source.as_mut() {
                Some(src) => src.next_frame(),
                None => return,
            }
        };

        let result = match next {
            Ok(Some(frame)) => self.process(frame),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            if err.is_transient() {
                warn!("skipping frame: {}", err);
            } else {
                error!("frame processing failed: {}", err);
            }
        }
    }
}

enum Control {
    Pause,
    Resume,
    Stop,
}

struct Session {
    control: Sender<Control>,
    handle: thread::JoinHandle<()>,
}

fn run_loop(shared: Arc<Shared>, control: Receiver<Control>, interval: Duration) {
    info!("processing loop started ({:?} per frame)", interval);

    let ticker = tick(interval);
    let mut paused = false;

    loop {
        if paused {
            match control.recv() {
                Ok(Control::Resume) => paused = false,
                Ok(Control::Pause) => {}
                Ok(Control::Stop) | Err(_) => break,
            }
            continue;
        }

        select! {
            recv(control) -> msg => match msg {
                Ok(Control::Pause) => paused = true,
                Ok(Control::Resume) => {}
                Ok(Control::Stop) | Err(_) => break,
            },
            recv(ticker) -> _ => shared.step(),
        }
    }

    info!(
        "processing loop stopped after {} frames",
        shared.frames_processed.load(Ordering::Relaxed)
    );
}

/// Owns all tracking, statistics and signal state. External callers (an HTTP
/// layer, the replay binary, tests) only go through these operations.
pub struct TrafficService {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    interval: Duration,
}

impl TrafficService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core::new(&config)?),
                source: Mutex::new(None),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                frames_processed: AtomicU64::new(0),
            }),
            session: Mutex::new(None),
            interval: config.session.frame_interval(),
        })
    }

    /// Runs one frame through the pipeline synchronously.
    pub fn process_frame(&self, frame: Frame) -> Result<()> {
        self.shared.process(frame)
    }

    pub fn start(&self, source: Box<dyn FrameSource>) -> Result<()> {
        let mut session = lock(&self.session);
        if session.is_some() {
            return Err(Error::AlreadyRunning);
        }

        *lock(&self.shared.source) = Some(source);
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let (control, rx) = unbounded();
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("qtraffic-loop".into())
            .spawn(move || run_loop(shared, rx, interval));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                lock(&self.shared.source).take();
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };

        *session = Some(Session { control, handle });
        info!("detection session started");

        Ok(())
    }

    /// Halts the loop, releases the source and clears all tracks.
    pub fn stop(&self) -> Result<()> {
        let session = lock(&self.session).take().ok_or(Error::NotRunning)?;

        let _ = session.control.send(Control::Stop);
        if session.handle.join().is_err() {
            error!("processing loop panicked");
        }

        lock(&self.shared.source).take();
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);

        let mut core = lock(&self.shared.core);
        core.tracker.clear_tracks();
        core.refresh_snapshot();
        info!("detection session stopped");

        Ok(())
    }

    fn send(&self, msg: Control) -> Result<()> {
        let session = lock(&self.session);
        let session = session.as_ref().ok_or(Error::NotRunning)?;

        session.control.send(msg).map_err(|_| Error::NotRunning)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Control::Pause)?;
        self.shared.paused.store(true, Ordering::SeqCst);
        info!("detection paused");

        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Control::Resume)?;
        self.shared.paused.store(false, Ordering::SeqCst);
        info!("detection resumed");

        Ok(())
    }

    /// Repositions the source, returning the clamped frame index actually used.
    pub fn seek(&self, request: SeekRequest) -> Result<u64> {
        let mut source = lock(&self.shared.source);
        let src = source.as_mut().ok_or(Error::NoSource)?;

        let target = request.resolve(src.position(), src.frame_count());
        if !src.seek(target)? {
            return Err(Error::SeekUnsupported);
        }
        info!("seeked to frame {}", target);

        Ok(target)
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        lock(&self.shared.core).snapshot.clone()
    }

    pub fn set_counting_line(&self, start: (f32, f32), end: (f32, f32)) -> Result<CountingLine> {
        let line = CountingLine::new(start, end)?;

        let mut core = lock(&self.shared.core);
        core.tracker.set_line(line)?;
        core.refresh_snapshot();
        info!("counting line set to {:?} -> {:?}, counts reset", start, end);

        Ok(line)
    }

    pub fn counting_line(&self) -> CountingLine {
        *lock(&self.shared.core).tracker.line()
    }

    pub fn reset_counts(&self) {
        let mut core = lock(&self.shared.core);
        core.tracker.reset();
        core.refresh_snapshot();
        info!("vehicle counts reset");
    }

    pub fn calibrate_speed(
        &self,
        ratio: Option<f32>,
        speed_limit: Option<f32>,
    ) -> Result<SpeedCalibration> {
        let calibration = lock(&self.shared.core).speed.calibrate(ratio, speed_limit)?;
        info!(
            "speed calibration updated: {} m/px, limit {} km/h",
            calibration.pixel_to_meter_ratio, calibration.speed_limit_kmh
        );

        Ok(calibration)
    }

    pub fn speed_stats(&self) -> SpeedReport {
        let core = lock(&self.shared.core);

        SpeedReport {
            stats: core.snapshot.speed_stats,
            speed_limit_kmh: core.speed.speed_limit(),
        }
    }

    pub fn traffic_data(&self) -> TrafficData {
        lock(&self.shared.core).traffic.clone()
    }

    pub fn signal_status(&self) -> SignalStatus {
        lock(&self.shared.core).signal.status()
    }

    pub fn signal_decisions(&self) -> Vec<Alert> {
        lock(&self.shared.core).signal.decisions()
    }

    pub fn health(&self) -> Health {
        Health {
            running: self.shared.running.load(Ordering::SeqCst),
            paused: self.shared.paused.load(Ordering::SeqCst),
            frames_processed: self.shared.frames_processed.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Drop for TrafficService {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
