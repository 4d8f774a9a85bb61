use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qtraffic::{Config, Frame, RecordedSource, TrafficService};

/// Replays recorded detections (one JSON frame per line) through the traffic pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON-lines file, each line `{"ts": <seconds>, "detections": [...]}`
    input: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override session.target_fps
    #[arg(long)]
    fps: Option<u32>,

    /// Run through the background loop at the configured frame rate instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn read_frames(path: &PathBuf) -> Result<Vec<Frame>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut frames = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Frame>(&line) {
            Ok(mut frame) => {
                frame.index = frames.len() as u64;
                frames.push(frame);
            }
            Err(err) => warn!("line {}: skipping malformed frame: {}", lineno + 1, err),
        }
    }

    Ok(frames)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qtraffic=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(fps) = args.fps {
        config.session.target_fps = fps;
    }

    let frames = read_frames(&args.input)?;
    info!("loaded {} frames from {}", frames.len(), args.input.display());

    let interval = config.session.frame_interval();
    let service = TrafficService::new(config)?;

    if args.realtime {
        let expected = frames.len() as u64;
        // frames rejected by the pipeline never count as processed
        let deadline = Instant::now() + interval * (expected as u32 + 1) * 2 + Duration::from_secs(1);

        service.start(Box::new(RecordedSource::new(frames)))?;
        while service.health().frames_processed < expected && Instant::now() < deadline {
            thread::sleep(interval);
        }
        service.stop()?;
    } else {
        for frame in frames {
            if let Err(err) = service.process_frame(frame) {
                warn!("skipping frame: {}", err);
            }
        }
    }

    let report = serde_json::json!({
        "health": service.health(),
        "snapshot": service.snapshot(),
        "speed": service.speed_stats(),
        "traffic": service.traffic_data(),
        "signal": service.signal_status(),
        "decisions": service.signal_decisions(),
    });

    let out = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", out);

    Ok(())
}
