use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid counting line: {0}")]
    InvalidLine(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Detection already running")]
    AlreadyRunning,

    #[error("No active detection session")]
    NotRunning,

    #[error("No active video source")]
    NoSource,

    #[error("Offset or target required")]
    MissingSeekTarget,

    #[error("Seek failed or not supported by this source")]
    SeekUnsupported,

    #[error("Invalid frame {index}: {reason}")]
    InvalidFrame { index: u64, reason: String },

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML Error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Boundary errors are returned to the caller; the rest only skip a frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::InvalidFrame { .. } | Self::Source(_))
    }
}
