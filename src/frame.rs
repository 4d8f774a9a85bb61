use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub index: u64,
    #[serde(alias = "ts")]
    pub timestamp: f64, // in seconds
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            index,
            timestamp,
            detections,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Source of already-detected frames: a decoded video stream plus the detector in front of it.
pub trait FrameSource: Send {
    /// Next frame, or `None` when no frame is available right now.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Index of the next frame to be read.
    fn position(&self) -> u64;

    /// Total number of frames if the source is finite and knows it.
    fn frame_count(&self) -> Option<u64>;

    /// Repositions the source. Returns `false` if the source cannot seek.
    fn seek(&mut self, target: u64) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekRequest {
    Offset(i64),
    Target(u64),
}

impl SeekRequest {
    /// Builds a request from optional parts; an absolute target wins over an offset.
    pub fn from_parts(offset: Option<i64>, target: Option<u64>) -> Result<Self> {
        match (offset, target) {
            (_, Some(t)) => Ok(SeekRequest::Target(t)),
            (Some(off), None) => Ok(SeekRequest::Offset(off)),
            (None, None) => Err(Error::MissingSeekTarget),
        }
    }

    /// Resolves the absolute frame index, clamped to the valid range of the source.
    pub fn resolve(&self, current: u64, frame_count: Option<u64>) -> u64 {
        let target = match *self {
            SeekRequest::Target(t) => t,
            SeekRequest::Offset(off) => {
                if off < 0 {
                    current.saturating_sub(off.unsigned_abs())
                } else {
                    current.saturating_add(off as u64)
                }
            }
        };

        match frame_count {
            Some(total) => target.min(total.saturating_sub(1)),
            None => target,
        }
    }
}

/// In-memory source over a pre-recorded list of frames.
#[derive(Debug, Clone, Default)]
pub struct RecordedSource {
    frames: Vec<Frame>,
    cursor: usize,
}

impl RecordedSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, cursor: 0 }
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.frames.len()
    }
}

impl FrameSource for RecordedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }

        Ok(frame)
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn seek(&mut self, target: u64) -> Result<bool> {
        if target as usize > self.frames.len() {
            return Ok(false);
        }

        self.cursor = target as usize;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_relative_and_floors_at_zero() {
        assert_eq!(SeekRequest::Offset(5).resolve(10, None), 15);
        assert_eq!(SeekRequest::Offset(-30).resolve(10, None), 0);
    }

    #[test]
    fn target_is_clamped_to_last_frame() {
        assert_eq!(SeekRequest::Target(500).resolve(0, Some(100)), 99);
        assert_eq!(SeekRequest::Offset(500).resolve(10, Some(100)), 99);
        assert_eq!(SeekRequest::Target(500).resolve(0, Some(0)), 0);
        assert_eq!(SeekRequest::Offset(3).resolve(0, Some(0)), 0);
    }

    #[test]
    fn request_from_parts() {
        assert_eq!(
            SeekRequest::from_parts(Some(3), Some(7)).unwrap(),
            SeekRequest::Target(7)
        );
        assert_eq!(
            SeekRequest::from_parts(Some(-3), None).unwrap(),
            SeekRequest::Offset(-3)
        );
        assert!(matches!(
            SeekRequest::from_parts(None, None),
            Err(Error::MissingSeekTarget)
        ));
    }

    #[test]
    fn recorded_source_reads_and_seeks() {
        let frames = (0..3).map(|i| Frame::new(i, i as f64, vec![])).collect();
        let mut src = RecordedSource::new(frames);

        assert_eq!(src.next_frame().unwrap().map(|f| f.index), Some(0));
        assert!(src.seek(2).unwrap());
        assert_eq!(src.next_frame().unwrap().map(|f| f.index), Some(2));
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.is_exhausted());
        assert!(!src.seek(10).unwrap());
    }

    #[test]
    fn empty_source_accepts_clamped_seek() {
        let mut src = RecordedSource::default();
        let target = SeekRequest::Target(42).resolve(src.position(), src.frame_count());

        assert_eq!(target, 0);
        assert!(src.seek(target).unwrap());
        assert!(src.next_frame().unwrap().is_none());
    }
}
