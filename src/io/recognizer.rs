//! Frame source and text recognition interface
//!
//! The pipeline only needs one recognized string per tick. Camera access,
//! crop geometry and the recognition engine live behind `TextSource`.
//! `ReplaySource` feeds recorded recognizer output, one frame per line,
//! for offline runs and tests.

use crate::domain::types::CropRect;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Characters the recognizer should restrict itself to
pub const COORDINATE_WHITELIST: &str = "0123456789.,- ";

/// Page segmentation hint for the recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegmentation {
    /// Treat the crop as a single text line
    SingleLine,
}

/// Recognition engine configuration applied once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub whitelist: String,
    pub page_segmentation: PageSegmentation,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            whitelist: COORDINATE_WHITELIST.to_string(),
            page_segmentation: PageSegmentation::SingleLine,
        }
    }
}

/// Camera plus recognition engine
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Apply recognition settings. An error here is fatal to the session.
    async fn configure(&self, config: &RecognitionConfig) -> anyhow::Result<()>;

    /// Crop region to recognize, or `None` if no frame is available yet
    fn frame(&self) -> Option<CropRect>;

    /// Recognize text in the given region of the current frame
    async fn recognize(&self, region: CropRect) -> anyhow::Result<String>;

    /// True once the source will never produce another frame
    fn finished(&self) -> bool {
        false
    }
}

/// Replays recorded recognizer output, one frame per line
pub struct ReplaySource {
    frames: Vec<String>,
    cursor: AtomicUsize,
    latency: Duration,
    looped: bool,
    crop: CropRect,
}

impl ReplaySource {
    pub fn new(frames: Vec<String>) -> Self {
        Self {
            frames,
            cursor: AtomicUsize::new(0),
            latency: Duration::ZERO,
            looped: false,
            crop: CropRect { x: 0, y: 0, width: 640, height: 80 },
        }
    }

    /// Load frames from a text file, one recognized string per line
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let frames: Vec<String> = content.lines().map(str::to_string).collect();
        info!(path = %path.display(), frames = %frames.len(), "replay_loaded");
        Ok(Self::new(frames))
    }

    /// Simulated recognition time per frame
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Restart from the first frame when the end is reached
    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl TextSource for ReplaySource {
    async fn configure(&self, config: &RecognitionConfig) -> anyhow::Result<()> {
        if self.frames.is_empty() {
            bail!("replay source has no frames");
        }
        info!(
            whitelist = %config.whitelist,
            page_segmentation = ?config.page_segmentation,
            "replay_configured"
        );
        Ok(())
    }

    fn frame(&self) -> Option<CropRect> {
        (!self.finished()).then_some(self.crop)
    }

    async fn recognize(&self, _region: CropRect) -> anyhow::Result<String> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let slot = if self.looped && !self.frames.is_empty() {
            Some(index % self.frames.len())
        } else {
            (index < self.frames.len()).then_some(index)
        };
        match slot {
            Some(i) => Ok(self.frames[i].clone()),
            None => bail!("replay exhausted after {} frames", self.frames.len()),
        }
    }

    fn finished(&self) -> bool {
        if self.looped {
            return self.frames.is_empty();
        }
        self.cursor.load(Ordering::Relaxed) >= self.frames.len()
    }
}
