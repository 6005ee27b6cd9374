//! Source definitions
//!
//! A source is one configured upstream (usually an RTSP camera) together with
//! the fixed parameters its transcoder is started with. Sources are immutable
//! once built and shared between the registry and supervisors via `Arc`.

use std::fmt;

/// Unique identifier for a source (e.g., "cam1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new source id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Fixed transcode parameters for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeParams {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Output frame rate
    pub fps: u32,
    /// Video bitrate in kbit/s
    pub bitrate_kbps: u32,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            fps: 25,
            bitrate_kbps: 1000,
        }
    }
}

impl TranscodeParams {
    /// Keyframe interval in frames (one keyframe every two seconds)
    pub fn keyframe_interval(&self) -> u32 {
        self.fps.saturating_mul(2).max(1)
    }
}

/// A configured stream source
#[derive(Debug, Clone)]
pub struct Source {
    /// Source identifier
    pub id: SourceId,
    /// Human readable name
    pub name: String,
    /// Upstream URI; may embed credentials
    pub upstream_uri: String,
    /// Transcode parameters
    pub params: TranscodeParams,
}

impl Source {
    /// Create a source with default transcode parameters
    pub fn new(
        id: impl Into<SourceId>,
        name: impl Into<String>,
        upstream_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            upstream_uri: upstream_uri.into(),
            params: TranscodeParams::default(),
        }
    }

    /// Set transcode parameters
    pub fn with_params(mut self, params: TranscodeParams) -> Self {
        self.params = params;
        self
    }
}
