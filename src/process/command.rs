//! Transcoder command construction
//!
//! The `Launcher` trait decides which program a supervisor runs for a source.
//! `FfmpegLauncher` produces the low-latency MPEG-TS invocation consumers expect:
//! TCP input, no audio, H.264 with zero-latency tuning, yuv420p, fixed rate/size,
//! a keyframe every two seconds, no B-frames and regenerated timestamps.

use crate::source::Source;

/// Program and arguments for one transcoder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Create a new launch spec
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Builds the command a supervisor spawns for its source
pub trait Launcher: Send + Sync + 'static {
    /// Build the launch spec for a source
    fn launch_spec(&self, source: &Source) -> LaunchSpec;
}

/// Launches ffmpeg with the relay's fixed output contract
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: String,
}

impl FfmpegLauncher {
    /// Use `ffmpeg` from `PATH`
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Use a specific ffmpeg binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Get the binary path
    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for FfmpegLauncher {
    fn launch_spec(&self, source: &Source) -> LaunchSpec {
        let p = &source.params;

        let args = [
            // Input: reliable transport, small probe for fast start
            "-loglevel",
            "error",
            "-rtsp_transport",
            "tcp",
            "-timeout",
            "30000000",
            "-probesize",
            "32768",
            "-analyzeduration",
            "500000",
            "-fflags",
            "+nobuffer+flush_packets",
            "-i",
            source.upstream_uri.as_str(),
            // Video only
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-pix_fmt",
            "yuv420p",
            "-r",
            p.fps.to_string().as_str(),
            "-s",
            format!("{}x{}", p.width, p.height).as_str(),
            "-b:v",
            format!("{}k", p.bitrate_kbps).as_str(),
            "-g",
            p.keyframe_interval().to_string().as_str(),
            "-bf",
            "0",
            // Output: MPEG-TS on stdout
            "-f",
            "mpegts",
            "-fflags",
            "+genpts",
            "-mpegts_copyts",
            "1",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        LaunchSpec::new(self.binary.clone(), args)
    }
}
