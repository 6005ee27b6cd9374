//! Transcoder process management
//!
//! - [`Launcher`] / [`FfmpegLauncher`]: what to run for a source
//! - [`ProcessHandle`]: spawn, terminate, kill and wait for one child
//! - [`DiagnosticReader`]: stderr classification and crash context

pub mod command;
pub mod diagnostics;
pub mod handle;

pub use command::{FfmpegLauncher, LaunchSpec, Launcher};
pub use diagnostics::{classify, DiagnosticLevel, DiagnosticReader, DiagnosticTail};
pub use handle::{ProcessExit, ProcessHandle};
