// parkkar-bridge/src/lib.rs
// ============================================================
// Subprocess bridge for the ParkKar detection service
// Starts one detector process per parking lot and relays its
// stdout either as free-slot counts or as opaque MJPEG bytes.
// ------------------------------------------------------------
// Public API
//   * Launcher::launch(job)        – start a detector process
//   * start_detection(..)          – fire-and-forget count relay
//   * FrameStream::open(..)        – pull-driven MJPEG chunks
//   * JobPool                      – background jobs keyed by lot
// ============================================================

//! ParkKar – detection bridge
//!
//! Every parking lot is analysed by an external detector program. This
//! crate owns the lifecycle of those programs: it picks the interpreter,
//! starts the detector with the right flags, reads what it prints and
//! makes sure the process is reaped no matter how the consumer goes away.
//!
//! Two consumption modes exist. In [`Mode::Detect`] each stdout line is an
//! integer count that is forwarded to a [`Notifier`]. In [`Mode::Stream`]
//! stdout is an MJPEG byte stream exposed as a [`FrameStream`] which an
//! HTTP layer can hand straight to a response body.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

mod diagnostics;
mod error;
mod reap;

pub mod detect;
pub mod frame;
pub mod launcher;
pub mod notifier;
pub mod pool;
pub mod stream;

pub use detect::{parse_count, start_detection, DetectSummary};
pub use error::{LaunchError, NotifierError, ParseError, StreamError};
pub use launcher::{Launcher, LauncherConfig, ProcessHandle, Runtime};
pub use notifier::Notifier;
pub use pool::JobPool;
pub use stream::FrameStream;

/// A chunk of detector stdout as relayed to the HTTP body.
pub type FrameChunk = bytes::Bytes;

/// How a detector is asked to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// One integer free-slot count per stdout line.
    Detect,
    /// MJPEG frame records on stdout (`--stream` flag).
    Stream,
}

/// One requested analysis session for a lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionJob {
    pub lot_id: String,
    pub script_path: PathBuf,
    pub mode: Mode,
}

impl DetectionJob {
    pub fn new(lot_id: impl Into<String>, script_path: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            lot_id: lot_id.into(),
            script_path: script_path.into(),
            mode,
        }
    }
}

/// A free-slot count reported by a detector for one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyReading {
    pub lot_id: String,
    pub free_slots: i64,
}

/// Tuning shared by both bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long a detector gets to exit after being asked to, and how long
    /// its stderr is waited on, before it is force-killed.
    pub grace_period_ms: u64,
    /// Read quantum for stream mode.
    pub chunk_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            chunk_size: 8 * 1024,
        }
    }
}

impl BridgeConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
