//! Shared fixtures: `/bin/sh` scripts stand in for the detectors.
#![allow(dead_code)]

use parkkar_bridge::{
    BridgeConfig, Launcher, LauncherConfig, Notifier, NotifierError, OccupancyReading, Runtime,
};
use std::{
    path::PathBuf,
    sync::{Mutex, Once},
    time::{Duration, Instant},
};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write a detector script under the project root, returning its relative path.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        std::fs::write(self.dir.path().join(name), body).unwrap();
        PathBuf::from(name)
    }

    pub fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn launcher(&self) -> Launcher {
        self.launcher_with("/bin/sh")
    }

    pub fn broken_launcher(&self) -> Launcher {
        self.launcher_with("/nonexistent/venv/bin/python")
    }

    fn launcher_with(&self, interpreter: &str) -> Launcher {
        let config = LauncherConfig {
            project_root: self.dir.path().to_path_buf(),
            interpreter: Some(PathBuf::from(interpreter)),
            ..Default::default()
        };
        Launcher::new(config, Runtime::Local)
    }
}

pub fn config(chunk_size: usize) -> BridgeConfig {
    config_with_grace(chunk_size, 500)
}

pub fn config_with_grace(chunk_size: usize, grace_period_ms: u64) -> BridgeConfig {
    BridgeConfig {
        grace_period_ms,
        chunk_size,
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub readings: Mutex<Vec<OccupancyReading>>,
    pub reject: bool,
}

impl RecordingNotifier {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn counts(&self) -> Vec<(String, i64)> {
        self.readings
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.lot_id.clone(), r.free_slots))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, reading: &OccupancyReading) -> Result<(), NotifierError> {
        self.readings.lock().unwrap().push(reading.clone());
        if self.reject {
            Err(NotifierError::Status(503))
        } else {
            Ok(())
        }
    }
}

/// One MJPEG record with a `payload_len` byte body.
pub fn frame_record(payload_len: usize, seed: u8) -> Vec<u8> {
    let mut record = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {payload_len}\r\n\r\n"
    )
    .into_bytes();
    record.extend((0..payload_len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    record.extend_from_slice(b"\r\n");
    record
}

pub fn process_gone(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::kill(pid as libc::pid_t, 0) != 0 }
}

/// Poll until `pid` no longer exists or `limit` passes.
pub async fn wait_until_gone(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if process_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    process_gone(pid)
}

static CAPTURED: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

/// Route `log` records of this test binary into memory.
pub fn capture_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&CaptureLogger).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
}

/// Warnings logged so far for `lot_id`. Tests run concurrently, so each
/// one filters by its own lot.
pub fn warnings_for(lot_id: &str) -> Vec<String> {
    let prefix = format!("[{lot_id}]");
    CAPTURED
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, msg)| *level == log::Level::Warn && msg.starts_with(&prefix))
        .map(|(_, msg)| msg.clone())
        .collect()
}
