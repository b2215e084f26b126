use log::{debug, error, warn};
use std::time::Duration;
use tokio::{io::AsyncReadExt, process::ChildStderr, task::JoinHandle};

// only the head of a runaway stderr is kept; the rest is read and dropped
const MAX_RETAINED: usize = 64 * 1024;

/// Background reader for a detector's stderr.
pub(crate) struct Diagnostics {
    task: JoinHandle<Vec<u8>>,
}

impl Diagnostics {
    pub(crate) fn capture(stderr: ChildStderr) -> Self {
        let task = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut kept = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let room = MAX_RETAINED.saturating_sub(kept.len());
                        kept.extend_from_slice(&buf[..n.min(room)]);
                    }
                    Err(err) => {
                        debug!("stderr read ended: {err}");
                        break;
                    }
                }
            }
            kept
        });
        Self { task }
    }

    /// Wait (bounded) for stderr to close and log whatever it carried.
    pub(crate) async fn drain(self, lot_id: &str, limit: Duration) {
        let mut task = self.task;
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                let text = text.trim();
                if !text.is_empty() {
                    error!("[{lot_id}] detector stderr:\n{text}");
                }
            }
            Ok(Err(err)) => warn!("[{lot_id}] stderr collector failed: {err}"),
            Err(_) => {
                task.abort();
                warn!("[{lot_id}] stderr still open after {limit:?}, giving up on it");
            }
        }
    }
}
