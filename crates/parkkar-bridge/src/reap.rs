//! Termination and reaping of detector processes.
//!
//! Every detector goes through [`Session::close`] exactly once, either
//! awaited by the bridge that owns it or, when the owner is dropped, on a
//! detached task started by [`Session::abort`].

use crate::diagnostics::Diagnostics;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::process::Child;

// after EOF a detector normally exits within this window on its own
const NATURAL_EXIT_WINDOW: Duration = Duration::from_millis(100);

/// How the owner expects the process to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    /// Output ended on its own; allow a short window before SIGTERM.
    Natural,
    /// Send SIGTERM straight away.
    Terminate,
}

/// The parts of a [`crate::ProcessHandle`] that outlive its stdout.
pub(crate) struct Session {
    pub(crate) lot_id: String,
    pub(crate) child: Child,
    pub(crate) diagnostics: Diagnostics,
}

impl Session {
    pub(crate) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Reap the process and log its diagnostics. Never fails.
    pub(crate) async fn close(mut self, grace: Duration, exit: Exit) {
        reap(&self.lot_id, &mut self.child, grace, exit).await;
        self.diagnostics.drain(&self.lot_id, grace).await;
    }

    /// Start termination without waiting for it.
    ///
    /// The signal is sent before returning; waiting and killing continue on
    /// the current tokio runtime. Without a runtime the child is killed
    /// outright and left to tokio's orphan reaper.
    pub(crate) fn abort(mut self, grace: Duration) {
        signal_terminate(&self.lot_id, &mut self.child);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.close(grace, Exit::Terminate));
            }
            Err(_) => {
                if let Err(err) = self.child.start_kill() {
                    warn!("[{}] kill without runtime failed: {err}", self.lot_id);
                }
            }
        }
    }
}

async fn reap(lot_id: &str, child: &mut Child, grace: Duration, exit: Exit) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("[{lot_id}] detector already exited with {status}");
            return;
        }
        Ok(None) => {}
        Err(err) => warn!("[{lot_id}] could not poll detector status: {err}"),
    }

    if exit == Exit::Natural {
        match tokio::time::timeout(NATURAL_EXIT_WINDOW.min(grace), child.wait()).await {
            Ok(Ok(status)) => {
                debug!("[{lot_id}] detector exited with {status}");
                return;
            }
            Ok(Err(err)) => warn!("[{lot_id}] waiting for detector failed: {err}"),
            Err(_) => debug!("[{lot_id}] detector outlived its output, terminating it"),
        }
    }

    signal_terminate(lot_id, child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!("[{lot_id}] detector exited with {status}"),
        Ok(Err(err)) => warn!("[{lot_id}] waiting for detector failed: {err}"),
        Err(_) => {
            info!("[{lot_id}] detector still running after {grace:?}, killing it");
            if let Err(err) = child.kill().await {
                warn!("[{lot_id}] kill failed: {err}");
            }
        }
    }
}

#[cfg(unix)]
fn signal_terminate(lot_id: &str, child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: the pid belongs to our child and has not been reaped yet,
    // tokio only clears `id()` after a successful wait.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!(
            "[{lot_id}] SIGTERM to {pid} failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn signal_terminate(lot_id: &str, child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!("[{lot_id}] terminate failed: {err}");
    }
}
