//! Detect-mode bridge
//!
//! Launches a detector without `--stream` and relays every integer it
//! prints to a [`Notifier`]. The relay runs on a [`JobPool`] task so the
//! request that triggered it returns as soon as the process is up.

use crate::{
    error::{LaunchError, ParseError},
    launcher::{Launcher, ProcessHandle},
    notifier::Notifier,
    pool::JobPool,
    reap::Exit,
    BridgeConfig, DetectionJob, Mode, OccupancyReading,
};
use log::{error, info, warn};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    task::JoinHandle,
};

/// Longest count line kept; anything longer is skipped up to its newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Outcome of one detect-mode run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectSummary {
    /// Lines that parsed as a count
    pub readings: usize,
    /// Lines that did not
    pub rejected: usize,
    /// Readings the notifier failed to deliver
    pub delivery_failures: usize,
}

/// Parse one line of detector output as a free-slot count.
pub fn parse_count(line: &str) -> Result<i64, ParseError> {
    let trimmed = line.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| ParseError::NotInteger(trimmed.to_string()))
}

/// Read one `\n`-terminated line into `line`, keeping at most `limit`
/// bytes of it. Returns the bytes consumed (0 at EOF) and whether the
/// line was cut short.
async fn read_line_capped<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> io::Result<(usize, bool)>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let mut truncated = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        let room = limit.saturating_sub(line.len());
        truncated |= used > room;
        line.extend_from_slice(&available[..used.min(room)]);
        reader.consume(used);
        consumed += used;
        if done {
            break;
        }
    }
    Ok((consumed, truncated))
}

/// Launch a detect-mode job and relay its counts in the background.
///
/// Launch failures are returned to the caller. Once the process is up the
/// relay is owned by `pool`; the returned handle may be dropped.
pub fn start_detection<N: Notifier>(
    launcher: &Launcher,
    pool: &JobPool,
    lot_id: impl Into<String>,
    script_path: impl Into<PathBuf>,
    notifier: Arc<N>,
    config: &BridgeConfig,
) -> Result<JoinHandle<DetectSummary>, LaunchError> {
    let job = DetectionJob::new(lot_id, script_path, Mode::Detect);
    let process = launcher.launch(&job)?;
    info!(
        "[{}] detection started (pid {:?})",
        job.lot_id,
        process.id()
    );

    let lot_id = job.lot_id.clone();
    Ok(pool.spawn(
        &lot_id,
        relay_counts(job, process, notifier, config.grace_period()),
    ))
}

/// Read `process` stdout to EOF, forwarding counts in order, then reap it.
pub async fn relay_counts<N: Notifier>(
    job: DetectionJob,
    process: ProcessHandle,
    notifier: Arc<N>,
    grace: Duration,
) -> DetectSummary {
    let (stdout, session) = process.split();
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    let mut summary = DetectSummary::default();

    loop {
        line.clear();
        match read_line_capped(&mut reader, &mut line, MAX_LINE_LEN).await {
            Ok((0, _)) => break,
            Ok((_, truncated)) => {
                let parsed = if truncated {
                    Err(ParseError::TooLong {
                        limit: MAX_LINE_LEN,
                    })
                } else {
                    parse_count(&String::from_utf8_lossy(&line))
                };
                match parsed {
                    Ok(free_slots) => {
                        summary.readings += 1;
                        let reading = OccupancyReading {
                            lot_id: job.lot_id.clone(),
                            free_slots,
                        };
                        if let Err(err) = notifier.notify(&reading).await {
                            summary.delivery_failures += 1;
                            warn!("[{}] {err}", job.lot_id);
                        }
                    }
                    Err(err) => {
                        summary.rejected += 1;
                        warn!("[{}] {err}", job.lot_id);
                    }
                }
            }
            Err(err) => {
                error!("[{}] reading detector output failed: {err}", job.lot_id);
                break;
            }
        }
    }

    session.close(grace, Exit::Natural).await;
    info!(
        "[{}] detection finished: {} readings, {} rejected lines",
        job.lot_id, summary.readings, summary.rejected
    );
    summary
}
