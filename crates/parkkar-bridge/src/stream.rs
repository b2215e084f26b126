//! Stream-mode bridge
//!
//! [`FrameStream`] owns a detector started with `--stream` and yields its
//! stdout in fixed-size chunks, one read per poll. Nothing is read ahead,
//! so a slow HTTP client slows the detector down through the pipe.
//!
//! The sequence ends in one of three ways and each of them reaps the
//! process exactly once:
//!
//! * zero-byte read – the detector closed stdout,
//! * a read error – surfaced as the final item,
//! * the consumer stops – [`FrameStream::abort`], also run on drop.

use crate::{
    error::StreamError,
    frame,
    launcher::Launcher,
    reap::{Exit, Session},
    BridgeConfig, DetectionJob, FrameChunk, Mode,
};
use futures_core::Stream;
use log::{debug, error, info, warn};
use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    task::{ready, Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, ReadBuf};

type Cleanup = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of stream bytes; the detector's stdout outside of tests.
type Reader = Box<dyn AsyncRead + Unpin + Send>;

enum State {
    /// Launch failed; one informational frame is still owed.
    Diagnostic(FrameChunk),
    Streaming {
        reader: Reader,
        session: Session,
    },
    /// Reaping in progress, optionally followed by a final error item.
    Closing {
        cleanup: Cleanup,
        pending: Option<StreamError>,
    },
    Done,
}

/// Pull-driven MJPEG byte stream backed by a detector process.
pub struct FrameStream {
    lot_id: String,
    grace: Duration,
    buf: Vec<u8>,
    relayed: u64,
    state: State,
}

impl FrameStream {
    /// Launch a stream-mode detector for `lot_id`.
    ///
    /// Never fails: if the detector cannot be started the stream yields a
    /// single diagnostic frame and ends.
    pub fn open(
        launcher: &Launcher,
        lot_id: impl Into<String>,
        script_path: impl Into<PathBuf>,
        config: &BridgeConfig,
    ) -> Self {
        let job = DetectionJob::new(lot_id, script_path, Mode::Stream);
        let state = match launcher.launch(&job) {
            Ok(process) => {
                info!("[{}] stream started (pid {:?})", job.lot_id, process.id());
                let (stdout, session) = process.split();
                State::Streaming {
                    reader: Box::new(stdout),
                    session,
                }
            }
            Err(err) => {
                error!("[{}] stream launch failed: {err}", job.lot_id);
                let message = format!("Stream unavailable for parking lot {}: {err}", job.lot_id);
                State::Diagnostic(frame::diagnostic_frame(&message))
            }
        };

        Self::with_state(job.lot_id, state, config)
    }

    /// Stream `reader` in place of the detector's stdout. `session` is
    /// still reaped on every exit path.
    #[cfg(test)]
    pub(crate) fn from_session(
        lot_id: impl Into<String>,
        reader: Reader,
        session: Session,
        config: &BridgeConfig,
    ) -> Self {
        Self::with_state(lot_id.into(), State::Streaming { reader, session }, config)
    }

    fn with_state(lot_id: String, state: State, config: &BridgeConfig) -> Self {
        Self {
            lot_id,
            grace: config.grace_period(),
            buf: vec![0; config.chunk_size.max(1)],
            relayed: 0,
            state,
        }
    }

    pub fn lot_id(&self) -> &str {
        &self.lot_id
    }

    /// Detector pid while it is being streamed from.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Streaming { session, .. } => session.id(),
            _ => None,
        }
    }

    /// Bytes handed to the consumer so far.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    /// Stop the stream and terminate the detector.
    ///
    /// Sends the termination signal before returning and finishes reaping
    /// in the background. Safe to call repeatedly; later polls yield `None`.
    pub fn abort(&mut self) {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Streaming { reader, session } => {
                drop(reader);
                info!(
                    "[{}] stream consumer gone after {} bytes, terminating detector",
                    self.lot_id, self.relayed
                );
                session.abort(self.grace);
            }
            State::Closing { cleanup, .. } => {
                // cleanup already started; let it finish off this task
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(cleanup);
                }
            }
            State::Diagnostic(_) | State::Done => {}
        }
    }

    fn begin_close(&mut self, pending: Option<StreamError>) {
        if let State::Streaming { reader, session } =
            std::mem::replace(&mut self.state, State::Done)
        {
            drop(reader);
            let exit = if pending.is_some() {
                Exit::Terminate
            } else {
                Exit::Natural
            };
            self.state = State::Closing {
                cleanup: Box::pin(session.close(self.grace, exit)),
                pending,
            };
        }
    }
}

impl Stream for FrameStream {
    type Item = Result<FrameChunk, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Diagnostic(chunk) => {
                    let chunk = std::mem::take(chunk);
                    this.state = State::Done;
                    return Poll::Ready(Some(Ok(chunk)));
                }
                State::Streaming { reader, .. } => {
                    let mut read_buf = ReadBuf::new(&mut this.buf);
                    let polled = Pin::new(reader).poll_read(cx, &mut read_buf);
                    let filled = read_buf.filled().len();
                    match ready!(polled) {
                        Ok(()) if filled == 0 => {
                            debug!("[{}] detector closed stdout", this.lot_id);
                            this.begin_close(None);
                        }
                        Ok(()) => {
                            let chunk = FrameChunk::copy_from_slice(&this.buf[..filled]);
                            this.relayed += filled as u64;
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        Err(source) => {
                            warn!("[{}] detector read failed: {source}", this.lot_id);
                            let err = StreamError::Read {
                                lot_id: this.lot_id.clone(),
                                source,
                            };
                            this.begin_close(Some(err));
                        }
                    }
                }
                State::Closing { cleanup, .. } => {
                    ready!(cleanup.as_mut().poll(cx));
                    let pending = match std::mem::replace(&mut this.state, State::Done) {
                        State::Closing { pending, .. } => pending,
                        _ => None,
                    };
                    debug!("[{}] stream closed after {} bytes", this.lot_id, this.relayed);
                    return Poll::Ready(pending.map(Err));
                }
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.abort();
    }
}
