//! Buffered assertion streams.
//!
//! A stream is the pull-based alternative to `always` callbacks: the
//! driver pushes every outcome into a bounded channel and the host
//! drains it whenever convenient. The driver never blocks the scheduler;
//! when the buffer is full the outcome is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};

use crate::assertion::{AssertionId, AssertionSink};
use crate::engine::Engine;
use crate::error::{ExecutionError, OroError, OroResult};
use crate::event::EventId;
use crate::expr::Expr;
use crate::outcome::Outcome;

/// A buffered stream of outcomes from one `always` assertion.
///
/// Dropping the stream disconnects the channel; the driver retires
/// itself the next time it tries to push. Use
/// [`Engine::dismiss`] with [`AssertionStream::assertion_id`] to stop it
/// eagerly.
#[derive(Debug)]
pub struct AssertionStream {
    assertion_id: AssertionId,
    rx: Receiver<Outcome>,
    dropped: Arc<AtomicU64>,
}

impl AssertionStream {
    /// The assertion backing this stream.
    #[must_use]
    pub const fn assertion_id(&self) -> AssertionId {
        self.assertion_id
    }

    /// Outcomes dropped so far because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pop the next buffered outcome without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Receive the next outcome with a timeout.
    ///
    /// # Errors
    ///
    /// `Timeout` when nothing arrives in time, `Disconnected` when the
    /// driver is gone and the buffer is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> OroResult<Outcome> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => OroError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => OroError::Execution(ExecutionError::Disconnected {
                path: "assertion_stream".to_string(),
            }),
        })
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<Outcome> {
        let mut out = Vec::new();
        while let Some(outcome) = self.try_recv() {
            out.push(outcome);
        }
        out
    }
}

impl Engine {
    /// Registers an `always` assertion whose outcomes are buffered into
    /// a bounded channel instead of invoking callbacks. `capacity` is
    /// clamped to at least one.
    ///
    /// # Errors
    ///
    /// `UnknownEvent` if `sampler` was not issued by this engine.
    pub fn always_stream(
        &mut self,
        sampler: EventId,
        expr: Expr,
        capacity: usize,
    ) -> OroResult<AssertionStream> {
        let (tx, rx) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let assertion_id = self.register_assertion(
            sampler,
            expr,
            AssertionSink::Channel {
                tx,
                dropped: Arc::clone(&dropped),
            },
        )?;
        Ok(AssertionStream {
            assertion_id,
            rx,
            dropped,
        })
    }
}
