//! Single-flight access gate serializing all upstream fetch sequences.
//!
//! The upstream quota is a shared, account-wide resource, so at most one
//! fetch sequence may be in flight across the whole process. Every release
//! starts a mandatory cooldown window; queued callers are admitted strictly
//! FIFO, one per cooldown expiry. New arrivals never reset or shorten a
//! running cooldown.
//!
//! Gate state lives behind a std `Mutex` whose critical sections never span
//! an await; the only suspension points are the cooldown sleep and the
//! holder's own upstream I/O. Scheduling uses tokio's monotonic clock rather
//! than wall-clock delays, so sustained load cannot drift the inter-sequence
//! spacing below the cooldown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::Ticker;

/// Mandatory pause between one sequence's release and the next admission.
pub const COOLDOWN: Duration = Duration::from_secs(14);

/// Snapshot of gate state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub busy: bool,
    pub current_ticker: Option<String>,
    pub queue_length: usize,
    pub queued_tickers: Vec<String>,
    pub cooldown_remaining_ms: u64,
}

struct Waiter {
    ticker: Ticker,
    admit: oneshot::Sender<()>,
    enqueued_at: Instant,
}

struct GateInner {
    busy: bool,
    current: Option<Ticker>,
    cooldown_until: Option<Instant>,
    queue: VecDeque<Waiter>,
}

/// Single-flight + cooldown + FIFO-queue scheduling primitive.
///
/// Cloning is cheap and shares the same gate.
#[derive(Clone)]
pub struct AccessGate {
    inner: Arc<Mutex<GateInner>>,
    cooldown: Duration,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessGate {
    pub fn new() -> Self {
        Self::with_cooldown(COOLDOWN)
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateInner {
                busy: false,
                current: None,
                cooldown_until: None,
                queue: VecDeque::new(),
            })),
            cooldown,
        }
    }

    /// Acquire the gate for `ticker`, suspending until admitted.
    ///
    /// Admission is immediate when the gate is idle, no cooldown remains, and
    /// nobody is queued ahead; otherwise the caller joins the FIFO queue and
    /// is resumed by the cooldown drain. Queued callers cannot be withdrawn;
    /// the same ticker may queue more than once.
    ///
    /// The returned permit releases the gate exactly once when dropped, so an
    /// erroring or panicking holder can never leave the gate busy.
    pub async fn acquire(&self, ticker: Ticker) -> GatePermit {
        let admission = {
            let mut inner = self.inner.lock().expect("gate lock is not poisoned");
            let cooling = inner
                .cooldown_until
                .map(|until| Instant::now() < until)
                .unwrap_or(false);

            if !inner.busy && !cooling && inner.queue.is_empty() {
                inner.busy = true;
                inner.current = Some(ticker.clone());
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.queue.push_back(Waiter {
                    ticker: ticker.clone(),
                    admit: tx,
                    enqueued_at: Instant::now(),
                });
                debug!(%ticker, queue_length = inner.queue.len(), "gate busy, request queued");
                Some(rx)
            }
        };

        if let Some(rx) = admission {
            // The drain either fires the sender or keeps the waiter queued;
            // a dropped sender can only mean the gate itself went away.
            let _ = rx.await;
        }

        GatePermit { gate: self.clone() }
    }

    pub fn status(&self) -> GateStatus {
        let inner = self.inner.lock().expect("gate lock is not poisoned");
        let now = Instant::now();
        let cooldown_remaining_ms = inner
            .cooldown_until
            .map(|until| until.saturating_duration_since(now).as_millis() as u64)
            .unwrap_or(0);

        GateStatus {
            busy: inner.busy,
            current_ticker: inner.current.as_ref().map(|t| t.as_str().to_owned()),
            queue_length: inner.queue.len(),
            queued_tickers: inner
                .queue
                .iter()
                .map(|w| w.ticker.as_str().to_owned())
                .collect(),
            cooldown_remaining_ms,
        }
    }

    /// Free the gate and start the cooldown. Called from permit drop only.
    fn release(&self) {
        let deadline = {
            let mut inner = self.inner.lock().expect("gate lock is not poisoned");
            inner.busy = false;
            inner.current = None;
            let deadline = Instant::now() + self.cooldown;
            inner.cooldown_until = Some(deadline);
            deadline
        };

        let gate = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            gate.drain(deadline);
        });
    }

    /// Cooldown expiry: admit the queue head, or return the gate to idle.
    fn drain(&self, deadline: Instant) {
        let mut inner = self.inner.lock().expect("gate lock is not poisoned");

        // A newer release supersedes this drain's deadline.
        if inner.busy || inner.cooldown_until != Some(deadline) {
            return;
        }
        inner.cooldown_until = None;

        while let Some(waiter) = inner.queue.pop_front() {
            let ticker = waiter.ticker;
            inner.busy = true;
            inner.current = Some(ticker.clone());
            if waiter.admit.send(()).is_ok() {
                debug!(
                    %ticker,
                    waited_ms = waiter.enqueued_at.elapsed().as_millis() as u64,
                    "gate admitted queued request"
                );
                return;
            }
            // Receiver dropped before admission; skip it without burning a
            // cooldown, since no sequence ran.
            inner.busy = false;
            inner.current = None;
        }
    }
}

/// Held while a fetch sequence owns the gate. Dropping it releases the gate
/// and starts the cooldown.
pub struct GatePermit {
    gate: AccessGate,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
