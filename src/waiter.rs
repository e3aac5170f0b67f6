//! Bounded polling of a job's status until it reaches a terminal state.
//!
//! Each cycle checks the wait budget first, then queries status once, then
//! either terminates or sleeps a fixed interval. The measured processing time
//! includes at most one poll interval of delay after the job actually finished.

use crate::cancel::CancelToken;
use crate::client::{BatchId, Counts, JobStatus, StatusSnapshot, Transport, TransportError};
use crate::clock::Clock;
use crate::config::Polling;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Waiting,
    Succeeded,
    Failed,
    TimedOut,
}

impl WaitState {
    /// State after observing `status` within the budget.
    pub fn after(status: &JobStatus) -> Self {
        match status {
            JobStatus::Completed => Self::Succeeded,
            JobStatus::Failed => Self::Failed,
            _ => Self::Waiting,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

/// Data captured at the instant `completed` was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub batch_id: BatchId,
    pub processing_time: Duration,
    pub total_transactions: Option<u64>,
    pub counts: Counts,
    pub polls: u32,
}

#[derive(Debug)]
pub enum WaitOutcome {
    Succeeded(Completion),
    /// The service reported `failed`; carries the final snapshot.
    Failed(StatusSnapshot),
    TimedOut { elapsed: Duration, polls: u32 },
    /// A status query failed at the transport level; the wait cannot continue.
    Unreachable(TransportError),
    Cancelled,
}

impl WaitOutcome {
    pub fn state(&self) -> WaitState {
        match self {
            Self::Succeeded(_) => WaitState::Succeeded,
            Self::Failed(_) => WaitState::Failed,
            Self::TimedOut { .. } | Self::Unreachable(_) | Self::Cancelled => WaitState::TimedOut,
        }
    }
}

pub struct CompletionWaiter<'a, T: ?Sized, C: ?Sized> {
    transport: &'a T,
    clock: &'a C,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<'a, T: Transport + ?Sized, C: Clock + ?Sized> CompletionWaiter<'a, T, C> {
    pub fn new(transport: &'a T, clock: &'a C, polling: &Polling) -> Self {
        Self {
            transport,
            clock,
            poll_interval: polling.poll_interval(),
            max_wait: polling.max_wait(),
        }
    }

    pub fn wait(&self, batch_id: &BatchId, cancel: &CancelToken) -> WaitOutcome {
        info!("waiting for batch {batch_id} to complete");
        let started = self.clock.now();
        let mut last_seen: Option<(JobStatus, u64)> = None;
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed > self.max_wait {
                warn!(
                    "batch {batch_id} not finished after {}s; giving up",
                    self.max_wait.as_secs()
                );
                return WaitOutcome::TimedOut { elapsed, polls };
            }

            let snapshot = match self.transport.batch_status(batch_id) {
                Ok(s) => s,
                Err(err) => {
                    warn!("status query for batch {batch_id} failed: {err}");
                    return WaitOutcome::Unreachable(err);
                }
            };
            polls += 1;

            let observed = (snapshot.status.clone(), snapshot.processed_count);
            if last_seen.as_ref() != Some(&observed) {
                log_progress(&snapshot);
                last_seen = Some(observed);
            }

            match WaitState::after(&snapshot.status) {
                WaitState::Succeeded => {
                    let processing_time = self.clock.now().saturating_duration_since(started);
                    let counts = snapshot.counts.unwrap_or_default();
                    info!(
                        "batch {batch_id} completed in {:.2}s: total={} auto_matched={} needs_review={} unmatched={}",
                        processing_time.as_secs_f64(),
                        display_total(snapshot.total_transactions),
                        counts.auto_matched,
                        counts.needs_review,
                        counts.unmatched
                    );
                    return WaitOutcome::Succeeded(Completion {
                        batch_id: batch_id.clone(),
                        processing_time,
                        total_transactions: snapshot.total_transactions,
                        counts,
                        polls,
                    });
                }
                WaitState::Failed => {
                    warn!("batch {batch_id} failed on the service");
                    return WaitOutcome::Failed(snapshot);
                }
                WaitState::Waiting | WaitState::TimedOut => {}
            }

            if self.clock.sleep(self.poll_interval, cancel) {
                return WaitOutcome::Cancelled;
            }
        }
    }
}

fn log_progress(snapshot: &StatusSnapshot) {
    match (snapshot.total_transactions, snapshot.progress_percent) {
        (Some(total), Some(pct)) => info!(
            "status={} processed={}/{} ({pct:.1}%)",
            snapshot.status, snapshot.processed_count, total
        ),
        (Some(total), None) => info!(
            "status={} processed={}/{}",
            snapshot.status, snapshot.processed_count, total
        ),
        (None, _) => info!(
            "status={} processed={}",
            snapshot.status, snapshot.processed_count
        ),
    }
}

fn display_total(total: Option<u64>) -> String {
    total.map_or_else(|| "unknown".to_string(), |t| t.to_string())
}
