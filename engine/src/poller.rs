use crate::api::EnrollmentApi;
use common::{JobId, JobStatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Attempt counter value a poll belongs to; the consumer drops events whose
/// generation is no longer current.
pub type Generation = u64;

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Snapshot(JobStatusSnapshot),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct PollEvent {
    pub generation: Generation,
    pub job_id: JobId,
    pub seq: u32,
    pub outcome: PollOutcome,
}

pub struct PollerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops scheduling further polls. A request already on the wire finishes,
    /// but its reply is not forwarded.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

fn cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

pub struct Poller;

impl Poller {
    /// Polls `job_id` right away, then again `interval` after each reply, one request
    /// at a time, until a terminal status, cancellation, or the receiver going away.
    pub fn spawn(
        api: Arc<dyn EnrollmentApi>,
        job_id: JobId,
        generation: Generation,
        interval: Duration,
        events: mpsc::UnboundedSender<PollEvent>,
    ) -> PollerHandle {
        let (cancel, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut seq = 0u32;
            loop {
                if cancelled(&cancel_rx) {
                    break;
                }
                seq += 1;
                let result = api.job_status(&job_id).await;

                if cancelled(&cancel_rx) {
                    log::debug!("Dropping status reply #{} for job {} after cancellation", seq, job_id);
                    break;
                }

                let (outcome, terminal) = match result {
                    Ok(snapshot) => {
                        let terminal = snapshot.status.is_terminal();
                        (PollOutcome::Snapshot(snapshot), terminal)
                    }
                    Err(e) => (PollOutcome::Error(e.to_string()), false),
                };

                let event = PollEvent {
                    generation,
                    job_id: job_id.clone(),
                    seq,
                    outcome,
                };
                if events.send(event).is_err() || terminal {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel_rx.changed() => break,
                }
            }
            log::debug!("Poller for job {} stopped after {} polls", job_id, seq);
        });

        PollerHandle { cancel, task }
    }
}
