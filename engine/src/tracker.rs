use crate::api::EnrollmentApi;
use crate::config::PollingConfig;
use crate::db::Db;
use crate::error::{EnrollmentError, Result};
use crate::handoff::Handoff;
use crate::poller::{PollOutcome, Poller};
use crate::session::SessionStore;
use common::{JobId, JobState, JobStatusSnapshot};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug)]
pub enum TrackerEvent<'a> {
    Status(&'a JobStatusSnapshot),
    PollError(&'a str),
}

/// Follows a job that was submitted elsewhere, found through its id or the hand-off
/// channel, and mirrors its status into the shared session.
pub struct StatusTracker {
    api: Arc<dyn EnrollmentApi>,
    session: SessionStore,
    handoff: Handoff,
    db: Arc<Mutex<Db>>,
    polling: PollingConfig,
}

impl StatusTracker {
    pub fn new(
        api: Arc<dyn EnrollmentApi>,
        session: SessionStore,
        handoff: Handoff,
        db: Arc<Mutex<Db>>,
        polling: PollingConfig,
    ) -> Self {
        Self { api, session, handoff, db, polling }
    }

    /// Explicit id first, then the hand-off channel, then the shared session.
    pub fn resolve_job(&self, job_id: Option<JobId>) -> Result<JobId> {
        if let Some(job_id) = job_id {
            return Ok(job_id);
        }
        if let Some(pending) = self.handoff.pending()? {
            return Ok(pending.job_id);
        }
        self.session
            .snapshot()
            .active_job_id
            .ok_or_else(|| EnrollmentError::Validation("There is no enrollment to follow".to_string()))
    }

    /// Polls until the job completes or fails and returns the final snapshot.
    pub async fn track<F>(&self, job_id: Option<JobId>, mut on_event: F) -> Result<JobStatusSnapshot>
    where
        F: FnMut(TrackerEvent<'_>),
    {
        let job_id = self.resolve_job(job_id)?;
        log::info!("Following enrollment job {}", job_id);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = Poller::spawn(self.api.clone(), job_id.clone(), 0, self.polling.interval(), tx);
        let started = Instant::now();
        let mut consecutive_errors = 0u32;
        let mut polls = 0u32;

        while let Some(event) = rx.recv().await {
            polls += 1;
            match event.outcome {
                PollOutcome::Snapshot(snapshot) => {
                    consecutive_errors = 0;
                    on_event(TrackerEvent::Status(&snapshot));
                    match snapshot.status {
                        JobState::Completed => {
                            // The poller stops on its own after a final status.
                            poller.join().await;
                            self.session.update_status(&job_id, JobState::Completed)?;
                            self.handoff.clear_pending()?;
                            self.record_outcome(&snapshot, snapshot.result_message());
                            self.schedule_clear(job_id);
                            return Ok(snapshot);
                        }
                        JobState::Failed => {
                            poller.join().await;
                            // Cleared at once so a retry is not blocked.
                            self.session.clear_if(&job_id)?;
                            self.record_outcome(&snapshot, snapshot.failure_reason.as_deref());
                            return Ok(snapshot);
                        }
                        status => {
                            self.session.update_status(&job_id, status)?;
                        }
                    }
                }
                PollOutcome::Error(message) => {
                    consecutive_errors += 1;
                    log::warn!("Status check for job {} failed: {}", job_id, message);
                    on_event(TrackerEvent::PollError(&message));
                    let limit = self.polling.max_consecutive_errors;
                    if limit > 0 && consecutive_errors >= limit {
                        poller.cancel();
                        return Err(self.give_up(&job_id, EnrollmentError::Poll(message))?);
                    }
                }
            }

            if let Some(limit) = self.polling.max_duration() {
                if started.elapsed() >= limit {
                    poller.cancel();
                    return Err(self.give_up(&job_id, EnrollmentError::TimedOut { polls })?);
                }
            }
        }

        Err(EnrollmentError::Poll(format!("Status polling for job {} stopped unexpectedly", job_id)))
    }

    /// Tracking ended without a final status: release the session gate like a failed job.
    fn give_up(&self, job_id: &JobId, error: EnrollmentError) -> Result<EnrollmentError> {
        log::warn!("Stopped following enrollment job {}: {}", job_id, error);
        self.session.clear_if(job_id)?;
        let detail = error.to_string();
        if let Err(e) = self.db.lock().unwrap().finish_attempt(&job_id.0, JobState::Failed, Some(&detail)) {
            log::warn!("Could not record outcome of job {}: {}", job_id, e);
        }
        Ok(error)
    }

    fn record_outcome(&self, snapshot: &JobStatusSnapshot, detail: Option<&str>) {
        // Jobs submitted by another client have no history row; nothing to update then.
        if let Err(e) = self.db.lock().unwrap().finish_attempt(&snapshot.job_id.0, snapshot.status, detail) {
            log::warn!("Could not record outcome of job {}: {}", snapshot.job_id, e);
        }
    }

    fn schedule_clear(&self, job_id: JobId) {
        let session = self.session.clone();
        let grace = self.polling.completed_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = session.clear_if(&job_id) {
                log::error!("Could not clear completed enrollment {}: {}", job_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{handle, snapshot, ScriptedApi};
    use std::time::Duration;

    fn setup(api: ScriptedApi) -> (StatusTracker, SessionStore, Handoff, Arc<ScriptedApi>) {
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let polling = PollingConfig::default();
        let session = SessionStore::open(db.clone(), polling.completed_grace()).unwrap();
        let handoff = Handoff::new(db.clone());
        let api = Arc::new(api);
        let tracker = StatusTracker::new(api.clone(), session.clone(), handoff.clone(), db, polling);
        (tracker, session, handoff, api)
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_handoff_job_to_completion() {
        let (tracker, session, handoff, api) = setup(
            ScriptedApi::new()
                .on_status(Ok(snapshot("job-1", JobState::Active, 40)))
                .on_status(Ok(snapshot("job-1", JobState::Completed, 100))),
        );
        session.set_active(JobId::from("job-1"), vec!["A".into()]).unwrap();
        handoff.record_submission(&JobId::from("job-1"), &[]).unwrap();

        let mut seen = Vec::new();
        let last = tracker
            .track(None, |event| {
                if let TrackerEvent::Status(s) = event {
                    seen.push(s.status);
                }
            })
            .await
            .unwrap();

        assert_eq!(last.status, JobState::Completed);
        assert_eq!(seen, vec![JobState::Active, JobState::Completed]);
        assert!(handoff.pending().unwrap().is_none());
        assert_eq!(session.snapshot().active_status, Some(JobState::Completed));

        tokio::time::sleep(Duration::from_millis(30_001)).await;
        assert!(session.snapshot().is_empty());
        assert_eq!(api.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_clears_session_at_once() {
        let mut failed = snapshot("job-1", JobState::Failed, 0);
        failed.failure_reason = Some("Schedule conflict".to_string());
        let (tracker, session, handoff, _api) = setup(ScriptedApi::new().on_status(Ok(failed)));
        session.set_active(JobId::from("job-1"), vec!["A".into()]).unwrap();
        handoff.record_submission(&JobId::from("job-1"), &[]).unwrap();

        let last = tracker.track(Some(JobId::from("job-1")), |_| {}).await.unwrap();
        assert_eq!(last.failure_reason.as_deref(), Some("Schedule conflict"));
        assert!(session.snapshot().is_empty());
        // The hand-off keeps the job id so the status step can still be reopened.
        assert!(handoff.pending().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_poll_errors_release_session() {
        let (tracker, session, _handoff, api) = setup(ScriptedApi::new().on_status(Err("down")));
        let tracker = StatusTracker {
            polling: PollingConfig { max_consecutive_errors: 2, ..PollingConfig::default() },
            ..tracker
        };
        session.set_active(JobId::from("job-1"), vec!["A".into()]).unwrap();

        let mut errors = 0;
        let err = tracker
            .track(Some(JobId::from("job-1")), |event| {
                if let TrackerEvent::PollError(_) = event {
                    errors += 1;
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, EnrollmentError::Poll("down".to_string()));
        assert_eq!(errors, 2);
        assert_eq!(api.poll_count(), 2);
        assert!(!session.has_active());
        assert!(session.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_bound_releases_session_and_records_outcome() {
        let (tracker, session, _handoff, api) =
            setup(ScriptedApi::new().on_status(Ok(snapshot("job-1", JobState::Delayed, 0))));
        let tracker = StatusTracker {
            polling: PollingConfig { max_duration_secs: 10, ..PollingConfig::default() },
            ..tracker
        };
        tracker.db.lock().unwrap().record_attempt(&handle("job-1", JobState::Waiting), "req-1", &["A".to_string()]).unwrap();
        session.set_active(JobId::from("job-1"), vec!["A".into()]).unwrap();

        let err = tracker.track(Some(JobId::from("job-1")), |_| {}).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::TimedOut { .. }));
        assert!(session.snapshot().is_empty());

        let history = tracker.db.lock().unwrap().get_history(5).unwrap();
        assert_eq!(history[0].final_status.as_deref(), Some("failed"));

        let polls = api.poll_count();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.poll_count(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_follow() {
        let (tracker, _session, _handoff, api) = setup(ScriptedApi::new());
        let err = tracker.track(None, |_| {}).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::Validation(_)));
        assert_eq!(api.poll_count(), 0);
    }
}
