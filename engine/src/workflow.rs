//! Enrollment workflow controller.
//!
//! One attempt at a time: validate the selection, submit it once, record the job in the
//! shared [`SessionStore`], then follow it with a [`Poller`] until it completes or fails.
//! Every attempt gets a new generation number. Poll replies, timers and submission
//! results only touch state while their generation is still current, so anything
//! arriving after `cancel()`, `cleanup()` or a newer attempt is dropped.

use crate::api::EnrollmentApi;
use crate::config::PollingConfig;
use crate::db::Db;
use crate::error::{EnrollmentError, Result};
use crate::identity::RequestId;
use crate::metrics::{Counter, WorkflowMetrics};
use crate::poller::{Generation, PollEvent, PollOutcome, Poller, PollerHandle};
use crate::session::SessionStore;
use common::{EnrollmentRequest, JobHandle, JobId, JobState, JobStatusSnapshot};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    Tracking,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Idle | Phase::Completed | Phase::Failed)
    }
}

/// What a view needs to render the current attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowView {
    pub phase: Phase,
    pub is_processing: bool,
    pub request_id: Option<RequestId>,
    pub current_job_id: Option<JobId>,
    pub status: Option<JobState>,
    pub job_status: Option<JobStatusSnapshot>,
    pub sections: Vec<String>,
    pub error: Option<EnrollmentError>,
    /// Last failed status check; cleared by the next good reply.
    pub poll_error: Option<String>,
    pub success: bool,
}

#[derive(Default)]
struct AttemptState {
    generation: Generation,
    outstanding: Option<RequestId>,
    poller: Option<PollerHandle>,
}

struct Core {
    session: SessionStore,
    db: Arc<Mutex<Db>>,
    metrics: Arc<WorkflowMetrics>,
    polling: PollingConfig,
    attempt: Mutex<AttemptState>,
    view: watch::Sender<WorkflowView>,
}

impl Core {
    /// Runs `f` under the attempt lock if `generation` is still current.
    fn with_current<F>(&self, generation: Generation, f: F) -> bool
    where
        F: FnOnce(&mut AttemptState, &mut WorkflowView),
    {
        let mut attempt = self.attempt.lock().unwrap();
        if attempt.generation != generation {
            return false;
        }
        self.view.send_modify(|view| f(&mut *attempt, view));
        true
    }

    fn record_outcome(&self, job_id: &JobId, status: JobState, detail: Option<&str>) {
        if let Err(e) = self.db.lock().unwrap().finish_attempt(&job_id.0, status, detail) {
            log::warn!("Could not record outcome of job {}: {}", job_id, e);
        }
    }

    fn complete(self: &Arc<Self>, generation: Generation, snapshot: JobStatusSnapshot) {
        let job_id = snapshot.job_id.clone();
        let applied = self.with_current(generation, |attempt, view| {
            if let Some(poller) = attempt.poller.take() {
                poller.cancel();
            }
            attempt.outstanding = None;
            if let Err(e) = self.session.update_status(&job_id, JobState::Completed) {
                log::error!("Could not persist completion of job {}: {}", job_id, e);
            }
            view.phase = Phase::Completed;
            view.is_processing = false;
            view.success = true;
            view.status = Some(JobState::Completed);
            view.poll_error = None;
            view.error = None;
            view.job_status = Some(snapshot.clone());
        });
        if !applied {
            return;
        }

        log::info!("Enrollment job {} completed", job_id);
        self.metrics.incr(Counter::Completed);
        self.record_outcome(&job_id, JobState::Completed, snapshot.result_message());

        // Local view resets quickly; the shared session keeps `completed` for the grace period.
        let core = self.clone();
        let view_clear = self.polling.view_clear();
        tokio::spawn(async move {
            tokio::time::sleep(view_clear).await;
            core.with_current(generation, |_, view| *view = WorkflowView::default());
        });

        let session = self.session.clone();
        let grace = self.polling.completed_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match session.clear_if(&job_id) {
                Ok(true) => log::info!("Cleared completed enrollment {} after grace period", job_id),
                Ok(false) => {}
                Err(e) => log::error!("Could not clear completed enrollment {}: {}", job_id, e),
            }
        });
    }

    fn fail(&self, generation: Generation, job_id: &JobId, error: EnrollmentError, snapshot: Option<JobStatusSnapshot>) {
        let applied = self.with_current(generation, |attempt, view| {
            if let Some(poller) = attempt.poller.take() {
                poller.cancel();
            }
            attempt.outstanding = None;
            // Cleared right away so the dashboard gate lets the student retry.
            if let Err(e) = self.session.clear_if(job_id) {
                log::error!("Could not clear failed enrollment {}: {}", job_id, e);
            }
            view.phase = Phase::Failed;
            view.is_processing = false;
            view.success = false;
            view.status = Some(JobState::Failed);
            view.error = Some(error.clone());
            if snapshot.is_some() {
                view.job_status = snapshot;
            }
        });
        if applied {
            log::warn!("Enrollment job {} failed: {}", job_id, error);
            self.metrics.incr(Counter::Failed);
            self.record_outcome(job_id, JobState::Failed, Some(&error.to_string()));
        }
    }

    /// Applies poll events for one attempt until the poller stops or the attempt is superseded.
    async fn drive(self: Arc<Self>, generation: Generation, job_id: JobId, mut events: mpsc::UnboundedReceiver<PollEvent>) {
        let started = Instant::now();
        let mut consecutive_errors = 0u32;
        let mut polls = 0u32;

        while let Some(event) = events.recv().await {
            if event.generation != generation || event.job_id != job_id {
                continue;
            }
            polls += 1;

            match event.outcome {
                PollOutcome::Snapshot(snapshot) => {
                    consecutive_errors = 0;
                    self.metrics.record_poll(&job_id.0);
                    match snapshot.status {
                        JobState::Completed => {
                            self.complete(generation, snapshot);
                            return;
                        }
                        JobState::Failed => {
                            let error = EnrollmentError::JobFailed {
                                reason: snapshot
                                    .failure_reason
                                    .clone()
                                    .unwrap_or_else(|| "Unknown processing error".to_string()),
                                attempts_made: snapshot.attempts_made,
                                attempts_allowed: snapshot.attempts_allowed,
                            };
                            self.fail(generation, &job_id, error, Some(snapshot));
                            return;
                        }
                        status => {
                            let applied = self.with_current(generation, |_, view| {
                                if let Err(e) = self.session.update_status(&job_id, status) {
                                    log::error!("Could not persist status of job {}: {}", job_id, e);
                                }
                                view.status = Some(status);
                                view.job_status = Some(snapshot);
                                view.poll_error = None;
                            });
                            if !applied {
                                log::debug!("Discarding status of job {} from a superseded attempt", job_id);
                                self.metrics.incr(Counter::DiscardedReplies);
                                return;
                            }
                            log::info!("Enrollment job {} is {} (poll #{})", job_id, status, event.seq);
                        }
                    }
                }
                PollOutcome::Error(message) => {
                    consecutive_errors += 1;
                    self.metrics.incr(Counter::PollErrors);
                    log::warn!("Status check #{} for job {} failed: {}", event.seq, job_id, message);

                    let limit = self.polling.max_consecutive_errors;
                    if limit > 0 && consecutive_errors >= limit {
                        let error = EnrollmentError::Poll(format!(
                            "{} consecutive status checks failed, last: {}",
                            consecutive_errors, message
                        ));
                        self.fail(generation, &job_id, error, None);
                        return;
                    }

                    let applied = self.with_current(generation, |_, view| {
                        view.poll_error = Some(message);
                    });
                    if !applied {
                        self.metrics.incr(Counter::DiscardedReplies);
                        return;
                    }
                }
            }

            if let Some(limit) = self.polling.max_duration() {
                if started.elapsed() >= limit {
                    self.fail(generation, &job_id, EnrollmentError::TimedOut { polls }, None);
                    return;
                }
            }
        }
    }
}

pub struct EnrollmentWorkflow {
    api: Arc<dyn EnrollmentApi>,
    student_id: Option<String>,
    core: Arc<Core>,
}

impl EnrollmentWorkflow {
    pub fn new(
        api: Arc<dyn EnrollmentApi>,
        session: SessionStore,
        db: Arc<Mutex<Db>>,
        polling: PollingConfig,
        metrics: Arc<WorkflowMetrics>,
    ) -> Self {
        let (view, _) = watch::channel(WorkflowView::default());
        Self {
            api,
            student_id: None,
            core: Arc::new(Core {
                session,
                db,
                metrics,
                polling,
                attempt: Mutex::new(AttemptState::default()),
                view,
            }),
        }
    }

    /// Student on whose behalf enrollments are submitted; None when logged out.
    pub fn with_student(mut self, student_id: Option<String>) -> Self {
        self.student_id = student_id;
        self
    }

    pub fn view(&self) -> WorkflowView {
        self.core.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowView> {
        self.core.view.subscribe()
    }

    pub fn session(&self) -> &SessionStore {
        &self.core.session
    }

    fn reject(&self, error: EnrollmentError) -> EnrollmentError {
        self.core.view.send_modify(|view| view.error = Some(error.clone()));
        error
    }

    /// Submits `section_ids` and starts tracking the created job.
    ///
    /// Returns once the job exists; completion is observed through [`Self::subscribe`]
    /// or [`Self::wait_settled`].
    pub async fn start_enrollment(&self, section_ids: Vec<String>) -> Result<JobHandle> {
        let student_id = match &self.student_id {
            Some(id) => id.clone(),
            None => return Err(self.reject(EnrollmentError::not_authenticated())),
        };
        if section_ids.is_empty() {
            return Err(self.reject(EnrollmentError::Validation(
                "Select at least one section".to_string(),
            )));
        }
        let request = EnrollmentRequest::new(student_id, section_ids)
            .map_err(|e| self.reject(EnrollmentError::Validation(e.to_string())))?;

        let session = self.core.session.snapshot();
        if session.has_active() {
            if let Some(job_id) = session.active_job_id {
                return Err(self.reject(EnrollmentError::EnrollmentInProgress { job_id }));
            }
        }

        let polling = &self.core.polling;
        let request_id = RequestId::generate(
            polling.idempotency,
            request.student_id(),
            request.section_ids(),
            polling.bucket_secs,
        );

        let generation = {
            let mut attempt = self.core.attempt.lock().unwrap();
            if attempt.outstanding.is_some() {
                log::info!("Enrollment already in progress, ignoring duplicate request");
                return Err(EnrollmentError::DuplicateSubmission);
            }
            attempt.outstanding = Some(request_id.clone());
            attempt.generation += 1;
            if let Some(poller) = attempt.poller.take() {
                poller.cancel();
            }
            self.core.view.send_replace(WorkflowView {
                phase: Phase::Submitting,
                is_processing: true,
                request_id: Some(request_id.clone()),
                sections: request.section_ids().to_vec(),
                ..WorkflowView::default()
            });
            attempt.generation
        };

        log::info!(
            "Submitting enrollment for {} ({} sections, request {})",
            request.student_id(),
            request.section_ids().len(),
            request_id
        );
        self.core.metrics.incr(Counter::Submissions);

        let handle = match self.api.submit_enrollment(&request, &request_id).await {
            Ok(handle) => handle,
            Err(e) => {
                self.core.metrics.incr(Counter::SubmissionFailures);
                let error = EnrollmentError::Submission(e.to_string());
                log::warn!("{}", error);
                self.core.with_current(generation, |attempt, view| {
                    attempt.outstanding = None;
                    view.phase = Phase::Idle;
                    view.is_processing = false;
                    view.request_id = None;
                    view.error = Some(error.clone());
                });
                return Err(error);
            }
        };

        let sections = request.section_ids().to_vec();
        let (tx, rx) = mpsc::unbounded_channel();
        let started = self.core.with_current(generation, |attempt, view| {
            if let Err(e) = self.core.session.set_active(handle.job_id.clone(), sections.clone()) {
                log::error!("Could not persist enrollment job {}: {}", handle.job_id, e);
            }
            view.phase = Phase::Tracking;
            view.current_job_id = Some(handle.job_id.clone());
            view.status = Some(handle.initial_status);
            attempt.poller = Some(Poller::spawn(
                self.api.clone(),
                handle.job_id.clone(),
                generation,
                self.core.polling.interval(),
                tx,
            ));
        });

        if !started {
            log::info!("Enrollment job {} created after the attempt was abandoned; not tracking it", handle.job_id);
            return Ok(handle);
        }

        log::info!("Enrollment job {} queued on {:?}", handle.job_id, handle.queue_name);
        if let Err(e) = self.core.db.lock().unwrap().record_attempt(&handle, request_id.as_str(), &sections) {
            log::warn!("Could not record enrollment attempt {}: {}", handle.job_id, e);
        }
        tokio::spawn(self.core.clone().drive(generation, handle.job_id.clone(), rx));

        Ok(handle)
    }

    /// Waits until the current attempt completes, fails or is abandoned.
    pub async fn wait_settled(&self) -> WorkflowView {
        let mut rx = self.subscribe();
        loop {
            {
                let view = rx.borrow_and_update();
                if view.phase.is_settled() {
                    return view.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Client-side abandonment: stops polling and forgets the attempt locally and in the
    /// shared session. The server-side job is left alone.
    pub fn cancel(&self) {
        let mut attempt = self.core.attempt.lock().unwrap();
        attempt.generation += 1;
        attempt.outstanding = None;
        if let Some(poller) = attempt.poller.take() {
            poller.cancel();
        }
        let job_id = self.core.view.borrow().current_job_id.clone();
        if let Some(job_id) = job_id {
            if let Err(e) = self.core.session.clear_if(&job_id) {
                log::error!("Could not clear enrollment {}: {}", job_id, e);
            }
            log::info!("Stopped tracking enrollment job {}", job_id);
        }
        self.core.view.send_replace(WorkflowView::default());
    }

    /// Stops polling on teardown but keeps the shared session, so other views can
    /// still show the in-flight job.
    pub fn cleanup(&self) {
        let mut attempt = self.core.attempt.lock().unwrap();
        attempt.generation += 1;
        attempt.outstanding = None;
        if let Some(poller) = attempt.poller.take() {
            poller.cancel();
        }
    }
}

impl Drop for EnrollmentWorkflow {
    fn drop(&mut self) {
        self.cleanup();
    }
}
