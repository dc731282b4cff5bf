//! Scripted backend used by the unit tests.

use crate::api::EnrollmentApi;
use crate::identity::RequestId;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::api::LoginResponse;
use common::{
    CourseOffer, EnrolledCourse, EnrollmentRequest, JobHandle, JobId, JobState,
    JobStatusSnapshot, JobTimestamps, StudentProfile,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub fn handle(job_id: &str, status: JobState) -> JobHandle {
    JobHandle {
        job_id: JobId::from(job_id),
        queue_name: "inscripciones".to_string(),
        initial_status: status,
        submitted_at: Utc::now(),
    }
}

pub fn snapshot(job_id: &str, status: JobState, progress: u8) -> JobStatusSnapshot {
    JobStatusSnapshot {
        job_id: JobId::from(job_id),
        status,
        progress,
        result: None,
        failure_reason: None,
        attempts_made: 0,
        attempts_allowed: 3,
        timestamps: JobTimestamps {
            created: Some(Utc::now()),
            processed_on: None,
            finished_on: None,
        },
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    submissions: Mutex<VecDeque<Result<JobHandle, String>>>,
    statuses: Mutex<VecDeque<Result<JobStatusSnapshot, String>>>,
    pub submitted: Mutex<Vec<(EnrollmentRequest, RequestId)>>,
    pub poll_times: Mutex<Vec<Instant>>,
    submit_gate: Option<Arc<Notify>>,
    poll_latency: Option<Duration>,
    in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submissions block until the returned notify is signalled.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = Some(latency);
        self
    }

    pub fn on_submit(self, result: Result<JobHandle, &str>) -> Self {
        self.submissions
            .lock()
            .unwrap()
            .push_back(result.map_err(str::to_string));
        self
    }

    /// Status replies in order; the last one repeats once the script runs out.
    pub fn on_status(self, result: Result<JobStatusSnapshot, &str>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back(result.map_err(str::to_string));
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_times.lock().unwrap().len()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnrollmentApi for ScriptedApi {
    async fn login(&self, registro: &str, _password: &str) -> Result<LoginResponse> {
        Ok(LoginResponse {
            access_token: "token".to_string(),
            profile: StudentProfile {
                id: "u1".to_string(),
                nombre: "Ana".to_string(),
                email: String::new(),
                apellido_paterno: String::new(),
                apellido_materno: String::new(),
                telefono: String::new(),
                ci: String::new(),
                registro: registro.to_string(),
                ppac: 0.0,
                offer_masters: Vec::new(),
            },
        })
    }

    async fn fetch_offers(&self, _master_id: &str) -> Result<Vec<CourseOffer>> {
        Ok(Vec::new())
    }

    async fn enrolled_courses(&self, _student_id: &str) -> Result<Vec<EnrolledCourse>> {
        Ok(Vec::new())
    }

    async fn submit_enrollment(&self, request: &EnrollmentRequest, request_id: &RequestId) -> Result<JobHandle> {
        self.submitted
            .lock()
            .unwrap()
            .push((request.clone(), request_id.clone()));
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        let next = self.submissions.lock().unwrap().pop_front();
        match next {
            Some(Ok(handle)) => Ok(handle),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted submission reply")),
        }
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot> {
        self.poll_times.lock().unwrap().push(Instant::now());
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(latency) = self.poll_latency {
            tokio::time::sleep(latency).await;
        }

        let next = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match next {
            Some(Ok(mut snapshot)) => {
                snapshot.job_id = job_id.clone();
                Ok(snapshot)
            }
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted status reply")),
        }
    }
}
