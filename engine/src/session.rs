//! Process-wide store of the in-flight enrollment.
//!
//! Every write replaces the whole [`EnrollmentSession`] record, persists it under
//! [`common::SESSION_KEY`] and then publishes it to subscribers, all while holding
//! the database lock so readers never observe a half-applied update.

use crate::db::Db;
use crate::error::Result;
use chrono::Utc;
use common::{EnrollmentSession, JobId, JobState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Mutex<Db>>,
    tx: Arc<watch::Sender<EnrollmentSession>>,
}

impl SessionStore {
    /// Loads the persisted record. A completed record whose grace period already
    /// ran out (e.g. while no process was running) is cleared here.
    pub fn open(db: Arc<Mutex<Db>>, completed_grace: Duration) -> Result<Self> {
        let initial = {
            let guard = db.lock().unwrap();
            Self::load(&guard, completed_grace)?
        };
        let (tx, _) = watch::channel(initial);
        Ok(Self { db, tx: Arc::new(tx) })
    }

    fn load(db: &Db, completed_grace: Duration) -> Result<EnrollmentSession> {
        let stored = match db.get(common::SESSION_KEY)? {
            Some(stored) => stored,
            None => return Ok(EnrollmentSession::default()),
        };

        let mut session: EnrollmentSession = match serde_json::from_str(&stored.value) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Discarding unreadable enrollment session record: {}", e);
                db.remove(common::SESSION_KEY)?;
                return Ok(EnrollmentSession::default());
            }
        };
        if session.updated_at.is_none() {
            session.updated_at = Some(stored.updated_at);
        }

        let expired = match session.active_status {
            Some(JobState::Failed) => true,
            Some(JobState::Completed) => {
                let age = Utc::now() - session.updated_at.unwrap_or(stored.updated_at);
                age.to_std().map_or(false, |age| age >= completed_grace)
            }
            _ => false,
        };
        if expired {
            log::info!("Clearing finished enrollment {:?} left from an earlier run", session.active_job_id);
            db.remove(common::SESSION_KEY)?;
            return Ok(EnrollmentSession::default());
        }
        Ok(session)
    }

    pub fn snapshot(&self) -> EnrollmentSession {
        self.tx.borrow().clone()
    }

    pub fn has_active(&self) -> bool {
        self.tx.borrow().has_active()
    }

    pub fn subscribe(&self) -> watch::Receiver<EnrollmentSession> {
        self.tx.subscribe()
    }

    /// Records a freshly submitted job. Status starts at `waiting`.
    pub fn set_active(&self, job_id: JobId, sections: Vec<String>) -> Result<()> {
        self.write(|_| Some(EnrollmentSession::active(job_id, sections)))
            .map(|_| ())
    }

    /// Applies `status` only while `job_id` is the recorded job. Returns whether it applied.
    pub fn update_status(&self, job_id: &JobId, status: JobState) -> Result<bool> {
        self.write(|current| {
            if !current.refers_to(job_id) || current.active_status == Some(status) {
                return None;
            }
            let mut next = current.clone();
            next.active_status = Some(status);
            next.updated_at = Some(Utc::now());
            Some(next)
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.write(|current| (!current.is_empty()).then(EnrollmentSession::default))
            .map(|_| ())
    }

    /// Clears only if the record still refers to `job_id`.
    pub fn clear_if(&self, job_id: &JobId) -> Result<bool> {
        self.write(|current| current.refers_to(job_id).then(EnrollmentSession::default))
    }

    /// `update` returns the replacement record, or None to leave the store untouched.
    fn write<F>(&self, update: F) -> Result<bool>
    where
        F: FnOnce(&EnrollmentSession) -> Option<EnrollmentSession>,
    {
        let db = self.db.lock().unwrap();
        let current = self.tx.borrow().clone();
        let next = match update(&current) {
            Some(next) => next,
            None => return Ok(false),
        };

        if next.is_empty() {
            db.remove(common::SESSION_KEY)?;
        } else {
            db.put_json(common::SESSION_KEY, &next)?;
        }
        self.tx.send_replace(next);
        Ok(true)
    }
}
