pub mod api;
pub mod auth;
pub mod banner;
pub mod config;
pub mod db;
pub mod error;
pub mod handoff;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod migrations;
pub mod poller;
pub mod session;
pub mod slip;
pub mod tracker;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use error::{EnrollmentError, Result};

use anyhow::Context;
use std::sync::{Arc, Mutex};

/// Everything a command needs, opened once from the loaded configuration.
pub struct Services {
    pub config: config::Config,
    pub db: Arc<Mutex<db::Db>>,
    pub api: Arc<api::HttpApi>,
    pub session: session::SessionStore,
    pub handoff: handoff::Handoff,
    pub auth: auth::AuthStore,
    pub metrics: Arc<metrics::WorkflowMetrics>,
}

impl Services {
    pub fn open(config: config::Config) -> anyhow::Result<Self> {
        let db = db::Db::new(&config.storage.db_path)
            .with_context(|| format!("Failed to open database: {:?}", config.storage.db_path))?;
        let db = Arc::new(Mutex::new(db));
        log::debug!("Database opened at {:?}", config.storage.db_path);

        let session = session::SessionStore::open(db.clone(), config.polling.completed_grace())?;
        let auth = auth::AuthStore::new(db.clone());
        let api = Arc::new(api::HttpApi::new(&config.api)?);
        if let Some(record) = auth.load()? {
            api.set_token(Some(record.token));
        }

        Ok(Self {
            handoff: handoff::Handoff::new(db.clone()),
            metrics: Arc::new(metrics::WorkflowMetrics::new()),
            config,
            db,
            api,
            session,
            auth,
        })
    }

    pub fn workflow(&self, student_id: Option<String>) -> workflow::EnrollmentWorkflow {
        workflow::EnrollmentWorkflow::new(
            self.api.clone(),
            self.session.clone(),
            self.db.clone(),
            self.config.polling.clone(),
            self.metrics.clone(),
        )
        .with_student(student_id)
    }

    pub fn tracker(&self) -> tracker::StatusTracker {
        tracker::StatusTracker::new(
            self.api.clone(),
            self.session.clone(),
            self.handoff.clone(),
            self.db.clone(),
            self.config.polling.clone(),
        )
    }
}
