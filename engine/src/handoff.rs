//! Ephemeral hand-off between the selection, confirmation and status steps.
//!
//! Everything lives under [`common::HANDOFF_PREFIX`], so nothing here can overwrite
//! the session or auth records.

use crate::db::Db;
use crate::error::Result;
use common::{CourseOffer, JobId};
use std::sync::{Arc, Mutex};

const SELECTED_SECTIONS: &str = "handoff.selected-sections";
const TASK_ID: &str = "handoff.task-id";
const SECTIONS_IN_ENROLLMENT: &str = "handoff.sections-in-enrollment";

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEnrollment {
    pub job_id: JobId,
    pub sections: Vec<CourseOffer>,
}

#[derive(Clone)]
pub struct Handoff {
    db: Arc<Mutex<Db>>,
}

impl Handoff {
    pub fn new(db: Arc<Mutex<Db>>) -> Self {
        Self { db }
    }

    /// Selection step: remember what the student picked for the confirmation step.
    pub fn stash_selection(&self, offers: &[CourseOffer]) -> Result<()> {
        self.db.lock().unwrap().put_json(SELECTED_SECTIONS, &offers)
    }

    pub fn peek_selection(&self) -> Result<Option<Vec<CourseOffer>>> {
        self.read(SELECTED_SECTIONS)
    }

    /// Confirmation step: the job exists, pass it on to the status step.
    pub fn record_submission(&self, job_id: &JobId, sections: &[CourseOffer]) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.put_json(TASK_ID, job_id)?;
        db.put_json(SECTIONS_IN_ENROLLMENT, &sections)?;
        db.remove(SELECTED_SECTIONS)?;
        Ok(())
    }

    pub fn pending(&self) -> Result<Option<PendingEnrollment>> {
        let job_id: Option<JobId> = self.read(TASK_ID)?;
        Ok(job_id.map(|job_id| PendingEnrollment {
            job_id,
            sections: self.read(SECTIONS_IN_ENROLLMENT).ok().flatten().unwrap_or_default(),
        }))
    }

    pub fn clear_pending(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.remove(TASK_ID)?;
        db.remove(SECTIONS_IN_ENROLLMENT)?;
        Ok(())
    }

    /// Drops every hand-off key, including ones written by older versions.
    pub fn clear_all(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        for key in db.keys_with_prefix(common::HANDOFF_PREFIX)? {
            db.remove(&key)?;
        }
        Ok(())
    }

    /// A value that no longer parses is dropped rather than reported.
    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let db = self.db.lock().unwrap();
        match db.get_json(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("Dropping unreadable hand-off value {}: {}", key, e);
                db.remove(key)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use std::time::Duration;

    fn offer(id: &str) -> CourseOffer {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "detalleGrupoMateria": {
                "id": format!("gm-{}", id), "grupo": "SA", "inscritos": 1, "cupos": 40,
                "Docente": null,
                "materia": {"sigla": "INF110", "nombre": "Intro", "creditos": 5, "nivel": {"semestre": 1}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_selection_to_status_handoff() {
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let handoff = Handoff::new(db);

        handoff.stash_selection(&[offer("A"), offer("B")]).unwrap();
        let selection = handoff.peek_selection().unwrap().unwrap();
        assert_eq!(selection.len(), 2);

        handoff.record_submission(&JobId::from("job-1"), &selection).unwrap();
        assert!(handoff.peek_selection().unwrap().is_none());

        let pending = handoff.pending().unwrap().unwrap();
        assert_eq!(pending.job_id, JobId::from("job-1"));
        assert_eq!(pending.sections[1].id, "B");

        handoff.clear_pending().unwrap();
        assert!(handoff.pending().unwrap().is_none());
    }

    #[test]
    fn test_handoff_does_not_touch_session() {
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let session = SessionStore::open(db.clone(), Duration::from_secs(30)).unwrap();
        let handoff = Handoff::new(db.clone());

        session.set_active(JobId::from("job-1"), vec!["A".into()]).unwrap();
        handoff.record_submission(&JobId::from("job-2"), &[offer("B")]).unwrap();
        handoff.clear_pending().unwrap();

        let reopened = SessionStore::open(db, Duration::from_secs(30)).unwrap();
        assert_eq!(reopened.snapshot().active_job_id, Some(JobId::from("job-1")));
    }

    #[test]
    fn test_clear_all_only_touches_handoff_keys() {
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let handoff = Handoff::new(db.clone());
        handoff.stash_selection(&[offer("A")]).unwrap();
        handoff.record_submission(&JobId::from("job-1"), &[offer("A")]).unwrap();
        db.lock().unwrap().put("handoff.legacy", "1").unwrap();
        db.lock().unwrap().put(common::AUTH_KEY, "{}").unwrap();

        handoff.clear_all().unwrap();
        assert!(db.lock().unwrap().keys_with_prefix(common::HANDOFF_PREFIX).unwrap().is_empty());
        assert!(db.lock().unwrap().get(common::AUTH_KEY).unwrap().is_some());
    }

    #[test]
    fn test_unreadable_selection_is_dropped() {
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        db.lock().unwrap().put(SELECTED_SECTIONS, "{broken").unwrap();
        let handoff = Handoff::new(db.clone());
        assert!(handoff.peek_selection().unwrap().is_none());
        assert!(db.lock().unwrap().get(SELECTED_SECTIONS).unwrap().is_none());
    }
}
