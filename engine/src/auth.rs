use crate::db::Db;
use crate::error::{EnrollmentError, Result};
use common::{LoginResponse, StudentProfile};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    pub user: StudentProfile,
}

/// Persisted login, stored under [`common::AUTH_KEY`].
#[derive(Clone)]
pub struct AuthStore {
    db: Arc<Mutex<Db>>,
}

impl AuthStore {
    pub fn new(db: Arc<Mutex<Db>>) -> Self {
        Self { db }
    }

    pub fn save(&self, login: LoginResponse) -> Result<AuthRecord> {
        let record = AuthRecord {
            token: login.access_token,
            user: login.profile,
        };
        self.db.lock().unwrap().put_json(common::AUTH_KEY, &record)?;
        Ok(record)
    }

    pub fn load(&self) -> Result<Option<AuthRecord>> {
        let record: Option<AuthRecord> = self.db.lock().unwrap().get_json(common::AUTH_KEY)?;
        Ok(record.filter(|r| !r.token.is_empty()))
    }

    /// The stored login, or a validation error when nobody is logged in.
    pub fn require(&self) -> Result<AuthRecord> {
        self.load()?.ok_or_else(EnrollmentError::not_authenticated)
    }

    pub fn clear(&self) -> Result<()> {
        self.db.lock().unwrap().remove(common::AUTH_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EnrollmentApi;
    use crate::test_support::ScriptedApi;

    #[tokio::test]
    async fn test_login_is_persisted_and_cleared() {
        let store = AuthStore::new(Arc::new(Mutex::new(Db::open_in_memory().unwrap())));
        assert_eq!(store.require().unwrap_err(), EnrollmentError::not_authenticated());

        let login = ScriptedApi::new().login("223041866", "secret").await.unwrap();
        store.save(login).unwrap();
        let record = store.require().unwrap();
        assert_eq!(record.user.registro, "223041866");
        assert_eq!(record.token, "token");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
