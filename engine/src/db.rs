use crate::migrations::Migrator;
use chrono::{DateTime, Utc};
use common::{JobHandle, JobState};
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// A stored value together with the time it was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub job_id: String,
    pub request_id: String,
    pub sections: Vec<String>,
    pub submitted_at: String,
    pub final_status: Option<String>,
    pub detail: Option<String>,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    log::warn!("Could not create database directory {:?}: {}", parent, e);
                }
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        Migrator::new(&mut conn).run_migrations()?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        self.conn
            .query_row(
                "SELECT value, updated_at FROM kv_store WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredValue {
                        value: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    /// Replaces the whole value stored under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = stmt.query_map(params![prefix, prefix.chars().count() as i64], |row| row.get(0))?;
        keys.collect()
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.get(key)? {
            Some(stored) => Ok(Some(serde_json::from_str(&stored.value)?)),
            None => Ok(None),
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> crate::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put(key, &raw)?;
        Ok(())
    }

    pub fn record_attempt(&self, handle: &JobHandle, request_id: &str, sections: &[String]) -> Result<()> {
        let sections_json = serde_json::to_string(sections).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO attempt_history (job_id, request_id, sections, submitted_at) VALUES (?1, ?2, ?3, ?4)",
            params![handle.job_id.0, request_id, sections_json, handle.submitted_at],
        )?;
        Ok(())
    }

    pub fn finish_attempt(&self, job_id: &str, status: JobState, detail: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE attempt_history SET final_status = ?2, detail = ?3
             WHERE id = (SELECT MAX(id) FROM attempt_history WHERE job_id = ?1)",
            params![job_id, status.as_str(), detail],
        )?;
        Ok(())
    }

    pub fn get_history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, request_id, sections, submitted_at, final_status, detail
             FROM attempt_history ORDER BY id DESC LIMIT ?1",
        )?;
        let history_iter = stmt.query_map(params![limit], |row| {
            let sections_json: String = row.get(3)?;
            Ok(HistoryEntry {
                id: row.get(0)?,
                job_id: row.get(1)?,
                request_id: row.get(2)?,
                sections: serde_json::from_str(&sections_json).unwrap_or_default(),
                submitted_at: row.get(4)?,
                final_status: row.get(5)?,
                detail: row.get(6)?,
            })
        })?;

        let mut history = Vec::new();
        for entry in history_iter {
            history.push(entry?);
        }
        Ok(history)
    }
}
