//! On-disk session persistence: one JSON file per session, written
//! atomically, with a per-session lock held for the duration of a request
//! so concurrent turns on the same session serialize instead of racing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use crate::error::SessionError;
use crate::types::session::Session;

/// Loads, persists, and locks sessions under a directory, one file per
/// session keyed by `{session_id}.json`.
pub struct SessionStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Acquires the per-session lock, to be held for the whole request so a
    /// second concurrent request against the same session waits rather than
    /// reading stale entity state.
    pub async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Loads a session, returning a fresh one if no file exists or the
    /// existing one has expired past `ttl_secs` of inactivity.
    #[instrument(skip(self))]
    pub async fn load(&self, session_id: &str, now: DateTime<Utc>, ttl_secs: u64) -> Result<Session, SessionError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Session::new(session_id, now));
        }
        let data = fs::read_to_string(&path).await?;
        let session: Session = serde_json::from_str(&data)?;
        if session.is_expired(now, ttl_secs) {
            return Ok(Session::new(session_id, now));
        }
        Ok(session)
    }

    /// Persists `session` atomically: serialize, write to a sibling temp
    /// file, then rename over the target path.
    #[instrument(skip(self, session))]
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&session.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let serialized = serde_json::to_string(session)?;
        fs::write(&tmp_path, serialized).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Removes session files that have been idle past `ttl_secs`. Returns
    /// the number of files removed.
    pub async fn janitor_sweep(&self, dir: &Path, now: DateTime<Utc>, ttl_secs: u64) -> Result<usize, SessionError> {
        let mut removed = 0usize;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(session) = serde_json::from_str::<Session>(&data) else {
                continue;
            };
            if session.is_expired(now, ttl_secs) {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::session::{ActiveEntityView, EntityMap};

    #[tokio::test]
    async fn loading_a_missing_session_returns_a_fresh_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let session = store.load("s1", Utc::now(), 86_400).await.unwrap();
        assert_eq!(session.session_id, "s1");
        assert!(session.recent_turns.is_empty());
    }

    #[tokio::test]
    async fn saved_session_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("s1", Utc::now());
        session.active_view = ActiveEntityView::default();
        session.entity_map = EntityMap::default();
        store.save(&session).await.unwrap();

        let loaded = store.load("s1", Utc::now(), 86_400).await.unwrap();
        assert_eq!(loaded.session_id, "s1");
    }

    #[tokio::test]
    async fn expired_session_is_replaced_with_a_fresh_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let old = Session::new("s1", Utc::now() - chrono::Duration::seconds(100));
        store.save(&old).await.unwrap();

        let loaded = store.load("s1", Utc::now(), 10).await.unwrap();
        assert!(loaded.recent_turns.is_empty());
    }

    #[tokio::test]
    async fn janitor_sweep_removes_expired_sessions_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let fresh = Session::new("fresh", Utc::now());
        let stale = Session::new("stale", Utc::now() - chrono::Duration::seconds(1000));
        store.save(&fresh).await.unwrap();
        store.save(&stale).await.unwrap();

        let removed = store.janitor_sweep(dir.path(), Utc::now(), 100).await.unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("fresh.json").exists());
        assert!(!dir.path().join("stale.json").exists());
    }

    #[tokio::test]
    async fn per_session_lock_serializes_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let guard = store.lock_session("s1").await;
        drop(guard);
        // A second acquisition after the first is dropped must not deadlock.
        let _guard2 = store.lock_session("s1").await;
    }
}
