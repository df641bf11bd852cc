use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wc_bridge_core::{
    apply_session_update, ActiveSession, ClockPort, PortError, SessionRecord, SessionStorePort,
    SessionUpdate, TimestampMs,
};

use crate::clock::SystemClockAdapter;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    schema_version: u32,
    sessions: Vec<SessionRecord>,
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: BTreeMap<String, SessionRecord>,
    path: Option<PathBuf>,
}

impl StoreState {
    /// Writes `next` to disk, then makes it the live map. A failed write
    /// leaves memory matching the last snapshot.
    fn commit(&mut self, next: BTreeMap<String, SessionRecord>) -> Result<(), PortError> {
        if let Some(path) = &self.path {
            write_snapshot(path, &next)?;
        }
        self.sessions = next;
        Ok(())
    }
}

fn write_snapshot(
    path: &Path,
    sessions: &BTreeMap<String, SessionRecord>,
) -> Result<(), PortError> {
    let snapshot = Snapshot {
        schema_version: SCHEMA_VERSION,
        sessions: sessions.values().cloned().collect(),
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| PortError::Transport(format!("session snapshot encode: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| PortError::Transport(format!("session snapshot write: {e}")))?;
    debug!(path = %path.display(), sessions = sessions.len(), "sessions persisted");
    Ok(())
}

/// Session store keyed by topic, optionally backed by a JSON file.
#[derive(Debug)]
pub struct SessionStoreAdapter<C = SystemClockAdapter> {
    inner: Arc<Mutex<StoreState>>,
    clock: Arc<C>,
}

impl<C> Clone for SessionStoreAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl SessionStoreAdapter<SystemClockAdapter> {
    pub fn in_memory() -> Self {
        Self::with_clock(SystemClockAdapter)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, PortError> {
        Self::open_with_clock(path, SystemClockAdapter)
    }
}

impl<C: ClockPort> SessionStoreAdapter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState::default())),
            clock: Arc::new(clock),
        }
    }

    /// Loads the snapshot at `path` if one exists. Later writes go to the
    /// same file.
    pub fn open_with_clock(path: impl AsRef<Path>, clock: C) -> Result<Self, PortError> {
        let path = path.as_ref().to_path_buf();
        let sessions = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| PortError::Transport(format!("session snapshot read: {e}")))?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)
                .map_err(|e| PortError::Validation(format!("session snapshot decode: {e}")))?;
            if snapshot.schema_version != SCHEMA_VERSION {
                return Err(PortError::Validation(format!(
                    "unsupported session snapshot version: {}",
                    snapshot.schema_version
                )));
            }
            snapshot
                .sessions
                .into_iter()
                .map(|s| (s.topic.clone(), s))
                .collect()
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), sessions = sessions.len(), "session store opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreState {
                sessions,
                path: Some(path),
            })),
            clock: Arc::new(clock),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("store lock poisoned: {e}")))
    }

    fn now(&self) -> Result<TimestampMs, PortError> {
        self.clock.now_ms().map(TimestampMs)
    }
}

impl<C: ClockPort> SessionStorePort for SessionStoreAdapter<C> {
    fn all(&self) -> Result<Vec<SessionRecord>, PortError> {
        Ok(self.lock()?.sessions.values().cloned().collect())
    }

    fn session(&self, topic: &str) -> Result<Option<SessionRecord>, PortError> {
        Ok(self.lock()?.sessions.get(topic).cloned())
    }

    fn contains(&self, topic: &str) -> Result<bool, PortError> {
        Ok(self.lock()?.sessions.contains_key(topic))
    }

    fn update(&self, topic: &str, update: SessionUpdate) -> Result<SessionRecord, PortError> {
        let now = self.now()?;
        let mut g = self.lock()?;
        let mut record = g
            .sessions
            .get(topic)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("session missing: {topic}")))?;
        apply_session_update(&mut record, update, now)?;
        let mut next = g.sessions.clone();
        next.insert(topic.to_owned(), record.clone());
        g.commit(next)?;
        Ok(record)
    }

    fn add_or_update(&self, session: &ActiveSession) -> Result<SessionRecord, PortError> {
        let now = self.now()?;
        let mut g = self.lock()?;
        let record = match g.sessions.get(&session.topic) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge_active(session, now);
                merged
            }
            None => SessionRecord::from_active(session, now),
        };
        let mut next = g.sessions.clone();
        next.insert(session.topic.clone(), record.clone());
        g.commit(next)?;
        Ok(record)
    }

    fn remove(&self, topic: &str) -> Result<bool, PortError> {
        let mut g = self.lock()?;
        if !g.sessions.contains_key(topic) {
            return Ok(false);
        }
        let mut next = g.sessions.clone();
        next.remove(topic);
        g.commit(next)?;
        Ok(true)
    }
}
