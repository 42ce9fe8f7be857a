use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::{normalize_channel, Job, Poller, RecentPost};

/// Everything the process persists. Sessions' live state is deliberately
/// not here: it is rebuilt from the session directory on startup.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MirrorState {
    /// Keyed by normalized source channel.
    #[serde(default)]
    pub pollers: HashMap<String, Poller>,
    /// Keyed by job id.
    #[serde(default)]
    pub jobs: HashMap<String, Job>,
    #[serde(default)]
    pub recent_by_session: HashMap<String, Vec<RecentPost>>,
    #[serde(default)]
    pub recent_by_bot: HashMap<String, Vec<RecentPost>>,
    #[serde(default)]
    pub dead_sessions: HashMap<String, String>,
}

impl MirrorState {
    /// Jobs bound to a source, in stable id order.
    pub fn jobs_for_source(&self, source_key: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| normalize_channel(&j.source) == source_key)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }
}

/// Snapshot store. One mutex gates all mutations; writes go behind the
/// mutation (best-effort temp-file + rename). Losing a few seconds of
/// cursor progress on a crash is fine: at-least-once covers the replay.
pub struct Store {
    path: PathBuf,
    inner: Mutex<MirrorState>,
}

impl Store {
    /// Load the snapshot. Missing or unparseable file means empty state.
    pub fn load(path: &str) -> Self {
        let state = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<MirrorState>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    eprintln!("⚠️  state file {path} unparseable, starting empty: {e}");
                    MirrorState::default()
                }
            },
            Err(_) => MirrorState::default(),
        };
        Self {
            path: PathBuf::from(path),
            inner: Mutex::new(state),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&MirrorState) -> R) -> R {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Mutate and persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut MirrorState) -> R) -> R {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let out = f(&mut state);
        write_snapshot(&self.path, &state);
        out
    }
}

fn write_snapshot(path: &Path, state: &MirrorState) {
    let body = match serde_json::to_string_pretty(state) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("⚠️  cannot serialize state: {e}");
            return;
        }
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).ok();
    }
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, body).and_then(|_| std::fs::rename(&tmp, path)) {
        eprintln!("⚠️  cannot write state snapshot: {e}");
    }
}
