use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;

use crate::models::SessionView;
use crate::platform::{Connector, Gateway};

/// A session resolved to a live client handle. Cheap to clone; callers
/// never hold the registry lock while talking to the platform.
#[derive(Clone)]
pub struct SessionHandle {
    pub name: String,
    pub gateway: Arc<dyn Gateway>,
}

struct SessionEntry {
    name: String,
    path: PathBuf,
    index: usize,
    online: bool,
    /// Auth revoked / account deactivated: no reconnect will fix this.
    terminal: bool,
    display_name: Option<String>,
    last_check: Option<String>,
    last_error: Option<String>,
    next_join_at: Option<Instant>,
    joined: HashSet<String>,
    join_lock: Arc<AsyncMutex<()>>,
    gateway: Option<Arc<dyn Gateway>>,
}

impl SessionEntry {
    fn new(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            index: 0,
            online: false,
            terminal: false,
            display_name: None,
            last_check: None,
            last_error: None,
            next_join_at: None,
            joined: HashSet::new(),
            join_lock: Arc::new(AsyncMutex::new(())),
            gateway: None,
        }
    }

    fn matches(&self, query_lower: &str) -> bool {
        let stem = self.name.to_lowercase();
        stem == query_lower
            || format!("{stem}.session") == query_lower
            || self
                .display_name
                .as_deref()
                .is_some_and(|d| d.to_lowercase() == query_lower)
    }
}

/// Discovers session files on disk, starts and stops platform clients,
/// tracks liveness. Structural mutations go through one mutex; client
/// handles are cloned out and used without it.
pub struct SessionRegistry {
    dir: PathBuf,
    connector: Arc<dyn Connector>,
    inner: Mutex<Vec<SessionEntry>>,
    scan_lock: AsyncMutex<()>,
}

impl SessionRegistry {
    pub fn new(dir: &str, connector: Arc<dyn Connector>) -> Self {
        Self {
            dir: PathBuf::from(dir),
            connector,
            inner: Mutex::new(Vec::new()),
            scan_lock: AsyncMutex::new(()),
        }
    }

    /// One pass over the session directory: start clients for new files,
    /// evict sessions whose files disappeared, renumber densely.
    pub async fn rescan(&self) {
        let _scan = self.scan_lock.lock().await;
        let on_disk = list_session_files(&self.dir);
        let stems: HashSet<String> = on_disk.iter().map(|(s, _)| s.to_lowercase()).collect();

        let evicted: Vec<(String, Option<Arc<dyn Gateway>>)> = {
            let mut inner = self.inner.lock().unwrap();
            let mut gone = Vec::new();
            inner.retain_mut(|e| {
                if stems.contains(&e.name.to_lowercase()) {
                    true
                } else {
                    gone.push((e.name.clone(), e.gateway.take()));
                    false
                }
            });
            gone
        };
        for (name, gateway) in evicted {
            if let Some(gw) = gateway {
                gw.disconnect().await;
            }
            println!("🧹 session {name} evicted (file removed)");
        }

        let known: HashSet<String> = {
            let inner = self.inner.lock().unwrap();
            inner.iter().map(|e| e.name.to_lowercase()).collect()
        };
        for (stem, path) in on_disk {
            if known.contains(&stem.to_lowercase()) {
                continue;
            }
            let entry = self.connect_entry(&stem, &path).await;
            self.inner.lock().unwrap().push(entry);
        }

        let mut inner = self.inner.lock().unwrap();
        inner.sort_by(|a, b| a.name.cmp(&b.name));
        for (i, e) in inner.iter_mut().enumerate() {
            e.index = i;
        }
    }

    async fn connect_entry(&self, name: &str, path: &Path) -> SessionEntry {
        let mut entry = SessionEntry::new(name, path);
        match self.connector.connect(name, path).await {
            Ok(gw) => {
                match gw.check_authorized().await {
                    Ok(true) => {
                        entry.online = true;
                        println!("▶️  session {name} online");
                    }
                    Ok(false) => {
                        entry.last_error = Some("not authorized".to_string());
                        eprintln!("⚠️  session {name} is not authorized");
                    }
                    Err(e) => {
                        entry.terminal = e.is_terminal();
                        entry.last_error = Some(e.to_string());
                        eprintln!("⚠️  session {name} failed check: {e}");
                    }
                }
                entry.display_name = gw.display_name().await;
                entry.gateway = Some(gw);
            }
            Err(e) => {
                entry.last_error = Some(e.to_string());
                eprintln!("⚠️  session {name} failed to start: {e}");
            }
        }
        entry.last_check = Some(chrono::Utc::now().to_rfc3339());
        entry
    }

    pub fn snapshot(&self) -> Vec<SessionView> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .map(|e| SessionView {
                name: e.name.clone(),
                index: e.index,
                online: e.online,
                display_name: e.display_name.clone(),
                last_check: e.last_check.clone(),
                last_error: e.last_error.clone(),
            })
            .collect()
    }

    /// Case-insensitive lookup by file stem, full filename, or display
    /// name. Starts the client on demand if the entry is stopped.
    pub async fn find(&self, query: &str) -> Option<SessionHandle> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }
        let (name, gateway, terminal) = {
            let inner = self.inner.lock().unwrap();
            let entry = inner.iter().find(|e| e.matches(&q))?;
            (entry.name.clone(), entry.gateway.clone(), entry.terminal)
        };
        if let Some(gw) = gateway {
            return Some(SessionHandle { name, gateway: gw });
        }
        if terminal {
            return None;
        }
        self.connect_now(&name).await
    }

    /// Like `find`, but never connects.
    pub fn get(&self, name: &str) -> Option<SessionHandle> {
        let q = name.trim().to_lowercase();
        let inner = self.inner.lock().unwrap();
        let entry = inner.iter().find(|e| e.matches(&q))?;
        entry.gateway.clone().map(|gw| SessionHandle {
            name: entry.name.clone(),
            gateway: gw,
        })
    }

    /// Reconnect a known-but-stopped session.
    pub async fn connect_now(&self, name: &str) -> Option<SessionHandle> {
        let path = {
            let inner = self.inner.lock().unwrap();
            inner
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(name))
                .map(|e| e.path.clone())?
        };
        match self.connector.connect(name, &path).await {
            Ok(gw) => {
                let online = matches!(gw.check_authorized().await, Ok(true));
                let display = gw.display_name().await;
                {
                    let mut inner = self.inner.lock().unwrap();
                    if let Some(e) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name))
                    {
                        e.gateway = Some(gw.clone());
                        e.online = online;
                        if online {
                            e.last_error = None;
                        }
                        if display.is_some() {
                            e.display_name = display.clone();
                        }
                        e.last_check = Some(chrono::Utc::now().to_rfc3339());
                    }
                }
                Some(SessionHandle {
                    name: name.to_string(),
                    gateway: gw,
                })
            }
            Err(e) => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name))
                {
                    entry.last_error = Some(e.to_string());
                    entry.online = false;
                }
                None
            }
        }
    }

    /// Stop a session, remove its files, forget it. Returns the canonical
    /// name if something was removed.
    pub async fn delete(&self, query: &str) -> Option<String> {
        let q = query.trim().to_lowercase();
        let entry = {
            let mut inner = self.inner.lock().unwrap();
            let pos = inner.iter().position(|e| e.matches(&q))?;
            inner.remove(pos)
        };
        if let Some(gw) = &entry.gateway {
            gw.disconnect().await;
        }
        std::fs::remove_file(&entry.path).ok();
        std::fs::remove_file(entry.path.with_extension("session-journal")).ok();
        {
            let mut inner = self.inner.lock().unwrap();
            for (i, e) in inner.iter_mut().enumerate() {
                e.index = i;
            }
        }
        println!("🗑️  session {} deleted", entry.name);
        Some(entry.name)
    }

    pub fn path_of(&self, query: &str) -> Option<PathBuf> {
        let q = query.trim().to_lowercase();
        let inner = self.inner.lock().unwrap();
        inner.iter().find(|e| e.matches(&q)).map(|e| e.path.clone())
    }

    pub fn is_online(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(name) && e.online)
    }

    /// Online, non-terminal sessions as (name, index).
    pub fn online_entries(&self) -> Vec<(String, usize)> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|e| e.online && !e.terminal)
            .map(|e| (e.name.clone(), e.index))
            .collect()
    }

    /// Returns true when this flipped the session from online to offline.
    pub fn mark_offline(&self, name: &str, error: &str, terminal: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) else {
            return false;
        };
        let was_online = entry.online;
        entry.online = false;
        entry.terminal = entry.terminal || terminal;
        entry.last_error = Some(error.to_string());
        was_online
    }

    pub fn mark_online(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            entry.online = true;
            entry.last_error = None;
        }
    }

    pub fn set_last_check(&self, name: &str, ts: String) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            entry.last_check = Some(ts);
        }
    }

    pub fn dead_map(&self) -> HashMap<String, String> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|e| !e.online)
            .map(|e| {
                (
                    e.name.clone(),
                    e.last_error.clone().unwrap_or_else(|| "offline".to_string()),
                )
            })
            .collect()
    }

    pub fn entries_for_health(&self) -> Vec<(String, Option<Arc<dyn Gateway>>, bool)> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .map(|e| (e.name.clone(), e.gateway.clone(), e.terminal))
            .collect()
    }

    // --- join governor bookkeeping ---

    pub fn join_lock(&self, name: &str) -> Option<Arc<AsyncMutex<()>>> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.join_lock.clone())
    }

    pub fn is_joined(&self, name: &str, channel_key: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .is_some_and(|e| e.joined.contains(channel_key))
    }

    pub fn mark_joined(&self, name: &str, channel_key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            entry.joined.insert(channel_key.to_string());
        }
    }

    pub fn next_join_at(&self, name: &str) -> Option<Instant> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .and_then(|e| e.next_join_at)
    }

    pub fn set_next_join(&self, name: &str, at: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            entry.next_join_at = Some(at);
        }
    }
}

fn list_session_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("session"))
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?.to_string();
            if stem.is_empty() {
                None
            } else {
                Some((stem, p))
            }
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}
