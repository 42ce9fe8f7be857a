use std::collections::HashMap;

use crate::jobs::AddError;
use crate::models::{normalize_channel, Poller};
use crate::registry::SessionHandle;
use crate::roles::RoleMap;
use crate::state::MirrorState;
use crate::Mirror;

/// How many pollers each session currently carries (by lowercased name).
pub fn poller_counts(state: &MirrorState) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for poller in state.pollers.values() {
        *counts.entry(poller.poll_session.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

/// Least-loaded online session that is not in post role. Ties broken by
/// lowest poller count, then lowest session index.
pub fn pick_poll_session(
    state: &MirrorState,
    online: &[(String, usize)],
    exclude: Option<&str>,
) -> Option<(String, usize)> {
    let roles = RoleMap::derive(state.pollers.values(), state.jobs.values());
    let counts = poller_counts(state);
    online
        .iter()
        .filter(|(name, _)| !roles.is_post(name))
        .filter(|(name, _)| {
            exclude.is_none_or(|x| !name.eq_ignore_ascii_case(x))
        })
        .min_by_key(|(name, index)| {
            (
                counts.get(&name.to_lowercase()).copied().unwrap_or(0),
                *index,
            )
        })
        .cloned()
}

/// Create or revalidate the poller for a source and return its bound
/// session. `exclude` is a name that must never be picked (the post
/// session of the job being added).
pub async fn upsert_poller(
    m: &Mirror,
    source: &str,
    preferred: Option<&str>,
    exclude: Option<&str>,
) -> Result<SessionHandle, AddError> {
    let key = normalize_channel(source);

    if let Some(pref) = preferred {
        let roles = m
            .store
            .read(|s| RoleMap::derive(s.pollers.values(), s.jobs.values()));
        if roles.is_post(pref) {
            return Err(AddError::RoleConflict(pref.to_string()));
        }
        if exclude.is_some_and(|x| x.eq_ignore_ascii_case(pref)) {
            return Err(AddError::RoleConflict(pref.to_string()));
        }
        let handle = m
            .registry
            .find(pref)
            .await
            .ok_or_else(|| AddError::UnknownSession(pref.to_string()))?;
        if !m.registry.is_online(&handle.name) {
            return Err(AddError::SessionOffline(handle.name.clone()));
        }
        bind(m, source, &key, &handle);
        return Ok(handle);
    }

    // Keep an existing live binding.
    let bound = m.store.read(|s| {
        s.pollers
            .get(&key)
            .map(|p| p.poll_session.clone())
    });
    if let Some(name) = bound
        && m.registry.is_online(&name)
        && let Some(handle) = m.registry.get(&name)
    {
        return Ok(handle);
    }

    let online = m.registry.online_entries();
    let picked = m
        .store
        .read(|s| pick_poll_session(s, &online, exclude))
        .ok_or(AddError::NoPollSession)?;
    let handle = m
        .registry
        .get(&picked.0)
        .ok_or(AddError::NoPollSession)?;
    bind(m, source, &key, &handle);
    Ok(handle)
}

fn bind(m: &Mirror, source: &str, key: &str, handle: &SessionHandle) {
    let index = m
        .registry
        .online_entries()
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(&handle.name))
        .map(|(_, i)| i)
        .unwrap_or(0);
    let now = chrono::Utc::now().to_rfc3339();
    m.store.update(|s| {
        let entry = s.pollers.entry(key.to_string()).or_insert_with(|| Poller {
            source: source.trim().to_string(),
            poll_session: handle.name.clone(),
            session_index: index,
            created_at: now.clone(),
            last_error: None,
            last_failover_at: None,
        });
        entry.poll_session = handle.name.clone();
        entry.session_index = index;
        entry.last_error = None;
    });
}

/// Drop the poller once its last job is gone.
pub fn remove_poller_if_orphan(state: &mut MirrorState, source_key: &str) {
    let has_jobs = state
        .jobs
        .values()
        .any(|j| normalize_channel(&j.source) == source_key);
    if !has_jobs {
        state.pollers.remove(source_key);
    }
}
