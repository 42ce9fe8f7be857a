use thiserror::Error;

use crate::models::{bot_fingerprint, job_id, normalize_channel, AddJob, Job, PostMode};
use crate::platform::PlatformError;
use crate::pollers::{remove_poller_if_orphan, upsert_poller};
use crate::roles::RoleMap;
use crate::{govern, Mirror};

/// Everything that can go wrong while mutating the job table. Rejected
/// synchronously at the API boundary; none of these reach core state.
#[derive(Debug, Error)]
pub enum AddError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("session {0} already holds the opposite role")]
    RoleConflict(String),
    #[error("session {0} is offline")]
    SessionOffline(String),
    #[error("no online poll session available")]
    NoPollSession,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Upsert one mirror relation. An existing job (same stable id) keeps its
/// cursor; a new job is baselined to the source's current tip so history
/// is never replayed.
pub async fn add_job(m: &Mirror, body: &AddJob) -> Result<Job, AddError> {
    let source = body.source.trim().to_string();
    let dest = body.dest.trim().to_string();
    if source.is_empty() {
        return Err(AddError::BadRequest("source is required".to_string()));
    }
    if dest.is_empty() {
        return Err(AddError::BadRequest("dest is required".to_string()));
    }
    let mode = body
        .post_mode
        .ok_or_else(|| AddError::BadRequest("post_mode must be \"user\" or \"bot\"".to_string()))?;

    let roles = m
        .store
        .read(|s| RoleMap::derive(s.pollers.values(), s.jobs.values()));

    let (post_session, bot_token, identity) = match mode {
        PostMode::User => {
            let raw = body
                .post_session
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AddError::BadRequest("post_session is required for user mode".to_string())
                })?;
            let handle = m
                .registry
                .find(raw)
                .await
                .ok_or_else(|| AddError::UnknownSession(raw.to_string()))?;
            if roles.is_poll(&handle.name) {
                return Err(AddError::RoleConflict(handle.name));
            }
            let identity = handle.name.to_lowercase();
            (Some(handle.name), None, identity)
        }
        PostMode::Bot => {
            let token = body
                .bot_token
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AddError::BadRequest("bot_token is required for bot mode".to_string())
                })?;
            (None, Some(token.to_string()), bot_fingerprint(token))
        }
    };

    let preferred = body
        .poll_session
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(pref) = preferred
        && roles.is_post(pref)
    {
        return Err(AddError::RoleConflict(pref.to_string()));
    }

    // The post session of this very job must never end up polling its own
    // source; exclude it from the poller pick.
    let handle = upsert_poller(m, &source, preferred, post_session.as_deref()).await?;

    let id = job_id(&source, &dest, mode, &identity);
    let existing = m.store.read(|s| s.jobs.get(&id).cloned());
    let last_ok_id = match &existing {
        Some(job) => job.last_ok_id,
        None => {
            let baseline = async {
                govern::ensure_join(&m.registry, &handle, &source, &m.cfg).await?;
                handle.gateway.latest_message_id(&source).await
            }
            .await;
            match baseline {
                Ok(id) => id,
                Err(e) => {
                    // Don't leave a freshly created poller behind for a
                    // source that never got a job.
                    let key = normalize_channel(&source);
                    m.store.update(|s| remove_poller_if_orphan(s, &key));
                    return Err(e.into());
                }
            }
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let job = Job {
        id: id.clone(),
        source,
        dest,
        post_mode: mode,
        post_session,
        bot_token,
        text_strip: body.text_strip.clone().unwrap_or_default(),
        caption_append: body.caption_append.clone().unwrap_or_default(),
        last_ok_id,
        last_error: None,
        paused_reason: None,
        created_at: existing
            .as_ref()
            .map(|j| j.created_at.clone())
            .unwrap_or_else(|| now.clone()),
        updated_at: now,
    };
    m.store.update(|s| {
        s.jobs.insert(id.clone(), job.clone());
    });
    println!(
        "📌 job {id}: {} → {} ({:?}) cursor {last_ok_id}",
        job.source, job.dest, mode
    );
    Ok(job)
}

/// Remove every job for a source, and the poller once orphaned. Returns
/// how many jobs went away.
pub fn delete_all(m: &Mirror, source: &str) -> usize {
    let key = normalize_channel(source);
    m.store.update(|s| {
        let ids: Vec<String> = s
            .jobs
            .values()
            .filter(|j| normalize_channel(&j.source) == key)
            .map(|j| j.id.clone())
            .collect();
        for id in &ids {
            s.jobs.remove(id);
        }
        remove_poller_if_orphan(s, &key);
        ids.len()
    })
}
