use crate::models::{message_link, push_recent, Job, PostMode, RecentPost};
use crate::platform::{MediaBlob, Post};
use crate::registry::SessionHandle;
use crate::{govern, Mirror};

/// Separator between the transformed text and an appended caption.
pub const CAPTION_SEPARATOR: &str = "\n\n--------------------------------\n";

/// The text pipeline: strip all occurrences of `strip` (then trim), append
/// the caption behind the separator. Returns the final text and whether
/// any edit was configured. Edited messages lose their original
/// formatting entities and go out as plain text.
pub fn transform_text(original: &str, strip: &str, append: &str) -> (String, bool) {
    let edited = !strip.is_empty() || !append.is_empty();
    let mut text = original.to_string();
    if !strip.is_empty() {
        text = text.replace(strip, "").trim().to_string();
    }
    if !append.is_empty() {
        text = if text.is_empty() {
            append.to_string()
        } else {
            format!("{text}{CAPTION_SEPARATOR}{append}")
        };
    }
    (text, edited)
}

/// Republish one message (or album primary) for one job. True means the
/// destination confirmed the send; only then may the caller advance the
/// job's cursor. Every failure path leaves the cursor alone so the next
/// tick retries.
pub async fn republish(
    m: &Mirror,
    poll: &SessionHandle,
    source: &str,
    job: &Job,
    post: &Post,
) -> bool {
    let (text, edited) = transform_text(&post.text, &job.text_strip, &job.caption_append);
    let formatted = if edited { None } else { post.formatted.clone() };

    let media = fetch_media(m, poll, source, post).await;

    let sent = match job.post_mode {
        PostMode::User => {
            let Some(target) = job.post_session.as_deref() else {
                pause(m, &job.id, "post_session_missing", "job has no post session");
                return false;
            };
            let Some(handle) = m.registry.find(target).await else {
                pause(
                    m,
                    &job.id,
                    "post_session_missing",
                    &format!("post session {target} not found"),
                );
                return false;
            };
            if !m.registry.is_online(&handle.name) {
                pause(
                    m,
                    &job.id,
                    "post_session_die",
                    &format!("post session {target} is dead"),
                );
                m.alert_throttled(
                    &job.id,
                    format!(
                        "⛔ post session {target} for {source} → {} is dead; job is pending",
                        job.dest
                    ),
                );
                return false;
            }
            if let Err(e) = govern::ensure_join(&m.registry, &handle, &job.dest, &m.cfg).await {
                record_error(m, &job.id, &format!("join {} failed: {e}", job.dest));
                return false;
            }
            match &media {
                Some(blob) => handle.gateway.send_media(&job.dest, blob, &text).await,
                None => {
                    handle
                        .gateway
                        .send_text(&job.dest, &text, formatted.as_deref())
                        .await
                }
            }
        }
        PostMode::Bot => {
            let Some(token) = job.bot_token.as_deref() else {
                pause(m, &job.id, "bot_token_missing", "job has no bot token");
                return false;
            };
            match &media {
                Some(blob) => m.bot.send_media(token, &job.dest, blob, &text).await,
                None => {
                    m.bot
                        .send_text(token, &job.dest, &text, formatted.as_deref())
                        .await
                }
            }
        }
    };

    match sent {
        Ok(msg_id) => {
            let link = message_link(&m.cfg.link_host, &job.dest, msg_id);
            let entry = RecentPost {
                source: source.to_string(),
                dest: job.dest.clone(),
                link: link.clone(),
                ts: chrono::Utc::now().to_rfc3339(),
            };
            let identity = job.identity();
            m.store.update(|s| {
                let ring = match job.post_mode {
                    PostMode::User => s.recent_by_session.entry(identity.clone()).or_default(),
                    PostMode::Bot => s.recent_by_bot.entry(identity.clone()).or_default(),
                };
                push_recent(ring, entry);
            });
            m.alerts
                .notify(format!("✅ mirrored {source} → {}: {link}", job.dest));
            true
        }
        Err(e) => {
            eprintln!(
                "⚠️  send {} → {} (msg {}) failed: {e}",
                source, job.dest, post.id
            );
            record_error(m, &job.id, &format!("send failed: {e}"));
            false
        }
    }
}

/// Pull media through the poll session when enabled and small enough.
/// Oversized or failing downloads degrade to text-only.
async fn fetch_media(
    m: &Mirror,
    poll: &SessionHandle,
    source: &str,
    post: &Post,
) -> Option<MediaBlob> {
    if !m.cfg.include_media {
        return None;
    }
    let media = post.media.as_ref()?;
    if media.size > m.cfg.media_max_bytes {
        return None;
    }
    match poll.gateway.download_media(source, post).await {
        Ok(blob) => Some(blob),
        Err(e) => {
            eprintln!("⚠️  media download for {source} msg {} failed: {e}", post.id);
            None
        }
    }
}

fn pause(m: &Mirror, job_id: &str, reason: &str, error: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    m.store.update(|s| {
        if let Some(job) = s.jobs.get_mut(job_id) {
            job.paused_reason = Some(reason.to_string());
            job.last_error = Some(error.to_string());
            job.updated_at = now.clone();
        }
    });
}

fn record_error(m: &Mirror, job_id: &str, error: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    m.store.update(|s| {
        if let Some(job) = s.jobs.get_mut(job_id) {
            job.last_error = Some(error.to_string());
            job.updated_at = now.clone();
        }
    });
}
