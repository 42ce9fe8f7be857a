use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::platform::{PlatformError, Post};
use crate::{failover, govern, publish, Mirror};

/// One deliverable unit: a singleton message, or an album collapsed to its
/// primary member. The unit id drives cursor advancement.
#[derive(Debug)]
pub struct Unit {
    pub id: i64,
    pub post: Post,
}

/// Group a fetched batch into units. Albums (shared grouped id) come
/// first, ordered by smallest member id; singletons follow in ascending
/// id order. An album is represented by its primary member only.
pub fn collate(posts: Vec<Post>) -> Vec<Unit> {
    let mut albums: BTreeMap<i64, Vec<Post>> = BTreeMap::new();
    let mut singles: Vec<Post> = Vec::new();
    for post in posts {
        match post.grouped_id {
            Some(group) => albums.entry(group).or_default().push(post),
            None => singles.push(post),
        }
    }

    let mut groups: Vec<Vec<Post>> = albums.into_values().collect();
    groups.sort_by_key(|members| members.iter().map(|p| p.id).min().unwrap_or(0));
    singles.sort_by_key(|p| p.id);

    let mut units = Vec::new();
    for members in groups {
        let primary = pick_primary(members);
        units.push(Unit {
            id: primary.id,
            post: primary,
        });
    }
    for post in singles {
        units.push(Unit { id: post.id, post });
    }
    units
}

/// The album member that carries the caption: longest text, ties broken by
/// highest id.
fn pick_primary(members: Vec<Post>) -> Post {
    members
        .into_iter()
        .max_by_key(|p| (p.text.chars().count(), p.id))
        .expect("album has at least one member")
}

/// The tick loop. Runs forever; one pass per tick plus jitter.
pub fn spawn_poll_loop(m: Arc<Mirror>) {
    tokio::spawn(async move {
        loop {
            let jitter = if m.cfg.idle_jitter_ms > 0 {
                rand::rng().random_range(0..=m.cfg.idle_jitter_ms)
            } else {
                0
            };
            tokio::time::sleep(Duration::from_millis(m.cfg.poll_tick_ms + jitter)).await;
            run_poll_pass(&m).await;
        }
    });
}

/// One pass: fan out one task per poller and await them all.
pub async fn run_poll_pass(m: &Mirror) {
    let sources: Vec<String> = m.store.read(|s| s.pollers.keys().cloned().collect());
    let tasks: Vec<_> = sources
        .into_iter()
        .map(|source| poll_source(m, source))
        .collect();
    futures::future::join_all(tasks).await;
}

async fn poll_source(m: &Mirror, source_key: String) {
    let jobs = m.store.read(|s| s.jobs_for_source(&source_key));
    if jobs.is_empty() {
        return;
    }

    let Some(handle) = failover::ensure_live(m, &source_key).await else {
        return;
    };
    let source_ref = m
        .store
        .read(|s| s.pollers.get(&source_key).map(|p| p.source.clone()))
        .unwrap_or_else(|| source_key.clone());

    if let Err(e) = govern::ensure_join(&m.registry, &handle, &source_ref, &m.cfg).await {
        poller_error(m, &source_key, &format!("join failed: {e}"));
        return;
    }

    let min_cursor = jobs.iter().map(|j| j.last_ok_id).min().unwrap_or(0);
    let posts = match handle
        .gateway
        .messages_after(&source_ref, min_cursor, m.cfg.batch_max)
        .await
    {
        Ok(posts) => posts,
        Err(PlatformError::FloodWait(secs)) => {
            eprintln!("⏳ fetch {source_ref} flood-waited {secs}s");
            tokio::time::sleep(Duration::from_secs(secs)).await;
            return;
        }
        Err(e) if e.is_access() => {
            // Pending until an operator fixes channel access.
            poller_error(m, &source_key, &e.to_string());
            return;
        }
        Err(e) if e.is_terminal() => {
            let changed =
                m.registry
                    .mark_offline(&handle.name, &format!("{e} (terminal)"), true);
            if changed {
                m.alerts
                    .notify(format!("💀 poll session {} died: {e}", handle.name));
            }
            poller_error(m, &source_key, &e.to_string());
            return;
        }
        Err(e @ PlatformError::NotAuthorized) => {
            let changed = m.registry.mark_offline(&handle.name, &e.to_string(), false);
            if changed {
                m.alerts
                    .notify(format!("💀 poll session {} lost: {e}", handle.name));
            }
            poller_error(m, &source_key, &e.to_string());
            return;
        }
        Err(e) => {
            // Transient: leave the session alone, retry next tick. The
            // health loop downgrades it if the connection is really gone.
            poller_error(m, &source_key, &e.to_string());
            return;
        }
    };
    if posts.is_empty() {
        return;
    }

    for unit in collate(posts) {
        for job in &jobs {
            // Re-read: the job may have been deleted or advanced since the
            // tick started.
            let Some(current) = m.store.read(|s| s.jobs.get(&job.id).cloned()) else {
                continue;
            };
            if current.last_ok_id >= unit.id {
                continue;
            }
            let ok = publish::republish(m, &handle, &source_ref, &current, &unit.post).await;
            if ok {
                let now = chrono::Utc::now().to_rfc3339();
                m.store.update(|s| {
                    if let Some(j) = s.jobs.get_mut(&job.id) {
                        if unit.id > j.last_ok_id {
                            j.last_ok_id = unit.id;
                        }
                        j.last_error = None;
                        j.paused_reason = None;
                        j.updated_at = now.clone();
                    }
                });
            }
        }
    }
}

fn poller_error(m: &Mirror, source_key: &str, error: &str) {
    m.store.update(|s| {
        if let Some(p) = s.pollers.get_mut(source_key) {
            p.last_error = Some(error.to_string());
        }
    });
}

/// The session-directory rescan loop.
pub fn spawn_rescan_loop(m: Arc<Mirror>) {
    tokio::spawn(async move {
        loop {
            m.registry.rescan().await;
            tokio::time::sleep(Duration::from_secs(m.cfg.sess_rescan_sec)).await;
        }
    });
}
