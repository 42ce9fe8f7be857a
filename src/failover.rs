use crate::pollers::pick_poll_session;
use crate::registry::SessionHandle;
use crate::Mirror;

/// Make sure the source's poller is bound to a live session, reassigning
/// it if the bound one is dead or missing. Post sessions are never
/// candidates and never failed over themselves: a job's posting identity
/// is part of its contract.
pub async fn ensure_live(m: &Mirror, source_key: &str) -> Option<SessionHandle> {
    let poller = m.store.read(|s| s.pollers.get(source_key).cloned())?;

    if m.registry.is_online(&poller.poll_session)
        && let Some(handle) = m.registry.get(&poller.poll_session)
    {
        return Some(handle);
    }

    let online = m.registry.online_entries();
    let picked = m.store.read(|s| pick_poll_session(s, &online, None));
    let Some((name, index)) = picked else {
        m.store.update(|s| {
            if let Some(p) = s.pollers.get_mut(source_key) {
                p.last_error = Some("no online poll session available".to_string());
            }
        });
        return None;
    };

    let old = poller.poll_session.clone();
    let now = chrono::Utc::now().to_rfc3339();
    m.store.update(|s| {
        if let Some(p) = s.pollers.get_mut(source_key) {
            p.poll_session = name.clone();
            p.session_index = index;
            p.last_error = None;
            p.last_failover_at = Some(now.clone());
        }
    });
    println!(
        "♻️  poller for {} failed over: {old} → {name}",
        poller.source
    );
    m.alerts.notify(format!(
        "♻️ poll session for {} failed over: {old} → {name}",
        poller.source
    ));
    m.registry.get(&name)
}
