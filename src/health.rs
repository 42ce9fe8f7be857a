use std::sync::Arc;
use std::time::Duration;

use crate::platform::PlatformError;
use crate::Mirror;

/// Periodic liveness probe over all sessions.
pub fn spawn_health_loop(m: Arc<Mirror>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(m.cfg.healthcheck_interval_sec)).await;
            run_health_sweep(&m).await;
        }
    });
}

/// One sweep: reconnect stopped sessions, re-check authorization on live
/// ones, recognize terminal conditions, publish the dead-session map.
pub async fn run_health_sweep(m: &Mirror) {
    for (name, gateway, terminal) in m.registry.entries_for_health() {
        if terminal {
            continue;
        }
        let gateway = match gateway {
            Some(gw) => gw,
            None => match m.registry.connect_now(&name).await {
                Some(handle) => handle.gateway,
                None => continue,
            },
        };
        match gateway.check_authorized().await {
            Ok(true) => m.registry.mark_online(&name),
            Ok(false) => {
                offline(m, &name, "not authorized", false);
            }
            Err(e @ (PlatformError::AuthRevoked | PlatformError::Deactivated)) => {
                offline(m, &name, &format!("{e} (terminal)"), true);
            }
            Err(e) => {
                offline(m, &name, &e.to_string(), false);
            }
        }
        m.registry
            .set_last_check(&name, chrono::Utc::now().to_rfc3339());
    }

    let dead = m.registry.dead_map();
    m.store.update(|s| s.dead_sessions = dead);
}

fn offline(m: &Mirror, name: &str, error: &str, terminal: bool) {
    if m.registry.mark_offline(name, error, terminal) {
        eprintln!("💀 session {name} went offline: {error}");
        m.alerts
            .notify(format!("💀 session {name} went offline: {error}"));
    }
}
