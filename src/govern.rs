use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::Config;
use crate::models::normalize_channel;
use crate::platform::PlatformError;
use crate::registry::{SessionHandle, SessionRegistry};

/// Per-session join governor. Joins are serialized per session with a
/// minimum spacing and jitter; a channel already joined by this process is
/// a no-op. Flood-waits are honored in place. Private/admin-required
/// channels count as "not joinable but continue": the subsequent fetch or
/// send surfaces the access error and is retried.
pub async fn ensure_join(
    registry: &SessionRegistry,
    handle: &SessionHandle,
    channel: &str,
    config: &Config,
) -> Result<(), PlatformError> {
    let key = normalize_channel(channel);
    if registry.is_joined(&handle.name, &key) {
        return Ok(());
    }
    let Some(gate) = registry.join_lock(&handle.name) else {
        return Ok(());
    };
    let _guard = gate.lock().await;
    // Another task may have joined while we queued on the gate.
    if registry.is_joined(&handle.name, &key) {
        return Ok(());
    }

    if let Some(at) = registry.next_join_at(&handle.name) {
        let now = Instant::now();
        if at > now {
            tokio::time::sleep(at - now).await;
        }
    }
    if config.join_jitter_ms > 0 {
        let jitter = rand::rng().random_range(0..=config.join_jitter_ms);
        tokio::time::sleep(Duration::from_millis(jitter)).await;
    }

    let attempt = async {
        handle.gateway.resolve(channel).await?;
        handle.gateway.join(channel).await
    }
    .await;

    let out = match attempt {
        Ok(()) => {
            registry.mark_joined(&handle.name, &key);
            Ok(())
        }
        Err(PlatformError::FloodWait(secs)) => {
            eprintln!(
                "⏳ join of {channel} via {} flood-waited {secs}s",
                handle.name
            );
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(())
        }
        Err(e) if e.is_access() => {
            // Not joinable; keep going and let the fetch/send fail loudly.
            registry.mark_joined(&handle.name, &key);
            Ok(())
        }
        Err(e) => Err(e),
    };

    registry.set_next_join(
        &handle.name,
        Instant::now() + Duration::from_secs(config.join_interval_sec),
    );
    out
}
