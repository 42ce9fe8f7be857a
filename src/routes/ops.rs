use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{post, State};

use super::ApiBearer;
use crate::{engine, health, Mirror};

/// Run one poll pass now instead of waiting for the next tick.
#[post("/poll/run")]
pub async fn poll_run(m: &State<Arc<Mirror>>, _auth: ApiBearer) -> Json<serde_json::Value> {
    engine::run_poll_pass(m).await;
    let cursors = m.store.read(|s| {
        s.jobs
            .values()
            .map(|j| (j.id.clone(), j.last_ok_id))
            .collect::<std::collections::HashMap<_, _>>()
    });
    Json(serde_json::json!({"ok": true, "cursors": cursors}))
}

/// Run one health sweep now.
#[post("/health/run")]
pub async fn health_run(m: &State<Arc<Mirror>>, _auth: ApiBearer) -> Json<serde_json::Value> {
    health::run_health_sweep(m).await;
    let dead = m.store.read(|s| s.dead_sessions.clone());
    Json(serde_json::json!({"ok": true, "dead_sessions": dead}))
}
