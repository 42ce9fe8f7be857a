use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, State};

use super::ApiBearer;
use crate::models::bot_fingerprint;
use crate::Mirror;

/// Full operational snapshot: sessions, pollers, jobs, dead map, recent
/// rings. Bot tokens are masked down to their fingerprint.
#[get("/status")]
pub fn status(m: &State<Arc<Mirror>>, _auth: ApiBearer) -> Json<serde_json::Value> {
    let sessions = m.registry.snapshot();
    m.store.read(|s| {
        let jobs: serde_json::Map<String, serde_json::Value> = s
            .jobs
            .iter()
            .map(|(id, job)| {
                let mut value = serde_json::to_value(job).unwrap_or_default();
                if let Some(token) = &job.bot_token {
                    value["bot_token"] =
                        serde_json::Value::String(format!("…{}", bot_fingerprint(token)));
                }
                (id.clone(), value)
            })
            .collect();
        Json(serde_json::json!({
            "sessions": sessions,
            "pollers": s.pollers,
            "jobs": jobs,
            "dead_sessions": s.dead_sessions,
            "recent_by_session": s.recent_by_session,
            "recent_by_bot": s.recent_by_bot,
        }))
    })
}
