use std::sync::Arc;

use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::{get, post, State};

use super::{err, ApiBearer, ApiError};
use crate::models::{SessionName, SessionUpload};
use crate::Mirror;

/// Max session file size: 10MB (after base64 decode)
const MAX_SESSION_SIZE: usize = 10 * 1024 * 1024;

fn valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._+-".contains(c))
}

/// Install an already-authorized session file.
#[post("/sessions/upload", format = "json", data = "<body>")]
pub async fn upload_session(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<SessionUpload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    use base64::Engine;

    let filename = body.filename.trim().to_string();
    if !valid_filename(&filename) {
        return Err(err(
            Status::BadRequest,
            "Filename must match [A-Za-z0-9._+-]+",
        ));
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&body.data)
        .map_err(|_| err(Status::BadRequest, "Invalid base64 data"))?;
    if decoded.is_empty() {
        return Err(err(Status::BadRequest, "Session file must not be empty"));
    }
    if decoded.len() > MAX_SESSION_SIZE {
        return Err(err(
            Status::BadRequest,
            format!(
                "Session file too large: {} bytes (max {} bytes)",
                decoded.len(),
                MAX_SESSION_SIZE
            ),
        ));
    }

    let path = std::path::Path::new(&m.cfg.sessions_dir).join(&filename);
    std::fs::write(&path, &decoded)
        .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
    println!("📥 session file {filename} installed");

    m.registry.rescan().await;
    let stem = filename.trim_end_matches(".session");
    let view = m
        .registry
        .snapshot()
        .into_iter()
        .find(|v| v.name.eq_ignore_ascii_case(stem));
    Ok(Json(serde_json::json!({"installed": filename, "session": view})))
}

/// Remove a session, its files, and its recent ring.
#[post("/sessions/delete", format = "json", data = "<body>")]
pub async fn delete_session(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<SessionName>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(name) = m.registry.delete(body.name.trim()).await else {
        return Err(err(Status::NotFound, "Session not found"));
    };
    m.store.update(|s| {
        s.recent_by_session.remove(&name.to_lowercase());
        s.dead_sessions.remove(&name);
    });
    Ok(Json(serde_json::json!({"deleted": name})))
}

/// Fetch one session's credential file.
#[get("/session/download?<name>")]
pub fn download_session(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    name: &str,
) -> Result<(ContentType, Vec<u8>), ApiError> {
    let Some(path) = m.registry.path_of(name) else {
        return Err(err(Status::NotFound, "Session not found"));
    };
    match std::fs::read(&path) {
        Ok(bytes) => Ok((ContentType::Binary, bytes)),
        Err(_) => Err(err(Status::NotFound, "Session file unreadable")),
    }
}

/// Force a session-directory rescan now.
#[post("/sessions/rescan")]
pub async fn rescan_sessions(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
) -> Json<serde_json::Value> {
    m.registry.rescan().await;
    Json(serde_json::json!({"sessions": m.registry.snapshot()}))
}
