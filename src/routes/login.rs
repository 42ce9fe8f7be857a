use std::path::PathBuf;
use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};

use super::{err, platform_error_status, ApiBearer, ApiError};
use crate::models::{LoginCode, LoginId, LoginPassword, LoginStart};
use crate::platform::{LoginFlow, LoginStep, PlatformError};
use crate::{Mirror, PendingLogin};

fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Begin an interactive login. The pending credential file lives in the
/// pending directory until the flow authorizes, then moves atomically
/// into the session directory.
#[post("/session/start", format = "json", data = "<body>")]
pub async fn login_start(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<LoginStart>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phone = body.phone.trim().to_string();
    let digits = phone_digits(&phone);
    if digits.len() < 5 {
        return Err(err(Status::BadRequest, "phone is required"));
    }
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("acct_{digits}"));
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._+-".contains(c))
    {
        return Err(err(Status::BadRequest, "Invalid session name"));
    }

    {
        let logins = m.logins.lock().unwrap_or_else(|e| e.into_inner());
        if logins.values().any(|l| l.phone == phone) {
            return Err(err(Status::Conflict, "login already in flight for this phone"));
        }
    }
    if std::path::Path::new(&m.cfg.sessions_dir)
        .join(format!("{name}.session"))
        .exists()
    {
        return Err(err(Status::Conflict, "session with this name already exists"));
    }

    let pending_file = PathBuf::from(&m.cfg.pending_dir).join(format!("{name}.session"));
    let flow: Arc<dyn LoginFlow> = match m.connector.begin_login(&phone, &pending_file).await {
        Ok(flow) => Arc::from(flow),
        Err(e) => return Err(err(platform_error_status(&e), e.to_string())),
    };

    let login_id = uuid::Uuid::new_v4().to_string();
    let pending = PendingLogin {
        phone,
        name: name.clone(),
        stage: "code_sent".to_string(),
        pending_file,
        flow,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    m.logins
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(login_id.clone(), pending);
    println!("🔐 login started for session {name}");
    Ok(Json(
        serde_json::json!({"login_id": login_id, "status": "code_sent", "session": name}),
    ))
}

fn lookup(
    m: &Mirror,
    login_id: &str,
) -> Result<(Arc<dyn LoginFlow>, PathBuf, String), ApiError> {
    let logins = m.logins.lock().unwrap_or_else(|e| e.into_inner());
    logins
        .get(login_id)
        .map(|l| (l.flow.clone(), l.pending_file.clone(), l.name.clone()))
        .ok_or_else(|| err(Status::NotFound, "Unknown login_id"))
}

async fn finish_step(
    m: &Mirror,
    login_id: &str,
    step: Result<LoginStep, PlatformError>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match step {
        Ok(LoginStep::Authorized) => {
            let (_, pending_file, name) = lookup(m, login_id)?;
            std::fs::create_dir_all(&m.cfg.sessions_dir).ok();
            let target =
                std::path::Path::new(&m.cfg.sessions_dir).join(format!("{name}.session"));
            std::fs::rename(&pending_file, &target)
                .map_err(|e| err(Status::InternalServerError, e.to_string()))?;
            m.logins
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(login_id);
            m.registry.rescan().await;
            println!("🔓 login finished, session {name} installed");
            Ok(Json(
                serde_json::json!({"status": "authorized", "session": name}),
            ))
        }
        Ok(LoginStep::PasswordNeeded) => {
            let mut logins = m.logins.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(l) = logins.get_mut(login_id) {
                l.stage = "password_needed".to_string();
            }
            Ok(Json(serde_json::json!({"status": "password_needed"})))
        }
        Ok(LoginStep::CodeSent) => Ok(Json(serde_json::json!({"status": "code_sent"}))),
        Err(e) => Err(err(platform_error_status(&e), e.to_string())),
    }
}

#[post("/session/code", format = "json", data = "<body>")]
pub async fn login_code(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<LoginCode>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (flow, _, _) = lookup(m, &body.login_id)?;
    let step = flow.submit_code(body.code.trim()).await;
    finish_step(m, &body.login_id, step).await
}

#[post("/session/password", format = "json", data = "<body>")]
pub async fn login_password(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<LoginPassword>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (flow, _, _) = lookup(m, &body.login_id)?;
    let step = flow.submit_password(&body.password).await;
    finish_step(m, &body.login_id, step).await
}

#[post("/session/resend", format = "json", data = "<body>")]
pub async fn login_resend(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<LoginId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (flow, _, _) = lookup(m, &body.login_id)?;
    flow.resend()
        .await
        .map_err(|e| err(platform_error_status(&e), e.to_string()))?;
    Ok(Json(serde_json::json!({"status": "code_sent"})))
}

#[post("/session/cancel", format = "json", data = "<body>")]
pub async fn login_cancel(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<LoginId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (flow, pending_file, _) = lookup(m, &body.login_id)?;
    flow.cancel().await;
    std::fs::remove_file(&pending_file).ok();
    m.logins
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&body.login_id);
    Ok(Json(serde_json::json!({"status": "cancelled"})))
}

#[get("/session/status?<login_id>")]
pub fn login_status(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    login_id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let logins = m.logins.lock().unwrap_or_else(|e| e.into_inner());
    let Some(login) = logins.get(login_id) else {
        return Err(err(Status::NotFound, "Unknown login_id"));
    };
    Ok(Json(serde_json::json!({
        "status": login.stage,
        "session": login.name,
        "created_at": login.created_at,
    })))
}
