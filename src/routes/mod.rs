// Route module decomposition — each API area in its own file.
// Shared request guards and error helpers live here.

mod jobs_routes;
mod login;
mod ops;
mod sessions;
mod system;

pub use jobs_routes::add;
pub use login::{
    login_cancel, login_code, login_password, login_resend, login_start, login_status,
};
pub use ops::{health_run, poll_run};
pub use sessions::{delete_session, download_session, rescan_sessions, upload_session};
pub use system::status;

use std::sync::Arc;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;

use crate::jobs::AddError;
use crate::platform::PlatformError;
use crate::Mirror;

/// Bearer guard. When `API_BEARER` is unset the API is open; when set,
/// every route requires `Authorization: Bearer <token>`.
pub struct ApiBearer;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiBearer {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(mirror) = req.rocket().state::<Arc<Mirror>>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        match &mirror.cfg.api_bearer {
            None => Outcome::Success(ApiBearer),
            Some(expected) => {
                if let Some(auth) = req.headers().get_one("Authorization")
                    && let Some(token) = auth.strip_prefix("Bearer ")
                    && token == expected
                {
                    return Outcome::Success(ApiBearer);
                }
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

pub type ApiError = (Status, Json<serde_json::Value>);

pub fn err(status: Status, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({"error": message.into()})),
    )
}

/// HTTP status for a rejected job-table mutation.
pub fn add_error_status(e: &AddError) -> Status {
    match e {
        AddError::BadRequest(_) => Status::BadRequest,
        AddError::UnknownSession(_) => Status::NotFound,
        AddError::RoleConflict(_) => Status::Conflict,
        AddError::SessionOffline(_) | AddError::NoPollSession => Status::ServiceUnavailable,
        AddError::Platform(e) => platform_error_status(e),
    }
}

pub fn platform_error_status(e: &PlatformError) -> Status {
    match e {
        PlatformError::FloodWait(_) => Status::TooManyRequests,
        PlatformError::NotFound(_) => Status::NotFound,
        PlatformError::ChannelPrivate | PlatformError::AdminRequired => Status::BadRequest,
        PlatformError::Login(_) => Status::BadRequest,
        _ => Status::ServiceUnavailable,
    }
}

// --- Catchers ---

#[rocket::catch(401)]
pub fn unauthorized() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Unauthorized"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Too many requests"}))
}
