use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{post, State};

use super::{add_error_status, err, ApiBearer, ApiError};
use crate::jobs;
use crate::models::{bot_fingerprint, AddJob};
use crate::Mirror;

/// Upsert one mirror relation. With `delete: "all"`, removes every job
/// (and the poller) for a source instead.
#[post("/add", format = "json", data = "<body>")]
pub async fn add(
    m: &State<Arc<Mirror>>,
    _auth: ApiBearer,
    body: Json<AddJob>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.delete.as_deref() == Some("all") {
        let source = body.source.trim();
        if source.is_empty() {
            return Err(err(Status::BadRequest, "source is required"));
        }
        let removed = jobs::delete_all(m, source);
        println!("🧹 removed {removed} job(s) for {source}");
        return Ok(Json(serde_json::json!({"deleted": removed})));
    }

    match jobs::add_job(m, &body).await {
        Ok(job) => {
            let mut value = serde_json::to_value(&job).unwrap_or_default();
            if let Some(token) = &job.bot_token {
                value["bot_token"] =
                    serde_json::Value::String(format!("…{}", bot_fingerprint(token)));
            }
            Ok(Json(value))
        }
        Err(e) => Err(err(add_error_status(&e), e.to_string())),
    }
}
