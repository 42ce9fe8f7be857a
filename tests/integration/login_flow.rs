use rocket::http::{ContentType, Status};

use crate::common::*;

fn post_json(h: &TestHarness, path: &str, body: serde_json::Value) -> (Status, serde_json::Value) {
    let res = h
        .post(path)
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch();
    let status = res.status();
    (status, res.into_json().unwrap_or(serde_json::json!({})))
}

#[test]
fn full_login_without_password() {
    let h = harness();
    let (status, body) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+1 555 000 1111", "name": "fresh"}),
    );
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["status"], "code_sent");
    let login_id = body["login_id"].as_str().unwrap().to_string();

    let res = h
        .get(format!("/session/status?login_id={login_id}"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "code_sent");

    // Wrong code is rejected, the flow stays alive.
    let (status, _) = post_json(
        &h,
        "/session/code",
        serde_json::json!({"login_id": login_id, "code": "00000"}),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, body) = post_json(
        &h,
        "/session/code",
        serde_json::json!({"login_id": login_id, "code": "11111"}),
    );
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["status"], "authorized");
    assert_eq!(body["session"], "fresh");

    // The credential moved out of pending and the session is live.
    assert!(h.root.join("sessions").join("fresh.session").exists());
    assert!(!h.root.join("sessions_pending").join("fresh.session").exists());
    let status = status_json(&h);
    let sessions = status["sessions"].as_array().unwrap();
    assert!(sessions
        .iter()
        .any(|s| s["name"] == "fresh" && s["online"] == true));

    // The login is gone from the pending map.
    let res = h
        .get(format!("/session/status?login_id={login_id}"))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn two_factor_password_path() {
    let h = harness();
    h.hub.set_password("+15550002222", "hunter2");
    let (status, body) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+15550002222", "name": "guarded"}),
    );
    assert_eq!(status, Status::Ok);
    let login_id = body["login_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &h,
        "/session/code",
        serde_json::json!({"login_id": login_id, "code": "11111"}),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "password_needed");

    let (status, _) = post_json(
        &h,
        "/session/password",
        serde_json::json!({"login_id": login_id, "password": "wrong"}),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, body) = post_json(
        &h,
        "/session/password",
        serde_json::json!({"login_id": login_id, "password": "hunter2"}),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "authorized");
    assert!(h.root.join("sessions").join("guarded.session").exists());
}

#[test]
fn duplicate_phone_in_flight_is_409() {
    let h = harness();
    let (status, _) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+15550003333", "name": "one"}),
    );
    assert_eq!(status, Status::Ok);
    let (status, _) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+15550003333", "name": "two"}),
    );
    assert_eq!(status, Status::Conflict);
}

#[test]
fn cancel_discards_the_pending_login() {
    let h = harness();
    let (_, body) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+15550004444", "name": "doomed"}),
    );
    let login_id = body["login_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &h,
        "/session/cancel",
        serde_json::json!({"login_id": login_id}),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "cancelled");

    let res = h
        .get(format!("/session/status?login_id={login_id}"))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
    assert!(!h.root.join("sessions_pending").join("doomed.session").exists());
}

#[test]
fn resend_and_bad_login_ids() {
    let h = harness();
    let (status, _) = post_json(
        &h,
        "/session/code",
        serde_json::json!({"login_id": "nope", "code": "11111"}),
    );
    assert_eq!(status, Status::NotFound);

    let (_, body) = post_json(
        &h,
        "/session/start",
        serde_json::json!({"phone": "+15550005555"}),
    );
    let login_id = body["login_id"].as_str().unwrap().to_string();
    let (status, body) = post_json(
        &h,
        "/session/resend",
        serde_json::json!({"login_id": login_id}),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "code_sent");
}

#[test]
fn bad_phone_is_rejected() {
    let h = harness();
    let (status, _) = post_json(&h, "/session/start", serde_json::json!({"phone": "abc"}));
    assert_eq!(status, Status::BadRequest);
}
