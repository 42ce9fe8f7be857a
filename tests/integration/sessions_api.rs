use base64::Engine;
use rocket::http::{ContentType, Status};

use crate::common::*;

fn upload(h: &TestHarness, filename: &str, bytes: &[u8]) -> (Status, serde_json::Value) {
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    let res = h
        .post("/sessions/upload")
        .header(ContentType::JSON)
        .body(serde_json::json!({"filename": filename, "data": data}).to_string())
        .dispatch();
    let status = res.status();
    (status, res.into_json().unwrap_or(serde_json::json!({})))
}

#[test]
fn upload_installs_and_starts_the_session() {
    let h = harness();
    let content = serde_json::json!({"account": "up1"}).to_string();
    let (status, body) = upload(&h, "up1.session", content.as_bytes());
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["installed"], "up1.session");
    assert_eq!(body["session"]["online"], true);

    let status = status_json(&h);
    assert!(status["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["name"] == "up1" && s["online"] == true));
}

#[test]
fn upload_rejects_bad_filenames_and_payloads() {
    let h = harness();
    let (status, _) = upload(&h, "bad name!.session", b"x");
    assert_eq!(status, Status::BadRequest);

    let (status, _) = upload(&h, "../escape.session", b"x");
    assert_eq!(status, Status::BadRequest);

    let (status, _) = upload(&h, "ok.session", b"");
    assert_eq!(status, Status::BadRequest);

    let res = h
        .post("/sessions/upload")
        .header(ContentType::JSON)
        .body(r#"{"filename": "ok.session", "data": "not-base64!!!"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn download_round_trips_the_credential_file() {
    let h = harness();
    let content = serde_json::json!({"account": "dl1"}).to_string();
    upload(&h, "dl1.session", content.as_bytes());

    let res = h.get("/session/download?name=dl1").dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(res.into_bytes().unwrap(), content.as_bytes());

    let res = h.get("/session/download?name=ghost").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn delete_session_removes_files_and_recent_ring() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "poster_a");
    add_user_job(&h, "src", "d1", "poster_a");
    h.hub.post_text("src", "one");
    poll(&h);
    let status = status_json(&h);
    assert_eq!(status["recent_by_session"]["poster_a"].as_array().unwrap().len(), 1);

    let res = h
        .post("/sessions/delete")
        .header(ContentType::JSON)
        .body(r#"{"name": "poster_a"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    assert!(!h.root.join("sessions").join("poster_a.session").exists());
    let status = status_json(&h);
    assert!(status["recent_by_session"].get("poster_a").is_none());
    assert!(!status["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["name"] == "poster_a"));

    let res = h
        .post("/sessions/delete")
        .header(ContentType::JSON)
        .body(r#"{"name": "poster_a"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn rescan_evicts_sessions_whose_files_vanished() {
    let h = harness();
    add_session(&h, "poll_1");
    add_session(&h, "poll_2");
    std::fs::remove_file(h.root.join("sessions").join("poll_1.session")).unwrap();

    let res = h.post("/sessions/rescan").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["name"], "poll_2");
    // Indices are renumbered densely.
    assert_eq!(sessions[0]["index"], 0);
}

#[test]
fn find_is_case_insensitive_on_stem_and_filename() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "Poster_A");

    // Referencing the post session by full filename in a different case
    // still resolves.
    let (status, body) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a.SESSION",
        }),
    );
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["post_session"], "Poster_A");
}
