use rocket::http::Status;

use crate::common::*;

#[test]
fn user_job_baselines_to_source_tip() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    h.hub.post_text("src", "old 1");
    h.hub.post_text("src", "old 2");
    h.hub.post_text("src", "old 3");
    add_session(&h, "poll_1");
    add_session(&h, "poster_a");

    let (status, body) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a",
        }),
    );
    assert_eq!(status, Status::Ok, "{body}");
    assert_eq!(body["last_ok_id"], 3);

    let status = status_json(&h);
    assert_eq!(status["pollers"]["src"]["poll_session"], "poll_1");

    // History behind the baseline is never replayed.
    poll(&h);
    assert!(delivered_texts(&h, "d1").is_empty());
}

#[test]
fn add_validation_errors() {
    let h = harness();
    let (status, _) = add_raw(&h, serde_json::json!({"dest": "d1", "post_mode": "user"}));
    assert_eq!(status, Status::BadRequest);

    let (status, _) = add_raw(&h, serde_json::json!({"source": "src", "post_mode": "user"}));
    assert_eq!(status, Status::BadRequest);

    let (status, _) = add_raw(&h, serde_json::json!({"source": "src", "dest": "d1"}));
    assert_eq!(status, Status::BadRequest);

    let (status, _) = add_raw(
        &h,
        serde_json::json!({"source": "src", "dest": "d1", "post_mode": "user"}),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, _) = add_raw(
        &h,
        serde_json::json!({"source": "src", "dest": "d1", "post_mode": "bot"}),
    );
    assert_eq!(status, Status::BadRequest);
}

#[test]
fn unknown_post_session_is_404() {
    let h = harness();
    h.hub.create_channel("src");
    add_session(&h, "poll_1");
    let (status, _) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "ghost",
        }),
    );
    assert_eq!(status, Status::NotFound);
}

#[test]
fn no_poll_candidate_is_503() {
    let h = harness();
    h.hub.create_channel("src");
    // The only session is the job's own post session; it must never poll.
    add_session(&h, "poster_a");
    let (status, body) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a",
        }),
    );
    assert_eq!(status, Status::ServiceUnavailable, "{body}");
}

#[test]
fn role_conflicts_are_409() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("src2");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "poster_a");
    add_session(&h, "poster_b");
    add_user_job(&h, "src", "d1", "poster_a");

    // poster_a now holds post role; it cannot be named as a poll session.
    let (status, _) = add_raw(
        &h,
        serde_json::json!({
            "source": "src2", "dest": "d1",
            "post_mode": "user", "post_session": "poster_b",
            "poll_session": "poster_a",
        }),
    );
    assert_eq!(status, Status::Conflict);

    // poll_1 holds poll role; it cannot be named as a post session.
    let (status, _) = add_raw(
        &h,
        serde_json::json!({
            "source": "src2", "dest": "d1",
            "post_mode": "user", "post_session": "poll_1",
        }),
    );
    assert_eq!(status, Status::Conflict);

    // State is unchanged: still exactly one job.
    let status = status_json(&h);
    assert_eq!(status["jobs"].as_object().unwrap().len(), 1);
}

#[test]
fn preferred_poll_session_is_respected() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "poll_2");
    add_session(&h, "poster_a");

    let (status, _) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a",
            "poll_session": "poll_2",
        }),
    );
    assert_eq!(status, Status::Ok);
    let status = status_json(&h);
    assert_eq!(status["pollers"]["src"]["poll_session"], "poll_2");
}

#[test]
fn preferred_poll_session_must_be_online() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "poll_2");
    add_session(&h, "poster_a");
    h.hub.kill("poll_2");
    health(&h);

    let (status, _) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a",
            "poll_session": "poll_2",
        }),
    );
    assert_eq!(status, Status::ServiceUnavailable);
}

#[test]
fn delete_all_removes_jobs_and_poller() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    h.hub.create_channel("d2");
    add_session(&h, "poll_1");
    add_session(&h, "poster_a");
    add_session(&h, "poster_b");
    add_user_job(&h, "src", "d1", "poster_a");
    add_user_job(&h, "src", "d2", "poster_b");

    let (status, body) = add_raw(&h, serde_json::json!({"source": "src", "delete": "all"}));
    assert_eq!(status, Status::Ok);
    assert_eq!(body["deleted"], 2);

    let status = status_json(&h);
    assert!(status["jobs"].as_object().unwrap().is_empty());
    assert!(status["pollers"].as_object().unwrap().is_empty());
}

#[test]
fn re_add_keeps_the_cursor() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    add_session(&h, "poll_1");
    add_session(&h, "poster_a");
    let job_id = add_user_job(&h, "src", "d1", "poster_a");

    h.hub.post_text("src", "one");
    h.hub.post_text("src", "two");
    poll(&h);
    let status = status_json(&h);
    let advanced = job_cursor(&status, &job_id);
    assert_eq!(advanced, 2);

    // Re-adding the same tuple (e.g. to change the caption) keeps the
    // cursor instead of re-baselining to the tip.
    h.hub.post_text("src", "three");
    let (status, body) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "user", "post_session": "poster_a",
            "caption_append": "via mirror",
        }),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["id"].as_str().unwrap(), job_id);
    assert_eq!(body["last_ok_id"], advanced);

    poll(&h);
    let texts = delivered_texts(&h, "d1");
    assert_eq!(texts.len(), 3);
    assert!(texts[2].contains("three"));
    assert!(texts[2].contains("via mirror"));
}

#[test]
fn bot_job_masks_its_token() {
    let h = harness();
    h.hub.create_channel("src");
    h.hub.create_channel("d1");
    h.hub.register_bot("4242:secret-token");
    add_session(&h, "poll_1");

    let (status, body) = add_raw(
        &h,
        serde_json::json!({
            "source": "src", "dest": "d1",
            "post_mode": "bot", "bot_token": "4242:secret-token",
        }),
    );
    assert_eq!(status, Status::Ok, "{body}");
    let masked = body["bot_token"].as_str().unwrap();
    assert!(masked.starts_with('…'));
    assert!(!masked.contains("secret"));

    // /status masks it too.
    let status = status_json(&h);
    let job = status["jobs"].as_object().unwrap().values().next().unwrap();
    assert!(!job["bot_token"].as_str().unwrap().contains("secret"));
}
