use crate::common::*;

#[test]
fn empty_status_shape() {
    let h = harness();
    let status = status_json(&h);
    assert!(status["sessions"].as_array().unwrap().is_empty());
    assert!(status["pollers"].as_object().unwrap().is_empty());
    assert!(status["jobs"].as_object().unwrap().is_empty());
    assert!(status["dead_sessions"].as_object().unwrap().is_empty());
    assert!(status["recent_by_session"].as_object().unwrap().is_empty());
    assert!(status["recent_by_bot"].as_object().unwrap().is_empty());
}

#[test]
fn sessions_appear_after_rescan() {
    let h = harness();
    add_session(&h, "poll_1");
    add_session(&h, "poll_2");
    let status = status_json(&h);
    let sessions = status["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["name"], "poll_1");
    assert_eq!(sessions[0]["index"], 0);
    assert_eq!(sessions[0]["online"], true);
    assert_eq!(sessions[1]["index"], 1);
}

#[test]
fn dead_sessions_published_by_health_sweep() {
    let h = harness();
    add_session(&h, "poll_1");
    add_session(&h, "poll_2");
    h.hub.kill("poll_1");
    health(&h);
    let status = status_json(&h);
    assert!(status["dead_sessions"]["poll_1"]
        .as_str()
        .unwrap()
        .contains("connection lost"));
    assert!(status["dead_sessions"].get("poll_2").is_none());
}

#[test]
fn terminal_death_is_marked_and_sticky() {
    let h = harness();
    add_session(&h, "poll_1");
    h.hub.revoke("poll_1");
    health(&h);
    let status = status_json(&h);
    assert!(status["dead_sessions"]["poll_1"]
        .as_str()
        .unwrap()
        .contains("terminal"));
    // A second sweep does not resurrect it.
    health(&h);
    let status = status_json(&h);
    assert_eq!(status["sessions"][0]["online"], false);
}
