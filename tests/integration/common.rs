use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;

use channel_mirror::alerts::AlertSink;
use channel_mirror::config::Config;
use channel_mirror::platform::memory::MemoryHub;

/// Alert sink that records instead of sending.
#[derive(Default)]
pub struct RecordingAlerts {
    sent: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn containing(&self, needle: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.contains(needle))
            .count()
    }
}

impl AlertSink for RecordingAlerts {
    fn notify(&self, text: String) {
        self.sent.lock().unwrap().push(text);
    }
}

/// Wrapper around Client that owns the temp workspace (sessions dir,
/// pending dir, state file) and deletes it on drop.
pub struct TestHarness {
    client: Option<Client>,
    pub hub: Arc<MemoryHub>,
    pub alerts: Arc<RecordingAlerts>,
    pub root: PathBuf,
    cfg: Config,
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

impl std::ops::Deref for TestHarness {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

impl TestHarness {
    /// Simulate a process restart: new server, same state file and hub.
    pub fn restart(&mut self) {
        drop(self.client.take());
        let rocket = channel_mirror::rocket_with_parts(
            self.cfg.clone(),
            self.hub.connector(),
            self.hub.bot_sender(),
            self.alerts.clone(),
        );
        self.client = Some(Client::tracked(rocket).expect("valid rocket instance"));
    }
}

pub fn harness() -> TestHarness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut Config)) -> TestHarness {
    let root = std::env::temp_dir().join(format!(
        "mirror_test_{}",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    ));
    std::fs::create_dir_all(root.join("sessions")).unwrap();
    std::fs::create_dir_all(root.join("sessions_pending")).unwrap();

    let mut cfg = Config::default();
    cfg.sessions_dir = root.join("sessions").to_str().unwrap().to_string();
    cfg.pending_dir = root.join("sessions_pending").to_str().unwrap().to_string();
    cfg.state_path = root.join("state.json").to_str().unwrap().to_string();
    // Background loops stay parked; tests drive passes via the ops routes.
    cfg.poll_tick_ms = 3_600_000;
    cfg.sess_rescan_sec = 3600;
    cfg.healthcheck_interval_sec = 3600;
    cfg.idle_jitter_ms = 0;
    cfg.join_interval_sec = 0;
    cfg.join_jitter_ms = 0;
    tweak(&mut cfg);

    let hub = MemoryHub::new();
    let alerts = Arc::new(RecordingAlerts::default());
    let rocket = channel_mirror::rocket_with_parts(
        cfg.clone(),
        hub.connector(),
        hub.bot_sender(),
        alerts.clone(),
    );
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestHarness {
        client: Some(client),
        hub,
        alerts,
        root,
        cfg,
    }
}

/// Drop a ready-made session file into the session directory and rescan.
pub fn add_session(h: &TestHarness, name: &str) {
    let path = h.root.join("sessions").join(format!("{name}.session"));
    std::fs::write(&path, serde_json::json!({"account": name}).to_string()).unwrap();
    let res = h.post("/sessions/rescan").dispatch();
    assert_eq!(res.status(), Status::Ok);
}

pub fn poll(h: &TestHarness) {
    let res = h.post("/poll/run").dispatch();
    assert_eq!(res.status(), Status::Ok);
}

pub fn health(h: &TestHarness) {
    let res = h.post("/health/run").dispatch();
    assert_eq!(res.status(), Status::Ok);
}

pub fn status_json(h: &TestHarness) -> serde_json::Value {
    let res = h.get("/status").dispatch();
    assert_eq!(res.status(), Status::Ok);
    res.into_json().unwrap()
}

/// POST /add with the given body; returns (status, body).
pub fn add_raw(h: &TestHarness, body: serde_json::Value) -> (Status, serde_json::Value) {
    let res = h
        .post("/add")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch();
    let status = res.status();
    let body = res.into_json().unwrap_or(serde_json::json!({}));
    (status, body)
}

/// Add a user-mode job and return its id.
pub fn add_user_job(h: &TestHarness, source: &str, dest: &str, post_session: &str) -> String {
    let (status, body) = add_raw(
        h,
        serde_json::json!({
            "source": source,
            "dest": dest,
            "post_mode": "user",
            "post_session": post_session,
        }),
    );
    assert_eq!(status, Status::Ok, "add failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

pub fn job_cursor(status: &serde_json::Value, job_id: &str) -> i64 {
    status["jobs"][job_id]["last_ok_id"].as_i64().unwrap()
}

/// Delivered texts for a destination channel, in order.
pub fn delivered_texts(h: &TestHarness, channel: &str) -> Vec<String> {
    h.hub
        .deliveries(channel)
        .into_iter()
        .map(|d| d.text)
        .collect()
}
