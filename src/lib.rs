pub mod alerts;
pub mod config;
pub mod engine;
pub mod failover;
pub mod govern;
pub mod health;
pub mod jobs;
pub mod models;
pub mod platform;
pub mod pollers;
pub mod publish;
pub mod registry;
pub mod roles;
pub mod routes;
pub mod state;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alerts::AlertSink;
use config::Config;
use platform::{BotSender, Connector, LoginFlow};
use registry::SessionRegistry;
use rocket_cors::CorsOptions;
use state::Store;

/// One interactive login in flight. Lives only in memory; the credential
/// file it produces is the durable output.
pub struct PendingLogin {
    pub phone: String,
    pub name: String,
    pub stage: String,
    pub pending_file: PathBuf,
    pub flow: Arc<dyn LoginFlow>,
    pub created_at: String,
}

/// The process-wide working set. Everything long-running (poll loop,
/// rescanner, health monitor, HTTP handlers) shares one of these.
pub struct Mirror {
    pub cfg: Config,
    pub store: Store,
    pub registry: SessionRegistry,
    pub connector: Arc<dyn Connector>,
    pub bot: Arc<dyn BotSender>,
    pub alerts: Arc<dyn AlertSink>,
    pub logins: Mutex<HashMap<String, PendingLogin>>,
    alert_marks: Mutex<HashMap<String, Instant>>,
}

impl Mirror {
    /// Emit an alert at most once per 30 s per key (one key per job).
    pub fn alert_throttled(&self, key: &str, text: String) {
        const MIN_SPACING: Duration = Duration::from_secs(30);
        let mut marks = self.alert_marks.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let due = marks
            .get(key)
            .is_none_or(|last| now.duration_since(*last) >= MIN_SPACING);
        if due {
            marks.insert(key.to_string(), now);
            drop(marks);
            self.alerts.notify(text);
        }
    }
}

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let cfg = Config::from_env();
    let (connector, bot) = platform::driver(&cfg);
    let alerts = alerts::from_config(&cfg);
    rocket_with_parts(cfg, connector, bot, alerts)
}

/// Build the server from explicit parts. The test suite injects its own
/// driver and alert sink here.
pub fn rocket_with_parts(
    cfg: Config,
    connector: Arc<dyn Connector>,
    bot: Arc<dyn BotSender>,
    alerts: Arc<dyn AlertSink>,
) -> rocket::Rocket<rocket::Build> {
    std::fs::create_dir_all(&cfg.sessions_dir).ok();
    std::fs::create_dir_all(&cfg.pending_dir).ok();

    let store = Store::load(&cfg.state_path);
    let registry = SessionRegistry::new(&cfg.sessions_dir, connector.clone());
    let mirror = Arc::new(Mirror {
        cfg,
        store,
        registry,
        connector,
        bot,
        alerts,
        logins: Mutex::new(HashMap::new()),
        alert_marks: Mutex::new(HashMap::new()),
    });

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    // Session uploads arrive base64-encoded in a JSON body: 10MB of file
    // is ~13.4MB of base64 plus the wrapper.
    let mut figment = rocket::Config::figment().merge(("limits.json", 16 * 1024 * 1024));
    if let Some(host) = &mirror.cfg.bind_host {
        figment = figment.merge(("address", host.clone()));
    }
    if let Some(port) = mirror.cfg.bind_port {
        figment = figment.merge(("port", port));
    }

    rocket::custom(figment)
        .manage(mirror.clone())
        .attach(cors)
        .register(
            "/",
            rocket::catchers![
                routes::unauthorized,
                routes::not_found,
                routes::too_many_requests
            ],
        )
        .mount(
            "/",
            rocket::routes![
                routes::status,
                routes::add,
                routes::upload_session,
                routes::delete_session,
                routes::download_session,
                routes::rescan_sessions,
                routes::login_start,
                routes::login_code,
                routes::login_password,
                routes::login_resend,
                routes::login_cancel,
                routes::login_status,
                routes::poll_run,
                routes::health_run,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Session Rescanner", {
            let m = mirror.clone();
            move |_rocket| {
                Box::pin(async move {
                    engine::spawn_rescan_loop(m);
                    println!("🔁 session rescanner started");
                })
            }
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Poll Loop", {
            let m = mirror.clone();
            move |_rocket| {
                Box::pin(async move {
                    engine::spawn_poll_loop(m);
                    println!("📡 poll loop started");
                })
            }
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Health Monitor", {
            let m = mirror.clone();
            move |_rocket| {
                Box::pin(async move {
                    health::spawn_health_loop(m);
                    println!("🩺 health monitor started");
                })
            }
        }))
}
