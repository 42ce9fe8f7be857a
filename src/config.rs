use std::env;

/// Runtime configuration. All values read from environment variables with
/// sensible defaults.
///
/// Environment variables:
/// - `API_ID` / `API_HASH` — platform application credentials, handed to the driver
/// - `API_BEARER` — bearer token protecting the HTTP API (unset = open)
/// - `POLL_TICK_SEC` — seconds between poll passes (default: 1.5)
/// - `BATCH_MAX` — max messages fetched per source per tick (default: 50)
/// - `IDLE_JITTER_MS` — random extra sleep added to each tick (default: 300)
/// - `JOIN_INTERVAL_SEC` — minimum spacing between joins per session (default: 180)
/// - `JOIN_JITTER_MS` — random extra sleep before each join (default: 1500)
/// - `SESS_RESCAN_SEC` — session directory rescan interval (default: 20)
/// - `HEALTHCHECK_INTERVAL_SEC` — session liveness probe interval (default: 45)
/// - `INCLUDE_MEDIA` — mirror photos/documents (default: true)
/// - `MEDIA_MAX_MB` — skip media larger than this (default: 50)
/// - `TELEGRAM_ALERT_BOT_TOKEN` / `TELEGRAM_ALERT_CHAT_ID` / `TELEGRAM_ALERT_TOPIC_ID`
///   — outbound alert sink (unset = alerts disabled)
/// - `SESSIONS_DIR` / `SESSIONS_PENDING_DIR` — session file directories
/// - `STATE_PATH` — snapshot file (default: data/state.json)
/// - `LINK_HOST` — host used when building message links (default: t.me)
/// - `BOT_API_BASE` — base URL of the bot HTTP API
/// - `PLATFORM` — session driver ("memory" for the in-process driver)
#[derive(Debug, Clone)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub api_bearer: Option<String>,
    pub poll_tick_ms: u64,
    pub batch_max: usize,
    pub idle_jitter_ms: u64,
    pub join_interval_sec: u64,
    pub join_jitter_ms: u64,
    pub sess_rescan_sec: u64,
    pub healthcheck_interval_sec: u64,
    pub include_media: bool,
    pub media_max_bytes: u64,
    pub alert_bot_token: Option<String>,
    pub alert_chat_id: Option<String>,
    pub alert_topic_id: Option<i64>,
    pub sessions_dir: String,
    pub pending_dir: String,
    pub state_path: String,
    pub link_host: String,
    pub bot_api_base: String,
    pub platform: String,
    pub bind_host: Option<String>,
    pub bind_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            api_bearer: None,
            poll_tick_ms: 1500,
            batch_max: 50,
            idle_jitter_ms: 300,
            join_interval_sec: 180,
            join_jitter_ms: 1500,
            sess_rescan_sec: 20,
            healthcheck_interval_sec: 45,
            include_media: true,
            media_max_bytes: 50 * 1024 * 1024,
            alert_bot_token: None,
            alert_chat_id: None,
            alert_topic_id: None,
            sessions_dir: "sessions".to_string(),
            pending_dir: "sessions_pending".to_string(),
            state_path: "data/state.json".to_string(),
            link_host: "t.me".to_string(),
            bot_api_base: "https://api.telegram.org".to_string(),
            platform: "memory".to_string(),
            bind_host: None,
            bind_port: None,
        }
    }
}

impl Config {
    /// Create a new Config from environment variables, with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("API_ID")
            && let Ok(n) = val.parse::<i32>()
        {
            config.api_id = n;
        }
        if let Ok(val) = env::var("API_HASH") {
            config.api_hash = val;
        }
        if let Ok(val) = env::var("API_BEARER")
            && !val.is_empty()
        {
            config.api_bearer = Some(val);
        }
        if let Ok(val) = env::var("POLL_TICK_SEC")
            && let Ok(secs) = val.parse::<f64>()
        {
            config.poll_tick_ms = (secs * 1000.0).max(0.0) as u64;
        }
        if let Ok(val) = env::var("BATCH_MAX")
            && let Ok(n) = val.parse::<usize>()
        {
            config.batch_max = n.max(1);
        }
        if let Ok(val) = env::var("IDLE_JITTER_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.idle_jitter_ms = n;
        }
        if let Ok(val) = env::var("JOIN_INTERVAL_SEC")
            && let Ok(n) = val.parse::<u64>()
        {
            config.join_interval_sec = n;
        }
        if let Ok(val) = env::var("JOIN_JITTER_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.join_jitter_ms = n;
        }
        if let Ok(val) = env::var("SESS_RESCAN_SEC")
            && let Ok(n) = val.parse::<u64>()
        {
            config.sess_rescan_sec = n.max(1);
        }
        if let Ok(val) = env::var("HEALTHCHECK_INTERVAL_SEC")
            && let Ok(n) = val.parse::<u64>()
        {
            config.healthcheck_interval_sec = n.max(1);
        }
        if let Ok(val) = env::var("INCLUDE_MEDIA") {
            config.include_media = val != "0" && val.to_lowercase() != "false";
        }
        if let Ok(val) = env::var("MEDIA_MAX_MB")
            && let Ok(n) = val.parse::<u64>()
        {
            config.media_max_bytes = n * 1024 * 1024;
        }
        if let Ok(val) = env::var("TELEGRAM_ALERT_BOT_TOKEN")
            && !val.is_empty()
        {
            config.alert_bot_token = Some(val);
        }
        if let Ok(val) = env::var("TELEGRAM_ALERT_CHAT_ID")
            && !val.is_empty()
        {
            config.alert_chat_id = Some(val);
        }
        if let Ok(val) = env::var("TELEGRAM_ALERT_TOPIC_ID")
            && let Ok(n) = val.parse::<i64>()
        {
            config.alert_topic_id = Some(n);
        }
        if let Ok(val) = env::var("SESSIONS_DIR") {
            config.sessions_dir = val;
        }
        if let Ok(val) = env::var("SESSIONS_PENDING_DIR") {
            config.pending_dir = val;
        }
        if let Ok(val) = env::var("STATE_PATH") {
            config.state_path = val;
        }
        if let Ok(val) = env::var("LINK_HOST") {
            config.link_host = val;
        }
        if let Ok(val) = env::var("BOT_API_BASE") {
            config.bot_api_base = val;
        }
        if let Ok(val) = env::var("PLATFORM") {
            config.platform = val;
        }
        if let Ok(val) = env::var("BIND_HOST")
            && !val.is_empty()
        {
            config.bind_host = Some(val);
        }
        if let Ok(val) = env::var("BIND_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            config.bind_port = Some(port);
        }

        config
    }
}
