use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many publishes are kept per identity for introspection.
pub const RECENT_RING_LEN: usize = 10;

/// One source channel bound to one poll session. At most one per source.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Poller {
    pub source: String,
    pub poll_session: String,
    #[serde(default)]
    pub session_index: usize,
    pub created_at: String,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_failover_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostMode {
    User,
    Bot,
}

/// One mirror relation: source -> dest through a fixed post identity.
/// `last_ok_id` is the cursor: the highest source message id successfully
/// republished. It only moves forward, and only after a confirmed send.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Job {
    pub id: String,
    pub source: String,
    pub dest: String,
    pub post_mode: PostMode,
    #[serde(default)]
    pub post_session: Option<String>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub text_strip: String,
    #[serde(default)]
    pub caption_append: String,
    #[serde(default)]
    pub last_ok_id: i64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub paused_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Ring key for the job's post identity: session name for user mode,
    /// token fingerprint for bot mode.
    pub fn identity(&self) -> String {
        match self.post_mode {
            PostMode::User => self
                .post_session
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
            PostMode::Bot => bot_fingerprint(self.bot_token.as_deref().unwrap_or_default()),
        }
    }
}

/// One successful publish, kept in a bounded per-identity ring.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecentPost {
    pub source: String,
    pub dest: String,
    pub link: String,
    pub ts: String,
}

/// Session line in `/status` responses.
#[derive(Debug, Serialize, Clone)]
pub struct SessionView {
    pub name: String,
    pub index: usize,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// --- Request bodies ---

#[derive(Debug, Deserialize)]
pub struct AddJob {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub dest: String,
    #[serde(default)]
    pub post_mode: Option<PostMode>,
    #[serde(default)]
    pub post_session: Option<String>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub poll_session: Option<String>,
    #[serde(default)]
    pub text_strip: Option<String>,
    #[serde(default)]
    pub caption_append: Option<String>,
    /// `"all"` removes every job (and the poller) for `source`.
    #[serde(default)]
    pub delete: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionUpload {
    pub filename: String,
    pub data: String, // base64-encoded
}

#[derive(Debug, Deserialize)]
pub struct SessionName {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginStart {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginCode {
    pub login_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPassword {
    pub login_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginId {
    pub login_id: String,
}

// --- Identity helpers ---

/// Canonical form of a channel reference used as a map key: trimmed,
/// leading `@` dropped, lowercased.
pub fn normalize_channel(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

/// Stable job id over (source, dest, mode, identity). Sixteen hex chars is
/// plenty: collisions would need ~2^32 jobs.
pub fn job_id(source: &str, dest: &str, mode: PostMode, identity: &str) -> String {
    let tag = match mode {
        PostMode::User => "user",
        PostMode::Bot => "bot",
    };
    let mut hasher = Sha256::new();
    hasher.update(normalize_channel(source).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_channel(dest).as_bytes());
    hasher.update(b"|");
    hasher.update(tag.as_bytes());
    hasher.update(b"|");
    hasher.update(identity.to_lowercase().as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Opaque fingerprint of a bot token, safe to expose in `/status`.
pub fn bot_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Public link to a message. Username channels get `https://{host}/{name}/{id}`,
/// numeric `-100…` channels the `/c/{internal}/{id}` form.
pub fn message_link(host: &str, channel: &str, msg_id: i64) -> String {
    let chan = channel.trim();
    if let Some(stripped) = chan.strip_prefix("-100") {
        return format!("https://{host}/c/{stripped}/{msg_id}");
    }
    if chan.starts_with('-') || chan.chars().all(|c| c.is_ascii_digit()) {
        let internal = chan.trim_start_matches('-');
        return format!("https://{host}/c/{internal}/{msg_id}");
    }
    format!("https://{host}/{}/{msg_id}", chan.trim_start_matches('@'))
}

/// Prepend onto a bounded ring, newest first.
pub fn push_recent(ring: &mut Vec<RecentPost>, entry: RecentPost) {
    ring.insert(0, entry);
    ring.truncate(RECENT_RING_LEN);
}
