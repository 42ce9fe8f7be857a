// Platform boundary. Everything the engine knows about the messaging
// platform goes through these traits; drivers live in submodules.
//
// `bot` is the token-based HTTP posting transport. `memory` is an
// in-process driver used by the test suite and for local development;
// MTProto-style user-session drivers plug in behind `Connector` the same
// way.

pub mod bot;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Server-directed sleep; honored verbatim by the caller.
    #[error("flood wait {0}s")]
    FloodWait(u64),
    #[error("channel is private")]
    ChannelPrivate,
    #[error("admin rights required")]
    AdminRequired,
    #[error("auth key revoked")]
    AuthRevoked,
    #[error("account deactivated")]
    Deactivated,
    #[error("not authorized")]
    NotAuthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("login failed: {0}")]
    Login(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    /// Errors that permanently kill a session. No reconnect will fix these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthRevoked | Self::Deactivated)
    }

    /// Channel-access errors: the channel exists but this identity cannot
    /// read or join it. Left pending until an operator intervenes.
    pub fn is_access(&self) -> bool {
        matches!(self, Self::ChannelPrivate | Self::AdminRequired)
    }
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: i64,
    pub username: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document { mime: String },
}

/// Reference to a media payload still sitting on the platform. Bytes are
/// only pulled when a job actually republishes the message.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub size: u64,
    pub file_ref: String,
}

/// One source message as fetched by a poll session.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub text: String,
    /// Platform-native markup, present only when the message carries
    /// formatting entities.
    pub formatted: Option<String>,
    /// Album membership: messages sharing a grouped id form one unit.
    pub grouped_id: Option<i64>,
    pub media: Option<MediaRef>,
}

/// Downloaded media, held in memory between download and re-upload.
#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: String,
    pub photo: bool,
}

/// One authenticated session's client handle.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn check_authorized(&self) -> Result<bool, PlatformError>;
    async fn display_name(&self) -> Option<String>;
    async fn resolve(&self, channel: &str) -> Result<ChannelInfo, PlatformError>;
    async fn join(&self, channel: &str) -> Result<(), PlatformError>;
    async fn latest_message_id(&self, channel: &str) -> Result<i64, PlatformError>;
    /// Messages with id strictly greater than `min_id`, ascending, at most
    /// `limit` of them.
    async fn messages_after(
        &self,
        channel: &str,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError>;
    async fn download_media(
        &self,
        channel: &str,
        post: &Post,
    ) -> Result<MediaBlob, PlatformError>;
    /// Returns the id of the message created in `channel`.
    async fn send_text(
        &self,
        channel: &str,
        text: &str,
        formatted: Option<&str>,
    ) -> Result<i64, PlatformError>;
    async fn send_media(
        &self,
        channel: &str,
        blob: &MediaBlob,
        caption: &str,
    ) -> Result<i64, PlatformError>;
    async fn disconnect(&self);
}

/// Where an interactive login currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    CodeSent,
    PasswordNeeded,
    /// The credential file has been written to its pending path.
    Authorized,
}

#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn submit_code(&self, code: &str) -> Result<LoginStep, PlatformError>;
    async fn submit_password(&self, password: &str) -> Result<LoginStep, PlatformError>;
    async fn resend(&self) -> Result<(), PlatformError>;
    async fn cancel(&self);
}

/// Session factory: turns credential files into live gateways, and drives
/// the interactive login that produces new credential files.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, name: &str, path: &Path)
        -> Result<Arc<dyn Gateway>, PlatformError>;
    async fn begin_login(
        &self,
        phone: &str,
        pending_file: &Path,
    ) -> Result<Box<dyn LoginFlow>, PlatformError>;
}

/// Token-based posting transport (the bot side of a job).
#[async_trait]
pub trait BotSender: Send + Sync {
    async fn check(&self, token: &str) -> Result<(), PlatformError>;
    async fn send_text(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        formatted: Option<&str>,
    ) -> Result<i64, PlatformError>;
    async fn send_media(
        &self,
        token: &str,
        channel: &str,
        blob: &MediaBlob,
        caption: &str,
    ) -> Result<i64, PlatformError>;
}

/// Pick the session driver and bot transport for this process.
pub fn driver(config: &Config) -> (Arc<dyn Connector>, Arc<dyn BotSender>) {
    match config.platform.as_str() {
        "memory" => {
            let hub = memory::MemoryHub::new();
            (hub.connector(), hub.bot_sender())
        }
        other => {
            eprintln!(
                "⚠️  no built-in session driver named '{other}'; using the in-process driver \
                 for sessions (bot posting goes over HTTP)"
            );
            let hub = memory::MemoryHub::new();
            (
                hub.connector(),
                Arc::new(bot::HttpBot::new(&config.bot_api_base)),
            )
        }
    }
}
