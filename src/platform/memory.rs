// In-process platform driver. Channels, posts, albums, accounts, bot
// tokens and login codes all live in one shared hub behind a mutex, so a
// whole mirror deployment can run inside a single process. The test suite
// drives the engine through this driver; `PLATFORM=memory` selects it for
// local development.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    BotSender, ChannelInfo, Connector, Gateway, LoginFlow, LoginStep, MediaBlob, MediaKind,
    MediaRef, PlatformError, Post,
};
use crate::models::{bot_fingerprint, normalize_channel};

/// The code every in-process login expects.
pub const LOGIN_CODE: &str = "11111";

/// One message delivered into a destination channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub sender: String,
    pub text: String,
    pub formatted: Option<String>,
    pub media_filename: Option<String>,
}

#[derive(Default)]
struct Account {
    display: String,
    revoked: bool,
    deactivated: bool,
    connected: bool,
}

struct Channel {
    id: i64,
    username: Option<String>,
    title: String,
    private: bool,
    admin_required: bool,
    fail_sends: bool,
    fail_downloads: bool,
    next_msg_id: i64,
    next_group_id: i64,
    posts: Vec<Post>,
    members: HashSet<String>,
    deliveries: Vec<Delivery>,
}

impl Channel {
    fn new(id: i64, username: Option<String>, title: String) -> Self {
        Self {
            id,
            username,
            title,
            private: false,
            admin_required: false,
            fail_sends: false,
            fail_downloads: false,
            next_msg_id: 1,
            next_group_id: 1,
            posts: Vec::new(),
            members: HashSet::new(),
            deliveries: Vec::new(),
        }
    }

    fn readable_by(&self, account: &str) -> Result<(), PlatformError> {
        if self.members.contains(account) {
            return Ok(());
        }
        if self.private {
            return Err(PlatformError::ChannelPrivate);
        }
        if self.admin_required {
            return Err(PlatformError::AdminRequired);
        }
        Ok(())
    }
}

#[derive(Default)]
struct Hub {
    channels: HashMap<String, Channel>,
    accounts: HashMap<String, Account>,
    bots: HashSet<String>,
    passwords: HashMap<String, String>,
    next_chan_id: i64,
}

impl Hub {
    fn ensure_live(&self, account: &str) -> Result<(), PlatformError> {
        let acct = self
            .accounts
            .get(account)
            .ok_or_else(|| PlatformError::Transport(format!("unknown account {account}")))?;
        if acct.revoked {
            return Err(PlatformError::AuthRevoked);
        }
        if acct.deactivated {
            return Err(PlatformError::Deactivated);
        }
        if !acct.connected {
            return Err(PlatformError::Transport("connection lost".to_string()));
        }
        Ok(())
    }

    fn chan(&self, reference: &str) -> Result<&Channel, PlatformError> {
        self.channels
            .get(&normalize_channel(reference))
            .ok_or_else(|| PlatformError::NotFound(reference.to_string()))
    }

    fn chan_mut(&mut self, reference: &str) -> Result<&mut Channel, PlatformError> {
        self.channels
            .get_mut(&normalize_channel(reference))
            .ok_or_else(|| PlatformError::NotFound(reference.to_string()))
    }
}

pub struct MemoryHub {
    inner: Mutex<Hub>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Hub::default()),
        })
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector { hub: self.clone() })
    }

    pub fn bot_sender(self: &Arc<Self>) -> Arc<dyn BotSender> {
        Arc::new(MemoryBot { hub: self.clone() })
    }

    // --- channel setup ---

    pub fn create_channel(&self, reference: &str) {
        let mut hub = self.inner.lock().unwrap();
        let key = normalize_channel(reference);
        let (id, username) = if let Some(stripped) = key.strip_prefix("-100") {
            (format!("-100{stripped}").parse().unwrap_or(-1), None)
        } else {
            hub.next_chan_id += 1;
            (-1_000_000_000 - hub.next_chan_id, Some(key.clone()))
        };
        hub.channels
            .entry(key.clone())
            .or_insert_with(|| Channel::new(id, username, key));
    }

    pub fn set_private(&self, reference: &str, private: bool) {
        if let Ok(chan) = self.inner.lock().unwrap().chan_mut(reference) {
            chan.private = private;
        }
    }

    pub fn set_admin_required(&self, reference: &str, required: bool) {
        if let Ok(chan) = self.inner.lock().unwrap().chan_mut(reference) {
            chan.admin_required = required;
        }
    }

    /// Remove an account from a channel's member set.
    pub fn kick(&self, reference: &str, account: &str) {
        if let Ok(chan) = self.inner.lock().unwrap().chan_mut(reference) {
            chan.members.remove(&account.to_lowercase());
        }
    }

    pub fn set_fail_sends(&self, reference: &str, fail: bool) {
        if let Ok(chan) = self.inner.lock().unwrap().chan_mut(reference) {
            chan.fail_sends = fail;
        }
    }

    pub fn set_fail_downloads(&self, reference: &str, fail: bool) {
        if let Ok(chan) = self.inner.lock().unwrap().chan_mut(reference) {
            chan.fail_downloads = fail;
        }
    }

    // --- source content ---

    pub fn post_text(&self, reference: &str, text: &str) -> i64 {
        self.push_post(reference, text, None, None)
    }

    pub fn post_formatted(&self, reference: &str, text: &str, markup: &str) -> i64 {
        self.push_post(reference, text, Some(markup.to_string()), None)
    }

    pub fn post_photo(&self, reference: &str, text: &str, size: u64) -> i64 {
        let media = MediaRef {
            kind: MediaKind::Photo,
            size,
            file_ref: format!("photo-{size}"),
        };
        self.push_post(reference, text, None, Some(media))
    }

    pub fn post_document(&self, reference: &str, text: &str, mime: &str, size: u64) -> i64 {
        let media = MediaRef {
            kind: MediaKind::Document {
                mime: mime.to_string(),
            },
            size,
            file_ref: format!("doc-{size}"),
        };
        self.push_post(reference, text, None, Some(media))
    }

    /// Post several messages sharing one grouped id. Returns the member ids.
    pub fn post_album(&self, reference: &str, texts: &[&str]) -> Vec<i64> {
        let mut hub = self.inner.lock().unwrap();
        let Ok(chan) = hub.chan_mut(reference) else {
            return Vec::new();
        };
        chan.next_group_id += 1;
        let group = chan.next_group_id;
        texts
            .iter()
            .map(|text| {
                let id = chan.next_msg_id;
                chan.next_msg_id += 1;
                chan.posts.push(Post {
                    id,
                    text: text.to_string(),
                    formatted: None,
                    grouped_id: Some(group),
                    media: None,
                });
                id
            })
            .collect()
    }

    fn push_post(
        &self,
        reference: &str,
        text: &str,
        formatted: Option<String>,
        media: Option<MediaRef>,
    ) -> i64 {
        let mut hub = self.inner.lock().unwrap();
        let Ok(chan) = hub.chan_mut(reference) else {
            return 0;
        };
        let id = chan.next_msg_id;
        chan.next_msg_id += 1;
        chan.posts.push(Post {
            id,
            text: text.to_string(),
            formatted,
            grouped_id: None,
            media,
        });
        id
    }

    /// What has been delivered *into* a channel via send calls.
    pub fn deliveries(&self, reference: &str) -> Vec<Delivery> {
        self.inner
            .lock()
            .unwrap()
            .chan(reference)
            .map(|c| c.deliveries.clone())
            .unwrap_or_default()
    }

    // --- account control ---

    pub fn register_bot(&self, token: &str) {
        self.inner.lock().unwrap().bots.insert(token.to_string());
    }

    pub fn set_password(&self, phone: &str, password: &str) {
        self.inner
            .lock()
            .unwrap()
            .passwords
            .insert(phone.to_string(), password.to_string());
    }

    pub fn revoke(&self, account: &str) {
        self.with_account(account, |a| a.revoked = true);
    }

    pub fn deactivate(&self, account: &str) {
        self.with_account(account, |a| a.deactivated = true);
    }

    /// Drop the account's connection: every call fails until `revive`.
    pub fn kill(&self, account: &str) {
        self.with_account(account, |a| a.connected = false);
    }

    pub fn revive(&self, account: &str) {
        self.with_account(account, |a| a.connected = true);
    }

    fn with_account(&self, account: &str, f: impl FnOnce(&mut Account)) {
        let mut hub = self.inner.lock().unwrap();
        let entry = hub
            .accounts
            .entry(account.to_lowercase())
            .or_insert_with(|| Account {
                display: account.to_string(),
                connected: true,
                ..Account::default()
            });
        f(entry);
    }
}

// --- Gateway ---

struct MemoryGateway {
    hub: Arc<MemoryHub>,
    account: String,
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn check_authorized(&self) -> Result<bool, PlatformError> {
        self.hub.inner.lock().unwrap().ensure_live(&self.account)?;
        Ok(true)
    }

    async fn display_name(&self) -> Option<String> {
        let hub = self.hub.inner.lock().unwrap();
        hub.accounts.get(&self.account).map(|a| a.display.clone())
    }

    async fn resolve(&self, channel: &str) -> Result<ChannelInfo, PlatformError> {
        let hub = self.hub.inner.lock().unwrap();
        hub.ensure_live(&self.account)?;
        let chan = hub.chan(channel)?;
        Ok(ChannelInfo {
            id: chan.id,
            username: chan.username.clone(),
            title: chan.title.clone(),
        })
    }

    async fn join(&self, channel: &str) -> Result<(), PlatformError> {
        let mut hub = self.hub.inner.lock().unwrap();
        hub.ensure_live(&self.account)?;
        let account = self.account.clone();
        let chan = hub.chan_mut(channel)?;
        if chan.members.contains(&account) {
            return Ok(());
        }
        if chan.private {
            return Err(PlatformError::ChannelPrivate);
        }
        if chan.admin_required {
            return Err(PlatformError::AdminRequired);
        }
        chan.members.insert(account);
        Ok(())
    }

    async fn latest_message_id(&self, channel: &str) -> Result<i64, PlatformError> {
        let hub = self.hub.inner.lock().unwrap();
        hub.ensure_live(&self.account)?;
        let chan = hub.chan(channel)?;
        chan.readable_by(&self.account)?;
        Ok(chan.posts.last().map(|p| p.id).unwrap_or(0))
    }

    async fn messages_after(
        &self,
        channel: &str,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let hub = self.hub.inner.lock().unwrap();
        hub.ensure_live(&self.account)?;
        let chan = hub.chan(channel)?;
        chan.readable_by(&self.account)?;
        Ok(chan
            .posts
            .iter()
            .filter(|p| p.id > min_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download_media(
        &self,
        channel: &str,
        post: &Post,
    ) -> Result<MediaBlob, PlatformError> {
        let hub = self.hub.inner.lock().unwrap();
        hub.ensure_live(&self.account)?;
        let chan = hub.chan(channel)?;
        if chan.fail_downloads {
            return Err(PlatformError::Transport("download failed".to_string()));
        }
        let media = post
            .media
            .as_ref()
            .ok_or_else(|| PlatformError::NotFound("no media".to_string()))?;
        let (filename, mime, photo) = match &media.kind {
            MediaKind::Photo => ("photo.jpg".to_string(), "image/jpeg".to_string(), true),
            MediaKind::Document { mime } => ("document.bin".to_string(), mime.clone(), false),
        };
        Ok(MediaBlob {
            bytes: vec![0xAB; media.size as usize],
            filename,
            mime,
            photo,
        })
    }

    async fn send_text(
        &self,
        channel: &str,
        text: &str,
        formatted: Option<&str>,
    ) -> Result<i64, PlatformError> {
        deliver(
            &self.hub,
            &self.account,
            channel,
            text,
            formatted.map(|s| s.to_string()),
            None,
        )
    }

    async fn send_media(
        &self,
        channel: &str,
        blob: &MediaBlob,
        caption: &str,
    ) -> Result<i64, PlatformError> {
        deliver(
            &self.hub,
            &self.account,
            channel,
            caption,
            None,
            Some(blob.filename.clone()),
        )
    }

    async fn disconnect(&self) {}
}

fn deliver(
    hub: &Arc<MemoryHub>,
    account: &str,
    channel: &str,
    text: &str,
    formatted: Option<String>,
    media_filename: Option<String>,
) -> Result<i64, PlatformError> {
    let mut hub = hub.inner.lock().unwrap();
    hub.ensure_live(account)?;
    let sender = account.to_string();
    let chan = hub.chan_mut(channel)?;
    if chan.fail_sends {
        return Err(PlatformError::Transport("send failed".to_string()));
    }
    let id = chan.next_msg_id;
    chan.next_msg_id += 1;
    chan.deliveries.push(Delivery {
        id,
        sender,
        text: text.to_string(),
        formatted,
        media_filename,
    });
    Ok(id)
}

// --- Connector + login flow ---

struct MemoryConnector {
    hub: Arc<MemoryHub>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<Arc<dyn Gateway>, PlatformError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PlatformError::Transport(format!("cannot read session file: {e}")))?;
        let account = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v["account"].as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| name.to_string())
            .to_lowercase();
        // First sight of an account registers it as alive; later revoke /
        // kill calls flip its state.
        {
            let mut hub = self.hub.inner.lock().unwrap();
            hub.accounts.entry(account.clone()).or_insert_with(|| Account {
                display: account.clone(),
                connected: true,
                ..Account::default()
            });
        }
        Ok(Arc::new(MemoryGateway {
            hub: self.hub.clone(),
            account,
        }))
    }

    async fn begin_login(
        &self,
        phone: &str,
        pending_file: &Path,
    ) -> Result<Box<dyn LoginFlow>, PlatformError> {
        Ok(Box::new(MemoryLogin {
            hub: self.hub.clone(),
            phone: phone.to_string(),
            pending: pending_file.to_path_buf(),
            password_pending: Mutex::new(false),
        }))
    }
}

struct MemoryLogin {
    hub: Arc<MemoryHub>,
    phone: String,
    pending: PathBuf,
    password_pending: Mutex<bool>,
}

impl MemoryLogin {
    fn finish(&self) -> Result<LoginStep, PlatformError> {
        let name = self
            .pending
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("account")
            .to_string();
        let body = serde_json::json!({ "account": name }).to_string();
        std::fs::write(&self.pending, body)
            .map_err(|e| PlatformError::Transport(format!("cannot write session file: {e}")))?;
        Ok(LoginStep::Authorized)
    }
}

#[async_trait]
impl LoginFlow for MemoryLogin {
    async fn submit_code(&self, code: &str) -> Result<LoginStep, PlatformError> {
        if code != LOGIN_CODE {
            return Err(PlatformError::Login("code invalid".to_string()));
        }
        let needs_password = self
            .hub
            .inner
            .lock()
            .unwrap()
            .passwords
            .contains_key(&self.phone);
        if needs_password {
            *self.password_pending.lock().unwrap() = true;
            return Ok(LoginStep::PasswordNeeded);
        }
        self.finish()
    }

    async fn submit_password(&self, password: &str) -> Result<LoginStep, PlatformError> {
        if !*self.password_pending.lock().unwrap() {
            return Err(PlatformError::Login("password not requested".to_string()));
        }
        let expected = self
            .hub
            .inner
            .lock()
            .unwrap()
            .passwords
            .get(&self.phone)
            .cloned();
        if expected.as_deref() != Some(password) {
            return Err(PlatformError::Login("password invalid".to_string()));
        }
        self.finish()
    }

    async fn resend(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn cancel(&self) {}
}

// --- Bot transport ---

struct MemoryBot {
    hub: Arc<MemoryHub>,
}

#[async_trait]
impl BotSender for MemoryBot {
    async fn check(&self, token: &str) -> Result<(), PlatformError> {
        if self.hub.inner.lock().unwrap().bots.contains(token) {
            Ok(())
        } else {
            Err(PlatformError::AuthRevoked)
        }
    }

    async fn send_text(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        formatted: Option<&str>,
    ) -> Result<i64, PlatformError> {
        self.check(token).await?;
        let sender = format!("bot:{}", bot_fingerprint(token));
        deliver_as_bot(
            &self.hub,
            &sender,
            channel,
            text,
            formatted.map(|s| s.to_string()),
            None,
        )
    }

    async fn send_media(
        &self,
        token: &str,
        channel: &str,
        blob: &MediaBlob,
        caption: &str,
    ) -> Result<i64, PlatformError> {
        self.check(token).await?;
        let sender = format!("bot:{}", bot_fingerprint(token));
        deliver_as_bot(
            &self.hub,
            &sender,
            channel,
            caption,
            None,
            Some(blob.filename.clone()),
        )
    }
}

fn deliver_as_bot(
    hub: &Arc<MemoryHub>,
    sender: &str,
    channel: &str,
    text: &str,
    formatted: Option<String>,
    media_filename: Option<String>,
) -> Result<i64, PlatformError> {
    let mut inner = hub.inner.lock().unwrap();
    let chan = inner.chan_mut(channel)?;
    if chan.fail_sends {
        return Err(PlatformError::Transport("send failed".to_string()));
    }
    let id = chan.next_msg_id;
    chan.next_msg_id += 1;
    chan.deliveries.push(Delivery {
        id,
        sender: sender.to_string(),
        text: text.to_string(),
        formatted,
        media_filename,
    });
    Ok(id)
}
