// =============================================================================
// Notification Channels — Telegram + Discord webhook
// =============================================================================
//
// Fire-and-forget text delivery.  Channels are constructed from environment
// variables; a missing variable just means that channel is absent.  Send
// failures are logged by the dispatcher and never propagate — alert-dedupe
// bookkeeping must not depend on a webhook being up.
// =============================================================================

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Result, WatchError};

/// A notification collaborator: deliver `text`, best-effort.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    /// Channel label for logs.
    fn channel(&self) -> &'static str;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("failed to build reqwest client")
}

// =============================================================================
// Telegram
// =============================================================================

/// Telegram Bot API `sendMessage` channel.
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            client: http_client(),
        }
    }

    /// Construct from `TELEGRAM_TOKEN` / `TELEGRAM_CHAT`; `None` when either
    /// is unset.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT").ok()?;
        Some(Self::new(token, chat_id))
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Notify(format!(
                "Telegram sendMessage returned {status}"
            )));
        }
        debug!("Telegram message delivered");
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "telegram"
    }
}

// =============================================================================
// Discord
// =============================================================================

/// Discord incoming-webhook channel.
pub struct DiscordNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: http_client(),
        }
    }

    /// Construct from `DISCORD_WEBHOOK`; `None` when unset.
    pub fn from_env() -> Option<Self> {
        let webhook_url = std::env::var("DISCORD_WEBHOOK").ok()?;
        Some(Self::new(webhook_url))
    }
}

#[async_trait]
impl Notify for DiscordNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({
                "username": "candlewatch",
                "content": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Notify(format!(
                "Discord webhook returned {status}"
            )));
        }
        debug!("Discord message delivered");
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "discord"
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Fan-out over every configured channel.  A failing channel is logged and
/// skipped; `broadcast` never fails.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notify>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notify>>) -> Self {
        Self { channels }
    }

    /// Collect whichever channels the environment configures.
    pub fn from_env() -> Self {
        let mut channels: Vec<Box<dyn Notify>> = Vec::new();
        if let Some(telegram) = TelegramNotifier::from_env() {
            channels.push(Box::new(telegram));
        }
        if let Some(discord) = DiscordNotifier::from_env() {
            channels.push(Box::new(discord));
        }
        Self::new(channels)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send `text` to every channel, best-effort.
    pub async fn broadcast(&self, text: &str) {
        for channel in &self.channels {
            if let Err(e) = channel.send(text).await {
                warn!(channel = channel.channel(), error = %e, "notification send failed");
            }
        }
    }
}
