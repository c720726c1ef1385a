mod dingtalk;
mod telegram;
mod wecom_mpnews;
mod wecom_robot;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use dingtalk::DingTalkTextAdapter;
pub use telegram::TelegramTextAdapter;
pub use wecom_mpnews::WecomMpnewsAdapter;
pub use wecom_robot::WecomRobotTextAdapter;

use crate::models::SendParams;
use crate::transport::Transport;

/// Platforms a route can declare in its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    DingTalkText,
    TelegramText,
    WecomMpnews,
    WecomRobotText,
}

impl Platform {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "dingtalk_text" => Some(Self::DingTalkText),
            "telegram_text" => Some(Self::TelegramText),
            "wecom_mpnews" => Some(Self::WecomMpnews),
            "wecom_robot_text" => Some(Self::WecomRobotText),
            _ => None,
        }
    }

    /// Human-readable name used in response logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::DingTalkText => "钉钉文本",
            Self::TelegramText => "Telegram文本",
            Self::WecomMpnews => "企业微信图文",
            Self::WecomRobotText => "企业微信群机器人文本",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
    #[error("missing message content")]
    MissingMessage,
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to get access token: {0}")]
    Token(String),
    #[error("{0}")]
    Upstream(String),
}

/// One outbound messaging platform.
#[async_trait]
pub trait PushAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Sends one message. `Ok(())` only when the platform acknowledged it.
    async fn send(
        &self,
        transport: &Transport,
        route: &str,
        settings: &Map<String, Value>,
        params: &SendParams,
    ) -> Result<(), AdapterError>;
}

pub fn push_adapter(kind: &str) -> Option<Box<dyn PushAdapter>> {
    match Platform::from_kind(kind)? {
        Platform::DingTalkText => Some(Box::new(DingTalkTextAdapter)),
        Platform::TelegramText => Some(Box::new(TelegramTextAdapter)),
        Platform::WecomMpnews => Some(Box::new(WecomMpnewsAdapter)),
        Platform::WecomRobotText => Some(Box::new(WecomRobotTextAdapter)),
    }
}

/// String setting; absent or non-string values read as empty.
fn setting_str(settings: &Map<String, Value>, key: &str) -> String {
    settings
        .get(key)
        .and_then(|value| value.as_str())
        .unwrap_or("")
        .to_string()
}

/// Identifier setting that may be written as a JSON string or number.
fn setting_id(settings: &Map<String, Value>, key: &str) -> String {
    match settings.get(key) {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}
