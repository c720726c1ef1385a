use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::adapters::{setting_id, setting_str, AdapterError, Platform, PushAdapter};
use crate::models::{OutgoingRequest, SendParams};
use crate::transport::{classify_response, Transport};

const SUCCESS_MARKER: &str = r#""ok":true"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramTextConfig {
    pub token: String,
    pub chat_id: String,
    pub api_base_url: String,
}

impl TelegramTextConfig {
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self, AdapterError> {
        let config = Self {
            token: setting_str(settings, "Token"),
            chat_id: setting_id(settings, "ChatID"),
            api_base_url: setting_str(settings, "APIBaseURL"),
        };
        if config.token.is_empty() || config.chat_id.is_empty() || config.api_base_url.is_empty()
        {
            return Err(AdapterError::MissingConfig("Token, ChatID, APIBaseURL"));
        }
        Ok(config)
    }
}

/// Bot API `sendMessage`.
#[derive(Debug)]
pub struct TelegramTextAdapter;

impl TelegramTextAdapter {
    pub fn build_request(config: &TelegramTextConfig, params: &SendParams) -> OutgoingRequest {
        OutgoingRequest {
            url: format!("{}/bot{}/sendMessage", config.api_base_url, config.token),
            body: json!({
                "chat_id": config.chat_id,
                "text": params.msg
            }),
        }
    }
}

#[async_trait]
impl PushAdapter for TelegramTextAdapter {
    fn platform(&self) -> Platform {
        Platform::TelegramText
    }

    async fn send(
        &self,
        transport: &Transport,
        route: &str,
        settings: &Map<String, Value>,
        params: &SendParams,
    ) -> Result<(), AdapterError> {
        let config = TelegramTextConfig::from_settings(settings)?;
        if params.msg.is_empty() {
            return Err(AdapterError::MissingMessage);
        }

        let request = Self::build_request(&config, params);
        let body = transport.post(&request).await?;
        classify_response(route, self.platform().label(), body, SUCCESS_MARKER)
    }
}
