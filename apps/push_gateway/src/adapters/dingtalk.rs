use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::adapters::{setting_str, AdapterError, Platform, PushAdapter};
use crate::models::{OutgoingRequest, SendParams};
use crate::transport::{classify_response, Transport};

const SUCCESS_MARKER: &str = r#""errcode":0"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DingTalkTextConfig {
    pub access_token: String,
    pub api_base_url: String,
}

impl DingTalkTextConfig {
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self, AdapterError> {
        let config = Self {
            access_token: setting_str(settings, "AccessToken"),
            api_base_url: setting_str(settings, "APIBaseURL"),
        };
        if config.access_token.is_empty() || config.api_base_url.is_empty() {
            return Err(AdapterError::MissingConfig("AccessToken, APIBaseURL"));
        }
        Ok(config)
    }
}

/// Custom-robot text message: `POST {base}?access_token={token}`.
#[derive(Debug)]
pub struct DingTalkTextAdapter;

impl DingTalkTextAdapter {
    pub fn build_request(config: &DingTalkTextConfig, params: &SendParams) -> OutgoingRequest {
        OutgoingRequest {
            url: format!("{}?access_token={}", config.api_base_url, config.access_token),
            body: json!({
                "msgtype": "text",
                "text": { "content": params.msg }
            }),
        }
    }
}

#[async_trait]
impl PushAdapter for DingTalkTextAdapter {
    fn platform(&self) -> Platform {
        Platform::DingTalkText
    }

    async fn send(
        &self,
        transport: &Transport,
        route: &str,
        settings: &Map<String, Value>,
        params: &SendParams,
    ) -> Result<(), AdapterError> {
        let config = DingTalkTextConfig::from_settings(settings)?;
        if params.msg.is_empty() {
            return Err(AdapterError::MissingMessage);
        }

        let request = Self::build_request(&config, params);
        let body = transport.post(&request).await?;
        classify_response(route, self.platform().label(), body, SUCCESS_MARKER)
    }
}
