use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::adapters::{setting_str, AdapterError, Platform, PushAdapter};
use crate::models::{OutgoingRequest, SendParams};
use crate::transport::{classify_response, Transport};

const SUCCESS_MARKER: &str = r#""errcode":0"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WecomRobotTextConfig {
    pub api_base_url: String,
    pub keys: Vec<String>,
}

impl WecomRobotTextConfig {
    /// Non-string or empty entries in `Keys` are dropped.
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self, AdapterError> {
        let keys: Vec<String> = settings
            .get("Keys")
            .and_then(|value| value.as_array())
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| key.as_str())
                    .filter(|key| !key.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let config = Self {
            api_base_url: setting_str(settings, "APIBaseURL"),
            keys,
        };
        if config.api_base_url.is_empty() || config.keys.is_empty() {
            return Err(AdapterError::MissingConfig("APIBaseURL, Keys"));
        }
        Ok(config)
    }

    /// Picks one webhook key uniformly at random.
    pub fn pick_key(&self) -> &str {
        let index = rand::rng().random_range(0..self.keys.len());
        &self.keys[index]
    }
}

/// Group robot webhook, spreading sends over the configured keys.
#[derive(Debug)]
pub struct WecomRobotTextAdapter;

impl WecomRobotTextAdapter {
    pub fn build_request(api_base_url: &str, key: &str, params: &SendParams) -> OutgoingRequest {
        OutgoingRequest {
            url: format!("{}/cgi-bin/webhook/send?key={}", api_base_url, key),
            body: json!({
                "msgtype": "text",
                "text": { "content": params.msg }
            }),
        }
    }
}

#[async_trait]
impl PushAdapter for WecomRobotTextAdapter {
    fn platform(&self) -> Platform {
        Platform::WecomRobotText
    }

    async fn send(
        &self,
        transport: &Transport,
        route: &str,
        settings: &Map<String, Value>,
        params: &SendParams,
    ) -> Result<(), AdapterError> {
        let config = WecomRobotTextConfig::from_settings(settings)?;
        if params.msg.is_empty() {
            return Err(AdapterError::MissingMessage);
        }

        let request = Self::build_request(&config.api_base_url, config.pick_key(), params);
        let body = transport.post(&request).await?;
        classify_response(route, self.platform().label(), body, SUCCESS_MARKER)
    }
}
