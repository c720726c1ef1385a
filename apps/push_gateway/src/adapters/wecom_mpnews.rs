use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapters::{setting_id, setting_str, AdapterError, Platform, PushAdapter};
use crate::models::{OutgoingRequest, SendParams};
use crate::transport::{classify_response, Transport};
use crate::utils::format::html_line_breaks;

const SUCCESS_MARKER: &str = r#""errcode":0"#;
const FALLBACK_TITLE: &str = "新提醒";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WecomMpnewsConfig {
    pub api_base_url: String,
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: String,
    pub thumb_media_id: String,
    pub author: String,
    pub default_title: String,
}

impl WecomMpnewsConfig {
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self, AdapterError> {
        let config = Self {
            api_base_url: setting_str(settings, "APIBaseURL"),
            corp_id: setting_str(settings, "CorpID"),
            corp_secret: setting_str(settings, "CorpSecret"),
            agent_id: setting_id(settings, "AgentID"),
            thumb_media_id: setting_str(settings, "ThumbMediaID"),
            author: setting_str(settings, "Author"),
            default_title: setting_str(settings, "DefaultTitle"),
        };
        if config.api_base_url.is_empty()
            || config.corp_id.is_empty()
            || config.corp_secret.is_empty()
            || config.agent_id.is_empty()
        {
            return Err(AdapterError::MissingConfig(
                "APIBaseURL, CorpID, CorpSecret, AgentID",
            ));
        }
        Ok(config)
    }

    /// Request title, then `DefaultTitle`, then a fixed fallback.
    fn resolve_title<'a>(&'a self, params: &'a SendParams) -> &'a str {
        if !params.title.is_empty() {
            &params.title
        } else if !self.default_title.is_empty() {
            &self.default_title
        } else {
            FALLBACK_TITLE
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Application message of type `mpnews`, sent to `@all`.
///
/// Needs an access token first, so every send makes two calls: `gettoken`
/// and then `message/send`.
#[derive(Debug)]
pub struct WecomMpnewsAdapter;

impl WecomMpnewsAdapter {
    pub fn token_url(config: &WecomMpnewsConfig) -> String {
        format!(
            "{}/cgi-bin/gettoken?corpid={}&corpsecret={}",
            config.api_base_url, config.corp_id, config.corp_secret
        )
    }

    /// The article body gets HTML line breaks; the digest keeps the raw text.
    pub fn build_request(
        config: &WecomMpnewsConfig,
        access_token: &str,
        params: &SendParams,
    ) -> OutgoingRequest {
        OutgoingRequest {
            url: format!(
                "{}/cgi-bin/message/send?access_token={}",
                config.api_base_url, access_token
            ),
            body: json!({
                "agentid": config.agent_id,
                "mpnews": {
                    "articles": [{
                        "author": config.author,
                        "content": html_line_breaks(&params.msg),
                        "digest": params.msg,
                        "thumb_media_id": config.thumb_media_id,
                        "title": config.resolve_title(params),
                    }]
                },
                "msgtype": "mpnews",
                "touser": "@all"
            }),
        }
    }

    async fn access_token(
        transport: &Transport,
        config: &WecomMpnewsConfig,
    ) -> Result<String, AdapterError> {
        let (_, body) = transport.get(&Self::token_url(config)).await?;
        let response: AccessTokenResponse = serde_json::from_str(&body)
            .map_err(|err| AdapterError::Token(format!("invalid response {body}: {err}")))?;
        if response.errcode != 0 {
            return Err(AdapterError::Token(response.errmsg));
        }
        Ok(response.access_token)
    }
}

#[async_trait]
impl PushAdapter for WecomMpnewsAdapter {
    fn platform(&self) -> Platform {
        Platform::WecomMpnews
    }

    async fn send(
        &self,
        transport: &Transport,
        route: &str,
        settings: &Map<String, Value>,
        params: &SendParams,
    ) -> Result<(), AdapterError> {
        let config = WecomMpnewsConfig::from_settings(settings)?;
        if params.msg.is_empty() {
            return Err(AdapterError::MissingMessage);
        }

        let access_token = Self::access_token(transport, &config).await?;
        let request = Self::build_request(&config, &access_token, params);
        let body = transport.post(&request).await?;
        classify_response(route, self.platform().label(), body, SUCCESS_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(base: &str) -> Map<String, Value> {
        json!({
            "APIBaseURL": base,
            "CorpID": "corp",
            "CorpSecret": "secret",
            "AgentID": 1000002,
            "ThumbMediaID": "media-1",
            "Author": "ops-bot"
        })
        .as_object()
        .cloned()
        .expect("object")
    }

    #[test]
    fn mpnews_article_converts_content_but_not_digest() {
        let config = WecomMpnewsConfig::from_settings(&settings("https://qyapi")).expect("config");
        let request =
            WecomMpnewsAdapter::build_request(&config, "TOKEN", &SendParams::new("a\nb\r\nc", "Alert"));

        assert_eq!(
            request.url,
            "https://qyapi/cgi-bin/message/send?access_token=TOKEN"
        );
        assert_eq!(request.body["touser"], "@all");
        assert_eq!(request.body["msgtype"], "mpnews");
        assert_eq!(request.body["agentid"], "1000002");

        let article = &request.body["mpnews"]["articles"][0];
        assert_eq!(article["content"], "a<br>b<br>c");
        assert_eq!(article["digest"], "a\nb\r\nc");
        assert_eq!(article["title"], "Alert");
        assert_eq!(article["thumb_media_id"], "media-1");
        assert_eq!(article["author"], "ops-bot");
    }

    #[test]
    fn mpnews_title_falls_back() {
        let mut raw = settings("https://qyapi");
        let config = WecomMpnewsConfig::from_settings(&raw).expect("config");
        let request = WecomMpnewsAdapter::build_request(&config, "T", &SendParams::new("x", ""));
        assert_eq!(request.body["mpnews"]["articles"][0]["title"], "新提醒");

        raw.insert("DefaultTitle".to_string(), json!("Nightly"));
        let config = WecomMpnewsConfig::from_settings(&raw).expect("config");
        let request = WecomMpnewsAdapter::build_request(&config, "T", &SendParams::new("x", ""));
        assert_eq!(request.body["mpnews"]["articles"][0]["title"], "Nightly");
    }

    #[test]
    fn mpnews_config_requires_corp_credentials() {
        let mut raw = settings("https://qyapi");
        raw.remove("CorpSecret");
        assert!(matches!(
            WecomMpnewsConfig::from_settings(&raw),
            Err(AdapterError::MissingConfig(_))
        ));
    }

    #[tokio::test]
    async fn mpnews_send_fetches_token_then_posts() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/cgi-bin/gettoken")
                    .query_param("corpid", "corp")
                    .query_param("corpsecret", "secret");
                then.status(200).body(
                    r#"{"errcode":0,"errmsg":"ok","access_token":"TOKEN","expires_in":7200}"#,
                );
            })
            .await;
        let send = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/cgi-bin/message/send")
                    .query_param("access_token", "TOKEN");
                then.status(200)
                    .body(r#"{"errcode":0,"errmsg":"ok","msgid":"m1"}"#);
            })
            .await;

        let transport = Transport::new().expect("transport");
        WecomMpnewsAdapter
            .send(
                &transport,
                "news",
                &settings(&server.base_url()),
                &SendParams::new("line1\nline2", "Report"),
            )
            .await
            .expect("send");

        token.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn mpnews_token_error_stops_before_send() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200)
                    .body(r#"{"errcode":40013,"errmsg":"invalid corpid"}"#);
            })
            .await;
        let send = server
            .mock_async(|when, then| {
                when.method(POST).path("/cgi-bin/message/send");
                then.status(200).body(r#"{"errcode":0}"#);
            })
            .await;

        let transport = Transport::new().expect("transport");
        let err = WecomMpnewsAdapter
            .send(
                &transport,
                "news",
                &settings(&server.base_url()),
                &SendParams::new("hi", ""),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to get access token: invalid corpid");
        send.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn mpnews_token_response_must_be_json() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(502).body("<html>bad gateway</html>");
            })
            .await;

        let transport = Transport::new().expect("transport");
        let err = WecomMpnewsAdapter
            .send(
                &transport,
                "news",
                &settings(&server.base_url()),
                &SendParams::new("hi", ""),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Token(_)));
    }
}
