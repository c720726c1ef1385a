use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::adapters::AdapterError;
use crate::models::OutgoingRequest;

/// Every outbound call gives up after this long.
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Outbound HTTP helper shared by the adapters and the heartbeat.
#[derive(Debug, Clone)]
pub struct Transport {
    http: Client,
}

impl Transport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(OUTBOUND_TIMEOUT).build()?;
        Ok(Self { http })
    }

    /// POSTs the request body as JSON and returns the raw response body,
    /// whatever the status code.
    pub async fn post(&self, request: &OutgoingRequest) -> Result<String, reqwest::Error> {
        self.http
            .post(&request.url)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .json(&request.body)
            .send()
            .await?
            .text()
            .await
    }

    pub async fn get(&self, url: &str) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

/// Decides delivery success by looking for `marker` anywhere in the raw body.
///
/// The body is not parsed; a failure body is returned verbatim as the error
/// detail.
pub fn classify_response(
    route: &str,
    platform: &str,
    body: String,
    marker: &str,
) -> Result<(), AdapterError> {
    tracing::info!("{} - {} response: {}", route, platform, body);
    if body.contains(marker) {
        Ok(())
    } else {
        Err(AdapterError::Upstream(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn marker_anywhere_in_body_is_success() {
        let body = r#"garbage before {"errcode":0,"errmsg":"ok"} trailing"#.to_string();
        assert!(classify_response("ops", "钉钉文本", body, r#""errcode":0"#).is_ok());
    }

    #[test]
    fn missing_marker_returns_full_body() {
        let body = r#"{"errcode":310000,"errmsg":"keywords not in content"}"#.to_string();
        let err = classify_response("ops", "钉钉文本", body.clone(), r#""errcode":0"#)
            .unwrap_err();
        match err {
            AdapterError::Upstream(detail) => assert_eq!(detail, body),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_sends_json_with_charset() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hook")
                    .header("content-type", "application/json;charset=utf-8")
                    .json_body(json!({ "a": 1 }));
                then.status(500).body("upstream says no");
            })
            .await;

        let transport = Transport::new().expect("transport");
        let body = transport
            .post(&OutgoingRequest {
                url: server.url("/hook"),
                body: json!({ "a": 1 }),
            })
            .await
            .expect("response");

        mock.assert_async().await;
        assert_eq!(body, "upstream says no");
    }

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(204);
            })
            .await;

        let transport = Transport::new().expect("transport");
        let (status, body) = transport.get(&server.url("/ping")).await.expect("response");
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let transport = Transport::new().expect("transport");
        let result = transport.get("http://127.0.0.1:1/ping").await;
        assert!(result.is_err());
    }
}
