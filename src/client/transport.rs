//! HTTP transport to a Koutei server

use async_trait::async_trait;
use serde::Deserialize;

use super::TurnTransport;
use crate::turn::{TurnRequest, TurnResponse};
use crate::{Error, Result};

/// Sends turns to `{server}/api/respond`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTransport {
    /// Create a transport for the server at `server_url`
    #[must_use]
    pub fn new(server_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/respond", server_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TurnTransport for HttpTransport {
    async fn send_turn(&self, request: &TurnRequest) -> Result<TurnResponse> {
        tracing::debug!(
            endpoint = %self.endpoint,
            is_initial = request.is_initial,
            "sending turn"
        );

        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(Error::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn posts_camel_case_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/respond"))
            .and(body_json(serde_json::json!({
                "userText": "今日は疲れた",
                "sessionId": "abc",
                "isInitial": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "お疲れさま。",
                "audioUrl": "data:audio/mpeg;base64,AAAA"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&format!("{}/", server.uri()));
        let response = transport
            .send_turn(&TurnRequest::utterance("今日は疲れた", "abc"))
            .await
            .unwrap();

        assert_eq!(response.text, "お疲れさま。");
        assert_eq!(response.audio_url, "data:audio/mpeg;base64,AAAA");
    }

    #[tokio::test]
    async fn error_status_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/respond"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "OpenAI API key is not configured"
            })))
            .mount(&server)
            .await;

        let err = HttpTransport::new(&server.uri())
            .send_turn(&TurnRequest::initial("abc"))
            .await
            .unwrap_err();

        match err {
            Error::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "OpenAI API key is not configured");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1");
        assert!(transport.send_turn(&TurnRequest::initial("abc")).await.is_err());
    }
}
