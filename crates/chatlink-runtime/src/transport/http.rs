use std::time::Duration;

use async_trait::async_trait;
use chatlink_core::TransportError;
use serde_json::Value;

/// Successful (2xx) HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// Response body, `None` when empty.
    pub body: Option<String>,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: Some(body.into()),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Request/response transport used by the poll and dual strategies.
///
/// Implementations return `Err(TransportError::Status(_))` for non-2xx
/// responses and `Err(TransportError::Timeout)` when `timeout` elapses.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// GET `url`, carrying the cursor as the `lastMessageId` query parameter.
    async fn fetch(
        &self,
        url: &str,
        last_message_id: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;

    /// POST `body` as JSON to `url`.
    async fn submit(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Setup(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(
        &self,
        url: &str,
        last_message_id: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(cursor) = last_message_id {
            request = request.query(&[("lastMessageId", cursor)]);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        read_reply(response).await
    }

    async fn submit(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_reply(response).await
    }
}

async fn read_reply(response: reqwest::Response) -> Result<HttpReply, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }
    let body = response.text().await.map_err(map_reqwest_error)?;
    Ok(HttpReply {
        status: status.as_u16(),
        body: (!body.is_empty()).then_some(body),
    })
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else if err.is_builder() {
        TransportError::Setup(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
