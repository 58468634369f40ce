//! JSON-over-HTTP invoker.
//!
//! POSTs each request as a JSON body to a fixed URL and decodes the JSON
//! response. One attempt per request with separate connect and read
//! deadlines; retrying is left to the caller.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CallResult, Invoker};
use crate::error::TransportError;
use crate::{Result, SluiceError};

/// Default time allowed for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3050);

/// Default time allowed between reads once connected.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(600);

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Connection settings for [`HttpInvoker`].
#[derive(Clone)]
pub struct HttpConfig {
    /// Endpoint every request is POSTed to.
    pub url: String,
    /// User key sent as `Authorization: user_key <key>`.
    pub api_key: Option<String>,
    /// Default: 3.05s.
    pub connect_timeout: Duration,
    /// Default: 600s.
    pub read_timeout: Duration,
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Invoker that POSTs `Req` as JSON and decodes `Resp` from the JSON reply.
pub struct HttpInvoker<Req, Resp> {
    http: Client,
    config: HttpConfig,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> HttpInvoker<Req, Resp> {
    /// Build the underlying HTTP client from `config`.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| SluiceError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            _types: PhantomData,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn post(&self, body: Vec<u8>) -> CallResult<String> {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body);
        if let Some(key) = &self.config.api_key {
            request = request.header(AUTHORIZATION, format!("user_key {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl<Req, Resp> Invoker for HttpInvoker<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(&self, request: &Req) -> CallResult<Resp> {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Encode(e.to_string()))?;
        let text = self.post(body).await?;
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
