//! A transport for OpenAI-compatible chat completion endpoints.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod body;
mod config;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use streamchat_model::{ChatRequest, ErrorKind, Transport, TransportError};

pub use body::ResponseChunks;
pub use config::{OpenAIConfig, OpenAIConfigBuilder};

/// Error type for [`OpenAITransport`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_builder() {
            ErrorKind::Other
        } else {
            ErrorKind::Network
        };
        Self::new(format!("{err}"), kind)
    }

    fn from_status(status: StatusCode, detail: &str) -> Self {
        let detail = detail.trim();
        let message = if detail.is_empty() {
            format!("HTTP status {status}")
        } else {
            format!("HTTP status {status}: {detail}")
        };
        Self {
            message,
            kind: ErrorKind::HttpStatus,
            status: Some(status.as_u16()),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl TransportError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Transport for OpenAI-compatible endpoints.
#[derive(Clone, Debug)]
pub struct OpenAITransport {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAITransport {
    /// Creates a new `OpenAITransport` with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(Error::from_reqwest)?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a new `OpenAITransport` that sends requests with `client`.
    #[inline]
    pub fn with_client(config: OpenAIConfig, client: Client) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

impl Transport for OpenAITransport {
    type Error = Error;
    type Body = ResponseChunks;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Body, Self::Error>> + Send + 'static
    {
        let mut builder = self
            .client
            .post(self.config.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let resp_fut = builder.json(req).send();

        async move {
            let resp = resp_fut.await.map_err(Error::from_reqwest)?;

            let status = resp.status();
            if !status.is_success() {
                // The body usually explains what went wrong.
                let detail = resp.text().await.unwrap_or_default();
                return Err(Error::from_status(status, &detail));
            }

            if !is_event_stream(&resp) {
                warn!(
                    "unexpected content type {:?}, reading the body anyway",
                    resp.headers().get(header::CONTENT_TYPE)
                );
            }
            if resp.content_length() == Some(0) {
                return Err(Error::new(
                    "response has no body",
                    ErrorKind::EmptyBody,
                ));
            }

            trace!("response headers received: {status}");
            Ok(ResponseChunks::new(resp))
        }
    }
}

fn is_event_stream(resp: &Response) -> bool {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Mime>().ok())
        .is_some_and(|m| {
            m.type_() == mime::TEXT && m.subtype() == mime::EVENT_STREAM
        })
}
