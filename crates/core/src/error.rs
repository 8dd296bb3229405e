use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

use streamchat_model::{ErrorKind, TransportError};

/// Describes why a session failed.
#[derive(Debug)]
pub struct SessionError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    source: Option<Box<dyn TransportError>>,
}

impl SessionError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub(crate) fn from_transport(err: Box<dyn TransportError>) -> Self {
        Self {
            kind: err.kind(),
            message: format!("{err}"),
            status: err.status(),
            source: Some(err),
        }
    }

    pub(crate) fn idle_timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::IdleTimeout,
            format!("no data received for {after:?}"),
        )
    }

    pub(crate) fn request_timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::RequestTimeout,
            format!("no response received within {after:?}"),
        )
    }

    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code, if the server answered with one.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

/// The error returned when a message cannot be sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendError {
    /// The message is empty, or contains only whitespace.
    EmptyInput,
}

impl Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::EmptyInput => write!(f, "message is empty"),
        }
    }
}

impl StdError for SendError {}
