use std::fmt::{self, Display};

/// The kind of error that occurred.
///
/// Transports only report `Network`, `HttpStatus`, `EmptyBody` and `Other`.
/// The remaining kinds are raised by the streaming core itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be delivered, or the connection broke while
    /// the body was being read.
    Network,
    /// The server answered with a non-success status.
    HttpStatus,
    /// The response has no readable body.
    EmptyBody,
    /// No bytes arrived within the configured idle timeout.
    IdleTimeout,
    /// The response headers did not arrive within the configured request
    /// timeout.
    RequestTimeout,
    /// The endpoint reported an error inside the event stream.
    Upstream,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "Network error"),
            ErrorKind::HttpStatus => write!(f, "Unexpected HTTP status"),
            ErrorKind::EmptyBody => write!(f, "Empty response body"),
            ErrorKind::IdleTimeout => write!(f, "Stream idle timeout"),
            ErrorKind::RequestTimeout => write!(f, "Request timeout"),
            ErrorKind::Upstream => write!(f, "Upstream error"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}
