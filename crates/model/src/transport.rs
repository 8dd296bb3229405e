use std::error::Error;
use std::pin::Pin;
use std::task::{self, Poll};

use bytes::Bytes;

use crate::error::ErrorKind;
use crate::request::ChatRequest;

/// The error type for a transport.
pub trait TransportError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns the HTTP status code, if the error was caused by one.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// A type that delivers chat requests to a text-generation endpoint.
///
/// Once the transport is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the transport should be prepared for being dropped anytime.
pub trait Transport: Send + Sync {
    /// The error type that may be returned by the transport.
    type Error: TransportError;

    /// The response body type for this transport.
    type Body: ResponseBody<Error = Self::Error>;

    /// Sends a request, resolving once the response headers have arrived.
    ///
    /// Non-success statuses and responses without a body must be reported
    /// as errors here, not through the body.
    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Body, Self::Error>> + Send + 'static;
}

/// The body of a successful response, read incrementally.
pub trait ResponseBody: Sized + Send + 'static {
    /// The error type that may be returned while reading.
    type Error: TransportError;

    /// Attempts to pull out the next chunk of bytes.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means that no more bytes are available yet.
    ///   Implementations will ensure that the current task will be
    ///   notified when the next chunk may be ready.
    /// - `Poll::Ready(Ok(Some(chunk)))` means a chunk arrived, and more
    ///   may follow on subsequent calls.
    /// - `Poll::Ready(Ok(None))` means the body has been fully read.
    /// - `Poll::Ready(Err(error))` means the connection failed.
    ///
    /// Chunk boundaries carry no meaning: a line, or even a single UTF-8
    /// character, may be split across two chunks.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>>;
}
