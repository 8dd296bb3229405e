use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use streamchat_model::{ChatRequest, ResponseBody, Transport, TransportError};

pub(crate) type BoxedTransportError = Box<dyn TransportError>;
pub(crate) type BoxedBody = Pin<Box<dyn ErasedBody>>;
pub(crate) type BoxedResponseFuture = Pin<
    Box<dyn Future<Output = Result<BoxedBody, BoxedTransportError>> + Send>,
>;
type HandlerFn = Arc<dyn Fn(&ChatRequest) -> BoxedResponseFuture + Send + Sync>;

/// A wrapper around a transport that provides a type-erased interface for
/// the other modules.
#[derive(Clone)]
pub(crate) struct TransportClient {
    handler_fn: HandlerFn,
}

impl TransportClient {
    #[inline]
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        // We have to erase the type `T`, since `SessionManager` doesn't have
        // a generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(
            move |req: &ChatRequest| -> BoxedResponseFuture {
                let fut = transport.send_request(req);
                Box::pin(async move {
                    match fut.await {
                        Ok(body) => Ok(Box::pin(body) as BoxedBody),
                        Err(err) => Err(Box::new(err) as BoxedTransportError),
                    }
                })
            },
        );
        Self { handler_fn }
    }

    /// Sends a request. The returned future resolves once the response
    /// headers have arrived.
    #[inline]
    pub fn send_request(&self, req: &ChatRequest) -> BoxedResponseFuture {
        (self.handler_fn)(req)
    }
}

/// Object-safe counterpart of [`ResponseBody`].
pub(crate) trait ErasedBody: Send {
    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, BoxedTransportError>>;
}

impl<B: ResponseBody> ErasedBody for B {
    #[inline]
    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, BoxedTransportError>> {
        ResponseBody::poll_next_chunk(self, cx)
            .map_err(|err| Box::new(err) as BoxedTransportError)
    }
}

/// Reads the next chunk of a body.
///
/// # Cancel safety
///
/// This method is cancel safe, as long as the underlying body is.
#[inline]
pub(crate) async fn next_chunk(
    body: &mut BoxedBody,
) -> Result<Option<Bytes>, BoxedTransportError> {
    poll_fn(|cx| body.as_mut().poll_next_chunk(cx)).await
}

#[cfg(test)]
mod tests {
    use streamchat_model::{ErrorKind, RequestMessage, Role};
    use streamchat_test_transport::{
        PresetFailure, PresetResponse, TestTransport,
    };

    use super::*;

    fn request() -> ChatRequest {
        ChatRequest::streaming(
            "test",
            vec![RequestMessage {
                role: Role::User,
                content: "Hi".to_owned(),
            }],
        )
    }

    #[tokio::test]
    async fn test_send_request() {
        let transport = TestTransport::default();
        transport.push_response(PresetResponse::with_chunks(["ab", "cd"]));
        let client = TransportClient::new(transport.clone());

        let mut body = client.send_request(&request()).await.unwrap();
        let mut received = Vec::new();
        while let Some(chunk) = next_chunk(&mut body).await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"abcd");
        assert_eq!(transport.requests(), [request()]);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let transport = TestTransport::default();
        transport.push_response(PresetResponse::failing(PresetFailure::Status(
            429,
        )));
        let client = TransportClient::new(transport);

        let err = client.send_request(&request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert_eq!(err.status(), Some(429));
    }
}
