use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use pin_project_lite::pin_project;
use reqwest::Response;
use streamchat_model::ResponseBody;

use crate::Error;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextChunk = (Result<Option<Bytes>, reqwest::Error>, Response);

pin_project! {
    /// The body of a streaming response, read chunk by chunk as it
    /// arrives.
    pub struct ResponseChunks {
        next_chunk_fut: Option<PinnedFuture<NextChunk>>,
    }
}

impl ResponseChunks {
    #[inline]
    pub(crate) fn new(response: Response) -> Self {
        Self {
            next_chunk_fut: Some(Box::pin(next_chunk(response))),
        }
    }
}

impl ResponseBody for ResponseChunks {
    type Error = crate::Error;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        let this = self.project();
        let Some(next_chunk_fut) = this.next_chunk_fut else {
            return Poll::Ready(Ok(None));
        };
        let (result, response) = ready!(next_chunk_fut.as_mut().poll(cx));
        match result {
            Ok(Some(chunk)) => {
                // The response is handed back, so that the next read picks
                // up where this one stopped.
                *this.next_chunk_fut = Some(Box::pin(next_chunk(response)));
                Poll::Ready(Ok(Some(chunk)))
            }
            Ok(None) => {
                *this.next_chunk_fut = None;
                Poll::Ready(Ok(None))
            }
            Err(err) => {
                *this.next_chunk_fut = None;
                Poll::Ready(Err(Error::from_reqwest(err)))
            }
        }
    }
}

async fn next_chunk(mut response: Response) -> NextChunk {
    let result = response.chunk().await;
    (result, response)
}
