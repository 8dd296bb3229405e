use std::sync::Arc;
use std::time::Duration;

use streamchat_model::{MessageId, StreamState};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::{error::Elapsed, timeout};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{Event, parse_line};
use crate::handle::UpdateEvent;
use crate::sse::LineDecoder;
use crate::transport_client::{BoxedResponseFuture, next_chunk};
use crate::watchers::{HistoryCell, StreamingIndicator};

/// State of a session that is shared between its task and its handles.
pub(crate) struct SessionShared {
    pub message_id: MessageId,
    pub state: watch::Sender<StreamState>,
    cancel_tx: watch::Sender<bool>,
    history: Arc<HistoryCell>,
    indicator: Arc<StreamingIndicator>,
}

impl SessionShared {
    #[inline]
    pub fn new(
        message_id: MessageId,
        history: Arc<HistoryCell>,
        indicator: Arc<StreamingIndicator>,
    ) -> Self {
        Self {
            message_id,
            state: watch::Sender::new(StreamState::Idle),
            cancel_tx: watch::Sender::new(false),
            history,
            indicator,
        }
    }

    /// Moves to `next`, unless a terminal state has been reached already.
    pub fn transition(&self, next: StreamState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            trace!("session {} is now {next:?}", self.message_id);
            if next.is_active() {
                self.indicator.start(self.message_id);
            } else if next.is_terminal() {
                self.indicator.stop(self.message_id);
            }
        }
        changed
    }

    /// Cancels the session.
    ///
    /// The placeholder is released before anything else, so once this
    /// returns, the session can no longer touch the history. Returns
    /// `false` if the session had already ended.
    pub fn cancel(&self) -> bool {
        let id = self.message_id;
        let released =
            self.history.modify(|history| (history.release(id), false));
        self.cancel_tx.send_replace(true);
        if !released {
            // The session has finished on its own and will settle its
            // final state.
            return false;
        }
        debug!("session {id} cancelled");
        self.transition(StreamState::Aborted)
    }
}

enum Flow {
    Continue,
    Done,
    Aborted,
}

enum Outcome {
    Done,
    Aborted,
}

/// Drives one request/response exchange: reads the body chunk by chunk,
/// splits it into event lines, and streams the accumulated content into
/// the placeholder message.
pub(crate) struct StreamingChatSession {
    shared: Arc<SessionShared>,
    config: Arc<SessionConfig>,
    updates: mpsc::UnboundedSender<UpdateEvent>,
    decoder: LineDecoder,
    content: String,
}

impl StreamingChatSession {
    #[inline]
    pub fn new(
        shared: Arc<SessionShared>,
        config: Arc<SessionConfig>,
        updates: mpsc::UnboundedSender<UpdateEvent>,
    ) -> Self {
        Self {
            shared,
            config,
            updates,
            decoder: LineDecoder::new(),
            content: String::new(),
        }
    }

    pub async fn run(
        mut self,
        response: BoxedResponseFuture,
    ) -> Result<(), SessionError> {
        let mut cancel_rx = self.shared.cancel_tx.subscribe();
        let result = self.stream(response, &mut cancel_rx).await;
        self.finish(result)
    }

    async fn stream(
        &mut self,
        response: BoxedResponseFuture,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, SessionError> {
        let request_timeout = self.config.request_timeout;
        let idle_timeout = self.config.idle_timeout;

        let mut body = select! {
            biased;

            _ = cancelled(cancel_rx) => return Ok(Outcome::Aborted),
            resp = within(request_timeout, response) => match resp {
                Ok(Ok(body)) => body,
                Ok(Err(err)) => return Err(SessionError::from_transport(err)),
                Err(_) => {
                    return Err(SessionError::request_timeout(
                        request_timeout.unwrap_or_default(),
                    ));
                }
            },
        };
        trace!("got response headers");

        loop {
            // This is the only place where the session waits for the
            // network, and thus the only place to observe cancellation.
            let chunk = select! {
                biased;

                _ = cancelled(cancel_rx) => return Ok(Outcome::Aborted),
                chunk = within(idle_timeout, next_chunk(&mut body)) => {
                    match chunk {
                        Ok(Ok(chunk)) => chunk,
                        Ok(Err(err)) => {
                            return Err(SessionError::from_transport(err));
                        }
                        Err(_) => {
                            return Err(SessionError::idle_timeout(
                                idle_timeout.unwrap_or_default(),
                            ));
                        }
                    }
                }
            };

            let Some(chunk) = chunk else {
                // Servers may close the stream without the sentinel, and
                // the last line may lack its terminator.
                trace!("body exhausted");
                if let Some(line) = self.decoder.finish() {
                    if let Flow::Aborted = self.handle_line(&line)? {
                        return Ok(Outcome::Aborted);
                    }
                }
                return Ok(Outcome::Done);
            };
            trace!("got a chunk of {} bytes", chunk.len());

            self.shared.transition(StreamState::Streaming);
            self.decoder.push(&chunk);
            while let Some(line) = self.decoder.next_line() {
                match self.handle_line(&line)? {
                    Flow::Continue => {}
                    Flow::Done => return Ok(Outcome::Done),
                    Flow::Aborted => return Ok(Outcome::Aborted),
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<Flow, SessionError> {
        let Some(event) = parse_line(line) else {
            return Ok(Flow::Continue);
        };
        match event {
            Event::Done => {
                trace!("got the sentinel");
                Ok(Flow::Done)
            }
            Event::Delta(delta) => {
                self.content.push_str(&delta);
                if self.publish() {
                    Ok(Flow::Continue)
                } else {
                    Ok(Flow::Aborted)
                }
            }
            Event::Empty => Ok(Flow::Continue),
            Event::Upstream(message) => Err(SessionError::upstream(message)),
            Event::Malformed(err) => {
                warn!("skipping malformed event line ({err}): {line}");
                Ok(Flow::Continue)
            }
        }
    }

    /// Writes the accumulated content into the placeholder and emits an
    /// update. Returns `false` if the placeholder has been released.
    fn publish(&self) -> bool {
        let id = self.shared.message_id;
        let content = &self.content;
        let updates = &self.updates;
        self.shared.history.modify(|history| {
            if !history.update_in_progress(id, content.as_str()) {
                return (false, false);
            }
            // Sent while the history is still locked, so that no update
            // can slip out after a cancellation.
            updates
                .send(UpdateEvent {
                    message_id: id,
                    content: content.clone(),
                })
                .ok();
            (true, true)
        })
    }

    fn finish(
        self,
        result: Result<Outcome, SessionError>,
    ) -> Result<(), SessionError> {
        let id = self.shared.message_id;
        let fallback = self.config.fallback_message.as_str();
        let has_content = !self.content.is_empty();
        let failed = result.is_err();

        // Whoever releases the placeholder decides the outcome. If it is
        // already released, a cancellation got there first and wins over
        // whatever we have.
        let owned = self.shared.history.modify(|history| {
            if history.in_progress() != Some(id) {
                return (false, false);
            }
            let replaced = failed
                && !has_content
                && history.update_in_progress(id, fallback);
            history.release(id);
            (true, replaced)
        });
        if !owned {
            self.shared.transition(StreamState::Aborted);
            if let Err(err) = result {
                debug!("ignoring error after cancellation: {err}");
            }
            return Ok(());
        }

        match result {
            Ok(Outcome::Done) => {
                debug!("completed with {} bytes of content", self.content.len());
                self.shared.transition(StreamState::Done);
                Ok(())
            }
            Ok(Outcome::Aborted) => {
                self.shared.transition(StreamState::Aborted);
                Ok(())
            }
            Err(err) => {
                error!("stream failed: {err}");
                self.shared.transition(StreamState::Failed(err.kind()));
                Err(err)
            }
        }
    }
}

async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    // The sender lives in `SessionShared`, which outlives this receiver.
    cancel_rx.wait_for(|cancelled| *cancelled).await.ok();
}

async fn within<F: Future>(
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, Elapsed> {
    match limit {
        Some(limit) => timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}
