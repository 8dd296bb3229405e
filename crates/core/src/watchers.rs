use std::sync::{Mutex, MutexGuard, PoisonError};

use streamchat_model::{ConversationHistory, MessageId};
use tokio::sync::watch;

pub(crate) type MessagesChangedFn =
    Box<dyn Fn(&ConversationHistory) + Send + Sync>;
pub(crate) type StreamingChangedFn = Box<dyn Fn(bool) + Send + Sync>;

#[inline]
fn lock(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The conversation history, observable by the presentation layer.
///
/// Every mutation goes through [`modify`](Self::modify). Mutations are
/// serialized, and the observer callback sees them in the same order.
pub(crate) struct HistoryCell {
    tx: watch::Sender<ConversationHistory>,
    on_change: Option<MessagesChangedFn>,
    gate: Mutex<()>,
}

impl HistoryCell {
    #[inline]
    pub fn new(
        history: ConversationHistory,
        on_change: Option<MessagesChangedFn>,
    ) -> Self {
        Self {
            tx: watch::Sender::new(history),
            on_change,
            gate: Mutex::new(()),
        }
    }

    /// Runs `f` on the history. `f` returns its output and whether the
    /// messages have visibly changed, in which case observers are
    /// notified.
    ///
    /// The callback is invoked after the watch lock is released, so it may
    /// read the history, but it must not mutate it.
    pub fn modify<R>(
        &self,
        f: impl FnOnce(&mut ConversationHistory) -> (R, bool),
    ) -> R {
        let _gate = lock(&self.gate);
        let mut output = None;
        let modified = self.tx.send_if_modified(|history| {
            let (out, modified) = f(history);
            output = Some(out);
            modified
        });
        if modified {
            if let Some(on_change) = &self.on_change {
                on_change(&self.tx.borrow());
            }
        }
        output.expect("the closure is always called")
    }

    #[inline]
    pub fn snapshot(&self) -> ConversationHistory {
        self.tx.borrow().clone()
    }

    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<ConversationHistory> {
        self.tx.subscribe()
    }
}

/// Tracks which session, if any, the streaming indicator belongs to.
///
/// A session that has been superseded cannot turn off the indicator of
/// its successor.
pub(crate) struct StreamingIndicator {
    tx: watch::Sender<Option<MessageId>>,
    on_change: Option<StreamingChangedFn>,
    gate: Mutex<()>,
}

impl StreamingIndicator {
    #[inline]
    pub fn new(on_change: Option<StreamingChangedFn>) -> Self {
        Self {
            tx: watch::Sender::new(None),
            on_change,
            gate: Mutex::new(()),
        }
    }

    pub fn start(&self, id: MessageId) {
        let _gate = lock(&self.gate);
        let was_streaming = self.tx.send_replace(Some(id)).is_some();
        if !was_streaming {
            self.notify(true);
        }
    }

    pub fn stop(&self, id: MessageId) {
        let _gate = lock(&self.gate);
        let stopped = self.tx.send_if_modified(|current| {
            if *current != Some(id) {
                return false;
            }
            *current = None;
            true
        });
        if stopped {
            self.notify(false);
        }
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.tx.borrow().is_some()
    }

    #[inline]
    fn notify(&self, streaming: bool) {
        if let Some(on_change) = &self.on_change {
            on_change(streaming);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use streamchat_model::Message;

    use super::*;

    #[test]
    fn test_history_notifies_on_change_only() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let cell = HistoryCell::new(
            ConversationHistory::new(),
            Some(Box::new({
                let calls = Arc::clone(&calls);
                move |history: &ConversationHistory| {
                    calls.lock().unwrap().push(history.len());
                }
            })),
        );

        let len = cell.modify(|history| {
            history.push(Message::user("hi"));
            (history.len(), true)
        });
        assert_eq!(len, 1);
        cell.modify(|_| ((), false));
        cell.modify(|history| {
            history.push(Message::assistant("hello"));
            ((), true)
        });

        assert_eq!(*calls.lock().unwrap(), [1, 2]);
        assert_eq!(cell.snapshot().len(), 2);
    }

    #[test]
    fn test_superseded_session_keeps_indicator_on() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let indicator = StreamingIndicator::new(Some(Box::new({
            let calls = Arc::clone(&calls);
            move |streaming: bool| calls.lock().unwrap().push(streaming)
        })));
        let first = MessageId::next();
        let second = MessageId::next();

        indicator.start(first);
        indicator.start(second);
        indicator.stop(first);
        assert!(indicator.is_streaming());
        indicator.stop(second);
        assert!(!indicator.is_streaming());

        assert_eq!(*calls.lock().unwrap(), [true, false]);
    }
}
