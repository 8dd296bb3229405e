use crate::error::ErrorKind;

/// The lifecycle of one request/response exchange.
///
/// `Done`, `Aborted` and `Failed` are terminal: once reached, the state
/// never changes again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Nothing has been sent yet.
    #[default]
    Idle,
    /// The request is sent, but no bytes of the body have arrived.
    Awaiting,
    /// Bytes are arriving and content is accumulating.
    Streaming,
    /// The stream completed normally.
    Done,
    /// The stream was cancelled.
    Aborted,
    /// The stream failed for the given reason.
    Failed(ErrorKind),
}

impl StreamState {
    /// Returns `true` if the exchange is waiting for or reading a response.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, StreamState::Awaiting | StreamState::Streaming)
    }

    /// Returns `true` if the exchange has reached a final state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Done | StreamState::Aborted | StreamState::Failed(_)
        )
    }
}
