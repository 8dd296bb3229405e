use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, something went wrong. Please try again.";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SessionConfigBuilder {
    model: Option<String>,
    fallback_message: Option<String>,
    idle_timeout: Option<Option<Duration>>,
    request_timeout: Option<Option<Duration>>,
}

impl SessionConfigBuilder {
    /// Creates a builder with every option at its default.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier sent with each request.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the text shown in place of the assistant reply when a request
    /// fails before any content has arrived.
    #[inline]
    pub fn with_fallback_message<S: Into<String>>(mut self, message: S) -> Self {
        self.fallback_message = Some(message.into());
        self
    }

    /// Sets how long a stream may stay silent before it is failed.
    /// `None` waits forever.
    #[inline]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Sets how long to wait for the response headers. `None` waits
    /// forever.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            fallback_message: self
                .fallback_message
                .unwrap_or_else(|| DEFAULT_FALLBACK_MESSAGE.to_owned()),
            idle_timeout: self.idle_timeout.unwrap_or(Some(DEFAULT_IDLE_TIMEOUT)),
            request_timeout: self
                .request_timeout
                .unwrap_or(Some(DEFAULT_REQUEST_TIMEOUT)),
        }
    }
}

/// Configuration shared by every session of a
/// [`SessionManager`](crate::SessionManager).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    pub(crate) model: String,
    pub(crate) fallback_message: String,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Returns the model identifier sent with each request.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the text substituted for a reply that failed before any
    /// content arrived.
    #[inline]
    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }
}

impl Default for SessionConfig {
    #[inline]
    fn default() -> Self {
        SessionConfigBuilder::default().build()
    }
}
