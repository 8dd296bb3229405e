use serde::{Deserialize, Serialize};
use serde_json::json;

/// One step of a scripted response body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BodyStep {
    /// Delivers a chunk of raw bytes.
    #[serde(rename = "chunk")]
    Chunk(Vec<u8>),
    /// Waits for the given number of milliseconds before the next step.
    #[serde(rename = "delay")]
    Delay(u64),
    /// Breaks the connection with the given message.
    #[serde(rename = "fail")]
    Fail(String),
    /// Stops delivering anything, forever.
    #[serde(rename = "hang")]
    Hang,
}

impl BodyStep {
    /// Creates a chunk step from a string.
    #[inline]
    pub fn text<S: AsRef<str>>(text: S) -> Self {
        BodyStep::Chunk(text.as_ref().as_bytes().to_vec())
    }
}

/// How a scripted request fails before any body is returned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetFailure {
    /// The connection could not be established.
    #[serde(rename = "network")]
    Network,
    /// The server answered with the given status.
    #[serde(rename = "status")]
    Status(u16),
    /// The server answered without a body.
    #[serde(rename = "empty_body")]
    EmptyBody,
}

/// The preset response for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Steps of the body, played in order.
    pub steps: Vec<BodyStep>,
    /// If set, the request fails instead of returning a body.
    pub failure: Option<PresetFailure>,
    /// Milliseconds to wait before the response headers "arrive".
    pub delay_ms: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` that delivers each string as a chunk.
    #[inline]
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_steps(chunks.into_iter().map(BodyStep::text))
    }

    /// Creates a `PresetResponse` with the specified body steps.
    #[inline]
    pub fn with_steps(steps: impl IntoIterator<Item = BodyStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            failure: None,
            delay_ms: None,
        }
    }

    /// Creates a `PresetResponse` whose request fails.
    #[inline]
    pub fn failing(failure: PresetFailure) -> Self {
        Self {
            steps: vec![],
            failure: Some(failure),
            delay_ms: None,
        }
    }

    /// Delays the response headers by `delay_ms` milliseconds.
    #[inline]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Formats a `data:` line carrying a content delta, terminated by a blank
/// line like a real endpoint does.
pub fn delta_event(content: &str) -> String {
    let payload = json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {payload}\n\n")
}

/// The terminal sentinel event.
pub const DONE_EVENT: &str = "data: [DONE]\n\n";
