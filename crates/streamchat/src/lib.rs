//! An out-of-the-box streaming chat client for OpenAI-compatible endpoints.
//!
//! The crate includes a CLI tool for chatting in the terminal. And you can
//! also use it as a library, or through the C API, to bring a chat window
//! into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chat;
#[cfg(feature = "ffi")]
pub mod ffi;

pub use chat::{Chat, ChatBuilder, ConfigError};

/// Re-exports of [`streamchat_core`] crate.
pub mod core {
    pub use streamchat_core::*;
}

/// Re-exports of [`streamchat_model`] crate.
pub mod model {
    pub use streamchat_model::*;
}

/// Re-exports of [`streamchat_openai_transport`] crate.
pub mod openai {
    pub use streamchat_openai_transport::*;
}
