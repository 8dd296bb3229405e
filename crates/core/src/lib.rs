//! Streaming chat sessions: sending a conversation to a text-generation
//! endpoint and streaming the reply into its history.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod event;
mod handle;
mod manager;
mod session;
mod sse;
mod transport_client;
mod watchers;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{SendError, SessionError};
pub use handle::{CancelHandle, SessionHandle, UpdateEvent, UpdateStream};
pub use manager::{SessionManager, SessionManagerBuilder};
