//! Shared vocabulary for streaming chat clients.
//!
//! This crate defines the conversation data model and the protocol between
//! the streaming core and the transports that talk to the text-generation
//! endpoint. The core can then swap transports (a real HTTP client, or a
//! scripted one in tests) without modifying its own logic.
//!
//! Apart from [`ConversationHistory`], which owns the rules for mutating
//! the trailing placeholder message, types in this crate are plain values
//! and constraints that implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod history;
mod message;
mod request;
mod state;
mod transport;

pub use error::*;
pub use history::*;
pub use message::*;
pub use request::*;
pub use state::*;
pub use transport::*;
