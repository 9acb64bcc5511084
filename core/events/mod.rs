//! # Build Execution Events
//!
//! None of these events include references to existing data, and they are all self-contained, so
//! they can be handed to a printer or a log-streamer without keeping any build state alive.
//!
//! Sending an event never blocks and never fails. Nothing in the build depends on an event being
//! consumed.
//!
mod channel;
mod consumer;
pub mod event;

pub use channel::*;
pub use consumer::*;
pub use event::*;
