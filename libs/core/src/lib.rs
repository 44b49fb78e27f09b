//! Screambot core contracts and value types.
//!
//! This crate exposes the activity shapes exchanged with the messaging
//! channel, the per-turn context used to send replies, and the client for
//! the hosted question-answering service.

pub mod activity;
pub mod qna;
pub mod turn;

pub use activity::*;
pub use qna::*;
pub use turn::*;
