//! Event handling and user interactions.
//!
//! This module decides which chat events the bot answers, runs the agent
//! pipeline for them, and tracks the per-user sessions and owned threads.

pub mod pipeline;
pub mod router;
pub mod session;
pub mod threads;
