//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the bot:
//! - Chat services (Slack)
//! - LLM services (Gemini)
//! - Prompt management (Langfuse)
//! - Conversation sessions (in memory)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod prompt;
pub mod session;
