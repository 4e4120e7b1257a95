//! Core components, types, and utilities for the bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Fallback agent instructions and slash-command query templates.
//! - Log output and trace export.
//! - Common types and result handling.

pub mod config;
pub mod prompts;
pub mod telemetry;
pub mod types;
