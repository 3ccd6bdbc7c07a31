//! Core components, types, and utilities for vk-warden.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Roles, identifiers and result handling.
//! - Duration parsing and time formatting.
//! - User-facing message texts.

pub mod config;
pub mod text;
pub mod time;
pub mod types;
