//! Event handling and user interactions for vk-warden.
//!
//! This module turns inbound messages into actions:
//! - Counting messages, mirroring them, and enforcing mutes
//! - Parsing, gating, and dispatching commands
//! - Resolving mentions and checking roles
//! - Executing moderation actions and writing the audit log

pub mod access;
pub mod audit;
pub mod chat_event;
pub mod command;
pub mod commands;
pub mod mention;
pub mod moderation;
