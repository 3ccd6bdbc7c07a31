//! Library root for `vk-warden`.
//!
//! Vk-warden is a moderation assistant for VK group conversations designed to:
//! - Enforce a role hierarchy with per-conversation overrides
//! - Warn, mute, kick, and ban members, with automatic escalation
//! - Keep an audit trail in a dedicated logging conversation
//! - Answer informational commands about members and their history
//!
//! The bot integrates with the VK Bots API for chat and SurrealDB for storage.
//! The architecture is built around extensible traits that allow for different
//! implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the vk-warden runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database and chat clients
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting vk-warden ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
