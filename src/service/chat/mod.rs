pub mod vk;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::base::types::{IncomingMessage, MessageId, PeerId, Res, UserId, Void, is_group_peer};

// Types.

/// A member of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub online: bool,
    pub is_owner: bool,
}

impl Member {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A resolved user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
}

impl Profile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The call shape used to delete a single message.
///
/// Group conversations are flaky about which shape they accept, so deletion
/// walks [`DeleteStrategy::GROUP_FALLBACKS`] until one succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Delete by conversation-relative message id within the peer.
    ConversationMessageId,
    /// Delete by message id within the peer.
    PeerMessageId,
    /// Delete by global message id, without a peer.
    GlobalMessageId,
    /// Delete a direct message.
    DirectMessage,
}

impl DeleteStrategy {
    pub const GROUP_FALLBACKS: [DeleteStrategy; 3] = [DeleteStrategy::ConversationMessageId, DeleteStrategy::PeerMessageId, DeleteStrategy::GlobalMessageId];

    /// Strategies to try, in order, for a message in the given peer.
    pub fn for_peer(peer_id: PeerId) -> &'static [DeleteStrategy] {
        if is_group_peer(peer_id) { &Self::GROUP_FALLBACKS } else { &[DeleteStrategy::DirectMessage] }
    }
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines everything vk-warden needs from the chat platform:
/// the inbound event stream, outbound messages, and membership and profile
/// lookups. Implementing this trait allows a different platform (or a mock)
/// to be used.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Wait for the next batch of "new message" events.
    ///
    /// An empty batch is a normal outcome (e.g. the long poll timed out).
    async fn poll_events(&self) -> Res<Vec<IncomingMessage>>;

    /// Send a message to a conversation, returning the new message id.
    async fn send_message(&self, peer_id: PeerId, text: &str) -> Res<MessageId>;

    /// Delete a single message using one specific call shape.
    async fn delete_message_with(&self, peer_id: PeerId, message_id: MessageId, strategy: DeleteStrategy) -> Void;

    /// Delete several messages of a conversation in one call.
    async fn delete_messages(&self, peer_id: PeerId, message_ids: &[MessageId]) -> Void;

    /// List the members of a conversation.
    async fn get_conversation_members(&self, peer_id: PeerId) -> Res<Vec<Member>>;

    /// Get the owner of a conversation, if the platform reports one.
    async fn get_conversation_owner(&self, peer_id: PeerId) -> Res<Option<UserId>>;

    /// Resolve a vanity handle or numeric id to a profile.
    async fn resolve_profile(&self, handle_or_id: &str) -> Res<Profile>;

    /// Remove a member from a conversation.
    async fn remove_member(&self, peer_id: PeerId, user_id: UserId) -> Void;

    /// Get the ids of the most recent `count` messages, newest first.
    async fn get_message_history(&self, peer_id: PeerId, count: u32) -> Res<Vec<MessageId>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }

    /// Send a message, logging instead of propagating a failure.
    pub async fn say(&self, peer_id: PeerId, text: &str) -> Option<MessageId> {
        match self.send_message(peer_id, text).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("Failed to send message to {}: {}", peer_id, err);
                None
            }
        }
    }

    /// Delete a message, trying every call shape the peer supports.
    #[instrument(skip(self))]
    pub async fn delete_message(&self, peer_id: PeerId, message_id: MessageId) -> bool {
        for strategy in DeleteStrategy::for_peer(peer_id) {
            match self.delete_message_with(peer_id, message_id, *strategy).await {
                Ok(()) => {
                    info!("Deleted message {} in {} ({:?}).", message_id, peer_id, strategy);
                    return true;
                }
                Err(err) => warn!("Failed to delete message {} in {} ({:?}): {}", message_id, peer_id, strategy, err),
            }
        }

        false
    }

    /// The conversation owner, with lookup failures collapsed to `None`.
    pub async fn conversation_owner(&self, peer_id: PeerId) -> Option<UserId> {
        match self.get_conversation_owner(peer_id).await {
            Ok(owner) => owner,
            Err(err) => {
                warn!("Failed to get owner of {}: {}", peer_id, err);
                None
            }
        }
    }

    /// The members of a conversation, with lookup failures collapsed to an empty list.
    pub async fn members(&self, peer_id: PeerId) -> Vec<Member> {
        match self.get_conversation_members(peer_id).await {
            Ok(members) => members,
            Err(err) => {
                warn!("Failed to get members of {}: {}", peer_id, err);
                Vec::new()
            }
        }
    }

    /// "First Last" for a user, or `ID: <id>` when the profile cannot be fetched.
    pub async fn display_name(&self, user_id: UserId) -> String {
        match self.resolve_profile(&user_id.to_string()).await {
            Ok(profile) => profile.display_name(),
            Err(_) => format!("ID: {user_id}"),
        }
    }
}
