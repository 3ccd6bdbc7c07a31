//! Shared identifiers, roles, and result aliases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The error type used across the crate.
pub type Err = anyhow::Error;
/// A result with the crate error type.
pub type Res<T> = Result<T, Err>;
/// A result carrying no value.
pub type Void = Res<()>;

/// A VK user identifier.
pub type UserId = i64;
/// A VK peer (conversation) identifier.
pub type PeerId = i64;
/// A VK message identifier (either global or conversation-relative, depending on context).
pub type MessageId = i64;

/// Peer ids above this value are group conversations; `peer_id - GROUP_PEER_OFFSET` is the chat id.
pub const GROUP_PEER_OFFSET: PeerId = 2_000_000_000;

/// Returns `true` if the peer is a group conversation rather than a direct message.
pub fn is_group_peer(peer_id: PeerId) -> bool {
    peer_id > GROUP_PEER_OFFSET
}

/// Moderation roles, ordered from least to most privileged.
///
/// Authorization always compares [`Role::rank`], never names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A regular member.
    #[default]
    User,
    /// Can warn, mute, and kick.
    Moderator,
    /// Can also ban and grant moderator.
    SeniorModerator,
    /// Can also toggle quiet mode and grant senior moderator.
    Admin,
    /// Can also grant and revoke admin.
    Creator,
}

impl Role {
    /// All roles, highest first.
    pub const DESCENDING: [Role; 5] = [Role::Creator, Role::Admin, Role::SeniorModerator, Role::Moderator, Role::User];

    /// Numeric rank of the role in the hierarchy.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Returns `true` if this role is at least `required`.
    pub fn at_least(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Returns `true` for any role at or above `moderator`.
    pub fn is_staff(self) -> bool {
        self.at_least(Role::Moderator)
    }

    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::SeniorModerator => "senior_moderator",
            Role::Admin => "admin",
            Role::Creator => "creator",
        }
    }

    /// Human-readable role name.
    pub fn title(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Moderator => "Moderator",
            Role::SeniorModerator => "Senior moderator",
            Role::Admin => "Administrator",
            Role::Creator => "Creator",
        }
    }

    /// Icon shown next to the role name.
    pub fn emoji(self) -> &'static str {
        match self {
            Role::User => "👤",
            Role::Moderator => "👮",
            Role::SeniorModerator => "⭐",
            Role::Admin => "👑",
            Role::Creator => "🔱",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single inbound "new message" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// The conversation the message was posted to.
    pub peer_id: PeerId,
    /// The author.
    pub from_id: UserId,
    /// Global message id (0 for group conversations on newer API versions).
    pub id: MessageId,
    /// Conversation-relative message id.
    pub conversation_message_id: MessageId,
    /// Raw message text.
    pub text: String,
    /// Author of the message this one replies to, if any.
    pub reply_from_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_totally_ordered_by_rank() {
        let ascending = [Role::User, Role::Moderator, Role::SeniorModerator, Role::Admin, Role::Creator];

        for (i, lower) in ascending.iter().enumerate() {
            for higher in &ascending[i..] {
                assert!(higher.at_least(*lower), "{higher} should satisfy {lower}");
                assert!(higher >= lower);
            }
            for higher in &ascending[i + 1..] {
                assert!(!lower.at_least(*higher), "{lower} should not satisfy {higher}");
            }
        }
    }

    #[test]
    fn staff_starts_at_moderator() {
        assert!(!Role::User.is_staff());
        assert!(Role::Moderator.is_staff());
        assert!(Role::Creator.is_staff());
    }

    #[test]
    fn roles_serialize_as_snake_case() {
        assert_eq!(serde_json::to_string(&Role::SeniorModerator).unwrap(), "\"senior_moderator\"");
        assert_eq!(serde_json::from_str::<Role>("\"admin\"").unwrap(), Role::Admin);
    }

    #[test]
    fn group_peers_are_above_offset() {
        assert!(is_group_peer(2_000_000_001));
        assert!(!is_group_peer(123_456));
    }
}
