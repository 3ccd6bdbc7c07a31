use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::base::types::{PeerId, Res, Role, UserId, Void};

pub mod surreal;

// Records.

/// A user as stored by the moderation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Global role; conversation overrides live in their own table.
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub messages_count: i64,
    #[serde(default)]
    pub warns: i64,
    /// Unix timestamp the mute ends at; `0` when not muted.
    #[serde(default)]
    pub mute_until: i64,
    #[serde(default)]
    pub ban_reason: Option<String>,
    #[serde(default)]
    pub reg_date: i64,
}

/// The short form of a user used by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// A single warning log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    pub reason: String,
    pub timestamp: i64,
}

/// A ban record; its presence is authoritative for ban state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    pub reason: String,
    pub ban_timestamp: i64,
}

/// A user whose mute has not yet expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutedUser {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    pub mute_until: i64,
}

/// Users registered before the threshold with fewer messages than this are inactive.
pub const INACTIVE_MESSAGE_THRESHOLD: i64 = 5;

// Traits.

/// Generic database client trait that clients must implement.
///
/// This trait defines the moderation state the bot persists: users and
/// their counters, the warning log, bans, and conversation-scoped roles.
/// Implementations must serialize all operations through a single
/// mutual-exclusion domain so counter updates are never lost.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Creates the user if it does not exist yet, stamping the registration date.
    async fn ensure_user(&self, user_id: UserId) -> Void;

    /// Increments the message counter, creating the user if needed.
    async fn record_message(&self, user_id: UserId) -> Void;

    /// Gets a user by id.
    async fn get_user(&self, user_id: UserId) -> Res<Option<UserRecord>>;

    /// Sets the nickname of a user.
    async fn set_nickname(&self, user_id: UserId, nickname: &str) -> Void;

    /// Clears the nickname of a user; returns `false` if the user is unknown.
    async fn remove_nickname(&self, user_id: UserId) -> Res<bool>;

    /// Finds users whose nickname contains `query`, case-insensitively.
    async fn find_users_by_nickname(&self, query: &str) -> Res<Vec<UserSummary>>;

    /// Lists every user with a nickname.
    async fn users_with_nicknames(&self) -> Res<Vec<UserSummary>>;

    /// Lists every user without a nickname.
    async fn users_without_nicknames(&self) -> Res<Vec<UserSummary>>;

    /// Appends a warning and returns the new warning count.
    async fn add_warning(&self, user_id: UserId, reason: &str) -> Res<i64>;

    /// Deletes the most recent warning and returns the new warning count (floored at zero).
    async fn remove_warning(&self, user_id: UserId) -> Res<i64>;

    /// Gets the warning count of a user.
    async fn get_warning_count(&self, user_id: UserId) -> Res<i64>;

    /// Warnings of one user, newest first.
    async fn warning_history(&self, user_id: UserId) -> Res<Vec<WarningEntry>>;

    /// Warnings of every user, newest first.
    async fn all_warnings(&self) -> Res<Vec<WarningEntry>>;

    /// Mutes a user for `duration_secs`, returning the end timestamp.
    async fn set_mute(&self, user_id: UserId, duration_secs: i64, reason: &str) -> Res<i64>;

    /// Lifts a mute; returns `false` if the user is unknown or was never muted.
    async fn remove_mute(&self, user_id: UserId) -> Res<bool>;

    /// The mute end timestamp, or `0` when not muted.
    async fn get_mute(&self, user_id: UserId) -> Res<i64>;

    /// Users whose mute ends in the future.
    async fn muted_users(&self) -> Res<Vec<MutedUser>>;

    /// Bans a user, replacing any previous ban record.
    async fn ban(&self, user_id: UserId, reason: &str) -> Void;

    /// Removes a ban; returns `false` if there was no ban record.
    async fn unban(&self, user_id: UserId) -> Res<bool>;

    /// Gets the ban record of a user.
    async fn get_ban(&self, user_id: UserId) -> Res<Option<BanRecord>>;

    /// Every ban record, newest first.
    async fn banned_users(&self) -> Res<Vec<BanRecord>>;

    /// Upserts a conversation-scoped role.
    async fn set_conversation_role(&self, user_id: UserId, peer_id: PeerId, role: Role) -> Void;

    /// Sets the global role of a user.
    async fn set_global_role(&self, user_id: UserId, role: Role) -> Void;

    /// The conversation role if `peer_id` is given and an override exists; the global role otherwise.
    async fn get_role(&self, user_id: UserId, peer_id: Option<PeerId>) -> Res<Role>;

    /// Staff of a conversation (its overrides) or global staff, highest role first.
    async fn staff(&self, peer_id: Option<PeerId>) -> Res<Vec<UserSummary>>;

    /// Users registered more than `days` ago with fewer than [`INACTIVE_MESSAGE_THRESHOLD`] messages.
    async fn inactive_users(&self, days: i64) -> Res<Vec<UserRecord>>;
}

// Structs.

/// Database client for vk-warden.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
