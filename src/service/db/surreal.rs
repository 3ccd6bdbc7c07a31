//! SurrealDB implementation of the moderation store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::{
    RecordId, Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    time,
    types::{PeerId, Res, Role, UserId, Void},
};

use super::{BanRecord, DbClient, GenericDbClient, INACTIVE_MESSAGE_THRESHOLD, MutedUser, UserRecord, UserSummary, WarningEntry};

// Extra methods on `DbClient` applied by the SurrealDB implementation.

impl DbClient {
    /// Connects to the configured SurrealDB endpoint.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a store backed by a fresh in-memory engine.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::connect("mem://", None, "vk_warden", "bot").await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Queries.

const SCHEMA: &str = r#"
    DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS user_nickname ON user FIELDS nickname;
    DEFINE TABLE IF NOT EXISTS warning SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS warning_user ON warning FIELDS user_id;
    DEFINE TABLE IF NOT EXISTS ban SCHEMALESS;
    DEFINE TABLE IF NOT EXISTS conversation_role SCHEMALESS;
    DEFINE INDEX IF NOT EXISTS conversation_role_peer ON conversation_role FIELDS peer_id;
"#;

/// Creates the user row if missing, leaving existing values intact.
const ENSURE_USER: &str = r#"
    UPSERT type::thing('user', $user_id) SET
        user_id = $user_id,
        role = role ?? 'user',
        messages_count = messages_count ?? 0,
        warns = warns ?? 0,
        mute_until = mute_until ?? 0,
        reg_date = reg_date ?? $now
    RETURN NONE;
"#;

const USER_FIELDS: &str = "user_id, nickname, role, messages_count, warns, mute_until, ban_reason, reg_date";

// Structs.

#[derive(Debug, Deserialize)]
struct RecordRef {
    id: RecordId,
}

/// SurrealDB client implementation.
struct SurrealDbClient {
    db: Surreal<Any>,
    /// Serializes every operation so read-modify-write sequences never interleave.
    lock: Mutex<()>,
}

impl SurrealDbClient {
    /// Create a new database client from the application configuration.
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    async fn new(config: &Config) -> Res<Self> {
        let credentials = match (&config.db_username, &config.db_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        };

        Self::connect(&config.db_endpoint, credentials, &config.db_namespace, &config.db_database).await
    }

    async fn connect(endpoint: &str, credentials: Option<(&str, &str)>, namespace: &str, database: &str) -> Res<Self> {
        let db = any::connect(endpoint).await?;

        if let Some((username, password)) = credentials {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        db.query(SCHEMA).await?.check()?;

        info!("Database initialized at `{}`.", endpoint);

        Ok(Self { db, lock: Mutex::new(()) })
    }

    /// Runs [`ENSURE_USER`] without taking the lock; callers hold it.
    async fn ensure_user_locked(&self, user_id: UserId) -> Void {
        self.db.query(ENSURE_USER).bind(("user_id", user_id)).bind(("now", time::now())).await?.check()?;
        Ok(())
    }

    async fn global_role_locked(&self, user_id: UserId) -> Res<Role> {
        let roles: Vec<Role> = self.db.query("SELECT VALUE role FROM type::thing('user', $user_id)").bind(("user_id", user_id)).await?.take(0)?;

        Ok(roles.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn ensure_user(&self, user_id: UserId) -> Void {
        let _guard = self.lock.lock().await;
        self.ensure_user_locked(user_id).await
    }

    #[instrument(skip(self))]
    async fn record_message(&self, user_id: UserId) -> Void {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query("UPDATE type::thing('user', $user_id) SET messages_count += 1 RETURN NONE")
            .bind(("user_id", user_id))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: UserId) -> Res<Option<UserRecord>> {
        let _guard = self.lock.lock().await;

        let users: Vec<UserRecord> = self
            .db
            .query(format!("SELECT {USER_FIELDS} FROM type::thing('user', $user_id)"))
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        Ok(users.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn set_nickname(&self, user_id: UserId, nickname: &str) -> Void {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query("UPDATE type::thing('user', $user_id) SET nickname = $nickname RETURN NONE")
            .bind(("user_id", user_id))
            .bind(("nickname", nickname.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_nickname(&self, user_id: UserId) -> Res<bool> {
        let _guard = self.lock.lock().await;

        let updated: Vec<UserId> = self
            .db
            .query("UPDATE type::thing('user', $user_id) SET nickname = NONE RETURN VALUE user_id")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        Ok(!updated.is_empty())
    }

    #[instrument(skip(self))]
    async fn find_users_by_nickname(&self, query: &str) -> Res<Vec<UserSummary>> {
        let _guard = self.lock.lock().await;

        let users = self
            .db
            .query("SELECT user_id, nickname, role FROM user WHERE nickname AND string::contains(string::lowercase(nickname), string::lowercase($query))")
            .bind(("query", query.to_string()))
            .await?
            .take(0)?;

        Ok(users)
    }

    #[instrument(skip(self))]
    async fn users_with_nicknames(&self) -> Res<Vec<UserSummary>> {
        let _guard = self.lock.lock().await;

        let users = self.db.query("SELECT user_id, nickname, role FROM user WHERE nickname ORDER BY nickname ASC").await?.take(0)?;

        Ok(users)
    }

    #[instrument(skip(self))]
    async fn users_without_nicknames(&self) -> Res<Vec<UserSummary>> {
        let _guard = self.lock.lock().await;

        let users = self.db.query("SELECT user_id, role FROM user WHERE !nickname ORDER BY user_id ASC").await?.take(0)?;

        Ok(users)
    }

    #[instrument(skip(self, reason))]
    async fn add_warning(&self, user_id: UserId, reason: &str) -> Res<i64> {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;

        let mut response = self
            .db
            .query(
                "CREATE warning SET user_id = $user_id, user = type::thing('user', $user_id), reason = $reason, timestamp = $now, created = time::now() RETURN NONE",
            )
            .query("UPDATE type::thing('user', $user_id) SET warns += 1 RETURN VALUE warns")
            .bind(("user_id", user_id))
            .bind(("reason", reason.to_string()))
            .bind(("now", time::now()))
            .await?;

        let counts: Vec<i64> = response.take(1)?;

        Ok(counts.into_iter().next().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn remove_warning(&self, user_id: UserId) -> Res<i64> {
        let _guard = self.lock.lock().await;

        let latest: Vec<RecordRef> = self
            .db
            .query("SELECT id, created FROM warning WHERE user_id = $user_id ORDER BY created DESC LIMIT 1")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        let Some(latest) = latest.into_iter().next() else {
            return Ok(0);
        };

        let mut response = self
            .db
            .query("DELETE $warning")
            .query("UPDATE type::thing('user', $user_id) SET warns = math::max([warns - 1, 0]) RETURN VALUE warns")
            .bind(("warning", latest.id))
            .bind(("user_id", user_id))
            .await?;

        let counts: Vec<i64> = response.take(1)?;

        Ok(counts.into_iter().next().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_warning_count(&self, user_id: UserId) -> Res<i64> {
        let _guard = self.lock.lock().await;

        let counts: Vec<i64> = self.db.query("SELECT VALUE warns FROM type::thing('user', $user_id)").bind(("user_id", user_id)).await?.take(0)?;

        Ok(counts.into_iter().next().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn warning_history(&self, user_id: UserId) -> Res<Vec<WarningEntry>> {
        let _guard = self.lock.lock().await;

        let warnings = self
            .db
            .query("SELECT user_id, user.nickname AS nickname, reason, timestamp, created FROM warning WHERE user_id = $user_id ORDER BY created DESC")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        Ok(warnings)
    }

    #[instrument(skip(self))]
    async fn all_warnings(&self) -> Res<Vec<WarningEntry>> {
        let _guard = self.lock.lock().await;

        let warnings = self.db.query("SELECT user_id, user.nickname AS nickname, reason, timestamp, created FROM warning ORDER BY created DESC").await?.take(0)?;

        Ok(warnings)
    }

    #[instrument(skip(self, reason))]
    async fn set_mute(&self, user_id: UserId, duration_secs: i64, reason: &str) -> Res<i64> {
        let _guard = self.lock.lock().await;

        let mute_until = time::now().checked_add(duration_secs).ok_or_else(|| anyhow::anyhow!("Mute duration out of range."))?;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query("UPDATE type::thing('user', $user_id) SET mute_until = $mute_until, mute_reason = $reason RETURN NONE")
            .bind(("user_id", user_id))
            .bind(("mute_until", mute_until))
            .bind(("reason", reason.to_string()))
            .await?
            .check()?;

        Ok(mute_until)
    }

    #[instrument(skip(self))]
    async fn remove_mute(&self, user_id: UserId) -> Res<bool> {
        let _guard = self.lock.lock().await;

        let updated: Vec<UserId> = self
            .db
            .query("UPDATE type::thing('user', $user_id) SET mute_until = 0, mute_reason = NONE WHERE mute_until > 0 RETURN VALUE user_id")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        Ok(!updated.is_empty())
    }

    #[instrument(skip(self))]
    async fn get_mute(&self, user_id: UserId) -> Res<i64> {
        let _guard = self.lock.lock().await;

        let mutes: Vec<i64> = self.db.query("SELECT VALUE mute_until FROM type::thing('user', $user_id)").bind(("user_id", user_id)).await?.take(0)?;

        Ok(mutes.into_iter().next().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn muted_users(&self) -> Res<Vec<MutedUser>> {
        let _guard = self.lock.lock().await;

        let users = self
            .db
            .query("SELECT user_id, nickname, mute_until FROM user WHERE mute_until > $now ORDER BY mute_until ASC")
            .bind(("now", time::now()))
            .await?
            .take(0)?;

        Ok(users)
    }

    #[instrument(skip(self, reason))]
    async fn ban(&self, user_id: UserId, reason: &str) -> Void {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query("UPSERT type::thing('ban', $user_id) CONTENT { user_id: $user_id, user: type::thing('user', $user_id), reason: $reason, ban_timestamp: $now } RETURN NONE")
            .query("UPDATE type::thing('user', $user_id) SET ban_reason = $reason RETURN NONE")
            .bind(("user_id", user_id))
            .bind(("reason", reason.to_string()))
            .bind(("now", time::now()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn unban(&self, user_id: UserId) -> Res<bool> {
        let _guard = self.lock.lock().await;

        let mut response = self
            .db
            .query("DELETE type::thing('ban', $user_id) RETURN BEFORE")
            .query("UPDATE type::thing('user', $user_id) SET ban_reason = NONE RETURN NONE")
            .bind(("user_id", user_id))
            .await?;

        let removed: Vec<RecordRef> = response.take(0)?;

        Ok(!removed.is_empty())
    }

    #[instrument(skip(self))]
    async fn get_ban(&self, user_id: UserId) -> Res<Option<BanRecord>> {
        let _guard = self.lock.lock().await;

        let bans: Vec<BanRecord> = self
            .db
            .query("SELECT user_id, user.nickname AS nickname, reason, ban_timestamp FROM type::thing('ban', $user_id)")
            .bind(("user_id", user_id))
            .await?
            .take(0)?;

        Ok(bans.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn banned_users(&self) -> Res<Vec<BanRecord>> {
        let _guard = self.lock.lock().await;

        let bans = self.db.query("SELECT user_id, user.nickname AS nickname, reason, ban_timestamp FROM ban ORDER BY ban_timestamp DESC").await?.take(0)?;

        Ok(bans)
    }

    #[instrument(skip(self))]
    async fn set_conversation_role(&self, user_id: UserId, peer_id: PeerId, role: Role) -> Void {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query(
                "UPSERT type::thing('conversation_role', [$user_id, $peer_id]) CONTENT { user_id: $user_id, peer_id: $peer_id, user: type::thing('user', $user_id), role: $role } RETURN NONE",
            )
            .bind(("user_id", user_id))
            .bind(("peer_id", peer_id))
            .bind(("role", role.as_str()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_global_role(&self, user_id: UserId, role: Role) -> Void {
        let _guard = self.lock.lock().await;

        self.ensure_user_locked(user_id).await?;
        self.db
            .query("UPDATE type::thing('user', $user_id) SET role = $role RETURN NONE")
            .bind(("user_id", user_id))
            .bind(("role", role.as_str()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_role(&self, user_id: UserId, peer_id: Option<PeerId>) -> Res<Role> {
        let _guard = self.lock.lock().await;

        if let Some(peer_id) = peer_id {
            let roles: Vec<Role> = self
                .db
                .query("SELECT VALUE role FROM type::thing('conversation_role', [$user_id, $peer_id])")
                .bind(("user_id", user_id))
                .bind(("peer_id", peer_id))
                .await?
                .take(0)?;

            if let Some(role) = roles.into_iter().next() {
                return Ok(role);
            }
        }

        self.global_role_locked(user_id).await
    }

    #[instrument(skip(self))]
    async fn staff(&self, peer_id: Option<PeerId>) -> Res<Vec<UserSummary>> {
        let _guard = self.lock.lock().await;

        let mut staff: Vec<UserSummary> = match peer_id {
            Some(peer_id) => self
                .db
                .query("SELECT user_id, user.nickname AS nickname, role FROM conversation_role WHERE peer_id = $peer_id AND role != 'user'")
                .bind(("peer_id", peer_id))
                .await?
                .take(0)?,
            None => self.db.query("SELECT user_id, nickname, role FROM user WHERE role != 'user'").await?.take(0)?,
        };

        staff.sort_by(|a, b| b.role.cmp(&a.role).then(a.user_id.cmp(&b.user_id)));

        Ok(staff)
    }

    #[instrument(skip(self))]
    async fn inactive_users(&self, days: i64) -> Res<Vec<UserRecord>> {
        let _guard = self.lock.lock().await;

        let threshold = time::now() - days.saturating_mul(86_400);

        let users = self
            .db
            .query(format!("SELECT {USER_FIELDS} FROM user WHERE reg_date < $threshold AND messages_count < $limit ORDER BY reg_date ASC"))
            .bind(("threshold", threshold))
            .bind(("limit", INACTIVE_MESSAGE_THRESHOLD))
            .await?
            .take(0)?;

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> DbClient {
        DbClient::surreal_memory().await.unwrap()
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent() {
        let db = store().await;

        db.record_message(1).await.unwrap();
        db.ensure_user(1).await.unwrap();
        db.record_message(1).await.unwrap();

        let user = db.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.messages_count, 2);
        assert_eq!(user.role, Role::User);
        assert!(user.reg_date > 0);
    }

    #[tokio::test]
    async fn warnings_count_up_and_down_with_floor() {
        let db = store().await;

        assert_eq!(db.add_warning(7, "spam").await.unwrap(), 1);
        assert_eq!(db.add_warning(7, "flood").await.unwrap(), 2);
        assert_eq!(db.remove_warning(7).await.unwrap(), 1);

        let history = db.warning_history(7).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "spam");

        assert_eq!(db.remove_warning(7).await.unwrap(), 0);
        assert_eq!(db.remove_warning(7).await.unwrap(), 0);
        assert_eq!(db.get_warning_count(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ban_is_replaced_and_unban_reports_absence() {
        let db = store().await;

        db.ban(5, "first").await.unwrap();
        db.ban(5, "second").await.unwrap();

        assert_eq!(db.banned_users().await.unwrap().len(), 1);
        assert_eq!(db.get_ban(5).await.unwrap().unwrap().reason, "second");

        assert!(db.unban(5).await.unwrap());
        assert!(!db.unban(5).await.unwrap());
        assert!(db.get_ban(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversation_role_shadows_global_role_in_its_conversation_only() {
        let db = store().await;

        db.set_global_role(3, Role::Moderator).await.unwrap();
        db.set_conversation_role(3, 2_000_000_001, Role::Admin).await.unwrap();

        assert_eq!(db.get_role(3, Some(2_000_000_001)).await.unwrap(), Role::Admin);
        assert_eq!(db.get_role(3, Some(2_000_000_002)).await.unwrap(), Role::Moderator);
        assert_eq!(db.get_role(3, None).await.unwrap(), Role::Moderator);
    }

    #[tokio::test]
    async fn nicknames_are_searchable() {
        let db = store().await;

        db.set_nickname(1, "Night Owl").await.unwrap();
        db.ensure_user(2).await.unwrap();

        let found = db.find_users_by_nickname("owl").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, 1);

        assert_eq!(db.users_with_nicknames().await.unwrap().len(), 1);
        assert_eq!(db.users_without_nicknames().await.unwrap()[0].user_id, 2);

        assert!(db.remove_nickname(1).await.unwrap());
        assert!(!db.remove_nickname(99).await.unwrap());
    }

    #[tokio::test]
    async fn staff_is_ordered_by_role() {
        let db = store().await;
        let peer = 2_000_000_001;

        db.set_conversation_role(1, peer, Role::Moderator).await.unwrap();
        db.set_conversation_role(2, peer, Role::Creator).await.unwrap();
        db.set_conversation_role(3, peer, Role::User).await.unwrap();

        let staff = db.staff(Some(peer)).await.unwrap();
        assert_eq!(staff.iter().map(|s| s.user_id).collect::<Vec<_>>(), vec![2, 1]);
    }
}
