#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use vk_warden::{
    base::{
        config::{Config, ConfigInner},
        text,
        types::{IncomingMessage, MessageId, PeerId, Res, Role, UserId, Void},
    },
    interaction::{
        access,
        audit::AuditAction,
        chat_event, command, mention,
        moderation::{AUTO_BAN_REASON, DURATION_HINT, MASSKICK_LIMIT},
    },
    runtime::Runtime,
    service::{
        chat::{ChatClient, DeleteStrategy, GenericChatClient, Member, Profile},
        db::DbClient,
    },
};

const PEER: PeerId = 2_000_000_001;
const LOG_PEER: PeerId = 2_000_000_099;
const OWNER: UserId = 1;

// Mocks.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn poll_events(&self) -> Res<Vec<IncomingMessage>>;
        async fn send_message(&self, peer_id: PeerId, text: &str) -> Res<MessageId>;
        async fn delete_message_with(&self, peer_id: PeerId, message_id: MessageId, strategy: DeleteStrategy) -> Void;
        async fn delete_messages(&self, peer_id: PeerId, message_ids: &[MessageId]) -> Void;
        async fn get_conversation_members(&self, peer_id: PeerId) -> Res<Vec<Member>>;
        async fn get_conversation_owner(&self, peer_id: PeerId) -> Res<Option<UserId>>;
        async fn resolve_profile(&self, handle_or_id: &str) -> Res<Profile>;
        async fn remove_member(&self, peer_id: PeerId, user_id: UserId) -> Void;
        async fn get_message_history(&self, peer_id: PeerId, count: u32) -> Res<Vec<MessageId>>;
    }
}

/// Everything the mocked chat client observed.
#[derive(Clone, Default)]
struct Recorded {
    sent: Arc<Mutex<Vec<(PeerId, String)>>>,
    removed: Arc<Mutex<Vec<UserId>>>,
    deleted: Arc<Mutex<Vec<(PeerId, MessageId)>>>,
}

impl Recorded {
    fn replies(&self) -> Vec<String> {
        self.sent.lock().iter().filter(|(peer, _)| *peer == PEER).map(|(_, text)| text.clone()).collect()
    }

    fn audit_count(&self, action: AuditAction) -> usize {
        let header = format!("{} {}", action.icon(), action.label());

        self.sent.lock().iter().filter(|(peer, text)| *peer == LOG_PEER && text.starts_with(&header)).count()
    }
}

fn get_mock_chat(recorded: &Recorded, profiles_resolve: bool) -> MockChat {
    let mut mock = MockChat::new();

    let sent = recorded.sent.clone();
    let removed = recorded.removed.clone();
    let deleted = recorded.deleted.clone();

    mock.expect_poll_events().returning(|| Ok(Vec::new()));
    mock.expect_send_message().returning(move |peer_id, text| {
        sent.lock().push((peer_id, text.to_string()));
        Ok(1)
    });
    mock.expect_delete_message_with().returning(move |peer_id, message_id, _| {
        deleted.lock().push((peer_id, message_id));
        Ok(())
    });
    mock.expect_delete_messages().returning(|_, _| Ok(()));
    mock.expect_get_conversation_members().returning(|_| Ok(Vec::new()));
    mock.expect_get_conversation_owner().returning(|_| Ok(Some(OWNER)));
    mock.expect_resolve_profile().returning(move |handle| match handle.parse::<UserId>() {
        Ok(id) if profiles_resolve => Ok(Profile {
            id,
            first_name: "User".to_string(),
            last_name: id.to_string(),
        }),
        _ => Err(anyhow::anyhow!("profile not found")),
    });
    mock.expect_remove_member().returning(move |_, user_id| {
        removed.lock().push(user_id);
        Ok(())
    });
    mock.expect_get_message_history().returning(|_, _| Ok(Vec::new()));

    mock
}

/// Helper function to setup the test environment.
async fn setup_test_environment(cooldown_secs: u64, profiles_resolve: bool) -> (Runtime, Recorded) {
    let config = Config {
        inner: Arc::new(ConfigInner {
            vk_group_id: 42,
            vk_api_token: "test".to_string(),
            command_cooldown_secs: cooldown_secs,
            log_peer_id: Some(LOG_PEER),
            max_concurrent_tasks: 4,
            ..Default::default()
        }),
    };

    // Initialize the database (using in-memory for tests).
    let db = DbClient::surreal_memory().await.expect("Failed to create DB client");

    let recorded = Recorded::default();
    let chat = ChatClient::new(Arc::new(get_mock_chat(&recorded, profiles_resolve)));

    (Runtime::with_services(config, db, chat), recorded)
}

fn message(from_id: UserId, text: &str) -> IncomingMessage {
    IncomingMessage {
        peer_id: PEER,
        from_id,
        id: 0,
        conversation_message_id: 77,
        text: text.to_string(),
        reply_from_id: None,
    }
}

fn reply(from_id: UserId, text: &str, reply_from_id: UserId) -> IncomingMessage {
    IncomingMessage {
        reply_from_id: Some(reply_from_id),
        ..message(from_id, text)
    }
}

/// Routes and executes a message to completion.
async fn run_message(rt: &Runtime, message: IncomingMessage) {
    if let Some(invocation) = command::route(rt, &message).await.expect("Failed to route") {
        command::execute(invocation).await;
    }
}

/// Routes and executes a command to completion.
async fn run(rt: &Runtime, from_id: UserId, text: &str) {
    run_message(rt, message(from_id, text)).await;
}

// Access.

#[tokio::test]
async fn test_role_ordering_and_owner_override() {
    let (rt, _) = setup_test_environment(0, true).await;

    rt.db.set_global_role(10, Role::Moderator).await.unwrap();

    assert!(access::has_minimum(&rt, 10, PEER, Role::User).await.unwrap());
    assert!(access::has_minimum(&rt, 10, PEER, Role::Moderator).await.unwrap());
    assert!(!access::has_minimum(&rt, 10, PEER, Role::SeniorModerator).await.unwrap());

    // The owner holds no stored role at all.
    assert!(access::has_minimum(&rt, OWNER, PEER, Role::Creator).await.unwrap());
}

#[tokio::test]
async fn test_conversation_role_shadows_global_role() {
    let (rt, _) = setup_test_environment(0, true).await;

    rt.db.set_global_role(11, Role::Admin).await.unwrap();
    rt.db.set_conversation_role(11, PEER, Role::User).await.unwrap();

    assert_eq!(access::effective_role(&rt, 11, PEER).await.unwrap(), Role::User);
    assert_eq!(access::effective_role(&rt, 11, PEER + 1).await.unwrap(), Role::Admin);
    assert!(!access::is_staff(&rt, 11, PEER).await.unwrap());
}

// Moderation.

#[tokio::test]
async fn test_third_warning_bans_and_kicks() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    for _ in 0..3 {
        run(&rt, OWNER, "/warn 50 spam").await;
    }

    let ban = rt.db.get_ban(50).await.unwrap().expect("Expected a ban record");

    assert_eq!(ban.reason, AUTO_BAN_REASON);
    assert_eq!(*recorded.removed.lock(), vec![50]);
    assert_eq!(recorded.audit_count(AuditAction::Warn), 3);
    assert_eq!(recorded.audit_count(AuditAction::Ban), 1);
}

#[tokio::test]
async fn test_mute_deletes_messages_until_unmuted() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, OWNER, "/mute 50 30m flood").await;
    assert!(rt.db.get_mute(50).await.unwrap() > 0);

    chat_event::handle_message_internal(&rt, &message(50, "hello")).await.unwrap();

    assert!(recorded.replies().iter().any(|r| r.contains("you are muted")));
    assert_eq!(rt.drain_deletions().await, 1);
    assert_eq!(*recorded.deleted.lock(), vec![(PEER, 77)]);

    run(&rt, OWNER, "/unmute 50").await;
    chat_event::handle_message_internal(&rt, &message(50, "hello again")).await.unwrap();

    assert_eq!(rt.drain_deletions().await, 0);
    assert_eq!(recorded.audit_count(AuditAction::Mute), 1);
    assert_eq!(recorded.audit_count(AuditAction::Unmute), 1);
}

#[tokio::test]
async fn test_invalid_mute_duration_stores_nothing() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, OWNER, "/mute 50 abc flood").await;
    run(&rt, OWNER, "/mute 50 106751991167300d flood").await;

    assert_eq!(rt.db.get_mute(50).await.unwrap(), 0);
    assert_eq!(recorded.replies().iter().filter(|r| r.as_str() == DURATION_HINT).count(), 2);
    assert_eq!(recorded.audit_count(AuditAction::Mute), 0);
}

#[tokio::test]
async fn test_overflowing_mute_is_an_error_in_the_store() {
    let (rt, _) = setup_test_environment(0, true).await;

    assert!(rt.db.set_mute(50, i64::MAX, "flood").await.is_err());
    assert_eq!(rt.db.get_mute(50).await.unwrap(), 0);
}

#[tokio::test]
async fn test_muted_staff_are_not_silenced() {
    let (rt, _) = setup_test_environment(0, true).await;

    rt.db.set_mute(12, 600, "test").await.unwrap();
    rt.db.set_conversation_role(12, PEER, Role::Moderator).await.unwrap();

    chat_event::handle_message_internal(&rt, &message(12, "hello")).await.unwrap();

    assert_eq!(rt.drain_deletions().await, 0);
}

#[tokio::test]
async fn test_staff_protection_blocks_ban() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    rt.db.set_conversation_role(20, PEER, Role::SeniorModerator).await.unwrap();
    rt.db.set_conversation_role(21, PEER, Role::Moderator).await.unwrap();

    run(&rt, 20, "/ban 21 spam").await;

    assert!(rt.db.get_ban(21).await.unwrap().is_none());
    assert_eq!(recorded.audit_count(AuditAction::Ban), 0);
    assert!(recorded.removed.lock().is_empty());
    assert!(recorded.replies().iter().any(|r| r.starts_with("⛔")));
}

#[tokio::test]
async fn test_insufficient_role_is_rejected() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, 30, "/kick 50").await;

    assert!(recorded.removed.lock().is_empty());
    assert_eq!(recorded.replies(), vec![text::insufficient_rights(30)]);
}

#[tokio::test]
async fn test_unban_without_ban_is_a_no_op() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, OWNER, "/unban 50").await;

    assert!(recorded.replies().iter().any(|r| r.contains("was not banned")));
    assert_eq!(recorded.audit_count(AuditAction::Unban), 0);
}

#[tokio::test]
async fn test_masskick_is_capped() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    let ids = (100..130).map(|id| id.to_string()).collect::<Vec<_>>().join(" ");
    run(&rt, OWNER, &format!("/masskick {ids}")).await;

    assert_eq!(recorded.removed.lock().len(), MASSKICK_LIMIT);
    assert!(recorded.replies().iter().any(|r| r.contains("Kicked 20 of 20")));
    assert_eq!(recorded.audit_count(AuditAction::MassKick), 1);
}

#[tokio::test]
async fn test_removerole_requires_higher_rank() {
    let (rt, _) = setup_test_environment(0, true).await;

    rt.db.set_conversation_role(40, PEER, Role::SeniorModerator).await.unwrap();
    rt.db.set_conversation_role(41, PEER, Role::SeniorModerator).await.unwrap();
    rt.db.set_conversation_role(42, PEER, Role::Moderator).await.unwrap();

    run(&rt, 40, "/removerole 41").await;
    assert_eq!(access::effective_role(&rt, 41, PEER).await.unwrap(), Role::SeniorModerator);

    run(&rt, 40, "/removerole 42").await;
    assert_eq!(access::effective_role(&rt, 42, PEER).await.unwrap(), Role::User);
}

// Replies.

#[tokio::test]
async fn test_reply_kick_targets_the_replied_author() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run_message(&rt, reply(OWNER, "/kick", 50)).await;

    assert_eq!(*recorded.removed.lock(), vec![50]);
    assert_eq!(recorded.audit_count(AuditAction::Kick), 1);
}

#[tokio::test]
async fn test_reply_mute_takes_duration_and_reason() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run_message(&rt, reply(OWNER, "/mute 30m flood", 50)).await;

    assert!(rt.db.get_mute(50).await.unwrap() > 0);
    assert_eq!(recorded.audit_count(AuditAction::Mute), 1);
}

#[tokio::test]
async fn test_bare_reply_warn_asks_for_reason() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run_message(&rt, reply(OWNER, "/warn", 50)).await;

    assert_eq!(recorded.replies(), vec!["❗ Specify the reason.".to_string()]);
    assert_eq!(rt.db.get_warning_count(50).await.unwrap(), 0);
    assert_eq!(recorded.audit_count(AuditAction::Warn), 0);
}

#[tokio::test]
async fn test_reply_role_change_asks_for_reason() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run_message(&rt, reply(OWNER, "/addmoder", 50)).await;

    assert_eq!(recorded.replies(), vec!["❗ Specify the reason for the role change.".to_string()]);
    assert_eq!(rt.db.get_role(50, Some(PEER)).await.unwrap(), Role::User);

    run_message(&rt, reply(OWNER, "/addmoder promotion", 50)).await;

    assert_eq!(rt.db.get_role(50, Some(PEER)).await.unwrap(), Role::Moderator);
    assert!(recorded.sent.lock().iter().any(|(peer, text)| *peer == LOG_PEER && text.contains("(promotion)")));
}

// Dispatch gates.

#[tokio::test]
async fn test_cooldown_sends_spam_notice() {
    let (rt, recorded) = setup_test_environment(60, true).await;

    run(&rt, 30, "/getid").await;
    run(&rt, 30, "/getid").await;

    assert_eq!(recorded.replies(), vec!["📌 Your ID: 30".to_string(), text::spam_notice(30)]);
}

#[tokio::test]
async fn test_quiet_mode_ignores_regular_members() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, OWNER, "/quiet").await;
    let before = recorded.replies().len();

    run(&rt, 30, "/getid").await;
    assert_eq!(recorded.replies().len(), before);

    run(&rt, OWNER, "/getid").await;
    assert_eq!(recorded.replies().len(), before + 1);
}

#[tokio::test]
async fn test_unknown_commands_are_dropped() {
    let (rt, recorded) = setup_test_environment(0, true).await;

    run(&rt, OWNER, "/nosuchcommand").await;

    assert!(recorded.sent.lock().is_empty());
}

// Mentions.

#[tokio::test]
async fn test_failed_profile_lookup_resolves_to_nothing() {
    let (rt, _) = setup_test_environment(0, false).await;

    assert_eq!(mention::resolve_user(&rt.chat, "@nobody").await, None);
    assert_eq!(mention::resolve_user(&rt.chat, "[id7|Bob]").await, Some(7));
    assert_eq!(mention::resolve_user(&rt.chat, "https://vk.com/id8").await, Some(8));
}
