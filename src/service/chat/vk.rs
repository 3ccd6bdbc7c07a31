//! VK Bots API implementation of the chat client.
//!
//! Inbound events come from the Bots Long Poll API; every other call goes to
//! the regular method endpoint with the community token.

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::base::{
    config::Config,
    types::{GROUP_PEER_OFFSET, IncomingMessage, MessageId, PeerId, Res, UserId, Void, is_group_peer},
};

use super::{ChatClient, DeleteStrategy, GenericChatClient, Member, Profile};

// Extra methods on `ChatClient` applied by the VK implementation.

impl ChatClient {
    /// Creates a new VK chat client.
    pub fn vk(config: &Config) -> Res<Self> {
        let client = VkChatClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VkResponse<T> {
    Ok { response: T },
    Error { error: VkError },
}

#[derive(Debug, Deserialize)]
struct VkError {
    error_code: i64,
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct LongPollServer {
    key: String,
    server: String,
    ts: Value,
}

#[derive(Debug, Deserialize)]
struct LongPollResponse {
    #[serde(default)]
    ts: Option<Value>,
    #[serde(default)]
    updates: Vec<LongPollUpdate>,
    #[serde(default)]
    failed: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct LongPollUpdate {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: Value,
}

#[derive(Debug, Deserialize)]
struct MessageNew {
    message: VkMessage,
}

#[derive(Debug, Deserialize)]
struct VkMessage {
    #[serde(default)]
    id: MessageId,
    #[serde(default)]
    conversation_message_id: MessageId,
    peer_id: PeerId,
    from_id: UserId,
    #[serde(default)]
    text: String,
    #[serde(default)]
    reply_message: Option<VkReply>,
}

#[derive(Debug, Deserialize)]
struct VkReply {
    from_id: UserId,
}

impl From<VkMessage> for IncomingMessage {
    fn from(m: VkMessage) -> Self {
        Self {
            peer_id: m.peer_id,
            from_id: m.from_id,
            id: m.id,
            conversation_message_id: m.conversation_message_id,
            text: m.text.trim().to_string(),
            reply_from_id: m.reply_message.map(|r| r.from_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConversationMembers {
    #[serde(default)]
    items: Vec<ConversationMemberItem>,
    #[serde(default)]
    profiles: Vec<VkProfile>,
}

#[derive(Debug, Deserialize)]
struct ConversationMemberItem {
    member_id: UserId,
    #[serde(default)]
    is_owner: bool,
}

#[derive(Debug, Deserialize)]
struct VkProfile {
    id: UserId,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    online: u8,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    #[serde(default)]
    id: MessageId,
    #[serde(default)]
    conversation_message_id: MessageId,
}

/// Long poll session state.
#[derive(Debug, Clone)]
struct LongPollSession {
    server: String,
    key: String,
    ts: String,
}

fn ts_to_string(ts: &Value) -> String {
    match ts {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Structs.

/// VK client implementation.
struct VkChatClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    version: String,
    group_id: i64,
    wait_secs: u64,
    random_id: AtomicI64,
    session: Mutex<Option<LongPollSession>>,
}

impl VkChatClient {
    /// Create a new VK chat client.
    #[instrument(name = "VkChatClient::new", skip_all)]
    fn new(config: &Config) -> Res<Self> {
        let http = reqwest::Client::builder().connect_timeout(Duration::from_secs(10)).build()?;

        info!("VK client configured for group {}.", config.vk_group_id);

        Ok(Self {
            http,
            endpoint: config.vk_api_endpoint.trim_end_matches('/').to_string(),
            token: config.vk_api_token.clone(),
            version: config.vk_api_version.clone(),
            group_id: config.vk_group_id,
            wait_secs: config.long_poll_wait_secs,
            random_id: AtomicI64::new(chrono::Utc::now().timestamp_micros()),
            session: Mutex::new(None),
        })
    }

    /// Call a VK API method and unwrap the `response` envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Res<T> {
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.token.clone()));
        form.push(("v", self.version.clone()));

        let response: VkResponse<T> = self.http.post(format!("{}/{}", self.endpoint, method)).form(&form).send().await?.error_for_status()?.json().await?;

        match response {
            VkResponse::Ok { response } => Ok(response),
            VkResponse::Error { error } => Err(anyhow::anyhow!("VK API error {} in `{}`: {}", error.error_code, method, error.error_msg)),
        }
    }

    async fn open_session(&self) -> Res<LongPollSession> {
        let server: LongPollServer = self.call("groups.getLongPollServer", &[("group_id", self.group_id.to_string())]).await?;

        debug!("Opened long poll session on {}.", server.server);

        Ok(LongPollSession {
            server: server.server,
            key: server.key,
            ts: ts_to_string(&server.ts),
        })
    }
}

#[async_trait]
impl GenericChatClient for VkChatClient {
    async fn poll_events(&self) -> Res<Vec<IncomingMessage>> {
        let mut guard = self.session.lock().await;

        let session = match guard.as_ref() {
            Some(session) => session.clone(),
            None => {
                let session = self.open_session().await?;
                *guard = Some(session.clone());
                session
            }
        };

        let wait = self.wait_secs.to_string();

        let response: LongPollResponse = self
            .http
            .get(&session.server)
            .query(&[("act", "a_check"), ("key", session.key.as_str()), ("ts", session.ts.as_str()), ("wait", wait.as_str())])
            .timeout(Duration::from_secs(self.wait_secs + 10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.failed {
            // History is outdated; continue from the new `ts`.
            Some(1) => {
                if let (Some(state), Some(ts)) = (guard.as_mut(), response.ts.as_ref()) {
                    state.ts = ts_to_string(ts);
                }
                return Ok(Vec::new());
            }
            // Key expired or state lost; a fresh session is opened on the next poll.
            Some(code) => {
                warn!("Long poll session failed with code {}, reopening.", code);
                *guard = None;
                return Ok(Vec::new());
            }
            None => {}
        }

        if let (Some(state), Some(ts)) = (guard.as_mut(), response.ts.as_ref()) {
            state.ts = ts_to_string(ts);
        }

        drop(guard);

        let mut messages = Vec::new();

        for update in response.updates {
            if update.kind != "message_new" {
                debug!("Skipping `{}` event.", update.kind);
                continue;
            }

            match serde_json::from_value::<MessageNew>(update.object) {
                Ok(event) => messages.push(event.message.into()),
                Err(err) => warn!("Failed to parse message event: {}", err),
            }
        }

        Ok(messages)
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, peer_id: PeerId, text: &str) -> Res<MessageId> {
        let random_id = self.random_id.fetch_add(1, Ordering::Relaxed) & i64::from(i32::MAX);

        let id: MessageId = self
            .call(
                "messages.send",
                &[("peer_id", peer_id.to_string()), ("message", text.to_string()), ("random_id", random_id.to_string())],
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn delete_message_with(&self, peer_id: PeerId, message_id: MessageId, strategy: DeleteStrategy) -> Void {
        let params = match strategy {
            DeleteStrategy::ConversationMessageId => vec![("delete_for_all", "1".to_string()), ("cmids", message_id.to_string()), ("peer_id", peer_id.to_string())],
            DeleteStrategy::PeerMessageId | DeleteStrategy::DirectMessage => {
                vec![("delete_for_all", "1".to_string()), ("message_ids", message_id.to_string()), ("peer_id", peer_id.to_string())]
            }
            DeleteStrategy::GlobalMessageId => vec![("delete_for_all", "1".to_string()), ("message_ids", message_id.to_string())],
        };

        let _: Value = self.call("messages.delete", &params).await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_messages(&self, peer_id: PeerId, message_ids: &[MessageId]) -> Void {
        let ids = message_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        let key = if is_group_peer(peer_id) { "cmids" } else { "message_ids" };

        let _: Value = self.call("messages.delete", &[("delete_for_all", "1".to_string()), (key, ids), ("peer_id", peer_id.to_string())]).await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_conversation_members(&self, peer_id: PeerId) -> Res<Vec<Member>> {
        let response: ConversationMembers = self.call("messages.getConversationMembers", &[("peer_id", peer_id.to_string()), ("fields", "online".to_string())]).await?;

        let members = response
            .profiles
            .into_iter()
            .map(|p| Member {
                is_owner: response.items.iter().any(|i| i.member_id == p.id && i.is_owner),
                id: p.id,
                first_name: p.first_name,
                last_name: p.last_name,
                online: p.online == 1,
            })
            .collect();

        Ok(members)
    }

    #[instrument(skip(self))]
    async fn get_conversation_owner(&self, peer_id: PeerId) -> Res<Option<UserId>> {
        let response: ConversationMembers = self.call("messages.getConversationMembers", &[("peer_id", peer_id.to_string())]).await?;

        Ok(response.items.into_iter().find(|i| i.is_owner).map(|i| i.member_id))
    }

    #[instrument(skip(self))]
    async fn resolve_profile(&self, handle_or_id: &str) -> Res<Profile> {
        let profiles: Vec<VkProfile> = self.call("users.get", &[("user_ids", handle_or_id.to_string())]).await?;

        let profile = profiles.into_iter().next().ok_or_else(|| anyhow::anyhow!("Profile `{}` not found.", handle_or_id))?;

        Ok(Profile {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
        })
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, peer_id: PeerId, user_id: UserId) -> Void {
        let _: Value = self
            .call("messages.removeChatUser", &[("chat_id", (peer_id - GROUP_PEER_OFFSET).to_string()), ("user_id", user_id.to_string())])
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_message_history(&self, peer_id: PeerId, count: u32) -> Res<Vec<MessageId>> {
        let history: History = self.call("messages.getHistory", &[("peer_id", peer_id.to_string()), ("count", count.to_string())]).await?;

        let group = is_group_peer(peer_id);

        Ok(history.items.into_iter().map(|m| if group { m.conversation_message_id } else { m.id }).collect())
    }
}
