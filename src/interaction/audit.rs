//! Audit entries posted to the configured logging conversation.

use tracing::{debug, warn};

use crate::{
    base::{
        text::mention,
        time,
        types::{GROUP_PEER_OFFSET, PeerId, UserId},
    },
    runtime::Runtime,
};

/// Kinds of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Kick,
    Ban,
    Unban,
    Warn,
    Unwarn,
    Mute,
    Unmute,
    SetRole,
    RemoveRole,
    Quiet,
    Delete,
    Message,
    Start,
    MassKick,
}

impl AuditAction {
    pub fn icon(self) -> &'static str {
        match self {
            AuditAction::Kick => "🚪",
            AuditAction::Ban => "🚫",
            AuditAction::Unban => "✅",
            AuditAction::Warn => "⚠️",
            AuditAction::Unwarn => "🔄",
            AuditAction::Mute => "🔇",
            AuditAction::Unmute => "🔊",
            AuditAction::SetRole => "🔰",
            AuditAction::RemoveRole => "⛔",
            AuditAction::Quiet => "🤫",
            AuditAction::Delete => "🗑️",
            AuditAction::Message => "💬",
            AuditAction::Start => "🚀",
            AuditAction::MassKick => "👥🚪",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AuditAction::Kick => "Kick",
            AuditAction::Ban => "Ban",
            AuditAction::Unban => "Unban",
            AuditAction::Warn => "Warning",
            AuditAction::Unwarn => "Warning removed",
            AuditAction::Mute => "Mute",
            AuditAction::Unmute => "Unmute",
            AuditAction::SetRole => "Role granted",
            AuditAction::RemoveRole => "Role removed",
            AuditAction::Quiet => "Quiet mode",
            AuditAction::Delete => "Message deleted",
            AuditAction::Message => "Message",
            AuditAction::Start => "Bot activated",
            AuditAction::MassKick => "Mass kick",
        }
    }
}

/// A single entry; names are looked up when it is rendered.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor: UserId,
    pub target: Option<UserId>,
    pub peer_id: PeerId,
    pub details: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: UserId, peer_id: PeerId) -> Self {
        Self {
            action,
            actor,
            target: None,
            peer_id,
            details: None,
        }
    }

    pub fn target(mut self, target: UserId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Renders the entry with already resolved names.
    pub fn render(&self, actor_name: &str, target_name: Option<&str>, timestamp: i64) -> String {
        let mut text = format!("{} {}\n\n👮 Moderator: {}\n", self.action.icon(), self.action.label(), mention(self.actor, actor_name));

        if let (Some(target), Some(name)) = (self.target, target_name) {
            text.push_str(&format!("👤 User: {}\n", mention(target, name)));
        }

        if let Some(details) = &self.details {
            text.push_str(&format!("📋 Details: {details}\n"));
        }

        text.push_str(&format!("\n📢 Conversation: #{}\n⏱ Time: {}", self.peer_id - GROUP_PEER_OFFSET, time::format_timestamp(timestamp)));

        text
    }
}

/// Posts an audit entry; a disabled or failing audit log never affects the caller.
pub async fn record(rt: &Runtime, entry: AuditEntry) {
    let Some(log_peer_id) = rt.config.log_peer_id else {
        debug!("Audit log disabled, skipping `{}` entry.", entry.action.label());
        return;
    };

    let actor_name = rt.chat.display_name(entry.actor).await;
    let target_name = match entry.target {
        Some(target) => Some(rt.chat.display_name(target).await),
        None => None,
    };

    let text = entry.render(&actor_name, target_name.as_deref(), time::now());

    if rt.chat.send_message(log_peer_id, &text).await.is_err() {
        warn!("Failed to post `{}` audit entry.", entry.action.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_parts() {
        let entry = AuditEntry::new(AuditAction::Ban, 1, 2_000_000_005).target(2).details("Reason: spam");
        let text = entry.render("Alice A", Some("Bob B"), 0);

        assert!(text.starts_with("🚫 Ban"));
        assert!(text.contains("[id1|Alice A]"));
        assert!(text.contains("[id2|Bob B]"));
        assert!(text.contains("Reason: spam"));
        assert!(text.contains("#5"));
    }

    #[test]
    fn omits_missing_target_and_details() {
        let text = AuditEntry::new(AuditAction::Quiet, 1, 2_000_000_001).render("Alice A", None, 0);

        assert!(!text.contains("👤"));
        assert!(!text.contains("📋"));
    }
}
