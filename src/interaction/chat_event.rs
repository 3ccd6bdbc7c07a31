use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    base::{
        text::mention,
        time,
        types::{IncomingMessage, Void, is_group_peer},
    },
    interaction::{
        access,
        audit::{self, AuditAction, AuditEntry},
        command,
    },
    runtime::Runtime,
};

/// Longest mirrored text before it is cut.
const MIRROR_LIMIT: usize = 100;

/// Handles one inbound message on the worker pool.
#[instrument(skip_all, fields(peer_id = message.peer_id, from_id = message.from_id))]
pub fn handle_message(rt: Runtime, message: IncomingMessage) {
    let pool = rt.pool.clone();

    pool.submit(
        async move {
            // Process the message.
            let result = handle_message_internal(&rt, &message).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Counts the message, dispatches commands, and enforces mutes.
#[instrument(skip_all)]
pub async fn handle_message_internal(rt: &Runtime, message: &IncomingMessage) -> Void {
    rt.db.record_message(message.from_id).await?;

    if message.text.starts_with('/') {
        command::dispatch(rt, message).await?;
        return Ok(());
    }

    mirror_to_log(rt, message).await;

    enforce_mute(rt, message).await
}

/// Cuts a text to the mirror limit, marking the cut with an ellipsis.
pub fn truncate_for_mirror(text: &str) -> String {
    if text.chars().count() <= MIRROR_LIMIT {
        return text.to_string();
    }

    let head = text.chars().take(MIRROR_LIMIT - 3).collect::<String>();

    format!("{head}...")
}

async fn mirror_to_log(rt: &Runtime, message: &IncomingMessage) {
    if !rt.config.mirror_messages_to_log || !is_group_peer(message.peer_id) || message.text.is_empty() {
        return;
    }

    if rt.config.log_peer_id == Some(message.peer_id) {
        return;
    }

    audit::record(rt, AuditEntry::new(AuditAction::Message, message.from_id, message.peer_id).details(truncate_for_mirror(&message.text))).await;
}

async fn enforce_mute(rt: &Runtime, message: &IncomingMessage) -> Void {
    let Some(user) = rt.db.get_user(message.from_id).await? else {
        return Ok(());
    };

    let now = time::now();

    if user.mute_until <= now {
        return Ok(());
    }

    if access::is_staff(rt, message.from_id, message.peer_id).await? {
        debug!("Ignoring mute of staff member {}.", message.from_id);
        return Ok(());
    }

    let message_id = if is_group_peer(message.peer_id) { message.conversation_message_id } else { message.id };

    info!("Queueing deletion of message {} from muted user {}.", message_id, message.from_id);

    rt.state.queue_deletion(message.peer_id, message_id);

    rt.chat
        .say(message.peer_id, &format!("{}, you are muted. Remaining: {}", mention(message.from_id, "User"), time::format_span(user.mute_until - now)))
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_texts_are_mirrored_whole() {
        assert_eq!(truncate_for_mirror("hello"), "hello");
        assert_eq!(truncate_for_mirror(&"a".repeat(100)), "a".repeat(100));
    }

    #[test]
    fn long_texts_are_cut() {
        let text = truncate_for_mirror(&"я".repeat(150));

        assert_eq!(text.chars().count(), 100);
        assert!(text.ends_with("..."));
    }
}
