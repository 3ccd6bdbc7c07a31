//! Conversation housekeeping: message cleanup, mass mentions, and presence.

use tracing::{instrument, warn};

use crate::{
    base::{text::mention, types::Void},
    interaction::{
        audit::{self, AuditAction, AuditEntry},
        command::CommandContext,
    },
};

/// Bounds and default of the `/clear` count.
const CLEAR_MIN: u32 = 1;
const CLEAR_MAX: u32 = 50;
const CLEAR_DEFAULT: u32 = 10;

/// Maximum number of members `/zov` mentions in one message.
const ZOV_LIMIT: usize = 50;

/// Parses the `/clear` count, clamping it into range; anything unparsable gives the default.
pub fn clear_count(args: &str) -> u32 {
    match args.trim().parse::<i64>() {
        Ok(count) => count.clamp(CLEAR_MIN as i64, CLEAR_MAX as i64) as u32,
        Err(_) => CLEAR_DEFAULT,
    }
}

/// Rounded share of online members, or zero for an empty conversation.
pub fn online_percent(online: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }

    (online * 100 + total / 2) / total
}

/// Deletes the most recent messages, including the command itself.
#[instrument(skip_all)]
pub async fn clear(ctx: CommandContext) -> Void {
    let count = clear_count(&ctx.args);

    ctx.reply(&format!("🔄 Clearing {count} message(s) ...")).await;

    let result = async {
        let ids = ctx.rt.chat.get_message_history(ctx.peer_id, count + 1).await?;

        if !ids.is_empty() {
            ctx.rt.chat.delete_messages(ctx.peer_id, &ids).await?;
        }

        anyhow::Ok(ids.len())
    }
    .await;

    match result {
        Ok(0) => {}
        Ok(deleted) => ctx.reply(&format!("✅ Deleted {deleted} message(s).")).await,
        Err(err) => {
            warn!("Failed to clear messages in {}: {}", ctx.peer_id, err);
            ctx.reply(&format!("❗ Failed to clear messages: {err}")).await;
        }
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn delete(ctx: CommandContext) -> Void {
    let arg = ctx.args.trim();

    if arg.is_empty() {
        ctx.reply("❗ Specify the message id.").await;
        return Ok(());
    }

    let Ok(message_id) = arg.parse::<i64>() else {
        ctx.reply("❗ Specify a valid message id.").await;
        return Ok(());
    };

    if ctx.rt.chat.delete_message(ctx.peer_id, message_id).await {
        ctx.reply(&format!("✅ Message {message_id} deleted.")).await;

        audit::record(&ctx.rt, AuditEntry::new(AuditAction::Delete, ctx.from_id, ctx.peer_id).details(format!("Message {message_id}"))).await;
    } else {
        ctx.reply(&format!("❗ Could not delete message {message_id}.")).await;
    }

    Ok(())
}

/// Calls everyone in the conversation, optionally with a reason.
#[instrument(skip_all)]
pub async fn zov(ctx: CommandContext) -> Void {
    let members = ctx.rt.chat.members(ctx.peer_id).await;

    if members.is_empty() {
        ctx.reply("❗ Could not get the conversation members.").await;
        return Ok(());
    }

    let caller = ctx.rt.chat.display_name(ctx.from_id).await;
    let reason = ctx.args.trim();

    let mentions = members.iter().take(ZOV_LIMIT).map(|m| mention(m.id, &m.display_name())).collect::<Vec<_>>();

    let mut msg = format!("🔔 You were called by {}\n\n", mention(ctx.from_id, &caller));

    if !reason.is_empty() {
        msg.push_str(&format!("❗ Reason: {reason}\n\n"));
    }

    msg.push_str(&mentions.join(" "));

    ctx.reply(&msg).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn online(ctx: CommandContext) -> Void {
    let members = ctx.rt.chat.members(ctx.peer_id).await;
    let online = members.iter().filter(|m| m.online).count();

    ctx.reply(&format!("🟢 Online: {} of {} members ({}%)", online, members.len(), online_percent(online, members.len()))).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn onlinelist(ctx: CommandContext) -> Void {
    let members = ctx.rt.chat.members(ctx.peer_id).await;
    let online = members.iter().filter(|m| m.online).collect::<Vec<_>>();

    if online.is_empty() {
        ctx.reply("Nobody is online.").await;
        return Ok(());
    }

    let mut msg = String::from("Online members:\n");

    for member in online {
        msg.push_str(&mention(member.id, &member.display_name()));
        msg.push('\n');
    }

    ctx.reply(msg.trim_end()).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_count_is_clamped() {
        assert_eq!(clear_count(""), 10);
        assert_eq!(clear_count("x"), 10);
        assert_eq!(clear_count("0"), 1);
        assert_eq!(clear_count("500"), 50);
        assert_eq!(clear_count("25"), 25);
    }

    #[test]
    fn online_percent_rounds() {
        assert_eq!(online_percent(0, 0), 0);
        assert_eq!(online_percent(1, 3), 33);
        assert_eq!(online_percent(2, 3), 67);
        assert_eq!(online_percent(5, 5), 100);
    }
}
