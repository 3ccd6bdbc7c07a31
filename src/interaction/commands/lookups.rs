//! Read-only views over warnings, mutes, and bans.

use tracing::instrument;

use crate::{
    base::{
        text::mention,
        time,
        types::{Res, UserId, Void},
    },
    interaction::{
        command::CommandContext,
        commands::{capped_list, display_label},
    },
};

/// Default `/inactivelist` window, in days.
const DEFAULT_INACTIVE_DAYS: i64 = 30;

/// Parses the optional day count of `/inactivelist`; anything unparsable falls back to the default.
pub fn inactive_days(args: &str) -> i64 {
    args.trim().parse::<i64>().map(|days| days.max(1)).unwrap_or(DEFAULT_INACTIVE_DAYS)
}

async fn target_and_name(ctx: &CommandContext) -> Res<Option<(UserId, String)>> {
    let Some(target) = ctx.require_target().await else {
        return Ok(None);
    };

    let name = ctx.rt.chat.display_name(target).await;

    Ok(Some((target, name)))
}

/// Checks whether a user is banned.
#[instrument(skip_all)]
pub async fn chek(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    match ctx.rt.db.get_ban(target).await? {
        Some(ban) => {
            ctx.reply(&format!(
                "🚫 {} is banned\n\n📋 Reason: {}\n⏱ Banned at: {}",
                mention(target, "User"),
                ban.reason,
                time::format_timestamp(ban.ban_timestamp)
            ))
            .await
        }
        None => ctx.reply(&format!("✅ {} has no active bans.", mention(target, "User"))).await,
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn getban(ctx: CommandContext) -> Void {
    let Some((target, name)) = target_and_name(&ctx).await? else {
        return Ok(());
    };

    match ctx.rt.db.get_ban(target).await? {
        Some(ban) => {
            ctx.reply(&format!(
                "🚫 Ban details\n\n👤 User: {}\n📋 Reason: {}\n⏱ Banned at: {}",
                mention(target, &name),
                ban.reason,
                time::format_timestamp(ban.ban_timestamp)
            ))
            .await
        }
        None => ctx.reply(&format!("✅ User {} is not banned.", mention(target, &name))).await,
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn getwarn(ctx: CommandContext) -> Void {
    let Some((target, name)) = target_and_name(&ctx).await? else {
        return Ok(());
    };

    let count = ctx.rt.db.get_warning_count(target).await?;

    let (icon, status) = if count == 0 { ("✅", "clean".to_string()) } else { ("⚠️", format!("{count} warning(s)")) };

    ctx.reply(&format!("{icon} Warning check\n\n👤 User: {}\n🔢 Status: {status}", mention(target, &name))).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn warnhistory(ctx: CommandContext) -> Void {
    let Some((target, name)) = target_and_name(&ctx).await? else {
        return Ok(());
    };

    let warnings = ctx.rt.db.warning_history(target).await?;

    if warnings.is_empty() {
        ctx.reply(&format!("✅ Clean history\n\n👤 User: {}\n📋 No warnings", mention(target, &name))).await;
        return Ok(());
    }

    let mut msg = format!("📋 Warning history\n\n👤 User: {}\n🔢 Total: {}\n\n", mention(target, &name), warnings.len());

    for (i, warning) in warnings.iter().enumerate() {
        msg.push_str(&format!("{}. {}\n📌 Reason: {}\n\n", i + 1, time::format_timestamp(warning.timestamp), warning.reason));
    }

    ctx.reply(msg.trim_end()).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn warnlist(ctx: CommandContext) -> Void {
    let warnings = ctx.rt.db.all_warnings().await?;

    if warnings.is_empty() {
        ctx.reply("No warnings found.").await;
        return Ok(());
    }

    let mut rows = Vec::with_capacity(warnings.len());

    for (i, warning) in warnings.iter().enumerate() {
        // Only the visible rows need a profile lookup.
        let label = if i < super::LIST_LIMIT {
            display_label(&ctx.rt, warning.user_id, warning.nickname.as_deref()).await
        } else {
            String::new()
        };

        rows.push(format!("{}. {} - {} - {}", i + 1, mention(warning.user_id, &label), time::format_timestamp(warning.timestamp), warning.reason));
    }

    ctx.reply(&capped_list("⚠️ Warnings:", &rows)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn getmute(ctx: CommandContext) -> Void {
    let Some((target, name)) = target_and_name(&ctx).await? else {
        return Ok(());
    };

    let mute_until = ctx.rt.db.get_mute(target).await?;
    let now = time::now();

    if mute_until > now {
        ctx.reply(&format!(
            "🔇 Mute details\n\n👤 User: {}\n🕒 Until: {}\n⏱ Remaining: {}",
            mention(target, &name),
            time::format_timestamp(mute_until),
            time::format_span(mute_until - now)
        ))
        .await;
    } else {
        ctx.reply(&format!("✅ User {} is not muted.", mention(target, &name))).await;
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn mutelist(ctx: CommandContext) -> Void {
    let muted = ctx.rt.db.muted_users().await?;

    if muted.is_empty() {
        ctx.reply("✅ Nobody is muted.").await;
        return Ok(());
    }

    let now = time::now();
    let mut rows = Vec::with_capacity(muted.len());

    for user in muted.iter().take(super::LIST_LIMIT) {
        let label = display_label(&ctx.rt, user.user_id, user.nickname.as_deref()).await;
        rows.push(format!("👤 {} - {} left", mention(user.user_id, &label), time::format_span(user.mute_until - now)));
    }

    rows.resize(muted.len(), String::new());

    ctx.reply(&capped_list("🔇 Muted users:", &rows)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn banlist(ctx: CommandContext) -> Void {
    let bans = ctx.rt.db.banned_users().await?;

    if bans.is_empty() {
        ctx.reply("✅ Nobody is banned.").await;
        return Ok(());
    }

    let mut rows = Vec::with_capacity(bans.len());

    for (i, ban) in bans.iter().enumerate().take(super::LIST_LIMIT) {
        let label = display_label(&ctx.rt, ban.user_id, ban.nickname.as_deref()).await;
        rows.push(format!("{}. {} - {} - {}", i + 1, mention(ban.user_id, &label), time::format_timestamp(ban.ban_timestamp), ban.reason));
    }

    rows.resize(bans.len(), String::new());

    ctx.reply(&capped_list("🚫 Banned users:", &rows)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn inactivelist(ctx: CommandContext) -> Void {
    let days = inactive_days(&ctx.args);
    let users = ctx.rt.db.inactive_users(days).await?;

    if users.is_empty() {
        ctx.reply(&format!("✅ No inactive users (more than {days} days).")).await;
        return Ok(());
    }

    let mut rows = Vec::with_capacity(users.len());

    for (i, user) in users.iter().enumerate().take(super::LIST_LIMIT) {
        let label = display_label(&ctx.rt, user.user_id, user.nickname.as_deref()).await;
        rows.push(format!("{}. {} - {} message(s), registered {}", i + 1, mention(user.user_id, &label), user.messages_count, time::format_timestamp(user.reg_date)));
    }

    rows.resize(users.len(), String::new());

    ctx.reply(&capped_list(&format!("⏱ Inactive users (more than {days} days):"), &rows)).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_days_defaults_and_floors() {
        assert_eq!(inactive_days(""), 30);
        assert_eq!(inactive_days("abc"), 30);
        assert_eq!(inactive_days("0"), 1);
        assert_eq!(inactive_days("-5"), 1);
        assert_eq!(inactive_days("7"), 7);
    }
}
