//! Moderation actions: kicks, warnings, mutes, bans, role changes, and quiet mode.
//!
//! Actions against another user go through staff protection first: a staff
//! target can only be acted on by an admin or the conversation owner. Every
//! state change is followed by an audit entry, whose failure never affects
//! the reply.

use tracing::{info, instrument};

use crate::{
    base::{
        text::mention,
        time,
        types::{PeerId, Res, Role, UserId, Void},
    },
    interaction::{
        access,
        audit::{self, AuditAction, AuditEntry},
        command::CommandContext,
    },
    runtime::Runtime,
};

/// Warnings at which a user is banned automatically.
pub const WARN_LIMIT: i64 = 3;

/// Maximum number of ids `/masskick` processes.
pub const MASSKICK_LIMIT: usize = 20;

pub const AUTO_BAN_REASON: &str = "Auto-ban: warning limit exceeded (3)";

pub const DURATION_HINT: &str = "❗ Invalid duration. Use a number followed by s, m, h or d, e.g. 30m, 2h or 1d.";

/// Parses up to [`MASSKICK_LIMIT`] raw numeric ids, ignoring everything else.
pub fn masskick_targets(args: &str) -> Vec<UserId> {
    args.split_whitespace().filter_map(|token| token.parse::<UserId>().ok()).take(MASSKICK_LIMIT).collect()
}

/// The role that counts for rank comparisons, with the owner ranking as creator.
async fn ranked_role(rt: &Runtime, user_id: UserId, peer_id: PeerId) -> Res<Role> {
    if access::is_owner(rt, user_id, peer_id).await {
        return Ok(Role::Creator);
    }

    access::effective_role(rt, user_id, peer_id).await
}

/// Applies staff protection, replying when the target is protected.
async fn ensure_may_act_on(ctx: &CommandContext, target: UserId) -> Res<bool> {
    if access::may_act_on(&ctx.rt, ctx.from_id, target, ctx.peer_id).await? {
        return Ok(true);
    }

    ctx.reply(&format!("⛔ {} is staff and can only be acted on by an admin or the conversation owner.", mention(target, "User")))
        .await;

    Ok(false)
}

/// Removes a member, reporting the outcome to the log instead of the caller.
async fn remove_member(rt: &Runtime, peer_id: PeerId, target: UserId) -> bool {
    match rt.chat.remove_member(peer_id, target).await {
        Ok(()) => true,
        Err(err) => {
            info!("Failed to remove {} from {}: {}", target, peer_id, err);
            false
        }
    }
}

// Kicks and bans.

#[instrument(skip_all)]
pub async fn kick(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if !ensure_may_act_on(&ctx, target).await? {
        return Ok(());
    }

    let name = ctx.rt.chat.display_name(target).await;

    if remove_member(&ctx.rt, ctx.peer_id, target).await {
        ctx.reply(&format!("👢 {} was kicked from the conversation.", mention(target, &name))).await;

        audit::record(&ctx.rt, AuditEntry::new(AuditAction::Kick, ctx.from_id, ctx.peer_id).target(target)).await;
    } else {
        ctx.reply(&format!("❗ Could not kick {}.", mention(target, &name))).await;
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn ban(ctx: CommandContext) -> Void {
    let (_, reason) = ctx.split_target();
    let reason = reason.to_string();

    if reason.is_empty() {
        ctx.reply("❗ Specify the user and the reason for the ban.").await;
        return Ok(());
    }

    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if !ensure_may_act_on(&ctx, target).await? {
        return Ok(());
    }

    let name = ctx.rt.chat.display_name(target).await;

    ctx.rt.db.ban(target, &reason).await?;

    ctx.reply(&format!("🚫 User banned\n\n👤 User: {}\n📋 Reason: {}", mention(target, &name), reason)).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Ban, ctx.from_id, ctx.peer_id).target(target).details(&reason)).await;

    remove_member(&ctx.rt, ctx.peer_id, target).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn unban(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let name = ctx.rt.chat.display_name(target).await;

    if !ctx.rt.db.unban(target).await? {
        ctx.reply(&format!("❗ {} was not banned.", mention(target, &name))).await;
        return Ok(());
    }

    ctx.reply(&format!("✅ {} was unbanned.", mention(target, &name))).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Unban, ctx.from_id, ctx.peer_id).target(target)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn masskick(ctx: CommandContext) -> Void {
    if ctx.args.trim().is_empty() {
        ctx.reply("❗ Specify the ids of the users to kick, separated by spaces.").await;
        return Ok(());
    }

    let targets = masskick_targets(&ctx.args);

    if targets.is_empty() {
        ctx.reply("❗ No valid user ids given.").await;
        return Ok(());
    }

    ctx.reply(&format!("🔄 Kicking {} user(s) ...", targets.len())).await;

    let mut kicked = 0;

    for target in &targets {
        if !access::may_act_on(&ctx.rt, ctx.from_id, *target, ctx.peer_id).await? {
            info!("Skipping protected user {}.", target);
            continue;
        }

        if remove_member(&ctx.rt, ctx.peer_id, *target).await {
            kicked += 1;
        }
    }

    let summary = format!("Kicked {} of {} user(s)", kicked, targets.len());

    ctx.reply(&format!("✅ {summary}.")).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::MassKick, ctx.from_id, ctx.peer_id).details(summary)).await;

    Ok(())
}

// Warnings.

/// Adds a warning, escalating to a ban and a kick at the limit.
#[instrument(skip_all)]
pub async fn warn(ctx: CommandContext) -> Void {
    let (_, reason) = ctx.split_target();
    let reason = reason.to_string();

    if reason.is_empty() {
        ctx.reply("❗ Specify the user and the reason for the warning.").await;
        return Ok(());
    }

    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if !ensure_may_act_on(&ctx, target).await? {
        return Ok(());
    }

    let rt = &ctx.rt;
    let name = rt.chat.display_name(target).await;
    let count = rt.db.add_warning(target, &reason).await?;

    ctx.reply(&format!("⚠️ Warning issued\n\n👤 User: {}\n📋 Reason: {}\n🔢 Warnings: {}/{}", mention(target, &name), reason, count, WARN_LIMIT))
        .await;

    audit::record(rt, AuditEntry::new(AuditAction::Warn, ctx.from_id, ctx.peer_id).target(target).details(format!("{reason} ({count}/{WARN_LIMIT})"))).await;

    if count < WARN_LIMIT {
        return Ok(());
    }

    rt.db.ban(target, AUTO_BAN_REASON).await?;

    ctx.reply(&format!("🚫 {} reached {} warnings and was banned.", mention(target, &name), WARN_LIMIT)).await;

    remove_member(rt, ctx.peer_id, target).await;

    audit::record(rt, AuditEntry::new(AuditAction::Ban, ctx.from_id, ctx.peer_id).target(target).details(AUTO_BAN_REASON)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn unwarn(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let name = ctx.rt.chat.display_name(target).await;

    if ctx.rt.db.get_warning_count(target).await? == 0 {
        ctx.reply(&format!("❗ {} has no warnings.", mention(target, &name))).await;
        return Ok(());
    }

    let count = ctx.rt.db.remove_warning(target).await?;

    ctx.reply(&format!("✅ Warning removed\n\n👤 User: {}\n🔢 Warnings: {}/{}", mention(target, &name), count, WARN_LIMIT)).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Unwarn, ctx.from_id, ctx.peer_id).target(target).details(format!("{count}/{WARN_LIMIT}"))).await;

    Ok(())
}

// Mutes.

#[instrument(skip_all)]
pub async fn mute(ctx: CommandContext) -> Void {
    let (_, rest) = ctx.split_target();
    let (duration, reason) = match rest.split_once(char::is_whitespace) {
        Some((duration, reason)) => (duration.to_string(), reason.trim().to_string()),
        None => (rest.to_string(), String::new()),
    };

    if duration.is_empty() || reason.is_empty() {
        ctx.reply("❗ Specify the user, the duration and the reason, e.g. /mute 123 30m flood.").await;
        return Ok(());
    }

    let Some(seconds) = time::parse_duration(&duration).filter(|seconds| time::now().checked_add(*seconds).is_some()) else {
        ctx.reply(DURATION_HINT).await;
        return Ok(());
    };

    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if !ensure_may_act_on(&ctx, target).await? {
        return Ok(());
    }

    let name = ctx.rt.chat.display_name(target).await;
    let mute_until = ctx.rt.db.set_mute(target, seconds, &reason).await?;

    ctx.reply(&format!(
        "🔇 User muted\n\n👤 User: {}\n⏱ Duration: {}\n🕒 Until: {}\n📋 Reason: {}",
        mention(target, &name),
        time::format_span(seconds),
        time::format_timestamp(mute_until),
        reason
    ))
    .await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Mute, ctx.from_id, ctx.peer_id).target(target).details(format!("{} ({reason})", time::format_span(seconds)))).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn unmute(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let name = ctx.rt.chat.display_name(target).await;

    if !ctx.rt.db.remove_mute(target).await? {
        ctx.reply(&format!("❗ {} is not muted.", mention(target, &name))).await;
        return Ok(());
    }

    ctx.reply(&format!("🔊 {} was unmuted.", mention(target, &name))).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Unmute, ctx.from_id, ctx.peer_id).target(target)).await;

    Ok(())
}

// Roles.

/// Appends the free text after the target, if any, to audit details.
fn with_reason(details: &str, ctx: &CommandContext) -> String {
    let (_, reason) = ctx.split_target();

    if reason.is_empty() { details.to_string() } else { format!("{details} ({reason})") }
}

async fn grant(ctx: CommandContext, role: Role) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let name = ctx.rt.chat.display_name(target).await;

    ctx.rt.db.set_conversation_role(target, ctx.peer_id, role).await?;

    ctx.reply(&format!("🔄 Role changed\n\n👤 {}\n{} New role: {}", mention(target, &name), role.emoji(), role.title())).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::SetRole, ctx.from_id, ctx.peer_id).target(target).details(with_reason(role.title(), &ctx))).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn addmoder(ctx: CommandContext) -> Void {
    grant(ctx, Role::Moderator).await
}

#[instrument(skip_all)]
pub async fn addsenmoder(ctx: CommandContext) -> Void {
    grant(ctx, Role::SeniorModerator).await
}

#[instrument(skip_all)]
pub async fn addadmin(ctx: CommandContext) -> Void {
    grant(ctx, Role::Admin).await
}

async fn revoke(ctx: &CommandContext, target: UserId, previous: Role) -> Void {
    let name = ctx.rt.chat.display_name(target).await;

    ctx.rt.db.set_conversation_role(target, ctx.peer_id, Role::User).await?;

    ctx.reply(&format!("🔄 Role changed\n\n👤 {}\n📝 Role removed, now a regular member of this conversation.", mention(target, &name))).await;

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::RemoveRole, ctx.from_id, ctx.peer_id).target(target).details(with_reason(&format!("Removed role: {}", previous.title()), ctx)))
        .await;

    Ok(())
}

/// Clears a conversation role held by someone of strictly lower rank than the caller.
#[instrument(skip_all)]
pub async fn removerole(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let target_role = ranked_role(&ctx.rt, target, ctx.peer_id).await?;

    if target_role == Role::User {
        ctx.reply(&format!("❗ {} has no special role in this conversation.", mention(target, "User"))).await;
        return Ok(());
    }

    let actor_role = ranked_role(&ctx.rt, ctx.from_id, ctx.peer_id).await?;

    if target_role.rank() >= actor_role.rank() {
        ctx.reply("❗ You cannot remove the role of a user of your rank or higher.").await;
        return Ok(());
    }

    revoke(&ctx, target, target_role).await
}

#[instrument(skip_all)]
pub async fn removeadmin(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if access::effective_role(&ctx.rt, target, ctx.peer_id).await? != Role::Admin {
        ctx.reply(&format!("❗ {} is not an admin.", mention(target, "User"))).await;
        return Ok(());
    }

    revoke(&ctx, target, Role::Admin).await
}

// Quiet mode.

#[instrument(skip_all)]
pub async fn quiet(ctx: CommandContext) -> Void {
    let enabled = ctx.rt.state.toggle_quiet();

    if enabled {
        ctx.reply("🔇 Quiet mode enabled\n\nThe bot ignores commands from regular members.").await;
    } else {
        ctx.reply("🔊 Quiet mode disabled\n\nThe bot answers all commands again.").await;
    }

    let details = if enabled { "Quiet mode enabled" } else { "Quiet mode disabled" };

    audit::record(&ctx.rt, AuditEntry::new(AuditAction::Quiet, ctx.from_id, ctx.peer_id).details(details)).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masskick_takes_numeric_ids_only() {
        assert_eq!(masskick_targets("1 two 3 [id4|x] @five 6"), vec![1, 3, 6]);
    }

    #[test]
    fn masskick_is_capped() {
        let args = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let targets = masskick_targets(&args);

        assert_eq!(targets.len(), MASSKICK_LIMIT);
        assert_eq!(targets.last(), Some(&20));
    }
}
