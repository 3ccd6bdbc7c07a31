//! Nickname management.

use tracing::instrument;

use crate::{
    base::{text::mention, types::Void},
    interaction::{
        command::CommandContext,
        commands::{LIST_LIMIT, capped_list},
    },
};

#[instrument(skip_all)]
pub async fn setnick(ctx: CommandContext) -> Void {
    let (_, nickname) = ctx.split_target();

    if nickname.is_empty() {
        ctx.reply("❗ Specify the user and the nickname.").await;
        return Ok(());
    }

    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    ctx.rt.db.set_nickname(target, nickname).await?;

    ctx.reply(&format!("✅ Nickname set!\n\n👤 User: {}\n📝 New nickname: {nickname}", mention(target, "User"))).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn removenick(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    if ctx.rt.db.remove_nickname(target).await? {
        ctx.reply(&format!("Nickname of {} removed.", mention(target, "User"))).await;
    } else {
        ctx.reply(&format!("❗ Could not remove the nickname of {}.", mention(target, "User"))).await;
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn getnick(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    match ctx.rt.db.get_user(target).await?.and_then(|u| u.nickname) {
        Some(nickname) if !nickname.is_empty() => ctx.reply(&format!("Nickname of {}: {nickname}", mention(target, "User"))).await,
        _ => ctx.reply(&format!("{} has no nickname.", mention(target, "User"))).await,
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn getacc(ctx: CommandContext) -> Void {
    let query = ctx.args.trim();

    if query.is_empty() {
        ctx.reply("❗ Specify the nickname to search for.").await;
        return Ok(());
    }

    let users = ctx.rt.db.find_users_by_nickname(query).await?;

    if users.is_empty() {
        ctx.reply(&format!("⚠️ No users with nickname '{query}' found.")).await;
        return Ok(());
    }

    let rows = users
        .iter()
        .map(|u| format!("• {} — {}", mention(u.user_id, u.nickname.as_deref().unwrap_or_default()), u.role.title()))
        .collect::<Vec<_>>();

    ctx.reply(&capped_list(&format!("👥 Users with nickname '{query}':"), &rows)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn nlist(ctx: CommandContext) -> Void {
    let users = ctx.rt.db.users_with_nicknames().await?;

    if users.is_empty() {
        ctx.reply("⚠️ No users with nicknames found.").await;
        return Ok(());
    }

    let rows = users
        .iter()
        .map(|u| format!("• {} — {}", mention(u.user_id, u.nickname.as_deref().unwrap_or_default()), u.role.title()))
        .collect::<Vec<_>>();

    ctx.reply(&capped_list("👥 Users with nicknames:", &rows)).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn nonick(ctx: CommandContext) -> Void {
    let users = ctx.rt.db.users_without_nicknames().await?;

    if users.is_empty() {
        ctx.reply("✅ Every user has a nickname.").await;
        return Ok(());
    }

    let mut rows = Vec::with_capacity(users.len());

    for user in users.iter().take(LIST_LIMIT) {
        rows.push(format!("• {} — {}", mention(user.user_id, &ctx.rt.chat.display_name(user.user_id).await), user.role.title()));
    }

    rows.resize(users.len(), String::new());

    ctx.reply(&capped_list("👥 Users without nicknames:", &rows)).await;

    Ok(())
}
