//! Commands available to everyone, plus the staff and registration views.

use tracing::instrument;

use crate::{
    base::{
        text::{self, mention},
        time,
        types::{Role, Void},
    },
    interaction::{
        access,
        audit::{self, AuditAction, AuditEntry},
        command::CommandContext,
        commands::nickname_or_placeholder,
    },
};

#[instrument(skip_all)]
pub async fn help(ctx: CommandContext) -> Void {
    let role = if access::is_owner(&ctx.rt, ctx.from_id, ctx.peer_id).await {
        Role::Creator
    } else {
        access::effective_role(&ctx.rt, ctx.from_id, ctx.peer_id).await?
    };

    let name = ctx.rt.chat.display_name(ctx.from_id).await;

    ctx.reply(&text::help(ctx.from_id, &name, role)).await;

    Ok(())
}

/// Activates the bot in a conversation that has no staff yet.
#[instrument(skip_all)]
pub async fn start(ctx: CommandContext) -> Void {
    let rt = &ctx.rt;

    if !rt.db.staff(Some(ctx.peer_id)).await?.is_empty() {
        ctx.reply("🔔 The bot is already active in this conversation!\n\nUse /staff to see the staff list.\nUse /help to see the available commands.")
            .await;
        return Ok(());
    }

    let name = rt.chat.display_name(ctx.from_id).await;

    if access::is_owner(rt, ctx.from_id, ctx.peer_id).await {
        rt.db.set_conversation_role(ctx.from_id, ctx.peer_id, Role::Creator).await?;

        ctx.reply(&format!(
            "🎉 The bot is now active in this conversation!\n\n👑 {} is the bot creator here as the conversation owner.\n\n📋 Use /help to see the available commands.",
            mention(ctx.from_id, &name)
        ))
        .await;

        audit::record(rt, AuditEntry::new(AuditAction::Start, ctx.from_id, ctx.peer_id).details("Conversation owner became the bot creator")).await;

        return Ok(());
    }

    if rt.db.get_role(ctx.from_id, None).await? == Role::Creator {
        ctx.reply("🎉 The bot is now active in this conversation!\n\n📋 Use /help to see the available commands.").await;

        audit::record(rt, AuditEntry::new(AuditAction::Start, ctx.from_id, ctx.peer_id).details("Activated by a bot creator")).await;

        return Ok(());
    }

    ctx.reply(&format!(
        "⛔ {}, activation failed!\n\n❗️ Only the conversation owner can activate the bot. Make sure the bot is an administrator of the conversation and ask the owner to send /start.",
        mention(ctx.from_id, &name)
    ))
    .await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn stats(ctx: CommandContext) -> Void {
    let target = if ctx.args.trim().is_empty() {
        ctx.from_id
    } else {
        match ctx.target().await {
            Some(target) => target,
            None => {
                ctx.reply(text::UNRESOLVED_USER).await;
                return Ok(());
            }
        }
    };

    let name = ctx.rt.chat.display_name(target).await;

    let Some(user) = ctx.rt.db.get_user(target).await? else {
        ctx.reply(&format!("⚠️ No data stored for {}.", mention(target, &name))).await;
        return Ok(());
    };

    let role = access::effective_role(&ctx.rt, target, ctx.peer_id).await?;

    ctx.reply(&format!(
        "📊 Profile of {}\n\n🆔 ID: {}\n👤 Nickname: {}\n{} Role: {}\n💬 Messages: {}\n⚠️ Warnings: {}/3\n🕒 Registered: {}",
        mention(target, &name),
        user.user_id,
        nickname_or_placeholder(user.nickname.as_deref()),
        role.emoji(),
        role.title(),
        user.messages_count,
        user.warns,
        time::format_timestamp(user.reg_date),
    ))
    .await;

    Ok(())
}

pub async fn getid(ctx: CommandContext) -> Void {
    ctx.reply(&format!("📌 Your ID: {}", ctx.from_id)).await;
    Ok(())
}

/// Lists the conversation owner and the staff of this conversation, by role.
#[instrument(skip_all)]
pub async fn staff(ctx: CommandContext) -> Void {
    let rt = &ctx.rt;

    let staff = rt.db.staff(Some(ctx.peer_id)).await?;
    let owner = rt.chat.conversation_owner(ctx.peer_id).await;

    if staff.is_empty() && owner.is_none() {
        ctx.reply("⚠️ No staff found in this conversation.").await;
        return Ok(());
    }

    let mut msg = String::from("👥 Conversation staff\n\n");

    if let Some(owner) = owner {
        msg.push_str(&format!("👑 Conversation owner:\n• {}\n\n", mention(owner, &rt.chat.display_name(owner).await)));
    }

    for role in Role::DESCENDING.into_iter().filter(|r| r.is_staff()) {
        let members = staff.iter().filter(|s| s.role == role && !(role == Role::Creator && Some(s.user_id) == owner)).collect::<Vec<_>>();

        if members.is_empty() {
            continue;
        }

        msg.push_str(&format!("{} {}:\n", role.emoji(), role.title()));

        for member in members {
            msg.push_str(&format!("• {}\n", mention(member.user_id, &rt.chat.display_name(member.user_id).await)));
        }

        msg.push('\n');
    }

    ctx.reply(msg.trim_end()).await;

    Ok(())
}

#[instrument(skip_all)]
pub async fn reg(ctx: CommandContext) -> Void {
    let Some(target) = ctx.require_target().await else {
        return Ok(());
    };

    let name = ctx.rt.chat.display_name(target).await;

    let registered = match ctx.rt.db.get_user(target).await? {
        Some(user) => time::format_timestamp(user.reg_date),
        None => "not registered".to_string(),
    };

    ctx.reply(&format!("📅 Registration\n\n👤 User: {}\n🤖 Registered with the bot: {}", mention(target, &name), registered)).await;

    Ok(())
}
