//! User-facing message texts shared across handlers.

use super::types::{Role, UserId};

/// Reply when a target user could not be determined.
pub const UNRESOLVED_USER: &str = "❗ Could not determine the user. Provide a valid mention, ID or profile link.";

/// Reply when a handler fails unexpectedly.
pub const GENERIC_FAILURE: &str = "❗ An error occurred while executing the command.";

/// Hint for a missing target.
pub const NEED_TARGET: &str = "❗ Specify the user (ID, mention or profile link).";

/// Formats a VK mention markup for the user.
pub fn mention(user_id: UserId, label: &str) -> String {
    format!("[id{user_id}|{label}]")
}

/// Reply when the invoker lacks the role required by a command.
pub fn insufficient_rights(user_id: UserId) -> String {
    format!("❗ {}, you do not have enough rights to use this command.", mention(user_id, "User"))
}

/// Reply when the invoker is still on cooldown.
pub fn spam_notice(user_id: UserId) -> String {
    format!("{}, stop spamming commands!", mention(user_id, "User"))
}

const USER_COMMANDS: &str = "👤 Basic commands:\n\
• /help — list of commands\n\
• /start — activate the bot\n\
• /stats — personal statistics\n\
• /getid — show your ID\n\n";

const USAGE_NOTE: &str = "📌 Instead of a user ID you can:\n\
• Reply to the user's message\n\
• Mention the user via @username\n\
• Use the markup [id123456|Name]\n\
• Give a profile link vk.com/id123456\n\n";

const MODERATOR_COMMANDS: &str = "👮 Moderation:\n\
• /kick @user — kick a member\n\
• /warn @user reason — issue a warning\n\
• /unwarn @user — remove a warning\n\
• /getwarn @user — check warnings\n\
• /warnhistory @user — warning history\n\
• /warnlist — all warnings\n\
• /mute @user duration reason — mute\n\
• /unmute @user — unmute\n\
• /getmute @user — check mute\n\
• /mutelist — muted users\n\
• /clear count — clear messages\n\
• /delete ID — delete a message\n\n\
👥 Conversation management:\n\
• /setnick @user nickname — set a nickname\n\
• /removenick @user — remove a nickname\n\
• /getnick @user — show a nickname\n\
• /getacc nickname — find by nickname\n\
• /nlist — users with nicknames\n\
• /nonick — users without nicknames\n\
• /staff — staff list\n\
• /chek ID — check for a ban\n\
• /getban @user — ban details\n\
• /reg @user — registration date\n\n";

const SENIOR_MODERATOR_COMMANDS: &str = "⭐ Senior moderator:\n\
• /ban @user reason — ban a user\n\
• /unban @user — unban a user\n\
• /addmoder @user — make moderator\n\
• /removerole @user — remove a role\n\
• /zov reason — call everyone\n\
• /online — online count\n\
• /onlinelist — online members\n\
• /banlist — banned users\n\
• /inactivelist days — inactive users\n\
• /masskick ID1 ID2 — kick several users\n\n";

const ADMIN_COMMANDS: &str = "👑 Administrator:\n\
• /quiet — toggle quiet mode\n\
• /addsenmoder @user — make senior moderator\n\n";

const CREATOR_COMMANDS: &str = "🔱 Creator:\n\
• /addadmin @user — make administrator\n\
• /removeadmin @user — remove administrator\n\n";

/// Builds the help text visible to a user holding `role`.
pub fn help(user_id: UserId, name: &str, role: Role) -> String {
    let mut msg = format!("🌟 Commands available to {} 🌟\n\n", mention(user_id, name));
    msg.push_str(USER_COMMANDS);

    if role.at_least(Role::Moderator) {
        msg.push_str(USAGE_NOTE);
        msg.push_str(MODERATOR_COMMANDS);
    }

    if role.at_least(Role::SeniorModerator) {
        msg.push_str(SENIOR_MODERATOR_COMMANDS);
    }

    if role.at_least(Role::Admin) {
        msg.push_str(ADMIN_COMMANDS);
    }

    if role.at_least(Role::Creator) {
        msg.push_str(CREATOR_COMMANDS);
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_grows_with_role() {
        let user = help(1, "A", Role::User);
        let admin = help(1, "A", Role::Admin);

        assert!(!user.contains("/ban"));
        assert!(admin.contains("/ban"));
        assert!(admin.contains("/quiet"));
        assert!(!admin.contains("/addadmin"));
        assert!(help(1, "A", Role::Creator).contains("/addadmin"));
    }
}
