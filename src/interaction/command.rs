//! Command registry, argument preprocessing, and the dispatcher.
//!
//! Dispatch runs in this order: quiet-mode gate, cooldown gate, registry
//! lookup, reply substitution, mention substitution, and finally submission
//! to the worker pool. The role check runs again at execution time, inside
//! the catch boundary that turns handler errors and panics into a generic
//! failure reply.

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::LazyLock, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, instrument};

use crate::{
    base::{
        text,
        types::{IncomingMessage, PeerId, Res, Role, UserId, Void},
    },
    interaction::{
        access,
        commands::{general, lookups, members, nicknames},
        mention, moderation,
    },
    runtime::Runtime,
};

// Types.

/// Every command the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Start,
    Stats,
    GetId,
    Chek,
    SetNick,
    RemoveNick,
    GetNick,
    GetAcc,
    NickList,
    NoNick,
    Kick,
    Warn,
    Unwarn,
    GetWarn,
    WarnHistory,
    WarnList,
    Staff,
    Reg,
    Mute,
    Unmute,
    GetMute,
    MuteList,
    Clear,
    GetBan,
    Delete,
    Ban,
    Unban,
    AddModer,
    RemoveRole,
    Zov,
    Online,
    OnlineList,
    BanList,
    InactiveList,
    MassKick,
    Quiet,
    AddSenModer,
    AddAdmin,
    RemoveAdmin,
}

/// How a command consumes a leading target user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArgs {
    /// No target; arguments are passed through untouched.
    None,
    /// A target and nothing else required.
    TargetOnly,
    /// A target followed by required arguments; the hint is sent when they are missing.
    TargetWith(&'static str),
}

/// A command handler.
pub type Handler = fn(CommandContext) -> BoxFuture<'static, Void>;

/// A registered command.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub kind: CommandKind,
    pub required_role: Role,
    pub target: TargetArgs,
    pub handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec").field("name", &self.name).field("required_role", &self.required_role).finish()
    }
}

/// Everything a handler needs to run one invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub rt: Runtime,
    pub peer_id: PeerId,
    pub from_id: UserId,
    /// Arguments after reply and mention substitution.
    pub args: String,
    pub message: IncomingMessage,
}

impl CommandContext {
    /// Replies to the invoking conversation; failures are logged by the chat client.
    pub async fn reply(&self, text: &str) {
        self.rt.chat.say(self.peer_id, text).await;
    }

    /// The leading target token and the remaining arguments.
    pub fn split_target(&self) -> (&str, &str) {
        mention::split_target(&self.args)
    }

    /// Resolves the target user from the arguments.
    pub async fn target(&self) -> Option<UserId> {
        mention::resolve_user(&self.rt.chat, &self.args).await
    }

    /// Resolves the target, replying with a uniform message when there is none.
    pub async fn require_target(&self) -> Option<UserId> {
        if self.args.trim().is_empty() {
            self.reply(text::NEED_TARGET).await;
            return None;
        }

        let target = self.target().await;

        if target.is_none() {
            self.reply(text::UNRESOLVED_USER).await;
        }

        target
    }
}

// Registry.

const REASON_HINT: &str = "❗ Specify the reason.";
const MUTE_HINT: &str = "❗ Specify the duration and the reason.";
const NICKNAME_HINT: &str = "❗ Specify the nickname.";
const ROLE_HINT: &str = "❗ Specify the reason for the role change.";

/// The static command table, built once.
pub struct CommandRegistry {
    by_name: HashMap<&'static str, CommandSpec>,
}

static REGISTRY: LazyLock<CommandRegistry> = LazyLock::new(CommandRegistry::build);

macro_rules! command {
    ($name:literal, $kind:ident, $role:ident, $target:expr, $handler:path) => {
        CommandSpec {
            name: $name,
            kind: CommandKind::$kind,
            required_role: Role::$role,
            target: $target,
            handler: |ctx| $handler(ctx).boxed(),
        }
    };
}

impl CommandRegistry {
    pub fn global() -> &'static CommandRegistry {
        &REGISTRY
    }

    fn build() -> Self {
        use TargetArgs::{None as NoTarget, TargetOnly, TargetWith};

        let commands = [
            // Everyone.
            command!("help", Help, User, NoTarget, general::help),
            command!("start", Start, User, NoTarget, general::start),
            command!("stats", Stats, User, TargetOnly, general::stats),
            command!("getid", GetId, User, NoTarget, general::getid),
            // Moderators.
            command!("chek", Chek, Moderator, TargetOnly, lookups::chek),
            command!("setnick", SetNick, Moderator, TargetWith(NICKNAME_HINT), nicknames::setnick),
            command!("removenick", RemoveNick, Moderator, TargetOnly, nicknames::removenick),
            command!("getnick", GetNick, Moderator, TargetOnly, nicknames::getnick),
            command!("getacc", GetAcc, Moderator, NoTarget, nicknames::getacc),
            command!("nlist", NickList, Moderator, NoTarget, nicknames::nlist),
            command!("nonick", NoNick, Moderator, NoTarget, nicknames::nonick),
            command!("kick", Kick, Moderator, TargetOnly, moderation::kick),
            command!("warn", Warn, Moderator, TargetWith(REASON_HINT), moderation::warn),
            command!("unwarn", Unwarn, Moderator, TargetOnly, moderation::unwarn),
            command!("getwarn", GetWarn, Moderator, TargetOnly, lookups::getwarn),
            command!("warnhistory", WarnHistory, Moderator, TargetOnly, lookups::warnhistory),
            command!("warnlist", WarnList, Moderator, NoTarget, lookups::warnlist),
            command!("staff", Staff, Moderator, NoTarget, general::staff),
            command!("reg", Reg, Moderator, TargetOnly, general::reg),
            command!("mute", Mute, Moderator, TargetWith(MUTE_HINT), moderation::mute),
            command!("unmute", Unmute, Moderator, TargetOnly, moderation::unmute),
            command!("getmute", GetMute, Moderator, TargetOnly, lookups::getmute),
            command!("mutelist", MuteList, Moderator, NoTarget, lookups::mutelist),
            command!("clear", Clear, Moderator, NoTarget, members::clear),
            command!("getban", GetBan, Moderator, TargetOnly, lookups::getban),
            command!("delete", Delete, Moderator, NoTarget, members::delete),
            // Senior moderators.
            command!("ban", Ban, SeniorModerator, TargetWith(REASON_HINT), moderation::ban),
            command!("unban", Unban, SeniorModerator, TargetOnly, moderation::unban),
            command!("addmoder", AddModer, SeniorModerator, TargetWith(ROLE_HINT), moderation::addmoder),
            command!("removerole", RemoveRole, SeniorModerator, TargetWith(ROLE_HINT), moderation::removerole),
            command!("zov", Zov, SeniorModerator, NoTarget, members::zov),
            command!("online", Online, SeniorModerator, NoTarget, members::online),
            command!("onlinelist", OnlineList, SeniorModerator, NoTarget, members::onlinelist),
            command!("banlist", BanList, SeniorModerator, NoTarget, lookups::banlist),
            command!("inactivelist", InactiveList, SeniorModerator, NoTarget, lookups::inactivelist),
            command!("masskick", MassKick, SeniorModerator, NoTarget, moderation::masskick),
            // Admins.
            command!("quiet", Quiet, Admin, NoTarget, moderation::quiet),
            command!("addsenmoder", AddSenModer, Admin, TargetWith(ROLE_HINT), moderation::addsenmoder),
            // Creators.
            command!("addadmin", AddAdmin, Creator, TargetWith(ROLE_HINT), moderation::addadmin),
            command!("removeadmin", RemoveAdmin, Creator, TargetWith(ROLE_HINT), moderation::removeadmin),
        ];

        let by_name = commands.into_iter().map(|spec| (spec.name, spec)).collect::<HashMap<_, _>>();

        info!("Registered {} commands.", by_name.len());

        Self { by_name }
    }

    /// Exact lookup by lowercase name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// Preprocessing.

/// Splits `/name args` into a lowercase name and the raw argument string.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let body = text.trim().strip_prefix('/')?;

    let (name, args) = match body.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (body, ""),
    };

    if name.is_empty() {
        return None;
    }

    Some((name.to_lowercase(), args.to_string()))
}

/// Returns `true` if the first argument token is itself a user reference.
fn has_explicit_target(args: &str) -> bool {
    let (first, _) = mention::split_target(args);

    mention::parse_mention(first) != mention::Mention::Unknown
}

/// Puts the replied-to author in front of the arguments when no explicit target was given.
///
/// Returns the usage hint when the command needs more than the target and nothing else was supplied.
pub fn substitute_reply(target: TargetArgs, args: &str, reply_from: Option<UserId>) -> Result<String, &'static str> {
    let args = args.trim();

    let Some(author) = reply_from else {
        return Ok(args.to_string());
    };

    if has_explicit_target(args) {
        return Ok(args.to_string());
    }

    match target {
        TargetArgs::None => Ok(args.to_string()),
        TargetArgs::TargetWith(hint) if args.is_empty() => Err(hint),
        TargetArgs::TargetOnly | TargetArgs::TargetWith(_) if args.is_empty() => Ok(author.to_string()),
        TargetArgs::TargetOnly | TargetArgs::TargetWith(_) => Ok(format!("{author} {args}")),
    }
}

/// Returns `true` for a leading token that needs a lookup before handlers see it.
fn needs_mention_lookup(token: &str) -> bool {
    (token.starts_with('[') && token.contains('|')) || token.starts_with('@')
}

/// Replaces a leading mention markup or `@handle` with the numeric id it refers to.
pub async fn substitute_mention(rt: &Runtime, target: TargetArgs, args: String) -> String {
    if target == TargetArgs::None {
        return args;
    }

    let (first, rest) = mention::split_target(&args);

    if !needs_mention_lookup(first) {
        return args;
    }

    match mention::resolve_token(&rt.chat, first).await {
        Some(id) if rest.is_empty() => id.to_string(),
        Some(id) => format!("{id} {rest}"),
        None => args,
    }
}

// Dispatch.

/// A command that passed every gate and is ready to run.
pub struct Invocation {
    pub spec: CommandSpec,
    pub ctx: CommandContext,
}

/// Runs the dispatch gates and argument preprocessing for a command message.
///
/// Returns `None` when the command is dropped or answered without running a handler.
#[instrument(skip_all, fields(peer_id = message.peer_id, from_id = message.from_id))]
pub async fn route(rt: &Runtime, message: &IncomingMessage) -> Res<Option<Invocation>> {
    let Some((name, args)) = parse_command(&message.text) else {
        return Ok(None);
    };

    let (peer_id, from_id) = (message.peer_id, message.from_id);

    // Quiet-mode gate.

    if rt.state.is_quiet() && !access::is_staff(rt, from_id, peer_id).await? {
        info!("Ignoring `{}` from {} in quiet mode.", name, from_id);
        return Ok(None);
    }

    // Cooldown gate.

    if !rt.state.try_command(from_id, Duration::from_secs(rt.config.command_cooldown_secs)) {
        info!("User {} is on cooldown.", from_id);
        rt.chat.say(peer_id, &text::spam_notice(from_id)).await;
        return Ok(None);
    }

    let Some(spec) = CommandRegistry::global().get(&name).copied() else {
        debug!("Unknown command `{}`.", name);
        return Ok(None);
    };

    // Implicit targets.

    let args = match substitute_reply(spec.target, &args, mention::reply_author(message)) {
        Ok(args) => args,
        Err(hint) => {
            rt.chat.say(peer_id, hint).await;
            return Ok(None);
        }
    };

    let args = substitute_mention(rt, spec.target, args).await;

    let ctx = CommandContext {
        rt: rt.clone(),
        peer_id,
        from_id,
        args,
        message: message.clone(),
    };

    Ok(Some(Invocation { spec, ctx }))
}

/// Routes a command message and submits it to the worker pool without waiting for it.
pub async fn dispatch(rt: &Runtime, message: &IncomingMessage) -> Res<Option<JoinHandle<()>>> {
    let Some(invocation) = route(rt, message).await? else {
        return Ok(None);
    };

    Ok(Some(rt.pool.submit(execute(invocation).in_current_span())))
}

/// Runs an invocation: role re-check, handler, and the catch boundary.
#[instrument(skip_all, fields(command = invocation.spec.name, peer_id = invocation.ctx.peer_id, from_id = invocation.ctx.from_id))]
pub async fn execute(invocation: Invocation) {
    let Invocation { spec, ctx } = invocation;
    let (rt, peer_id) = (ctx.rt.clone(), ctx.peer_id);

    let result = AssertUnwindSafe(execute_internal(spec, ctx)).catch_unwind().await;

    match result {
        Ok(Ok(())) => info!("Executed `{}`.", spec.name),
        Ok(Err(err)) => {
            error!("Error while executing `{}`: {:?}", spec.name, err);
            rt.chat.say(peer_id, text::GENERIC_FAILURE).await;
        }
        Err(_) => {
            error!("Handler for `{}` panicked.", spec.name);
            rt.chat.say(peer_id, text::GENERIC_FAILURE).await;
        }
    }
}

async fn execute_internal(spec: CommandSpec, ctx: CommandContext) -> Void {
    if !access::has_minimum(&ctx.rt, ctx.from_id, ctx.peer_id, spec.required_role).await? {
        ctx.reply(&text::insufficient_rights(ctx.from_id)).await;
        return Ok(());
    }

    (spec.handler)(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_args() {
        assert_eq!(parse_command("/Warn 123 spam  links"), Some(("warn".to_string(), "123 spam  links".to_string())));
        assert_eq!(parse_command("/help"), Some(("help".to_string(), String::new())));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn registry_is_exact_and_complete() {
        let registry = CommandRegistry::global();

        assert_eq!(registry.len(), 40);
        assert_eq!(registry.get("ban").map(|s| s.required_role), Some(Role::SeniorModerator));
        assert_eq!(registry.get("removeadmin").map(|s| s.required_role), Some(Role::Creator));
        assert_eq!(registry.get("quiet").map(|s| s.kind), Some(CommandKind::Quiet));
        assert!(registry.get("BAN").is_none());
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn reply_author_fills_missing_target() {
        assert_eq!(substitute_reply(TargetArgs::TargetOnly, "", Some(9)), Ok("9".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "flood", Some(9)), Ok("9 flood".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(MUTE_HINT), "30m flood", Some(9)), Ok("9 30m flood".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "3rd time", Some(9)), Ok("9 3rd time".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "[oops] spam", Some(9)), Ok("9 [oops] spam".to_string()));
    }

    #[test]
    fn explicit_target_wins_over_reply() {
        assert_eq!(substitute_reply(TargetArgs::TargetOnly, "42", Some(9)), Ok("42".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetOnly, "@bob", Some(9)), Ok("@bob".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "[id1|A] spam", Some(9)), Ok("[id1|A] spam".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "2 days of spam", Some(9)), Ok("2 days of spam".to_string()));
        assert_eq!(substitute_reply(TargetArgs::TargetOnly, "vk.com/id5", Some(9)), Ok("vk.com/id5".to_string()));
    }

    #[test]
    fn missing_required_args_yield_hint() {
        assert_eq!(substitute_reply(TargetArgs::TargetWith(REASON_HINT), "", Some(9)), Err(REASON_HINT));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(NICKNAME_HINT), "  ", Some(9)), Err(NICKNAME_HINT));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(ROLE_HINT), "", Some(9)), Err(ROLE_HINT));
        assert_eq!(substitute_reply(TargetArgs::TargetWith(ROLE_HINT), "promotion", Some(9)), Ok("9 promotion".to_string()));
    }

    #[test]
    fn no_reply_or_no_target_leaves_args() {
        assert_eq!(substitute_reply(TargetArgs::TargetOnly, "spam", None), Ok("spam".to_string()));
        assert_eq!(substitute_reply(TargetArgs::None, "", Some(9)), Ok(String::new()));
    }

    #[test]
    fn only_markup_and_handles_need_lookup() {
        assert!(needs_mention_lookup("[id1|A]"));
        assert!(needs_mention_lookup("@bob"));
        assert!(!needs_mention_lookup("123"));
        assert!(!needs_mention_lookup("[oops]"));
    }
}
