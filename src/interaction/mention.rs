//! Resolution of free-text user references to numeric user ids.
//!
//! A reference can be a raw id, VK mention markup (`[id1|Name]`), a profile
//! URL (`vk.com/id1` or `vk.com/handle`), or an `@handle`. Handles need a
//! profile lookup; everything else is parsed locally.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{
    base::types::{IncomingMessage, UserId},
    service::chat::ChatClient,
};

static MARKUP_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[id(\d+)\|").expect("markup token pattern is valid"));
static MARKUP_ANYWHERE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[id(\d+)\|[^\]]+\]").expect("markup pattern is valid"));
static PROFILE_ID_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:https?://)?(?:www\.)?vk\.(?:com|me)/id(\d+)/?$").expect("profile id url pattern is valid"));
static PROFILE_HANDLE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:https?://)?(?:www\.)?vk\.(?:com|me)/([A-Za-z0-9_.]+)/?$").expect("profile handle url pattern is valid"));
static HANDLE_ANYWHERE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").expect("handle pattern is valid"));

/// The result of parsing a reference without any remote lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mention {
    /// A numeric user id.
    Id(UserId),
    /// A vanity handle that still needs a profile lookup.
    Handle(String),
    /// Nothing recognizable.
    Unknown,
}

/// Parses a single token.
pub fn parse_mention(token: &str) -> Mention {
    let token = token.trim();

    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().map(Mention::Id).unwrap_or(Mention::Unknown);
    }

    if let Some(id) = capture_id(&MARKUP_TOKEN, token) {
        return Mention::Id(id);
    }

    if let Some(id) = capture_id(&PROFILE_ID_URL, token) {
        return Mention::Id(id);
    }

    if let Some(caps) = PROFILE_HANDLE_URL.captures(token) {
        return Mention::Handle(caps[1].to_string());
    }

    if let Some(handle) = token.strip_prefix('@')
        && !handle.is_empty()
    {
        return Mention::Handle(handle.to_string());
    }

    Mention::Unknown
}

/// Searches a whole text for mention markup, then for an `@handle`.
pub fn find_in_text(text: &str) -> Mention {
    if let Some(caps) = MARKUP_ANYWHERE.captures(text)
        && let Ok(id) = caps[1].parse()
    {
        return Mention::Id(id);
    }

    if let Some(caps) = HANDLE_ANYWHERE.captures(text) {
        return Mention::Handle(caps[1].to_string());
    }

    Mention::Unknown
}

/// Splits the leading target reference from the rest of the arguments.
///
/// Mention markup may contain spaces in its label, so a leading `[...]` is
/// kept whole.
pub fn split_target(args: &str) -> (&str, &str) {
    let args = args.trim();

    if args.starts_with('[')
        && let Some(end) = args.find(']')
    {
        return (&args[..=end], args[end + 1..].trim_start());
    }

    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (args, ""),
    }
}

/// Resolves the user referenced by `text`.
///
/// Tries the leading token first and falls back to a search of the full text
/// when it holds more than one token. Every failure becomes `None`.
pub async fn resolve_user(chat: &ChatClient, text: &str) -> Option<UserId> {
    let text = text.trim();
    let (first, rest) = split_target(text);

    if let Some(id) = resolve_token(chat, first).await {
        return Some(id);
    }

    if rest.is_empty() {
        return None;
    }

    lookup(chat, find_in_text(text)).await
}

/// Resolves a single token, without the full-text fallback.
pub async fn resolve_token(chat: &ChatClient, token: &str) -> Option<UserId> {
    lookup(chat, parse_mention(token)).await
}

/// The author of the message the given one replies to.
pub fn reply_author(message: &IncomingMessage) -> Option<UserId> {
    message.reply_from_id
}

async fn lookup(chat: &ChatClient, mention: Mention) -> Option<UserId> {
    match mention {
        Mention::Id(id) => Some(id),
        Mention::Handle(handle) => match chat.resolve_profile(&handle).await {
            Ok(profile) => Some(profile.id),
            Err(err) => {
                debug!("Failed to resolve handle `{}`: {}", handle, err);
                None
            }
        },
        Mention::Unknown => None,
    }
}

fn capture_id(re: &Regex, token: &str) -> Option<UserId> {
    re.captures(token).and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_ids_and_markup() {
        assert_eq!(parse_mention("123456"), Mention::Id(123456));
        assert_eq!(parse_mention("[id123456|Ivan Petrov]"), Mention::Id(123456));
        assert_eq!(parse_mention("[id42|Ivan"), Mention::Id(42));
    }

    #[test]
    fn parses_profile_urls() {
        assert_eq!(parse_mention("https://vk.com/id123456"), Mention::Id(123456));
        assert_eq!(parse_mention("vk.me/id7"), Mention::Id(7));
        assert_eq!(parse_mention("www.vk.com/durov"), Mention::Handle("durov".to_string()));
    }

    #[test]
    fn parses_handles_and_rejects_noise() {
        assert_eq!(parse_mention("@durov"), Mention::Handle("durov".to_string()));
        assert_eq!(parse_mention("@"), Mention::Unknown);
        assert_eq!(parse_mention("spam"), Mention::Unknown);
        assert_eq!(parse_mention(""), Mention::Unknown);
        assert_eq!(parse_mention("99999999999999999999999"), Mention::Unknown);
    }

    #[test]
    fn finds_references_anywhere_in_text() {
        assert_eq!(find_in_text("please check [id5|Bob] now"), Mention::Id(5));
        assert_eq!(find_in_text("ping @alice please"), Mention::Handle("alice".to_string()));
        assert_eq!(find_in_text("nothing here"), Mention::Unknown);
    }

    #[test]
    fn keeps_markup_with_spaces_as_one_token() {
        assert_eq!(split_target("[id1|Ivan Petrov] flood"), ("[id1|Ivan Petrov]", "flood"));
        assert_eq!(split_target("123 30m spam"), ("123", "30m spam"));
        assert_eq!(split_target("123"), ("123", ""));
        assert_eq!(split_target(""), ("", ""));
    }
}
