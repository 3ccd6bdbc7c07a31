//! Handlers for the informational and housekeeping commands.
//!
//! Moderation actions that mutate state and apply staff protection live in
//! [`crate::interaction::moderation`].

pub mod general;
pub mod lookups;
pub mod members;
pub mod nicknames;

use crate::{base::types::UserId, runtime::Runtime};

/// Maximum number of rows a listing shows.
pub const LIST_LIMIT: usize = 20;

/// Renders a header and at most [`LIST_LIMIT`] rows, with a footer when rows were cut.
pub fn capped_list(header: &str, rows: &[String]) -> String {
    let mut text = format!("{header}\n\n");

    for row in rows.iter().take(LIST_LIMIT) {
        text.push_str(row);
        text.push('\n');
    }

    if rows.len() > LIST_LIMIT {
        text.push_str(&format!("\nShown {} of {}.", LIST_LIMIT, rows.len()));
    }

    text.trim_end().to_string()
}

/// A nickname, or a placeholder when unset.
pub fn nickname_or_placeholder(nickname: Option<&str>) -> &str {
    match nickname {
        Some(nickname) if !nickname.is_empty() => nickname,
        _ => "not set",
    }
}

/// The profile name of a user, falling back to the stored nickname and then to the raw id.
pub async fn display_label(rt: &Runtime, user_id: UserId, nickname: Option<&str>) -> String {
    match rt.chat.resolve_profile(&user_id.to_string()).await {
        Ok(profile) => profile.display_name(),
        Err(_) => match nickname {
            Some(nickname) if !nickname.is_empty() => nickname.to_string(),
            _ => format!("ID: {user_id}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_lists_have_no_footer() {
        let rows = vec!["a".to_string(), "b".to_string()];
        assert_eq!(capped_list("Header", &rows), "Header\n\na\nb");
    }

    #[test]
    fn long_lists_are_capped() {
        let rows = (0..25).map(|i| i.to_string()).collect::<Vec<_>>();
        let text = capped_list("Header", &rows);

        assert!(text.contains("\n19\n"));
        assert!(!text.contains("\n20\n"));
        assert!(text.ends_with("Shown 20 of 25."));
    }
}
