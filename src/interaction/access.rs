//! Role checks against the stored hierarchy and the live conversation owner.

use tracing::instrument;

use crate::{
    base::types::{PeerId, Res, Role, UserId},
    runtime::Runtime,
};

/// The role that counts for `user_id` in `peer_id`: the conversation override if present, the global role otherwise.
pub async fn effective_role(rt: &Runtime, user_id: UserId, peer_id: PeerId) -> Res<Role> {
    rt.db.get_role(user_id, Some(peer_id)).await
}

/// Pure form of the minimum-role check.
pub fn satisfies(role: Role, is_owner: bool, required: Role) -> bool {
    is_owner || role.at_least(required)
}

/// Returns `true` if `user_id` is the conversation owner, as the platform reports it right now.
pub async fn is_owner(rt: &Runtime, user_id: UserId, peer_id: PeerId) -> bool {
    rt.chat.conversation_owner(peer_id).await == Some(user_id)
}

/// Returns `true` if `user_id` holds at least `required` in `peer_id`, or owns the conversation.
#[instrument(skip(rt))]
pub async fn has_minimum(rt: &Runtime, user_id: UserId, peer_id: PeerId, required: Role) -> Res<bool> {
    let role = effective_role(rt, user_id, peer_id).await?;

    // The owner lookup is a remote call; skip it when the stored role suffices.
    if satisfies(role, false, required) {
        return Ok(true);
    }

    Ok(satisfies(role, is_owner(rt, user_id, peer_id).await, required))
}

/// Returns `true` if `user_id` counts as staff in `peer_id`.
pub async fn is_staff(rt: &Runtime, user_id: UserId, peer_id: PeerId) -> Res<bool> {
    has_minimum(rt, user_id, peer_id, Role::Moderator).await
}

/// Staff protection: staff targets can only be acted on by admins or the owner.
#[instrument(skip(rt))]
pub async fn may_act_on(rt: &Runtime, actor: UserId, target: UserId, peer_id: PeerId) -> Res<bool> {
    if !is_staff(rt, target, peer_id).await? {
        return Ok(true);
    }

    has_minimum(rt, actor, peer_id, Role::Admin).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_or_equal_rank_always_satisfies() {
        for role in Role::DESCENDING {
            for required in Role::DESCENDING {
                assert_eq!(satisfies(role, false, required), role.rank() >= required.rank());
            }
        }
    }

    #[test]
    fn owner_satisfies_everything() {
        assert!(satisfies(Role::User, true, Role::Creator));
    }
}
