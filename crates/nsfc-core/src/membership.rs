use tracing::{debug, error, info};

use crate::{
    domain::ChatKind,
    store::{Group, Store},
    update::{MemberJoined, MemberLeft},
};

/// Keep the group record current and link each known joining user to it.
///
/// Store failures are logged; they never fail the update.
pub async fn on_members_joined(store: &dyn Store, ev: &MemberJoined) {
    if ev.chat.kind == ChatKind::Private {
        return;
    }

    let group = Group {
        id: ev.chat.id,
        kind: ev.chat.kind,
        title: ev.chat.title.clone().unwrap_or_default(),
    };
    match store.get_group(group.id).await {
        Ok(existing) => {
            if existing.title != group.title || existing.kind != group.kind {
                if let Err(e) = store.update_group(group.clone()).await {
                    error!(chat_id = group.id.0, error = %e, "update group failed");
                }
            }
        }
        Err(e) if e.is_not_found() => {
            if let Err(e) = store.set_group(group.clone()).await {
                error!(chat_id = group.id.0, error = %e, "create group failed");
            }
        }
        Err(e) => error!(chat_id = group.id.0, error = %e, "get group failed"),
    }

    for member in &ev.members {
        info!(
            uid = member.id.0,
            name = %member.display_name(),
            gid = group.id.0,
            group = %group.title,
            "user joined group"
        );
        if member.is_bot {
            continue;
        }
        match store.get_user(member.id).await {
            Ok(user) => {
                if let Err(e) = store.add_group_to_user(user.id, group.id).await {
                    error!(uid = user.id.0, gid = group.id.0, error = %e, "add group to user failed");
                }
            }
            Err(e) if e.is_not_found() => {
                debug!(uid = member.id.0, "joined user has no record yet");
            }
            Err(e) => error!(uid = member.id.0, error = %e, "get user failed"),
        }
    }
}

pub async fn on_member_left(store: &dyn Store, ev: &MemberLeft) {
    if ev.chat.kind == ChatKind::Private {
        return;
    }
    info!(
        uid = ev.member.id.0,
        name = %ev.member.display_name(),
        gid = ev.chat.id.0,
        group = ev.chat.title.as_deref().unwrap_or_default(),
        "user left group"
    );
    match store.remove_group_from_user(ev.member.id, ev.chat.id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(uid = ev.member.id.0, "departed user has no record");
        }
        Err(e) => error!(uid = ev.member.id.0, gid = ev.chat.id.0, error = %e, "remove group from user failed"),
    }
}
