//! Permission evaluator: pure functions over group settings and the
//! caller's role. No settings row means no restrictions (private and
//! self conversations never have one). A set allow flag opens the
//! operation to every member; otherwise admin or super admin is
//! required. Safe to call repeatedly and concurrently.

use rusqlite::Connection;

use roost_db::models::GroupSettingsRow;
use roost_db::queries;
use roost_types::models::Role;

pub fn can_send(settings: Option<&GroupSettingsRow>, role: Option<Role>) -> bool {
    match settings {
        None => true,
        Some(s) => s.allow_members_to_send_messages || role.is_some_and(|r| r.is_admin()),
    }
}

pub fn can_manage_members(settings: Option<&GroupSettingsRow>, role: Option<Role>) -> bool {
    match settings {
        None => true,
        Some(s) => {
            s.allow_members_to_add_remove_participants || role.is_some_and(|r| r.is_admin())
        }
    }
}

pub fn can_edit_info(settings: Option<&GroupSettingsRow>, role: Option<Role>) -> bool {
    match settings {
        None => true,
        Some(s) => s.allow_members_to_change_group_info || role.is_some_and(|r| r.is_admin()),
    }
}

// Database-backed wrappers: resolve the settings row and the caller's
// active role, then defer to the pure rules above.

fn resolve(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> rusqlite::Result<(Option<GroupSettingsRow>, Option<Role>)> {
    let settings = queries::get_group_settings(conn, conversation_id)?;
    let role = queries::active_participant(conn, conversation_id, user_id)?.map(|p| p.role());
    Ok((settings, role))
}

pub fn can_send_in(conn: &Connection, conversation_id: i64, user_id: i64) -> rusqlite::Result<bool> {
    let (settings, role) = resolve(conn, conversation_id, user_id)?;
    Ok(can_send(settings.as_ref(), role))
}

pub fn can_manage_members_in(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> rusqlite::Result<bool> {
    let (settings, role) = resolve(conn, conversation_id, user_id)?;
    Ok(can_manage_members(settings.as_ref(), role))
}

pub fn can_edit_info_in(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> rusqlite::Result<bool> {
    let (settings, role) = resolve(conn, conversation_id, user_id)?;
    Ok(can_edit_info(settings.as_ref(), role))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(send: bool, manage: bool, info: bool) -> GroupSettingsRow {
        GroupSettingsRow {
            conversation_id: 1,
            allow_members_to_send_messages: send,
            allow_members_to_add_remove_participants: manage,
            allow_members_to_change_group_info: info,
            admins_must_approve_new_members: false,
            avatar_path: None,
        }
    }

    #[test]
    fn missing_settings_permit_everything() {
        assert!(can_send(None, None));
        assert!(can_manage_members(None, Some(Role::Member)));
        assert!(can_edit_info(None, None));
    }

    #[test]
    fn allow_flag_opens_operation_to_members() {
        let s = settings(true, false, false);
        assert!(can_send(Some(&s), Some(Role::Member)));
        assert!(!can_manage_members(Some(&s), Some(Role::Member)));
        assert!(!can_edit_info(Some(&s), Some(Role::Member)));
    }

    #[test]
    fn admins_bypass_restrictive_flags() {
        let s = settings(false, false, false);
        for role in [Role::Admin, Role::SuperAdmin] {
            assert!(can_send(Some(&s), Some(role)));
            assert!(can_manage_members(Some(&s), Some(role)));
            assert!(can_edit_info(Some(&s), Some(role)));
        }
        assert!(!can_send(Some(&s), Some(Role::Member)));
        assert!(!can_send(Some(&s), None));
    }
}
