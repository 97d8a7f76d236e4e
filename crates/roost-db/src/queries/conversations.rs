use rusqlite::{Connection, OptionalExtension, Result, params};

use roost_types::models::{ConversationKind, Role};

use crate::models::{ConversationOverview, ConversationRow, GroupSettingsRow, ParticipantRow};
use crate::now;

fn conversation_from_row(row: &rusqlite::Row<'_>) -> Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const CONVERSATION_COLS: &str = "id, kind, name, created_by, created_at, updated_at";

pub fn insert_conversation(
    conn: &Connection,
    kind: ConversationKind,
    name: Option<&str>,
    created_by: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO conversations (kind, name, created_by) VALUES (?1, ?2, ?3)",
        params![kind.as_str(), name, created_by],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_conversation(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLS} FROM conversations WHERE id = ?1"),
        [id],
        |row| conversation_from_row(row),
    )
    .optional()
}

/// Bump updated_at; drives recency ordering in conversation lists.
pub fn touch_conversation(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
        params![id, now()],
    )
}

pub fn set_conversation_name(conn: &Connection, id: i64, name: &str) -> Result<usize> {
    conn.execute(
        "UPDATE conversations SET name = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, name, now()],
    )
}

/// Active conversations of one user, most recently touched first, each
/// with the user's unread count (messages from others past their
/// `last_read_message_id`). The optional filter matches group names,
/// or the other participant's name for private pairs.
pub fn conversations_for(
    conn: &Connection,
    user_id: i64,
    query: Option<&str>,
) -> Result<Vec<ConversationOverview>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.kind, c.name, c.created_by, c.created_at, c.updated_at,
                (SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = c.id
                   AND m.sender_id != ?1
                   AND m.id > COALESCE(p.last_read_message_id, 0))
         FROM conversations c
         JOIN conversation_participants p
           ON p.conversation_id = c.id AND p.user_id = ?1 AND p.is_active = 1
         WHERE ?2 IS NULL
            OR (c.kind = 'group' AND c.name LIKE '%' || ?2 || '%')
            OR (c.kind = 'private' AND EXISTS (
                  SELECT 1 FROM conversation_participants o
                  JOIN users u ON u.id = o.user_id
                  WHERE o.conversation_id = c.id
                    AND o.user_id != ?1
                    AND u.name LIKE '%' || ?2 || '%'))
         ORDER BY c.updated_at DESC, c.id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id, query], |row| {
            Ok(ConversationOverview {
                conversation: conversation_from_row(row)?,
                unread_count: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

/// Hard delete; participants, messages, settings and their children
/// cascade away with the row.
pub fn delete_conversation(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM conversations WHERE id = ?1", [id])
}

/// The private conversation between two users, if any. Participant
/// history (active or not) counts: a left member re-messaging the same
/// peer reuses the pair's conversation.
pub fn find_private_between(conn: &Connection, a: i64, b: i64) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLS} FROM conversations c
             WHERE c.kind = 'private'
               AND EXISTS (SELECT 1 FROM conversation_participants p
                           WHERE p.conversation_id = c.id AND p.user_id = ?1)
               AND EXISTS (SELECT 1 FROM conversation_participants p
                           WHERE p.conversation_id = c.id AND p.user_id = ?2)
             LIMIT 1"
        ),
        params![a, b],
        |row| conversation_from_row(row),
    )
    .optional()
}

pub fn find_self_chat(conn: &Connection, user_id: i64) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLS} FROM conversations c
             WHERE c.kind = 'self'
               AND EXISTS (SELECT 1 FROM conversation_participants p
                           WHERE p.conversation_id = c.id AND p.user_id = ?1)
             LIMIT 1"
        ),
        [user_id],
        |row| conversation_from_row(row),
    )
    .optional()
}

// -- Participants --

fn participant_from_row(row: &rusqlite::Row<'_>) -> Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        is_muted: row.get(5)?,
        muted_until: row.get(6)?,
        left_at: row.get(7)?,
        removed_at: row.get(8)?,
        last_read_message_id: row.get(9)?,
        joined_at: row.get(10)?,
    })
}

const PARTICIPANT_COLS: &str = "id, conversation_id, user_id, role, is_active, is_muted, \
     muted_until, left_at, removed_at, last_read_message_id, joined_at";

pub fn insert_participant(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
    role: Role,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO conversation_participants (conversation_id, user_id, role)
         VALUES (?1, ?2, ?3)",
        params![conversation_id, user_id, role.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_participant(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> Result<Option<ParticipantRow>> {
    conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLS} FROM conversation_participants
             WHERE conversation_id = ?1 AND user_id = ?2"
        ),
        params![conversation_id, user_id],
        |row| participant_from_row(row),
    )
    .optional()
}

pub fn active_participant(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
) -> Result<Option<ParticipantRow>> {
    conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLS} FROM conversation_participants
             WHERE conversation_id = ?1 AND user_id = ?2 AND is_active = 1"
        ),
        params![conversation_id, user_id],
        |row| participant_from_row(row),
    )
    .optional()
}

pub fn active_participants(conn: &Connection, conversation_id: i64) -> Result<Vec<ParticipantRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PARTICIPANT_COLS} FROM conversation_participants
         WHERE conversation_id = ?1 AND is_active = 1
         ORDER BY joined_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map([conversation_id], |row| participant_from_row(row))?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

/// Bring a previously-left or removed participant back. Begins a new
/// active period on the same (conversation, user) row.
pub fn reactivate_participant(conn: &Connection, participant_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE conversation_participants
         SET is_active = 1, left_at = NULL, removed_at = NULL, joined_at = ?2
         WHERE id = ?1",
        params![participant_id, now()],
    )
}

/// Voluntary leave: only flips rows that are still active, so racing
/// leave calls settle on one effective transition.
pub fn mark_left(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE conversation_participants
         SET is_active = 0, left_at = ?3
         WHERE conversation_id = ?1 AND user_id = ?2 AND is_active = 1",
        params![conversation_id, user_id, now()],
    )
}

/// Admin removal, same active-row condition as mark_left.
pub fn mark_removed(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE conversation_participants
         SET is_active = 0, removed_at = ?3
         WHERE conversation_id = ?1 AND user_id = ?2 AND is_active = 1",
        params![conversation_id, user_id, now()],
    )
}

pub fn set_mute(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
    is_muted: bool,
    muted_until: Option<&str>,
) -> Result<usize> {
    conn.execute(
        "UPDATE conversation_participants
         SET is_muted = ?3, muted_until = ?4
         WHERE conversation_id = ?1 AND user_id = ?2",
        params![conversation_id, user_id, is_muted, muted_until],
    )
}

/// Flip roles for the given users, but only rows currently holding
/// `from`. Super admins never match, so this path cannot touch them.
pub fn flip_roles(
    conn: &Connection,
    conversation_id: i64,
    user_ids: &[i64],
    from: Role,
    to: Role,
) -> Result<usize> {
    if user_ids.is_empty() {
        return Ok(0);
    }
    let placeholders: Vec<String> = (3..3 + user_ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "UPDATE conversation_participants SET role = ?1
         WHERE conversation_id = ?2 AND role = '{}' AND user_id IN ({})",
        from.as_str(),
        placeholders.join(", ")
    );
    let to_role = to.as_str();
    let mut params_vec: Vec<&dyn rusqlite::types::ToSql> = vec![&to_role, &conversation_id];
    for id in user_ids {
        params_vec.push(id);
    }
    conn.execute(&sql, params_vec.as_slice())
}

/// Advance the read high-water mark. Monotonic: an older racing call
/// never regresses it.
pub fn advance_last_read(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
    message_id: i64,
) -> Result<usize> {
    conn.execute(
        "UPDATE conversation_participants
         SET last_read_message_id = ?3
         WHERE conversation_id = ?1 AND user_id = ?2
           AND (last_read_message_id IS NULL OR last_read_message_id <= ?3)",
        params![conversation_id, user_id, message_id],
    )
}

// -- Group settings --

pub fn insert_group_settings(conn: &Connection, conversation_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO group_settings (conversation_id) VALUES (?1)",
        [conversation_id],
    )?;
    Ok(())
}

pub fn get_group_settings(
    conn: &Connection,
    conversation_id: i64,
) -> Result<Option<GroupSettingsRow>> {
    conn.query_row(
        "SELECT conversation_id, allow_members_to_send_messages,
                allow_members_to_add_remove_participants,
                allow_members_to_change_group_info,
                admins_must_approve_new_members, avatar_path
         FROM group_settings WHERE conversation_id = ?1",
        [conversation_id],
        |row| {
            Ok(GroupSettingsRow {
                conversation_id: row.get(0)?,
                allow_members_to_send_messages: row.get(1)?,
                allow_members_to_add_remove_participants: row.get(2)?,
                allow_members_to_change_group_info: row.get(3)?,
                admins_must_approve_new_members: row.get(4)?,
                avatar_path: row.get(5)?,
            })
        },
    )
    .optional()
}

pub fn update_group_settings(conn: &Connection, settings: &GroupSettingsRow) -> Result<usize> {
    conn.execute(
        "UPDATE group_settings SET
            allow_members_to_send_messages = ?2,
            allow_members_to_add_remove_participants = ?3,
            allow_members_to_change_group_info = ?4,
            admins_must_approve_new_members = ?5,
            avatar_path = ?6
         WHERE conversation_id = ?1",
        params![
            settings.conversation_id,
            settings.allow_members_to_send_messages,
            settings.allow_members_to_add_remove_participants,
            settings.allow_members_to_change_group_info,
            settings.admins_must_approve_new_members,
            settings.avatar_path,
        ],
    )
}
