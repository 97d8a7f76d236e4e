use rusqlite::{Connection, OptionalExtension, Result, params};

use roost_types::models::{DeliveryState, MessageKind, TOMBSTONE_BODY};

use crate::models::{AttachmentRow, MessageRow, StatusRow};
use crate::now;

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        kind: row.get(4)?,
        reply_to_id: row.get(5)?,
        lifecycle: row.get(6)?,
        is_restricted: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const MESSAGE_COLS: &str = "id, conversation_id, sender_id, body, kind, reply_to_id, \
     lifecycle, is_restricted, created_at, updated_at";

pub fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    sender_id: i64,
    body: Option<&str>,
    kind: MessageKind,
    reply_to_id: Option<i64>,
    is_restricted: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_id, body, kind, reply_to_id, is_restricted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![conversation_id, sender_id, body, kind.as_str(), reply_to_id, is_restricted],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
        [id],
        |row| message_from_row(row),
    )
    .optional()
}

pub fn update_message_body(conn: &Connection, id: i64, body: &str) -> Result<usize> {
    conn.execute(
        "UPDATE messages SET body = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, body, now()],
    )
}

/// First delete phase: flip the lifecycle and replace the body with the
/// sentinel in one statement.
pub fn tombstone_message(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE messages SET lifecycle = 'tombstoned', body = ?2, updated_at = ?3
         WHERE id = ?1 AND lifecycle = 'active'",
        params![id, TOMBSTONE_BODY, now()],
    )
}

/// Second delete phase: drop the row. Statuses, reactions, deletions and
/// attachment rows cascade.
pub fn purge_message(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM messages WHERE id = ?1", [id])
}

pub fn latest_message_id(conn: &Connection, conversation_id: i64) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT MAX(id) FROM messages WHERE conversation_id = ?1",
        [conversation_id],
        |row| row.get(0),
    )
}

/// Messages visible to one user: rows the user deleted-for-me are
/// filtered out, ascending by id (send order).
pub fn messages_for(
    conn: &Connection,
    conversation_id: i64,
    user_id: i64,
    query: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLS} FROM messages m
         WHERE m.conversation_id = ?1
           AND NOT EXISTS (SELECT 1 FROM message_deletions d
                           WHERE d.message_id = m.id AND d.user_id = ?2)
           AND (?3 IS NULL OR m.body LIKE '%' || ?3 || '%')
         ORDER BY m.id ASC"
    ))?;
    let rows = stmt
        .query_map(params![conversation_id, user_id, query], |row| {
            message_from_row(row)
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

// -- Attachments --

pub fn insert_attachment(
    conn: &Connection,
    message_id: i64,
    path: &str,
    kind: &str,
    size: Option<i64>,
    original_name: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO message_attachments (message_id, path, kind, size, original_name)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![message_id, path, kind, size, original_name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn attachments_for(conn: &Connection, message_id: i64) -> Result<Vec<AttachmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, path, kind, size, original_name
         FROM message_attachments WHERE message_id = ?1",
    )?;
    let rows = stmt
        .query_map([message_id], |row| {
            Ok(AttachmentRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                path: row.get(2)?,
                kind: row.get(3)?,
                size: row.get(4)?,
                original_name: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete_attachments(conn: &Connection, message_id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM message_attachments WHERE message_id = ?1",
        [message_id],
    )
}

// -- Statuses --

/// Batch insert of the initial status fanout. Runs inside the caller's
/// send transaction so no reader observes a message without its full
/// status set.
pub fn insert_statuses(
    conn: &Connection,
    message_id: i64,
    rows: &[(i64, DeliveryState)],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO message_statuses (message_id, user_id, status) VALUES (?1, ?2, ?3)",
    )?;
    for (user_id, state) in rows {
        stmt.execute(params![message_id, user_id, state.as_str()])?;
    }
    Ok(())
}

/// sent -> delivered for one user across a conversation. The status
/// condition makes the transition monotonic under racing markRead.
pub fn mark_delivered(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE message_statuses SET status = 'delivered', updated_at = ?3
         WHERE user_id = ?2 AND status = 'sent'
           AND message_id IN (SELECT id FROM messages WHERE conversation_id = ?1)",
        params![conversation_id, user_id, now()],
    )
}

/// Everything not yet seen -> seen for one user across a conversation.
pub fn mark_seen_all(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE message_statuses SET status = 'seen', updated_at = ?3
         WHERE user_id = ?2 AND status != 'seen'
           AND message_id IN (SELECT id FROM messages WHERE conversation_id = ?1)",
        params![conversation_id, user_id, now()],
    )
}

pub fn statuses_for_message(conn: &Connection, message_id: i64) -> Result<Vec<StatusRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, user_id, status, created_at, updated_at
         FROM message_statuses WHERE message_id = ?1 ORDER BY user_id ASC",
    )?;
    let rows = stmt
        .query_map([message_id], |row| {
            Ok(StatusRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                user_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

// -- Per-user deletions --

/// Idempotent: re-deleting an already hidden message is a no-op.
pub fn insert_deletion(conn: &Connection, message_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO message_deletions (message_id, user_id) VALUES (?1, ?2)",
        params![message_id, user_id],
    )?;
    Ok(())
}
