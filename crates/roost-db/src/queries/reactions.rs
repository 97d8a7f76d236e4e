use rusqlite::{Connection, OptionalExtension, Result, params};

use crate::models::ReactionRow;
use crate::now;

/// Toggle semantics on the (message, user) unique key: same value
/// removes the reaction, a different value replaces it, none inserts.
/// Returns true if a reaction is live after the call.
pub fn toggle_reaction(
    conn: &Connection,
    message_id: i64,
    user_id: i64,
    reaction: &str,
) -> Result<bool> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT reaction FROM message_reactions WHERE message_id = ?1 AND user_id = ?2",
            params![message_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(current) if current == reaction => {
            conn.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2",
                params![message_id, user_id],
            )?;
            Ok(false)
        }
        _ => {
            // Upsert keyed on the unique pair, so a concurrent duplicate
            // insert collapses into an overwrite instead of a second row.
            conn.execute(
                "INSERT INTO message_reactions (message_id, user_id, reaction, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(message_id, user_id) DO UPDATE
                 SET reaction = excluded.reaction, created_at = excluded.created_at",
                params![message_id, user_id, reaction, now()],
            )?;
            Ok(true)
        }
    }
}

pub fn reactions_for_message(conn: &Connection, message_id: i64) -> Result<Vec<ReactionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, user_id, reaction, created_at
         FROM message_reactions WHERE message_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([message_id], reaction_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

/// Batch-fetch reactions for a set of message ids (list views).
pub fn reactions_for_messages(conn: &Connection, message_ids: &[i64]) -> Result<Vec<ReactionRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, message_id, user_id, reaction, created_at
         FROM message_reactions WHERE message_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_vec: Vec<&dyn rusqlite::types::ToSql> = message_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();
    let rows = stmt
        .query_map(params_vec.as_slice(), reaction_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

fn reaction_from_row(row: &rusqlite::Row<'_>) -> Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        reaction: row.get(3)?,
        created_at: row.get(4)?,
    })
}
