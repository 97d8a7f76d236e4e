use rusqlite::{Connection, OptionalExtension, Result, params};

use crate::models::UserRow;
use crate::now;

pub fn insert_user(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO users (name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, name, last_active_at, created_at FROM users WHERE id = ?1",
        [id],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                last_active_at: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn touch_last_active(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute(
        "UPDATE users SET last_active_at = ?2 WHERE id = ?1",
        params![id, now()],
    )
}

/// Register a device token, reassigning it if another user held it
/// (a device changing accounts keeps a single live row).
pub fn register_device_token(conn: &Connection, user_id: i64, token: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO device_tokens (user_id, token) VALUES (?1, ?2)
         ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id",
        params![user_id, token],
    )?;
    Ok(())
}

pub fn remove_device_token(conn: &Connection, token: &str) -> Result<usize> {
    conn.execute("DELETE FROM device_tokens WHERE token = ?1", [token])
}

pub fn tokens_for_user(conn: &Connection, user_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT token FROM device_tokens WHERE user_id = ?1")?;
    let rows = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(rows)
}
