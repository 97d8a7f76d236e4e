//! Block / restrict pair tables. Toggles are delete-else-insert on the
//! unique pair inside the caller's transaction, so concurrent toggles by
//! the same actor settle on a definite state instead of duplicating rows.

use rusqlite::{Connection, Result, params};

fn toggle_pair(conn: &Connection, table: &str, owner_col: &str, target_col: &str, a: i64, b: i64) -> Result<bool> {
    let deleted = conn.execute(
        &format!("DELETE FROM {table} WHERE {owner_col} = ?1 AND {target_col} = ?2"),
        params![a, b],
    )?;
    if deleted > 0 {
        return Ok(false);
    }
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} ({owner_col}, {target_col}) VALUES (?1, ?2)"),
        params![a, b],
    )?;
    Ok(true)
}

fn pair_exists(conn: &Connection, table: &str, owner_col: &str, target_col: &str, a: i64, b: i64) -> Result<bool> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {owner_col} = ?1 AND {target_col} = ?2"),
        params![a, b],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

/// Returns the new state: true if `blocker` now blocks `blocked`.
pub fn toggle_block(conn: &Connection, blocker: i64, blocked: i64) -> Result<bool> {
    toggle_pair(conn, "user_blocks", "user_id", "blocked_id", blocker, blocked)
}

pub fn has_blocked(conn: &Connection, blocker: i64, blocked: i64) -> Result<bool> {
    pair_exists(conn, "user_blocks", "user_id", "blocked_id", blocker, blocked)
}

/// Returns the new state: true if `restrictor` now restricts `restricted`.
pub fn toggle_restrict(conn: &Connection, restrictor: i64, restricted: i64) -> Result<bool> {
    toggle_pair(conn, "user_restricts", "user_id", "restricted_id", restrictor, restricted)
}

pub fn has_restricted(conn: &Connection, restrictor: i64, restricted: i64) -> Result<bool> {
    pair_exists(conn, "user_restricts", "user_id", "restricted_id", restrictor, restricted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::queries::insert_user;

    #[test]
    fn block_toggle_flips_state_and_is_directional() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn::<_, rusqlite::Error, _>(|conn| {
            let a = insert_user(conn, "a")?;
            let b = insert_user(conn, "b")?;

            assert!(toggle_block(conn, a, b)?);
            assert!(has_blocked(conn, a, b)?);
            assert!(!has_blocked(conn, b, a)?);

            assert!(!toggle_block(conn, a, b)?);
            assert!(!has_blocked(conn, a, b)?);
            Ok(())
        })
        .unwrap();
    }
}
