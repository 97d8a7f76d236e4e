use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            last_active_at  TEXT,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS device_tokens (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token       TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL,
            name        TEXT,
            created_by  INTEGER REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS group_settings (
            conversation_id  INTEGER PRIMARY KEY
                             REFERENCES conversations(id) ON DELETE CASCADE,
            allow_members_to_send_messages           INTEGER NOT NULL DEFAULT 0,
            allow_members_to_add_remove_participants INTEGER NOT NULL DEFAULT 0,
            allow_members_to_change_group_info       INTEGER NOT NULL DEFAULT 0,
            admins_must_approve_new_members          INTEGER NOT NULL DEFAULT 0,
            avatar_path  TEXT
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id       INTEGER NOT NULL
                                  REFERENCES conversations(id) ON DELETE CASCADE,
            user_id               INTEGER NOT NULL REFERENCES users(id),
            role                  TEXT NOT NULL DEFAULT 'member',
            is_active             INTEGER NOT NULL DEFAULT 1,
            is_muted              INTEGER NOT NULL DEFAULT 0,
            muted_until           TEXT,
            left_at               TEXT,
            removed_at            TEXT,
            last_read_message_id  INTEGER,
            joined_at             TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id, is_active);

        CREATE TABLE IF NOT EXISTS messages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id  INTEGER NOT NULL
                             REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id        INTEGER NOT NULL REFERENCES users(id),
            body             TEXT,
            kind             TEXT NOT NULL DEFAULT 'text',
            reply_to_id      INTEGER REFERENCES messages(id) ON DELETE SET NULL,
            lifecycle        TEXT NOT NULL DEFAULT 'active',
            is_restricted    INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, id);

        CREATE TABLE IF NOT EXISTS message_attachments (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id     INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            path           TEXT NOT NULL,
            kind           TEXT NOT NULL,
            size           INTEGER,
            original_name  TEXT,
            created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS message_statuses (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            status      TEXT NOT NULL DEFAULT 'sent',
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_statuses_user
            ON message_statuses(user_id, status);

        CREATE TABLE IF NOT EXISTS message_deletions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS message_reactions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            reaction    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON message_reactions(message_id);

        CREATE TABLE IF NOT EXISTS user_blocks (
            user_id     INTEGER NOT NULL REFERENCES users(id),
            blocked_id  INTEGER NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(user_id, blocked_id)
        );

        CREATE TABLE IF NOT EXISTS user_restricts (
            user_id        INTEGER NOT NULL REFERENCES users(id),
            restricted_id  INTEGER NOT NULL REFERENCES users(id),
            created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            UNIQUE(user_id, restricted_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
