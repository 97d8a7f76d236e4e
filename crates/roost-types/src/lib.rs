pub mod events;
pub mod models;

/// Row ids are SQLite `INTEGER PRIMARY KEY` values. Message ids are
/// allocated by AUTOINCREMENT, which makes them monotonic per database
/// and therefore per conversation.
pub type UserId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;
pub type ParticipantId = i64;
