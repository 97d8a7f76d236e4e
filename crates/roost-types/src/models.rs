use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Body text a message is rewritten to when its sender deletes it for
/// everyone. Kept for display compatibility only; the lifecycle column,
/// not this string, is what marks a message as tombstoned.
pub const TOMBSTONE_BODY: &str = "Unsent";

/// A user counts as online if their last activity is at most this old.
pub fn online_window() -> Duration {
    Duration::minutes(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Private,
    Group,
    #[serde(rename = "self")]
    SelfChat,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::SelfChat => "self",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            "self" => Some(Self::SelfChat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    /// Admins and super admins pass every settings gate.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Multiple,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Multiple => "multiple",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "file" => Some(Self::File),
            "multiple" => Some(Self::Multiple),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Per-recipient delivery state. Strictly ordered: a status row only
/// ever moves forward along sent -> delivered -> seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Seen,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Seen => "seen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "seen" => Some(Self::Seen),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Seen => 2,
        }
    }
}

/// Explicit message lifecycle. Purged messages have no row at all, so
/// only the two live states are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLifecycle {
    Active,
    Tombstoned,
}

impl MessageLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Tombstoned => "tombstoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "tombstoned" => Some(Self::Tombstoned),
            _ => None,
        }
    }
}

/// Aggregated reactions for one message, grouped by reaction value.
/// Clients replace their reaction state wholesale with this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub reaction: String,
    pub count: usize,
    pub user_ids: Vec<UserId>,
}

/// A push dispatch unit: one per message, carrying every recipient
/// token resolved at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}
