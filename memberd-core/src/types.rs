//! Domain types for the memberd member store.
//!
//! All types are serializable/deserializable via serde + serde_yaml.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One member of the association — the unit of identity every downstream
/// target is kept consistent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Login name; unique key across the store.
    pub name: String,
    pub full_name: String,
    pub email: String,
    /// UNIX uid assigned to this member's account.
    pub uid: u32,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Salted digest in `salt$hex` form; `None` means the member cannot
    /// authenticate yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// A calendar event, as consumed by the site-agenda refresher and the
/// photo-event administration commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub date: NaiveDate,
    #[serde(rename = "fullHumanName")]
    pub full_human_name: String,
}
