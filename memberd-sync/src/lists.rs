//! Typed change-set for the mailing-list target.
//!
//! Unlike the other targets, which receive untyped request/response
//! mappings, the list server exposes a schema-typed apply-changes call.
//! These are its wire types.

use serde::{Deserialize, Serialize};

/// A batch of list mutations, applied atomically per list by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChanges {
    #[serde(default)]
    pub create: Vec<ListDescriptor>,
    #[serde(default)]
    pub subscribe: Vec<Subscription>,
    #[serde(default)]
    pub unsubscribe: Vec<Subscription>,
}

impl ListChanges {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDescriptor {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub list: String,
    pub email: String,
}

/// Result of an apply-changes call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<String>,
}
