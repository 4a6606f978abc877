//! Local user records owned by the user repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user in the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalUserRecord {
    pub id: i64,
    /// `None` for locally-created users; unique among non-null values.
    pub external_id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
    pub is_external: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl LocalUserRecord {
    /// Whether this user was sourced from the directory.
    pub fn is_directory_sourced(&self) -> bool {
        self.is_external && self.external_id.is_some()
    }
}

/// Fields for a user created from a directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExternalUser {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub active: bool,
}

/// Fields for a locally-created user (never touched by directory sync).
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocalUser {
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// The changed fields of an update. `None` means unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.display_name.is_none()
            && self.active.is_none()
    }

    /// Names of the changed fields, in a fixed order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.username.is_some() {
            names.push("username");
        }
        if self.email.is_some() {
            names.push("email");
        }
        if self.display_name.is_some() {
            names.push("display_name");
        }
        if self.active.is_some() {
            names.push("active");
        }
        names
    }

    /// Apply the changes to a copy of `record`.
    pub fn applied_to(&self, record: &LocalUserRecord) -> LocalUserRecord {
        let mut updated = record.clone();
        if let Some(ref username) = self.username {
            updated.username = username.clone();
        }
        if let Some(ref email) = self.email {
            updated.email = email.clone();
        }
        if let Some(ref display_name) = self.display_name {
            updated.display_name = display_name.clone();
        }
        if let Some(active) = self.active {
            updated.active = active;
        }
        updated
    }
}
