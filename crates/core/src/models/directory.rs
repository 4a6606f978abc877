//! Directory entries as returned by the external directory for one run.

use serde::{Deserialize, Serialize};

/// One person record read from the directory. Has no local identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The directory's stable unique key for this person.
    pub external_id: String,
    /// `None` when the mapped username attribute is absent.
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub enabled: bool,
}

impl DirectoryEntry {
    /// Username with surrounding whitespace removed, `None` if absent or blank.
    pub fn username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(username: Option<&str>) -> DirectoryEntry {
        DirectoryEntry {
            external_id: "u1".into(),
            username: username.map(String::from),
            email: Some("a@x.com".into()),
            display_name: None,
            enabled: true,
        }
    }

    #[test]
    fn username_is_trimmed() {
        assert_eq!(entry(Some("  alice ")).username(), Some("alice"));
    }

    #[test]
    fn blank_username_counts_as_missing() {
        assert_eq!(entry(Some("   ")).username(), None);
        assert_eq!(entry(None).username(), None);
    }
}
