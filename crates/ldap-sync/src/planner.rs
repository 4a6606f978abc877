//! Reconciliation planning: diff a directory snapshot against local users.
//!
//! Planning is a pure function. It never touches the network or the store,
//! so the same inputs always produce the same plan.

use std::collections::{HashMap, HashSet};

use dirsync_core::models::directory::DirectoryEntry;
use dirsync_core::models::sync_log::LogLevel;
use dirsync_core::models::user::{LocalUserRecord, UserChanges};

/// A single change to apply to the local user store.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// A directory entry with no local counterpart.
    Create(DirectoryEntry),
    /// A local user whose directory entry changed. Carries only changed fields.
    Update {
        user: LocalUserRecord,
        changes: UserChanges,
    },
    /// A directory-sourced local user no longer present in the directory.
    Deactivate(LocalUserRecord),
}

impl SyncAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Deactivate(_) => "deactivate",
        }
    }

    /// Username the action applies to (the new one for renames).
    pub fn username(&self) -> &str {
        match self {
            Self::Create(entry) => entry.username().unwrap_or_default(),
            Self::Update { user, changes } => {
                changes.username.as_deref().unwrap_or(&user.username)
            }
            Self::Deactivate(user) => &user.username,
        }
    }

    pub fn external_id(&self) -> &str {
        match self {
            Self::Create(entry) => &entry.external_id,
            Self::Update { user, .. } | Self::Deactivate(user) => {
                user.external_id.as_deref().unwrap_or_default()
            }
        }
    }
}

/// Something the planner noticed about its input that belongs in the run log.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNote {
    pub level: LogLevel,
    pub message: String,
    pub external_id: Option<String>,
    pub username: Option<String>,
}

/// Ordered actions plus notes about skipped or duplicated entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub actions: Vec<SyncAction>,
    pub notes: Vec<PlanNote>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Compute the actions that bring the directory-sourced local users in line
/// with `entries`.
///
/// Creates and updates follow directory order; deactivations come last.
/// Users without an external id or not sourced from the directory are never
/// touched, and users that are already inactive are not deactivated again.
pub fn plan(entries: Vec<DirectoryEntry>, existing: &[LocalUserRecord]) -> Plan {
    let mut notes = Vec::new();

    // Entries skipped below still count as present: a user is only
    // deactivated when the directory no longer returns its external id.
    let present: HashSet<String> = entries
        .iter()
        .map(|e| e.external_id.trim())
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    let valid: Vec<DirectoryEntry> = entries
        .into_iter()
        .filter_map(|entry| match normalize(entry) {
            Ok(entry) => Some(entry),
            Err(note) => {
                notes.push(note);
                None
            }
        })
        .collect();

    // Last occurrence of each external id wins.
    let mut last_index: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in valid.iter().enumerate() {
        if let Some(previous) = last_index.insert(entry.external_id.as_str(), i) {
            notes.push(PlanNote {
                level: LogLevel::Warning,
                message: format!(
                    "duplicate external id {} in directory results; using the later entry ({} over {})",
                    entry.external_id,
                    entry.username().unwrap_or_default(),
                    valid[previous].username().unwrap_or_default(),
                ),
                external_id: Some(entry.external_id.clone()),
                username: entry.username().map(String::from),
            });
        }
    }

    let local: HashMap<&str, &LocalUserRecord> = existing
        .iter()
        .filter(|u| u.is_directory_sourced())
        .filter_map(|u| u.external_id.as_deref().map(|id| (id, u)))
        .collect();

    let mut actions = Vec::new();
    for (i, entry) in valid.iter().enumerate() {
        if last_index.get(entry.external_id.as_str()) != Some(&i) {
            continue;
        }
        match local.get(entry.external_id.as_str()) {
            None => actions.push(SyncAction::Create(entry.clone())),
            Some(user) => {
                let changes = diff(user, entry);
                if !changes.is_empty() {
                    actions.push(SyncAction::Update {
                        user: (*user).clone(),
                        changes,
                    });
                }
            }
        }
    }

    let mut departed: Vec<&LocalUserRecord> = local
        .values()
        .filter(|u| u.active)
        .filter(|u| {
            u.external_id
                .as_deref()
                .is_some_and(|id| !present.contains(id))
        })
        .copied()
        .collect();
    departed.sort_by_key(|u| u.id);
    actions.extend(departed.into_iter().cloned().map(SyncAction::Deactivate));

    Plan { actions, notes }
}

/// Trim identifiers and blank optional fields, rejecting entries that lack a
/// required attribute.
fn normalize(mut entry: DirectoryEntry) -> Result<DirectoryEntry, PlanNote> {
    entry.external_id = entry.external_id.trim().to_string();
    let username = entry.username().map(String::from);

    if entry.external_id.is_empty() {
        return Err(PlanNote {
            level: LogLevel::Error,
            message: match username {
                Some(ref u) => format!("directory entry for {u} has no external id; skipped"),
                None => "directory entry has no external id or username; skipped".to_string(),
            },
            external_id: None,
            username,
        });
    }
    let Some(username) = username else {
        return Err(PlanNote {
            level: LogLevel::Error,
            message: format!(
                "directory entry {} has no username; skipped",
                entry.external_id
            ),
            external_id: Some(entry.external_id),
            username: None,
        });
    };

    entry.username = Some(username);
    entry.email = non_blank(entry.email);
    entry.display_name = non_blank(entry.display_name);
    Ok(entry)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn diff(user: &LocalUserRecord, entry: &DirectoryEntry) -> UserChanges {
    let mut changes = UserChanges::default();
    if let Some(username) = entry.username() {
        if username != user.username {
            changes.username = Some(username.to_string());
        }
    }
    if entry.email != user.email {
        changes.email = Some(entry.email.clone());
    }
    if entry.display_name != user.display_name {
        changes.display_name = Some(entry.display_name.clone());
    }
    if entry.enabled != user.active {
        changes.active = Some(entry.enabled);
    }
    changes
}
