use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One user waiting for a turn on stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: String,
    pub display_name: String,
    pub position: u32,
    #[serde(default)]
    pub invited: bool,
}

impl QueueEntry {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, position: u32) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            position,
            invited: false,
        }
    }
}

/// Merge an incoming queue snapshot with the current one.
///
/// Entries are deduplicated by user id (lowest position wins), an invite
/// already granted is never revoked by a later snapshot, users already on
/// stage are dropped, and positions are re-ranked to `1..=n`.
pub(crate) fn merge_queue(
    current: &[QueueEntry],
    incoming: Vec<QueueEntry>,
    on_stage: impl Fn(&str) -> bool,
) -> Vec<QueueEntry> {
    let invited_before: HashMap<&str, bool> = current
        .iter()
        .map(|e| (e.user_id.as_str(), e.invited))
        .collect();

    let mut sorted = incoming;
    sorted.sort_by_key(|e| e.position);

    let mut merged: Vec<QueueEntry> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        if on_stage(&entry.user_id) {
            continue;
        }
        if let Some(existing) = merged.iter_mut().find(|e| e.user_id == entry.user_id) {
            existing.invited |= entry.invited;
            continue;
        }
        let sticky = invited_before
            .get(entry.user_id.as_str())
            .copied()
            .unwrap_or(false);
        merged.push(QueueEntry {
            invited: entry.invited || sticky,
            ..entry
        });
    }

    for (rank, entry) in merged.iter_mut().enumerate() {
        entry.position = rank as u32 + 1;
    }
    merged
}
