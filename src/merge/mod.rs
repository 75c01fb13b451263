//! Conflict resolution: take-local, take-remote, or field-wise merge.
//!
//! Merge rules per part of the record:
//! - additive collections: union by id, each id kept once; remote is
//!   iterated first so remote content wins when both sides hold the id
//! - mutable collections: union by id; for shared ids the version with the
//!   strictly greater `last_updated` wins, remote on a tie
//! - preferences: local wins for user-tunable fields; onboarding and quest
//!   mode flags are monotonic (`true` beats `false` beats unset)
//! - progression: higher level wins, then higher XP, remote on a full tie
//! - remaining singular fields (privacy, write markers) follow remote

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::SyncResult;
use crate::record::{
    AdditiveCollection, Identified, MutableCollection, Preferences, Progression, UserRecord,
    Versioned,
};

/// How to reconcile a local and a remote replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keep the local replica verbatim
    Local,
    /// Keep the remote replica verbatim
    #[serde(alias = "cloud")]
    Remote,
    /// Field-wise merge of both replicas
    #[default]
    Merge,
}

/// Statistics about what was merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Items taken from the local replica (local-only, or newer local version)
    pub items_from_local: u32,
    /// Items taken from the remote replica
    pub items_from_remote: u32,
    /// Items only present locally (created offline)
    pub items_created_locally: u32,
    /// Mutable items present on both sides with different versions
    pub conflicts: u32,
}

/// Output of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutput {
    pub record: UserRecord,
    pub stats: MergeStats,
}

/// Input of the JSON resolution entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveInput {
    pub local: UserRecord,
    pub remote: UserRecord,
    #[serde(default)]
    pub strategy: Strategy,
}

/// Output of the JSON resolution entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutput {
    pub success: bool,
    pub record: UserRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<MergeStats>,
}

/// Main entry point: reconcile two replicas with the chosen strategy.
pub fn resolve(local: &UserRecord, remote: &UserRecord, strategy: Strategy) -> UserRecord {
    match strategy {
        Strategy::Local => local.clone(),
        Strategy::Remote => remote.clone(),
        Strategy::Merge => merge_records(local, remote).record,
    }
}

/// Resolve a structured input, reporting merge statistics for `merge`.
pub fn resolve_conflict(input: ResolveInput) -> ResolveOutput {
    match input.strategy {
        Strategy::Merge => {
            let merged = merge_records(&input.local, &input.remote);
            ResolveOutput {
                success: true,
                record: merged.record,
                stats: Some(merged.stats),
            }
        }
        strategy => ResolveOutput {
            success: true,
            record: resolve(&input.local, &input.remote, strategy),
            stats: None,
        },
    }
}

/// Resolve a JSON string input and return JSON string output.
/// Convenience function for FFI.
pub fn resolve_conflict_json(input_json: &str) -> SyncResult<String> {
    let input: ResolveInput = serde_json::from_str(input_json)?;
    Ok(serde_json::to_string(&resolve_conflict(input))?)
}

/// Field-wise merge of two replicas.
pub fn merge_records(local: &UserRecord, remote: &UserRecord) -> MergeOutput {
    let mut stats = MergeStats::default();

    let record = UserRecord {
        goals: merge_mutable(&local.goals, &remote.goals, &mut stats),
        quests: merge_mutable(&local.quests, &remote.quests, &mut stats),
        completed_goals: merge_additive(&local.completed_goals, &remote.completed_goals, &mut stats),
        recovery_trackers: merge_additive(
            &local.recovery_trackers,
            &remote.recovery_trackers,
            &mut stats,
        ),
        achievements: merge_additive(&local.achievements, &remote.achievements, &mut stats),
        quest_history: merge_additive(&local.quest_history, &remote.quest_history, &mut stats),
        preferences: merge_preferences(&local.preferences, &remote.preferences),
        progression: merge_progression(local.progression.as_ref(), remote.progression.as_ref()),
        privacy: remote.privacy.clone().or_else(|| local.privacy.clone()),
        last_modified: remote.last_modified,
        device_id: remote.device_id.clone(),
    };

    MergeOutput { record, stats }
}

/// Union by id. Remote first, then local-only items in local order.
pub fn merge_additive<T>(
    local: &AdditiveCollection<T>,
    remote: &AdditiveCollection<T>,
    stats: &mut MergeStats,
) -> AdditiveCollection<T>
where
    T: Identified + Clone,
{
    let mut merged = AdditiveCollection::new();

    for item in remote {
        if merged.insert(item.clone()) {
            stats.items_from_remote += 1;
        }
    }

    for item in local {
        if merged.insert(item.clone()) {
            stats.items_from_local += 1;
            stats.items_created_locally += 1;
        }
    }

    merged
}

/// Union by id, newest `last_updated` wins for shared ids.
pub fn merge_mutable<T>(
    local: &MutableCollection<T>,
    remote: &MutableCollection<T>,
    stats: &mut MergeStats,
) -> MutableCollection<T>
where
    T: Versioned + Clone + PartialEq,
{
    let mut merged = MutableCollection::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for remote_item in remote {
        if !seen.insert(remote_item.id()) {
            continue;
        }

        match local.get(remote_item.id()) {
            Some(local_item) => {
                if local_item != remote_item {
                    stats.conflicts += 1;
                }
                if local_item.last_updated() > remote_item.last_updated() {
                    stats.items_from_local += 1;
                    merged.push(local_item.clone());
                } else {
                    stats.items_from_remote += 1;
                    merged.push(remote_item.clone());
                }
            }
            None => {
                stats.items_from_remote += 1;
                merged.push(remote_item.clone());
            }
        }
    }

    for local_item in local {
        if seen.insert(local_item.id()) {
            stats.items_from_local += 1;
            stats.items_created_locally += 1;
            merged.push(local_item.clone());
        }
    }

    merged
}

/// Shallow merge: local wins for user-tunable fields, monotonic flags
/// resolve toward their completed/defined state.
pub fn merge_preferences(local: &Preferences, remote: &Preferences) -> Preferences {
    let mut extra = remote.extra.clone();
    for (key, value) in &local.extra {
        extra.insert(key.clone(), value.clone());
    }

    Preferences {
        theme: local.theme.or(remote.theme),
        notifications: local.notifications.or(remote.notifications),
        reminder_time: local
            .reminder_time
            .clone()
            .or_else(|| remote.reminder_time.clone()),
        onboarding_completed: monotonic_flag(local.onboarding_completed, remote.onboarding_completed),
        use_quest_system: monotonic_flag(local.use_quest_system, remote.use_quest_system),
        extra,
    }
}

/// `true` on either side dominates, then any defined value, then unset.
fn monotonic_flag(local: Option<bool>, remote: Option<bool>) -> Option<bool> {
    match (local, remote) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), _) | (_, Some(false)) => Some(false),
        (None, None) => None,
    }
}

/// The more advanced progression wins: higher level, then higher XP.
pub fn merge_progression(
    local: Option<&Progression>,
    remote: Option<&Progression>,
) -> Option<Progression> {
    match (local, remote) {
        (None, None) => None,
        (Some(l), None) => Some(l.clone()),
        (None, Some(r)) => Some(r.clone()),
        (Some(l), Some(r)) => {
            if (l.level, l.xp) > (r.level, r.xp) {
                Some(l.clone())
            } else {
                Some(r.clone())
            }
        }
    }
}
