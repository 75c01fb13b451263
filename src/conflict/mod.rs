//! Divergence detection between a local and a remote replica.
//!
//! Three independent rules; any one firing makes the pair not
//! auto-mergeable:
//! 1. a mutable item present on both sides whose `last_updated` values are
//!    further apart than the clock-skew tolerance and whose content differs
//! 2. a critical preference defined on both sides with different values
//! 3. progression on both sides further apart than the level or XP gap
//!
//! Items within the tolerance are treated as the same version even when
//! their content differs; the merge then keeps the newer one.

use serde::{Deserialize, Serialize};

use crate::config::DivergencePolicy;
use crate::error::SyncResult;
use crate::merge::merge_records;
use crate::record::{content_eq, MutableCollection, UserRecord, Versioned, CRITICAL_PREFERENCES};

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Both replicas edited the same mutable item far apart in time
    MutableItem {
        collection: String,
        id: String,
        gap_ms: i64,
    },
    /// Replicas disagree on a critical preference
    CriticalPreference { key: String },
    /// Replicas are too far apart in progression
    Progression { level_gap: u32, xp_gap: u64 },
}

/// Result of comparing two replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Whether the pair can be merged without asking the user
    pub auto_mergeable: bool,
    /// The merged record, present only when auto-mergeable
    pub merged: Option<UserRecord>,
    /// Every rule that fired
    pub divergences: Vec<Divergence>,
}

/// Input of the JSON detection entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectInput {
    pub local: UserRecord,
    pub remote: UserRecord,
    #[serde(default)]
    pub policy: DivergencePolicy,
}

/// Applies the divergence rules under a configurable policy.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    policy: DivergencePolicy,
}

impl ConflictDetector {
    pub fn new(policy: DivergencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DivergencePolicy {
        &self.policy
    }

    /// Compare two replicas and merge them when no rule fires.
    pub fn detect(&self, local: &UserRecord, remote: &UserRecord) -> Detection {
        let mut divergences = Vec::new();

        self.check_mutable("goals", &local.goals, &remote.goals, &mut divergences);
        self.check_mutable("quests", &local.quests, &remote.quests, &mut divergences);
        self.check_preferences(local, remote, &mut divergences);
        self.check_progression(local, remote, &mut divergences);

        if divergences.is_empty() {
            Detection {
                auto_mergeable: true,
                merged: Some(merge_records(local, remote).record),
                divergences,
            }
        } else {
            Detection {
                auto_mergeable: false,
                merged: None,
                divergences,
            }
        }
    }

    fn check_mutable<T>(
        &self,
        collection: &str,
        local: &MutableCollection<T>,
        remote: &MutableCollection<T>,
        divergences: &mut Vec<Divergence>,
    ) where
        T: Versioned + Clone + PartialEq,
    {
        for local_item in local {
            let Some(remote_item) = remote.get(local_item.id()) else {
                continue;
            };

            let gap_ms = (local_item.last_updated() - remote_item.last_updated())
                .num_milliseconds()
                .abs();

            if gap_ms > self.policy.clock_skew_tolerance_ms && !content_eq(local_item, remote_item) {
                divergences.push(Divergence::MutableItem {
                    collection: collection.to_string(),
                    id: local_item.id().to_string(),
                    gap_ms,
                });
            }
        }
    }

    fn check_preferences(
        &self,
        local: &UserRecord,
        remote: &UserRecord,
        divergences: &mut Vec<Divergence>,
    ) {
        for preference in CRITICAL_PREFERENCES {
            if let (Some(l), Some(r)) = (
                preference.read(&local.preferences),
                preference.read(&remote.preferences),
            ) {
                if l != r {
                    divergences.push(Divergence::CriticalPreference {
                        key: preference.key().to_string(),
                    });
                }
            }
        }
    }

    fn check_progression(
        &self,
        local: &UserRecord,
        remote: &UserRecord,
        divergences: &mut Vec<Divergence>,
    ) {
        let (Some(l), Some(r)) = (&local.progression, &remote.progression) else {
            return;
        };

        let level_gap = l.level.abs_diff(r.level);
        let xp_gap = l.xp.abs_diff(r.xp);

        if level_gap > self.policy.max_level_gap || xp_gap > self.policy.max_xp_gap {
            divergences.push(Divergence::Progression { level_gap, xp_gap });
        }
    }
}

/// Detect with the default policy.
pub fn detect_conflicts(local: &UserRecord, remote: &UserRecord) -> Detection {
    ConflictDetector::default().detect(local, remote)
}

/// Detect from a JSON string input and return JSON string output.
/// Convenience function for FFI.
pub fn detect_conflicts_json(input_json: &str) -> SyncResult<String> {
    let input: DetectInput = serde_json::from_str(input_json)?;
    let detection = ConflictDetector::new(input.policy).detect(&input.local, &input.remote);
    Ok(serde_json::to_string(&detection)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{resolve, Strategy};
    use crate::record::{Achievement, Goal, Progression, QuestEntry};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 18, 0, 0).unwrap()
    }

    fn with_goal(goal: Goal) -> UserRecord {
        let mut record = UserRecord::new();
        record.goals.push(goal);
        record
    }

    fn gap_pair(gap: Duration) -> (UserRecord, UserRecord) {
        (
            with_goal(Goal::new("g1", "Local title", t0())),
            with_goal(Goal::new("g1", "Remote title", t0() + gap)),
        )
    }

    #[test]
    fn test_edit_gap_beyond_tolerance_needs_resolution() {
        let (local, remote) = gap_pair(Duration::seconds(90));
        let detection = detect_conflicts(&local, &remote);

        assert!(!detection.auto_mergeable);
        assert!(detection.merged.is_none());
        assert_eq!(
            detection.divergences,
            vec![Divergence::MutableItem {
                collection: "goals".to_string(),
                id: "g1".to_string(),
                gap_ms: 90_000,
            }]
        );
    }

    #[test]
    fn test_edit_gap_within_tolerance_merges_newer() {
        let (local, remote) = gap_pair(Duration::seconds(30));
        let detection = detect_conflicts(&local, &remote);

        assert!(detection.auto_mergeable);
        let merged = detection.merged.unwrap();
        assert_eq!(merged.goals.get("g1").unwrap().title, "Remote title");
    }

    #[test]
    fn test_tolerance_boundaries() {
        for (seconds, expect_mergeable) in [(59, true), (60, true), (61, false)] {
            let (local, remote) = gap_pair(Duration::seconds(seconds));
            assert_eq!(
                detect_conflicts(&local, &remote).auto_mergeable,
                expect_mergeable,
                "gap of {}s",
                seconds
            );
        }
    }

    #[test]
    fn test_large_gap_with_same_content_is_not_divergence() {
        let local = with_goal(Goal::new("g1", "Same", t0()));
        let remote = with_goal(Goal::new("g1", "Same", t0() + Duration::hours(5)));
        assert!(detect_conflicts(&local, &remote).auto_mergeable);
    }

    #[test]
    fn test_quest_divergence_is_detected() {
        let mut local = UserRecord::new();
        local.quests.push(QuestEntry::new("q1", "Walk", t0()));
        let mut remote = UserRecord::new();
        let mut edited = QuestEntry::new("q1", "Walk", t0() + Duration::minutes(10));
        edited.xp_reward = 20;
        remote.quests.push(edited);

        let detection = detect_conflicts(&local, &remote);
        assert!(matches!(
            detection.divergences.as_slice(),
            [Divergence::MutableItem { collection, .. }] if collection == "quests"
        ));
    }

    #[test]
    fn test_custom_tolerance() {
        let (local, remote) = gap_pair(Duration::seconds(90));
        let detector = ConflictDetector::new(DivergencePolicy {
            clock_skew_tolerance_ms: 120_000,
            ..DivergencePolicy::default()
        });
        assert!(detector.detect(&local, &remote).auto_mergeable);
    }

    #[test]
    fn test_critical_preference_divergence() {
        let mut local = UserRecord::new();
        local.preferences.use_quest_system = Some(true);
        let mut remote = UserRecord::new();
        remote.preferences.use_quest_system = Some(false);

        let detection = detect_conflicts(&local, &remote);
        assert_eq!(
            detection.divergences,
            vec![Divergence::CriticalPreference {
                key: "useQuestSystem".to_string()
            }]
        );
    }

    #[test]
    fn test_critical_preference_undefined_side_is_fine() {
        let mut local = UserRecord::new();
        local.preferences.onboarding_completed = Some(true);
        let remote = UserRecord::new();
        assert!(detect_conflicts(&local, &remote).auto_mergeable);
    }

    #[test]
    fn test_progression_level_gap() {
        let mut local = UserRecord::new();
        local.progression = Some(Progression::new(5, 800));
        let mut remote = UserRecord::new();
        remote.progression = Some(Progression::new(3, 100));

        let detection = detect_conflicts(&local, &remote);
        assert_eq!(
            detection.divergences,
            vec![Divergence::Progression {
                level_gap: 2,
                xp_gap: 700
            }]
        );

        let resolved = resolve(&local, &remote, Strategy::Merge);
        assert_eq!(resolved.progression, local.progression);
    }

    #[test]
    fn test_progression_boundaries() {
        let cases = [
            ((4, 100), (3, 100), true),
            ((5, 100), (3, 100), false),
            ((3, 600), (3, 100), true),
            ((3, 601), (3, 100), false),
        ];
        for ((ll, lx), (rl, rx), expect_mergeable) in cases {
            let mut local = UserRecord::new();
            local.progression = Some(Progression::new(ll, lx));
            let mut remote = UserRecord::new();
            remote.progression = Some(Progression::new(rl, rx));
            assert_eq!(
                detect_conflicts(&local, &remote).auto_mergeable,
                expect_mergeable,
                "local {:?} vs remote {:?}",
                (ll, lx),
                (rl, rx)
            );
        }
    }

    #[test]
    fn test_auto_merge_yields_no_foreign_items() {
        let mut local = with_goal(Goal::new("g1", "Local", t0()));
        local.achievements.insert(Achievement::earned("a1", t0()));
        let mut remote = with_goal(Goal::new("g1", "Remote", t0() + Duration::seconds(10)));
        remote.goals.push(Goal::new("g2", "Only remote", t0()));

        let detection = detect_conflicts(&local, &remote);
        assert!(detection.auto_mergeable);

        let merged = resolve(&local, &remote, Strategy::Merge);
        assert_eq!(detection.merged.as_ref(), Some(&merged));
        for goal in &merged.goals {
            let matches_local = local.goals.get(&goal.id) == Some(goal);
            let matches_remote = remote.goals.get(&goal.id) == Some(goal);
            assert!(matches_local || matches_remote, "goal {} differs from both inputs", goal.id);
        }
    }

    #[test]
    fn test_detect_conflicts_json() {
        let (local, remote) = gap_pair(Duration::seconds(90));
        let input = DetectInput {
            local,
            remote,
            policy: DivergencePolicy::default(),
        };

        let output_json = detect_conflicts_json(&serde_json::to_string(&input).unwrap()).unwrap();
        let detection: Detection = serde_json::from_str(&output_json).unwrap();

        assert!(!detection.auto_mergeable);
        assert_eq!(detection.divergences.len(), 1);
    }
}
