//! The user record: the unit of synchronization.
//!
//! A record is created locally on first use, mutated continuously by the
//! user, and exchanged with the remote replica only through the orchestrator.
//! Nothing in this crate deletes a record or an additive item.

mod collections;
mod items;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::wire_time;

pub use collections::{content_eq, AdditiveCollection, Identified, MutableCollection, Versioned};
pub use items::{Achievement, CompletedGoal, Goal, QuestEntry, QuestStatus, RecoveryTracker};

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

/// User preferences. Every field is optional so that "never set" is
/// distinguishable from an explicit value during merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_quest_system: Option<bool>,
    /// Preference keys this version does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Preferences {
    /// Preferences of a freshly created record.
    pub fn initial() -> Self {
        Self {
            theme: Some(Theme::System),
            notifications: Some(true),
            ..Self::default()
        }
    }
}

/// Boolean preferences that change what the user sees (quest mode vs goal
/// mode, onboarding flow). Replicas disagreeing on them cannot be merged
/// unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalPreference {
    QuestMode,
    OnboardingCompleted,
}

impl CriticalPreference {
    /// Wire name of the preference key.
    pub const fn key(self) -> &'static str {
        match self {
            CriticalPreference::QuestMode => "useQuestSystem",
            CriticalPreference::OnboardingCompleted => "onboardingCompleted",
        }
    }

    pub fn read(self, preferences: &Preferences) -> Option<bool> {
        match self {
            CriticalPreference::QuestMode => preferences.use_quest_system,
            CriticalPreference::OnboardingCompleted => preferences.onboarding_completed,
        }
    }
}

/// All preferences checked by conflict detection.
pub static CRITICAL_PREFERENCES: &[CriticalPreference] = &[
    CriticalPreference::QuestMode,
    CriticalPreference::OnboardingCompleted,
];

/// Gamified progression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub last_quest_generation: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Progression {
    pub fn new(level: u32, xp: u64) -> Self {
        Self {
            level,
            xp,
            ..Self::default()
        }
    }
}

/// Profile visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Sharing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub show_goals: bool,
    pub show_recoveries: bool,
    pub profile_visibility: Visibility,
}

/// The full synchronizable state of one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub goals: MutableCollection<Goal>,
    #[serde(default, alias = "currentQuests")]
    pub quests: MutableCollection<QuestEntry>,
    #[serde(default)]
    pub completed_goals: AdditiveCollection<CompletedGoal>,
    #[serde(default, alias = "addictions")]
    pub recovery_trackers: AdditiveCollection<RecoveryTracker>,
    #[serde(default)]
    pub achievements: AdditiveCollection<Achievement>,
    #[serde(default)]
    pub quest_history: AdditiveCollection<QuestEntry>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<Progression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<PrivacySettings>,
    /// Server-assigned write marker, never used for conflict decisions
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Identity of the device that last wrote the remote copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl UserRecord {
    /// A fresh record: empty collections, initial preferences.
    pub fn new() -> Self {
        Self {
            preferences: Preferences::initial(),
            ..Self::default()
        }
    }

    /// Create or edit an active goal, stamping `last_updated`.
    pub fn upsert_goal(&mut self, goal: Goal) {
        self.goals.upsert(goal, Utc::now());
    }

    /// Create or edit a quest entry, stamping `last_updated`.
    pub fn upsert_quest(&mut self, quest: QuestEntry) {
        self.quests.upsert(quest, Utc::now());
    }

    /// Returns false if the achievement was already earned.
    pub fn add_achievement(&mut self, achievement: Achievement) -> bool {
        self.achievements.insert(achievement)
    }

    pub fn add_completed_goal(&mut self, completed: CompletedGoal) -> bool {
        self.completed_goals.insert(completed)
    }

    pub fn add_recovery_tracker(&mut self, tracker: RecoveryTracker) -> bool {
        self.recovery_trackers.insert(tracker)
    }

    /// Archive a finished quest into history.
    pub fn archive_quest(&mut self, quest: QuestEntry) -> bool {
        self.quest_history.insert(quest)
    }

    /// Copy of the record without the remote write markers.
    pub fn without_write_markers(&self) -> Self {
        Self {
            last_modified: None,
            device_id: None,
            ..self.clone()
        }
    }
}
