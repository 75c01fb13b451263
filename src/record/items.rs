//! Items stored in the record's collections.
//!
//! Every item keeps fields it does not know about in `extra`, so a record
//! written by a newer client survives a round trip through an older one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::collections::{Identified, Versioned};
use crate::codec::wire_time;

/// An active goal. Mutable: edited in place by its owning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_days: Option<u32>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default, with = "wire_time::vec")]
    pub completed_dates: Vec<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "wire_time::epoch", with = "wire_time")]
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Goal {
    pub fn new(id: impl Into<String>, title: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            target_days: None,
            current_streak: 0,
            completed_dates: Vec::new(),
            is_active: true,
            last_updated,
            extra: Map::new(),
        }
    }
}

/// Lifecycle of a daily quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Skipped,
}

/// A quest entry. Mutable while assigned; copies also land in quest history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub status: QuestStatus,
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub date_assigned: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<DateTime<Utc>>,
    #[serde(default = "wire_time::epoch", with = "wire_time")]
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>, assigned: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            template_id: None,
            title: title.into(),
            category: None,
            difficulty: None,
            xp_reward: 0,
            status: QuestStatus::Active,
            date_assigned: Some(assigned),
            date_completed: None,
            last_updated: assigned,
            extra: Map::new(),
        }
    }
}

/// History entry of a goal reaching its target. Additive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedGoal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, with = "wire_time::vec")]
    pub completion_dates: Vec<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletedGoal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            completion_dates: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// A recovery tracker (abstinence counter). Additive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryTracker {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecoveryTracker {
    pub fn new(id: impl Into<String>, name: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            start_date: Some(start_date),
            extra: Map::new(),
        }
    }
}

/// An earned achievement. Additive: never retracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Achievement {
    pub fn earned(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            earned_at: Some(at),
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

macro_rules! impl_identified {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Identified for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

impl_identified!(Goal, QuestEntry, CompletedGoal, RecoveryTracker, Achievement);

impl Versioned for Goal {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, at: DateTime<Utc>) {
        self.last_updated = at;
    }
}

impl Versioned for QuestEntry {
    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn set_last_updated(&mut self, at: DateTime<Utc>) {
        self.last_updated = at;
    }
}
