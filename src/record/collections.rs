//! Typed containers for the two kinds of synchronized collections.
//!
//! Additive collections only ever grow: once an item exists on any replica it
//! survives every merge. Mutable collections hold items that are rewritten in
//! place and carry a `last_updated` marker deciding which version wins.
//! Identity is always the item's `id`, never its position or its content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An item with a stable identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

/// An item rewritten in place by its owning device.
pub trait Versioned: Identified {
    fn last_updated(&self) -> DateTime<Utc>;

    fn set_last_updated(&mut self, at: DateTime<Utc>);
}

/// True when two versions of an item differ at most in `last_updated`.
pub fn content_eq<T>(a: &T, b: &T) -> bool
where
    T: Versioned + Clone + PartialEq,
{
    let mut normalized = a.clone();
    normalized.set_last_updated(b.last_updated());
    normalized == *b
}

/// Append-mostly sequence of items unique by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditiveCollection<T>(Vec<T>);

/// Sequence of items unique by id, each carrying a `last_updated` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutableCollection<T>(Vec<T>);

impl<T> Default for AdditiveCollection<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Default for MutableCollection<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Identified> AdditiveCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item unless one with the same id is already present.
    /// Returns whether the item was added.
    pub fn insert(&mut self, item: T) -> bool {
        if self.contains(item.id()) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.0.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<T: Versioned> MutableCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append without touching `last_updated`. Used when rebuilding a
    /// collection from existing versions (decode, merge).
    pub fn push(&mut self, item: T) {
        match self.position(item.id()) {
            Some(index) => self.0[index] = item,
            None => self.0.push(item),
        }
    }

    /// Record a local mutation: stamp `last_updated` and replace the item
    /// with the same id, or append it.
    pub fn upsert(&mut self, mut item: T, now: DateTime<Utc>) {
        item.set_last_updated(now);
        self.push(item);
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.0.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.0.iter().position(|item| item.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<T: Identified> FromIterator<T> for AdditiveCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Self::new();
        for item in iter {
            collection.insert(item);
        }
        collection
    }
}

impl<T: Versioned> FromIterator<T> for MutableCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Self::new();
        for item in iter {
            collection.push(item);
        }
        collection
    }
}

impl<'a, T> IntoIterator for &'a AdditiveCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'a, T> IntoIterator for &'a MutableCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Achievement, Goal};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_additive_insert_refuses_duplicate_id() {
        let mut achievements = AdditiveCollection::new();
        assert!(achievements.insert(Achievement::earned("a1", t0())));
        assert!(!achievements.insert(Achievement::earned("a1", t0() + Duration::days(1))));
        assert_eq!(achievements.len(), 1);
        assert_eq!(achievements.get("a1").unwrap().earned_at, Some(t0()));
    }

    #[test]
    fn test_mutable_upsert_stamps_and_replaces() {
        let mut goals = MutableCollection::new();
        goals.push(Goal::new("g1", "Read", t0()));

        let later = t0() + Duration::hours(2);
        let mut edited = goals.get("g1").unwrap().clone();
        edited.title = "Read more".to_string();
        goals.upsert(edited, later);

        assert_eq!(goals.len(), 1);
        assert_eq!(goals.get("g1").unwrap().title, "Read more");
        assert_eq!(goals.get("g1").unwrap().last_updated, later);
    }

    #[test]
    fn test_content_eq_ignores_timestamp_only() {
        let a = Goal::new("g1", "Read", t0());
        let b = Goal::new("g1", "Read", t0() + Duration::minutes(5));
        let c = Goal::new("g1", "Write", t0());

        assert!(content_eq(&a, &b));
        assert!(!content_eq(&a, &c));
    }

    #[test]
    fn test_decoding_dedups_by_id_on_collect() {
        let goals: MutableCollection<Goal> = vec![
            Goal::new("g1", "first", t0()),
            Goal::new("g1", "second", t0()),
        ]
        .into_iter()
        .collect();
        assert_eq!(goals.len(), 1);
    }
}
