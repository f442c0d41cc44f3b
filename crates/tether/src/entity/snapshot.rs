use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::process::Address;

use super::model::Entity;
use super::quest::QuestRecord;

/// Immutable view of the entity set after one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySnapshot {
    pub cycle: u64,
    pub captured_at: DateTime<Utc>,
    /// Entities in first-seen order
    pub entities: Vec<Entity>,
    pub quests: Vec<QuestRecord>,
}

impl EntitySnapshot {
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            captured_at: Utc::now(),
            entities: Vec::new(),
            quests: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, address: Address) -> Option<&Entity> {
        self.entities.iter().find(|e| e.address == address)
    }

    pub fn local(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| e.is_local())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }
}

impl Default for EntitySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Latest published snapshot, shared between the worker and readers.
///
/// The lock only guards swapping the `Arc`; readers never see live state.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: Mutex<Arc<EntitySnapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<EntitySnapshot> {
        match self.current.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn store(&self, snapshot: Arc<EntitySnapshot>) {
        match self.current.lock() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}
