//! Typed entities reconstructed from remote memory.
//!
//! [`EntityResolver`] owns the canonical set. Each cycle it diffs the registration
//! list through a [`RegistrationTracker`], constructs new actors with back-reference
//! validation, refreshes the rest and publishes an immutable [`EntitySnapshot`].

mod actor;
mod model;
mod quest;
mod registry;
mod resolver;
mod snapshot;

pub use model::{Entity, EntityKind, Faction, HealthStatus, KindPayload, Vector2, Vector3};
pub use quest::{QuestLog, QuestRecord, QuestStatus};
pub use registry::{RegistrationDiff, RegistrationTracker};
pub use resolver::{CycleReport, EntityResolver};
pub use snapshot::{EntitySnapshot, SnapshotCell};
