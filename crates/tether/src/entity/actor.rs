//! Actor construction and refresh reads.
//!
//! Construction of every newly registered actor shares one batch:
//!
//! | round | reads                                                          |
//! |-------|----------------------------------------------------------------|
//! | 0     | controller, health controller, movement, side, flags, text ptrs |
//! | 1     | both back-references, group / account / role texts             |
//!
//! Refresh is a single round: everything it needs hangs off addresses cached at
//! construction.

use crate::error::{Error, Result};
use crate::offset::ActorOffsets;
use crate::process::{Address, Pod, is_valid_pointer};
use crate::scatter::{ReadError, ScatterBatch, ScatterResults, Slot, TextLayout, TextSlot};

use super::model::{Entity, Faction, HealthStatus, KindPayload, Vector2, Vector3};

struct IdentitySlots {
    address: Address,
    controller: Slot<u64>,
    health_controller: Slot<u64>,
    movement: Slot<u64>,
    side: Slot<i32>,
    is_ai: Slot<bool>,
    group_ptr: Slot<u64>,
    account_ptr: Slot<u64>,
    role_ptr: Slot<u64>,
}

pub(crate) struct ConstructionSlots {
    identity: IdentitySlots,
    controller_back_ref: Slot<u64>,
    health_back_ref: Slot<u64>,
    group: TextSlot,
    account: TextSlot,
    role: TextSlot,
}

/// Queue round-0 reads for every address, then round-1 reads that depend on them.
pub(crate) fn plan_construction(
    batch: &mut ScatterBatch,
    addresses: &[Address],
    offsets: &ActorOffsets,
    text: TextLayout,
) -> Vec<ConstructionSlots> {
    let identities: Vec<IdentitySlots> = addresses
        .iter()
        .map(|&a| IdentitySlots {
            address: a,
            controller: batch.add(a.wrapping_add(offsets.controller)),
            health_controller: batch.add(a.wrapping_add(offsets.health_controller)),
            movement: batch.add(a.wrapping_add(offsets.movement)),
            side: batch.add(a.wrapping_add(offsets.side)),
            is_ai: batch.add(a.wrapping_add(offsets.is_ai)),
            group_ptr: batch.add(a.wrapping_add(offsets.group_id)),
            account_ptr: batch.add(a.wrapping_add(offsets.account_id)),
            role_ptr: batch.add(a.wrapping_add(offsets.role_name)),
        })
        .collect();

    batch.next_round();
    identities
        .into_iter()
        .map(|identity| ConstructionSlots {
            controller_back_ref: batch.add(identity.controller.at(offsets.controller_back_ref)),
            health_back_ref: batch.add(identity.health_controller.at(offsets.health_back_ref)),
            group: batch.add_text(identity.group_ptr.at(0), text),
            account: batch.add_text(identity.account_ptr.at(0), text),
            role: batch.add_text(identity.role_ptr.at(0), text),
            identity,
        })
        .collect()
}

fn value<T: Pod>(results: &ScatterResults, slot: Slot<T>, address: Address) -> Result<T> {
    results.get(slot).map_err(|e| e.into_error(address))
}

fn optional_text(results: &ScatterResults, slot: TextSlot) -> Option<String> {
    results.text(slot).ok().filter(|t| !t.is_empty())
}

fn check_back_ref(address: Address, found: u64) -> Result<()> {
    if found != address {
        return Err(Error::BackReferenceMismatch { address, found });
    }
    Ok(())
}

impl ConstructionSlots {
    pub(crate) fn address(&self) -> Address {
        self.identity.address
    }

    /// Validate and assemble the entity. `local_actor` decides the Local kind.
    pub(crate) fn finish(
        &self,
        results: &ScatterResults,
        local_actor: Option<Address>,
        cycle: u64,
    ) -> Result<Entity> {
        let id = &self.identity;
        let a = id.address;
        let controller = value(results, id.controller, a)?;
        check_back_ref(a, value(results, self.controller_back_ref, a)?)?;
        let health_controller = value(results, id.health_controller, a)?;
        check_back_ref(a, value(results, self.health_back_ref, a)?)?;

        let faction = Faction::try_from(value(results, id.side, a)?)?;
        let movement = value(results, id.movement, a)?;
        if !is_valid_pointer(movement) {
            return Err(Error::InvalidPointer(movement));
        }

        let group = optional_text(results, self.group);
        let payload = if local_actor == Some(a) {
            KindPayload::Local { group }
        } else if value(results, id.is_ai, a)? {
            KindPayload::Simulated {
                role: optional_text(results, self.role),
            }
        } else {
            let account_id = results.text(self.account).map_err(|e| match e {
                ReadError::NullAddress | ReadError::Dependency(_) => {
                    Error::Decode("remote actor has no account id".into())
                }
                other => other.into_error(a),
            })?;
            KindPayload::RemoteControlled { account_id, group }
        };

        Ok(Entity {
            address: a,
            payload,
            faction,
            controller,
            health_controller,
            movement,
            health: HealthStatus::Healthy,
            position: Vector3::default(),
            rotation: Vector2::default(),
            alive: true,
            fresh: false,
            first_seen: cycle,
        })
    }
}

pub(crate) struct RefreshSlots {
    controller_back_ref: Slot<u64>,
    health_tags: Slot<i32>,
    corpse: Slot<u64>,
    position: Slot<Vector3>,
    rotation: Slot<Vector2>,
}

pub(crate) fn plan_refresh(
    batch: &mut ScatterBatch,
    entity: &Entity,
    offsets: &ActorOffsets,
) -> RefreshSlots {
    RefreshSlots {
        controller_back_ref: batch.add(entity.controller.wrapping_add(offsets.controller_back_ref)),
        health_tags: batch.add(entity.health_controller.wrapping_add(offsets.health_status)),
        corpse: batch.add(entity.address.wrapping_add(offsets.corpse)),
        position: batch.add(entity.movement.wrapping_add(offsets.position)),
        rotation: batch.add(entity.movement.wrapping_add(offsets.rotation)),
    }
}

impl RefreshSlots {
    /// Write fresh state into `entity`. A back-reference mismatch means the address
    /// now belongs to a different object.
    pub(crate) fn apply(&self, results: &ScatterResults, entity: &mut Entity) -> Result<()> {
        let a = entity.address;
        check_back_ref(a, value(results, self.controller_back_ref, a)?)?;

        let tags: i32 = value(results, self.health_tags, a)?;
        let corpse: u64 = value(results, self.corpse, a)?;
        let position = value(results, self.position, a)?;
        let rotation = value(results, self.rotation, a)?;

        entity.health = HealthStatus::from_tags(tags);
        entity.alive = corpse == 0;
        entity.position = position;
        entity.rotation = rotation;
        entity.fresh = true;
        Ok(())
    }
}
