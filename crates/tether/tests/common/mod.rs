//! Scripted target world shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tether::process::mock::{MockMemoryBuilder, MockProcess};
use tether::{Address, OffsetTable, SessionContext};

pub const MODULE_BASE: Address = 0x40_0000;
pub const WORLD: Address = 0x50_0000;
const LIST: Address = 0x51_0000;
const ITEMS: Address = 0x52_0000;

pub fn offsets() -> OffsetTable {
    let mut table = OffsetTable::template();
    table.modules = vec!["engine.dll".into()];
    table.world.root_chain = vec![0x100];
    table.quests = None;
    table
}

pub fn shared_offsets() -> Arc<OffsetTable> {
    Arc::new(offsets())
}

/// Process with the engine module loaded and no session yet.
pub fn target() -> MockProcess {
    MockMemoryBuilder::new()
        .module("engine.dll", MODULE_BASE)
        .write_u64(MODULE_BASE + 0x100, 0)
        .build()
}

/// Point the root chain at the world and give it an empty registration list.
pub fn start_session(mock: &MockProcess) {
    let table = offsets();
    mock.set_u64(WORLD + table.world.registered_actors, LIST);
    mock.set_u64(WORLD + table.world.local_actor, 0);
    set_registration(mock, &[]);
    mock.set_u64(MODULE_BASE + 0x100, WORLD);
}

pub fn set_local_actor(mock: &MockProcess, actor: Address) {
    mock.set_u64(WORLD + offsets().world.local_actor, actor);
}

pub fn end_session(mock: &MockProcess) {
    mock.set_u64(MODULE_BASE + 0x100, 0);
}

pub fn context() -> SessionContext {
    SessionContext {
        session_id: 1,
        world: WORLD,
        local_actor: None,
        started_at: chrono::Utc::now(),
    }
}

pub fn set_registration(mock: &MockProcess, actors: &[Address]) {
    mock.set_u64(LIST + 0x10, ITEMS);
    mock.set_i32(LIST + 0x18, actors.len() as i32);
    for (i, actor) in actors.iter().enumerate() {
        mock.set_u64(ITEMS + 0x20 + i as u64 * 8, *actor);
    }
}

pub fn controller_of(actor: Address) -> Address {
    0x100_0000 + actor
}

pub fn health_of(actor: Address) -> Address {
    0x200_0000 + actor
}

pub fn movement_of(actor: Address) -> Address {
    0x300_0000 + actor
}

/// A simulated actor whose back-references point at `actor`.
pub fn spawn_actor(mock: &MockProcess, actor: Address) {
    let a = offsets().actor;
    let (controller, health, movement) =
        (controller_of(actor), health_of(actor), movement_of(actor));

    mock.set_u64(actor + a.controller, controller);
    mock.set_u64(controller + a.controller_back_ref, actor);
    mock.set_u64(actor + a.health_controller, health);
    mock.set_u64(health + a.health_back_ref, actor);
    mock.set_i32(health + a.health_status, 0x400);
    mock.set_u64(actor + a.movement, movement);
    mock.set_i32(actor + a.side, 4);
    mock.set_value(actor + a.is_ai, true);
    mock.set_u64(actor + a.role_name, actor + 0x800);
    mock.set_utf16_string(actor + 0x800, "scav");
    mock.set_u64(actor + a.corpse, 0);
    mock.set_f32(movement + a.position, actor as f32);
}

/// Make the controller back-reference point at another object.
pub fn recycle_actor(mock: &MockProcess, actor: Address) {
    let a = offsets().actor;
    mock.set_u64(controller_of(actor) + a.controller_back_ref, 0xDEAD_0000);
}
