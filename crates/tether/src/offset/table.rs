//! Offset table: the fixed memory layout of the target build.
//!
//! Loaded once at startup and treated as immutable. Nothing in the crate infers
//! offsets; a table that does not match the running build simply makes every
//! construction fail back-reference validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scatter::{ListLayout, MapLayout, TextLayout};

/// Where the world object lives and what hangs off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldOffsets {
    /// Module whose base address starts the root chain
    pub module: String,
    /// `module_base + chain[0] -> + chain[1] -> ...` ends at the world object
    pub root_chain: Vec<u64>,
    /// World field holding the registration list pointer
    pub registered_actors: u64,
    /// Shape of the registration list
    #[serde(default)]
    pub registration: ListLayout,
    /// World field holding the local actor pointer
    pub local_actor: u64,
}

/// Actor object fields. All offsets are relative to the object named in the comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActorOffsets {
    /// actor -> controller pointer
    pub controller: u64,
    /// controller -> actor back-reference
    pub controller_back_ref: u64,
    /// actor -> health controller pointer
    pub health_controller: u64,
    /// health controller -> actor back-reference
    pub health_back_ref: u64,
    /// health controller -> status tag bits (i32)
    pub health_status: u64,
    /// actor -> faction (i32)
    pub side: u64,
    /// actor -> simulated flag (u8)
    pub is_ai: u64,
    /// actor -> group id text pointer
    pub group_id: u64,
    /// actor -> account id text pointer
    pub account_id: u64,
    /// actor -> role name text pointer
    pub role_name: u64,
    /// actor -> movement component pointer
    pub movement: u64,
    /// movement -> position (3 x f32)
    pub position: u64,
    /// movement -> rotation (2 x f32)
    pub rotation: u64,
    /// actor -> corpse pointer, non-null once dead
    pub corpse: u64,
}

/// Quest records reachable from the local actor's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestOffsets {
    /// local actor -> profile pointer
    pub profile: u64,
    /// profile -> quest list pointer
    pub quests: u64,
    #[serde(default)]
    pub quest_list: ListLayout,
    /// quest -> id text pointer
    pub quest_id: u64,
    /// quest -> status (i32)
    pub quest_status: u64,
    /// quest -> completed-condition set pointer
    pub completed_conditions: u64,
    #[serde(default = "default_condition_set")]
    pub condition_set: MapLayout,
}

fn default_condition_set() -> MapLayout {
    MapLayout::hash_set(8)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTable {
    pub version: String,
    pub process_name: String,
    /// Modules that must be loaded before a session can start
    pub modules: Vec<String>,
    pub world: WorldOffsets,
    pub actor: ActorOffsets,
    #[serde(default)]
    pub quests: Option<QuestOffsets>,
    #[serde(default)]
    pub text: TextLayout,
}

impl OffsetTable {
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<()> {
        if self.process_name.is_empty() {
            return Err(Error::InvalidOffsets("process_name is empty".into()));
        }
        if self.modules.is_empty() {
            return Err(Error::InvalidOffsets("no required modules".into()));
        }
        if !self
            .modules
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&self.world.module))
        {
            return Err(Error::InvalidOffsets(format!(
                "world module {} is not a required module",
                self.world.module
            )));
        }
        if self.world.root_chain.is_empty() {
            return Err(Error::InvalidOffsets("world root chain is empty".into()));
        }

        let required = [
            ("world.registered_actors", self.world.registered_actors),
            ("world.local_actor", self.world.local_actor),
            ("actor.controller", self.actor.controller),
            ("actor.health_controller", self.actor.health_controller),
            ("actor.movement", self.actor.movement),
        ];
        if let Some((name, _)) = required.iter().find(|(_, offset)| *offset == 0) {
            return Err(Error::InvalidOffsets(format!("{name} is zero")));
        }
        Ok(())
    }

    /// Example table with every field filled, for `offsets --init`.
    pub fn template() -> Self {
        Self {
            version: "0.0.0".to_string(),
            process_name: "target.exe".to_string(),
            modules: vec!["engine.dll".to_string(), "runtime.dll".to_string()],
            world: WorldOffsets {
                module: "engine.dll".to_string(),
                root_chain: vec![0x17F_FD28, 0x30, 0x18, 0x28],
                registered_actors: 0xF0,
                registration: ListLayout::list(),
                local_actor: 0x148,
            },
            actor: ActorOffsets {
                controller: 0x18,
                controller_back_ref: 0x100,
                health_controller: 0x580,
                health_back_ref: 0x98,
                health_status: 0xD8,
                side: 0x60,
                is_ai: 0x88,
                group_id: 0x28,
                account_id: 0x30,
                role_name: 0x48,
                movement: 0x40,
                position: 0x10,
                rotation: 0x20,
                corpse: 0x3D0,
            },
            quests: Some(QuestOffsets {
                profile: 0x8A8,
                quests: 0x28,
                quest_list: ListLayout::list(),
                quest_id: 0x10,
                quest_status: 0x1C,
                completed_conditions: 0x20,
                condition_set: default_condition_set(),
            }),
            text: TextLayout::default(),
        }
    }
}

pub fn load_offsets<P: AsRef<Path>>(path: P) -> Result<OffsetTable> {
    let content = fs::read_to_string(&path)?;
    let table = serde_json::from_str(&content)?;
    Ok(table)
}

pub fn save_offsets<P: AsRef<Path>>(path: P, table: &OffsetTable) -> Result<()> {
    let content = serde_json::to_string_pretty(table)?;
    fs::write(path, content)?;
    Ok(())
}
