use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

use crate::error::{Error, Result};
use crate::process::layout::health;
use crate::process::{Address, Pod};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn distance(&self, other: &Vector3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Pod for Vector2 {
    const SIZE: usize = 8;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            x: f32::from_le_slice(bytes.get(0..4)?)?,
            y: f32::from_le_slice(bytes.get(4..8)?)?,
        })
    }

    fn to_le_vec(self) -> Vec<u8> {
        [self.x, self.y].iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

impl Pod for Vector3 {
    const SIZE: usize = 12;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            x: f32::from_le_slice(bytes.get(0..4)?)?,
            y: f32::from_le_slice(bytes.get(4..8)?)?,
            z: f32::from_le_slice(bytes.get(8..12)?)?,
        })
    }

    fn to_le_vec(self) -> Vec<u8> {
        [self.x, self.y, self.z]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

/// Team an actor belongs to. Any other raw value means the object is not an actor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRepr, IntoStaticStr, Display,
)]
#[repr(i32)]
pub enum Faction {
    Blue = 1,
    Red = 2,
    Wild = 4,
}

impl TryFrom<i32> for Faction {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        Self::from_repr(value).ok_or(Error::InvalidEnumValue {
            type_name: "Faction",
            value: i64::from(value),
        })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    IntoStaticStr,
    Display,
)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Injured,
    BadlyInjured,
    Dying,
}

impl HealthStatus {
    /// The most severe status whose tag bit is set.
    pub fn from_tags(tags: i32) -> Self {
        if tags & health::DYING != 0 {
            HealthStatus::Dying
        } else if tags & health::BADLY_INJURED != 0 {
            HealthStatus::BadlyInjured
        } else if tags & health::INJURED != 0 {
            HealthStatus::Injured
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, Display)]
pub enum EntityKind {
    /// The actor the local client controls
    Local,
    /// Another client's actor
    RemoteControlled,
    /// Actor driven by the target's own logic
    Simulated,
}

/// Identity fields that only exist for some kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum KindPayload {
    Local {
        group: Option<String>,
    },
    RemoteControlled {
        account_id: String,
        group: Option<String>,
    },
    Simulated {
        role: Option<String>,
    },
}

impl KindPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            KindPayload::Local { .. } => EntityKind::Local,
            KindPayload::RemoteControlled { .. } => EntityKind::RemoteControlled,
            KindPayload::Simulated { .. } => EntityKind::Simulated,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            KindPayload::Local { group } | KindPayload::RemoteControlled { group, .. } => {
                group.as_deref()
            }
            KindPayload::Simulated { .. } => None,
        }
    }

    /// Short human-readable label.
    pub fn label(&self) -> &str {
        match self {
            KindPayload::Local { .. } => "local",
            KindPayload::RemoteControlled { account_id, .. } => account_id,
            KindPayload::Simulated { role } => role.as_deref().unwrap_or("simulated"),
        }
    }
}

/// A resolved actor.
///
/// Identity fields are read once at construction; the state fields are rewritten
/// by every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Root address; identity key for the lifetime of the remote object
    pub address: Address,
    pub payload: KindPayload,
    pub faction: Faction,
    pub controller: Address,
    pub health_controller: Address,
    pub movement: Address,

    pub health: HealthStatus,
    pub position: Vector3,
    pub rotation: Vector2,
    pub alive: bool,
    /// Set when the last refresh of this entity succeeded
    pub fresh: bool,
    /// Cycle in which the entity was constructed
    pub first_seen: u64,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.payload, KindPayload::Local { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faction_from_raw() {
        assert_eq!(Faction::try_from(1).unwrap(), Faction::Blue);
        assert_eq!(Faction::try_from(4).unwrap(), Faction::Wild);
        assert!(matches!(
            Faction::try_from(3),
            Err(Error::InvalidEnumValue {
                type_name: "Faction",
                value: 3
            })
        ));
    }

    #[test]
    fn test_health_precedence() {
        assert_eq!(HealthStatus::from_tags(0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_tags(health::HEALTHY), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_tags(health::INJURED), HealthStatus::Injured);
        assert_eq!(
            HealthStatus::from_tags(health::INJURED | health::BADLY_INJURED),
            HealthStatus::BadlyInjured
        );
        assert_eq!(
            HealthStatus::from_tags(health::INJURED | health::DYING),
            HealthStatus::Dying
        );
    }

    #[test]
    fn test_vector_decode() {
        let bytes: Vec<u8> = [1.0f32, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let v = Vector3::from_le_slice(&bytes).unwrap();
        assert_eq!(v, Vector3 { x: 1.0, y: 2.0, z: 3.0 });
        assert!(Vector3::from_le_slice(&bytes[..8]).is_none());
        assert_eq!(v.to_le_vec(), bytes);
    }

    #[test]
    fn test_payload_kind_and_label() {
        let remote = KindPayload::RemoteControlled {
            account_id: "1234".into(),
            group: Some("g1".into()),
        };
        assert_eq!(remote.kind(), EntityKind::RemoteControlled);
        assert_eq!(remote.label(), "1234");
        assert_eq!(remote.group(), Some("g1"));
        assert_eq!(KindPayload::Simulated { role: None }.label(), "simulated");
    }
}
