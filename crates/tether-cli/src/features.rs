//! Write features available from the command line.

use serde::Deserialize;
use tether::{Address, ReadMemory, RemoteMemory, ScatterWriteBatch, SessionContext, WriteFeature};
use tracing::{debug, info};

/// Value kept at a fixed offset from the local actor, from a `[[pin]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PinSpec {
    pub name: String,
    pub offset: u64,
    pub value: PinValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PinValue {
    Int(i32),
    Float(f32),
}

/// Rewrites every pinned field of the local actor whenever the target changes it.
pub struct PinFeature {
    pins: Vec<PinSpec>,
    local_actor_offset: u64,
    world: Option<Address>,
    announced: bool,
}

impl PinFeature {
    /// `local_actor_offset` is the world's local-actor pointer field.
    pub fn new(pins: Vec<PinSpec>, local_actor_offset: u64) -> Self {
        Self {
            pins,
            local_actor_offset,
            world: None,
            announced: false,
        }
    }

    fn queue(
        mem: &dyn RemoteMemory,
        batch: &mut ScatterWriteBatch,
        address: Address,
        value: PinValue,
    ) -> tether::Result<()> {
        match value {
            PinValue::Int(v) => {
                if mem.read_value::<i32>(address)? != v {
                    batch.add_value(address, v);
                }
            }
            PinValue::Float(v) => {
                if mem.read_value::<f32>(address)?.to_bits() != v.to_bits() {
                    batch.add_value(address, v);
                }
            }
        }
        Ok(())
    }
}

impl WriteFeature for PinFeature {
    fn name(&self) -> &str {
        "pin"
    }

    fn enabled(&self) -> bool {
        !self.pins.is_empty()
    }

    fn apply(&mut self, mem: &dyn RemoteMemory, batch: &mut ScatterWriteBatch) -> tether::Result<()> {
        let Some(world) = self.world else {
            return Ok(());
        };
        let local = match mem.read_ptr(world.wrapping_add(self.local_actor_offset)) {
            Ok(local) => local,
            Err(e) if e.is_process_lost() => return Err(e),
            // No local actor yet
            Err(_) => return Ok(()),
        };

        for pin in &self.pins {
            Self::queue(mem, batch, local.wrapping_add(pin.offset), pin.value)?;
        }
        if !self.announced && !batch.is_empty() {
            info!("Pinning {} field(s) on local actor {:#x}", self.pins.len(), local);
            self.announced = true;
        }
        Ok(())
    }

    fn on_session_started(&mut self, context: &SessionContext) {
        debug!("Pins armed for session {}", context.session_id);
        self.world = Some(context.world);
        self.announced = false;
    }

    fn on_session_ended(&mut self) {
        self.world = None;
    }

    fn on_process_lost(&mut self, _reason: tether::LossReason) {
        self.world = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether::process::mock::MockMemoryBuilder;

    const WORLD: Address = 0x50_0000;
    const LOCAL_OFFSET: u64 = 0x30;
    const LOCAL: Address = 0x60_0000;

    fn context() -> SessionContext {
        SessionContext {
            session_id: 1,
            world: WORLD,
            local_actor: None,
            started_at: chrono::Utc::now(),
        }
    }

    fn pins() -> Vec<PinSpec> {
        vec![
            PinSpec {
                name: "stamina".into(),
                offset: 0x40,
                value: PinValue::Float(100.0),
            },
            PinSpec {
                name: "flags".into(),
                offset: 0x48,
                value: PinValue::Int(7),
            },
        ]
    }

    #[test]
    fn test_queues_only_changed_fields() {
        let mock = MockMemoryBuilder::new()
            .write_u64(WORLD + LOCAL_OFFSET, LOCAL)
            .write_f32(LOCAL + 0x40, 12.5)
            .write_i32(LOCAL + 0x48, 7)
            .build();
        let mut feature = PinFeature::new(pins(), LOCAL_OFFSET);
        feature.on_session_started(&context());

        let mut batch = ScatterWriteBatch::new();
        feature.apply(&mock, &mut batch).unwrap();
        assert_eq!(batch.len(), 1);

        mock.set_f32(LOCAL + 0x40, 100.0);
        let mut batch = ScatterWriteBatch::new();
        feature.apply(&mock, &mut batch).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_idle_without_session_or_local_actor() {
        let mock = MockMemoryBuilder::new()
            .write_u64(WORLD + LOCAL_OFFSET, 0)
            .build();
        let mut feature = PinFeature::new(pins(), LOCAL_OFFSET);
        let mut batch = ScatterWriteBatch::new();

        feature.apply(&mock, &mut batch).unwrap();
        feature.on_session_started(&context());
        feature.apply(&mock, &mut batch).unwrap();
        assert!(batch.is_empty());

        feature.on_session_ended();
        mock.set_u64(WORLD + LOCAL_OFFSET, LOCAL);
        feature.apply(&mock, &mut batch).unwrap();
        assert!(batch.is_empty());
    }
}
