use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::offset::OffsetTable;
use crate::process::{Address, ReadMemory, RemoteMemory};

use super::phase::Session;

/// Per-session roots, built when the world object appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub session_id: u64,
    pub world: Address,
    pub local_actor: Option<Address>,
    pub started_at: DateTime<Utc>,
}

/// Follow the root chain from the world module. `None` while no world exists.
fn find_world<M: RemoteMemory + ?Sized>(
    mem: &M,
    session: &Session,
    offsets: &OffsetTable,
) -> Result<Option<Address>> {
    let module = &offsets.world.module;
    let base = session
        .module(module)
        .ok_or_else(|| Error::ModuleNotFound(module.clone()))?;

    match mem.read_ptr_chain(base, &offsets.world.root_chain) {
        Ok(world) => Ok(Some(world)),
        Err(e) if e.is_process_lost() => Err(e),
        Err(e) => {
            debug!("World not available: {}", e);
            Ok(None)
        }
    }
}

impl SessionContext {
    /// Build a context if the session marker (a resolvable world) is present.
    pub fn locate<M: RemoteMemory + ?Sized>(
        mem: &M,
        session: &Session,
        offsets: &OffsetTable,
        session_id: u64,
    ) -> Result<Option<Self>> {
        let Some(world) = find_world(mem, session, offsets)? else {
            return Ok(None);
        };
        let local_actor = mem
            .read_ptr(world.wrapping_add(offsets.world.local_actor))
            .ok();

        Ok(Some(Self {
            session_id,
            world,
            local_actor,
            started_at: Utc::now(),
        }))
    }

    /// Whether the root chain still ends at this session's world.
    pub fn still_active<M: RemoteMemory + ?Sized>(
        &self,
        mem: &M,
        session: &Session,
        offsets: &OffsetTable,
    ) -> Result<bool> {
        Ok(find_world(mem, session, offsets)? == Some(self.world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessId;
    use crate::process::mock::MockMemoryBuilder;
    use crate::session::SessionPhase;

    fn ready_session(base: Address) -> Session {
        let mut session = Session {
            pid: Some(ProcessId(1000)),
            phase: SessionPhase::Ready,
            ..Default::default()
        };
        session.modules.insert("engine.dll".into(), base);
        session
    }

    #[test]
    fn test_locate_follows_root_chain() {
        let base = 0x40_0000;
        let mut offsets = OffsetTable::template();
        offsets.world.root_chain = vec![0x100, 0x20];
        let mock = MockMemoryBuilder::new()
            .write_u64(base + 0x100, 0x50_0000)
            .write_u64(0x50_0020, 0x60_0000)
            .write_u64(0x60_0000 + offsets.world.local_actor, 0x70_0000)
            .build();
        let session = ready_session(base);

        let ctx = SessionContext::locate(&mock, &session, &offsets, 1)
            .unwrap()
            .unwrap();
        assert_eq!(ctx.world, 0x60_0000);
        assert_eq!(ctx.local_actor, Some(0x70_0000));
        assert!(ctx.still_active(&mock, &session, &offsets).unwrap());

        // World pointer cleared: session over
        mock.set_u64(0x50_0020, 0);
        assert!(!ctx.still_active(&mock, &session, &offsets).unwrap());
    }

    #[test]
    fn test_overflowing_local_offset_leaves_local_unset() {
        let base = 0x40_0000;
        let mut offsets = OffsetTable::template();
        offsets.world.root_chain = vec![0x100];
        offsets.world.local_actor = u64::MAX - 0x10;
        let mock = MockMemoryBuilder::new()
            .write_u64(base + 0x100, 0x60_0000)
            .build();

        let ctx = SessionContext::locate(&mock, &ready_session(base), &offsets, 1)
            .unwrap()
            .unwrap();
        assert_eq!(ctx.world, 0x60_0000);
        assert_eq!(ctx.local_actor, None);
    }

    #[test]
    fn test_locate_without_world_is_none() {
        let base = 0x40_0000;
        let mut offsets = OffsetTable::template();
        offsets.world.root_chain = vec![0x100];
        let mock = MockMemoryBuilder::new().write_u64(base + 0x100, 0).build();

        let ctx = SessionContext::locate(&mock, &ready_session(base), &offsets, 1).unwrap();
        assert!(ctx.is_none());
    }

    #[test]
    fn test_locate_propagates_process_loss() {
        let base = 0x40_0000;
        let offsets = OffsetTable::template();
        let mock = MockMemoryBuilder::new().map_page(base).build();
        mock.kill();

        let err = SessionContext::locate(&mock, &ready_session(base), &offsets, 1).unwrap_err();
        assert!(err.is_process_lost());
    }
}
