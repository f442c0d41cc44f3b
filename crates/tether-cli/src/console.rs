//! Terminal output for lifecycle events.

use std::sync::Arc;

use owo_colors::OwoColorize;
use tether::{
    EntityKind, EntitySnapshot, LifecycleSubscriber, LossReason, ProcessId, RemoteMemory,
    SessionContext,
};

#[derive(Debug, Default, PartialEq, Eq)]
struct EntitySummary {
    local: usize,
    remote: usize,
    simulated: usize,
    dead: usize,
    stale: usize,
    quests: usize,
}

fn summarize(snapshot: &EntitySnapshot) -> EntitySummary {
    let mut summary = EntitySummary {
        quests: snapshot.quests.len(),
        ..Default::default()
    };
    for entity in snapshot.iter() {
        match entity.kind() {
            EntityKind::Local => summary.local += 1,
            EntityKind::RemoteControlled => summary.remote += 1,
            EntityKind::Simulated => summary.simulated += 1,
        }
        if !entity.alive {
            summary.dead += 1;
        }
        if !entity.fresh {
            summary.stale += 1;
        }
    }
    summary
}

/// Prints one line per lifecycle event, and an entity summary when membership changes.
pub struct ConsoleSubscriber;

impl LifecycleSubscriber for ConsoleSubscriber {
    fn on_process_acquired(&mut self, pid: ProcessId, _memory: &Arc<dyn RemoteMemory>) {
        println!("{} attached to pid {}", "●".green(), pid);
    }

    fn on_session_started(&mut self, context: &SessionContext) {
        println!(
            "{} session {} started (world {:#x})",
            "▶".cyan(),
            context.session_id,
            context.world
        );
    }

    fn on_entities_changed(&mut self, snapshot: &Arc<EntitySnapshot>) {
        let s = summarize(snapshot);
        println!(
            "  cycle {:>5}: {} local, {} remote, {} simulated, {} dead, {} stale, {} quests",
            snapshot.cycle,
            s.local.bold(),
            s.remote.yellow(),
            s.simulated.blue(),
            s.dead.red(),
            s.stale.dimmed(),
            s.quests,
        );
        if let Some(local) = snapshot.local() {
            println!(
                "  you: {} {} at ({:.1}, {:.1}, {:.1})",
                local.faction,
                local.health,
                local.position.x,
                local.position.y,
                local.position.z
            );
        }
    }

    fn on_session_ended(&mut self) {
        println!("{} session ended", "■".yellow());
    }

    fn on_process_lost(&mut self, pid: ProcessId, reason: LossReason) {
        println!("{} released pid {} ({})", "○".red(), pid, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether::{Entity, Faction, HealthStatus, KindPayload};

    fn entity(address: u64, payload: KindPayload, alive: bool, fresh: bool) -> Entity {
        Entity {
            address,
            payload,
            faction: Faction::Blue,
            controller: address + 1,
            health_controller: address + 2,
            movement: address + 3,
            health: HealthStatus::Healthy,
            position: Default::default(),
            rotation: Default::default(),
            alive,
            fresh,
            first_seen: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut snapshot = EntitySnapshot::empty();
        snapshot.entities = vec![
            entity(0x1000, KindPayload::Local { group: None }, true, true),
            entity(
                0x2000,
                KindPayload::RemoteControlled {
                    account_id: "a".into(),
                    group: None,
                },
                false,
                true,
            ),
            entity(0x3000, KindPayload::Simulated { role: None }, true, false),
        ];

        assert_eq!(
            summarize(&snapshot),
            EntitySummary {
                local: 1,
                remote: 1,
                simulated: 1,
                dead: 1,
                stale: 1,
                quests: 0,
            }
        );
    }
}
