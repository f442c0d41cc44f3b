use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::config::TetherConfig;
use crate::error::{Error, Result};
use crate::offset::OffsetTable;
use crate::process::{Address, RemoteMemory, is_user_address};
use crate::scatter::{ScatterBatch, ScatterLimits, ScatterReader};
use crate::session::SessionContext;

use super::actor::{plan_construction, plan_refresh};
use super::model::Entity;
use super::quest::QuestLog;
use super::registry::RegistrationTracker;
use super::snapshot::{EntitySnapshot, SnapshotCell};

/// Longest wait, in cycles, before a rejected address is constructed again.
const MAX_RETRY_DELAY: u64 = 32;

/// A tracked address whose construction failed.
#[derive(Debug, Clone, Copy)]
struct Rejection {
    attempts: u32,
    retry_at: u64,
}

impl Rejection {
    fn delay(attempts: u32) -> u64 {
        (1u64 << attempts.saturating_sub(1).min(6)).min(MAX_RETRY_DELAY)
    }
}

/// Counters for one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub added: usize,
    /// Includes actors rebuilt after their Local kind changed
    pub constructed: usize,
    pub reclassified: usize,
    pub rejected: usize,
    pub evicted: usize,
    pub pending: usize,
    pub refreshed: usize,
    pub refresh_failed: usize,
}

impl CycleReport {
    /// Whether the published entity set differs in membership or kinds from the last cycle.
    pub fn membership_changed(&self) -> bool {
        self.constructed > 0 || self.evicted > 0 || self.reclassified > 0
    }
}

/// Owns the canonical entity set and keeps it in step with the registration list.
pub struct EntityResolver {
    offsets: Arc<OffsetTable>,
    limits: ScatterLimits,
    debounce: u32,
    tracker: RegistrationTracker,
    entities: HashMap<Address, Entity>,
    refresh_failures: HashMap<Address, u32>,
    rejected: HashMap<Address, Rejection>,
    quests: Option<QuestLog>,
    cycle: u64,
    published: Arc<SnapshotCell>,
}

impl EntityResolver {
    pub fn new(offsets: Arc<OffsetTable>, config: &TetherConfig) -> Self {
        let quests = offsets.quests.clone().map(|q| {
            QuestLog::new(q, offsets.text, config.quest_refresh_interval())
        });
        Self {
            limits: ScatterLimits::from(config),
            debounce: config.eviction_debounce.max(1),
            tracker: RegistrationTracker::new(config.eviction_debounce),
            entities: HashMap::new(),
            refresh_failures: HashMap::new(),
            rejected: HashMap::new(),
            quests,
            cycle: 0,
            published: Arc::new(SnapshotCell::new()),
            offsets,
        }
    }

    /// Shared handle to the published snapshot, readable from any thread.
    pub fn snapshots(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.published)
    }

    pub fn current_entities(&self) -> Arc<EntitySnapshot> {
        self.published.load()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop all state and publish an empty snapshot.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.entities.clear();
        self.refresh_failures.clear();
        self.rejected.clear();
        if let Some(quests) = &mut self.quests {
            quests.reset();
        }
        self.cycle = 0;
        self.published.store(Arc::new(EntitySnapshot::empty()));
    }

    /// Run one cycle: sweep, diff, evict, construct, refresh, publish.
    ///
    /// Only a failed registration sweep or a lost process fails the cycle; any
    /// single entity failing is absorbed.
    pub fn refresh<M: RemoteMemory + ?Sized>(
        &mut self,
        mem: &M,
        context: &SessionContext,
    ) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };
        let reader = ScatterReader::new(mem, self.limits);

        let (sweep, local_actor) = self.sweep(&reader, context)?;
        let diff = self.tracker.observe(&sweep);
        report.added = diff.added.len();
        report.pending = diff.pending.len();

        for address in &diff.evicted {
            if self.entities.remove(address).is_some() {
                report.evicted += 1;
            }
            self.refresh_failures.remove(address);
            self.rejected.remove(address);
        }
        for address in &diff.pending {
            if let Some(entity) = self.entities.get_mut(address) {
                entity.fresh = false;
            }
        }

        let rebuilt = self.take_misclassified(local_actor);
        report.reclassified = rebuilt.len();
        let mut to_construct: Vec<Address> = diff.added.clone();
        to_construct.extend(rebuilt);
        to_construct.extend(self.due_retries(&diff.retained));
        self.construct(&reader, &to_construct, local_actor, &mut report)?;

        let live: Vec<Address> = diff
            .retained
            .iter()
            .chain(&diff.added)
            .copied()
            .filter(|a| self.entities.contains_key(a))
            .collect();
        self.refresh_entities(&reader, &live, &mut report)?;

        if let (Some(quests), Some(local)) = (&mut self.quests, local_actor) {
            quests.refresh(mem, local, self.limits);
        }

        self.publish();
        trace!("Cycle {:?}", report);
        Ok(report)
    }

    /// Read the registration list and the local actor pointer.
    fn sweep<M: RemoteMemory + ?Sized>(
        &self,
        reader: &ScatterReader<'_, M>,
        context: &SessionContext,
    ) -> Result<(Vec<Address>, Option<Address>)> {
        let world = &self.offsets.world;
        let mut batch = ScatterBatch::new();
        let list_ptr = batch.add::<u64>(context.world.wrapping_add(world.registered_actors));
        let local = batch.add::<u64>(context.world.wrapping_add(world.local_actor));
        batch.next_round();
        let list = batch.add_list::<u64>(list_ptr.at(0), world.registration);

        let results = reader.execute(&batch);
        if results.process_lost() {
            return Err(Error::ProcessLost("registration sweep".into()));
        }
        let mut sweep = results
            .list(list)
            .map_err(|e| e.into_error(context.world))?;
        let before = sweep.len();
        sweep.retain(|&a| is_user_address(a));
        if sweep.len() < before {
            debug!("Dropped {} malformed registration entries", before - sweep.len());
        }
        let local_actor = results.get(local).ok().filter(|&a| is_user_address(a));
        Ok((sweep, local_actor))
    }

    /// Remove entities whose Local kind no longer matches the world's local-actor
    /// pointer, so they are constructed again this cycle.
    fn take_misclassified(&mut self, local_actor: Option<Address>) -> Vec<Address> {
        let stale: Vec<Address> = self
            .entities
            .values()
            .filter(|e| e.is_local() != (local_actor == Some(e.address)))
            .map(|e| e.address)
            .collect();
        for address in &stale {
            debug!("Actor at {:#x} changed kind, rebuilding", address);
            self.entities.remove(address);
            self.refresh_failures.remove(address);
        }
        stale
    }

    /// Tracked addresses without an entity whose retry delay has elapsed.
    fn due_retries(&self, retained: &[Address]) -> Vec<Address> {
        retained
            .iter()
            .copied()
            .filter(|a| !self.entities.contains_key(a))
            .filter(|a| self.rejected.get(a).is_some_and(|r| r.retry_at <= self.cycle))
            .collect()
    }

    fn construct<M: RemoteMemory + ?Sized>(
        &mut self,
        reader: &ScatterReader<'_, M>,
        added: &[Address],
        local_actor: Option<Address>,
        report: &mut CycleReport,
    ) -> Result<()> {
        if added.is_empty() {
            return Ok(());
        }

        let mut batch = ScatterBatch::new();
        let plans = plan_construction(&mut batch, added, &self.offsets.actor, self.offsets.text);
        let results = reader.execute(&batch);
        if results.process_lost() {
            return Err(Error::ProcessLost("actor construction".into()));
        }

        for plan in &plans {
            let address = plan.address();
            match plan.finish(&results, local_actor, self.cycle) {
                Ok(entity) => {
                    debug!(
                        "Constructed {} actor at {:#x} ({})",
                        entity.kind(),
                        address,
                        entity.payload.label()
                    );
                    self.entities.insert(address, entity);
                    self.rejected.remove(&address);
                    report.constructed += 1;
                }
                Err(e) => {
                    // Stale or half-initialised object; stays tracked and is retried later
                    let attempts = self.rejected.get(&address).map_or(1, |r| r.attempts + 1);
                    let retry_at = self.cycle + Rejection::delay(attempts);
                    debug!("Rejected actor at {:#x} (attempt {}): {}", address, attempts, e);
                    self.rejected.insert(address, Rejection { attempts, retry_at });
                    report.rejected += 1;
                }
            }
        }
        Ok(())
    }

    fn refresh_entities<M: RemoteMemory + ?Sized>(
        &mut self,
        reader: &ScatterReader<'_, M>,
        live: &[Address],
        report: &mut CycleReport,
    ) -> Result<()> {
        if live.is_empty() {
            return Ok(());
        }

        let mut batch = ScatterBatch::new();
        let plans: Vec<_> = live
            .iter()
            .filter_map(|a| self.entities.get(a))
            .map(|entity| (entity.address, plan_refresh(&mut batch, entity, &self.offsets.actor)))
            .collect();
        let results = reader.execute(&batch);
        if results.process_lost() {
            return Err(Error::ProcessLost("actor refresh".into()));
        }

        for (address, slots) in plans {
            let Some(entity) = self.entities.get_mut(&address) else {
                continue;
            };
            match slots.apply(&results, entity) {
                Ok(()) => {
                    self.refresh_failures.remove(&address);
                    report.refreshed += 1;
                }
                Err(Error::BackReferenceMismatch { found, .. }) => {
                    debug!("Actor at {:#x} was replaced (found {:#x}), evicting", address, found);
                    self.evict(address);
                    report.refresh_failed += 1;
                    report.evicted += 1;
                }
                Err(e) => {
                    entity.fresh = false;
                    report.refresh_failed += 1;
                    let failures = self.refresh_failures.entry(address).or_insert(0);
                    *failures += 1;
                    if *failures >= self.debounce {
                        debug!("Actor at {:#x} failed {} refreshes, evicting: {}", address, failures, e);
                        self.evict(address);
                        report.evicted += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn evict(&mut self, address: Address) {
        self.entities.remove(&address);
        self.refresh_failures.remove(&address);
        self.rejected.remove(&address);
        self.tracker.forget(address);
    }

    fn publish(&self) {
        let entities = self
            .tracker
            .addresses()
            .iter()
            .filter_map(|a| self.entities.get(a).cloned())
            .collect();
        let quests = self
            .quests
            .as_ref()
            .map(|q| q.records().to_vec())
            .unwrap_or_default();

        self.published.store(Arc::new(EntitySnapshot {
            cycle: self.cycle,
            captured_at: Utc::now(),
            entities,
            quests,
        }));
    }
}
