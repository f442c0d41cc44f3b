//! Active quest records of the local actor.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::{Display, FromRepr};
use tracing::debug;

use crate::offset::QuestOffsets;
use crate::process::{Address, RemoteMemory, is_valid_pointer};
use crate::scatter::{ScatterBatch, ScatterLimits, ScatterReader, SetSlot, Slot, TextLayout, TextSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, FromRepr, Display)]
#[repr(i32)]
pub enum QuestStatus {
    Locked = 0,
    AvailableForStart = 1,
    Started = 2,
    AvailableForFinish = 3,
    Success = 4,
    Fail = 5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestRecord {
    pub id: String,
    pub status: QuestStatus,
    pub completed_conditions: BTreeSet<String>,
}

struct QuestSlots {
    quest: Address,
    status: Slot<i32>,
    id: TextSlot,
    conditions: SetSlot<u64>,
}

/// Rate-limited resolver for the started quests of the local actor.
pub struct QuestLog {
    offsets: QuestOffsets,
    text: TextLayout,
    interval: Duration,
    last_refresh: Option<Instant>,
    records: Vec<QuestRecord>,
}

impl QuestLog {
    pub fn new(offsets: QuestOffsets, text: TextLayout, interval: Duration) -> Self {
        Self {
            offsets,
            text,
            interval,
            last_refresh: None,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[QuestRecord] {
        &self.records
    }

    pub fn reset(&mut self) {
        self.last_refresh = None;
        self.records.clear();
    }

    fn due(&self, now: Instant) -> bool {
        self.last_refresh
            .is_none_or(|last| now.duration_since(last) >= self.interval)
    }

    /// Re-read the quest list if the rate limit allows. Returns `true` if it did.
    ///
    /// On a failed walk the previous records are kept.
    pub fn refresh<M: RemoteMemory + ?Sized>(
        &mut self,
        mem: &M,
        local_actor: Address,
        limits: ScatterLimits,
    ) -> bool {
        let now = Instant::now();
        if !self.due(now) {
            return false;
        }
        self.last_refresh = Some(now);

        let reader = ScatterReader::new(mem, limits);
        let quests = match self.read_quest_list(&reader, local_actor) {
            Ok(quests) => quests,
            Err(e) => {
                debug!("Quest list unavailable: {}", e);
                return false;
            }
        };

        let mut batch = ScatterBatch::new();
        let roots: Vec<(Address, Slot<i32>, Slot<u64>, Slot<u64>)> = quests
            .iter()
            .filter(|&&q| is_valid_pointer(q))
            .map(|&q| {
                (
                    q,
                    batch.add(q.wrapping_add(self.offsets.quest_status)),
                    batch.add(q.wrapping_add(self.offsets.quest_id)),
                    batch.add(q.wrapping_add(self.offsets.completed_conditions)),
                )
            })
            .collect();
        batch.next_round();
        let slots: Vec<QuestSlots> = roots
            .into_iter()
            .map(|(quest, status, id_ptr, set_ptr)| QuestSlots {
                quest,
                status,
                id: batch.add_text(id_ptr.at(0), self.text),
                conditions: batch.add_set(set_ptr.at(0), self.offsets.condition_set),
            })
            .collect();
        let results = reader.execute(&batch);

        // Started quests and their condition string pointers
        let mut started: Vec<(String, Vec<u64>)> = Vec::new();
        for slot in &slots {
            match results.get(slot.status).map(QuestStatus::from_repr) {
                Ok(Some(QuestStatus::Started)) => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping quest at {:#x}: {}", slot.quest, e);
                    continue;
                }
            }
            let id = match results.text(slot.id) {
                Ok(id) if !id.is_empty() => id,
                Ok(_) => {
                    debug!("Skipping quest at {:#x}: empty id", slot.quest);
                    continue;
                }
                Err(e) => {
                    debug!("Skipping quest at {:#x}: {}", slot.quest, e);
                    continue;
                }
            };
            // A started quest with no completed conditions yet has no set to read
            let conditions = results.set(slot.conditions).unwrap_or_default();
            started.push((id, conditions));
        }

        let mut text_batch = ScatterBatch::new();
        let text_slots: Vec<Vec<TextSlot>> = started
            .iter()
            .map(|(_, ptrs)| {
                ptrs.iter()
                    .filter(|&&p| p != 0)
                    .map(|&p| text_batch.add_text(p, self.text))
                    .collect()
            })
            .collect();
        let texts = reader.execute(&text_batch);

        self.records = started
            .into_iter()
            .zip(text_slots)
            .map(|((id, _), slots)| QuestRecord {
                id,
                status: QuestStatus::Started,
                completed_conditions: slots
                    .into_iter()
                    .filter_map(|s| texts.text(s).ok())
                    .filter(|t| !t.is_empty())
                    .collect(),
            })
            .collect();
        true
    }

    fn read_quest_list<M: RemoteMemory + ?Sized>(
        &self,
        reader: &ScatterReader<'_, M>,
        local_actor: Address,
    ) -> crate::Result<Vec<u64>> {
        let mut batch = ScatterBatch::new();
        let profile = batch.add::<u64>(local_actor.wrapping_add(self.offsets.profile));
        batch.next_round();
        let list_ptr = batch.add::<u64>(profile.at(self.offsets.quests));
        batch.next_round();
        let list = batch.add_list::<u64>(list_ptr.at(0), self.offsets.quest_list);

        let results = reader.execute(&batch);
        results.list(list).map_err(|e| e.into_error(local_actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::OffsetTable;
    use crate::process::mock::MockMemoryBuilder;

    fn offsets() -> QuestOffsets {
        OffsetTable::template().quests.unwrap()
    }

    #[test]
    fn test_started_quests_with_conditions() {
        let local = 0x10_0000;
        let mock = MockMemoryBuilder::new()
            .write_u64(local + 0x8A8, 0x11_0000)
            .write_u64(0x11_0028, 0x12_0000)
            .write_u64(0x12_0010, 0x13_0000)
            .write_i32(0x12_0018, 3)
            .write_u64(0x13_0020, 0x14_0000)
            .write_u64(0x13_0028, 0x15_0000)
            .write_u64(0x13_0030, 0x16_0000)
            // started, one completed condition
            .write_i32(0x14_001C, 2)
            .write_u64(0x14_0010, 0x14_0800)
            .write_utf16_string(0x14_0800, "q-one")
            .write_u64(0x14_0020, 0x17_0000)
            .write_u64(0x17_0018, 0x18_0000)
            .write_i32(0x17_0040, 1)
            .write_i32(0x18_0020, 5)
            .write_u64(0x18_0028, 0x19_0000)
            .write_utf16_string(0x19_0000, "cond-a")
            // finished
            .write_i32(0x15_001C, 4)
            // started but the id pointer is null
            .write_i32(0x16_001C, 2)
            .write_u64(0x16_0010, 0)
            .build();

        let mut log = QuestLog::new(offsets(), TextLayout::default(), Duration::ZERO);
        assert!(log.refresh(&mock, local, ScatterLimits::default()));

        assert_eq!(log.records().len(), 1);
        let quest = &log.records()[0];
        assert_eq!(quest.id, "q-one");
        assert_eq!(quest.status, QuestStatus::Started);
        assert!(quest.completed_conditions.contains("cond-a"));
    }

    #[test]
    fn test_corrupt_quest_entries_are_skipped() {
        let local = 0x10_0000;
        let mock = MockMemoryBuilder::new()
            .write_u64(local + 0x8A8, 0x11_0000)
            .write_u64(0x11_0028, 0x12_0000)
            .write_u64(0x12_0010, 0x13_0000)
            .write_i32(0x12_0018, 3)
            .write_u64(0x13_0020, 0xFFFF_FFFF_FFFF_FFF0)
            .write_u64(0x13_0028, 0x1234)
            .write_u64(0x13_0030, 0x14_0000)
            .write_i32(0x14_001C, 2)
            .write_u64(0x14_0010, 0x14_0800)
            .write_utf16_string(0x14_0800, "q-two")
            .build();

        let mut log = QuestLog::new(offsets(), TextLayout::default(), Duration::ZERO);
        assert!(log.refresh(&mock, local, ScatterLimits::default()));
        assert_eq!(log.records().len(), 1);
        assert_eq!(log.records()[0].id, "q-two");
        assert!(log.records()[0].completed_conditions.is_empty());
    }

    #[test]
    fn test_rate_limited() {
        let mock = MockMemoryBuilder::new().build();
        let mut log = QuestLog::new(offsets(), TextLayout::default(), Duration::from_secs(60));

        // Profile unreadable: first attempt is spent, the second is throttled
        assert!(!log.refresh(&mock, 0x10_0000, ScatterLimits::default()));
        let calls = mock.read_calls();
        assert!(!log.refresh(&mock, 0x10_0000, ScatterLimits::default()));
        assert_eq!(mock.read_calls(), calls);
    }
}
