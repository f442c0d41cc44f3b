use crate::process::Pod;

use super::request::{
    Decode, ListLayout, ListSlot, MapLayout, MapSlot, Request, SetSlot, Slot, Target, TextLayout,
    TextSlot,
};

/// A set of read requests grouped into sequential rounds.
///
/// Requests in the same round are independent and are fetched together.
/// A request may only dereference a pointer read in an earlier round; see
/// [`Slot::at`].
///
/// ```ignore
/// let mut batch = ScatterBatch::new();
/// let controller = batch.add::<u64>(actor + 0x18);
/// batch.next_round();
/// let back_ref = batch.add::<u64>(controller.at(0x40));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScatterBatch {
    requests: Vec<Request>,
    round: usize,
}

impl ScatterBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Index of the round new requests are added to.
    pub fn current_round(&self) -> usize {
        self.round
    }

    /// Number of rounds that hold at least one request.
    pub fn round_count(&self) -> usize {
        self.requests.last().map_or(0, |r| r.round + 1)
    }

    /// Start a new round. Requests added afterwards may depend on everything before.
    pub fn next_round(&mut self) -> usize {
        self.round += 1;
        self.round
    }

    fn push(&mut self, target: Target, decode: Decode) -> usize {
        let id = self.requests.len();
        self.requests.push(Request {
            target,
            decode,
            round: self.round,
        });
        id
    }

    /// Fixed-size value.
    pub fn add<T: Pod>(&mut self, target: impl Into<Target>) -> Slot<T> {
        Slot::new(self.push(target.into(), Decode::Value { size: T::SIZE }))
    }

    /// Text object at the target address.
    pub fn add_text(&mut self, target: impl Into<Target>, layout: TextLayout) -> TextSlot {
        TextSlot {
            id: self.push(target.into(), Decode::Text(layout)),
        }
    }

    /// Collection object at the target address.
    pub fn add_list<T: Pod>(&mut self, target: impl Into<Target>, layout: ListLayout) -> ListSlot<T> {
        let decode = Decode::List {
            layout,
            element_size: T::SIZE,
        };
        ListSlot::new(self.push(target.into(), decode))
    }

    /// Dictionary object at the target address.
    pub fn add_map<K: Pod, V: Pod>(
        &mut self,
        target: impl Into<Target>,
        layout: MapLayout,
    ) -> MapSlot<K, V> {
        let decode = Decode::Map {
            layout,
            key_size: K::SIZE,
            value_size: V::SIZE,
        };
        MapSlot::new(self.push(target.into(), decode))
    }

    /// Hash set object at the target address.
    pub fn add_set<K: Pod>(&mut self, target: impl Into<Target>, layout: MapLayout) -> SetSlot<K> {
        let decode = Decode::Map {
            layout,
            key_size: K::SIZE,
            value_size: 0,
        };
        SetSlot::new(self.push(target.into(), decode))
    }

    pub(crate) fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Request ids per round, in order. Empty rounds are skipped.
    pub(crate) fn rounds(&self) -> Vec<Vec<usize>> {
        let mut rounds: Vec<Vec<usize>> = vec![Vec::new(); self.round_count()];
        for (id, request) in self.requests.iter().enumerate() {
            rounds[request.round].push(id);
        }
        rounds.retain(|r| !r.is_empty());
        rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_group_requests() {
        let mut batch = ScatterBatch::new();
        let a = batch.add::<u64>(0x10_0000);
        let _b = batch.add::<i32>(0x10_0010);
        batch.next_round();
        batch.next_round();
        let _c = batch.add::<i32>(a.at(0x8));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.round_count(), 3);
        assert_eq!(batch.rounds(), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_empty_batch_has_no_rounds() {
        let mut batch = ScatterBatch::new();
        batch.next_round();
        assert!(batch.is_empty());
        assert_eq!(batch.round_count(), 0);
        assert!(batch.rounds().is_empty());
    }
}
