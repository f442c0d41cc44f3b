use tracing::trace;

use crate::config::TetherConfig;
use crate::process::layout::limits;
use crate::process::{Address, ByteBuffer, Pod, ReadSpan, RemoteMemory, decode_cstr, decode_utf16};

use super::batch::ScatterBatch;
use super::plan;
use super::request::{Decode, ListLayout, MapLayout, Request, RequestId, Target, TextLayout};
use super::results::{Payload, ReadError, ScatterResults};

/// Safety maxima and the coalescing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterLimits {
    pub page_size: u64,
    pub max_list_count: usize,
    pub max_text_bytes: usize,
}

impl Default for ScatterLimits {
    fn default() -> Self {
        Self {
            page_size: limits::PAGE_SIZE,
            max_list_count: limits::MAX_LIST_COUNT,
            max_text_bytes: limits::MAX_TEXT_BYTES,
        }
    }
}

impl From<&TetherConfig> for ScatterLimits {
    fn from(config: &TetherConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_list_count: config.max_list_count,
            max_text_bytes: config.max_text_bytes,
        }
    }
}

/// Second-phase work for a request whose size is only known after its header.
enum Body {
    Text,
    List { element_size: usize },
    Map {
        layout: MapLayout,
        key_size: usize,
        value_size: usize,
    },
}

/// Executes [`ScatterBatch`]es against a [`RemoteMemory`].
///
/// Each round costs one grouped read for its headers and, when the round holds
/// text or collections, one more for their bodies.
pub struct ScatterReader<'a, M: RemoteMemory + ?Sized> {
    mem: &'a M,
    limits: ScatterLimits,
}

impl<'a, M: RemoteMemory + ?Sized> ScatterReader<'a, M> {
    pub fn new(mem: &'a M, limits: ScatterLimits) -> Self {
        Self { mem, limits }
    }

    pub fn execute(&self, batch: &ScatterBatch) -> ScatterResults {
        let mut results = ScatterResults::new(batch.len());
        let rounds = batch.rounds();
        for ids in &rounds {
            self.execute_round(batch.requests(), ids, &mut results);
        }
        trace!(
            "Scatter batch: {} requests, {} rounds, {} calls, {} failed",
            batch.len(),
            rounds.len(),
            results.io_calls(),
            results.failed_count()
        );
        results
    }

    fn execute_round(&self, requests: &[Request], ids: &[RequestId], results: &mut ScatterResults) {
        let mut live: Vec<(RequestId, Address)> = Vec::with_capacity(ids.len());
        for &id in ids {
            match resolve(requests, id, results) {
                Ok(address) => {
                    results.set_address(id, address);
                    live.push((id, address));
                }
                Err(e) => results.store(id, Err(e)),
            }
        }

        // Phase 1: fixed values and collection headers
        let mut pieces = Vec::new();
        let mut ranges = Vec::with_capacity(live.len());
        for &(id, address) in &live {
            let start = pieces.len();
            self.header_pieces(requests[id].decode, address, &mut pieces);
            ranges.push(start..pieces.len());
        }
        let headers = self.fetch(&pieces, results);

        // Phase 2: bodies whose length came from a header
        let mut body_pieces = Vec::new();
        let mut pending: Vec<(RequestId, Body)> = Vec::new();
        for (&(id, address), range) in live.iter().zip(ranges) {
            let header: Result<Vec<Vec<u8>>, ReadError> = headers[range].iter().cloned().collect();
            let outcome = header.and_then(|parts| {
                self.after_header(requests[id].decode, address, &parts)
            });
            match outcome {
                Ok(Step::Done(payload)) => results.store(id, Ok(payload)),
                Ok(Step::Read(span, body)) => {
                    body_pieces.push(span);
                    pending.push((id, body));
                }
                Err(e) => results.store(id, Err(e)),
            }
        }

        let bodies = self.fetch(&body_pieces, results);
        for ((id, body), bytes) in pending.into_iter().zip(bodies) {
            let outcome = bytes.and_then(|bytes| decode_body(body, bytes));
            results.store(id, outcome);
        }
    }

    fn header_pieces(&self, decode: Decode, address: Address, pieces: &mut Vec<ReadSpan>) {
        match decode {
            Decode::Value { size } => pieces.push(ReadSpan::new(address, size)),
            Decode::Text(TextLayout::LengthPrefixedUtf16 { length_offset, .. }) => {
                pieces.push(ReadSpan::new(address.wrapping_add(length_offset), i32::SIZE));
            }
            Decode::Text(TextLayout::NullTerminated) => {
                // Stay inside the starting page so a short string next to an
                // unmapped page still reads
                let page = self.limits.page_size.max(1);
                let to_page_end = (page - address % page) as usize;
                pieces.push(ReadSpan::new(address, to_page_end.min(self.limits.max_text_bytes)));
            }
            Decode::List { layout, .. } | Decode::Map { layout: MapLayout { entries: layout, .. }, .. } => {
                pieces.push(ReadSpan::new(address.wrapping_add(layout.count_offset), i32::SIZE));
                if let Some(ptr_offset) = layout.items_ptr_offset {
                    pieces.push(ReadSpan::new(address.wrapping_add(ptr_offset), u64::SIZE));
                }
            }
        }
    }

    fn after_header(&self, decode: Decode, address: Address, parts: &[Vec<u8>]) -> Result<Step, ReadError> {
        match decode {
            Decode::Value { .. } => Ok(Step::Done(Payload::Bytes(first(parts)?.clone()))),
            Decode::Text(TextLayout::NullTerminated) => {
                Ok(Step::Done(Payload::Text(decode_cstr(first(parts)?))))
            }
            Decode::Text(TextLayout::LengthPrefixedUtf16 { data_offset, .. }) => {
                let units = read_i32(first(parts)?)?;
                let bytes = i64::from(units) * 2;
                if units < 0 || bytes > self.limits.max_text_bytes as i64 {
                    return Err(ReadError::LengthOutOfRange {
                        len: bytes,
                        max: self.limits.max_text_bytes,
                    });
                }
                if units == 0 {
                    return Ok(Step::Done(Payload::Text(String::new())));
                }
                let span = ReadSpan::new(address.wrapping_add(data_offset), bytes as usize);
                Ok(Step::Read(span, Body::Text))
            }
            Decode::List {
                layout,
                element_size,
            } => {
                let Some((count, base)) = self.collection_header(layout, address, parts)? else {
                    return Ok(Step::Done(Payload::Records {
                        size: element_size,
                        bytes: Vec::new(),
                    }));
                };
                let span = ReadSpan::new(base.wrapping_add(layout.data_offset), count * element_size);
                Ok(Step::Read(span, Body::List { element_size }))
            }
            Decode::Map {
                layout,
                key_size,
                value_size,
            } => {
                let Some((count, base)) = self.collection_header(layout.entries, address, parts)? else {
                    return Ok(Step::Done(Payload::Records {
                        size: key_size + value_size,
                        bytes: Vec::new(),
                    }));
                };
                let span = ReadSpan::new(
                    base.wrapping_add(layout.entries.data_offset),
                    count * layout.entry_stride as usize,
                );
                Ok(Step::Read(
                    span,
                    Body::Map {
                        layout,
                        key_size,
                        value_size,
                    },
                ))
            }
        }
    }

    /// Validated element count and element base, or `None` for an empty collection.
    fn collection_header(
        &self,
        layout: ListLayout,
        address: Address,
        parts: &[Vec<u8>],
    ) -> Result<Option<(usize, Address)>, ReadError> {
        let count = read_i32(first(parts)?)?;
        if count < 0 || count as usize > self.limits.max_list_count {
            return Err(ReadError::LengthOutOfRange {
                len: i64::from(count),
                max: self.limits.max_list_count,
            });
        }
        if count == 0 {
            return Ok(None);
        }
        let base = match layout.items_ptr_offset {
            Some(_) => {
                let ptr = parts
                    .get(1)
                    .and_then(|p| u64::from_le_slice(p))
                    .ok_or_else(|| ReadError::Decode("missing items pointer".into()))?;
                if ptr == 0 {
                    return Err(ReadError::NullAddress);
                }
                ptr
            }
            None => address,
        };
        Ok(Some((count as usize, base)))
    }

    fn fetch(&self, pieces: &[ReadSpan], results: &mut ScatterResults) -> Vec<Result<Vec<u8>, ReadError>> {
        if pieces.is_empty() {
            return Vec::new();
        }
        let plan = plan::plan(pieces, self.limits.page_size);
        let raw = self.mem.read_scatter(&plan.spans);
        results.record_io_call();

        plan.placements
            .iter()
            .zip(pieces)
            .map(|(placement, piece)| match raw.get(placement.span) {
                Some(Ok(bytes)) => bytes
                    .get(placement.offset..placement.offset + placement.len)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| ReadError::Io {
                        address: piece.address,
                        len: piece.len,
                        message: format!("short read: {} bytes", bytes.len()),
                    }),
                Some(Err(e)) => Err(ReadError::from_io(piece.address, piece.len, e)),
                None => Err(ReadError::Io {
                    address: piece.address,
                    len: piece.len,
                    message: "no result for span".into(),
                }),
            })
            .collect()
    }
}

enum Step {
    Done(Payload),
    Read(ReadSpan, Body),
}

fn first(parts: &[Vec<u8>]) -> Result<&Vec<u8>, ReadError> {
    parts
        .first()
        .ok_or_else(|| ReadError::Decode("missing header".into()))
}

fn read_i32(bytes: &[u8]) -> Result<i32, ReadError> {
    i32::from_le_slice(bytes).ok_or_else(|| ReadError::Decode("short length field".into()))
}

fn resolve(requests: &[Request], id: RequestId, results: &ScatterResults) -> Result<Address, ReadError> {
    let request = &requests[id];
    match request.target {
        Target::Fixed(0) => Err(ReadError::NullAddress),
        Target::Fixed(address) => Ok(address),
        Target::Deref { base, offset } => {
            let base_request = requests.get(base).ok_or(ReadError::InvalidDependency)?;
            if base_request.round >= request.round {
                return Err(ReadError::InvalidDependency);
            }
            match results.outcome(base) {
                Ok(Payload::Bytes(bytes)) => {
                    let ptr = u64::from_le_slice(bytes)
                        .ok_or_else(|| ReadError::Decode("dependency is not a pointer".into()))?;
                    if ptr == 0 {
                        return Err(ReadError::NullAddress);
                    }
                    Ok(ptr.wrapping_add(offset))
                }
                Ok(_) => Err(ReadError::Decode("dependency is not a pointer".into())),
                Err(_) => Err(ReadError::Dependency(base)),
            }
        }
    }
}

fn decode_body(body: Body, bytes: Vec<u8>) -> Result<Payload, ReadError> {
    match body {
        Body::Text => Ok(Payload::Text(decode_utf16(&bytes))),
        Body::List { element_size } => Ok(Payload::Records {
            size: element_size,
            bytes,
        }),
        Body::Map {
            layout,
            key_size,
            value_size,
        } => {
            let record = key_size + value_size;
            let mut out = Vec::new();
            for entry in ByteBuffer::new(&bytes).records(layout.entry_stride as usize) {
                if let Some(hash_offset) = layout.hash_offset
                    && entry.i32_at(hash_offset as usize).is_none_or(|h| h < 0)
                {
                    continue;
                }
                let key = entry
                    .slice(layout.key_offset as usize, key_size)
                    .ok_or_else(|| ReadError::Decode("entry key out of bounds".into()))?;
                let value = entry
                    .slice(layout.value_offset as usize, value_size)
                    .ok_or_else(|| ReadError::Decode("entry value out of bounds".into()))?;
                out.extend_from_slice(key);
                out.extend_from_slice(value);
            }
            Ok(Payload::Records {
                size: record,
                bytes: out,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockMemoryBuilder;

    #[test]
    fn test_fixed_round_is_one_call() {
        let mock = MockMemoryBuilder::new()
            .write_i32(0x10_0000, 7)
            .write_u64(0x10_0008, 0xABCD)
            .write_i32(0x20_0000, 9)
            .build();
        let mut batch = ScatterBatch::new();
        let a = batch.add::<i32>(0x10_0000);
        let b = batch.add::<u64>(0x10_0008);
        let c = batch.add::<i32>(0x20_0000);

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.get(a), Ok(7));
        assert_eq!(results.get(b), Ok(0xABCD));
        assert_eq!(results.get(c), Ok(9));
        assert_eq!(mock.read_calls(), 1);
        assert_eq!(results.io_calls(), 1);
    }

    #[test]
    fn test_deref_chain() {
        let mock = MockMemoryBuilder::new()
            .write_u64(0x10_0000, 0x20_0000)
            .write_i32(0x20_0010, 42)
            .build();
        let mut batch = ScatterBatch::new();
        let ptr = batch.add::<u64>(0x10_0000);
        batch.next_round();
        let value = batch.add::<i32>(ptr.at(0x10));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.get(value), Ok(42));
        assert_eq!(results.address(value.id()), Some(0x20_0010));
        assert_eq!(mock.read_calls(), 2);
    }

    #[test]
    fn test_same_round_dependency_rejected() {
        let mock = MockMemoryBuilder::new().write_u64(0x10_0000, 0x20_0000).build();
        let mut batch = ScatterBatch::new();
        let ptr = batch.add::<u64>(0x10_0000);
        let bad = batch.add::<i32>(ptr.at(0));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert!(results.get(ptr).is_ok());
        assert_eq!(results.get(bad), Err(ReadError::InvalidDependency));
    }

    #[test]
    fn test_null_pointer_dependency() {
        let mock = MockMemoryBuilder::new().write_u64(0x10_0000, 0).build();
        let mut batch = ScatterBatch::new();
        let ptr = batch.add::<u64>(0x10_0000);
        batch.next_round();
        let value = batch.add::<i32>(ptr.at(0x10));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.get(value), Err(ReadError::NullAddress));
        // Round two had nothing left to read
        assert_eq!(mock.read_calls(), 1);
    }

    #[test]
    fn test_failed_dependency_only_fails_dependents() {
        let mock = MockMemoryBuilder::new()
            .write_u64(0x10_0000, 0x20_0000)
            .write_i32(0x20_0000, 5)
            .build();
        let mut batch = ScatterBatch::new();
        let good = batch.add::<u64>(0x10_0000);
        let missing = batch.add::<u64>(0x50_0000);
        batch.next_round();
        let from_good = batch.add::<i32>(good.at(0));
        let from_missing = batch.add::<i32>(missing.at(0));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.get(from_good), Ok(5));
        assert_eq!(results.get(from_missing), Err(ReadError::Dependency(missing.id())));
    }

    #[test]
    fn test_text_over_cap_is_rejected() {
        let mock = MockMemoryBuilder::new()
            .write_i32(0x10_0010, 10_000)
            .build();
        let mut batch = ScatterBatch::new();
        let text = batch.add_text(0x10_0000, TextLayout::default());

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert!(matches!(
            results.text(text),
            Err(ReadError::LengthOutOfRange { len: 20_000, max: 1024 })
        ));
        assert_eq!(mock.read_calls(), 1);
    }

    #[test]
    fn test_null_terminated_text() {
        let mock = MockMemoryBuilder::new().write_cstr(0x10_0FF0, "edge").build();
        let mut batch = ScatterBatch::new();
        let text = batch.add_text(0x10_0FF0, TextLayout::NullTerminated);

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.text(text).unwrap(), "edge");
    }

    #[test]
    fn test_inline_array_and_empty_list() {
        let mock = MockMemoryBuilder::new()
            .write_i32(0x10_0018, 3)
            .write_i32(0x10_0020, 1)
            .write_i32(0x10_0024, 2)
            .write_i32(0x10_0028, 3)
            .write_i32(0x20_0018, 0)
            .write_u64(0x20_0010, 0)
            .build();
        let mut batch = ScatterBatch::new();
        let numbers = batch.add_list::<i32>(0x10_0000, ListLayout::array());
        let empty = batch.add_list::<u64>(0x20_0000, ListLayout::list());

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.list(numbers).unwrap(), vec![1, 2, 3]);
        assert!(results.list(empty).unwrap().is_empty());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mock = MockMemoryBuilder::new().write_i32(0x10_0018, -4).build();
        let mut batch = ScatterBatch::new();
        let list = batch.add_list::<u64>(0x10_0000, ListLayout::array());

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert!(matches!(
            results.list(list),
            Err(ReadError::LengthOutOfRange { len: -4, .. })
        ));
    }

    #[test]
    fn test_hash_set_skips_free_entries() {
        let set = 0x10_0000;
        let entries = 0x20_0000;
        let mock = MockMemoryBuilder::new()
            .write_u64(set + 0x18, entries)
            .write_i32(set + 0x40, 3)
            // entry 0: live
            .write_i32(entries + 0x20, 11)
            .write_u64(entries + 0x28, 0xAAAA)
            // entry 1: free slot
            .write_i32(entries + 0x30, -1)
            .write_u64(entries + 0x38, 0xBBBB)
            // entry 2: live
            .write_i32(entries + 0x40, 12)
            .write_u64(entries + 0x48, 0xCCCC)
            .build();
        let mut batch = ScatterBatch::new();
        let slot = batch.add_set::<u64>(set, MapLayout::hash_set(8));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.set(slot).unwrap(), vec![0xAAAA, 0xCCCC]);
    }

    #[test]
    fn test_dictionary_entries() {
        let dict = 0x10_0000;
        let entries = 0x20_0000;
        let mock = MockMemoryBuilder::new()
            .write_u64(dict + 0x18, entries)
            .write_i32(dict + 0x40, 2)
            .write_i32(entries + 0x20, 1)
            .write_u64(entries + 0x28, 0x1111)
            .write_i32(entries + 0x30, 7)
            .write_i32(entries + 0x38, 2)
            .write_u64(entries + 0x40, 0x2222)
            .write_i32(entries + 0x48, 8)
            .build();
        let mut batch = ScatterBatch::new();
        let slot = batch.add_map::<u64, i32>(dict, MapLayout::dictionary(8, 4));

        let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
        assert_eq!(results.entries(slot).unwrap(), vec![(0x1111, 7), (0x2222, 8)]);
    }
}
