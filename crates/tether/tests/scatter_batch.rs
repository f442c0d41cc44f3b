use tether::process::mock::MockMemoryBuilder;
use tether::scatter::{ReadError, Slot};
use tether::{ScatterBatch, ScatterLimits, ScatterReader};

#[test]
fn failed_request_does_not_affect_the_rest() {
    let mut builder = MockMemoryBuilder::new();
    for i in 0..16u64 {
        builder = builder.write_u64(0x10_0000 + i * 0x200, 1000 + i);
    }
    let mock = builder.build();

    let mut batch = ScatterBatch::new();
    let slots: Vec<Slot<u64>> = (0..16u64)
        .map(|i| {
            if i == 5 {
                batch.add(0u64)
            } else {
                batch.add(0x10_0000 + i * 0x200)
            }
        })
        .collect();

    let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
    assert_eq!(results.failed_count(), 1);
    for (i, slot) in slots.iter().enumerate() {
        if i == 5 {
            assert_eq!(results.get(*slot), Err(ReadError::NullAddress));
        } else {
            assert_eq!(results.get(*slot), Ok(1000 + i as u64));
        }
    }
}

#[test]
fn unmapped_page_fails_only_its_requests() {
    let mock = MockMemoryBuilder::new()
        .write_i32(0x10_0000, 1)
        .write_i32(0x30_0000, 3)
        .build();

    let mut batch = ScatterBatch::new();
    let a = batch.add::<i32>(0x10_0000u64);
    let b = batch.add::<i32>(0x20_0000u64);
    let c = batch.add::<i32>(0x30_0000u64);
    let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);

    assert_eq!(results.get(a), Ok(1));
    assert!(matches!(results.get(b), Err(ReadError::Io { .. })));
    assert_eq!(results.get(c), Ok(3));
    assert_eq!(results.io_calls(), 1);
}

/// `leaves` independent pointer chains, each `depth` hops long.
fn chained_reads(depth: u64, leaves: u64) -> (usize, Vec<u64>) {
    let mut builder = MockMemoryBuilder::new();
    for leaf in 0..leaves {
        let mut address = 0x100_0000 + leaf * 0x1_0000;
        for hop in 0..depth - 1 {
            let next = 0x4000_0000 + (leaf * depth + hop) * 0x1000;
            builder = builder.write_u64(address, next);
            address = next + 0x8;
        }
        builder = builder.write_u64(address, leaf);
    }
    let mock = builder.build();

    let mut batch = ScatterBatch::new();
    let mut slots: Vec<Slot<u64>> = (0..leaves)
        .map(|leaf| batch.add(0x100_0000 + leaf * 0x1_0000))
        .collect();
    for _ in 1..depth {
        batch.next_round();
        slots = slots.iter().map(|s| batch.add(s.at(0x8))).collect();
    }

    let results = ScatterReader::new(&mock, ScatterLimits::default()).execute(&batch);
    let values = slots
        .iter()
        .map(|s| results.get(*s).unwrap_or(u64::MAX))
        .collect();
    (mock.read_calls(), values)
}

#[test]
fn grouped_calls_track_chain_depth_not_width() {
    for depth in 1..=4 {
        for leaves in [1, 8, 64] {
            let (calls, values) = chained_reads(depth, leaves);
            assert_eq!(calls, depth as usize, "depth {depth}, leaves {leaves}");
            assert_eq!(values, (0..leaves).collect::<Vec<_>>());
        }
    }
}
