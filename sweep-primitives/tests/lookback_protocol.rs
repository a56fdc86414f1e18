//! Decoupled lookback driven through real dispatches.
//!
//! Every group claims its partition from a bump counter, publishes the
//! aggregate of its tile and resolves its exclusive prefix. The result must
//! match a sequential prefix over the tile aggregates in every execution mode,
//! including reversed physical order where a physical-index scheme would
//! deadlock.

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sweep_primitives::{
    claim_partition, Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceConfig,
    DispatchConstants, ExecutionMode, GroupContext, Kernel, LookbackTable, PartitionLayout,
};

struct Reset {
    bump: DeviceBuffer,
    table: LookbackTable,
}

impl Kernel for Reset {
    fn name(&self) -> &'static str {
        "Reset"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.bump), Binding::write(&self.table)]
    }

    fn execute_group(&self, _group: &GroupContext) {
        self.bump.store(0, 0);
        self.table.reset_range(0, self.table.slot_count());
    }
}

struct TilePrefix {
    input: DeviceBuffer,
    prefixes: DeviceBuffer,
    bump: DeviceBuffer,
    table: LookbackTable,
    partition_size: usize,
}

impl Kernel for TilePrefix {
    fn name(&self) -> &'static str {
        "TilePrefix"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read(&self.input),
            Binding::write(&self.prefixes),
            Binding::atomic(&self.bump),
            Binding::atomic(&self.table),
        ]
    }

    fn execute_group(&self, group: &GroupContext) {
        let p = claim_partition(&self.bump, 0) as usize;
        let layout = PartitionLayout::new(group.constants.size as usize, self.partition_size);
        let aggregate = layout
            .range(p)
            .map(|i| self.input.load(i))
            .fold(0u32, u32::wrapping_add);
        let prefix = self.table.resolve(p, aggregate);
        self.prefixes.store(p, prefix);
    }
}

/// Multi-lane variant: partition `p` publishes `aggregates[p * lanes..][..lanes]`.
struct LanePrefix {
    aggregates: DeviceBuffer,
    prefixes: DeviceBuffer,
    bump: DeviceBuffer,
    table: LookbackTable,
}

impl Kernel for LanePrefix {
    fn name(&self) -> &'static str {
        "LanePrefix"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read(&self.aggregates),
            Binding::write(&self.prefixes),
            Binding::atomic(&self.bump),
            Binding::atomic(&self.table),
        ]
    }

    fn execute_group(&self, _group: &GroupContext) {
        let lanes = self.table.lanes();
        let p = claim_partition(&self.bump, 0) as usize;
        let aggregates: Vec<u32> = (0..lanes).map(|l| self.aggregates.load(p * lanes + l)).collect();
        for (l, prefix) in self.table.resolve_lanes(p, &aggregates).into_iter().enumerate() {
            self.prefixes.store(p * lanes + l, prefix);
        }
    }
}

/// Per-lane exclusive prefixes of `aggregates`, computed on the device.
fn lane_prefixes(device: &Device, lanes: usize, aggregates: &[u32]) -> Vec<u32> {
    let partitions = aggregates.len() / lanes;
    let input = device
        .alloc_buffer_with_data("aggregates", aggregates, BufferUsage::DeviceLocal)
        .unwrap();
    let prefixes = device
        .alloc_buffer("prefixes", aggregates.len(), BufferUsage::HostReadable)
        .unwrap();
    let bump = device.alloc_buffer("bump", 1, BufferUsage::DeviceLocal).unwrap();
    let table = device.alloc_lookback_table("lookback", partitions, lanes).unwrap();

    let mut cmd = CommandList::new("lane-prefix");
    cmd.dispatch(
        Arc::new(Reset {
            bump: bump.clone(),
            table: table.clone(),
        }),
        sweep_primitives::GridSize::linear(1),
        DispatchConstants::new(0, 1),
    );
    cmd.barrier(&bump);
    cmd.barrier(&table);
    cmd.dispatch_tiled(
        Arc::new(LanePrefix {
            aggregates: input,
            prefixes: prefixes.clone(),
            bump,
            table,
        }),
        device.max_dispatch_dimension(),
        DispatchConstants::new(aggregates.len() as u32, partitions as u32),
    )
    .unwrap();
    device.submit(cmd).unwrap();
    device.copy_to_host(&prefixes, 0, aggregates.len()).unwrap()
}

fn run(mode: ExecutionMode, max_dim: u32, len: usize, partition_size: usize, seed: u64) {
    let device = Device::with_config(
        DeviceConfig::default()
            .with_mode(mode)
            .with_workers(4)
            .with_max_dispatch_dimension(max_dim),
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<u32> = (0..len).map(|_| rng.gen_range(0..1000)).collect();
    let layout = PartitionLayout::new(len, partition_size);
    let partitions = layout.count();

    let input = device
        .alloc_buffer_with_data("input", &data, BufferUsage::DeviceLocal)
        .unwrap();
    let prefixes = device
        .alloc_buffer("prefixes", partitions, BufferUsage::HostReadable)
        .unwrap();
    let bump = device.alloc_buffer("bump", 1, BufferUsage::DeviceLocal).unwrap();
    let table = device.alloc_lookback_table("lookback", partitions, 1).unwrap();

    let mut cmd = CommandList::new("tile-prefix");
    cmd.dispatch(
        Arc::new(Reset {
            bump: bump.clone(),
            table: table.clone(),
        }),
        sweep_primitives::GridSize::linear(1),
        DispatchConstants::new(0, 1),
    );
    cmd.barrier(&bump);
    cmd.barrier(&table);
    cmd.dispatch_tiled(
        Arc::new(TilePrefix {
            input,
            prefixes: prefixes.clone(),
            bump,
            table,
            partition_size,
        }),
        device.max_dispatch_dimension(),
        DispatchConstants::new(len as u32, partitions as u32),
    )
    .unwrap();
    device.submit(cmd).unwrap();

    let got = device.copy_to_host(&prefixes, 0, partitions).unwrap();
    let mut expected = Vec::with_capacity(partitions);
    let mut running = 0u32;
    for p in 0..partitions {
        expected.push(running);
        running = layout.range(p).map(|i| data[i]).fold(running, u32::wrapping_add);
    }
    assert_eq!(got, expected, "mode={mode:?} max_dim={max_dim} len={len}");
}

#[test]
fn test_parallel_lookback() {
    run(ExecutionMode::Parallel, 65_535, 100_000, 64, 1);
}

#[test]
fn test_serial_lookback() {
    run(ExecutionMode::Serial, 65_535, 10_000, 64, 2);
}

#[test]
fn test_reversed_group_order_does_not_deadlock() {
    run(ExecutionMode::SerialReversed, 65_535, 10_000, 64, 3);
}

#[test]
fn test_lookback_across_tiled_dispatch() {
    run(ExecutionMode::Parallel, 32, 5_000, 16, 4);
    run(ExecutionMode::SerialReversed, 32, 5_000, 16, 5);
}

#[test]
fn test_single_partial_partition() {
    run(ExecutionMode::Parallel, 65_535, 10, 64, 6);
}

#[test]
fn prop_lookback_matches_sequential_prefix() {
    let modes = [ExecutionMode::Parallel, ExecutionMode::Serial, ExecutionMode::SerialReversed];
    let devices: Vec<Device> = modes
        .iter()
        .map(|&mode| {
            Device::with_config(
                DeviceConfig::default()
                    .with_mode(mode)
                    .with_workers(4)
                    .with_max_dispatch_dimension(16),
            )
            .unwrap()
        })
        .collect();

    let cases = (1usize..4, 1usize..120, 0..modes.len()).prop_flat_map(|(lanes, partitions, mode)| {
        (
            Just(lanes),
            Just(mode),
            prop::collection::vec(any::<u32>(), lanes * partitions),
        )
    });
    let mut runner = TestRunner::new(Config::with_cases(48));
    runner
        .run(&cases, |(lanes, mode, aggregates)| {
            let got = lane_prefixes(&devices[mode], lanes, &aggregates);

            let mut running = vec![0u32; lanes];
            for (i, &aggregate) in aggregates.iter().enumerate() {
                let lane = i % lanes;
                prop_assert_eq!(got[i], running[lane], "partition {} lane {} in {:?}", i / lanes, lane, modes[mode]);
                running[lane] = running[lane].wrapping_add(aggregate);
            }
            Ok(())
        })
        .unwrap();
}
