//! Reduce-then-scan: three dispatches separated by barriers.
//!
//! 1. `Reduce` writes each partition's sum to the reduction buffer.
//! 2. `ScanReductions` runs as a single group and turns those sums into
//!    exclusive partition prefixes in place.
//! 3. `Propagate` rescans every tile seeded with its partition prefix.
//!
//! No group ever waits on another, so this strategy only needs barriers
//! between dispatches.

use std::sync::Arc;

use sweep_primitives::{
    Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceError, DispatchConstants,
    GridSize, GroupContext, Kernel, PartitionLayout,
};

use crate::tile::{reduce_tile, scan_tile};
use crate::{ScanIo, ScanKind};

/// Per-size storage of the reduce-then-scan strategy.
pub(crate) struct RtsScratch {
    reductions: DeviceBuffer,
}

impl RtsScratch {
    pub(crate) fn bytes_for(partitions: usize) -> u64 {
        DeviceBuffer::bytes_for(partitions)
    }

    pub(crate) fn allocate(device: &Device, partitions: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            reductions: device.alloc_buffer("rts-reductions", partitions, BufferUsage::DeviceLocal)?,
        })
    }
}

struct Reduce {
    scan_in: DeviceBuffer,
    reductions: DeviceBuffer,
    partition_size: usize,
}

impl Kernel for Reduce {
    fn name(&self) -> &'static str {
        "RtsReduce"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::read(&self.scan_in), Binding::write(&self.reductions)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let p = group.logical_index();
        if p >= group.constants.thread_blocks {
            return;
        }
        let layout = PartitionLayout::new(group.constants.size as usize, self.partition_size);
        let sum = reduce_tile(&self.scan_in, layout.range(p as usize));
        self.reductions.store(p as usize, sum);
    }
}

struct ScanReductions {
    reductions: DeviceBuffer,
}

impl Kernel for ScanReductions {
    fn name(&self) -> &'static str {
        "RtsScan"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::read_write(&self.reductions)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let mut running = 0u32;
        for p in 0..group.constants.thread_blocks as usize {
            let sum = self.reductions.load(p);
            self.reductions.store(p, running);
            running = running.wrapping_add(sum);
        }
    }
}

struct Propagate {
    scan_in: DeviceBuffer,
    scan_out: DeviceBuffer,
    reductions: DeviceBuffer,
    partition_size: usize,
    kind: ScanKind,
}

impl Kernel for Propagate {
    fn name(&self) -> &'static str {
        match self.kind {
            ScanKind::Inclusive => "RtsPropagateInclusive",
            ScanKind::Exclusive => "RtsPropagateExclusive",
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read(&self.scan_in),
            Binding::read(&self.reductions),
            Binding::write(&self.scan_out),
        ]
    }

    fn execute_group(&self, group: &GroupContext) {
        let p = group.logical_index();
        if p >= group.constants.thread_blocks {
            return;
        }
        let layout = PartitionLayout::new(group.constants.size as usize, self.partition_size);
        let prefix = self.reductions.load(p as usize);
        scan_tile(&self.scan_in, &self.scan_out, layout.range(p as usize), prefix, self.kind);
    }
}

pub(crate) fn encode(
    cmd: &mut CommandList,
    io: &ScanIo<'_>,
    scratch: &RtsScratch,
    kind: ScanKind,
) -> Result<(), DeviceError> {
    let constants = DispatchConstants::new(io.size, io.partitions);

    cmd.dispatch_tiled(
        Arc::new(Reduce {
            scan_in: io.scan_in.clone(),
            reductions: scratch.reductions.clone(),
            partition_size: io.partition_size,
        }),
        io.max_dim,
        constants,
    )?;
    cmd.barrier(&scratch.reductions);

    cmd.dispatch(
        Arc::new(ScanReductions {
            reductions: scratch.reductions.clone(),
        }),
        GridSize::linear(1),
        constants,
    );
    cmd.barrier(&scratch.reductions);

    cmd.dispatch_tiled(
        Arc::new(Propagate {
            scan_in: io.scan_in.clone(),
            scan_out: io.scan_out.clone(),
            reductions: scratch.reductions.clone(),
            partition_size: io.partition_size,
            kind,
        }),
        io.max_dim,
        constants,
    )?;
    cmd.barrier(io.scan_out);
    Ok(())
}
