//! Chained scan with decoupled lookback: one pass over the input.
//!
//! `InitChainedScan` clears the bump counter and every lookback slot; after a
//! barrier, each `ChainedScan` group claims a partition, reduces its tile,
//! resolves its exclusive prefix through the lookback table and writes its
//! scanned tile in the same dispatch.

use std::sync::Arc;

use sweep_primitives::{
    claim_partition, Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceError,
    DispatchConstants, GroupContext, Kernel, LookbackTable, PartitionLayout,
};

use crate::tile::{reduce_tile, scan_tile};
use crate::{ScanIo, ScanKind};

/// Lookback slots cleared by one init group.
const INIT_CHUNK: usize = 256;

/// Per-size storage of the chained scan.
pub(crate) struct CsdlScratch {
    bump: DeviceBuffer,
    lookback: LookbackTable,
}

impl CsdlScratch {
    pub(crate) fn bytes_for(partitions: usize) -> u64 {
        DeviceBuffer::bytes_for(1) + LookbackTable::bytes_for(partitions, 1)
    }

    pub(crate) fn allocate(device: &Device, partitions: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            bump: device.alloc_buffer("csdl-bump", 1, BufferUsage::DeviceLocal)?,
            lookback: device.alloc_lookback_table("csdl-lookback", partitions, 1)?,
        })
    }
}

struct InitChainedScan {
    bump: DeviceBuffer,
    lookback: LookbackTable,
}

impl Kernel for InitChainedScan {
    fn name(&self) -> &'static str {
        "InitChainedScan"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.bump), Binding::write(&self.lookback)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let g = group.logical_index() as usize;
        if g == 0 {
            self.bump.store(0, 0);
        }
        self.lookback.reset_range(g * INIT_CHUNK, INIT_CHUNK);
    }
}

struct ChainedScan {
    scan_in: DeviceBuffer,
    scan_out: DeviceBuffer,
    bump: DeviceBuffer,
    lookback: LookbackTable,
    partition_size: usize,
    kind: ScanKind,
}

impl Kernel for ChainedScan {
    fn name(&self) -> &'static str {
        match self.kind {
            ScanKind::Inclusive => "ChainedScanInclusive",
            ScanKind::Exclusive => "ChainedScanExclusive",
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read(&self.scan_in),
            Binding::write(&self.scan_out),
            Binding::atomic(&self.bump),
            Binding::atomic(&self.lookback),
        ]
    }

    fn execute_group(&self, group: &GroupContext) {
        // Partition order follows the bump counter, not the physical group id.
        let p = claim_partition(&self.bump, 0);
        if p >= group.constants.thread_blocks {
            return;
        }
        let p = p as usize;
        let layout = PartitionLayout::new(group.constants.size as usize, self.partition_size);
        let range = layout.range(p);
        let aggregate = reduce_tile(&self.scan_in, range.clone());
        let prefix = self.lookback.resolve(p, aggregate);
        scan_tile(&self.scan_in, &self.scan_out, range, prefix, self.kind);
    }
}

pub(crate) fn encode(
    cmd: &mut CommandList,
    io: &ScanIo<'_>,
    scratch: &CsdlScratch,
    kind: ScanKind,
) -> Result<(), DeviceError> {
    let slots = scratch.lookback.slot_count();
    let init_groups = slots.div_ceil(INIT_CHUNK).max(1) as u32;
    cmd.dispatch_tiled(
        Arc::new(InitChainedScan {
            bump: scratch.bump.clone(),
            lookback: scratch.lookback.clone(),
        }),
        io.max_dim,
        DispatchConstants::new(slots as u32, init_groups),
    )?;
    cmd.barrier(&scratch.bump);
    cmd.barrier(&scratch.lookback);

    cmd.dispatch_tiled(
        Arc::new(ChainedScan {
            scan_in: io.scan_in.clone(),
            scan_out: io.scan_out.clone(),
            bump: scratch.bump.clone(),
            lookback: scratch.lookback.clone(),
            partition_size: io.partition_size,
            kind,
        }),
        io.max_dim,
        DispatchConstants::new(io.size, io.partitions),
    )?;
    cmd.barrier(io.scan_out);
    Ok(())
}
