//! OneSweep: one histogram dispatch for all digits, then one fused binning
//! dispatch per digit.
//!
//! `GlobalHist` counts every digit of every key at once (four for 32-bit
//! keys, eight for 64-bit ones) and `GlobalScan` turns the counts into one
//! digit-offset table per pass. Each pass then claims
//! partitions from its own bump counter, publishes the tile's 256 digit
//! counts through the lookback table and scatters as soon as every digit's
//! exclusive prefix across lower partitions is resolved.

use std::sync::Arc;

use sweep_primitives::{
    claim_partition, Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceError,
    DispatchConstants, GridSize, GroupContext, Kernel, LookbackTable, PartitionLayout,
};

use crate::buffers::{exclusive_offsets, tile_histogram, PassBuffers};
use crate::buffers::load_element;
use crate::keys::{KeyTransform, MAX_RADIX_PASSES, RADIX, RADIX_LOG, RADIX_MASK};
use crate::SortJob;

/// Partitions whose lookback lanes one init group clears.
const INIT_PARTITIONS: usize = 16;

/// Per-size storage of OneSweep.
pub(crate) struct OneSweepScratch {
    lookback: LookbackTable,
    bump: DeviceBuffer,
}

impl OneSweepScratch {
    pub(crate) fn bytes_for(partitions: usize) -> u64 {
        LookbackTable::bytes_for(partitions, RADIX) + DeviceBuffer::bytes_for(MAX_RADIX_PASSES)
    }

    pub(crate) fn allocate(device: &Device, partitions: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            lookback: device.alloc_lookback_table("onesweep-lookback", partitions, RADIX)?,
            bump: device.alloc_buffer("onesweep-bump", MAX_RADIX_PASSES, BufferUsage::DeviceLocal)?,
        })
    }
}

struct InitSweep {
    global_hist: DeviceBuffer,
}

impl Kernel for InitSweep {
    fn name(&self) -> &'static str {
        "InitSweep"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.global_hist)]
    }

    fn execute_group(&self, _group: &GroupContext) {
        self.global_hist.fill(0, self.global_hist.len(), 0);
    }
}

struct GlobalHist {
    keys: DeviceBuffer,
    global_hist: DeviceBuffer,
    transform: KeyTransform,
    partition_size: usize,
}

impl Kernel for GlobalHist {
    fn name(&self) -> &'static str {
        "GlobalHist"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::read(&self.keys), Binding::atomic(&self.global_hist)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let c = group.constants;
        let p = group.logical_index() as usize;
        if p >= c.thread_blocks as usize {
            return;
        }
        let layout = PartitionLayout::new(c.size as usize, self.partition_size);
        let words = self.transform.key_type.words();
        let mut hist = [[0u32; RADIX]; MAX_RADIX_PASSES];
        let hist = &mut hist[..self.transform.passes()];
        for i in layout.range(p) {
            let bits = self.transform.radix(load_element(&self.keys, i, words));
            for (pass, counts) in hist.iter_mut().enumerate() {
                counts[((bits >> (pass as u32 * RADIX_LOG)) & RADIX_MASK as u64) as usize] += 1;
            }
        }
        for (pass, counts) in hist.iter().enumerate() {
            for (d, &count) in counts.iter().enumerate() {
                if count > 0 {
                    self.global_hist.fetch_add(pass * RADIX + d, count);
                }
            }
        }
    }
}

/// One group per pass: global counts to digit base offsets.
struct GlobalScan {
    global_hist: DeviceBuffer,
    global_offsets: DeviceBuffer,
}

impl Kernel for GlobalScan {
    fn name(&self) -> &'static str {
        "GlobalScan"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::read(&self.global_hist), Binding::write(&self.global_offsets)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let base = group.logical_index() as usize * RADIX;
        let mut offsets = [0u32; RADIX];
        exclusive_offsets((base..base + RADIX).map(|i| self.global_hist.load(i)), &mut offsets);
        for (d, &offset) in offsets.iter().enumerate() {
            self.global_offsets.store(base + d, offset);
        }
    }
}

/// Reset the lookback table and this pass's bump counter.
struct InitPass {
    lookback: LookbackTable,
    bump: DeviceBuffer,
}

impl Kernel for InitPass {
    fn name(&self) -> &'static str {
        "InitPass"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.lookback), Binding::write(&self.bump)]
    }

    fn execute_group(&self, group: &GroupContext) {
        let g = group.logical_index() as usize;
        if g == 0 {
            let pass = (group.constants.radix_shift / RADIX_LOG) as usize;
            self.bump.store(pass, 0);
        }
        let chunk = INIT_PARTITIONS * RADIX;
        self.lookback.reset_range(g * chunk, chunk);
    }
}

struct DigitBinningPass {
    io: PassBuffers,
    global_offsets: DeviceBuffer,
    lookback: LookbackTable,
    bump: DeviceBuffer,
    transform: KeyTransform,
    partition_size: usize,
}

impl Kernel for DigitBinningPass {
    fn name(&self) -> &'static str {
        "DigitBinningPass"
    }

    fn bindings(&self) -> Vec<Binding> {
        let mut bindings = self.io.scatter_bindings();
        bindings.push(Binding::read(&self.global_offsets));
        bindings.push(Binding::atomic(&self.bump));
        bindings.push(Binding::atomic(&self.lookback));
        bindings
    }

    fn execute_group(&self, group: &GroupContext) {
        let c = group.constants;
        let pass = (c.radix_shift / RADIX_LOG) as usize;
        let p = claim_partition(&self.bump, pass);
        if p >= c.thread_blocks {
            return;
        }
        let p = p as usize;
        let layout = PartitionLayout::new(c.size as usize, self.partition_size);
        let range = layout.range(p);
        let hist = tile_histogram(&self.io.keys, range.clone(), self.transform, c.radix_shift);
        let prefixes = self.lookback.resolve_lanes(p, &hist);

        let mut offsets = [0u32; RADIX];
        for (d, offset) in offsets.iter_mut().enumerate() {
            *offset = self
                .global_offsets
                .load(pass * RADIX + d)
                .wrapping_add(prefixes[d]);
        }
        self.io
            .scatter_tile(range, self.transform, c.radix_shift, &mut offsets);
    }
}

pub(crate) fn sort(job: &mut SortJob<'_>, scratch: &OneSweepScratch) -> Result<(), DeviceError> {
    let device = job.device;
    let max_dim = device.max_dispatch_dimension();
    let constants = DispatchConstants::new(job.num_keys, job.partitions);
    let passes = job.transform.passes();

    let mut cmd = CommandList::new("onesweep-hist");
    cmd.dispatch(
        Arc::new(InitSweep {
            global_hist: job.global_hist.clone(),
        }),
        GridSize::linear(1),
        DispatchConstants::new(0, 1),
    );
    cmd.barrier(job.global_hist);
    cmd.dispatch_tiled(
        Arc::new(GlobalHist {
            keys: job.buffers.keys.current().clone(),
            global_hist: job.global_hist.clone(),
            transform: job.transform,
            partition_size: job.partition_size,
        }),
        max_dim,
        constants,
    )?;
    cmd.barrier(job.global_hist);
    cmd.dispatch(
        Arc::new(GlobalScan {
            global_hist: job.global_hist.clone(),
            global_offsets: job.global_offsets.clone(),
        }),
        GridSize::linear(passes as u32),
        DispatchConstants::new(0, passes as u32),
    );
    cmd.barrier(job.global_offsets);
    device.submit(cmd)?;

    let init_groups = (job.partitions as usize).div_ceil(INIT_PARTITIONS).max(1) as u32;
    for pass in 0..passes {
        let shift = pass as u32 * RADIX_LOG;
        let io = job.buffers.pass();

        let mut cmd = CommandList::new("onesweep-pass");
        cmd.dispatch_tiled(
            Arc::new(InitPass {
                lookback: scratch.lookback.clone(),
                bump: scratch.bump.clone(),
            }),
            max_dim,
            DispatchConstants::new(0, init_groups).with_radix_shift(shift),
        )?;
        cmd.barrier(&scratch.lookback);
        cmd.barrier(&scratch.bump);
        cmd.dispatch_tiled(
            Arc::new(DigitBinningPass {
                io: io.clone(),
                global_offsets: job.global_offsets.clone(),
                lookback: scratch.lookback.clone(),
                bump: scratch.bump.clone(),
                transform: job.transform,
                partition_size: job.partition_size,
            }),
            max_dim,
            constants.with_radix_shift(shift),
        )?;
        io.barrier_outputs(&mut cmd);

        device.submit(cmd)?;
        job.buffers.swap();
    }
    Ok(())
}
