//! DeviceRadixSort: upsweep, scan and downsweep per digit.
//!
//! Per pass:
//!
//! - `Upsweep` writes each partition's digit counts to the pass histogram
//!   (`[digit * partitions + partition]`) and atomically adds them to the
//!   global histogram.
//! - `Scan` runs 257 groups. Groups `0..256` turn one digit's column of the
//!   pass histogram into exclusive offsets across partitions; group 256 turns
//!   the pass's global counts into digit base offsets.
//! - `Downsweep` scatters each tile to `base[d] + column[d][p] + rank`.
//!
//! Nothing spins, so this is the strategy of choice on devices without
//! forward-progress guarantees.

use std::sync::Arc;

use sweep_primitives::{
    Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceError, DispatchConstants,
    GridSize, GroupContext, Kernel, PartitionLayout,
};

use crate::buffers::{exclusive_offsets, tile_histogram, PassBuffers};
use crate::keys::{KeyTransform, RADIX, RADIX_LOG, RADIX_PASSES};
use crate::SortJob;

/// Per-size storage of DeviceRadixSort.
pub(crate) struct DrsScratch {
    pass_hist: DeviceBuffer,
}

impl DrsScratch {
    pub(crate) fn bytes_for(partitions: usize) -> u64 {
        DeviceBuffer::bytes_for(RADIX * partitions)
    }

    pub(crate) fn allocate(device: &Device, partitions: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            pass_hist: device.alloc_buffer("pass-hist", RADIX * partitions, BufferUsage::DeviceLocal)?,
        })
    }
}

/// Zero the global histogram before the first pass.
pub(crate) struct ClearGlobalHist {
    pub(crate) global_hist: DeviceBuffer,
}

impl Kernel for ClearGlobalHist {
    fn name(&self) -> &'static str {
        "ClearGlobalHist"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.global_hist)]
    }

    fn execute_group(&self, _group: &GroupContext) {
        self.global_hist.fill(0, self.global_hist.len(), 0);
    }
}

struct Upsweep {
    keys: DeviceBuffer,
    pass_hist: DeviceBuffer,
    global_hist: DeviceBuffer,
    transform: KeyTransform,
    partition_size: usize,
}

impl Kernel for Upsweep {
    fn name(&self) -> &'static str {
        "Upsweep"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read(&self.keys),
            Binding::write(&self.pass_hist),
            Binding::atomic(&self.global_hist),
        ]
    }

    fn execute_group(&self, group: &GroupContext) {
        let c = group.constants;
        let p = group.logical_index() as usize;
        let partitions = c.thread_blocks as usize;
        if p >= partitions {
            return;
        }
        let layout = PartitionLayout::new(c.size as usize, self.partition_size);
        let hist = tile_histogram(&self.keys, layout.range(p), self.transform, c.radix_shift);
        let pass = (c.radix_shift / RADIX_LOG) as usize;
        for (d, &count) in hist.iter().enumerate() {
            self.pass_hist.store(d * partitions + p, count);
            if count > 0 {
                self.global_hist.fetch_add(pass * RADIX + d, count);
            }
        }
    }
}

struct Scan {
    pass_hist: DeviceBuffer,
    global_hist: DeviceBuffer,
    global_offsets: DeviceBuffer,
}

impl Kernel for Scan {
    fn name(&self) -> &'static str {
        "Scan"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::read_write(&self.pass_hist),
            Binding::read(&self.global_hist),
            Binding::write(&self.global_offsets),
        ]
    }

    fn execute_group(&self, group: &GroupContext) {
        let c = group.constants;
        let g = group.logical_index() as usize;
        let partitions = c.thread_blocks as usize;
        if g < RADIX {
            let column = g * partitions;
            let mut running = 0u32;
            for i in column..column + partitions {
                let count = self.pass_hist.load(i);
                self.pass_hist.store(i, running);
                running = running.wrapping_add(count);
            }
        } else {
            let base = (c.radix_shift / RADIX_LOG) as usize * RADIX;
            let mut offsets = [0u32; RADIX];
            exclusive_offsets((base..base + RADIX).map(|i| self.global_hist.load(i)), &mut offsets);
            for (d, &offset) in offsets.iter().enumerate() {
                self.global_offsets.store(base + d, offset);
            }
        }
    }
}

struct Downsweep {
    io: PassBuffers,
    pass_hist: DeviceBuffer,
    global_offsets: DeviceBuffer,
    transform: KeyTransform,
    partition_size: usize,
}

impl Kernel for Downsweep {
    fn name(&self) -> &'static str {
        "Downsweep"
    }

    fn bindings(&self) -> Vec<Binding> {
        let mut bindings = self.io.scatter_bindings();
        bindings.push(Binding::read(&self.pass_hist));
        bindings.push(Binding::read(&self.global_offsets));
        bindings
    }

    fn execute_group(&self, group: &GroupContext) {
        let c = group.constants;
        let p = group.logical_index() as usize;
        let partitions = c.thread_blocks as usize;
        if p >= partitions {
            return;
        }
        let base = (c.radix_shift / RADIX_LOG) as usize * RADIX;
        let mut offsets = [0u32; RADIX];
        for (d, offset) in offsets.iter_mut().enumerate() {
            *offset = self
                .global_offsets
                .load(base + d)
                .wrapping_add(self.pass_hist.load(d * partitions + p));
        }
        let layout = PartitionLayout::new(c.size as usize, self.partition_size);
        self.io
            .scatter_tile(layout.range(p), self.transform, c.radix_shift, &mut offsets);
    }
}

/// Run every digit pass of the key type. Each pass is one submission; the host waits for it
/// before swapping buffer roles and encoding the next.
pub(crate) fn sort(job: &mut SortJob<'_>, scratch: &DrsScratch) -> Result<(), DeviceError> {
    let device = job.device;
    let max_dim = device.max_dispatch_dimension();

    let mut cmd = CommandList::new("drs-init");
    cmd.dispatch(
        Arc::new(ClearGlobalHist {
            global_hist: job.global_hist.clone(),
        }),
        GridSize::linear(1),
        DispatchConstants::new(0, 1),
    );
    device.submit(cmd)?;

    for pass in 0..job.transform.passes() {
        let shift = pass as u32 * RADIX_LOG;
        let constants = DispatchConstants::new(job.num_keys, job.partitions).with_radix_shift(shift);
        let io = job.buffers.pass();

        let mut cmd = CommandList::new("drs-pass");
        cmd.dispatch_tiled(
            Arc::new(Upsweep {
                keys: io.keys.clone(),
                pass_hist: scratch.pass_hist.clone(),
                global_hist: job.global_hist.clone(),
                transform: job.transform,
                partition_size: job.partition_size,
            }),
            max_dim,
            constants,
        )?;
        cmd.barrier(&scratch.pass_hist);
        cmd.barrier(job.global_hist);

        cmd.dispatch(
            Arc::new(Scan {
                pass_hist: scratch.pass_hist.clone(),
                global_hist: job.global_hist.clone(),
                global_offsets: job.global_offsets.clone(),
            }),
            GridSize::linear(RADIX as u32 + 1),
            constants,
        );
        cmd.barrier(&scratch.pass_hist);
        cmd.barrier(job.global_offsets);

        cmd.dispatch_tiled(
            Arc::new(Downsweep {
                io: io.clone(),
                pass_hist: scratch.pass_hist.clone(),
                global_offsets: job.global_offsets.clone(),
                transform: job.transform,
                partition_size: job.partition_size,
            }),
            max_dim,
            constants,
        )?;
        io.barrier_outputs(&mut cmd);

        device.submit(cmd)?;
        job.buffers.swap();
    }
    Ok(())
}

/// Check the cross-partition digit scan in isolation: give every digit
/// column `size` partitions holding one element each, run `Scan`, and expect
/// offset `i` at partition `i` of every column.
pub fn validate_digit_scan(device: &Device, size: u32) -> Result<bool, DeviceError> {
    if size == 0 {
        return Ok(true);
    }
    let words = RADIX * size as usize;
    let pass_hist = device.alloc_buffer_with_data("scan-test-hist", &vec![1; words], BufferUsage::DeviceLocal)?;
    let global_hist = device.alloc_buffer("scan-test-global", RADIX * RADIX_PASSES, BufferUsage::DeviceLocal)?;
    let global_offsets = device.alloc_buffer("scan-test-offsets", RADIX * RADIX_PASSES, BufferUsage::DeviceLocal)?;
    let staging = device.alloc_buffer("scan-test-readback", words.min(crate::MAX_READ_BACK), BufferUsage::HostReadable)?;

    let mut cmd = CommandList::new("drs-scan-test");
    cmd.dispatch(
        Arc::new(Scan {
            pass_hist: pass_hist.clone(),
            global_hist,
            global_offsets,
        }),
        GridSize::linear(RADIX as u32 + 1),
        DispatchConstants::new(0, size),
    );
    cmd.barrier(&pass_hist);
    device.submit(cmd)?;

    let out = device.read_buffer(&staging, &pass_hist, 0, words)?;
    let mismatch = out
        .iter()
        .enumerate()
        .find(|&(i, &v)| v != (i % size as usize) as u32);
    if let Some((i, &v)) = mismatch {
        log::warn!(
            "digit scan of {size} partitions failed at digit {} partition {}: got {v}",
            i / size as usize,
            i % size as usize
        );
        return Ok(false);
    }
    Ok(true)
}
