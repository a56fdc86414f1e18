//! Software compute device: kernels, command lists and submission.
//!
//! A dispatch launches a grid of independent groups. Each group runs a
//! [`Kernel`] to completion on one worker of the device's thread pool.
//! Dispatches in a command list execute in recording order and `submit`
//! returns once the whole list has finished, which is the host's only
//! synchronization point.
//!
//! Kernels declare their buffer bindings. Before anything runs, submission
//! checks that every read of a resource written earlier in the same list is
//! preceded by a `barrier` on that resource.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::buffer::{BufferUsage, DeviceBuffer, MemoryLedger, Resource, ResourceId};
use crate::dispatch::{logical_group_index, plan_dispatch, GridSize, MAX_DISPATCH_DIMENSION};
use crate::hardware::DeviceInfo;
use crate::lookback::LookbackTable;
use crate::types::DispatchConstants;

/// Errors raised by the device layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to start compute workers: {0}")]
    Initialization(String),

    #[error("insufficient device memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("dispatch of {thread_blocks} groups exceeds a {max_dim}x{max_dim} grid")]
    DispatchTooLarge { thread_blocks: u32, max_dim: u32 },

    #[error("missing barrier: kernel '{kernel}' reads '{resource}' before prior writes are visible")]
    MissingBarrier { kernel: String, resource: String },

    #[error("buffer '{label}' access out of range: offset {offset} + count {count} > length {len}")]
    OutOfRange {
        label: String,
        offset: usize,
        count: usize,
        len: usize,
    },

    #[error("buffer '{label}' is not host-readable")]
    NotHostReadable { label: String },
}

/// How a kernel touches a bound resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
    /// Device-wide atomic read-modify-write. Overlapping atomic accesses
    /// need no barrier between them.
    Atomic,
}

/// One resource binding of a kernel.
#[derive(Debug, Clone)]
pub struct Binding {
    pub resource: ResourceId,
    pub label: String,
    pub access: Access,
}

impl Binding {
    pub fn new(resource: &impl Resource, access: Access) -> Self {
        Self {
            resource: resource.resource_id(),
            label: resource.label().to_string(),
            access,
        }
    }

    pub fn read(resource: &impl Resource) -> Self {
        Self::new(resource, Access::Read)
    }

    pub fn write(resource: &impl Resource) -> Self {
        Self::new(resource, Access::Write)
    }

    pub fn read_write(resource: &impl Resource) -> Self {
        Self::new(resource, Access::ReadWrite)
    }

    pub fn atomic(resource: &impl Resource) -> Self {
        Self::new(resource, Access::Atomic)
    }
}

/// Identity of the group currently executing.
#[derive(Debug, Clone, Copy)]
pub struct GroupContext {
    pub group_id: [u32; 3],
    pub grid: GridSize,
    pub constants: DispatchConstants,
    pub max_dim: u32,
}

impl GroupContext {
    /// Logical group index, accounting for large-dispatch tiling.
    pub fn logical_index(&self) -> u32 {
        logical_group_index(self.group_id, self.constants.tile_mode(), self.max_dim)
    }
}

/// Per-group program executed by a dispatch.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn bindings(&self) -> Vec<Binding>;

    fn execute_group(&self, group: &GroupContext);
}

enum Command {
    Dispatch {
        kernel: Arc<dyn Kernel>,
        grid: GridSize,
        constants: DispatchConstants,
    },
    Barrier {
        resource: ResourceId,
    },
    Copy {
        src: DeviceBuffer,
        src_offset: usize,
        dst: DeviceBuffer,
        dst_offset: usize,
        count: usize,
    },
}

/// Ordered list of dispatches, barriers and copies.
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Record one launch of `grid` groups.
    pub fn dispatch(&mut self, kernel: Arc<dyn Kernel>, grid: GridSize, constants: DispatchConstants) {
        self.commands.push(Command::Dispatch {
            kernel,
            grid,
            constants,
        });
    }

    /// Record `constants.thread_blocks` logical groups, split into at most
    /// two launches when the count exceeds `max_dim`. Returns the number of
    /// launches recorded.
    pub fn dispatch_tiled(
        &mut self,
        kernel: Arc<dyn Kernel>,
        max_dim: u32,
        constants: DispatchConstants,
    ) -> Result<usize, DeviceError> {
        let thread_blocks = constants.thread_blocks;
        let plan = plan_dispatch(thread_blocks, max_dim);
        if let Some(first) = plan.first() {
            if first.grid.y > max_dim {
                return Err(DeviceError::DispatchTooLarge {
                    thread_blocks,
                    max_dim,
                });
            }
        }
        let launches = plan.len();
        for tile in plan {
            self.dispatch(
                Arc::clone(&kernel),
                tile.grid,
                constants.with_tile_mode(tile.mode),
            );
        }
        Ok(launches)
    }

    /// Make prior writes to `resource` visible to later commands.
    pub fn barrier(&mut self, resource: &impl Resource) {
        self.commands.push(Command::Barrier {
            resource: resource.resource_id(),
        });
    }

    /// Record a device-side copy of `count` words.
    pub fn copy_buffer(
        &mut self,
        src: &DeviceBuffer,
        src_offset: usize,
        dst: &DeviceBuffer,
        dst_offset: usize,
        count: usize,
    ) {
        self.commands.push(Command::Copy {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            count,
        });
    }

    /// Reject lists that read a resource written earlier without a barrier.
    fn check_hazards(&self) -> Result<(), DeviceError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Dirty {
            Plain,
            Atomic,
        }

        let mut dirty: HashMap<ResourceId, Dirty> = HashMap::new();
        let missing = |kernel: &str, resource: &str| DeviceError::MissingBarrier {
            kernel: kernel.to_string(),
            resource: resource.to_string(),
        };

        for command in &self.commands {
            match command {
                Command::Dispatch { kernel, .. } => {
                    let bindings = kernel.bindings();
                    for b in &bindings {
                        let conflict = match (b.access, dirty.get(&b.resource)) {
                            (Access::Read | Access::ReadWrite, Some(_)) => true,
                            (Access::Atomic, Some(Dirty::Plain)) => true,
                            _ => false,
                        };
                        if conflict {
                            return Err(missing(kernel.name(), &b.label));
                        }
                    }
                    for b in &bindings {
                        match b.access {
                            Access::Write | Access::ReadWrite => {
                                dirty.insert(b.resource, Dirty::Plain);
                            }
                            Access::Atomic => {
                                dirty.entry(b.resource).or_insert(Dirty::Atomic);
                            }
                            Access::Read => {}
                        }
                    }
                }
                Command::Barrier { resource } => {
                    dirty.remove(resource);
                }
                Command::Copy { src, dst, .. } => {
                    if dirty.contains_key(&src.resource_id()) {
                        return Err(missing("copy", src.label()));
                    }
                    dirty.insert(dst.resource_id(), Dirty::Plain);
                }
            }
        }
        Ok(())
    }
}

/// Order in which the groups of one launch are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Groups run concurrently on the worker pool.
    #[default]
    Parallel,
    /// Groups run one at a time in physical order.
    Serial,
    /// Groups run one at a time, last physical group first.
    SerialReversed,
}

/// Launch and memory limits of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_dispatch_dimension: u32,
    pub max_group_size: u32,
    pub memory_budget_bytes: u64,
}

impl DeviceLimits {
    pub fn for_device(info: &DeviceInfo) -> Self {
        Self {
            max_dispatch_dimension: MAX_DISPATCH_DIMENSION,
            max_group_size: 1024,
            memory_budget_bytes: info.total_memory_bytes(),
        }
    }
}

/// Construction parameters for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub info: DeviceInfo,
    pub limits: DeviceLimits,
    pub mode: ExecutionMode,
    /// Worker threads; defaults to the host's available parallelism.
    pub workers: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let info = DeviceInfo::detect();
        let limits = DeviceLimits::for_device(&info);
        Self {
            info,
            limits,
            mode: ExecutionMode::Parallel,
            workers: None,
        }
    }
}

impl DeviceConfig {
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.limits.memory_budget_bytes = info.total_memory_bytes();
        self.info = info;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub fn with_max_dispatch_dimension(mut self, max_dim: u32) -> Self {
        self.limits.max_dispatch_dimension = max_dim.max(1);
        self
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.limits.memory_budget_bytes = bytes;
        self
    }
}

/// A compute device with its own worker pool and memory budget.
pub struct Device {
    info: DeviceInfo,
    limits: DeviceLimits,
    mode: ExecutionMode,
    pool: rayon::ThreadPool,
    memory: Arc<MemoryLedger>,
}

impl Device {
    /// Create the default device for this host.
    pub fn new() -> Result<Self, DeviceError> {
        Self::with_config(DeviceConfig::default())
    }

    pub fn with_config(config: DeviceConfig) -> Result<Self, DeviceError> {
        let workers = config
            .workers
            .unwrap_or_else(|| rayon::current_num_threads().max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sweep-group-{i}"))
            .build()
            .map_err(|e| DeviceError::Initialization(e.to_string()))?;

        log::debug!(
            "created device '{}' ({} workers, {:?}, max dispatch {}, budget {} bytes)",
            config.info.description,
            workers,
            config.mode,
            config.limits.max_dispatch_dimension,
            config.limits.memory_budget_bytes
        );

        Ok(Self {
            memory: Arc::new(MemoryLedger::new(config.limits.memory_budget_bytes)),
            info: config.info,
            limits: config.limits,
            mode: config.mode,
            pool,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Threads in the worker pool.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn max_dispatch_dimension(&self) -> u32 {
        self.limits.max_dispatch_dimension
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.memory.allocated()
    }

    pub fn peak_bytes(&self) -> u64 {
        self.memory.peak()
    }

    pub fn available_bytes(&self) -> u64 {
        self.memory.available()
    }

    pub fn memory_budget(&self) -> u64 {
        self.memory.budget()
    }

    /// Allocate a zeroed buffer of `words` 32-bit words.
    pub fn alloc_buffer(
        &self,
        label: &str,
        words: usize,
        usage: BufferUsage,
    ) -> Result<DeviceBuffer, DeviceError> {
        let reservation = self.memory.reserve(DeviceBuffer::bytes_for(words))?;
        log::trace!("alloc '{label}': {words} words ({usage:?})");
        Ok(DeviceBuffer::new(label, words, usage, reservation))
    }

    /// Allocate a buffer initialised with `data`.
    pub fn alloc_buffer_with_data(
        &self,
        label: &str,
        data: &[u32],
        usage: BufferUsage,
    ) -> Result<DeviceBuffer, DeviceError> {
        let buffer = self.alloc_buffer(label, data.len(), usage)?;
        buffer.write_words(0, data)?;
        Ok(buffer)
    }

    /// Allocate a lookback table with every slot `NotReady`.
    pub fn alloc_lookback_table(
        &self,
        label: &str,
        partitions: usize,
        lanes: usize,
    ) -> Result<LookbackTable, DeviceError> {
        let reservation = self
            .memory
            .reserve(LookbackTable::bytes_for(partitions, lanes))?;
        Ok(LookbackTable::new(label, partitions, lanes, reservation))
    }

    /// Host upload into any buffer.
    pub fn write_buffer(&self, buffer: &DeviceBuffer, offset: usize, data: &[u32]) -> Result<(), DeviceError> {
        buffer.write_words(offset, data)
    }

    /// Copy out of a host-readable buffer.
    pub fn copy_to_host(
        &self,
        buffer: &DeviceBuffer,
        offset: usize,
        count: usize,
    ) -> Result<Vec<u32>, DeviceError> {
        if buffer.usage() != BufferUsage::HostReadable {
            return Err(DeviceError::NotHostReadable {
                label: buffer.label().to_string(),
            });
        }
        buffer.read_words(offset, count)
    }

    /// Read `count` words of a device-local buffer through `staging`,
    /// one staging-sized chunk per submission.
    pub fn read_buffer(
        &self,
        staging: &DeviceBuffer,
        src: &DeviceBuffer,
        offset: usize,
        count: usize,
    ) -> Result<Vec<u32>, DeviceError> {
        src.check_range(offset, count)?;
        if count > 0 && staging.is_empty() {
            return Err(DeviceError::OutOfRange {
                label: staging.label().to_string(),
                offset: 0,
                count,
                len: 0,
            });
        }
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let chunk = (count - out.len()).min(staging.len());
            let mut cmd = CommandList::new("readback");
            cmd.copy_buffer(src, offset + out.len(), staging, 0, chunk);
            self.submit(cmd)?;
            out.extend(self.copy_to_host(staging, 0, chunk)?);
        }
        Ok(out)
    }

    /// Execute a command list and wait for it to finish.
    pub fn submit(&self, list: CommandList) -> Result<(), DeviceError> {
        list.check_hazards()?;
        log::trace!("submit '{}' ({} commands)", list.label, list.commands.len());
        for command in list.commands {
            match command {
                Command::Dispatch {
                    kernel,
                    grid,
                    constants,
                } => self.run_dispatch(kernel.as_ref(), grid, constants),
                Command::Barrier { .. } => {}
                Command::Copy {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    count,
                } => {
                    let words = src.read_words(src_offset, count)?;
                    dst.write_words(dst_offset, &words)?;
                }
            }
        }
        Ok(())
    }

    fn run_dispatch(&self, kernel: &dyn Kernel, grid: GridSize, constants: DispatchConstants) {
        let total = grid.group_count();
        if total == 0 {
            return;
        }
        log::trace!(
            "dispatch {} ({}, {}, {}) tiling {:?}",
            kernel.name(),
            grid.x,
            grid.y,
            grid.z,
            constants.tile_mode()
        );

        let max_dim = self.limits.max_dispatch_dimension;
        let run = |flat: u64| {
            kernel.execute_group(&GroupContext {
                group_id: grid.unflatten(flat),
                grid,
                constants,
                max_dim,
            })
        };

        match self.mode {
            ExecutionMode::Parallel => self
                .pool
                .install(|| (0..total).into_par_iter().for_each(run)),
            ExecutionMode::Serial => (0..total).for_each(run),
            ExecutionMode::SerialReversed => (0..total).rev().for_each(run),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("limits", &self.limits)
            .field("mode", &self.mode)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}
