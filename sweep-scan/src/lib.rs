//! Partitioned prefix sums over 32-bit unsigned values.
//!
//! [`PrefixSum`] owns the device buffers for one input size and runs either
//! strategy:
//!
//! - [`ScanStrategy::ReduceThenScan`]: reduce, scan the partition sums in a
//!   single group, propagate. Only needs barriers between dispatches.
//! - [`ScanStrategy::ChainedScanDecoupledLookback`]: one dispatch in which
//!   every partition resolves its prefix from its predecessors through the
//!   decoupled lookback table. Requires wave intrinsics and forward progress
//!   across groups.
//!
//! Sums wrap modulo 2^32.

mod csdl;
mod rts;
mod tile;

use std::fmt;
use std::sync::Arc;

use sweep_primitives::{
    BufferUsage, CommandList, Device, DeviceBuffer, DeviceError, DeviceInfo, KernelFamily,
    KernelVariant, PartitionLayout, Tuner, TuningError, TuningParameters,
};

use crate::csdl::CsdlScratch;
use crate::rts::RtsScratch;

/// Largest chunk moved through the host-readable staging buffer at once.
pub const MAX_READ_BACK: usize = 1 << 13;

/// Errors returned by [`PrefixSum`].
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Tuning(#[from] TuningError),

    #[error("{strategy} unavailable on this device: {reason}")]
    EngineUnavailable {
        strategy: ScanStrategy,
        reason: &'static str,
    },

    #[error("insufficient device memory for {size} elements: need {required} bytes, {available} available")]
    Capacity {
        size: usize,
        required: u64,
        available: u64,
    },

    #[error("input of {0} elements exceeds 32-bit addressing")]
    SizeTooLarge(usize),

    #[error("scan buffers not allocated; call update_size first")]
    NotSized,
}

/// Inclusive or exclusive prefix sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Inclusive,
    Exclusive,
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::Inclusive => write!(f, "inclusive"),
            ScanKind::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// How partitions learn the sum of everything before them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    ReduceThenScan,
    ChainedScanDecoupledLookback,
}

impl ScanStrategy {
    /// The fastest strategy the device can run.
    pub fn preferred(info: &DeviceInfo) -> Self {
        if info.supports_lookback_strategies() {
            ScanStrategy::ChainedScanDecoupledLookback
        } else {
            ScanStrategy::ReduceThenScan
        }
    }

    pub fn check_supported(self, info: &DeviceInfo) -> Result<(), ScanError> {
        let reason = match self {
            ScanStrategy::ReduceThenScan => info.barrier_unavailable_reason(),
            ScanStrategy::ChainedScanDecoupledLookback => info.lookback_unavailable_reason(),
        };
        match reason {
            Some(reason) => Err(ScanError::EngineUnavailable {
                strategy: self,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStrategy::ReduceThenScan => write!(f, "ReduceThenScan"),
            ScanStrategy::ChainedScanDecoupledLookback => write!(f, "ChainedScanDecoupledLookback"),
        }
    }
}

/// Strategy-specific storage, sized with the input.
enum Scratch {
    Rts(RtsScratch),
    Csdl(CsdlScratch),
}

/// Buffers and sizing handed to a strategy's encoder.
pub(crate) struct ScanIo<'a> {
    pub scan_in: &'a DeviceBuffer,
    pub scan_out: &'a DeviceBuffer,
    pub size: u32,
    pub partitions: u32,
    pub partition_size: usize,
    pub max_dim: u32,
}

struct ScanBuffers {
    scan_in: DeviceBuffer,
    scan_out: DeviceBuffer,
    staging: DeviceBuffer,
    scratch: Scratch,
}

/// Prefix-sum engine bound to one device and one strategy.
pub struct PrefixSum {
    device: Arc<Device>,
    strategy: ScanStrategy,
    tuning: TuningParameters,
    variant: KernelVariant,
    size: usize,
    buffers: Option<ScanBuffers>,
}

impl PrefixSum {
    /// Engine with the device's default scan tuning.
    pub fn new(device: Arc<Device>, strategy: ScanStrategy) -> Result<Self, ScanError> {
        let tuning = Tuner::scan_parameters(device.info());
        Self::with_tuning(device, strategy, tuning)
    }

    pub fn with_tuning(
        device: Arc<Device>,
        strategy: ScanStrategy,
        tuning: TuningParameters,
    ) -> Result<Self, ScanError> {
        strategy.check_supported(device.info())?;
        tuning.validate(device.limits().max_group_size)?;
        let variant = tuning.variant(KernelFamily::Scan);
        log::debug!(
            "prefix sum: {} with partition size {} ({} threads x {} keys, {} kernels)",
            strategy,
            tuning.partition_size,
            tuning.threads_per_group,
            tuning.keys_per_lane,
            variant
        );
        Ok(Self {
            device,
            strategy,
            tuning,
            variant,
            size: 0,
            buffers: None,
        })
    }

    /// Engine running the fastest strategy the device supports.
    pub fn select(device: Arc<Device>) -> Result<Self, ScanError> {
        let strategy = ScanStrategy::preferred(device.info());
        log::info!("selected {} for '{}'", strategy, device.info().description);
        Self::new(device, strategy)
    }

    pub fn strategy(&self) -> ScanStrategy {
        self.strategy
    }

    pub fn tuning(&self) -> &TuningParameters {
        &self.tuning
    }

    /// Generic when the tuning has no specialized scan kernel.
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Elements the current buffers are sized for.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn partitions(&self) -> usize {
        self.layout().count()
    }

    fn layout(&self) -> PartitionLayout {
        PartitionLayout::new(self.size, self.tuning.partition_size as usize)
    }

    /// Device bytes needed to scan `n` elements.
    pub fn required_bytes(&self, n: usize) -> u64 {
        let partitions = PartitionLayout::new(n, self.tuning.partition_size as usize).count();
        let scratch = match self.strategy {
            ScanStrategy::ReduceThenScan => RtsScratch::bytes_for(partitions),
            ScanStrategy::ChainedScanDecoupledLookback => CsdlScratch::bytes_for(partitions),
        };
        DeviceBuffer::bytes_for(2 * n + n.min(MAX_READ_BACK)) + scratch
    }

    /// Size the buffers for `n` elements. Buffers are only reallocated when
    /// `n` changes.
    pub fn update_size(&mut self, n: usize) -> Result<(), ScanError> {
        if n > u32::MAX as usize {
            return Err(ScanError::SizeTooLarge(n));
        }
        if n == self.size && (self.buffers.is_some() || n == 0) {
            return Ok(());
        }

        self.buffers = None;
        self.size = 0;
        if n == 0 {
            return Ok(());
        }

        let required = self.required_bytes(n);
        let available = self.device.available_bytes();
        if required > available {
            return Err(ScanError::Capacity {
                size: n,
                required,
                available,
            });
        }

        let partitions = PartitionLayout::new(n, self.tuning.partition_size as usize).count();
        let device = &self.device;
        let scratch = match self.strategy {
            ScanStrategy::ReduceThenScan => Scratch::Rts(RtsScratch::allocate(device, partitions)?),
            ScanStrategy::ChainedScanDecoupledLookback => {
                Scratch::Csdl(CsdlScratch::allocate(device, partitions)?)
            }
        };
        self.buffers = Some(ScanBuffers {
            scan_in: device.alloc_buffer("scan-in", n, BufferUsage::DeviceLocal)?,
            scan_out: device.alloc_buffer("scan-out", n, BufferUsage::DeviceLocal)?,
            staging: device.alloc_buffer("scan-readback", n.min(MAX_READ_BACK), BufferUsage::HostReadable)?,
            scratch,
        });
        self.size = n;
        log::debug!("prefix sum sized for {n} elements in {partitions} partitions");
        Ok(())
    }

    fn buffers(&self) -> Result<&ScanBuffers, ScanError> {
        self.buffers.as_ref().ok_or(ScanError::NotSized)
    }

    /// Size for `data` and copy it into the device-resident input.
    pub fn upload(&mut self, data: &[u32]) -> Result<(), ScanError> {
        self.update_size(data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.device.write_buffer(&self.buffers()?.scan_in, 0, data)?;
        Ok(())
    }

    /// Scan the device-resident input into the device-resident output.
    pub fn scan_resident(&self, kind: ScanKind) -> Result<(), ScanError> {
        if self.size == 0 {
            return Ok(());
        }
        let buffers = self.buffers()?;
        let layout = self.layout();
        let io = ScanIo {
            scan_in: &buffers.scan_in,
            scan_out: &buffers.scan_out,
            size: self.size as u32,
            partitions: layout.count() as u32,
            partition_size: layout.partition_size(),
            max_dim: self.device.max_dispatch_dimension(),
        };

        let mut cmd = CommandList::new(match self.strategy {
            ScanStrategy::ReduceThenScan => "reduce-then-scan",
            ScanStrategy::ChainedScanDecoupledLookback => "chained-scan",
        });
        match &buffers.scratch {
            Scratch::Rts(scratch) => rts::encode(&mut cmd, &io, scratch, kind)?,
            Scratch::Csdl(scratch) => csdl::encode(&mut cmd, &io, scratch, kind)?,
        }
        self.device.submit(cmd)?;
        Ok(())
    }

    /// Read `count` scanned values starting at `offset`.
    pub fn read_output(&self, offset: usize, count: usize) -> Result<Vec<u32>, ScanError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let buffers = self.buffers()?;
        Ok(self
            .device
            .read_buffer(&buffers.staging, &buffers.scan_out, offset, count)?)
    }

    /// Scan `input` on the device and return the result.
    pub fn scan(&mut self, input: &[u32], kind: ScanKind) -> Result<Vec<u32>, ScanError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.upload(input)?;
        self.scan_resident(kind)?;
        self.read_output(0, input.len())
    }

    pub fn inclusive(&mut self, input: &[u32]) -> Result<Vec<u32>, ScanError> {
        self.scan(input, ScanKind::Inclusive)
    }

    pub fn exclusive(&mut self, input: &[u32]) -> Result<Vec<u32>, ScanError> {
        self.scan(input, ScanKind::Exclusive)
    }

    /// Scan `size` ones and check every output against its index.
    pub fn validate(&mut self, size: usize, kind: ScanKind) -> Result<bool, ScanError> {
        if size == 0 {
            return Ok(true);
        }
        self.upload(&vec![1; size])?;
        self.scan_resident(kind)?;
        let out = self.read_output(0, size)?;
        let offset = match kind {
            ScanKind::Inclusive => 1,
            ScanKind::Exclusive => 0,
        };
        let mismatch = out
            .iter()
            .enumerate()
            .find(|&(i, &v)| v != i as u32 + offset);
        match mismatch {
            Some((i, &v)) => {
                log::warn!(
                    "{} {} scan of {} ones failed at index {}: got {}, expected {}",
                    self.strategy,
                    kind,
                    size,
                    i,
                    v,
                    i as u32 + offset
                );
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
