//! Stable LSD radix sort of 32- and 64-bit keys, optionally carrying payloads
//! of either width.
//!
//! [`RadixSorter`] runs one 8-bit digit pass per key byte (four or eight)
//! with one of two strategies:
//!
//! - [`SortStrategy::DeviceRadixSort`]: upsweep, scan and downsweep per pass,
//!   synchronized only by barriers.
//! - [`SortStrategy::OneSweep`]: one histogram dispatch for all digits, then
//!   a single fused binning dispatch per pass that resolves per-digit tile
//!   offsets through decoupled lookback.
//!
//! Keys stay in their raw bit patterns on the device; signed, floating-point
//! and descending orders are applied at digit extraction.

mod buffers;
mod device_radix;
mod keys;
mod onesweep;
mod utility;

use std::fmt;
use std::sync::Arc;

use sweep_primitives::{
    BufferUsage, CommandList, Device, DeviceBuffer, DeviceError, DeviceInfo, DispatchConstants,
    GridSize, KernelFamily, KernelVariant, PartitionLayout, Tuner, TuningError, TuningParameters,
};

pub use device_radix::validate_digit_scan;
pub use keys::{
    KeyTransform, KeyType, PayloadType, SortConfig, SortKey, SortMode, SortOrder, MAX_RADIX_PASSES,
    RADIX, RADIX_LOG, RADIX_MASK, RADIX_PASSES,
};
pub use utility::{entropy_key, entropy_key_wide, generated_key, random_word, EntropyPreset};

use buffers::{from_words, to_words, SortBuffers};
use device_radix::DrsScratch;
use onesweep::OneSweepScratch;
use utility::{ClearErrorCount, InitSortInput, Validate, UTILITY_CHUNK};

/// Largest chunk moved through the host-readable staging buffer at once.
pub const MAX_READ_BACK: usize = 1 << 13;

/// Errors returned by [`RadixSorter`].
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Tuning(#[from] TuningError),

    #[error("{strategy} unavailable on this device: {reason}")]
    EngineUnavailable {
        strategy: SortStrategy,
        reason: &'static str,
    },

    #[error("insufficient device memory for {num_keys} keys: need {required} bytes, {available} available")]
    Capacity {
        num_keys: usize,
        required: u64,
        available: u64,
    },

    #[error("length mismatch: keys={keys}, values={values}")]
    LengthMismatch { keys: usize, values: usize },

    #[error("sorter is configured for {expected} keys, got {actual}")]
    KeyTypeMismatch { expected: KeyType, actual: KeyType },

    #[error("sorter is configured for {expected} payloads, got {actual}")]
    PayloadTypeMismatch {
        expected: PayloadType,
        actual: PayloadType,
    },

    #[error("sorter is configured for keys only")]
    PayloadsNotConfigured,

    #[error("input of {0} keys exceeds 32-bit addressing")]
    SizeTooLarge(usize),

    #[error("sort buffers not allocated; call update_size first")]
    NotSized,
}

/// How each pass finds every tile's scatter offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    DeviceRadixSort,
    OneSweep,
}

impl SortStrategy {
    /// The fastest strategy the device can run.
    pub fn preferred(info: &DeviceInfo) -> Self {
        if info.supports_lookback_strategies() {
            SortStrategy::OneSweep
        } else {
            SortStrategy::DeviceRadixSort
        }
    }

    pub fn check_supported(self, info: &DeviceInfo) -> Result<(), SortError> {
        let reason = match self {
            SortStrategy::DeviceRadixSort => info.barrier_unavailable_reason(),
            SortStrategy::OneSweep => info.lookback_unavailable_reason(),
        };
        match reason {
            Some(reason) => Err(SortError::EngineUnavailable {
                strategy: self,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortStrategy::DeviceRadixSort => write!(f, "DeviceRadixSort"),
            SortStrategy::OneSweep => write!(f, "OneSweep"),
        }
    }
}

enum SortScratch {
    DeviceRadix(DrsScratch),
    OneSweep(OneSweepScratch),
}

/// Everything a strategy needs to run its passes.
pub(crate) struct SortJob<'a> {
    pub device: &'a Device,
    pub buffers: &'a mut SortBuffers,
    pub global_hist: &'a DeviceBuffer,
    pub global_offsets: &'a DeviceBuffer,
    pub transform: KeyTransform,
    pub num_keys: u32,
    pub partitions: u32,
    pub partition_size: usize,
}

struct SizedBuffers {
    buffers: SortBuffers,
    scratch: SortScratch,
}

/// Radix sort engine bound to one device, one strategy and one key layout.
pub struct RadixSorter {
    device: Arc<Device>,
    strategy: SortStrategy,
    config: SortConfig,
    tuning: TuningParameters,
    variant: KernelVariant,
    global_hist: DeviceBuffer,
    global_offsets: DeviceBuffer,
    error_count: DeviceBuffer,
    staging: DeviceBuffer,
    size: usize,
    sized: Option<SizedBuffers>,
    // The resident keys are generated input, so payloads must mirror them.
    test_input: bool,
}

impl RadixSorter {
    /// Sorter with the device's default tuning for `config`.
    pub fn new(device: Arc<Device>, strategy: SortStrategy, config: SortConfig) -> Result<Self, SortError> {
        let tuning = Tuner::sort_parameters(device.info(), config.mode.has_payloads());
        Self::with_tuning(device, strategy, config, tuning)
    }

    pub fn with_tuning(
        device: Arc<Device>,
        strategy: SortStrategy,
        config: SortConfig,
        tuning: TuningParameters,
    ) -> Result<Self, SortError> {
        strategy.check_supported(device.info())?;
        tuning.validate(device.limits().max_group_size)?;
        let variant = tuning.variant(KernelFamily::Sort);

        let hist_words = RADIX * config.key_type.passes();
        let global_hist = device.alloc_buffer("global-hist", hist_words, BufferUsage::DeviceLocal)?;
        let global_offsets = device.alloc_buffer("global-offsets", hist_words, BufferUsage::DeviceLocal)?;
        let error_count = device.alloc_buffer("error-count", 1, BufferUsage::HostReadable)?;
        let staging = device.alloc_buffer("sort-readback", MAX_READ_BACK, BufferUsage::HostReadable)?;

        log::debug!(
            "radix sorter: {} on {} with partition size {} ({} threads x {} keys, {} kernels)",
            strategy,
            config,
            tuning.partition_size,
            tuning.threads_per_group,
            tuning.keys_per_lane,
            variant
        );
        Ok(Self {
            device,
            strategy,
            config,
            tuning,
            variant,
            global_hist,
            global_offsets,
            error_count,
            staging,
            size: 0,
            sized: None,
            test_input: false,
        })
    }

    /// Sorter running the fastest strategy the device supports.
    pub fn select(device: Arc<Device>, config: SortConfig) -> Result<Self, SortError> {
        let strategy = SortStrategy::preferred(device.info());
        log::info!("selected {} for '{}'", strategy, device.info().description);
        Self::new(device, strategy, config)
    }

    pub fn strategy(&self) -> SortStrategy {
        self.strategy
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn tuning(&self) -> &TuningParameters {
        &self.tuning
    }

    /// Kernel variant the tuning resolved to. Custom tuning runs the generic
    /// kernels.
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Keys the current buffers are sized for.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn partitions(&self) -> usize {
        self.layout(self.size).count()
    }

    fn layout(&self, n: usize) -> PartitionLayout {
        PartitionLayout::new(n, self.tuning.partition_size as usize)
    }

    /// Device bytes a sort of `n` keys allocates on top of the sorter's
    /// fixed buffers.
    pub fn required_bytes(&self, n: usize) -> u64 {
        let partitions = self.layout(n).count();
        let scratch = match self.strategy {
            SortStrategy::DeviceRadixSort => DrsScratch::bytes_for(partitions),
            SortStrategy::OneSweep => OneSweepScratch::bytes_for(partitions),
        };
        SortBuffers::bytes_for(n, self.key_words(), self.payload_words()) + scratch
    }

    /// Size the buffers for `n` keys. Buffers are only reallocated when `n`
    /// changes.
    pub fn update_size(&mut self, n: usize) -> Result<(), SortError> {
        if n > u32::MAX as usize {
            return Err(SortError::SizeTooLarge(n));
        }
        if n == self.size && (self.sized.is_some() || n == 0) {
            return Ok(());
        }

        self.sized = None;
        self.size = 0;
        self.test_input = false;
        if n == 0 {
            return Ok(());
        }

        let required = self.required_bytes(n);
        let available = self.device.available_bytes();
        if required > available {
            return Err(SortError::Capacity {
                num_keys: n,
                required,
                available,
            });
        }

        let partitions = self.layout(n).count();
        let device = &self.device;
        let scratch = match self.strategy {
            SortStrategy::DeviceRadixSort => {
                SortScratch::DeviceRadix(DrsScratch::allocate(device, partitions)?)
            }
            SortStrategy::OneSweep => SortScratch::OneSweep(OneSweepScratch::allocate(device, partitions)?),
        };
        let buffers = SortBuffers::allocate(device, n, self.key_words(), self.payload_words())?;
        self.sized = Some(SizedBuffers { buffers, scratch });
        self.size = n;
        log::debug!("radix sorter sized for {n} keys in {partitions} partitions");
        Ok(())
    }

    fn key_words(&self) -> usize {
        self.config.key_type.words()
    }

    fn payload_type(&self) -> Option<PayloadType> {
        match self.config.mode {
            SortMode::KeysOnly => None,
            SortMode::Pairs(payload) => Some(payload),
        }
    }

    fn payload_words(&self) -> Option<usize> {
        self.payload_type().map(PayloadType::words)
    }

    fn sized(&self) -> Result<&SizedBuffers, SortError> {
        self.sized.as_ref().ok_or(SortError::NotSized)
    }

    /// Sort the device-resident keys (and payloads) in place.
    pub fn sort_resident(&mut self) -> Result<(), SortError> {
        if self.size <= 1 {
            return Ok(());
        }
        let partitions = self.partitions() as u32;
        let sized = self.sized.as_mut().ok_or(SortError::NotSized)?;
        let mut job = SortJob {
            device: &self.device,
            buffers: &mut sized.buffers,
            global_hist: &self.global_hist,
            global_offsets: &self.global_offsets,
            transform: self.config.transform(),
            num_keys: self.size as u32,
            partitions,
            partition_size: self.tuning.partition_size as usize,
        };
        log::trace!("{} sort of {} keys ({})", self.strategy, self.size, self.config);
        match &sized.scratch {
            SortScratch::DeviceRadix(scratch) => device_radix::sort(&mut job, scratch)?,
            SortScratch::OneSweep(scratch) => onesweep::sort(&mut job, scratch)?,
        }
        Ok(())
    }

    /// Sort `keys` on the device in place.
    pub fn sort_keys<K: SortKey>(&mut self, keys: &mut [K]) -> Result<(), SortError> {
        self.check_key_type::<K>()?;
        let n = keys.len();
        if n <= 1 {
            return Ok(());
        }
        self.upload(keys, None::<&[u32]>)?;
        self.sort_resident()?;
        self.download_keys(keys)
    }

    /// Sort `keys` in place, moving `values[i]` with `keys[i]`.
    pub fn sort_pairs<K: SortKey, V: SortKey>(
        &mut self,
        keys: &mut [K],
        values: &mut [V],
    ) -> Result<(), SortError> {
        self.check_key_type::<K>()?;
        let payload = match self.config.mode {
            SortMode::KeysOnly => return Err(SortError::PayloadsNotConfigured),
            SortMode::Pairs(payload) => payload,
        };
        if payload != V::KEY_TYPE {
            return Err(SortError::PayloadTypeMismatch {
                expected: payload,
                actual: V::KEY_TYPE,
            });
        }
        let n = keys.len();
        if n != values.len() {
            return Err(SortError::LengthMismatch {
                keys: n,
                values: values.len(),
            });
        }
        if n <= 1 {
            return Ok(());
        }

        self.upload(keys, Some(&*values))?;
        self.sort_resident()?;
        self.download_keys(keys)?;
        let sorted = self.read_payloads(0, n)?;
        for (dst, bits) in values.iter_mut().zip(sorted) {
            *dst = V::from_bits(bits);
        }
        Ok(())
    }

    fn check_key_type<K: SortKey>(&self) -> Result<(), SortError> {
        if K::KEY_TYPE != self.config.key_type {
            return Err(SortError::KeyTypeMismatch {
                expected: self.config.key_type,
                actual: K::KEY_TYPE,
            });
        }
        Ok(())
    }

    fn upload<K: SortKey, V: SortKey>(&mut self, keys: &[K], values: Option<&[V]>) -> Result<(), SortError> {
        self.update_size(keys.len())?;
        self.test_input = false;
        let sized = self.sized()?;
        let words = to_words(keys.iter().map(|&k| k.to_bits()), sized.buffers.key_words);
        self.device.write_buffer(sized.buffers.keys.current(), 0, &words)?;
        if let (Some(values), Some(pair)) = (values, &sized.buffers.payloads) {
            let words = to_words(values.iter().map(|&v| v.to_bits()), sized.buffers.payload_words);
            self.device.write_buffer(pair.current(), 0, &words)?;
        }
        Ok(())
    }

    fn download_keys<K: SortKey>(&self, keys: &mut [K]) -> Result<(), SortError> {
        let sorted = self.read_keys(0, keys.len())?;
        for (dst, bits) in keys.iter_mut().zip(sorted) {
            *dst = K::from_bits(bits);
        }
        Ok(())
    }

    /// Raw bits of `count` keys starting at element `offset`.
    pub fn read_keys(&self, offset: usize, count: usize) -> Result<Vec<u64>, SortError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let sized = self.sized()?;
        let words = sized.buffers.key_words;
        let raw = self
            .device
            .read_buffer(&self.staging, sized.buffers.keys.current(), offset * words, count * words)?;
        Ok(from_words(&raw, words))
    }

    /// Raw bits of `count` payloads starting at element `offset`.
    pub fn read_payloads(&self, offset: usize, count: usize) -> Result<Vec<u64>, SortError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let sized = self.sized()?;
        let payloads = sized
            .buffers
            .payloads
            .as_ref()
            .ok_or(SortError::PayloadsNotConfigured)?;
        let words = sized.buffers.payload_words;
        let raw = self
            .device
            .read_buffer(&self.staging, payloads.current(), offset * words, count * words)?;
        Ok(from_words(&raw, words))
    }

    /// Digit counts of the last sort, indexed `[pass * RADIX + digit]`, one
    /// table per key byte.
    pub fn global_histogram(&self) -> Result<Vec<u32>, SortError> {
        Ok(self
            .device
            .read_buffer(&self.staging, &self.global_hist, 0, self.global_hist.len())?)
    }

    /// Fill the resident buffers with `size` generated keys. In pair mode
    /// each payload is a copy of its key's bits.
    pub fn create_test_input(&mut self, size: usize, seed: u32, entropy: EntropyPreset) -> Result<(), SortError> {
        self.update_size(size)?;
        if size == 0 {
            return Ok(());
        }
        let sized = self.sized()?;
        let groups = size.div_ceil(UTILITY_CHUNK) as u32;
        let keys = sized.buffers.keys.current().clone();
        let payloads = sized.buffers.payloads.as_ref().map(|p| p.current().clone());

        let mut cmd = CommandList::new("init-sort-input");
        cmd.dispatch_tiled(
            Arc::new(InitSortInput {
                keys: keys.clone(),
                key_type: self.config.key_type,
                payloads: payloads.clone().zip(self.payload_type()),
                seed,
                entropy,
            }),
            self.device.max_dispatch_dimension(),
            DispatchConstants::new(size as u32, groups),
        )?;
        cmd.barrier(&keys);
        if let Some(payloads) = &payloads {
            cmd.barrier(payloads);
        }
        self.device.submit(cmd)?;
        self.test_input = true;
        log::debug!("generated {size} keys (seed {seed}, entropy {entropy})");
        Ok(())
    }

    /// Count ordering errors in the resident keys: adjacent inversions under
    /// the configured order, plus payloads that no longer match their keys
    /// when the resident data came from [`create_test_input`](Self::create_test_input).
    pub fn validate_output(&self) -> Result<u32, SortError> {
        if self.size == 0 {
            return Ok(0);
        }
        let sized = self.sized()?;
        let groups = self.size.div_ceil(UTILITY_CHUNK) as u32;

        let mut cmd = CommandList::new("validate");
        cmd.dispatch(
            Arc::new(ClearErrorCount {
                error_count: self.error_count.clone(),
            }),
            GridSize::linear(1),
            DispatchConstants::new(0, 1),
        );
        cmd.barrier(&self.error_count);
        cmd.dispatch_tiled(
            Arc::new(Validate {
                keys: sized.buffers.keys.current().clone(),
                payloads: sized
                    .buffers
                    .payloads
                    .as_ref()
                    .map(|p| p.current().clone())
                    .zip(self.payload_type()),
                error_count: self.error_count.clone(),
                transform: self.config.transform(),
                check_pairing: self.test_input,
            }),
            self.device.max_dispatch_dimension(),
            DispatchConstants::new(self.size as u32, groups),
        )?;
        cmd.barrier(&self.error_count);
        self.device.submit(cmd)?;

        let errors = self.device.copy_to_host(&self.error_count, 0, 1)?;
        Ok(errors.first().copied().unwrap_or(0))
    }

    /// Generate, sort and validate `size` keys. Returns the error count.
    pub fn sort_test_input(&mut self, size: usize, seed: u32, entropy: EntropyPreset) -> Result<u32, SortError> {
        self.create_test_input(size, seed, entropy)?;
        self.sort_resident()?;
        let errors = self.validate_output()?;
        if errors > 0 {
            log::warn!(
                "{} sort of {} keys ({}, {}) produced {} errors",
                self.strategy,
                size,
                self.config,
                entropy,
                errors
            );
        }
        Ok(errors)
    }
}

impl fmt::Debug for RadixSorter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadixSorter")
            .field("strategy", &self.strategy)
            .field("config", &self.config)
            .field("tuning", &self.tuning)
            .field("variant", &self.variant)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_primitives::DeviceConfig;

    fn device() -> Arc<Device> {
        Arc::new(Device::with_config(DeviceConfig::default().with_workers(2)).unwrap())
    }

    #[test]
    fn test_sort_error_display() {
        assert_eq!(
            SortError::LengthMismatch { keys: 3, values: 2 }.to_string(),
            "length mismatch: keys=3, values=2"
        );
        assert_eq!(
            SortError::KeyTypeMismatch {
                expected: KeyType::Uint32,
                actual: KeyType::Float32
            }
            .to_string(),
            "sorter is configured for uint32 keys, got float32"
        );
        let err = SortError::EngineUnavailable {
            strategy: SortStrategy::OneSweep,
            reason: "device lacks wave intrinsics",
        };
        assert_eq!(err.to_string(), "OneSweep unavailable on this device: device lacks wave intrinsics");
    }

    #[test]
    fn test_preferred_strategy() {
        let info = DeviceInfo::software(2);
        assert_eq!(SortStrategy::preferred(&info), SortStrategy::OneSweep);
        let no_progress = DeviceInfo {
            independent_forward_progress: false,
            ..info
        };
        assert_eq!(SortStrategy::preferred(&no_progress), SortStrategy::DeviceRadixSort);
        assert!(SortStrategy::OneSweep.check_supported(&no_progress).is_err());
    }

    #[test]
    fn test_required_bytes_by_strategy() {
        let dev = device();
        let tuning = TuningParameters::custom(4, 4).unwrap();
        let drs = RadixSorter::with_tuning(dev.clone(), SortStrategy::DeviceRadixSort, SortConfig::default(), tuning)
            .unwrap();
        let pairs = SortConfig::default().with_payload(KeyType::Uint32);
        let onesweep = RadixSorter::with_tuning(dev, SortStrategy::OneSweep, pairs, tuning).unwrap();
        // 8 keys in 2 partitions.
        assert_eq!(drs.required_bytes(8), 16 * 4 + 2 * 256 * 4);
        assert_eq!(onesweep.required_bytes(8), 32 * 4 + 2 * 256 * 8 + 8 * 4);

        // 64-bit keys with 32-bit payloads: three words per element, both roles.
        let wide = SortConfig::new(KeyType::Uint64).with_payload(KeyType::Uint32);
        let wide = RadixSorter::with_tuning(device(), SortStrategy::DeviceRadixSort, wide, tuning).unwrap();
        assert_eq!(wide.required_bytes(8), 48 * 4 + 2 * 256 * 4);
    }

    #[test]
    fn test_histogram_sized_by_key_width() {
        let dev = device();
        let fixed = dev.allocated_bytes();
        let narrow = RadixSorter::new(dev.clone(), SortStrategy::OneSweep, SortConfig::default()).unwrap();
        assert_eq!(narrow.global_histogram().unwrap().len(), RADIX * RADIX_PASSES);
        let with_narrow = dev.allocated_bytes();
        let wide = RadixSorter::new(dev.clone(), SortStrategy::OneSweep, SortConfig::new(KeyType::Int64)).unwrap();
        assert_eq!(wide.global_histogram().unwrap().len(), RADIX * MAX_RADIX_PASSES);
        assert_eq!(
            dev.allocated_bytes() - with_narrow,
            with_narrow - fixed + 2 * (RADIX * RADIX_PASSES * 4) as u64
        );
    }

    #[test]
    fn test_kernel_variant_follows_tuning() {
        let default = RadixSorter::new(device(), SortStrategy::DeviceRadixSort, SortConfig::default()).unwrap();
        assert_eq!(default.variant(), KernelVariant::Specialized);

        let tuning = TuningParameters::custom(64, 16).unwrap();
        let custom =
            RadixSorter::with_tuning(device(), SortStrategy::OneSweep, SortConfig::default(), tuning).unwrap();
        assert_eq!(custom.variant(), KernelVariant::Generic);
        assert!(format!("{custom:?}").contains("Generic"));
    }

    #[test]
    fn test_update_size_reuses_buffers() {
        let dev = device();
        let tuning = TuningParameters::custom(4, 4).unwrap();
        let mut sorter =
            RadixSorter::with_tuning(dev.clone(), SortStrategy::DeviceRadixSort, SortConfig::default(), tuning).unwrap();
        let fixed = dev.allocated_bytes();
        sorter.update_size(10).unwrap();
        assert_eq!(dev.allocated_bytes(), fixed + sorter.required_bytes(10));
        sorter.update_size(10).unwrap();
        assert_eq!(dev.allocated_bytes(), fixed + sorter.required_bytes(10));
        assert_eq!(sorter.partitions(), 3);
        sorter.update_size(0).unwrap();
        assert_eq!(dev.allocated_bytes(), fixed);
    }

    #[test]
    fn test_type_checks() {
        let mut sorter = RadixSorter::new(device(), SortStrategy::DeviceRadixSort, SortConfig::default()).unwrap();
        let mut floats = [1.0f32, 0.5];
        assert!(matches!(sorter.sort_keys(&mut floats), Err(SortError::KeyTypeMismatch { .. })));
        let mut wide = [2u64, 1];
        assert!(matches!(
            sorter.sort_keys(&mut wide),
            Err(SortError::KeyTypeMismatch {
                expected: KeyType::Uint32,
                actual: KeyType::Uint64
            })
        ));
        let mut keys = [2u32, 1];
        let mut values = [0u32, 1];
        assert!(matches!(
            sorter.sort_pairs(&mut keys, &mut values),
            Err(SortError::PayloadsNotConfigured)
        ));

        let pairs = SortConfig::default().with_payload(KeyType::Int32);
        let mut sorter = RadixSorter::new(device(), SortStrategy::DeviceRadixSort, pairs).unwrap();
        assert!(matches!(
            sorter.sort_pairs(&mut keys, &mut values),
            Err(SortError::PayloadTypeMismatch { .. })
        ));
        let mut short = [0i32];
        assert!(matches!(
            sorter.sort_pairs(&mut keys, &mut short),
            Err(SortError::LengthMismatch { keys: 2, values: 1 })
        ));
    }

    #[test]
    fn test_trivial_inputs_skip_the_device() {
        let mut sorter = RadixSorter::new(device(), SortStrategy::OneSweep, SortConfig::default()).unwrap();
        let mut empty: [u32; 0] = [];
        sorter.sort_keys(&mut empty).unwrap();
        let mut one = [42u32];
        sorter.sort_keys(&mut one).unwrap();
        assert_eq!(one, [42]);
        assert_eq!(sorter.size(), 0);
        assert_eq!(sorter.validate_output().unwrap(), 0);
    }
}
