//! Partition and group sizing selected from device capabilities.
//!
//! Kernels are specialized for a handful of partition sizes. Any other size
//! is accepted and runs the generic kernel path, with a warning.

use std::fmt;

use crate::hardware::DeviceInfo;

/// Partition size of the chained and reduce-then-scan kernels.
pub const SCAN_PARTITION_SIZE: u32 = 3072;

/// Partition sizes with specialized sort kernels.
pub const SORT_PARTITION_SIZES: [u32; 5] = [7680, 3840, 3584, 2560, 1792];

/// Errors for tuning values no kernel can run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TuningError {
    #[error("partition size must be non-zero")]
    ZeroPartitionSize,

    #[error("threads per group must be non-zero")]
    ZeroThreads,

    #[error("{threads} threads per group exceeds the device limit of {max}")]
    GroupTooLarge { threads: u32, max: u32 },
}

/// Which kernel family a tuning is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelFamily {
    Scan,
    Sort,
}

/// Whether a specialized kernel exists for a tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    Specialized,
    Generic,
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelVariant::Specialized => f.write_str("specialized"),
            KernelVariant::Generic => f.write_str("generic"),
        }
    }
}

/// Work decomposition of one execution group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningParameters {
    /// Elements processed by one group per phase.
    pub partition_size: u32,
    pub threads_per_group: u32,
    pub keys_per_lane: u32,
    /// Force 32-wide waves on devices that can run either 32 or 64.
    pub lock_waves_to_32: bool,
    /// Group-shared memory the kernels budget, in 32-bit words.
    pub total_shared_memory: u32,
}

impl TuningParameters {
    const fn preset(
        keys_per_lane: u32,
        threads_per_group: u32,
        total_shared_memory: u32,
        lock_waves_to_32: bool,
    ) -> Self {
        Self {
            partition_size: keys_per_lane * threads_per_group,
            threads_per_group,
            keys_per_lane,
            lock_waves_to_32,
            total_shared_memory,
        }
    }

    /// Arbitrary tuning, e.g. tiny partitions for tests.
    pub fn custom(partition_size: u32, threads_per_group: u32) -> Result<Self, TuningError> {
        if partition_size == 0 {
            return Err(TuningError::ZeroPartitionSize);
        }
        if threads_per_group == 0 {
            return Err(TuningError::ZeroThreads);
        }
        Ok(Self {
            partition_size,
            threads_per_group,
            keys_per_lane: partition_size.div_ceil(threads_per_group),
            lock_waves_to_32: false,
            total_shared_memory: partition_size.max(256),
        })
    }

    /// Check the group size against the device.
    pub fn validate(&self, max_group_size: u32) -> Result<(), TuningError> {
        if self.partition_size == 0 {
            return Err(TuningError::ZeroPartitionSize);
        }
        if self.threads_per_group == 0 {
            return Err(TuningError::ZeroThreads);
        }
        if self.threads_per_group > max_group_size {
            return Err(TuningError::GroupTooLarge {
                threads: self.threads_per_group,
                max: max_group_size,
            });
        }
        Ok(())
    }

    /// Specialized kernel availability; warns when falling back.
    pub fn variant(&self, family: KernelFamily) -> KernelVariant {
        let specialized = match family {
            KernelFamily::Scan => self.partition_size == SCAN_PARTITION_SIZE,
            KernelFamily::Sort => SORT_PARTITION_SIZES.contains(&self.partition_size),
        };
        if specialized {
            KernelVariant::Specialized
        } else {
            log::warn!(
                "no specialized {:?} kernel for partition size {}; using the generic path",
                family,
                self.partition_size
            );
            KernelVariant::Generic
        }
    }
}

/// Picks tuning presets for a device.
pub struct Tuner;

impl Tuner {
    /// Sort presets by wave width. Pair sorts move twice the data per key
    /// and get smaller partitions.
    pub fn sort_parameters(info: &DeviceInfo, pairs: bool) -> TuningParameters {
        if info.simd_width < 16 {
            TuningParameters::preset(7, 256, 4096, false)
        } else if info.simd_width >= 64 {
            if pairs {
                TuningParameters::preset(5, 512, 7936, false)
            } else {
                TuningParameters::preset(15, 256, 7936, false)
            }
        } else if pairs {
            TuningParameters::preset(7, 512, 7936, info.simd_max_width > 32)
        } else {
            TuningParameters::preset(15, 512, 7936, info.simd_max_width > 32)
        }
    }

    pub fn scan_parameters(info: &DeviceInfo) -> TuningParameters {
        TuningParameters::preset(12, 256, 4096, info.simd_max_width > 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_waves(min: u32, max: u32) -> DeviceInfo {
        DeviceInfo {
            simd_width: min,
            simd_max_width: max,
            ..DeviceInfo::software(4)
        }
    }

    #[test]
    fn test_sort_presets_are_specialized() {
        for (min, max) in [(8, 16), (32, 32), (32, 64), (64, 64)] {
            for pairs in [false, true] {
                let t = Tuner::sort_parameters(&with_waves(min, max), pairs);
                assert_eq!(t.partition_size, t.keys_per_lane * t.threads_per_group);
                assert_eq!(t.variant(KernelFamily::Sort), KernelVariant::Specialized);
            }
        }
    }

    #[test]
    fn test_sort_preset_values() {
        assert_eq!(Tuner::sort_parameters(&with_waves(32, 32), false).partition_size, 7680);
        assert_eq!(Tuner::sort_parameters(&with_waves(32, 32), true).partition_size, 3584);
        assert_eq!(Tuner::sort_parameters(&with_waves(64, 64), false).partition_size, 3840);
        assert_eq!(Tuner::sort_parameters(&with_waves(64, 64), true).partition_size, 2560);
        assert_eq!(Tuner::sort_parameters(&with_waves(8, 16), false).partition_size, 1792);
        assert_eq!(Tuner::sort_parameters(&with_waves(8, 16), false).total_shared_memory, 4096);
    }

    #[test]
    fn test_wave_locking_on_mixed_width_devices() {
        assert!(Tuner::sort_parameters(&with_waves(32, 64), false).lock_waves_to_32);
        assert!(!Tuner::sort_parameters(&with_waves(32, 32), false).lock_waves_to_32);
    }

    #[test]
    fn test_scan_preset() {
        let t = Tuner::scan_parameters(&DeviceInfo::software(2));
        assert_eq!(t.partition_size, SCAN_PARTITION_SIZE);
        assert_eq!(t.variant(KernelFamily::Scan), KernelVariant::Specialized);
    }

    #[test]
    fn test_custom_tuning_falls_back_to_generic() {
        let t = TuningParameters::custom(4, 4).unwrap();
        assert_eq!(t.keys_per_lane, 1);
        assert_eq!(t.variant(KernelFamily::Scan), KernelVariant::Generic);
        assert_eq!(t.variant(KernelFamily::Sort), KernelVariant::Generic);
        assert_eq!(KernelVariant::Generic.to_string(), "generic");
    }

    #[test]
    fn test_custom_tuning_rejects_zero() {
        assert_eq!(TuningParameters::custom(0, 4), Err(TuningError::ZeroPartitionSize));
        assert_eq!(TuningParameters::custom(4, 0), Err(TuningError::ZeroThreads));
    }

    #[test]
    fn test_validate_group_size() {
        let t = TuningParameters::custom(4096, 2048).unwrap();
        assert_eq!(
            t.validate(1024),
            Err(TuningError::GroupTooLarge { threads: 2048, max: 1024 })
        );
        assert!(TuningParameters::custom(7, 3).unwrap().validate(1024).is_ok());
    }
}
