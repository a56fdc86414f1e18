#![allow(dead_code)]

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sweep_primitives::{Device, DeviceConfig, DeviceInfo, ExecutionMode, TuningParameters};
use sweep_scan::{PrefixSum, ScanStrategy};

pub const STRATEGIES: [ScanStrategy; 2] = [
    ScanStrategy::ReduceThenScan,
    ScanStrategy::ChainedScanDecoupledLookback,
];

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn device() -> Arc<Device> {
    Arc::new(Device::with_config(DeviceConfig::default().with_workers(4)).unwrap())
}

pub fn device_with(mode: ExecutionMode, max_dim: u32) -> Arc<Device> {
    Arc::new(
        Device::with_config(
            DeviceConfig::default()
                .with_workers(4)
                .with_mode(mode)
                .with_max_dispatch_dimension(max_dim),
        )
        .unwrap(),
    )
}

pub fn device_without_wave_intrinsics() -> Arc<Device> {
    let info = DeviceInfo {
        supports_wave_intrinsics: false,
        ..DeviceInfo::software(2)
    };
    Arc::new(Device::with_config(DeviceConfig::default().with_info(info)).unwrap())
}

/// Engine with a small partition so modest inputs span many partitions.
pub fn engine(device: Arc<Device>, strategy: ScanStrategy, partition_size: u32) -> PrefixSum {
    let tuning = TuningParameters::custom(partition_size, partition_size.min(256)).unwrap();
    PrefixSum::with_tuning(device, strategy, tuning).unwrap()
}

pub fn cpu_inclusive(input: &[u32]) -> Vec<u32> {
    let mut running = 0u32;
    input
        .iter()
        .map(|&v| {
            running = running.wrapping_add(v);
            running
        })
        .collect()
}

pub fn cpu_exclusive(input: &[u32]) -> Vec<u32> {
    let mut running = 0u32;
    input
        .iter()
        .map(|&v| {
            let out = running;
            running = running.wrapping_add(v);
            out
        })
        .collect()
}

/// Index of the first mismatch, or the shorter length.
pub fn first_diff(a: &[u32], b: &[u32]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or(a.len().min(b.len()))
}
