#![allow(dead_code)]

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sweep_primitives::{Device, DeviceConfig, ExecutionMode, TuningParameters};
use sweep_sort::{RadixSorter, SortConfig, SortStrategy};

pub const STRATEGIES: [SortStrategy; 2] = [SortStrategy::DeviceRadixSort, SortStrategy::OneSweep];

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

/// Sorter with the device's default tuning.
pub fn sorter(strategy: SortStrategy, config: SortConfig) -> RadixSorter {
    RadixSorter::new(device(), strategy, config).unwrap()
}

/// Sorter with a small partition so modest inputs span many partitions.
pub fn small_sorter(
    device: Arc<Device>,
    strategy: SortStrategy,
    config: SortConfig,
    partition_size: u32,
) -> RadixSorter {
    let tuning = TuningParameters::custom(partition_size, partition_size.min(256)).unwrap();
    RadixSorter::with_tuning(device, strategy, config, tuning).unwrap()
}

/// Verify that the same multiset of (key, value) pairs exists before and after sorting.
pub fn verify_pairs_preserved(
    orig_keys: &[u32],
    orig_vals: &[u32],
    sorted_keys: &[u32],
    sorted_vals: &[u32],
) -> bool {
    if orig_keys.len() != sorted_keys.len() || orig_vals.len() != sorted_vals.len() {
        return false;
    }
    let mut orig_pairs: Vec<(u32, u32)> = orig_keys.iter().copied().zip(orig_vals.iter().copied()).collect();
    let mut sorted_pairs: Vec<(u32, u32)> = sorted_keys.iter().copied().zip(sorted_vals.iter().copied()).collect();
    orig_pairs.sort();
    sorted_pairs.sort();
    orig_pairs == sorted_pairs
}

/// Verify pairs preserved for f32 keys (compare by bits for NaN correctness).
pub fn verify_pairs_preserved_f32(
    orig_keys: &[f32],
    orig_vals: &[u32],
    sorted_keys: &[f32],
    sorted_vals: &[u32],
) -> bool {
    let orig: Vec<u32> = orig_keys.iter().map(|k| k.to_bits()).collect();
    let sorted: Vec<u32> = sorted_keys.iter().map(|k| k.to_bits()).collect();
    verify_pairs_preserved(&orig, orig_vals, &sorted, sorted_vals)
}

/// Host reference for a stable sort of pairs by key.
pub fn cpu_stable_pairs<K: Copy, F>(keys: &[K], vals: &[u32], cmp: F) -> (Vec<K>, Vec<u32>)
where
    F: Fn(&K, &K) -> std::cmp::Ordering,
{
    let mut pairs: Vec<(K, u32)> = keys.iter().copied().zip(vals.iter().copied()).collect();
    pairs.sort_by(|a, b| cmp(&a.0, &b.0));
    pairs.into_iter().unzip()
}

/// Index of the first mismatch, or the shorter length.
pub fn first_diff<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or(a.len().min(b.len()))
}
