//! Strategy selection, execution order and large-dispatch tiling.

mod common;

use common::*;
use rand::Rng;
use sweep_primitives::{DeviceConfig, ExecutionMode, MAX_DISPATCH_DIMENSION};
use sweep_scan::{PrefixSum, ScanError, ScanKind, ScanStrategy};

#[test]
fn test_select_prefers_chained_scan() {
    let scan = PrefixSum::select(device()).unwrap();
    assert_eq!(scan.strategy(), ScanStrategy::ChainedScanDecoupledLookback);
}

#[test]
fn test_chained_scan_unavailable_without_wave_intrinsics() {
    let dev = device_without_wave_intrinsics();
    match PrefixSum::new(dev.clone(), ScanStrategy::ChainedScanDecoupledLookback) {
        Err(ScanError::EngineUnavailable { strategy, reason }) => {
            assert_eq!(strategy, ScanStrategy::ChainedScanDecoupledLookback);
            assert!(reason.contains("wave intrinsics"));
        }
        Err(other) => panic!("expected EngineUnavailable, got {other}"),
        Ok(_) => panic!("expected EngineUnavailable"),
    }
    let mut scan = PrefixSum::select(dev).unwrap();
    assert_eq!(scan.strategy(), ScanStrategy::ReduceThenScan);
    assert_eq!(scan.inclusive(&[1, 2, 3]).unwrap(), vec![1, 3, 6]);
}

#[test]
fn test_execution_modes_agree() {
    let mut rng = seeded_rng(7);
    let input: Vec<u32> = (0..20_000).map(|_| rng.gen_range(0..100)).collect();
    let expected = cpu_exclusive(&input);
    for mode in [ExecutionMode::Parallel, ExecutionMode::Serial, ExecutionMode::SerialReversed] {
        for strategy in STRATEGIES {
            let mut scan = engine(device_with(mode, MAX_DISPATCH_DIMENSION), strategy, 64);
            assert_eq!(scan.exclusive(&input).unwrap(), expected, "{strategy} {mode:?}");
        }
    }
}

#[test]
fn test_tiled_dispatch_matches_single_dispatch() {
    // 70 partitions against a limit of 64 groups: one full row plus a
    // 6-group tail.
    let mut rng = seeded_rng(8);
    let input: Vec<u32> = (0..70 * 16 - 3).map(|_| rng.gen()).collect();
    for strategy in STRATEGIES {
        let mut tiled = engine(device_with(ExecutionMode::Parallel, 64), strategy, 16);
        let mut single = engine(device(), strategy, 16);
        assert_eq!(tiled.partitions(), 0);
        let a = tiled.inclusive(&input).unwrap();
        let b = single.inclusive(&input).unwrap();
        assert_eq!(tiled.partitions(), 70);
        assert_eq!(a, b, "{strategy}");
        assert_eq!(a, cpu_inclusive(&input));
    }
}

#[test]
fn test_tiled_dispatch_with_many_rows() {
    let input: Vec<u32> = (0..5_000).collect();
    for strategy in STRATEGIES {
        let mut scan = engine(device_with(ExecutionMode::SerialReversed, 32), strategy, 8);
        assert_eq!(scan.exclusive(&input).unwrap(), cpu_exclusive(&input), "{strategy}");
    }
}

#[test]
fn test_capacity_checked_before_allocation() {
    let dev = std::sync::Arc::new(
        sweep_primitives::Device::with_config(DeviceConfig::default().with_memory_budget(1 << 12))
            .unwrap(),
    );
    let mut scan = engine(dev.clone(), ScanStrategy::ReduceThenScan, 64);
    match scan.update_size(1 << 12) {
        Err(ScanError::Capacity { size, required, available }) => {
            assert_eq!(size, 1 << 12);
            assert!(required > available);
        }
        other => panic!("expected Capacity, got {other:?}"),
    }
    assert_eq!(dev.allocated_bytes(), 0);
    assert_eq!(scan.inclusive(&[1, 1]).unwrap(), vec![1, 2]);
}

#[test]
fn test_validate_reports_strategy_independent_results() {
    for strategy in STRATEGIES {
        let mut scan = PrefixSum::new(device(), strategy).unwrap();
        assert!(scan.validate(3 * 3072 + 1, ScanKind::Exclusive).unwrap());
    }
}
