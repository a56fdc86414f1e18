mod common;

use common::{cpu_stable_pairs, seeded_rng, sorter, STRATEGIES};
use rand::Rng;
use sweep_sort::{KeyType, SortConfig};

fn sort_i64_and_verify(data: Vec<i64>, descending: bool) {
    let mut expected = data.clone();
    if descending {
        expected.sort_by(|a, b| b.cmp(a));
    } else {
        expected.sort();
    }
    let mut config = SortConfig::new(KeyType::Int64);
    if descending {
        config = config.descending();
    }
    for strategy in STRATEGIES {
        let mut actual = data.clone();
        sorter(strategy, config).sort_keys(&mut actual).unwrap();
        assert_eq!(actual, expected, "{strategy} ({config})");
    }
}

#[test]
fn test_sort_i64_boundaries() {
    sort_i64_and_verify(vec![i64::MIN, -1, 0, 1, i64::MAX], false);
}

#[test]
fn test_sort_i64_sign_boundary() {
    let mut data: Vec<i64> = (-1000..1000).collect();
    data.extend([i64::MIN, i64::MAX, i32::MIN as i64 - 1, i32::MAX as i64 + 1]);
    sort_i64_and_verify(data.clone(), false);
    sort_i64_and_verify(data, true);
}

#[test]
fn test_sort_i64_all_negative() {
    let mut rng = seeded_rng(6410);
    sort_i64_and_verify((0..30_000).map(|_| rng.gen_range(i64::MIN..0)).collect(), false);
}

#[test]
fn test_sort_i64_mixed() {
    let mut rng = seeded_rng(6411);
    sort_i64_and_verify((0..100_000).map(|_| rng.gen()).collect(), false);
}

#[test]
fn test_sort_i64_descending() {
    let mut rng = seeded_rng(6412);
    sort_i64_and_verify((0..50_000).map(|_| rng.gen()).collect(), true);
}

#[test]
fn test_sort_pairs_i64_basic() {
    let keys: Vec<i64> = vec![5, -3, 0, i64::MAX, i64::MIN, 1, -1, -3];
    let vals: Vec<u32> = (0..keys.len() as u32).collect();
    let (expected_keys, expected_vals) = cpu_stable_pairs(&keys, &vals, |a, b| a.cmp(b));
    let config = SortConfig::new(KeyType::Int64).with_payload(KeyType::Uint32);
    for strategy in STRATEGIES {
        let mut k = keys.clone();
        let mut v = vals.clone();
        sorter(strategy, config).sort_pairs(&mut k, &mut v).unwrap();
        assert_eq!(k, expected_keys, "{strategy}");
        assert_eq!(v, expected_vals, "{strategy}");
    }
}
