//! Drives the scan and sort engines: single runs, the correctness sweep and
//! timed batches. Results come back as plain records for the output layer.

use std::sync::Arc;

use serde::Serialize;

use sweep_primitives::{BenchTimer, Device, DeviceError, KernelVariant, TuningError, TuningParameters};
use sweep_scan::{PrefixSum, ScanError, ScanKind, ScanStrategy};
use sweep_sort::{
    validate_digit_scan, EntropyPreset, KeyType, RadixSorter, SortConfig, SortError, SortStrategy,
};

use crate::cli::{entropy_preset, BenchArgs, ScanArgs, SortArgs, Suite};
use crate::config::BenchProfile;
use crate::data_gen::DataGenerator;
use crate::stats::Stats;

/// Sizes past the partition sweep, skipped when the memory budget is short.
const LARGE_SIZES: [usize; 3] = [1 << 21, 1 << 22, 1 << 23];

/// Largest size of the DRS digit-scan check.
const DIGIT_SCAN_MAX: u32 = 256;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Sort(#[from] SortError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Tuning(#[from] TuningError),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown profile '{0}' (valid: quick, standard, thorough)")]
    UnknownProfile(String),
}

/// Outcome of one validated run or one group of sweep runs.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub suite: &'static str,
    pub name: String,
    pub sizes: String,
    /// Kernel variant the engine ran, empty for host-side checks.
    pub kernels: String,
    pub runs: u32,
    pub failures: u32,
    pub skipped: bool,
    pub elapsed_ms: f64,
}

impl CheckResult {
    fn new(suite: &'static str, name: impl Into<String>, sizes: impl Into<String>) -> Self {
        Self {
            suite,
            name: name.into(),
            sizes: sizes.into(),
            kernels: String::new(),
            runs: 0,
            failures: 0,
            skipped: false,
            elapsed_ms: 0.0,
        }
    }

    fn skipped(suite: &'static str, name: impl Into<String>, sizes: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(suite, name, sizes)
        }
    }

    fn with_kernels(mut self, variant: KernelVariant) -> Self {
        self.kernels = variant.to_string();
        self
    }

    fn record(&mut self, passed: bool) {
        self.runs += 1;
        if !passed {
            self.failures += 1;
        }
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// A single `sort` command: its check plus the keys read back.
#[derive(Debug)]
pub struct SortRun {
    pub check: CheckResult,
    pub key_type: KeyType,
    pub head: Vec<u64>,
}

/// Timing of one size in a `bench` batch.
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub strategy: String,
    pub kernels: String,
    pub size: usize,
    pub entropy: String,
    pub batch: u32,
    pub stats: Stats,
    pub keys_per_sec: f64,
    pub errors: u32,
}

/// Engines are created against one device with optional tuning overrides.
pub struct Harness {
    device: Arc<Device>,
    tuning: Option<TuningParameters>,
}

impl Harness {
    pub fn new(device: Arc<Device>, tuning: Option<TuningParameters>) -> Self {
        Self { device, tuning }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn sorter(&self, strategy: Option<SortStrategy>, config: SortConfig) -> Result<RadixSorter, SortError> {
        let strategy = strategy.unwrap_or_else(|| {
            let preferred = SortStrategy::preferred(self.device.info());
            log::info!("selected {} for '{}'", preferred, self.device.info().description);
            preferred
        });
        match self.tuning {
            Some(tuning) => RadixSorter::with_tuning(self.device.clone(), strategy, config, tuning),
            None => RadixSorter::new(self.device.clone(), strategy, config),
        }
    }

    fn prefix_sum(&self, strategy: Option<ScanStrategy>) -> Result<PrefixSum, ScanError> {
        let strategy = strategy.unwrap_or_else(|| {
            let preferred = ScanStrategy::preferred(self.device.info());
            log::info!("selected {} for '{}'", preferred, self.device.info().description);
            preferred
        });
        match self.tuning {
            Some(tuning) => PrefixSum::with_tuning(self.device.clone(), strategy, tuning),
            None => PrefixSum::new(self.device.clone(), strategy),
        }
    }

    /// Generate, sort and validate one input on the device.
    pub fn run_sort(&self, args: &SortArgs) -> Result<SortRun, HarnessError> {
        let mut config = SortConfig::new(args.key_type.into());
        if args.descending {
            config = config.descending();
        }
        if args.pairs {
            config = config.with_payload(KeyType::Uint32);
        }
        let mut sorter = self.sorter(args.strategy.map(Into::into), config)?;
        let entropy = entropy_preset(args.entropy);

        sorter.create_test_input(args.size, args.seed, entropy)?;
        let timer = BenchTimer::start();
        sorter.sort_resident()?;
        let elapsed_ms = timer.stop();
        let errors = sorter.validate_output()?;

        let mut check = CheckResult::new(
            "sort",
            format!("{} ({}, {})", sorter.strategy(), config, entropy),
            format_size(args.size),
        )
        .with_kernels(sorter.variant());
        check.runs = 1;
        check.failures = errors;
        check.elapsed_ms = elapsed_ms;

        let head = sorter.read_keys(0, args.read_back.min(args.size))?;
        Ok(SortRun {
            check,
            key_type: config.key_type,
            head,
        })
    }

    /// Scan one generated input and compare every output with the host.
    pub fn run_scan(&self, args: &ScanArgs) -> Result<CheckResult, HarnessError> {
        let mut prefix = self.prefix_sum(args.strategy.map(Into::into))?;
        let kind = if args.exclusive {
            ScanKind::Exclusive
        } else {
            ScanKind::Inclusive
        };
        let input = DataGenerator::new(args.seed).bounded_u32(args.size, 1 << 8);
        let expected = host_prefix_sum(&input, kind);

        prefix.upload(&input)?;
        let timer = BenchTimer::start();
        prefix.scan_resident(kind)?;
        let elapsed_ms = timer.stop();
        let output = prefix.read_output(0, input.len())?;

        let mismatches = output.iter().zip(&expected).filter(|(a, b)| a != b).count();
        if let Some(i) = output.iter().zip(&expected).position(|(a, b)| a != b) {
            log::warn!(
                "{} {} scan differs first at index {}: got {}, expected {}",
                prefix.strategy(),
                kind,
                i,
                output[i],
                expected[i]
            );
        }

        let mut check = CheckResult::new(
            "scan",
            format!("{} {}", prefix.strategy(), kind),
            format_size(args.size),
        )
        .with_kernels(prefix.variant());
        check.runs = 1;
        check.failures = mismatches as u32;
        check.elapsed_ms = elapsed_ms;
        Ok(check)
    }

    /// Full correctness sweep for the selected suites.
    pub fn test_all(&self, suite: Suite, progress: impl Fn(&str)) -> Result<Vec<CheckResult>, HarnessError> {
        let mut results = Vec::new();
        if matches!(suite, Suite::Sort | Suite::All) {
            results.extend(self.sort_suite(&progress)?);
        }
        if matches!(suite, Suite::Scan | Suite::All) {
            results.extend(self.scan_suite(&progress)?);
        }
        Ok(results)
    }

    fn sort_suite(&self, progress: &impl Fn(&str)) -> Result<Vec<CheckResult>, HarnessError> {
        let mut results = Vec::new();
        let info = self.device.info();

        for strategy in [SortStrategy::DeviceRadixSort, SortStrategy::OneSweep] {
            if let Err(err) = strategy.check_supported(info) {
                log::warn!("skipping sort tests: {err}");
                results.push(CheckResult::skipped("sort", strategy.to_string(), "all"));
                continue;
            }

            let mut sorter = self.sorter(Some(strategy), SortConfig::default())?;
            let ps = sorter.tuning().partition_size as usize;
            let timer = BenchTimer::start();
            let mut sweep = CheckResult::new("sort", strategy.to_string(), format!("{}..={}", ps, 2 * ps))
                .with_kernels(sorter.variant());
            for size in ps..=2 * ps {
                if size % 64 == 0 {
                    progress(&format!("{strategy}: {size} keys"));
                }
                let errors = sorter.sort_test_input(size, size as u32, EntropyPreset::Bits1000)?;
                sweep.record(errors == 0);
            }
            sweep.elapsed_ms = timer.stop();
            results.push(sweep);

            results.push(self.sort_configs(strategy, progress)?);
            results.extend(self.sort_large(&mut sorter, progress)?);
        }

        if SortStrategy::DeviceRadixSort.check_supported(info).is_ok() {
            let timer = BenchTimer::start();
            let mut digit = CheckResult::new("sort", "DRS digit scan", format!("1..={DIGIT_SCAN_MAX}"));
            for size in 1..=DIGIT_SCAN_MAX {
                progress(&format!("digit scan: {size}"));
                digit.record(validate_digit_scan(&self.device, size)?);
            }
            digit.elapsed_ms = timer.stop();
            results.push(digit);
        }

        results.push(self.host_sorts(progress)?);
        Ok(results)
    }

    /// Every key type and order, with and without payloads, at every entropy.
    fn sort_configs(&self, strategy: SortStrategy, progress: &impl Fn(&str)) -> Result<CheckResult, HarnessError> {
        let timer = BenchTimer::start();
        let mut check = CheckResult::new("sort", format!("{strategy} configs"), format_size(1 << 16));
        for key_type in KeyType::ALL {
            for descending in [false, true] {
                for pairs in [false, true] {
                    let mut config = SortConfig::new(key_type);
                    if descending {
                        config = config.descending();
                    }
                    if pairs {
                        config = config.with_payload(payload_for(key_type));
                    }
                    progress(&format!("{strategy}: {config}"));
                    let mut sorter = self.sorter(Some(strategy), config)?;
                    check.kernels = sorter.variant().to_string();
                    for (i, entropy) in EntropyPreset::ALL.into_iter().enumerate() {
                        let errors = sorter.sort_test_input(1 << 16, 100 + i as u32, entropy)?;
                        check.record(errors == 0);
                    }
                }
            }
        }
        check.elapsed_ms = timer.stop();
        Ok(check)
    }

    fn sort_large(
        &self,
        sorter: &mut RadixSorter,
        progress: &impl Fn(&str),
    ) -> Result<Vec<CheckResult>, HarnessError> {
        let strategy = sorter.strategy();
        let mut results = Vec::new();
        for size in LARGE_SIZES {
            progress(&format!("{strategy}: {}", format_size(size)));
            let timer = BenchTimer::start();
            match sorter.sort_test_input(size, 7, EntropyPreset::Bits1000) {
                Ok(errors) => {
                    let mut check = CheckResult::new("sort", strategy.to_string(), format_size(size))
                        .with_kernels(sorter.variant());
                    check.record(errors == 0);
                    check.elapsed_ms = timer.stop();
                    results.push(check);
                }
                Err(err @ SortError::Capacity { .. }) => {
                    log::warn!("skipping {} sort of {}: {err}", strategy, format_size(size));
                    results.push(CheckResult::skipped("sort", strategy.to_string(), format_size(size)));
                }
                Err(err) => return Err(err.into()),
            }
        }
        sorter.update_size(0)?;
        Ok(results)
    }

    /// Host slices through `sort_keys` against the standard library.
    fn host_sorts(&self, progress: &impl Fn(&str)) -> Result<CheckResult, HarnessError> {
        progress("host slices");
        let timer = BenchTimer::start();
        let mut gen = DataGenerator::new(0x5EED);
        let mut check = CheckResult::new("sort", "host slices", "1K..=100K");

        for size in [1_000, 10_000, 100_000] {
            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Uint32))?;
            check.kernels = sorter.variant().to_string();
            let mut keys = gen.entropy_u32(size, EntropyPreset::Bits544);
            let mut expected = keys.clone();
            expected.sort_unstable();
            sorter.sort_keys(&mut keys)?;
            check.record(keys == expected);

            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Int32).descending())?;
            let mut keys = gen.i32_keys(size);
            let mut expected = keys.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            sorter.sort_keys(&mut keys)?;
            check.record(keys == expected);

            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Float32))?;
            let mut keys = gen.f32_keys(size);
            let mut expected = keys.clone();
            expected.sort_unstable_by(f32::total_cmp);
            sorter.sort_keys(&mut keys)?;
            check.record(keys.iter().map(|v| v.to_bits()).eq(expected.iter().map(|v| v.to_bits())));

            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Uint64))?;
            let mut keys = gen.u64_keys(size);
            let mut expected = keys.clone();
            expected.sort_unstable();
            sorter.sort_keys(&mut keys)?;
            check.record(keys == expected);

            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Int64).descending())?;
            let mut keys = gen.i64_keys(size);
            let mut expected = keys.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            sorter.sort_keys(&mut keys)?;
            check.record(keys == expected);

            let mut sorter = self.sorter(None, SortConfig::new(KeyType::Float64))?;
            let mut keys = gen.f64_keys(size);
            let mut expected = keys.clone();
            expected.sort_unstable_by(f64::total_cmp);
            sorter.sort_keys(&mut keys)?;
            check.record(keys.iter().map(|v| v.to_bits()).eq(expected.iter().map(|v| v.to_bits())));
        }
        check.elapsed_ms = timer.stop();
        Ok(check)
    }

    fn scan_suite(&self, progress: &impl Fn(&str)) -> Result<Vec<CheckResult>, HarnessError> {
        let mut results = Vec::new();
        for strategy in [ScanStrategy::ReduceThenScan, ScanStrategy::ChainedScanDecoupledLookback] {
            if let Err(err) = strategy.check_supported(self.device.info()) {
                log::warn!("skipping scan tests: {err}");
                results.push(CheckResult::skipped("scan", strategy.to_string(), "all"));
                continue;
            }

            let mut prefix = self.prefix_sum(Some(strategy))?;
            let ps = prefix.tuning().partition_size as usize;
            let timer = BenchTimer::start();
            let mut sweep = CheckResult::new("scan", strategy.to_string(), format!("{}..={}", ps, 2 * ps))
                .with_kernels(prefix.variant());
            for size in ps..=2 * ps {
                if size % 64 == 0 {
                    progress(&format!("{strategy}: {size} elements"));
                }
                sweep.record(prefix.validate(size, ScanKind::Inclusive)?);
            }
            sweep.elapsed_ms = timer.stop();
            results.push(sweep);

            for size in LARGE_SIZES {
                progress(&format!("{strategy}: {}", format_size(size)));
                let timer = BenchTimer::start();
                let mut check =
                    CheckResult::new("scan", strategy.to_string(), format_size(size)).with_kernels(prefix.variant());
                let mut skipped = false;
                for kind in [ScanKind::Inclusive, ScanKind::Exclusive] {
                    match prefix.validate(size, kind) {
                        Ok(passed) => check.record(passed),
                        Err(err @ ScanError::Capacity { .. }) => {
                            log::warn!("skipping {} scan of {}: {err}", strategy, format_size(size));
                            skipped = true;
                            break;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                check.skipped = skipped;
                check.elapsed_ms = timer.stop();
                results.push(check);
            }
            prefix.update_size(0)?;
        }
        Ok(results)
    }

    /// Warmup, then `batch` timed resident sorts per size. Input generation
    /// and validation are outside the timed region.
    pub fn bench(
        &self,
        args: &BenchArgs,
        profile: &BenchProfile,
        progress: impl Fn(&str),
    ) -> Result<Vec<BenchResult>, HarnessError> {
        let entropy = entropy_preset(args.entropy);
        let mut sorter = self.sorter(args.strategy.map(Into::into), SortConfig::default())?;
        let mut results = Vec::new();

        for &size in &profile.sizes {
            for w in 0..profile.warmup {
                progress(&format!("{}: warmup {}/{}", format_size(size), w + 1, profile.warmup));
                sorter.sort_test_input(size, args.seed, entropy)?;
            }

            let mut samples = Vec::with_capacity(profile.batch as usize);
            for run in 0..profile.batch {
                progress(&format!("{}: run {}/{}", format_size(size), run + 1, profile.batch));
                sorter.create_test_input(size, args.seed.wrapping_add(run), entropy)?;
                let timer = BenchTimer::start();
                sorter.sort_resident()?;
                samples.push(timer.stop());
            }
            let errors = sorter.validate_output()?;

            let stats = Stats::from_samples(&samples);
            log::debug!(
                "{} keys: median {:.3} ms over {} runs ({} outliers)",
                size,
                stats.median,
                stats.sample_count,
                stats.outliers_removed
            );
            results.push(BenchResult {
                strategy: sorter.strategy().to_string(),
                kernels: sorter.variant().to_string(),
                size,
                entropy: entropy.to_string(),
                batch: profile.batch,
                keys_per_sec: stats.keys_per_sec(size),
                stats,
                errors,
            });
        }
        Ok(results)
    }
}

/// Host reference prefix sum, wrapping modulo 2^32.
pub fn host_prefix_sum(input: &[u32], kind: ScanKind) -> Vec<u32> {
    let mut sum = 0u32;
    input
        .iter()
        .map(|&v| {
            let before = sum;
            sum = sum.wrapping_add(v);
            match kind {
                ScanKind::Inclusive => sum,
                ScanKind::Exclusive => before,
            }
        })
        .collect()
}

/// Compact size label: `2^N` for powers of two from 1024, else K/M suffixes
/// for round values.
pub fn format_size(size: usize) -> String {
    if size >= 1 << 10 && size.is_power_of_two() {
        format!("2^{}", size.trailing_zeros())
    } else if size >= 1_000_000 && size % 1_000_000 == 0 {
        format!("{}M", size / 1_000_000)
    } else if size >= 1_000 && size % 1_000 == 0 {
        format!("{}K", size / 1_000)
    } else {
        size.to_string()
    }
}

/// Render raw key bits the way the configured key type reads.
pub fn format_key(key_type: KeyType, bits: u64) -> String {
    match key_type {
        KeyType::Uint32 => (bits as u32).to_string(),
        KeyType::Int32 => (bits as u32 as i32).to_string(),
        KeyType::Float32 => f32::from_bits(bits as u32).to_string(),
        KeyType::Uint64 => bits.to_string(),
        KeyType::Int64 => (bits as i64).to_string(),
        KeyType::Float64 => f64::from_bits(bits).to_string(),
    }
}

/// Unsigned payload as wide as the key.
fn payload_for(key_type: KeyType) -> KeyType {
    if key_type.words() == 2 {
        KeyType::Uint64
    } else {
        KeyType::Uint32
    }
}
