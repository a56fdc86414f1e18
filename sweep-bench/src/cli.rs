use clap::{Args, Parser, Subcommand, ValueEnum};

use sweep_scan::ScanStrategy;
use sweep_sort::{EntropyPreset, KeyType, SortStrategy};

use crate::config::parse_size;

/// Correctness sweeps and throughput benchmarks for the scan and sort engines
#[derive(Parser, Debug)]
#[command(name = "sweep-bench", version, about)]
pub struct SweepArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Device and tuning overrides shared by every command.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Worker threads of the compute device (default: all cores)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Run groups one at a time, last group first
    #[arg(long, global = true)]
    pub serial: bool,

    /// Largest group count of one dispatch dimension
    #[arg(long, global = true)]
    pub max_dim: Option<u32>,

    /// Elements per partition (overrides the device preset)
    #[arg(long, global = true, requires = "threads_per_group")]
    pub partition_size: Option<u32>,

    /// Threads per group, used with --partition-size
    #[arg(long, global = true, requires = "partition_size")]
    pub threads_per_group: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate, sort and validate one input
    Sort(SortArgs),
    /// Scan one input and check every output
    Scan(ScanArgs),
    /// Run the full correctness sweep
    TestAll(TestAllArgs),
    /// Time repeated sorts of one size
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
pub struct SortArgs {
    /// Keys to sort (e.g. 1M, 64K, 1000000)
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    pub size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u32,

    /// Strategy (default: fastest the device supports)
    #[arg(long, value_enum)]
    pub strategy: Option<SortStrategyArg>,

    #[arg(long, value_enum, default_value_t = KeyTypeArg::Uint32)]
    pub key_type: KeyTypeArg,

    #[arg(long)]
    pub descending: bool,

    /// Carry a 32-bit payload with every key
    #[arg(long)]
    pub pairs: bool,

    /// Entropy preset 0-4; higher values skew digits toward zero
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..5))]
    pub entropy: u8,

    /// Print the first N sorted keys
    #[arg(long, default_value_t = 0)]
    pub read_back: usize,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Elements to scan
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    pub size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum)]
    pub strategy: Option<ScanStrategyArg>,

    /// Exclusive instead of inclusive sums
    #[arg(long)]
    pub exclusive: bool,
}

#[derive(Args, Debug)]
pub struct TestAllArgs {
    #[arg(value_enum, default_value_t = Suite::All)]
    pub suite: Suite,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Keys per sort (overrides the profile)
    #[arg(long, value_parser = parse_size)]
    pub size: Option<usize>,

    /// Timed sorts per size (overrides the profile)
    #[arg(long)]
    pub batch: Option<u32>,

    #[arg(long, default_value_t = 42)]
    pub seed: u32,

    /// Entropy preset 0-4
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..5))]
    pub entropy: u8,

    #[arg(long, value_enum)]
    pub strategy: Option<SortStrategyArg>,

    /// Benchmark profile: quick (1M/5), standard (1M+4M/20), thorough (1M+4M+16M/50)
    #[arg(long)]
    pub profile: Option<String>,

    /// Write JSON results to file
    #[arg(long)]
    pub json_file: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Sort,
    Scan,
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategyArg {
    #[value(name = "drs")]
    DeviceRadixSort,
    #[value(name = "onesweep")]
    OneSweep,
}

impl From<SortStrategyArg> for SortStrategy {
    fn from(arg: SortStrategyArg) -> Self {
        match arg {
            SortStrategyArg::DeviceRadixSort => SortStrategy::DeviceRadixSort,
            SortStrategyArg::OneSweep => SortStrategy::OneSweep,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategyArg {
    #[value(name = "rts")]
    ReduceThenScan,
    #[value(name = "csdl")]
    ChainedScan,
}

impl From<ScanStrategyArg> for ScanStrategy {
    fn from(arg: ScanStrategyArg) -> Self {
        match arg {
            ScanStrategyArg::ReduceThenScan => ScanStrategy::ReduceThenScan,
            ScanStrategyArg::ChainedScan => ScanStrategy::ChainedScanDecoupledLookback,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTypeArg {
    Uint32,
    Int32,
    Float32,
    Uint64,
    Int64,
    Float64,
}

impl From<KeyTypeArg> for KeyType {
    fn from(arg: KeyTypeArg) -> Self {
        match arg {
            KeyTypeArg::Uint32 => KeyType::Uint32,
            KeyTypeArg::Int32 => KeyType::Int32,
            KeyTypeArg::Float32 => KeyType::Float32,
            KeyTypeArg::Uint64 => KeyType::Uint64,
            KeyTypeArg::Int64 => KeyType::Int64,
            KeyTypeArg::Float64 => KeyType::Float64,
        }
    }
}

/// Entropy preset for a validated `0..5` index.
pub fn entropy_preset(index: u8) -> EntropyPreset {
    EntropyPreset::from_index(index as usize).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        SweepArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_sort_command() {
        let args = SweepArgs::try_parse_from([
            "sweep-bench", "sort", "--size", "64K", "--strategy", "drs", "--key-type", "float32",
            "--descending", "--pairs", "--entropy", "3", "--workers", "2",
        ])
        .unwrap();
        assert_eq!(args.device.workers, Some(2));
        match args.command {
            Command::Sort(sort) => {
                assert_eq!(sort.size, 64_000);
                assert_eq!(sort.strategy, Some(SortStrategyArg::DeviceRadixSort));
                assert_eq!(sort.key_type, KeyTypeArg::Float32);
                assert!(sort.descending && sort.pairs);
                assert_eq!(entropy_preset(sort.entropy), EntropyPreset::Bits337);
            }
            other => panic!("expected sort, got {other:?}"),
        }
    }

    #[test]
    fn test_entropy_out_of_range_rejected() {
        assert!(SweepArgs::try_parse_from(["sweep-bench", "sort", "--entropy", "5"]).is_err());
    }

    #[test]
    fn test_partition_size_requires_threads() {
        assert!(SweepArgs::try_parse_from(["sweep-bench", "--partition-size", "1024", "scan"]).is_err());
        let args = SweepArgs::try_parse_from([
            "sweep-bench", "scan", "--partition-size", "1024", "--threads-per-group", "128", "--exclusive",
        ])
        .unwrap();
        assert_eq!(args.device.partition_size, Some(1024));
        assert!(matches!(args.command, Command::Scan(ScanArgs { exclusive: true, .. })));
    }

    #[test]
    fn test_threads_per_group_requires_partition_size() {
        let err = SweepArgs::try_parse_from(["sweep-bench", "--threads-per-group", "128", "scan"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(SweepArgs::try_parse_from(["sweep-bench", "sort", "--threads-per-group", "64"]).is_err());
    }

    #[test]
    fn test_parse_wide_key_type() {
        let args = SweepArgs::try_parse_from(["sweep-bench", "sort", "--key-type", "float64"]).unwrap();
        match args.command {
            Command::Sort(sort) => assert_eq!(KeyType::from(sort.key_type), KeyType::Float64),
            other => panic!("expected sort, got {other:?}"),
        }
    }

    #[test]
    fn test_test_all_default_suite() {
        let args = SweepArgs::try_parse_from(["sweep-bench", "test-all"]).unwrap();
        assert!(matches!(args.command, Command::TestAll(TestAllArgs { suite: Suite::All })));
    }
}
