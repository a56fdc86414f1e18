//! Device capability description and strategy gating.
//!
//! A device reports its wave (SIMD) layout, intrinsic support and memory.
//! Scan and sort engines consult these predicates once, at construction,
//! to decide whether the lock-free lookback strategies may run.

/// Capabilities reported by a compute device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human readable adapter name.
    pub description: String,
    /// Smallest wave width the device may schedule.
    pub simd_width: u32,
    /// Largest wave width the device may schedule.
    pub simd_max_width: u32,
    /// Total number of lanes across all compute units.
    pub simd_lane_count: u32,
    pub supports_wave_intrinsics: bool,
    pub supports_16bit_types: bool,
    /// Whether a running group is guaranteed to make progress while other
    /// groups spin. Software rasterizers and some emulators do not.
    pub independent_forward_progress: bool,
    pub dedicated_memory_bytes: u64,
    pub shared_memory_bytes: u64,
}

/// Wave width of the software device.
const SOFTWARE_SIMD_WIDTH: u32 = 32;

/// Memory the software device advertises when nothing else is configured.
const SOFTWARE_MEMORY_BYTES: u64 = 4 << 30;

impl DeviceInfo {
    /// Describe the software device backed by `workers` host threads.
    pub fn software(workers: usize) -> Self {
        let workers = workers.max(1) as u32;
        Self {
            description: format!("Software compute device ({workers} workers)"),
            simd_width: SOFTWARE_SIMD_WIDTH,
            simd_max_width: SOFTWARE_SIMD_WIDTH,
            simd_lane_count: workers.saturating_mul(SOFTWARE_SIMD_WIDTH),
            supports_wave_intrinsics: true,
            supports_16bit_types: true,
            independent_forward_progress: true,
            dedicated_memory_bytes: 0,
            shared_memory_bytes: SOFTWARE_MEMORY_BYTES,
        }
    }

    /// Detect the host's software device.
    pub fn detect() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::software(workers)
    }

    pub fn total_memory_bytes(&self) -> u64 {
        self.dedicated_memory_bytes
            .saturating_add(self.shared_memory_bytes)
    }

    /// Reduce-then-scan and DeviceRadixSort only need barriers between
    /// dispatches plus a minimal wave width.
    pub fn supports_barrier_strategies(&self) -> bool {
        self.simd_width >= 4
    }

    /// Chained scan and OneSweep spin on other groups' published state.
    pub fn supports_lookback_strategies(&self) -> bool {
        self.lookback_unavailable_reason().is_none()
    }

    /// Why the lookback strategies cannot run here, if they cannot.
    pub fn lookback_unavailable_reason(&self) -> Option<&'static str> {
        if !self.supports_barrier_strategies() {
            Some("wave width below 4 lanes")
        } else if !self.supports_wave_intrinsics {
            Some("device lacks wave intrinsics")
        } else if !self.independent_forward_progress {
            Some("device does not guarantee forward progress across groups")
        } else {
            None
        }
    }

    /// Why the barrier strategies cannot run here, if they cannot.
    pub fn barrier_unavailable_reason(&self) -> Option<&'static str> {
        if self.supports_barrier_strategies() {
            None
        } else {
            Some("wave width below 4 lanes")
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::detect()
    }
}
