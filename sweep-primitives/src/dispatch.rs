//! Grid sizing and large-dispatch tiling.
//!
//! A single launch may not exceed `max_dim` groups in any dimension. When a
//! kernel needs more groups than that, the launch is split into a full tile
//! of `(max_dim, full_blocks, 1)` groups and a partial tile of
//! `(remainder, 1, 1)` groups. Kernels recover their logical group index from
//! the physical group id and the tiling word in their constants.

/// Default per-dimension dispatch limit.
pub const MAX_DISPATCH_DIMENSION: u32 = 65_535;

/// Number of groups launched along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub fn group_count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Physical `[x, y, z]` group id for a flat index in x-major order.
    pub fn unflatten(&self, flat: u64) -> [u32; 3] {
        let x = self.x.max(1) as u64;
        let y = self.y.max(1) as u64;
        [
            (flat % x) as u32,
            ((flat / x) % y) as u32,
            (flat / (x * y)) as u32,
        ]
    }
}

/// Which half of a tiled launch a dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    /// `(max_dim, rows, 1)` launch, or any launch that fits in one row.
    Full,
    /// Tail launch following `full_blocks` complete rows.
    Partial { full_blocks: u32 },
}

const PARTIAL_FLAG: u32 = 1;

impl TileMode {
    /// Pack into one constant word: bit 0 is the partial flag, the rest the
    /// full-row count.
    pub fn encode(self) -> u32 {
        match self {
            TileMode::Full => 0,
            TileMode::Partial { full_blocks } => (full_blocks << 1) | PARTIAL_FLAG,
        }
    }

    pub fn decode(word: u32) -> Self {
        if word & PARTIAL_FLAG == 0 {
            TileMode::Full
        } else {
            TileMode::Partial {
                full_blocks: word >> 1,
            }
        }
    }

    pub fn is_partial(self) -> bool {
        matches!(self, TileMode::Partial { .. })
    }
}

/// One launch of a tiled dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTile {
    pub grid: GridSize,
    pub mode: TileMode,
}

/// Split `thread_blocks` logical groups into at most two launches.
///
/// Returns an empty plan for zero groups. A launch that fits in one row is a
/// single `Full` tile of `(thread_blocks, 1, 1)`.
pub fn plan_dispatch(thread_blocks: u32, max_dim: u32) -> Vec<DispatchTile> {
    let max_dim = max_dim.max(1);
    if thread_blocks <= max_dim {
        return match thread_blocks {
            0 => Vec::new(),
            n => vec![DispatchTile {
                grid: GridSize::linear(n),
                mode: TileMode::Full,
            }],
        };
    }

    let full_blocks = thread_blocks / max_dim;
    let remainder = thread_blocks % max_dim;
    let mut tiles = vec![DispatchTile {
        grid: GridSize::new(max_dim, full_blocks, 1),
        mode: TileMode::Full,
    }];
    if remainder > 0 {
        tiles.push(DispatchTile {
            grid: GridSize::linear(remainder),
            mode: TileMode::Partial { full_blocks },
        });
    }
    tiles
}

/// Logical group index of a physical group id under a tiling mode.
pub fn logical_group_index(group_id: [u32; 3], mode: TileMode, max_dim: u32) -> u32 {
    match mode {
        TileMode::Full => group_id[0] + group_id[1] * max_dim,
        TileMode::Partial { full_blocks } => group_id[0] + full_blocks * max_dim,
    }
}
