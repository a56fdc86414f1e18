//! Constant blocks passed to every dispatch.
//!
//! Laid out as #[repr(C)] 16-byte structs, the same shape a root-constant
//! or push-constant block has on real hardware.

use crate::dispatch::TileMode;

/// Per-dispatch constants shared by scan and sort kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchConstants {
    /// Number of elements the kernel operates on.
    pub size: u32,
    /// Total number of logical groups (partitions) across all tiles.
    pub thread_blocks: u32,
    /// Bit offset of the current radix digit; zero for scans.
    pub radix_shift: u32,
    /// Encoded [`TileMode`].
    pub tiling: u32,
}

impl DispatchConstants {
    pub fn new(size: u32, thread_blocks: u32) -> Self {
        Self {
            size,
            thread_blocks,
            radix_shift: 0,
            tiling: TileMode::Full.encode(),
        }
    }

    pub fn with_radix_shift(mut self, radix_shift: u32) -> Self {
        self.radix_shift = radix_shift;
        self
    }

    pub fn with_tile_mode(mut self, mode: TileMode) -> Self {
        self.tiling = mode.encode();
        self
    }

    pub fn tile_mode(&self) -> TileMode {
        TileMode::decode(self.tiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_constants_layout() {
        assert_eq!(
            std::mem::size_of::<DispatchConstants>(),
            16,
            "DispatchConstants must be 16 bytes"
        );
        assert_eq!(std::mem::align_of::<DispatchConstants>(), 4);
    }

    #[test]
    fn test_dispatch_constants_field_offsets() {
        let c = DispatchConstants::default();
        let base = &c as *const _ as usize;
        assert_eq!(&c.size as *const _ as usize - base, 0);
        assert_eq!(&c.thread_blocks as *const _ as usize - base, 4);
        assert_eq!(&c.radix_shift as *const _ as usize - base, 8);
        assert_eq!(&c.tiling as *const _ as usize - base, 12);
    }

    #[test]
    fn test_tile_mode_survives_constants() {
        let c = DispatchConstants::new(100, 7)
            .with_radix_shift(16)
            .with_tile_mode(TileMode::Partial { full_blocks: 3 });
        assert_eq!(c.radix_shift, 16);
        assert_eq!(c.tile_mode(), TileMode::Partial { full_blocks: 3 });
        assert_eq!(DispatchConstants::new(1, 1).tile_mode(), TileMode::Full);
    }
}
