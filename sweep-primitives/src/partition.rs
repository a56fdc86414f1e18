//! Partition model: contiguous fixed-size tiles over an input of `len` elements.

use std::ops::Range;

/// Division of `len` elements into tiles of `partition_size`.
///
/// The last tile holds `len % partition_size` elements when the input is not
/// a multiple of the partition size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    len: usize,
    partition_size: usize,
}

impl PartitionLayout {
    /// `partition_size` is clamped to at least one element.
    pub fn new(len: usize, partition_size: usize) -> Self {
        Self {
            len,
            partition_size: partition_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Number of partitions, `ceil(len / partition_size)`.
    pub fn count(&self) -> usize {
        self.len.div_ceil(self.partition_size)
    }

    /// Element range covered by partition `p`; empty past the end.
    pub fn range(&self, p: usize) -> Range<usize> {
        let start = p.saturating_mul(self.partition_size).min(self.len);
        let end = start.saturating_add(self.partition_size).min(self.len);
        start..end
    }

    pub fn tile_len(&self, p: usize) -> usize {
        self.range(p).len()
    }

    pub fn is_partial(&self, p: usize) -> bool {
        let tile = self.tile_len(p);
        tile > 0 && tile < self.partition_size
    }
}
