//! Per-group tile work shared by both scan strategies.

use std::ops::Range;

use sweep_primitives::DeviceBuffer;

use crate::ScanKind;

/// Wrapping sum of one tile.
pub(crate) fn reduce_tile(input: &DeviceBuffer, range: Range<usize>) -> u32 {
    range.map(|i| input.load(i)).fold(0, u32::wrapping_add)
}

/// Scan one tile seeded with `prefix`, the sum of everything before it.
pub(crate) fn scan_tile(
    input: &DeviceBuffer,
    output: &DeviceBuffer,
    range: Range<usize>,
    prefix: u32,
    kind: ScanKind,
) {
    let mut running = prefix;
    for i in range {
        let value = input.load(i);
        match kind {
            ScanKind::Inclusive => {
                running = running.wrapping_add(value);
                output.store(i, running);
            }
            ScanKind::Exclusive => {
                output.store(i, running);
                running = running.wrapping_add(value);
            }
        }
    }
}
