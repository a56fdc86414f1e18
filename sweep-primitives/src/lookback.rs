//! Decoupled lookback: lock-free hand-off of running prefixes between
//! partitions of one dispatch.
//!
//! Each slot packs a status tag and a 32-bit value into a single 64-bit
//! atomic word, so a reader never observes a value without its status. The
//! status occupies the high half, which makes `fetch_max` a monotonic
//! publish: a slot moves `NotReady -> Aggregate -> Prefix` and never back.
//!
//! Partition indices must come from a dispatch-bump counter
//! ([`claim_partition`]), never from the physical group id. A claimed
//! partition is always running, so every lower slot it waits on is owned by a
//! group that will eventually publish.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::buffer::{DeviceBuffer, Reservation, Resource, ResourceId};

/// Spins before a waiting group starts yielding its worker.
const SPIN_LIMIT: u32 = 64;

/// Publication state of one lookback slot.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotStatus {
    NotReady = 0,
    /// Value is the partition's own aggregate.
    Aggregate = 1,
    /// Value is the inclusive prefix through this partition.
    Prefix = 2,
}

/// Decoded contents of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub status: SlotStatus,
    pub value: u32,
}

impl SlotState {
    pub const NOT_READY: SlotState = SlotState {
        status: SlotStatus::NotReady,
        value: 0,
    };

    pub fn pack(self) -> u64 {
        ((self.status as u64) << 32) | self.value as u64
    }

    pub fn unpack(word: u64) -> Self {
        let status = match word >> 32 {
            0 => SlotStatus::NotReady,
            1 => SlotStatus::Aggregate,
            _ => SlotStatus::Prefix,
        };
        Self {
            status,
            value: word as u32,
        }
    }
}

struct TableStorage {
    id: ResourceId,
    label: String,
    partitions: usize,
    lanes: usize,
    slots: Box<[AtomicU64]>,
    _reservation: Reservation,
}

/// `partitions x lanes` lookback slots in device memory.
///
/// Scans use one lane; digit binning uses one lane per digit value.
#[derive(Clone)]
pub struct LookbackTable {
    inner: Arc<TableStorage>,
}

impl LookbackTable {
    pub(crate) fn new(label: &str, partitions: usize, lanes: usize, reservation: Reservation) -> Self {
        let slots = (0..partitions * lanes)
            .map(|_| AtomicU64::new(SlotState::NOT_READY.pack()))
            .collect();
        Self {
            inner: Arc::new(TableStorage {
                id: ResourceId::next(),
                label: label.to_string(),
                partitions,
                lanes,
                slots,
                _reservation: reservation,
            }),
        }
    }

    /// Bytes a table of this shape occupies.
    pub const fn bytes_for(partitions: usize, lanes: usize) -> u64 {
        (partitions * lanes) as u64 * 8
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    pub fn lanes(&self) -> usize {
        self.inner.lanes
    }

    pub fn slot_count(&self) -> usize {
        self.inner.slots.len()
    }

    #[inline]
    fn slot(&self, partition: usize, lane: usize) -> &AtomicU64 {
        &self.inner.slots[partition * self.inner.lanes + lane]
    }

    /// Return `count` slots starting at flat index `start` to `NotReady`.
    pub fn reset_range(&self, start: usize, count: usize) {
        let end = (start + count).min(self.slot_count());
        for slot in &self.inner.slots[start.min(end)..end] {
            slot.store(SlotState::NOT_READY.pack(), Ordering::Relaxed);
        }
    }

    pub fn load(&self, partition: usize, lane: usize) -> SlotState {
        SlotState::unpack(self.slot(partition, lane).load(Ordering::Acquire))
    }

    /// Advance a slot. Publishing a lower state than the current one is a
    /// no-op.
    pub fn publish(&self, partition: usize, lane: usize, status: SlotStatus, value: u32) {
        let word = SlotState { status, value }.pack();
        self.slot(partition, lane).fetch_max(word, Ordering::AcqRel);
    }

    fn wait_for(&self, partition: usize, lane: usize) -> SlotState {
        let mut spins = 0u32;
        loop {
            let state = self.load(partition, lane);
            if state.status != SlotStatus::NotReady {
                return state;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Walk back from `partition - 1` until a `Prefix` slot is found.
    fn look_back(&self, partition: usize, lane: usize) -> u32 {
        let mut prefix = 0u32;
        let mut k = partition;
        while k > 0 {
            k -= 1;
            let state = self.wait_for(k, lane);
            prefix = prefix.wrapping_add(state.value);
            if state.status == SlotStatus::Prefix {
                break;
            }
        }
        prefix
    }

    /// Resolve the exclusive prefix of `partition` on lane 0.
    pub fn resolve(&self, partition: usize, aggregate: u32) -> u32 {
        self.resolve_lane(partition, 0, aggregate)
    }

    /// Publish `aggregate`, look back for the exclusive prefix, then publish
    /// the inclusive prefix. Returns the exclusive prefix.
    pub fn resolve_lane(&self, partition: usize, lane: usize, aggregate: u32) -> u32 {
        if partition == 0 {
            self.publish(0, lane, SlotStatus::Prefix, aggregate);
            return 0;
        }
        self.publish(partition, lane, SlotStatus::Aggregate, aggregate);
        let prefix = self.look_back(partition, lane);
        self.publish(partition, lane, SlotStatus::Prefix, prefix.wrapping_add(aggregate));
        prefix
    }

    /// [`resolve_lane`](Self::resolve_lane) for every lane at once.
    ///
    /// All aggregates are published before any lane looks back, so higher
    /// partitions are never held up by this partition's own lookback.
    pub fn resolve_lanes(&self, partition: usize, aggregates: &[u32]) -> Vec<u32> {
        debug_assert_eq!(aggregates.len(), self.lanes());
        if partition == 0 {
            for (lane, &a) in aggregates.iter().enumerate() {
                self.publish(0, lane, SlotStatus::Prefix, a);
            }
            return vec![0; aggregates.len()];
        }
        for (lane, &a) in aggregates.iter().enumerate() {
            self.publish(partition, lane, SlotStatus::Aggregate, a);
        }
        aggregates
            .iter()
            .enumerate()
            .map(|(lane, &a)| {
                let prefix = self.look_back(partition, lane);
                self.publish(partition, lane, SlotStatus::Prefix, prefix.wrapping_add(a));
                prefix
            })
            .collect()
    }
}

impl Resource for LookbackTable {
    fn resource_id(&self) -> ResourceId {
        self.inner.id
    }

    fn label(&self) -> &str {
        &self.inner.label
    }
}

impl fmt::Debug for LookbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookbackTable")
            .field("label", &self.inner.label)
            .field("partitions", &self.inner.partitions)
            .field("lanes", &self.inner.lanes)
            .finish()
    }
}

/// Claim the next logical partition from the bump counter at `index`.
#[inline]
pub fn claim_partition(counter: &DeviceBuffer, index: usize) -> u32 {
    counter.fetch_add(index, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryLedger;

    fn table(partitions: usize, lanes: usize) -> LookbackTable {
        let ledger = Arc::new(MemoryLedger::new(u64::MAX));
        let reservation = ledger
            .reserve(LookbackTable::bytes_for(partitions, lanes))
            .unwrap();
        LookbackTable::new("test", partitions, lanes, reservation)
    }

    #[test]
    fn test_pack_unpack() {
        let s = SlotState {
            status: SlotStatus::Aggregate,
            value: 0xDEAD_BEEF,
        };
        assert_eq!(SlotState::unpack(s.pack()), s);
        assert_eq!(SlotState::unpack(0), SlotState::NOT_READY);
    }

    #[test]
    fn test_publish_never_regresses() {
        let t = table(1, 1);
        t.publish(0, 0, SlotStatus::Prefix, 5);
        t.publish(0, 0, SlotStatus::Aggregate, 1_000);
        assert_eq!(
            t.load(0, 0),
            SlotState {
                status: SlotStatus::Prefix,
                value: 5
            }
        );
    }

    #[test]
    fn test_partition_zero_publishes_prefix() {
        let t = table(2, 1);
        assert_eq!(t.resolve(0, 7), 0);
        assert_eq!(t.load(0, 0).status, SlotStatus::Prefix);
        assert_eq!(t.load(0, 0).value, 7);
    }

    #[test]
    fn test_in_order_resolution() {
        let t = table(4, 1);
        let aggregates = [3u32, 1, 4, 1];
        let prefixes: Vec<u32> = aggregates
            .iter()
            .enumerate()
            .map(|(p, &a)| t.resolve(p, a))
            .collect();
        assert_eq!(prefixes, vec![0, 3, 4, 8]);
        assert_eq!(t.load(3, 0).value, 9);
    }

    #[test]
    fn test_accumulates_across_aggregates() {
        let t = table(4, 1);
        t.resolve(0, 10);
        t.publish(1, 0, SlotStatus::Aggregate, 20);
        t.publish(2, 0, SlotStatus::Aggregate, 30);
        assert_eq!(t.resolve(3, 1), 60);
        assert_eq!(t.load(3, 0).value, 61);
    }

    #[test]
    fn test_waits_for_not_ready_slot() {
        let t = table(2, 1);
        let waiter = t.clone();
        let handle = std::thread::spawn(move || waiter.resolve(1, 2));
        std::thread::sleep(std::time::Duration::from_millis(20));
        t.resolve(0, 40);
        assert_eq!(handle.join().unwrap(), 40);
    }

    #[test]
    fn test_concurrent_partitions_match_sequential_prefix() {
        let partitions = 64;
        let t = table(partitions, 1);
        let counter_ledger = Arc::new(MemoryLedger::new(u64::MAX));
        let counter = DeviceBuffer::new(
            "bump",
            1,
            crate::buffer::BufferUsage::DeviceLocal,
            counter_ledger.reserve(4).unwrap(),
        );
        let results: Vec<(u32, u32)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..partitions)
                .map(|_| {
                    s.spawn(|| {
                        let p = claim_partition(&counter, 0);
                        (p, t.resolve(p as usize, p + 1))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (p, prefix) in results {
            assert_eq!(prefix, p * (p + 1) / 2, "partition {p}");
        }
    }

    #[test]
    fn test_resolve_lanes_independent() {
        let t = table(3, 4);
        assert_eq!(t.resolve_lanes(0, &[1, 0, 2, 0]), vec![0, 0, 0, 0]);
        assert_eq!(t.resolve_lanes(1, &[1, 1, 0, 5]), vec![1, 0, 2, 0]);
        assert_eq!(t.resolve_lanes(2, &[0, 0, 0, 0]), vec![2, 1, 2, 5]);
    }

    #[test]
    fn test_values_wrap() {
        let t = table(2, 1);
        t.resolve(0, u32::MAX);
        assert_eq!(t.resolve(1, 2), u32::MAX);
        assert_eq!(t.load(1, 0).value, 1);
    }

    #[test]
    fn test_reset_range() {
        let t = table(2, 2);
        t.resolve_lanes(0, &[1, 1]);
        t.reset_range(0, 2);
        assert_eq!(t.load(0, 0), SlotState::NOT_READY);
        assert_eq!(t.load(0, 1), SlotState::NOT_READY);
        t.reset_range(3, 100);
    }
}
