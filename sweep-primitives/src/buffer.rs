//! Device buffers and memory accounting.
//!
//! Device memory is a slab of 32-bit atomic words. Every allocation is
//! charged against the device's memory budget and returned when the last
//! handle drops. Handles are cheap to clone; a command list keeps the
//! buffers it binds alive until it has executed.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::device::DeviceError;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a bindable device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything a kernel can bind and a barrier can name.
pub trait Resource {
    fn resource_id(&self) -> ResourceId;
    fn label(&self) -> &str;
}

/// Where a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Working storage; never mapped by the host.
    DeviceLocal,
    /// Staging storage the host may copy out of.
    HostReadable,
}

/// Byte budget with current and peak usage.
#[derive(Debug)]
pub(crate) struct MemoryLedger {
    budget: u64,
    allocated: AtomicU64,
    peak: AtomicU64,
}

impl MemoryLedger {
    pub(crate) fn new(budget: u64) -> Self {
        Self {
            budget,
            allocated: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    pub(crate) fn budget(&self) -> u64 {
        self.budget
    }

    pub(crate) fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub(crate) fn available(&self) -> u64 {
        self.budget.saturating_sub(self.allocated())
    }

    /// Charge `bytes` against the budget, failing instead of overcommitting.
    pub(crate) fn reserve(self: &Arc<Self>, bytes: u64) -> Result<Reservation, DeviceError> {
        let mut current = self.allocated.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.budget {
                return Err(DeviceError::OutOfMemory {
                    requested: bytes,
                    available: self.budget.saturating_sub(current),
                });
            }
            match self.allocated.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::Relaxed);
                    return Ok(Reservation {
                        ledger: Arc::clone(self),
                        bytes,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// Bytes held on behalf of one allocation; released on drop.
#[derive(Debug)]
pub(crate) struct Reservation {
    ledger: Arc<MemoryLedger>,
    bytes: u64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

struct BufferStorage {
    id: ResourceId,
    label: String,
    usage: BufferUsage,
    words: Box<[AtomicU32]>,
    _reservation: Reservation,
}

/// Handle to a region of 32-bit device words.
#[derive(Clone)]
pub struct DeviceBuffer {
    inner: Arc<BufferStorage>,
}

impl DeviceBuffer {
    pub(crate) fn new(
        label: &str,
        len: usize,
        usage: BufferUsage,
        reservation: Reservation,
    ) -> Self {
        let words = (0..len).map(|_| AtomicU32::new(0)).collect();
        Self {
            inner: Arc::new(BufferStorage {
                id: ResourceId::next(),
                label: label.to_string(),
                usage,
                words,
                _reservation: reservation,
            }),
        }
    }

    /// Bytes a buffer of `len` words occupies.
    pub const fn bytes_for(len: usize) -> u64 {
        len as u64 * 4
    }

    pub fn len(&self) -> usize {
        self.inner.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.words.is_empty()
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.usage
    }

    pub fn size_bytes(&self) -> u64 {
        Self::bytes_for(self.len())
    }

    #[inline]
    pub fn load(&self, index: usize) -> u32 {
        self.inner.words[index].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, index: usize, value: u32) {
        self.inner.words[index].store(value, Ordering::Relaxed);
    }

    /// Device-wide atomic add; returns the previous value.
    #[inline]
    pub fn fetch_add(&self, index: usize, value: u32) -> u32 {
        self.inner.words[index].fetch_add(value, Ordering::AcqRel)
    }

    /// Set `count` words starting at `offset` to `value`.
    pub fn fill(&self, offset: usize, count: usize, value: u32) {
        for word in &self.inner.words[offset..offset + count] {
            word.store(value, Ordering::Relaxed);
        }
    }

    pub(crate) fn check_range(&self, offset: usize, count: usize) -> Result<(), DeviceError> {
        match offset.checked_add(count) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(DeviceError::OutOfRange {
                label: self.inner.label.clone(),
                offset,
                count,
                len: self.len(),
            }),
        }
    }

    pub(crate) fn write_words(&self, offset: usize, data: &[u32]) -> Result<(), DeviceError> {
        self.check_range(offset, data.len())?;
        for (word, &value) in self.inner.words[offset..].iter().zip(data) {
            word.store(value, Ordering::Relaxed);
        }
        Ok(())
    }

    pub(crate) fn read_words(&self, offset: usize, count: usize) -> Result<Vec<u32>, DeviceError> {
        self.check_range(offset, count)?;
        Ok(self.inner.words[offset..offset + count]
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect())
    }
}

impl Resource for DeviceBuffer {
    fn resource_id(&self) -> ResourceId {
        self.inner.id
    }

    fn label(&self) -> &str {
        &self.inner.label
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("label", &self.inner.label)
            .field("len", &self.len())
            .field("usage", &self.inner.usage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let ledger = Arc::new(MemoryLedger::new(1024));
        let a = ledger.reserve(600).unwrap();
        assert_eq!(ledger.allocated(), 600);
        assert!(ledger.reserve(600).is_err());
        drop(a);
        assert_eq!(ledger.allocated(), 0);
        assert_eq!(ledger.peak(), 600);
        assert!(ledger.reserve(1024).is_ok());
    }

    #[test]
    fn test_out_of_memory_reports_available() {
        let ledger = Arc::new(MemoryLedger::new(100));
        let _held = ledger.reserve(40).unwrap();
        match ledger.reserve(80) {
            Err(DeviceError::OutOfMemory {
                requested,
                available,
            }) => {
                assert_eq!(requested, 80);
                assert_eq!(available, 60);
            }
            other => panic!("expected OutOfMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_buffer_words_start_zeroed() {
        let ledger = Arc::new(MemoryLedger::new(u64::MAX));
        let reservation = ledger.reserve(DeviceBuffer::bytes_for(16)).unwrap();
        let buf = DeviceBuffer::new("zeroed", 16, BufferUsage::DeviceLocal, reservation);
        assert_eq!(buf.read_words(0, 16).unwrap(), vec![0; 16]);
        assert_eq!(buf.size_bytes(), 64);
    }

    #[test]
    fn test_write_out_of_range_rejected() {
        let ledger = Arc::new(MemoryLedger::new(u64::MAX));
        let reservation = ledger.reserve(16).unwrap();
        let buf = DeviceBuffer::new("small", 4, BufferUsage::DeviceLocal, reservation);
        assert!(matches!(
            buf.write_words(2, &[1, 2, 3]),
            Err(DeviceError::OutOfRange { len: 4, .. })
        ));
        assert!(buf.read_words(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_fetch_add_returns_previous() {
        let ledger = Arc::new(MemoryLedger::new(u64::MAX));
        let reservation = ledger.reserve(4).unwrap();
        let buf = DeviceBuffer::new("counter", 1, BufferUsage::DeviceLocal, reservation);
        assert_eq!(buf.fetch_add(0, 1), 0);
        assert_eq!(buf.fetch_add(0, 1), 1);
        assert_eq!(buf.load(0), 2);
    }

    #[test]
    fn test_resource_ids_unique() {
        assert_ne!(ResourceId::next(), ResourceId::next());
    }
}
