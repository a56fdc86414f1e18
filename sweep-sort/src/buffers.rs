//! Ping-pong key/payload storage and the per-tile digit work shared by both
//! sort strategies.
//!
//! Element `i` of a `words`-wide buffer occupies words `i * words ..` with
//! the low word first.

use std::ops::Range;

use sweep_primitives::{Binding, BufferUsage, CommandList, Device, DeviceBuffer, DeviceError};

use crate::keys::{KeyTransform, RADIX};

#[inline]
pub(crate) fn load_element(buf: &DeviceBuffer, i: usize, words: usize) -> u64 {
    let base = i * words;
    let lo = buf.load(base) as u64;
    if words == 2 {
        lo | (buf.load(base + 1) as u64) << 32
    } else {
        lo
    }
}

#[inline]
pub(crate) fn store_element(buf: &DeviceBuffer, i: usize, words: usize, bits: u64) {
    let base = i * words;
    buf.store(base, bits as u32);
    if words == 2 {
        buf.store(base + 1, (bits >> 32) as u32);
    }
}

/// Split elements into device words, low word first.
pub(crate) fn to_words(bits: impl IntoIterator<Item = u64>, words: usize) -> Vec<u32> {
    let mut out = Vec::new();
    for b in bits {
        out.push(b as u32);
        if words == 2 {
            out.push((b >> 32) as u32);
        }
    }
    out
}

/// Inverse of [`to_words`].
pub(crate) fn from_words(raw: &[u32], words: usize) -> Vec<u64> {
    if words == 2 {
        raw.chunks_exact(2)
            .map(|w| w[0] as u64 | (w[1] as u64) << 32)
            .collect()
    } else {
        raw.iter().map(|&w| w as u64).collect()
    }
}

/// Two equal-sized buffers whose roles swap after every pass.
pub(crate) struct BufferPair {
    current: DeviceBuffer,
    alternate: DeviceBuffer,
}

impl BufferPair {
    pub(crate) fn allocate(device: &Device, label: &str, len: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            current: device.alloc_buffer(label, len, BufferUsage::DeviceLocal)?,
            alternate: device.alloc_buffer(&format!("alt-{label}"), len, BufferUsage::DeviceLocal)?,
        })
    }

    pub(crate) fn current(&self) -> &DeviceBuffer {
        &self.current
    }

    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.alternate);
    }
}

/// Keys and optional payloads of a sorter.
pub(crate) struct SortBuffers {
    pub(crate) keys: BufferPair,
    pub(crate) payloads: Option<BufferPair>,
    pub(crate) key_words: usize,
    pub(crate) payload_words: usize,
}

impl SortBuffers {
    /// Buffers for `len` elements of `key_words` words, plus payloads of
    /// `payload_words` words when given.
    pub(crate) fn allocate(
        device: &Device,
        len: usize,
        key_words: usize,
        payload_words: Option<usize>,
    ) -> Result<Self, DeviceError> {
        let keys = BufferPair::allocate(device, "sort", len * key_words)?;
        let payloads = match payload_words {
            Some(words) => Some(BufferPair::allocate(device, "payload", len * words)?),
            None => None,
        };
        Ok(Self {
            keys,
            payloads,
            key_words,
            payload_words: payload_words.unwrap_or(0),
        })
    }

    /// Bytes for `len` elements, both roles.
    pub(crate) fn bytes_for(len: usize, key_words: usize, payload_words: Option<usize>) -> u64 {
        DeviceBuffer::bytes_for(2 * len * (key_words + payload_words.unwrap_or(0)))
    }

    /// Source and destination handles for the next pass.
    pub(crate) fn pass(&self) -> PassBuffers {
        PassBuffers {
            keys: self.keys.current.clone(),
            alt_keys: self.keys.alternate.clone(),
            payloads: self.payloads.as_ref().map(|p| p.current.clone()),
            alt_payloads: self.payloads.as_ref().map(|p| p.alternate.clone()),
            key_words: self.key_words,
            payload_words: self.payload_words,
        }
    }

    pub(crate) fn swap(&mut self) {
        self.keys.swap();
        if let Some(payloads) = &mut self.payloads {
            payloads.swap();
        }
    }
}

/// Buffers one scatter pass reads from and writes to.
#[derive(Clone)]
pub(crate) struct PassBuffers {
    pub(crate) keys: DeviceBuffer,
    pub(crate) alt_keys: DeviceBuffer,
    pub(crate) payloads: Option<DeviceBuffer>,
    pub(crate) alt_payloads: Option<DeviceBuffer>,
    pub(crate) key_words: usize,
    pub(crate) payload_words: usize,
}

impl PassBuffers {
    pub(crate) fn scatter_bindings(&self) -> Vec<Binding> {
        let mut bindings = vec![Binding::read(&self.keys), Binding::write(&self.alt_keys)];
        if let (Some(src), Some(dst)) = (&self.payloads, &self.alt_payloads) {
            bindings.push(Binding::read(src));
            bindings.push(Binding::write(dst));
        }
        bindings
    }

    /// Make the scattered output visible to the next pass.
    pub(crate) fn barrier_outputs(&self, cmd: &mut CommandList) {
        cmd.barrier(&self.alt_keys);
        if let Some(dst) = &self.alt_payloads {
            cmd.barrier(dst);
        }
    }

    /// Move the elements of `range` to their destinations. `offsets[d]` is
    /// the first free slot for digit `d` and advances as elements land, so
    /// equal digits keep their input order.
    pub(crate) fn scatter_tile(
        &self,
        range: Range<usize>,
        transform: KeyTransform,
        shift: u32,
        offsets: &mut [u32; RADIX],
    ) {
        for i in range {
            let raw = load_element(&self.keys, i, self.key_words);
            let d = transform.digit(raw, shift);
            let dest = offsets[d] as usize;
            offsets[d] += 1;
            store_element(&self.alt_keys, dest, self.key_words, raw);
            if let (Some(src), Some(dst)) = (&self.payloads, &self.alt_payloads) {
                let words = self.payload_words;
                store_element(dst, dest, words, load_element(src, i, words));
            }
        }
    }
}

/// Digit counts of one tile.
pub(crate) fn tile_histogram(
    keys: &DeviceBuffer,
    range: Range<usize>,
    transform: KeyTransform,
    shift: u32,
) -> [u32; RADIX] {
    let words = transform.key_type.words();
    let mut hist = [0u32; RADIX];
    for i in range {
        hist[transform.digit(load_element(keys, i, words), shift)] += 1;
    }
    hist
}

/// Exclusive prefix of `counts` into `out`.
pub(crate) fn exclusive_offsets(counts: impl IntoIterator<Item = u32>, out: &mut [u32]) {
    let mut running = 0u32;
    for (slot, count) in out.iter_mut().zip(counts) {
        *slot = running;
        running = running.wrapping_add(count);
    }
}
