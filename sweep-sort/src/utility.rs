//! Test-input generation and the inversion-count validator.

use std::fmt;

use sweep_primitives::{
    Binding, DeviceBuffer, GroupContext, Kernel, PartitionLayout,
};

use crate::buffers::{load_element, store_element};
use crate::keys::{KeyTransform, KeyType, PayloadType};

/// Elements generated or validated by one group.
pub(crate) const UTILITY_CHUNK: usize = 4096;

/// Digit-distribution skew of generated keys.
///
/// Each preset ANDs together one more independent random word, so every key
/// bit is set with probability `2^-k`. The result is Shannon entropy per bit
/// of 1.0, .811, .544, .337 and .201.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntropyPreset {
    #[default]
    Bits1000,
    Bits811,
    Bits544,
    Bits337,
    Bits201,
}

impl EntropyPreset {
    pub const ALL: [EntropyPreset; 5] = [
        EntropyPreset::Bits1000,
        EntropyPreset::Bits811,
        EntropyPreset::Bits544,
        EntropyPreset::Bits337,
        EntropyPreset::Bits201,
    ];

    /// Preset by position, 0 being uniform keys.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Random words ANDed into each key.
    pub fn and_count(self) -> u32 {
        self as u32 + 1
    }

    /// Effective entropy per key bit.
    pub fn bits(self) -> f64 {
        match self {
            EntropyPreset::Bits1000 => 1.0,
            EntropyPreset::Bits811 => 0.811,
            EntropyPreset::Bits544 => 0.544,
            EntropyPreset::Bits337 => 0.337,
            EntropyPreset::Bits201 => 0.201,
        }
    }
}

impl fmt::Display for EntropyPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} bits", self.bits())
    }
}

/// Integer finalizer with good avalanche; a bijection on `u32`.
#[inline]
fn mix(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Deterministic random word for element `index` of a generated input.
#[inline]
pub fn random_word(seed: u32, index: u32, round: u32) -> u32 {
    mix(index ^ mix(seed ^ mix(round.wrapping_mul(0x9e37_79b9))))
}

/// Generated key for element `index` under an entropy preset.
pub fn entropy_key(seed: u32, index: u32, entropy: EntropyPreset) -> u32 {
    (0..entropy.and_count()).fold(u32::MAX, |key, round| key & random_word(seed, index, round))
}

/// Generated 64-bit key: two independently drawn words under one preset.
pub fn entropy_key_wide(seed: u32, index: u32, entropy: EntropyPreset) -> u64 {
    entropy_key(seed, index, entropy) as u64 | (entropy_key(!seed, index, entropy) as u64) << 32
}

/// Generated key bits for element `index` of a `key_type` input.
pub fn generated_key(key_type: KeyType, seed: u32, index: u32, entropy: EntropyPreset) -> u64 {
    if key_type.words() == 2 {
        entropy_key_wide(seed, index, entropy)
    } else {
        entropy_key(seed, index, entropy) as u64
    }
}

/// Fill the current key buffer with generated keys. In pair mode each
/// payload repeats its key's bits, truncated to the payload width, which
/// lets the validator check pairing.
pub(crate) struct InitSortInput {
    pub(crate) keys: DeviceBuffer,
    pub(crate) key_type: KeyType,
    pub(crate) payloads: Option<(DeviceBuffer, PayloadType)>,
    pub(crate) seed: u32,
    pub(crate) entropy: EntropyPreset,
}

impl Kernel for InitSortInput {
    fn name(&self) -> &'static str {
        "InitSortInput"
    }

    fn bindings(&self) -> Vec<Binding> {
        let mut bindings = vec![Binding::write(&self.keys)];
        if let Some((payloads, _)) = &self.payloads {
            bindings.push(Binding::write(payloads));
        }
        bindings
    }

    fn execute_group(&self, group: &GroupContext) {
        let layout = PartitionLayout::new(group.constants.size as usize, UTILITY_CHUNK);
        let words = self.key_type.words();
        for i in layout.range(group.logical_index() as usize) {
            let key = generated_key(self.key_type, self.seed, i as u32, self.entropy);
            store_element(&self.keys, i, words, key);
            if let Some((payloads, payload_type)) = &self.payloads {
                store_element(payloads, i, payload_type.words(), key & payload_type.mask());
            }
        }
    }
}

pub(crate) struct ClearErrorCount {
    pub(crate) error_count: DeviceBuffer,
}

impl Kernel for ClearErrorCount {
    fn name(&self) -> &'static str {
        "ClearErrorCount"
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::write(&self.error_count)]
    }

    fn execute_group(&self, _group: &GroupContext) {
        self.error_count.store(0, 0);
    }
}

/// Count adjacent out-of-order pairs, plus payloads that no longer mirror
/// their key when `check_pairing` is set.
pub(crate) struct Validate {
    pub(crate) keys: DeviceBuffer,
    pub(crate) payloads: Option<(DeviceBuffer, PayloadType)>,
    pub(crate) error_count: DeviceBuffer,
    pub(crate) transform: KeyTransform,
    pub(crate) check_pairing: bool,
}

impl Kernel for Validate {
    fn name(&self) -> &'static str {
        "Validate"
    }

    fn bindings(&self) -> Vec<Binding> {
        let mut bindings = vec![Binding::read(&self.keys), Binding::atomic(&self.error_count)];
        if let Some((payloads, _)) = &self.payloads {
            bindings.push(Binding::read(payloads));
        }
        bindings
    }

    fn execute_group(&self, group: &GroupContext) {
        let n = group.constants.size as usize;
        let layout = PartitionLayout::new(n, UTILITY_CHUNK);
        let words = self.transform.key_type.words();
        let mut errors = 0u32;
        for i in layout.range(group.logical_index() as usize) {
            let key = load_element(&self.keys, i, words);
            if i + 1 < n && !self.transform.in_order(key, load_element(&self.keys, i + 1, words)) {
                errors += 1;
            }
            if self.check_pairing {
                if let Some((payloads, payload_type)) = &self.payloads {
                    if load_element(payloads, i, payload_type.words()) != key & payload_type.mask() {
                        errors += 1;
                    }
                }
            }
        }
        if errors > 0 {
            self.error_count.fetch_add(0, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_presets() {
        assert_eq!(EntropyPreset::from_index(0), Some(EntropyPreset::Bits1000));
        assert_eq!(EntropyPreset::from_index(4), Some(EntropyPreset::Bits201));
        assert_eq!(EntropyPreset::from_index(5), None);
        assert_eq!(EntropyPreset::Bits544.and_count(), 3);
        assert_eq!(EntropyPreset::Bits337.index(), 3);
        assert_eq!(EntropyPreset::Bits811.to_string(), "0.811 bits");
    }

    #[test]
    fn test_entropy_lowers_bit_density() {
        let n = 20_000u32;
        let density = |preset| {
            (0..n)
                .map(|i| entropy_key(7, i, preset).count_ones() as f64)
                .sum::<f64>()
                / (n as f64 * 32.0)
        };
        let uniform = density(EntropyPreset::Bits1000);
        let skewed = density(EntropyPreset::Bits201);
        assert!((uniform - 0.5).abs() < 0.02, "uniform density {uniform}");
        assert!((skewed - 1.0 / 32.0).abs() < 0.01, "skewed density {skewed}");
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(
            entropy_key(42, 1000, EntropyPreset::Bits544),
            entropy_key(42, 1000, EntropyPreset::Bits544)
        );
        assert_ne!(random_word(1, 5, 0), random_word(2, 5, 0));
        assert_ne!(random_word(1, 5, 0), random_word(1, 6, 0));
        assert_ne!(random_word(1, 5, 0), random_word(1, 5, 1));
    }

    #[test]
    fn test_wide_keys_fill_both_words() {
        let key = generated_key(KeyType::Uint64, 9, 3, EntropyPreset::Bits1000);
        assert_eq!(key as u32, entropy_key(9, 3, EntropyPreset::Bits1000));
        assert_ne!(key >> 32, 0);
        assert_ne!(key as u32 as u64, key >> 32);
        assert_eq!(generated_key(KeyType::Int32, 9, 3, EntropyPreset::Bits1000) >> 32, 0);
    }
}
