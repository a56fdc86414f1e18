//! Key and payload types, sort order and the order-preserving bit transform.
//!
//! Keys stay in device memory as their raw bit patterns, one word per element
//! for 32-bit types and two (low word first) for 64-bit types. Digit
//! extraction and validation see them through [`KeyTransform`], which maps
//! every key type to unsigned bits whose natural order is the requested sort
//! order.

use std::fmt;

/// Digit values per radix pass.
pub const RADIX: usize = 256;
/// Bits per digit.
pub const RADIX_LOG: u32 = 8;
pub const RADIX_MASK: u32 = 0xFF;
/// Digit passes for a 32-bit key.
pub const RADIX_PASSES: usize = 4;
/// Digit passes for the widest key.
pub const MAX_RADIX_PASSES: usize = 8;

mod private {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for u64 {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// Element type of a sortable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Uint32,
    Int32,
    Float32,
    Uint64,
    Int64,
    Float64,
}

impl KeyType {
    pub const ALL: [KeyType; 6] = [
        KeyType::Uint32,
        KeyType::Int32,
        KeyType::Float32,
        KeyType::Uint64,
        KeyType::Int64,
        KeyType::Float64,
    ];

    pub fn bits(self) -> u32 {
        match self {
            KeyType::Uint32 | KeyType::Int32 | KeyType::Float32 => 32,
            KeyType::Uint64 | KeyType::Int64 | KeyType::Float64 => 64,
        }
    }

    /// Device words per element.
    pub fn words(self) -> usize {
        (self.bits() / 32) as usize
    }

    /// Digit passes needed to sort keys of this type.
    pub fn passes(self) -> usize {
        (self.bits() / RADIX_LOG) as usize
    }

    /// All bits of one element set.
    #[inline]
    pub fn mask(self) -> u64 {
        u64::MAX >> (64 - self.bits())
    }

    #[inline]
    fn sign_bit(self) -> u64 {
        1 << (self.bits() - 1)
    }

    /// Monotonic map from raw bits to unsigned radix bits.
    ///
    /// Signed integers flip the sign bit. Floats flip every bit of negative
    /// values and only the sign bit of non-negative ones, which orders them
    /// like `total_cmp`.
    #[inline]
    pub fn to_radix(self, bits: u64) -> u64 {
        let sign = self.sign_bit();
        match self {
            KeyType::Uint32 | KeyType::Uint64 => bits,
            KeyType::Int32 | KeyType::Int64 => bits ^ sign,
            KeyType::Float32 | KeyType::Float64 => {
                if bits & sign != 0 {
                    !bits & self.mask()
                } else {
                    bits | sign
                }
            }
        }
    }

    /// Inverse of [`to_radix`](Self::to_radix).
    #[inline]
    pub fn from_radix(self, radix: u64) -> u64 {
        let sign = self.sign_bit();
        match self {
            KeyType::Uint32 | KeyType::Uint64 => radix,
            KeyType::Int32 | KeyType::Int64 => radix ^ sign,
            KeyType::Float32 | KeyType::Float64 => {
                if radix & sign != 0 {
                    radix & !sign
                } else {
                    !radix & self.mask()
                }
            }
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Uint32 => "uint32",
            KeyType::Int32 => "int32",
            KeyType::Float32 => "float32",
            KeyType::Uint64 => "uint64",
            KeyType::Int64 => "int64",
            KeyType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Element type of a payload. Payloads are moved, never compared.
pub type PayloadType = KeyType;

/// Types usable as sort keys and payloads.
///
/// Sealed: only the 32- and 64-bit integers and floats are valid. Bits are
/// carried in a `u64`; 32-bit types leave the high half zero.
pub trait SortKey: private::Sealed + Copy + Send + Sync + 'static {
    const KEY_TYPE: KeyType;

    fn to_bits(self) -> u64;

    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_sort_key {
    ($ty:ty, $key_type:expr, |$v:ident| $to:expr, |$b:ident| $from:expr) => {
        impl SortKey for $ty {
            const KEY_TYPE: KeyType = $key_type;

            #[inline]
            fn to_bits(self) -> u64 {
                let $v = self;
                $to
            }

            #[inline]
            fn from_bits(bits: u64) -> Self {
                let $b = bits;
                $from
            }
        }
    };
}

impl_sort_key!(u32, KeyType::Uint32, |v| v as u64, |b| b as u32);
impl_sort_key!(i32, KeyType::Int32, |v| v as u32 as u64, |b| b as u32 as i32);
impl_sort_key!(f32, KeyType::Float32, |v| f32::to_bits(v) as u64, |b| f32::from_bits(b as u32));
impl_sort_key!(u64, KeyType::Uint64, |v| v, |b| b);
impl_sort_key!(i64, KeyType::Int64, |v| v as u64, |b| b as i64);
impl_sort_key!(f64, KeyType::Float64, |v| f64::to_bits(v), |b| f64::from_bits(b));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("ascending"),
            SortOrder::Descending => f.write_str("descending"),
        }
    }
}

/// Whether each key carries a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    KeysOnly,
    Pairs(PayloadType),
}

impl SortMode {
    pub fn has_payloads(self) -> bool {
        matches!(self, SortMode::Pairs(_))
    }
}

/// Everything fixed about a sorter at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    pub key_type: KeyType,
    pub order: SortOrder,
    pub mode: SortMode,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self::new(KeyType::Uint32)
    }
}

impl SortConfig {
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            order: SortOrder::Ascending,
            mode: SortMode::KeysOnly,
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn descending(self) -> Self {
        self.with_order(SortOrder::Descending)
    }

    pub fn with_payload(mut self, payload: PayloadType) -> Self {
        self.mode = SortMode::Pairs(payload);
        self
    }

    pub fn transform(&self) -> KeyTransform {
        KeyTransform {
            key_type: self.key_type,
            order: self.order,
        }
    }
}

impl fmt::Display for SortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            SortMode::KeysOnly => write!(f, "{} keys, {}", self.key_type, self.order),
            SortMode::Pairs(payload) => write!(
                f,
                "{} keys with {} payloads, {}",
                self.key_type, payload, self.order
            ),
        }
    }
}

/// Raw key bits to ordered radix bits, for one key type and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransform {
    pub key_type: KeyType,
    pub order: SortOrder,
}

impl KeyTransform {
    /// Bits whose unsigned order is the sort order.
    #[inline]
    pub fn radix(self, raw: u64) -> u64 {
        let bits = self.key_type.to_radix(raw);
        match self.order {
            SortOrder::Ascending => bits,
            SortOrder::Descending => !bits & self.key_type.mask(),
        }
    }

    #[inline]
    pub fn digit(self, raw: u64, shift: u32) -> usize {
        ((self.radix(raw) >> shift) & RADIX_MASK as u64) as usize
    }

    /// Whether `a` may precede `b` in the output.
    #[inline]
    pub fn in_order(self, a: u64, b: u64) -> bool {
        self.radix(a) <= self.radix(b)
    }

    pub fn passes(self) -> usize {
        self.key_type.passes()
    }
}
