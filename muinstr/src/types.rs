//! Integer types of the mutation IR.

/// Represents an integer type with a specific bit width.
///
/// Signedness is not represented here; all integer types are treated as unsigned.
/// Instructions that operate on signed integers will interpret the bits accordingly.
/// Values are carried in a `u64`, hence the upper bound on the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IType {
    num_bits: u32,
}

impl IType {
    /// Common integer types.
    pub const I1: Self = Self { num_bits: 1 };
    pub const I8: Self = Self { num_bits: 8 };
    pub const I16: Self = Self { num_bits: 16 };
    pub const I32: Self = Self { num_bits: 32 };
    pub const I64: Self = Self { num_bits: 64 };
    pub const MIN_BITS: u32 = 1;
    pub const MAX_BITS: u32 = 64;

    /// Creates a new `IType` with the specified number of bits.
    #[inline]
    pub const fn new(num_bits: u32) -> Option<Self> {
        if num_bits >= Self::MIN_BITS && num_bits <= Self::MAX_BITS {
            Some(Self { num_bits })
        } else {
            None
        }
    }

    /// Returns the number of bits of the integer type.
    #[inline]
    pub const fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Returns the maximum unsigned value that can be represented by this integer type.
    #[inline]
    pub const fn max_value(&self) -> u64 {
        if self.num_bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.num_bits) - 1
        }
    }

    /// Returns `true` if `value` fits in this type when read as unsigned.
    #[inline]
    pub const fn fits_value(&self, value: u64) -> bool {
        value <= self.max_value()
    }

    /// Truncate `value` to the width of this type.
    #[inline]
    pub const fn truncate(&self, value: u64) -> u64 {
        value & self.max_value()
    }

    /// Interpret the low bits of `value` as a two's complement number.
    #[inline]
    pub const fn sign_extend(&self, value: u64) -> i64 {
        let shift = 64 - self.num_bits;
        ((value << shift) as i64) >> shift
    }
}

impl std::fmt::Display for IType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.num_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_bounds() {
        assert!(IType::new(0).is_none());
        assert!(IType::new(65).is_none());
        assert_eq!(IType::new(32), Some(IType::I32));
    }

    #[test]
    fn truncate_and_sign_extend() {
        assert_eq!(IType::I8.truncate(0x1ff), 0xff);
        assert_eq!(IType::I8.sign_extend(0xff), -1);
        assert_eq!(IType::I1.sign_extend(1), -1);
        assert_eq!(IType::I64.sign_extend(u64::MAX), -1);
        assert_eq!(IType::I32.sign_extend(7), 7);
    }
}
