//! Integer instructions
//!
//! Arithmetic, comparisons, shifts, and bitwise operations over integer
//! values. Each instruction carries its destination `Name`, an `IType`, and
//! its input operands.
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    modules::operand::{Name, Operand},
    types::IType,
};

/// Binary integer operations
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter)]
pub enum IBinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl IBinaryOp {
    /// Creates an [`IBinaryOp`] from its mnemonic.
    pub fn from_str(s: &str) -> Option<Self> {
        IBinaryOp::iter().find(|op| op.to_str() == s)
    }

    /// Returns the mnemonic of the [`IBinaryOp`].
    pub fn to_str(&self) -> &'static str {
        match self {
            IBinaryOp::Add => "add",
            IBinaryOp::Sub => "sub",
            IBinaryOp::Mul => "mul",
            IBinaryOp::SDiv => "sdiv",
            IBinaryOp::UDiv => "udiv",
            IBinaryOp::SRem => "srem",
            IBinaryOp::URem => "urem",
            IBinaryOp::And => "and",
            IBinaryOp::Or => "or",
            IBinaryOp::Xor => "xor",
            IBinaryOp::Shl => "shl",
            IBinaryOp::LShr => "lshr",
            IBinaryOp::AShr => "ashr",
        }
    }

    /// Returns true for the operations that trap on a zero divisor.
    pub fn is_division(&self) -> bool {
        matches!(
            self,
            IBinaryOp::SDiv | IBinaryOp::UDiv | IBinaryOp::SRem | IBinaryOp::URem
        )
    }
}

/// Integer comparison operations
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter)]
pub enum ICmpVariant {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Unsigned greater than
    Ugt,
    /// Unsigned greater than or equal
    Uge,
    /// Unsigned less than
    Ult,
    /// Unsigned less than or equal
    Ule,
    /// Signed greater than
    Sgt,
    /// Signed greater than or equal
    Sge,
    /// Signed less than
    Slt,
    /// Signed less than or equal
    Sle,
}

impl ICmpVariant {
    /// Creates an [`ICmpVariant`] from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        ICmpVariant::iter().find(|op| op.to_str() == s)
    }

    /// Returns the string representation of the [`ICmpVariant`].
    pub fn to_str(&self) -> &'static str {
        match self {
            ICmpVariant::Eq => "eq",
            ICmpVariant::Ne => "ne",
            ICmpVariant::Ugt => "ugt",
            ICmpVariant::Uge => "uge",
            ICmpVariant::Ult => "ult",
            ICmpVariant::Ule => "ule",
            ICmpVariant::Sgt => "sgt",
            ICmpVariant::Sge => "sge",
            ICmpVariant::Slt => "slt",
            ICmpVariant::Sle => "sle",
        }
    }

    /// Returns true if the comparison is signed
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ICmpVariant::Sgt | ICmpVariant::Sge | ICmpVariant::Slt | ICmpVariant::Sle
        )
    }

    /// Evaluate the comparison on two values of type `ty`.
    pub fn evaluate(&self, ty: IType, lhs: u64, rhs: u64) -> bool {
        // Flipping the sign bit orders two's complement values as unsigned ones.
        let (lhs, rhs) = if self.is_signed() {
            let flip = |v: u64| (ty.sign_extend(v) as u64) ^ (1 << 63);
            (flip(lhs), flip(rhs))
        } else {
            (ty.truncate(lhs), ty.truncate(rhs))
        };
        match self {
            ICmpVariant::Eq => lhs == rhs,
            ICmpVariant::Ne => lhs != rhs,
            ICmpVariant::Ugt | ICmpVariant::Sgt => lhs > rhs,
            ICmpVariant::Uge | ICmpVariant::Sge => lhs >= rhs,
            ICmpVariant::Ult | ICmpVariant::Slt => lhs < rhs,
            ICmpVariant::Ule | ICmpVariant::Sle => lhs <= rhs,
        }
    }
}

/// Binary integer instruction (`%dest = <op> <ty> <lhs>, <rhs>`).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct IBinary {
    pub dest: Name,
    pub ty: IType,
    pub op: IBinaryOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// Integer comparison instruction. The result is always of type `i1`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ICmp {
    pub dest: Name,
    /// Type of both operands.
    pub ty: IType,
    pub variant: ICmpVariant,
    pub lhs: Operand,
    pub rhs: Operand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_roundtrip() {
        for op in IBinaryOp::iter() {
            assert_eq!(IBinaryOp::from_str(op.to_str()), Some(op));
        }
        for variant in ICmpVariant::iter() {
            assert_eq!(ICmpVariant::from_str(variant.to_str()), Some(variant));
        }
        assert_eq!(IBinaryOp::from_str("fadd"), None);
    }

    #[test]
    fn signed_comparison_uses_width() {
        // 0xff is -1 as i8 but 255 as u8
        assert!(ICmpVariant::Slt.evaluate(IType::I8, 0xff, 0));
        assert!(!ICmpVariant::Ult.evaluate(IType::I8, 0xff, 0));
        assert!(ICmpVariant::Eq.evaluate(IType::I8, 0x1ff, 0xff));
        assert!(ICmpVariant::Sge.evaluate(IType::I32, 5, 0xffff_fffb));
        assert!(ICmpVariant::Sle.evaluate(IType::I64, i64::MIN as u64, i64::MAX as u64));
        assert!(!ICmpVariant::Sgt.evaluate(IType::I1, 1, 0));
    }

    #[test]
    fn operation_classes() {
        let signed: Vec<_> = ICmpVariant::iter().filter(ICmpVariant::is_signed).collect();
        assert_eq!(
            signed,
            vec![ICmpVariant::Sgt, ICmpVariant::Sge, ICmpVariant::Slt, ICmpVariant::Sle]
        );
        let divisions = IBinaryOp::iter().filter(IBinaryOp::is_division).count();
        assert_eq!(divisions, 4);
        assert!(!IBinaryOp::Shl.is_division());
    }
}
