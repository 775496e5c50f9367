//! Shared operand types for instructions.
//!
//! An instruction operand can be a reference to another SSA value (`Reg`)
//! or an immediate integer constant (`Imm`).
use strum::EnumIs;

use crate::types::IType;

/// SSA value identifier used to name the destination or reference another
/// instruction's result.
pub type Name = String;

/// Represents a code label used as a target for control‑flow terminators.
///
/// Labels may not cross function boundaries. The entry block of a function is
/// the first block in source order and must be named [`Label::ENTRY`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub String);

impl Label {
    pub const ENTRY: &'static str = "entry";

    /// The label of the entry block.
    pub fn entry() -> Self {
        Label(Self::ENTRY.to_string())
    }

    pub fn is_entry(&self) -> bool {
        self.0 == Self::ENTRY
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label(value.to_string())
    }
}

/// Integer constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IConst {
    pub ty: IType,
    pub value: u64,
}

impl IConst {
    /// Build a constant, truncating `value` to the width of `ty`.
    pub fn new(ty: IType, value: u64) -> Self {
        Self {
            ty,
            value: ty.truncate(value),
        }
    }
}

/// Instruction operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs)]
pub enum Operand {
    /// Reference to a previously defined SSA value.
    Reg(Name),
    /// Immediate integer literal.
    Imm(IConst),
}

impl Operand {
    /// The register referenced by this operand, if any.
    pub fn as_reg(&self) -> Option<&Name> {
        match self {
            Operand::Reg(name) => Some(name),
            Operand::Imm(_) => None,
        }
    }
}

impl From<IConst> for Operand {
    fn from(value: IConst) -> Self {
        Operand::Imm(value)
    }
}
