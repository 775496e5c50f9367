//! Control flow terminators.
//!
//! Conditional branches, jumps, returns and traps. Each terminator
//! specifies its target labels and input operands as needed.
use auto_enums::auto_enum;

use crate::modules::operand::{Label, Name, Operand};

/// Conditional branch
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CBranch {
    /// The condition operand; should evaluate to a boolean value.
    ///
    /// If it is true (non-zero), control transfers to `target_true`;
    /// otherwise, it transfers to `target_false`.
    pub cond: Operand,
    pub target_true: Label,
    pub target_false: Label,
}

/// Unconditional jump
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Jump {
    pub target: Label,
}

/// Return from function. If `value` is `None`, it indicates a `void` return.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Ret {
    pub value: Option<Operand>,
}

/// Control flow terminator instructions
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Terminator {
    CBranch(CBranch),
    Jump(Jump),
    Ret(Ret),
    /// Unrecoverable error.
    Trap,
}

impl Terminator {
    #[auto_enum(Iterator)]
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        match self {
            Terminator::CBranch(cbranch) => std::iter::once(&cbranch.cond),
            Terminator::Jump(_) => std::iter::empty(),
            Terminator::Ret(ret) => ret.value.iter(),
            Terminator::Trap => std::iter::empty(),
        }
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Name> {
        self.operands().filter_map(Operand::as_reg)
    }

    #[auto_enum(Iterator)]
    pub fn iter_targets(&self) -> impl Iterator<Item = &Label> {
        match self {
            Terminator::CBranch(cbranch) => {
                [&cbranch.target_true, &cbranch.target_false].into_iter()
            }
            Terminator::Jump(jump) => std::iter::once(&jump.target),
            Terminator::Ret(_) => std::iter::empty(),
            Terminator::Trap => std::iter::empty(),
        }
    }
}

macro_rules! define_terminator_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for Terminator {
            fn from(inst: $typ) -> Self {
                Terminator::$variant(inst)
            }
        }
    };
}

define_terminator_from!(CBranch, CBranch);
define_terminator_from!(Jump, Jump);
define_terminator_from!(Ret, Ret);
