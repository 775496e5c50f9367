use auto_enums::auto_enum;
use smallvec::SmallVec;
use strum::{EnumDiscriminants, EnumIs, EnumTryAs};

use crate::{
    modules::{
        DebugLoc,
        int::{IBinary, ICmp},
        operand::{Name, Operand},
    },
    types::IType,
};

/// Common interface implemented by every instruction node.
///
/// This trait provides lightweight, zero‑allocation iteration over an
/// instruction's input operands and exposes its optional destination SSA
/// name when present.
pub trait Instruction {
    /// Iterate over all input operands for this instruction.
    fn operands(&self) -> impl Iterator<Item = &Operand>;

    /// Mutably iterate over all input operands for this instruction.
    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand>;

    /// Return the destination SSA name if the instruction produces a result.
    fn destination(&self) -> Option<&Name> {
        None
    }

    /// Type of the destination SSA name if the instruction produces a result.
    fn destination_type(&self) -> Option<IType> {
        None
    }

    /// Convenience iterator over referenced SSA names (i.e., register
    /// operands). Immediates are ignored.
    fn dependencies(&self) -> impl Iterator<Item = &Name> {
        self.operands().filter_map(Operand::as_reg)
    }
}

/// Direct call to a function symbol, defined in the module or declared.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Call {
    pub dest: Option<Name>,
    pub ret_ty: Option<IType>,
    pub callee: String,
    pub args: SmallVec<Operand, 4>,
}

/// Indirect call through a trampoline slot.
///
/// The slot decides at runtime which function receives the call, see
/// [`crate::modules::TrampolineSlot`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SlotCall {
    pub dest: Option<Name>,
    pub ret_ty: Option<IType>,
    pub slot: String,
    pub args: SmallVec<Operand, 4>,
}

/// Discriminated union covering all instruction kinds.
///
/// The generated `MuInstrKind` discriminant (via `strum`) can be helpful for
/// fast classification.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(MuInstrKind))]
pub enum MuInstr {
    IBinary(IBinary),
    ICmp(ICmp),
    Call(Call),
    SlotCall(SlotCall),
}

impl Instruction for MuInstr {
    #[auto_enum(Iterator)]
    fn operands(&self) -> impl Iterator<Item = &Operand> {
        match self {
            MuInstr::IBinary(i) => [&i.lhs, &i.rhs].into_iter(),
            MuInstr::ICmp(i) => [&i.lhs, &i.rhs].into_iter(),
            MuInstr::Call(c) => c.args.iter(),
            MuInstr::SlotCall(c) => c.args.iter(),
        }
    }

    #[auto_enum(Iterator)]
    fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        match self {
            MuInstr::IBinary(i) => [&mut i.lhs, &mut i.rhs].into_iter(),
            MuInstr::ICmp(i) => [&mut i.lhs, &mut i.rhs].into_iter(),
            MuInstr::Call(c) => c.args.iter_mut(),
            MuInstr::SlotCall(c) => c.args.iter_mut(),
        }
    }

    fn destination(&self) -> Option<&Name> {
        match self {
            MuInstr::IBinary(i) => Some(&i.dest),
            MuInstr::ICmp(i) => Some(&i.dest),
            MuInstr::Call(c) => c.dest.as_ref(),
            MuInstr::SlotCall(c) => c.dest.as_ref(),
        }
    }

    fn destination_type(&self) -> Option<IType> {
        match self {
            MuInstr::IBinary(i) => Some(i.ty),
            MuInstr::ICmp(_) => Some(IType::I1),
            MuInstr::Call(c) => c.ret_ty,
            MuInstr::SlotCall(c) => c.ret_ty,
        }
    }
}

macro_rules! define_instr_from {
    ($typ:ty, $variant:ident) => {
        impl From<$typ> for MuInstr {
            fn from(inst: $typ) -> Self {
                MuInstr::$variant(inst)
            }
        }
    };
}

define_instr_from!(IBinary, IBinary);
define_instr_from!(ICmp, ICmp);
define_instr_from!(Call, Call);
define_instr_from!(SlotCall, SlotCall);

/// An instruction together with its optional source location.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Statement {
    pub instr: MuInstr,
    pub loc: Option<DebugLoc>,
}

impl Statement {
    pub fn new(instr: impl Into<MuInstr>) -> Self {
        Self {
            instr: instr.into(),
            loc: None,
        }
    }

    pub fn with_loc(mut self, loc: DebugLoc) -> Self {
        self.loc = Some(loc);
        self
    }
}
