//! Operators replacing one C/C++ binary operator by another.
use std::sync::Arc;

use muinstr::modules::{
    instructions::MuInstr,
    int::{IBinaryOp, ICmpVariant},
};

use crate::mutators::{Mutator, MutatorKind};

/// Rewrites the opcode of integer binary instructions.
#[derive(Debug)]
pub struct BinaryOperatorMutator {
    kind: MutatorKind,
    rewrites: &'static [(IBinaryOp, IBinaryOp)],
    description: &'static str,
    replacement: &'static str,
}

impl BinaryOperatorMutator {
    fn target(&self, op: IBinaryOp) -> Option<IBinaryOp> {
        self.rewrites
            .iter()
            .find(|(from, _)| *from == op)
            .map(|(_, to)| *to)
    }
}

impl Mutator for BinaryOperatorMutator {
    fn kind(&self) -> MutatorKind {
        self.kind
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn replacement(&self) -> &'static str {
        self.replacement
    }

    fn can_mutate(&self, instr: &MuInstr) -> bool {
        match instr {
            MuInstr::IBinary(binary) => self.target(binary.op).is_some(),
            _ => false,
        }
    }

    fn apply(&self, instr: &mut MuInstr) -> bool {
        let MuInstr::IBinary(binary) = instr else {
            return false;
        };
        match self.target(binary.op) {
            Some(op) => {
                binary.op = op;
                true
            }
            None => false,
        }
    }
}

/// Rewrites the predicate of integer comparisons.
#[derive(Debug)]
pub struct ComparisonMutator {
    kind: MutatorKind,
    rewrites: &'static [(ICmpVariant, ICmpVariant)],
    description: &'static str,
    replacement: &'static str,
}

impl ComparisonMutator {
    fn target(&self, variant: ICmpVariant) -> Option<ICmpVariant> {
        self.rewrites
            .iter()
            .find(|(from, _)| *from == variant)
            .map(|(_, to)| *to)
    }
}

impl Mutator for ComparisonMutator {
    fn kind(&self) -> MutatorKind {
        self.kind
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn replacement(&self) -> &'static str {
        self.replacement
    }

    fn can_mutate(&self, instr: &MuInstr) -> bool {
        match instr {
            MuInstr::ICmp(icmp) => self.target(icmp.variant).is_some(),
            _ => false,
        }
    }

    fn apply(&self, instr: &mut MuInstr) -> bool {
        let MuInstr::ICmp(icmp) = instr else {
            return false;
        };
        match self.target(icmp.variant) {
            Some(variant) => {
                icmp.variant = variant;
                true
            }
            None => false,
        }
    }
}

fn binary(
    kind: MutatorKind,
    rewrites: &'static [(IBinaryOp, IBinaryOp)],
    description: &'static str,
    replacement: &'static str,
) -> Arc<dyn Mutator> {
    Arc::new(BinaryOperatorMutator {
        kind,
        rewrites,
        description,
        replacement,
    })
}

fn comparison(
    kind: MutatorKind,
    rewrites: &'static [(ICmpVariant, ICmpVariant)],
    description: &'static str,
    replacement: &'static str,
) -> Arc<dyn Mutator> {
    Arc::new(ComparisonMutator {
        kind,
        rewrites,
        description,
        replacement,
    })
}

/// Instantiate the operator of the given kind.
pub fn create(kind: MutatorKind) -> Arc<dyn Mutator> {
    use IBinaryOp::*;
    use ICmpVariant::*;
    use MutatorKind::*;

    match kind {
        CxxAddToSub => binary(kind, &[(Add, Sub)], "Replaces + with -", "-"),
        CxxSubToAdd => binary(kind, &[(Sub, Add)], "Replaces - with +", "+"),
        CxxMulToDiv => binary(kind, &[(Mul, SDiv)], "Replaces * with /", "/"),
        CxxDivToMul => binary(kind, &[(SDiv, Mul), (UDiv, Mul)], "Replaces / with *", "*"),
        CxxRemToDiv => binary(
            kind,
            &[(SRem, SDiv), (URem, UDiv)],
            "Replaces % with /",
            "/",
        ),
        CxxEqToNe => comparison(kind, &[(Eq, Ne)], "Replaces == with !=", "!="),
        CxxNeToEq => comparison(kind, &[(Ne, Eq)], "Replaces != with ==", "=="),
        CxxGtToLe => comparison(kind, &[(Sgt, Sle), (Ugt, Ule)], "Replaces > with <=", "<="),
        CxxGeToLt => comparison(kind, &[(Sge, Slt), (Uge, Ult)], "Replaces >= with <", "<"),
        CxxLtToGe => comparison(kind, &[(Slt, Sge), (Ult, Uge)], "Replaces < with >=", ">="),
        CxxLeToGt => comparison(kind, &[(Sle, Sgt), (Ule, Ugt)], "Replaces <= with >", ">"),
        CxxAndToOr => binary(kind, &[(And, Or)], "Replaces & with |", "|"),
        CxxOrToAnd => binary(kind, &[(Or, And)], "Replaces | with &", "&"),
        CxxXorToOr => binary(kind, &[(Xor, Or)], "Replaces ^ with |", "|"),
        CxxLshiftToRshift => binary(kind, &[(Shl, LShr)], "Replaces << with >>", ">>"),
        CxxRshiftToLshift => binary(
            kind,
            &[(LShr, Shl), (AShr, Shl)],
            "Replaces >> with <<",
            "<<",
        ),
    }
}
