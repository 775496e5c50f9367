//! Mutation operator catalog.
//!
//! The catalog is a closed set of operators, each identified by a stable id
//! persisted in the mutant metadata. Operators are selected by id or by group
//! through the [`MutatorsFactory`].
use std::{collections::BTreeMap, sync::Arc};

use muinstr::modules::instructions::MuInstr;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::utils::error::{MuError, MuResult};

pub mod cxx;

/// Stable identity of a mutation operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MutatorKind {
    CxxAddToSub,
    CxxSubToAdd,
    CxxMulToDiv,
    CxxDivToMul,
    CxxRemToDiv,
    CxxEqToNe,
    CxxNeToEq,
    CxxGtToLe,
    CxxGeToLt,
    CxxLtToGe,
    CxxLeToGt,
    CxxAndToOr,
    CxxOrToAnd,
    CxxXorToOr,
    CxxLshiftToRshift,
    CxxRshiftToLshift,
}

/// Coarse family of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, IntoStaticStr)]
pub enum MutatorGroup {
    #[strum(serialize = "cxx_arithmetic")]
    Arithmetic,
    #[strum(serialize = "cxx_comparison")]
    Comparison,
    #[strum(serialize = "cxx_bitwise")]
    Bitwise,
}

/// Group selecting arithmetic and comparison operators.
pub const DEFAULT_GROUP: &str = "cxx_default";

/// Selection used when no operator is configured.
pub const DEFAULT_SELECTION: &str = "cxx_comparison";

/// Group selecting every operator.
pub const ALL_GROUP: &str = "cxx_all";

impl MutatorKind {
    pub fn id(&self) -> &'static str {
        self.into()
    }

    pub fn group(&self) -> MutatorGroup {
        use MutatorKind::*;
        match self {
            CxxAddToSub | CxxSubToAdd | CxxMulToDiv | CxxDivToMul | CxxRemToDiv => {
                MutatorGroup::Arithmetic
            }
            CxxEqToNe | CxxNeToEq | CxxGtToLe | CxxGeToLt | CxxLtToGe | CxxLeToGt => {
                MutatorGroup::Comparison
            }
            CxxAndToOr | CxxOrToAnd | CxxXorToOr | CxxLshiftToRshift | CxxRshiftToLshift => {
                MutatorGroup::Bitwise
            }
        }
    }
}

/// A mutation operator.
///
/// An operator recognizes the instructions it can rewrite and performs the
/// rewrite in place.
pub trait Mutator: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> MutatorKind;

    fn id(&self) -> &'static str {
        self.kind().id()
    }

    /// Human readable description of the rewrite.
    fn description(&self) -> &'static str;

    /// Short description of the replacement, e.g. `-`.
    fn replacement(&self) -> &'static str;

    /// Returns true if the operator can rewrite `instr`.
    fn can_mutate(&self, instr: &MuInstr) -> bool;

    /// Rewrite `instr` in place. Returns false, leaving the instruction
    /// untouched, if the operator does not apply to it.
    fn apply(&self, instr: &mut MuInstr) -> bool;
}

/// Resolves operator ids and group names to operator instances.
#[derive(Debug, Clone)]
pub struct MutatorsFactory {
    mutators: BTreeMap<MutatorKind, Arc<dyn Mutator>>,
}

impl Default for MutatorsFactory {
    fn default() -> Self {
        Self {
            mutators: MutatorKind::iter()
                .map(|kind| (kind, cxx::create(kind)))
                .collect(),
        }
    }
}

impl MutatorsFactory {
    /// Resolve an operator id, as stored in metadata.
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Mutator>> {
        let kind: MutatorKind = id.parse().ok()?;
        self.mutators.get(&kind).cloned()
    }

    /// Expand operator ids and group names. An empty list selects
    /// [`DEFAULT_SELECTION`]. The result is in catalog order without duplicates.
    pub fn mutators(&self, names: &[String]) -> MuResult<Vec<Arc<dyn Mutator>>> {
        let default = [DEFAULT_SELECTION.to_string()];
        let names = if names.is_empty() { &default[..] } else { names };

        let mut selected = BTreeMap::new();
        for name in names {
            for kind in Self::expand(name)? {
                if let Some(mutator) = self.mutators.get(&kind) {
                    selected.insert(kind, mutator.clone());
                }
            }
        }
        Ok(selected.into_values().collect())
    }

    fn expand(name: &str) -> MuResult<Vec<MutatorKind>> {
        let in_groups = |groups: &[MutatorGroup]| -> Vec<MutatorKind> {
            MutatorKind::iter()
                .filter(|kind| groups.contains(&kind.group()))
                .collect()
        };

        match name {
            DEFAULT_GROUP => Ok(in_groups(&[MutatorGroup::Arithmetic, MutatorGroup::Comparison])),
            ALL_GROUP => Ok(MutatorKind::iter().collect()),
            _ => {
                if let Some(group) = MutatorGroup::iter().find(|g| {
                    let group_name: &'static str = g.into();
                    group_name == name
                }) {
                    return Ok(in_groups(&[group]));
                }
                name.parse::<MutatorKind>()
                    .map(|kind| vec![kind])
                    .map_err(|_| MuError::UnknownMutator(name.to_string()))
            }
        }
    }
}
