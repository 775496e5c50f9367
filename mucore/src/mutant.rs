//! Mutation points and the mutants grouping them.
use std::{cmp::Ordering, sync::Arc};

use muinstr::modules::InstrLocation;

use crate::{
    mutators::{Mutator, MutatorKind},
    program::FunctionUnderTest,
};

/// Position in the original source code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// True when no line information is known.
    pub fn is_null(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Where a mutation point lives in the program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointAddress {
    pub function: FunctionUnderTest,
    pub location: InstrLocation,
}

/// A candidate edit of one instruction.
#[derive(Debug, Clone)]
pub struct MutationPoint {
    mutator: Arc<dyn Mutator>,
    location: SourceLocation,
    identifier: String,
    address: Option<PointAddress>,
    mutated_function: Option<String>,
}

impl MutationPoint {
    /// A point found in the program. The identifier is derived from the
    /// operator and the source location.
    pub fn new(mutator: Arc<dyn Mutator>, location: SourceLocation, address: PointAddress) -> Self {
        let identifier = Self::make_identifier(mutator.kind(), &location);
        Self {
            mutator,
            location,
            identifier,
            address: Some(address),
            mutated_function: None,
        }
    }

    /// A point reconstructed from metadata, it has no address in any program.
    pub fn detached(
        mutator: Arc<dyn Mutator>,
        location: SourceLocation,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            mutator,
            location,
            identifier: identifier.into(),
            address: None,
            mutated_function: None,
        }
    }

    /// `<mutator id>:<file>:<line>:<column>`
    pub fn make_identifier(kind: MutatorKind, location: &SourceLocation) -> String {
        format!("{}:{}", kind.id(), location)
    }

    pub fn user_identifier(&self) -> &str {
        &self.identifier
    }

    pub fn mutator(&self) -> &Arc<dyn Mutator> {
        &self.mutator
    }

    pub fn kind(&self) -> MutatorKind {
        self.mutator.kind()
    }

    pub fn source_location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn address(&self) -> Option<&PointAddress> {
        self.address.as_ref()
    }

    /// Name of the clone the point is applied to, once cloned.
    pub fn mutated_function(&self) -> Option<&str> {
        self.mutated_function.as_deref()
    }

    pub fn set_mutated_function(&mut self, name: impl Into<String>) {
        self.mutated_function = Some(name.into());
    }
}

/// A deduplicated mutant: every point sharing one identifier.
#[derive(Debug, Clone)]
pub struct Mutant {
    identifier: String,
    points: Vec<MutationPoint>,
}

impl Mutant {
    /// Build a mutant. `points` must not be empty.
    pub fn new(identifier: impl Into<String>, points: Vec<MutationPoint>) -> Self {
        debug_assert!(!points.is_empty(), "a mutant has at least one point");
        Self {
            identifier: identifier.into(),
            points,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn points(&self) -> &[MutationPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [MutationPoint] {
        &mut self.points
    }

    fn first(&self) -> Option<&MutationPoint> {
        self.points.first()
    }

    pub fn mutator(&self) -> Option<&Arc<dyn Mutator>> {
        self.first().map(|p| p.mutator())
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.first().map(|p| p.source_location())
    }

    /// The canonical order of mutants.
    pub fn compare(a: &Mutant, b: &Mutant) -> Ordering {
        a.identifier.cmp(&b.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutators::MutatorsFactory;

    #[test]
    fn identifier_format() {
        let location = SourceLocation::new("src/math.c", 4, 12);
        assert_eq!(
            MutationPoint::make_identifier(MutatorKind::CxxAddToSub, &location),
            "cxx_add_to_sub:src/math.c:4:12"
        );
        assert!(!location.is_null());
        assert!(SourceLocation::new("a.c", 0, 0).is_null());
    }

    #[test]
    fn canonical_order() {
        let factory = MutatorsFactory::default();
        let mutator = factory.lookup("cxx_add_to_sub").unwrap();
        let mut mutants: Vec<Mutant> = ["m3", "m1", "m2"]
            .into_iter()
            .map(|id| {
                Mutant::new(
                    id,
                    vec![MutationPoint::detached(
                        mutator.clone(),
                        SourceLocation::default(),
                        id,
                    )],
                )
            })
            .collect();
        mutants.sort_by(Mutant::compare);
        let ids: Vec<_> = mutants.iter().map(Mutant::identifier).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }
}
