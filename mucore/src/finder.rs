//! Mutation discovery and deduplication.
use std::{collections::HashMap, sync::Arc};

use muinstr::modules::{Function, Module};

use crate::{
    ext::diag::Diagnostics,
    filters::{Filters, function_file},
    mudebug,
    mutant::{Mutant, MutationPoint, PointAddress, SourceLocation},
    mutators::Mutator,
    program::{FunctionUnderTest, Program},
};

/// Finds mutation points in a [`Program`] and groups them into mutants.
pub struct MutationsFinder<'a> {
    mutators: Vec<Arc<dyn Mutator>>,
    filters: &'a Filters,
    diag: &'a Diagnostics,
}

impl<'a> MutationsFinder<'a> {
    pub fn new(mutators: Vec<Arc<dyn Mutator>>, filters: &'a Filters, diag: &'a Diagnostics) -> Self {
        Self {
            mutators,
            filters,
            diag,
        }
    }

    /// Every point of every function that passes the filters, in program
    /// order.
    pub fn find_points(&self, program: &Program) -> Vec<MutationPoint> {
        let mut points = Vec::new();
        for fut in program.functions_under_test() {
            let module = &program.bitcode()[fut.bitcode].module;
            let Some(function) = module.functions.get(&fut.function) else {
                continue;
            };
            if self.filters.skip_function(function, module) {
                mudebug!(self.diag, "Skipping function {}", function.name);
                continue;
            }
            self.find_in_function(&fut, function, module, &mut points);
        }
        points
    }

    fn find_in_function(
        &self,
        fut: &FunctionUnderTest,
        function: &Function,
        module: &Module,
        points: &mut Vec<MutationPoint>,
    ) {
        let file = function_file(function, module).unwrap_or("<unknown>");
        for (location, stmt) in function.statements() {
            for mutator in &self.mutators {
                if !mutator.can_mutate(&stmt.instr) {
                    continue;
                }
                let source = match &stmt.loc {
                    Some(loc) => SourceLocation::new(file, loc.line, loc.column),
                    None => SourceLocation::new(file, 0, 0),
                };
                let point = MutationPoint::new(
                    mutator.clone(),
                    source,
                    PointAddress {
                        function: fut.clone(),
                        location: location.clone(),
                    },
                );
                if self.filters.skip_point(&point) {
                    continue;
                }
                points.push(point);
            }
        }
    }

    /// Find points and group them into mutants, in canonical order.
    pub fn find_mutants(&self, program: &Program) -> Vec<Mutant> {
        let points = self.find_points(program);
        let found = points.len();
        let mutants = deduplicate(points);
        mudebug!(
            self.diag,
            "Found {} mutation points grouped in {} mutants",
            found,
            mutants.len()
        );
        mutants
    }
}

/// Group points by identifier into mutants sorted by identifier. Points keep
/// their relative order inside each mutant.
pub fn deduplicate(points: Vec<MutationPoint>) -> Vec<Mutant> {
    let mut groups: HashMap<String, Vec<MutationPoint>> = HashMap::new();
    for point in points {
        groups
            .entry(point.user_identifier().to_string())
            .or_default()
            .push(point);
    }

    let mut mutants: Vec<Mutant> = groups
        .into_iter()
        .map(|(identifier, points)| Mutant::new(identifier, points))
        .collect();
    mutants.sort_by(Mutant::compare);
    mutants
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use muinstr::modules::parser::parse_module;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        loader::ContextId,
        mutators::{DEFAULT_GROUP, MutatorsFactory},
        program::Bitcode,
        utils::conf::Configuration,
    };

    const MODULE: &str = r#"
module "src/math.c"
define i32 @calc(%a: i32, %b: i32) !loc("src/math.c", 1, 1) {
entry:
    %c = add i32 %a, %b !loc(2, 5)
    %d = add i32 %c, %b !loc(2, 5)
    %e = icmp.eq i32 %d, i32 0 !loc(3, 7)
    %f = mul i32 %d, %a
    branch %e, label zero, label other
zero:
    ret %c
other:
    ret %f
}
"#;

    fn program() -> Program {
        let module = parse_module(MODULE).unwrap();
        Program::new(vec![Bitcode::new(
            module,
            PathBuf::from("math.o"),
            ContextId(0),
        )])
    }

    #[test]
    fn finds_and_groups_points() {
        let diag = Diagnostics::silent();
        let factory = MutatorsFactory::default();
        let filters = Filters::from_configuration(&Configuration::default());
        let mutators = factory.mutators(&[DEFAULT_GROUP.to_string()]).unwrap();
        let finder = MutationsFinder::new(mutators, &filters, &diag);

        let program = program();
        let points = finder.find_points(&program);
        // The multiplication has no location and is filtered out.
        assert_eq!(points.len(), 3);

        let mutants = finder.find_mutants(&program);
        let summary: Vec<_> = mutants
            .iter()
            .map(|m| (m.identifier(), m.points().len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("cxx_add_to_sub:src/math.c:2:5", 2),
                ("cxx_eq_to_ne:src/math.c:3:7", 1),
            ]
        );
    }

    #[test]
    fn discovery_is_idempotent() {
        let diag = Diagnostics::silent();
        let factory = MutatorsFactory::default();
        let filters = Filters::default();
        let mutators = factory.mutators(&[DEFAULT_GROUP.to_string()]).unwrap();
        let finder = MutationsFinder::new(mutators, &filters, &diag);

        let program = program();
        let shape = |mutants: Vec<Mutant>| -> Vec<(String, usize)> {
            mutants
                .iter()
                .map(|m| (m.identifier().to_string(), m.points().len()))
                .collect()
        };
        let first = shape(finder.find_mutants(&program));
        let second = shape(finder.find_mutants(&program));
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    fn detached(identifier: &str) -> MutationPoint {
        let mutator = MutatorsFactory::default().lookup("cxx_add_to_sub").unwrap();
        MutationPoint::detached(mutator, SourceLocation::default(), identifier)
    }

    #[test]
    fn dedup_sorts_by_identifier() {
        let mutants = deduplicate(vec![detached("m3"), detached("m1"), detached("m2")]);
        let ids: Vec<_> = mutants.iter().map(Mutant::identifier).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    proptest! {
        #[test]
        fn dedup_is_deterministic_and_idempotent(ids in prop::collection::vec("[a-d]{1,2}", 0..40)) {
            let points: Vec<_> = ids.iter().map(|id| detached(id)).collect();
            let mutants = deduplicate(points.clone());

            let mut expected = ids.clone();
            expected.sort();
            expected.dedup();
            let found: Vec<_> = mutants.iter().map(|m| m.identifier().to_string()).collect();
            prop_assert_eq!(&found, &expected);

            let total: usize = mutants.iter().map(|m| m.points().len()).sum();
            prop_assert_eq!(total, ids.len());

            let regrouped = deduplicate(
                mutants.iter().flat_map(|m| m.points().iter().cloned()).collect(),
            );
            let again: Vec<_> = regrouped
                .iter()
                .map(|m| (m.identifier().to_string(), m.points().len()))
                .collect();
            let before: Vec<_> = mutants
                .iter()
                .map(|m| (m.identifier().to_string(), m.points().len()))
                .collect();
            prop_assert_eq!(again, before);
        }
    }
}
