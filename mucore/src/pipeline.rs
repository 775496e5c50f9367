//! Mutation-injection pipeline.
//!
//! The pipeline rewrites a [`Program`] so that every mutant is materialized
//! as a clone of the function it touches, selectable at runtime through a
//! trampoline slot. Stages run strictly in order:
//!
//! 1. prepare: attach mutants to the functions they touch (coordinated)
//! 2. clone: one baseline copy and one clone per mutant (parallel)
//! 3. delete originals: drop the cloned bodies (parallel)
//! 4. insert trampolines: a slot per function, the original becomes a stub
//!    calling through it (parallel)
//! 5. apply: edit the instruction of every point in its clone (coordinated)
//!
//! Each stage asserts the state the previous one left.
use std::path::Path;

use muinstr::modules::{
    BasicBlock, Function, TrampolineSlot,
    instructions::{SlotCall, Statement},
    operand::{Label, Operand},
    terminator::{Ret, Terminator},
};
use strum::Display;

use crate::{
    ext::diag::Diagnostics,
    magic::{ORIGINAL_PREFIX, RESERVED_PREFIX, TRAMPOLINE_PREFIX},
    mudebug,
    mutant::Mutant,
    parallel::{SingleTaskExecutor, Task, TaskExecutor},
    program::{Bitcode, Program},
    utils::error::{MuResult, PipelineError},
};

/// State reached by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum PipelineState {
    Prepared,
    Cloned,
    OriginalsDeleted,
    TrampolinesInserted,
    Applied,
}

/// Name of the unmodified copy of `function`.
pub fn baseline_name(function: &str) -> String {
    format!("{}{}", ORIGINAL_PREFIX, function)
}

/// Name of the `index`-th mutant clone of `function`.
pub fn clone_name(function: &str, index: usize) -> String {
    format!("{}{}_{}", RESERVED_PREFIX, function, index)
}

/// Name of the trampoline slot of `function`.
pub fn trampoline_name(function: &str) -> String {
    format!("{}{}", TRAMPOLINE_PREFIX, function)
}

/// Build the body forwarding every call of `function` through `slot`.
fn stub_body(function: &Function, slot: &str) -> Vec<BasicBlock> {
    let dest = function.return_type.map(|_| {
        let mut name = "result".to_string();
        while function.params.iter().any(|(param, _)| *param == name) {
            name.push('_');
        }
        name
    });

    let call = SlotCall {
        dest: dest.clone(),
        ret_ty: function.return_type,
        slot: slot.to_string(),
        args: function
            .params
            .iter()
            .map(|(name, _)| Operand::Reg(name.clone()))
            .collect(),
    };

    vec![BasicBlock {
        label: Label::entry(),
        statements: vec![Statement::new(call)],
        terminator: Terminator::Ret(Ret {
            value: dest.map(Operand::Reg),
        }),
    }]
}

struct CloneTask;

impl Task for CloneTask {
    type Input = Bitcode;
    type Output = usize;

    fn run(&mut self, bitcode: &mut Bitcode, diag: &Diagnostics) -> MuResult<Option<usize>> {
        let mut cloned = 0;
        let mut prepared = std::mem::take(bitcode.prepared_mut());
        let module = &mut bitcode.module;

        for (name, prep) in prepared.iter_mut() {
            let original = module
                .functions
                .get(name)
                .filter(|f| !f.is_declaration())
                .cloned()
                .ok_or_else(|| PipelineError::UnknownFunction {
                    module: bitcode.path.clone(),
                    function: name.clone(),
                })?;

            let mut copies = vec![(baseline_name(name), None)];
            copies.extend(
                prep.identifiers
                    .iter()
                    .enumerate()
                    .map(|(index, id)| (clone_name(name, index), Some(id.clone()))),
            );

            for (symbol, identifier) in copies {
                if module.functions.contains_key(&symbol) {
                    return Err(PipelineError::SymbolClash {
                        function: name.clone(),
                        symbol,
                    }
                    .into());
                }
                let mut copy = original.clone();
                copy.name = symbol.clone();
                module.insert_function(copy);

                match identifier {
                    Some(identifier) => {
                        prep.clones.insert(identifier, symbol);
                        cloned += 1;
                    }
                    None => prep.baseline = Some(symbol),
                }
            }
            mudebug!(diag, "Cloned {} into {} mutants", name, prep.clones.len());
        }

        *bitcode.prepared_mut() = prepared;
        Ok(Some(cloned))
    }
}

struct DeleteOriginalsTask;

impl Task for DeleteOriginalsTask {
    type Input = Bitcode;
    type Output = usize;

    fn run(&mut self, bitcode: &mut Bitcode, _diag: &Diagnostics) -> MuResult<Option<usize>> {
        let mut deleted = 0;
        let prepared = bitcode.prepared().clone();
        for (name, prep) in &prepared {
            let baseline = prep
                .baseline
                .as_ref()
                .filter(|b| bitcode.module.functions.contains_key(*b));
            if baseline.is_none() {
                return Err(PipelineError::MissingBaseline {
                    function: name.clone(),
                }
                .into());
            }
            for identifier in &prep.identifiers {
                let has_clone = prep
                    .clones
                    .get(identifier)
                    .is_some_and(|clone| bitcode.module.functions.contains_key(clone));
                if !has_clone {
                    return Err(PipelineError::MissingClone {
                        identifier: identifier.clone(),
                        function: name.clone(),
                    }
                    .into());
                }
            }

            if let Some(original) = bitcode.module.functions.get_mut(name) {
                original.delete_body();
                deleted += 1;
            }
        }
        Ok(Some(deleted))
    }
}

struct InsertTrampolinesTask;

impl Task for InsertTrampolinesTask {
    type Input = Bitcode;
    type Output = usize;

    fn run(&mut self, bitcode: &mut Bitcode, _diag: &Diagnostics) -> MuResult<Option<usize>> {
        let prepared = bitcode.prepared().clone();
        for (name, prep) in &prepared {
            let slot_name = trampoline_name(name);
            if bitcode.module.trampolines.contains_key(&slot_name)
                || bitcode.module.functions.contains_key(&slot_name)
            {
                return Err(PipelineError::SymbolClash {
                    function: name.clone(),
                    symbol: slot_name,
                }
                .into());
            }
            let baseline = prep
                .baseline
                .clone()
                .ok_or_else(|| PipelineError::MissingBaseline {
                    function: name.clone(),
                })?;

            let original = bitcode.module.functions.get_mut(name).ok_or_else(|| {
                PipelineError::UnknownFunction {
                    module: bitcode.path.clone(),
                    function: name.clone(),
                }
            })?;
            if !original.is_declaration() {
                return Err(PipelineError::OriginalNotDeleted {
                    function: name.clone(),
                }
                .into());
            }
            original.body = stub_body(original, &slot_name);

            bitcode.module.trampolines.insert(
                slot_name.clone(),
                TrampolineSlot {
                    name: slot_name,
                    baseline,
                    mutants: prep.clones.clone(),
                },
            );
        }
        Ok(Some(prepared.len()))
    }
}

/// Drives the stages over one program.
pub struct MutationPipeline<'a> {
    diag: &'a Diagnostics,
    workers: usize,
    state: Option<PipelineState>,
}

impl<'a> MutationPipeline<'a> {
    pub fn new(diag: &'a Diagnostics, workers: usize) -> Self {
        Self {
            diag,
            workers,
            state: None,
        }
    }

    pub fn state(&self) -> Option<PipelineState> {
        self.state
    }

    fn expect(
        &self,
        stage: &'static str,
        expected: Option<PipelineState>,
    ) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::StageOrder {
                stage,
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Run every stage in order.
    pub fn run(&mut self, program: &mut Program, mutants: &mut [Mutant]) -> MuResult<()> {
        self.prepare(program, mutants)?;
        self.clone_functions(program, mutants)?;
        self.delete_originals(program)?;
        self.insert_trampolines(program)?;
        self.apply(program, mutants)
    }

    /// Attach every point of every mutant to the function it lives in.
    pub fn prepare(&mut self, program: &mut Program, mutants: &[Mutant]) -> MuResult<()> {
        self.expect("prepare", None)?;
        SingleTaskExecutor::new(self.diag, "Preparing original functions for mutation").execute(
            || {
                for mutant in mutants {
                    for point in mutant.points() {
                        let address = point.address().ok_or_else(|| {
                            PipelineError::UnmaterializedPoint {
                                identifier: mutant.identifier().to_string(),
                            }
                        })?;
                        let fut = &address.function;
                        let known = program
                            .function(fut)
                            .is_some_and(|f| !f.is_declaration());
                        if !known {
                            return Err(PipelineError::UnknownFunction {
                                module: program
                                    .bitcode()
                                    .get(fut.bitcode)
                                    .map(|b| b.path.clone())
                                    .unwrap_or_default(),
                                function: fut.function.clone(),
                            }
                            .into());
                        }
                        program.bitcode_mut()[fut.bitcode]
                            .prepare(&fut.function, mutant.identifier());
                    }
                }
                Ok(())
            },
        )?;
        self.state = Some(PipelineState::Prepared);
        Ok(())
    }

    /// Clone every prepared function and record on each point the clone it
    /// will be applied to.
    pub fn clone_functions(&mut self, program: &mut Program, mutants: &mut [Mutant]) -> MuResult<()> {
        self.expect("clone", Some(PipelineState::Prepared))?;
        TaskExecutor::new(
            self.diag,
            "Cloning functions for mutation",
            self.workers,
            |_| CloneTask,
        )
        .execute(program.bitcode_mut())?;

        for mutant in mutants.iter_mut() {
            let identifier = mutant.identifier().to_string();
            for point in mutant.points_mut() {
                let Some(address) = point.address().cloned() else {
                    return Err(PipelineError::UnmaterializedPoint { identifier }.into());
                };
                let clone = program.bitcode()[address.function.bitcode]
                    .prepared()
                    .get(&address.function.function)
                    .and_then(|prep| prep.clones.get(&identifier))
                    .ok_or_else(|| PipelineError::MissingClone {
                        identifier: identifier.clone(),
                        function: address.function.function.clone(),
                    })?;
                point.set_mutated_function(clone.clone());
            }
        }

        self.state = Some(PipelineState::Cloned);
        Ok(())
    }

    /// Turn every cloned original into a declaration.
    pub fn delete_originals(&mut self, program: &mut Program) -> MuResult<()> {
        self.expect("delete originals", Some(PipelineState::Cloned))?;
        TaskExecutor::new(
            self.diag,
            "Removing original functions",
            self.workers,
            |_| DeleteOriginalsTask,
        )
        .execute(program.bitcode_mut())?;
        self.state = Some(PipelineState::OriginalsDeleted);
        Ok(())
    }

    /// Install a slot per mutated function and route the original symbol
    /// through it.
    pub fn insert_trampolines(&mut self, program: &mut Program) -> MuResult<()> {
        self.expect("insert trampolines", Some(PipelineState::OriginalsDeleted))?;
        TaskExecutor::new(
            self.diag,
            "Redirect function calls",
            self.workers,
            |_| InsertTrampolinesTask,
        )
        .execute(program.bitcode_mut())?;
        self.state = Some(PipelineState::TrampolinesInserted);
        Ok(())
    }

    /// Edit every point in its clone, then verify the mutated modules.
    pub fn apply(&mut self, program: &mut Program, mutants: &[Mutant]) -> MuResult<()> {
        self.expect("apply", Some(PipelineState::TrampolinesInserted))?;
        SingleTaskExecutor::new(self.diag, "Applying mutations").execute(|| {
            for mutant in mutants {
                let identifier = mutant.identifier();
                for point in mutant.points() {
                    let address = point.address().ok_or_else(|| {
                        PipelineError::UnmaterializedPoint {
                            identifier: identifier.to_string(),
                        }
                    })?;
                    let target = point.mutated_function().ok_or_else(|| {
                        PipelineError::MissingClone {
                            identifier: identifier.to_string(),
                            function: address.function.function.clone(),
                        }
                    })?;
                    let clone = program
                        .function_mut(address.function.bitcode, target)
                        .ok_or_else(|| PipelineError::MissingClone {
                            identifier: identifier.to_string(),
                            function: address.function.function.clone(),
                        })?;
                    let stmt = clone.statement_at_mut(&address.location).ok_or_else(|| {
                        PipelineError::MissingInstruction {
                            identifier: identifier.to_string(),
                            function: target.to_string(),
                        }
                    })?;
                    if !point.mutator().apply(&mut stmt.instr) {
                        return Err(PipelineError::InstructionMismatch {
                            identifier: identifier.to_string(),
                            function: target.to_string(),
                            mutator: point.mutator().id(),
                        }
                        .into());
                    }
                }
            }

            for bitcode in program.bitcode().iter().filter(|b| b.is_mutated()) {
                bitcode
                    .module
                    .verify()
                    .map_err(|source| PipelineError::InvalidModule {
                        path: bitcode.path.clone(),
                        source,
                    })?;
            }
            Ok(())
        })?;
        self.state = Some(PipelineState::Applied);
        Ok(())
    }
}

/// Write the text of every mutated module into `dir`.
pub fn dump_ir(program: &Program, dir: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dir)?;
    let mut written = 0;
    for (index, bitcode) in program.bitcode().iter().enumerate() {
        if !bitcode.is_mutated() {
            continue;
        }
        let path = dir.join(format!("{}.mu", bitcode.unique_name(index)));
        std::fs::write(path, bitcode.module.to_string())?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use muinstr::modules::{instructions::MuInstr, int::IBinaryOp, parser::parse_module};

    use super::*;
    use crate::{
        filters::Filters,
        finder::MutationsFinder,
        loader::ContextId,
        mutant::{MutationPoint, SourceLocation},
        mutators::{DEFAULT_GROUP, MutatorsFactory},
        utils::error::MuError,
    };

    const MODULE: &str = r#"
module "src/calc.c"
define i32 @calc(%a: i32, %result: i32) !loc("src/calc.c", 1, 1) {
entry:
    %s = add i32 %a, %result !loc(2, 9)
    %t = sub i32 %s, i32 1 !loc(3, 9)
    ret %t
}
define i32 @main() !loc("src/calc.c", 6, 1) {
entry:
    %r = call i32 @calc(i32 4, i32 5)
    ret %r
}
"#;

    fn setup(source: &str) -> (Program, Vec<Mutant>) {
        let module = parse_module(source).unwrap();
        let program = Program::new(vec![Bitcode::new(
            module,
            PathBuf::from("calc.o"),
            ContextId(0),
        )]);
        let diag = Diagnostics::silent();
        let filters = Filters::default();
        let mutators = MutatorsFactory::default()
            .mutators(&[DEFAULT_GROUP.to_string()])
            .unwrap();
        let mutants = MutationsFinder::new(mutators, &filters, &diag).find_mutants(&program);
        (program, mutants)
    }

    #[test]
    fn full_run_materializes_every_mutant() {
        let (mut program, mut mutants) = setup(MODULE);
        let original = program.bitcode()[0].module.functions["calc"].clone();
        let ids: Vec<_> = mutants.iter().map(|m| m.identifier().to_string()).collect();
        assert_eq!(
            ids,
            vec!["cxx_add_to_sub:src/calc.c:2:9", "cxx_sub_to_add:src/calc.c:3:9"]
        );

        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 2);
        pipeline.run(&mut program, &mut mutants).unwrap();
        assert_eq!(pipeline.state(), Some(PipelineState::Applied));

        let module = &program.bitcode()[0].module;
        let baseline = &module.functions["_mu_original_calc"];
        assert_eq!(baseline.body, original.body);

        let slot = &module.trampolines["_mu_trampoline_calc"];
        assert_eq!(slot.baseline, "_mu_original_calc");
        assert_eq!(slot.mutants.len(), 2);
        assert_eq!(slot.mutants[&ids[0]], "_mu_calc_0");
        assert_eq!(slot.mutants[&ids[1]], "_mu_calc_1");

        let op = |name: &str, index: usize| {
            module.functions[name].body[0].statements[index]
                .instr
                .try_as_i_binary_ref()
                .map(|b| b.op)
        };
        assert_eq!(op("_mu_calc_0", 0), Some(IBinaryOp::Sub));
        assert_eq!(op("_mu_calc_0", 1), Some(IBinaryOp::Sub));
        assert_eq!(op("_mu_calc_1", 0), Some(IBinaryOp::Add));
        assert_eq!(op("_mu_calc_1", 1), Some(IBinaryOp::Add));

        // The original symbol forwards through the slot, without clashing
        // with the parameter names.
        let stub = &module.functions["calc"];
        assert_eq!(stub.body.len(), 1);
        let MuInstr::SlotCall(call) = &stub.body[0].statements[0].instr else {
            panic!("expected a slot call");
        };
        assert_eq!(call.slot, "_mu_trampoline_calc");
        assert_eq!(call.dest.as_deref(), Some("result_"));
        assert_eq!(call.args.len(), 2);

        // Untouched functions are not redirected.
        assert!(!module.trampolines.contains_key("_mu_trampoline_main"));
        assert!(!module.functions.contains_key("_mu_original_main"));

        for mutant in &mutants {
            assert!(mutant.points().iter().all(|p| p.mutated_function().is_some()));
        }
    }

    #[test]
    fn stages_check_their_order() {
        let (mut program, mut mutants) = setup(MODULE);
        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);

        let err = pipeline.delete_originals(&mut program).unwrap_err();
        assert!(matches!(
            err,
            MuError::Pipeline(PipelineError::StageOrder {
                expected: Some(PipelineState::Cloned),
                found: None,
                ..
            })
        ));

        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();
        assert!(pipeline.apply(&mut program, &mutants).is_err());
        assert!(pipeline.prepare(&mut program, &mutants).is_err());

        // Clones exist and originals still have their body.
        let module = &program.bitcode()[0].module;
        assert!(!module.functions["calc"].is_declaration());
        assert!(module.functions.contains_key("_mu_calc_1"));

        pipeline.delete_originals(&mut program).unwrap();
        assert!(program.bitcode()[0].module.functions["calc"].is_declaration());
        assert_eq!(pipeline.state(), Some(PipelineState::OriginalsDeleted));
    }

    #[test]
    fn generated_symbols_must_be_fresh() {
        let source = format!(
            "{}\ndefine i32 @_mu_calc_0() {{\nentry:\n    ret i32 0\n}}\n",
            MODULE
        );
        let (mut program, mut mutants) = setup(&source);
        let diag = Diagnostics::silent();
        let err = MutationPipeline::new(&diag, 1)
            .run(&mut program, &mut mutants)
            .unwrap_err();
        assert!(matches!(
            err,
            MuError::Pipeline(PipelineError::SymbolClash { .. })
        ));
    }

    fn pipeline_error(result: MuResult<()>) -> PipelineError {
        match result {
            Err(MuError::Pipeline(e)) => e,
            other => panic!("expected a pipeline error, got {:?}", other),
        }
    }

    #[test]
    fn detached_points_cannot_be_prepared() {
        let (mut program, _) = setup(MODULE);
        let mutator = MutatorsFactory::default().lookup("cxx_add_to_sub").unwrap();
        let location = SourceLocation::new("src/calc.c", 2, 9);
        let identifier = "cxx_add_to_sub:src/calc.c:2:9";
        let detached = Mutant::new(
            identifier,
            vec![MutationPoint::detached(mutator, location, identifier)],
        );

        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);
        let err = pipeline_error(pipeline.prepare(&mut program, &[detached]));
        assert!(matches!(
            err,
            PipelineError::UnmaterializedPoint { identifier: ref id } if id == identifier
        ));
        assert_eq!(pipeline.state(), None);
        assert!(!program.bitcode()[0].is_mutated());
    }

    #[test]
    fn originals_are_kept_when_a_copy_is_missing() {
        let (mut program, mut mutants) = setup(MODULE);
        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);
        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();

        program.bitcode_mut()[0].module.functions.remove("_mu_calc_1");
        let err = pipeline_error(pipeline.delete_originals(&mut program));
        assert!(matches!(
            err,
            PipelineError::MissingClone { ref identifier, ref function }
                if identifier == "cxx_sub_to_add:src/calc.c:3:9" && function == "calc"
        ));
        assert_eq!(pipeline.state(), Some(PipelineState::Cloned));
        assert!(!program.bitcode()[0].module.functions["calc"].is_declaration());

        let (mut program, mut mutants) = setup(MODULE);
        let mut pipeline = MutationPipeline::new(&diag, 1);
        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();
        program.bitcode_mut()[0]
            .module
            .functions
            .remove("_mu_original_calc");
        let err = pipeline_error(pipeline.delete_originals(&mut program));
        assert!(matches!(
            err,
            PipelineError::MissingBaseline { ref function } if function == "calc"
        ));
    }

    #[test]
    fn trampolines_need_a_deleted_original() {
        let (mut program, mut mutants) = setup(MODULE);
        let body = program.bitcode()[0].module.functions["calc"].body.clone();
        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);
        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();
        pipeline.delete_originals(&mut program).unwrap();

        program.function_mut(0, "calc").unwrap().body = body;
        let err = pipeline_error(pipeline.insert_trampolines(&mut program));
        assert!(matches!(
            err,
            PipelineError::OriginalNotDeleted { ref function } if function == "calc"
        ));
        assert_eq!(pipeline.state(), Some(PipelineState::OriginalsDeleted));
        assert!(program.bitcode()[0].module.trampolines.is_empty());
    }

    #[test]
    fn apply_checks_the_copied_instruction() {
        let (mut program, mut mutants) = setup(MODULE);
        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);
        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();
        pipeline.delete_originals(&mut program).unwrap();
        pipeline.insert_trampolines(&mut program).unwrap();

        let location = mutants[0].points()[0].address().unwrap().location.clone();
        let clone = program.function_mut(0, "_mu_calc_0").unwrap();
        clone
            .statement_at_mut(&location)
            .and_then(|stmt| stmt.instr.try_as_i_binary_mut())
            .unwrap()
            .op = IBinaryOp::Mul;

        let err = pipeline_error(pipeline.apply(&mut program, &mutants));
        assert!(matches!(
            err,
            PipelineError::InstructionMismatch { ref function, mutator: "cxx_add_to_sub", .. }
                if function == "_mu_calc_0"
        ));
        assert_eq!(pipeline.state(), Some(PipelineState::TrampolinesInserted));

        let clone = &program.bitcode()[0].module.functions["_mu_calc_0"];
        let op = clone
            .instruction_at(&location)
            .and_then(|instr| instr.try_as_i_binary_ref())
            .map(|b| b.op);
        assert_eq!(op, Some(IBinaryOp::Mul));
    }

    #[test]
    fn apply_needs_the_instruction_in_the_copy() {
        let (mut program, mut mutants) = setup(MODULE);
        let diag = Diagnostics::silent();
        let mut pipeline = MutationPipeline::new(&diag, 1);
        pipeline.prepare(&mut program, &mutants).unwrap();
        pipeline.clone_functions(&mut program, &mut mutants).unwrap();
        pipeline.delete_originals(&mut program).unwrap();
        pipeline.insert_trampolines(&mut program).unwrap();

        let location = mutants[1].points()[0].address().unwrap().location.clone();
        let clone = program.function_mut(0, "_mu_calc_1").unwrap();
        clone.body[0].statements.truncate(location.index);
        assert!(clone.instruction_at(&location).is_none());

        let err = pipeline_error(pipeline.apply(&mut program, &mutants));
        assert!(matches!(
            err,
            PipelineError::MissingInstruction { ref identifier, ref function }
                if identifier == "cxx_sub_to_add:src/calc.c:3:9" && function == "_mu_calc_1"
        ));
        assert_eq!(pipeline.state(), Some(PipelineState::TrampolinesInserted));
    }

    #[test]
    fn dumps_only_mutated_modules() {
        let (mut program, mut mutants) = setup(MODULE);
        let untouched = parse_module("declare i32 @ext(%x: i32)").unwrap();
        let mut bitcode = program.into_bitcode();
        bitcode.push(Bitcode::new(untouched, PathBuf::from("ext.o"), ContextId(1)));
        program = Program::new(bitcode);
        assert_eq!(program.bitcode()[1].context(), ContextId(1));

        let diag = Diagnostics::silent();
        MutationPipeline::new(&diag, 2)
            .run(&mut program, &mut mutants)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(dump_ir(&program, dir.path()).unwrap(), 1);
        let text = std::fs::read_to_string(dir.path().join("0-calc.mu")).unwrap();
        let reparsed = parse_module(&text).unwrap();
        assert_eq!(reparsed, program.bitcode()[0].module);
    }
}
