//! IR modules
//!
//! This module groups the structures making up a compilation unit of the
//! mutation IR: modules own functions and trampoline slots, functions own
//! basic blocks, basic blocks own statements and a terminator.
//!
//! - `int`: integer arithmetic, comparisons, shifts and bitwise ops
//! - `instructions`: the `MuInstr` tagged union, calls and slot calls
//! - `terminator`: branches, jumps, returns and traps
//! - `operand`: shared operand and SSA name types
//! - `parser`/`fmt`: textual form of a module
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    modules::{
        instructions::{Instruction, MuInstr, Statement},
        operand::{Label, Name},
        terminator::Terminator,
    },
    types::IType,
    utils::Error,
};

pub mod fmt;
pub mod instructions;
pub mod int;
pub mod operand;
#[cfg(feature = "chumsky")]
pub mod parser;
pub mod terminator;

/// Line and column of an instruction in its source file.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DebugLoc {
    pub line: u32,
    pub column: u32,
}

/// Source position of a function definition.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Position of a statement within a function body.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstrLocation {
    pub block: Label,
    pub index: usize,
}

/// A basic block within a function, containing a sequence of statements
/// and ending with a control flow terminator.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: Label,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

/// A function made of basic blocks and parameter metadata.
///
/// A function without any basic block is a declaration: its definition lives
/// in another module (or in the runtime). By convention the first block is the
/// entry block and is labelled [`Label::ENTRY`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(Name, IType)>,
    pub return_type: Option<IType>,
    pub body: Vec<BasicBlock>,
    pub loc: Option<FunctionLoc>,
}

impl Function {
    /// Returns true if the function has no body.
    pub fn is_declaration(&self) -> bool {
        self.body.is_empty()
    }

    /// Drop the body, turning the definition into a declaration.
    pub fn delete_body(&mut self) {
        self.body.clear();
    }

    pub fn block(&self, label: &Label) -> Option<&BasicBlock> {
        self.body.iter().find(|bb| &bb.label == label)
    }

    /// Iterate over every statement together with its location.
    pub fn statements(&self) -> impl Iterator<Item = (InstrLocation, &Statement)> {
        self.body.iter().flat_map(|bb| {
            bb.statements.iter().enumerate().map(|(index, stmt)| {
                (
                    InstrLocation {
                        block: bb.label.clone(),
                        index,
                    },
                    stmt,
                )
            })
        })
    }

    pub fn statement_at(&self, location: &InstrLocation) -> Option<&Statement> {
        self.block(&location.block)?.statements.get(location.index)
    }

    /// Instruction at the given location, if any.
    pub fn instruction_at(&self, location: &InstrLocation) -> Option<&MuInstr> {
        self.statement_at(location).map(|stmt| &stmt.instr)
    }

    pub fn statement_at_mut(&mut self, location: &InstrLocation) -> Option<&mut Statement> {
        self.body
            .iter_mut()
            .find(|bb| bb.label == location.block)?
            .statements
            .get_mut(location.index)
    }

    /// Verify SSA form and control flow of the function:
    /// 1) The entry block exists and labels are unique.
    /// 2) Each name is defined exactly once.
    /// 3) Each operand refers to a defined name.
    /// 4) Each branch target exists.
    pub fn check_ssa(&self) -> Result<(), Error> {
        if self.is_declaration() {
            return Ok(());
        }

        if !self.body[0].label.is_entry() {
            return Err(Error::MissingEntryBlock {
                function: self.name.clone(),
            });
        }

        let mut labels = BTreeSet::new();
        for bb in &self.body {
            if !labels.insert(&bb.label) {
                return Err(Error::BlockLabelAlreadyExists {
                    function: self.name.clone(),
                    label: bb.label.clone(),
                });
            }
        }

        let mut defined_names = BTreeSet::new();
        for (name, _) in &self.params {
            if !defined_names.insert(name) {
                return Err(Error::DuplicateSSAName {
                    function: self.name.clone(),
                    duplicate: name.clone(),
                });
            }
        }
        for (_, stmt) in self.statements() {
            if let Some(dest) = stmt.instr.destination() {
                if !defined_names.insert(dest) {
                    return Err(Error::DuplicateSSAName {
                        function: self.name.clone(),
                        duplicate: dest.clone(),
                    });
                }
            }
        }

        for bb in &self.body {
            let uses = bb
                .statements
                .iter()
                .flat_map(|stmt| stmt.instr.dependencies())
                .chain(bb.terminator.dependencies());
            for name in uses {
                if !defined_names.contains(name) {
                    return Err(Error::UndefinedSSAName {
                        function: self.name.clone(),
                        undefined: name.clone(),
                    });
                }
            }

            for target in bb.terminator.iter_targets() {
                if !labels.contains(target) {
                    return Err(Error::UndefinedBasicBlock {
                        function: self.name.clone(),
                        label: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Runtime-selectable redirection point.
///
/// Calls through a slot reach `baseline` unless one of the mutant identifiers
/// listed in `mutants` is active, in which case the associated clone is called.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TrampolineSlot {
    pub name: String,
    pub baseline: String,
    pub mutants: BTreeMap<String, String>,
}

impl TrampolineSlot {
    /// Resolve the function called through this slot given a predicate telling
    /// whether a mutant identifier is active.
    pub fn resolve(&self, is_active: impl Fn(&str) -> bool) -> &str {
        self.mutants
            .iter()
            .find(|(identifier, _)| is_active(identifier))
            .map(|(_, target)| target.as_str())
            .unwrap_or(&self.baseline)
    }
}

/// A module containing defined and declared functions.
///
/// `Module` acts as the compilation unit boundary. `source` carries the name
/// of the source file the module was compiled from, when known.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
pub struct Module {
    pub source: Option<String>,
    pub functions: BTreeMap<String, Function>,
    pub trampolines: BTreeMap<String, TrampolineSlot>,
}

impl Module {
    /// Insert a function, replacing any previous function of the same name.
    pub fn insert_function(&mut self, function: Function) -> Option<Function> {
        self.functions.insert(function.name.clone(), function)
    }

    /// Iterate over defined (non-declaration) functions.
    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values().filter(|f| !f.is_declaration())
    }

    /// Verify every function and every symbol reference of the module.
    pub fn verify(&self) -> Result<(), Error> {
        for function in self.functions.values() {
            function.check_ssa()?;

            for (_, stmt) in function.statements() {
                match &stmt.instr {
                    MuInstr::Call(call) if !self.functions.contains_key(&call.callee) => {
                        return Err(Error::UndefinedFunction {
                            function: function.name.clone(),
                            undefined: call.callee.clone(),
                        });
                    }
                    MuInstr::SlotCall(call) if !self.trampolines.contains_key(&call.slot) => {
                        return Err(Error::UndefinedTrampoline {
                            function: function.name.clone(),
                            undefined: call.slot.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        for slot in self.trampolines.values() {
            for target in std::iter::once(&slot.baseline).chain(slot.mutants.values()) {
                if !self.functions.contains_key(target) {
                    return Err(Error::UndefinedFunction {
                        function: slot.name.clone(),
                        undefined: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
