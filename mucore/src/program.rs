//! The set of loaded modules under analysis.
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use muinstr::modules::{Function, Module};

use crate::loader::ContextId;

/// Mutation bookkeeping of one function of a [`Bitcode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedFunction {
    /// Identifiers of the mutants touching the function.
    pub identifiers: BTreeSet<String>,

    /// Name of the unmodified copy, once cloned.
    pub baseline: Option<String>,

    /// Clone name per mutant identifier, once cloned.
    pub clones: BTreeMap<String, String>,
}

/// One loaded module along with the file it came from.
#[derive(Debug, Clone)]
pub struct Bitcode {
    pub module: Module,
    pub path: PathBuf,
    context: ContextId,
    prepared: BTreeMap<String, PreparedFunction>,
}

impl Bitcode {
    pub fn new(module: Module, path: PathBuf, context: ContextId) -> Self {
        Self {
            module,
            path,
            context,
            prepared: BTreeMap::new(),
        }
    }

    /// Context of the worker that parsed the module.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Functions with at least one prepared mutation, by name.
    pub fn prepared(&self) -> &BTreeMap<String, PreparedFunction> {
        &self.prepared
    }

    pub fn prepared_mut(&mut self) -> &mut BTreeMap<String, PreparedFunction> {
        &mut self.prepared
    }

    /// Record that mutant `identifier` touches `function`.
    pub fn prepare(&mut self, function: &str, identifier: &str) {
        self.prepared
            .entry(function.to_string())
            .or_default()
            .identifiers
            .insert(identifier.to_string());
    }

    pub fn is_mutated(&self) -> bool {
        !self.prepared.is_empty()
    }

    /// Name used for the textual dump and the compiled object of the module.
    pub fn unique_name(&self, index: usize) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        format!("{}-{}", index, stem)
    }
}

/// A function of the program, addressed by bitcode index and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionUnderTest {
    pub bitcode: usize,
    pub function: String,
}

/// Every module under analysis.
#[derive(Debug, Clone, Default)]
pub struct Program {
    bitcode: Vec<Bitcode>,
}

impl Program {
    pub fn new(bitcode: Vec<Bitcode>) -> Self {
        Self { bitcode }
    }

    pub fn bitcode(&self) -> &[Bitcode] {
        &self.bitcode
    }

    pub fn bitcode_mut(&mut self) -> &mut [Bitcode] {
        &mut self.bitcode
    }

    pub fn into_bitcode(self) -> Vec<Bitcode> {
        self.bitcode
    }

    pub fn len(&self) -> usize {
        self.bitcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitcode.is_empty()
    }

    /// Every defined function of every module, in module then name order.
    pub fn functions_under_test(&self) -> Vec<FunctionUnderTest> {
        self.bitcode
            .iter()
            .enumerate()
            .flat_map(|(index, bitcode)| {
                bitcode.module.definitions().map(move |f| FunctionUnderTest {
                    bitcode: index,
                    function: f.name.clone(),
                })
            })
            .collect()
    }

    pub fn function(&self, fut: &FunctionUnderTest) -> Option<&Function> {
        self.bitcode
            .get(fut.bitcode)?
            .module
            .functions
            .get(&fut.function)
    }

    pub fn function_mut(&mut self, bitcode: usize, name: &str) -> Option<&mut Function> {
        self.bitcode.get_mut(bitcode)?.module.functions.get_mut(name)
    }
}
