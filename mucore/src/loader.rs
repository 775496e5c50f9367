//! Module loader: parses extracted buffers into modules.
//!
//! Every worker owns a private [`LoadContext`]. Modules record the context
//! that produced them through their [`ContextId`], later stages address
//! modules by index into the [`Program`] and never by reference across
//! workers.
use std::path::PathBuf;

use muinstr::modules::{Module, parser::parse_module_from_bytes};

use crate::{
    ext::diag::Diagnostics,
    extractor::EmbeddedBuffer,
    mudebug, muwarn,
    parallel::{Task, TaskExecutor},
    program::{Bitcode, Program},
    utils::{
        conf::Configuration,
        error::{InputError, MuResult},
    },
};

/// Identifier of the parsing context owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub usize);

/// Worker-private parsing state.
#[derive(Debug)]
pub struct LoadContext {
    id: ContextId,
    parsed: usize,
}

impl LoadContext {
    pub fn new(id: ContextId) -> Self {
        Self { id, parsed: 0 }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Number of modules this context produced.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    /// Parse and verify one buffer.
    pub fn parse(&mut self, buffer: &EmbeddedBuffer) -> Result<Module, InputError> {
        let corrupt = |source| InputError::CorruptIr {
            path: buffer.path.clone(),
            source,
        };
        let file = buffer.path.display().to_string();
        let module = parse_module_from_bytes(&buffer.bytes, Some(&file)).map_err(corrupt)?;
        module.verify().map_err(corrupt)?;
        self.parsed += 1;
        Ok(module)
    }
}

struct LoadTask {
    context: LoadContext,
}

impl Task for LoadTask {
    type Input = EmbeddedBuffer;
    type Output = Bitcode;

    fn run(&mut self, buffer: &mut EmbeddedBuffer, diag: &Diagnostics) -> MuResult<Option<Bitcode>> {
        match self.context.parse(buffer) {
            Ok(module) => {
                mudebug!(
                    diag,
                    "Loaded {} ({} functions) in context {}",
                    buffer.path.display(),
                    module.functions.len(),
                    self.context.id().0
                );
                Ok(Some(Bitcode::new(
                    module,
                    std::mem::take(&mut buffer.path),
                    self.context.id(),
                )))
            }
            Err(e) => {
                muwarn!(diag, "{}", e);
                Ok(None)
            }
        }
    }
}

/// Modules loaded from a batch of buffers.
#[derive(Debug, Default)]
pub struct Loading {
    pub program: Program,
    /// Inputs whose buffer could not be parsed.
    pub skipped: Vec<PathBuf>,
}

pub struct ModuleLoader<'a> {
    config: &'a Configuration,
    diag: &'a Diagnostics,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(config: &'a Configuration, diag: &'a Diagnostics) -> Self {
        Self { config, diag }
    }

    /// Parse every buffer in parallel, one context per worker. Corrupt
    /// buffers are reported and dropped.
    pub fn load(&self, mut buffers: Vec<EmbeddedBuffer>) -> MuResult<Loading> {
        let outputs = TaskExecutor::new(
            self.diag,
            "Loading bitcode files",
            self.config.workers,
            |worker| LoadTask {
                context: LoadContext::new(ContextId(worker)),
            },
        )
        .execute(&mut buffers)?;

        let mut bitcode = Vec::with_capacity(outputs.len());
        let mut skipped = Vec::new();
        for (buffer, output) in buffers.into_iter().zip(outputs) {
            match output {
                Some(loaded) => bitcode.push(loaded),
                None => skipped.push(buffer.path),
            }
        }

        Ok(Loading {
            program: Program::new(bitcode),
            skipped,
        })
    }
}
