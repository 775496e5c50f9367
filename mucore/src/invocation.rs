//! End-to-end link invocation.
use std::path::PathBuf;

use tempfile::TempDir;

use crate::{
    ext::diag::Diagnostics,
    extractor::EmbeddedCodeExtractor,
    filters::Filters,
    finder::MutationsFinder,
    loader::ModuleLoader,
    magic::SCRATCH_PREFIX,
    metadata::encode_mutants,
    muerror, muinfo, muwarn,
    mutators::MutatorsFactory,
    parallel::SingleTaskExecutor,
    pipeline::{MutationPipeline, dump_ir},
    toolchain::{Toolchain, compile_program},
    utils::{
        conf::Configuration,
        error::{MuError, MuResult},
    },
};

/// Remove a scratch directory, warning when it cannot be removed.
fn release_scratch(dir: TempDir, diag: &Diagnostics) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        muwarn!(diag, "Cannot remove scratch directory {}: {}", path.display(), e);
    }
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSummary {
    /// Number of object files given.
    pub inputs: usize,
    /// Inputs dropped during extraction or loading.
    pub skipped: Vec<PathBuf>,
    /// Number of modules linked.
    pub modules: usize,
    /// Number of mutants embedded in the output.
    pub mutants: usize,
    pub output: PathBuf,
}

impl std::fmt::Display for InvocationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inputs: {}, skipped: {}, modules: {}, mutants: {}, output: {}",
            self.inputs,
            self.skipped.len(),
            self.modules,
            self.mutants,
            self.output.display()
        )
    }
}

/// One run of the mutation-injecting linker over a set of object files.
pub struct LinkerInvocation<'a> {
    inputs: Vec<PathBuf>,
    config: &'a Configuration,
    diag: &'a Diagnostics,
    toolchain: &'a dyn Toolchain,
    factory: MutatorsFactory,
}

impl<'a> LinkerInvocation<'a> {
    pub fn new(
        inputs: Vec<PathBuf>,
        config: &'a Configuration,
        diag: &'a Diagnostics,
        toolchain: &'a dyn Toolchain,
    ) -> Self {
        Self {
            inputs,
            config,
            diag,
            toolchain,
            factory: MutatorsFactory::default(),
        }
    }

    /// Run every stage. A fatal error is reported to the diagnostics once and
    /// returned.
    pub fn run(&self) -> MuResult<InvocationSummary> {
        self.execute().inspect_err(|e| {
            muerror!(self.diag, "{}", e);
        })
    }

    fn execute(&self) -> MuResult<InvocationSummary> {
        let config = self.config;
        let diag = self.diag;
        config.validate()?;
        let mutators = self.factory.mutators(&config.mutators)?;

        let extraction = EmbeddedCodeExtractor::new(config, diag).extract(&self.inputs)?;
        let loading = ModuleLoader::new(config, diag).load(extraction.buffers)?;
        let mut program = loading.program;

        let mut skipped = extraction.skipped;
        skipped.extend(loading.skipped);
        if !skipped.is_empty() {
            muwarn!(
                diag,
                "{} of {} input(s) skipped",
                skipped.len(),
                self.inputs.len()
            );
            if !config.allow_partial_extraction {
                return Err(MuError::PartialExtraction {
                    skipped: skipped.len(),
                });
            }
        }

        let filters = Filters::from_configuration(config);
        let mut mutants = MutationsFinder::new(mutators, &filters, diag).find_mutants(&program);
        muinfo!(diag, "Found {} mutants", mutants.len());
        if mutants.is_empty() && config.expect_mutants {
            return Err(MuError::NoMutants);
        }

        MutationPipeline::new(diag, config.workers).run(&mut program, &mut mutants)?;

        if let Some(dir) = &config.dump_ir {
            let written = dump_ir(&program, dir)?;
            muinfo!(diag, "Dumped {} mutated module(s) to {}", written, dir.display());
        }

        let (work_dir, scratch) = match &config.work_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let dir = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };
        let linked = compile_program(self.toolchain, &program, &work_dir, config.workers, diag)
            .and_then(|objects| {
                let metadata = encode_mutants(&mutants);
                SingleTaskExecutor::new(diag, "Link mutated program").execute(|| {
                    Ok(self.toolchain.link(&objects, &metadata, &config.output)?)
                })
            });
        if let Some(dir) = scratch {
            release_scratch(dir, diag);
        }

        Ok(InvocationSummary {
            inputs: self.inputs.len(),
            skipped,
            modules: program.len(),
            mutants: mutants.len(),
            output: linked?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_directories_are_removed() {
        let diag = Diagnostics::silent();
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("0-a.o"), b"object").unwrap();

        release_scratch(dir, &diag);
        assert!(!path.exists());
        assert_eq!(diag.warnings(), 0);
    }

    #[test]
    fn failed_cleanup_is_reported() {
        let diag = Diagnostics::silent();
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .unwrap();
        std::fs::remove_dir(dir.path()).unwrap();

        release_scratch(dir, &diag);
        assert_eq!(diag.warnings(), 1);
    }
}
