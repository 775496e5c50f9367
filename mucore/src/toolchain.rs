//! Native compile and link steps.
//!
//! Once mutated, every module is compiled to an object file (a parallel map)
//! and the objects are linked together with the mutant metadata into the final
//! artifact (one coordinated step).
use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use crossbeam::utils::Backoff;
use muinstr::modules::parser::parse_module_from_bytes;

use crate::{
    encoding::{encode_bytes, encode_u64},
    ext::diag::Diagnostics,
    magic::{
        IMAGE_MAGIC, INPUT_PLACEHOLDER, MUTANTS_SECTION_NAME, OUTPUT_PLACEHOLDER,
        TEXT_SECTION_NAME,
    },
    mudebug,
    objfile::{ObjectTarget, read_section, write_sections},
    parallel::{Task, TaskExecutor},
    program::{Bitcode, Program},
    utils::{
        conf::Configuration,
        error::{MuResult, ToolchainError},
    },
};

/// Compiles modules and links the resulting objects.
pub trait Toolchain: Send + Sync {
    fn name(&self) -> &str;

    /// Compile the module at position `index` of the program into `dir`.
    fn compile(&self, bitcode: &Bitcode, index: usize, dir: &Path)
    -> Result<PathBuf, ToolchainError>;

    /// Link `objects` and the encoded mutant metadata into `output`.
    fn link(
        &self,
        objects: &[PathBuf],
        metadata: &[u8],
        output: &Path,
    ) -> Result<PathBuf, ToolchainError>;
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// Stdout is discarded, stderr is collected for the error report.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<(), ToolchainError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolchainError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Drained concurrently with the wait below.
    let stderr = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });
    let collect = |handle: Option<std::thread::JoinHandle<String>>| {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let deadline = Instant::now() + timeout;
    let backoff = Backoff::new();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipe, the reader is detached.
            drop(stderr);
            return Err(ToolchainError::Timeout {
                program: program.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if backoff.is_completed() {
            std::thread::sleep(Duration::from_millis(5));
        } else {
            backoff.snooze();
        }
    };

    let stderr = collect(stderr);
    if !status.success() {
        return Err(ToolchainError::Failed {
            program: program.to_string(),
            status: status.to_string(),
            stderr,
        });
    }
    Ok(())
}

/// Compiles with a configured command and links with the system linker.
#[derive(Debug, Clone)]
pub struct ExternalToolchain {
    linker: String,
    linker_flags: Vec<String>,
    compile_command: Option<Vec<String>>,
    compile_timeout: Duration,
    link_timeout: Duration,
}

impl ExternalToolchain {
    pub fn new(config: &Configuration) -> Self {
        Self {
            linker: config.linker.clone(),
            linker_flags: config.linker_flags.clone(),
            compile_command: config.compile_command.clone(),
            compile_timeout: config.compile_timeout(),
            link_timeout: config.link_timeout(),
        }
    }

    /// Target of the objects being linked, used for the metadata object.
    fn target_of(objects: &[PathBuf]) -> ObjectTarget {
        objects
            .first()
            .and_then(|path| std::fs::read(path).ok())
            .and_then(|data| ObjectTarget::of(&data).ok())
            .unwrap_or_default()
    }
}

impl Toolchain for ExternalToolchain {
    fn name(&self) -> &str {
        &self.linker
    }

    fn compile(
        &self,
        bitcode: &Bitcode,
        index: usize,
        dir: &Path,
    ) -> Result<PathBuf, ToolchainError> {
        let name = bitcode.unique_name(index);
        let source = dir.join(format!("{}.mu", name));
        let object = dir.join(format!("{}.o", name));
        let text = bitcode.module.to_string();

        let Some(command) = &self.compile_command else {
            // Without a compiler the module travels as its own payload.
            let target = std::fs::read(&bitcode.path)
                .ok()
                .and_then(|data| ObjectTarget::of(&data).ok())
                .unwrap_or_default();
            let bytes = write_sections(target, &[(TEXT_SECTION_NAME, text.as_bytes())])?;
            std::fs::write(&object, bytes)?;
            return Ok(object);
        };

        std::fs::write(&source, text)?;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ToolchainError::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;
        let args: Vec<String> = args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &source.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &object.to_string_lossy())
            })
            .collect();
        run_with_timeout(program, &args, self.compile_timeout)?;
        Ok(object)
    }

    fn link(
        &self,
        objects: &[PathBuf],
        metadata: &[u8],
        output: &Path,
    ) -> Result<PathBuf, ToolchainError> {
        let meta_object = {
            let mut name = output.as_os_str().to_os_string();
            name.push(".mu_mutants.o");
            PathBuf::from(name)
        };
        let bytes = write_sections(
            Self::target_of(objects),
            &[(MUTANTS_SECTION_NAME, metadata)],
        )?;
        std::fs::write(&meta_object, bytes)?;

        let mut args = self.linker_flags.clone();
        args.extend(objects.iter().map(|p| p.to_string_lossy().into_owned()));
        args.push(meta_object.to_string_lossy().into_owned());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());

        let result = run_with_timeout(&self.linker, &args, self.link_timeout);
        let _ = std::fs::remove_file(&meta_object);
        result?;
        Ok(output.to_path_buf())
    }
}

/// Self-contained toolchain producing images for [`crate::runtime::Machine`].
///
/// Objects carry the module text in their `.mu_text` section. The linked
/// image is an object whose `.mu_text` section holds every module text and
/// whose `.mu_mutants` section holds the metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageToolchain;

impl ImageToolchain {
    /// Build the image payload out of module texts.
    pub fn encode_image(modules: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = IMAGE_MAGIC.to_vec();
        encode_u64(modules.len() as u64, &mut payload);
        for module in modules {
            encode_bytes(module, &mut payload);
        }
        payload
    }
}

impl Toolchain for ImageToolchain {
    fn name(&self) -> &str {
        "mu-image"
    }

    fn compile(
        &self,
        bitcode: &Bitcode,
        index: usize,
        dir: &Path,
    ) -> Result<PathBuf, ToolchainError> {
        let object = dir.join(format!("{}.o", bitcode.unique_name(index)));
        let text = bitcode.module.to_string();
        let bytes = write_sections(
            ObjectTarget::default(),
            &[(TEXT_SECTION_NAME, text.as_bytes())],
        )?;
        std::fs::write(&object, bytes)?;
        Ok(object)
    }

    fn link(
        &self,
        objects: &[PathBuf],
        metadata: &[u8],
        output: &Path,
    ) -> Result<PathBuf, ToolchainError> {
        let mut modules = Vec::with_capacity(objects.len());
        let mut defined = std::collections::BTreeSet::new();
        for path in objects {
            let data = std::fs::read(path)?;
            let text = read_section(&data, &[TEXT_SECTION_NAME])?.ok_or_else(|| {
                ToolchainError::MissingPayload {
                    path: path.clone(),
                    section: TEXT_SECTION_NAME.to_string(),
                }
            })?;

            let file = path.display().to_string();
            let module = parse_module_from_bytes(&text, Some(&file)).map_err(|source| {
                ToolchainError::InvalidPayload {
                    path: path.clone(),
                    source,
                }
            })?;
            let symbols = module
                .definitions()
                .map(|f| f.name.clone())
                .chain(module.trampolines.keys().cloned());
            for symbol in symbols {
                if !defined.insert(symbol.clone()) {
                    return Err(ToolchainError::DuplicateSymbol(symbol));
                }
            }
            modules.push(text);
        }

        let payload = Self::encode_image(&modules);
        let bytes = write_sections(
            ObjectTarget::default(),
            &[
                (TEXT_SECTION_NAME, payload.as_slice()),
                (MUTANTS_SECTION_NAME, metadata),
            ],
        )?;
        std::fs::write(output, bytes)?;
        Ok(output.to_path_buf())
    }
}

struct CompileTask<'a> {
    toolchain: &'a dyn Toolchain,
    dir: &'a Path,
}

impl<'a> Task for CompileTask<'a> {
    type Input = (usize, &'a Bitcode);
    type Output = PathBuf;

    fn run(
        &mut self,
        (index, bitcode): &mut (usize, &'a Bitcode),
        diag: &Diagnostics,
    ) -> MuResult<Option<PathBuf>> {
        let object = self.toolchain.compile(bitcode, *index, self.dir)?;
        mudebug!(
            diag,
            "Compiled {} into {}",
            bitcode.path.display(),
            object.display()
        );
        Ok(Some(object))
    }
}

/// Compile every module of the program in parallel. Objects are returned in
/// program order.
pub fn compile_program(
    toolchain: &dyn Toolchain,
    program: &Program,
    dir: &Path,
    workers: usize,
    diag: &Diagnostics,
) -> MuResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut inputs: Vec<(usize, &Bitcode)> = program.bitcode().iter().enumerate().collect();
    let outputs = TaskExecutor::new(diag, "Compiling original code", workers, |_| CompileTask {
        toolchain,
        dir,
    })
    .execute(&mut inputs)?;
    Ok(outputs.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use muinstr::modules::parser::parse_module;

    use super::*;
    use crate::{loader::ContextId, utils::error::MuError};

    fn program() -> Program {
        let a = parse_module("define i32 @one() {\nentry:\n    ret i32 1\n}\n").unwrap();
        let b = parse_module("define i32 @two() {\nentry:\n    ret i32 2\n}\n").unwrap();
        Program::new(vec![
            Bitcode::new(a, PathBuf::from("a.o"), ContextId(0)),
            Bitcode::new(b, PathBuf::from("b.o"), ContextId(0)),
        ])
    }

    #[test]
    fn image_link_embeds_every_module() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::silent();
        let program = program();
        let objects = compile_program(&ImageToolchain, &program, dir.path(), 2, &diag).unwrap();
        assert_eq!(
            objects,
            vec![dir.path().join("0-a.o"), dir.path().join("1-b.o")]
        );

        let output = dir.path().join("image");
        ImageToolchain.link(&objects, b"meta", &output).unwrap();
        let data = std::fs::read(&output).unwrap();
        let payload = read_section(&data, &[TEXT_SECTION_NAME]).unwrap().unwrap();
        assert!(payload.starts_with(&IMAGE_MAGIC));
        assert_eq!(
            read_section(&data, &[MUTANTS_SECTION_NAME]).unwrap().as_deref(),
            Some(&b"meta"[..])
        );
    }

    #[test]
    fn image_link_rejects_duplicate_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::silent();
        let module = parse_module("define i32 @one() {\nentry:\n    ret i32 1\n}\n").unwrap();
        let program = Program::new(vec![
            Bitcode::new(module.clone(), PathBuf::from("a.o"), ContextId(0)),
            Bitcode::new(module, PathBuf::from("b.o"), ContextId(0)),
        ]);
        let objects = compile_program(&ImageToolchain, &program, dir.path(), 1, &diag).unwrap();
        let err = ImageToolchain
            .link(&objects, b"", &dir.path().join("image"))
            .unwrap_err();
        assert!(matches!(err, ToolchainError::DuplicateSymbol(name) if name == "one"));
    }

    #[test]
    fn missing_payload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let object = dir.path().join("plain.o");
        std::fs::write(
            &object,
            write_sections(ObjectTarget::default(), &[(".data", b"x")]).unwrap(),
        )
        .unwrap();
        let err = ImageToolchain
            .link(&[object], b"", &dir.path().join("image"))
            .unwrap_err();
        assert!(err.is_missing_payload());
    }

    #[test]
    fn compile_failure_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::silent();
        let config = Configuration {
            linker: "cc".to_string(),
            compile_command: Some(vec!["/nonexistent/mu/cc".to_string(), "{input}".to_string()]),
            ..Default::default()
        };
        let toolchain = ExternalToolchain::new(&config);
        let err = compile_program(&toolchain, &program(), dir.path(), 2, &diag).unwrap_err();
        assert!(matches!(
            err,
            MuError::Toolchain(ToolchainError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_outcomes() {
        let sh = |script: &str| vec!["-c".to_string(), script.to_string()];
        assert!(run_with_timeout("sh", &sh("exit 0"), Duration::from_secs(10)).is_ok());

        let err = run_with_timeout("sh", &sh("echo boom >&2; exit 3"), Duration::from_secs(10))
            .unwrap_err();
        let ToolchainError::Failed { stderr, .. } = err else {
            panic!("expected a failure");
        };
        assert_eq!(stderr, "boom");

        let err = run_with_timeout("sh", &sh("sleep 5"), Duration::from_millis(100)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn external_compile_without_command_embeds_text() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = ExternalToolchain::new(&Configuration::default());
        let program = program();
        let object = toolchain
            .compile(&program.bitcode()[1], 1, dir.path())
            .unwrap();
        let data = std::fs::read(object).unwrap();
        let text = read_section(&data, &[TEXT_SECTION_NAME]).unwrap().unwrap();
        assert_eq!(parse_module_from_bytes(&text, None).unwrap(), program.bitcode()[1].module);
    }
}
