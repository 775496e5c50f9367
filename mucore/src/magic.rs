/// Name of the section holding the embedded IR of an object file.
pub const IR_SECTION_NAME: &str = ".mu_ir";

/// Name of the same section on Mach-O targets.
pub const IR_SECTION_NAME_MACHO: &str = "__mu_ir";

/// Name of the section holding compiled module payloads.
pub const TEXT_SECTION_NAME: &str = ".mu_text";

/// Name of the section of the final artifact describing the embedded mutants.
pub const MUTANTS_SECTION_NAME: &str = ".mu_mutants";

/// Magic bytes at the start of the mutant metadata section.
pub const METADATA_MAGIC: [u8; 8] = *b"\0MUMETA\0";

/// Current version of the mutant metadata format.
pub const METADATA_FORMAT_VERSION: u64 = 1;

/// Magic bytes at the start of a linked image payload.
pub const IMAGE_MAGIC: [u8; 8] = *b"\0MUIMG\0\0";

/// Name of the environment variable holding extra arguments for `mu-ld`.
/// They are inserted before the arguments given on the command line.
pub const ENV_LD_ARGS: &str = "MU_LD_ARGS";

/// Name of the environment variable holding the path of the real linker.
pub const ENV_LINKER: &str = "MU_LD_LINKER";

/// Name of the environment variable holding the path to the configuration
/// file. If not set, no configuration file is read.
pub const ENV_CONFIG_PATH: &str = "MU_CONFIG_PATH";

/// Comma separated list of mutant identifiers to activate at runtime.
pub const ENV_ACTIVE_MUTANTS: &str = "MU_ACTIVE_MUTANTS";

/// Prefix of every symbol generated by the pipeline.
pub const RESERVED_PREFIX: &str = "_mu_";

/// Prefix of the baseline copy of a mutated function.
pub const ORIGINAL_PREFIX: &str = "_mu_original_";

/// Prefix of the trampoline slot of a mutated function.
pub const TRAMPOLINE_PREFIX: &str = "_mu_trampoline_";

/// Linker name selecting the built-in image toolchain.
pub const BUILTIN_LINKER: &str = "mu-image";

/// Placeholders of the configured compile command.
pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Instructions a [`crate::runtime::Machine`] may execute before giving up.
pub const DEFAULT_FUEL: u64 = 1_000_000;

/// Deepest call chain a [`crate::runtime::Machine`] accepts.
pub const MAX_CALL_DEPTH: usize = 256;

/// Prefix of the scratch directory compiled modules go to when no work
/// directory is configured.
pub const SCRATCH_PREFIX: &str = "mu-ld-";
