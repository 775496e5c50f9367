use std::path::PathBuf;

use strum::EnumIs;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Per-item failure on the input side of the pipeline.
///
/// Input errors are recoverable: the item is reported and dropped and the
/// pipeline continues with the remaining items.
#[derive(Debug, Error, EnumIs)]
pub enum InputError {
    #[error("Cannot read '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Reading '{}' did not complete within {timeout_ms}ms", .path.display())]
    ReadTimeout { path: PathBuf, timeout_ms: u64 },

    #[error("'{}' is not a valid object file: {source}", .path.display())]
    NotAnObject {
        path: PathBuf,
        source: object::Error,
    },

    #[error("'{}' has no embedded IR (section '{section}' not found)", .path.display())]
    MissingSection { path: PathBuf, section: String },

    #[error("Embedded IR of '{}' is corrupt: {source}", .path.display())]
    CorruptIr {
        path: PathBuf,
        source: muinstr::utils::Error,
    },
}

/// Structural inconsistency detected by the mutation-injection pipeline.
#[derive(Debug, Error, EnumIs)]
pub enum PipelineError {
    #[error("Stage '{stage}' requires state {expected:?} but the pipeline is in state {found:?}")]
    StageOrder {
        stage: &'static str,
        expected: Option<PipelineState>,
        found: Option<PipelineState>,
    },

    #[error("Mutation point '{identifier}' has no address in the program")]
    UnmaterializedPoint { identifier: String },

    #[error("Function '{function}' of '{}' does not exist or has no body", .module.display())]
    UnknownFunction { module: PathBuf, function: String },

    #[error("Symbol '{symbol}' generated for '{function}' already exists")]
    SymbolClash { function: String, symbol: String },

    #[error("Function '{function}' was prepared but has no baseline copy")]
    MissingBaseline { function: String },

    #[error("Mutant '{identifier}' of function '{function}' was never cloned")]
    MissingClone { identifier: String, function: String },

    #[error("Function '{function}' still has a body after its originals were deleted")]
    OriginalNotDeleted { function: String },

    #[error("Mutant '{identifier}' points at an instruction missing from '{function}'")]
    MissingInstruction { identifier: String, function: String },

    #[error("Mutant '{identifier}' cannot apply {mutator} to the instruction in '{function}'")]
    InstructionMismatch {
        identifier: String,
        function: String,
        mutator: &'static str,
    },

    #[error("Mutated module '{}' is invalid: {source}", .path.display())]
    InvalidModule {
        path: PathBuf,
        source: muinstr::utils::Error,
    },
}

/// Failure while reading the mutant metadata of an artifact.
#[derive(Debug, Error, EnumIs)]
pub enum MetadataError {
    /// Expected outcome when nothing was embedded.
    #[error("Section '{section}' not found")]
    SectionNotFound { section: String },

    #[error("Bad magic bytes at the start of the metadata section")]
    BadMagic,

    #[error("Unsupported metadata format version {0}")]
    UnsupportedVersion(u64),

    #[error("Malformed metadata at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("Cannot parse object file: {0}")]
    Object(#[from] object::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure of the native compile or link step.
#[derive(Debug, Error, EnumIs)]
pub enum ToolchainError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout_ms}ms and was killed")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("'{program}' failed with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{}' has no compiled payload (section '{section}' not found)", .path.display())]
    MissingPayload { path: PathBuf, section: String },

    #[error("Symbol '{0}' is defined by more than one module")]
    DuplicateSymbol(String),

    #[error("Payload of '{}' is not a valid module: {source}", .path.display())]
    InvalidPayload {
        path: PathBuf,
        source: muinstr::utils::Error,
    },

    #[error("Cannot read object file: {0}")]
    ObjectRead(#[from] object::Error),

    #[error("Cannot write object file: {0}")]
    ObjectWrite(#[from] object::write::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure while loading or executing a linked image.
#[derive(Debug, Error, EnumIs)]
pub enum RuntimeError {
    #[error("Not a linked image: {0}")]
    NotAnImage(String),

    #[error("Module #{index} of the image is invalid: {source}")]
    CorruptModule {
        index: usize,
        source: muinstr::utils::Error,
    },

    #[error("Symbol '{0}' is defined by more than one module of the image")]
    DuplicateSymbol(String),

    #[error("Symbol '{0}' is not defined by the image")]
    UnresolvedSymbol(String),

    #[error("Function '{function}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Register '%{name}' read before being written in '{function}'")]
    UninitializedRegister { function: String, name: String },

    #[error("Division by zero in '{0}'")]
    DivisionByZero(String),

    #[error("Trap reached in '{0}'")]
    Trap(String),

    #[error("Execution ran out of fuel after {0} instructions")]
    OutOfFuel(u64),

    #[error("Call depth exceeded {0}")]
    StackOverflow(usize),
}

#[derive(Debug, Error, EnumIs)]
pub enum MuError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file '{file}': {source}")]
    ConfigParseError {
        source: toml::de::Error,
        file: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown mutator or mutator group '{0}'")]
    UnknownMutator(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Pipeline failure: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Metadata failure: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Toolchain failure: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("Runtime failure: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Worker thread of stage '{0}' panicked")]
    WorkerPanicked(String),

    #[error("{skipped} input(s) were skipped and partial extraction is not allowed")]
    PartialExtraction { skipped: usize },

    #[error("No mutants found although mutants were expected")]
    NoMutants,
}

pub type MuResult<T> = Result<T, MuError>;
