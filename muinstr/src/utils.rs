use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

use crate::modules::operand::{Label, Name};

/// A single diagnostic produced while parsing the textual IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParserError {
    pub file: Option<String>,
    pub message: String,
    pub start: usize,
    pub end: usize,
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}..{}: {}",
            self.file.as_deref().unwrap_or("<buffer>"),
            self.start,
            self.end,
            self.message
        )
    }
}

#[derive(Debug, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum Error {
    /// Multiple instructions define the same name.
    #[error(
        "Multiple operations with shared destination target violate SSA requirements. The name `%{duplicate}` is defined more than once within function `{function}`."
    )]
    DuplicateSSAName { function: String, duplicate: Name },

    /// No basic block with the entrypoint label was found.
    #[error(
        "By convention, the first basic block of function `{function}` must be labelled `entry`. No such basic block was found."
    )]
    MissingEntryBlock { function: String },

    /// An operand refers to an unresolved name.
    #[error(
        "An operand of function `{function}` refers to an undefined name: `%{undefined}`."
    )]
    UndefinedSSAName { function: String, undefined: Name },

    /// A call refers to a function that is neither defined nor declared.
    #[error(
        "An instruction of `{function}` refers to function `@{undefined}` that is neither defined nor declared within the module."
    )]
    UndefinedFunction { function: String, undefined: String },

    /// A slot call refers to an unknown trampoline slot.
    #[error(
        "An instruction of function `{function}` calls through trampoline `@{undefined}` which is not defined within the module."
    )]
    UndefinedTrampoline { function: String, undefined: String },

    /// The basic block referenced cannot be found within the function.
    #[error(
        "The basic block `{label}` referenced in function `{function}` is not defined within the function."
    )]
    UndefinedBasicBlock { function: String, label: Label },

    /// A basic block with the given label already exists in the function.
    #[error("A basic block with label `{label}` already exists in function `{function}`.")]
    BlockLabelAlreadyExists { function: String, label: Label },

    /// The same symbol is defined twice within one module.
    #[error("Symbol `@{0}` is defined more than once within the module.")]
    DuplicateSymbol(String),

    /// The buffer is not valid UTF-8 text.
    #[error("The IR buffer is not valid UTF-8 (first invalid byte at offset {offset}).")]
    InvalidEncoding { offset: usize },

    /// The textual IR could not be parsed.
    #[error("Failed to parse module: {}", join_errors(.errors))]
    ParserErrors { errors: Vec<ParserError> },
}

fn join_errors(errors: &[ParserError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
