//! Intermediate representation used by the mutation linker.
//!
//! A [`modules::Module`] is the unit embedded into object files by the
//! compiler front-end. Its textual form is produced by `Display` and read
//! back with [`modules::parser::parse_module`].
pub mod modules;
pub mod types;
pub mod utils;
