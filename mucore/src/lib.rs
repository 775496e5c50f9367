//! Mutation-injecting link pipeline.
//!
//! The crate turns a set of object files carrying embedded IR into a single
//! artifact where every discovered mutant is materialized as a function clone
//! reachable through a trampoline slot. Most consumers drive the whole
//! pipeline through [`invocation::LinkerInvocation`] and read the embedded
//! mutant list back with [`metadata::read_mutants_from_binary`].

pub mod encoding;
pub mod ext;
pub mod extractor;
pub mod filters;
pub mod finder;
pub mod invocation;
pub mod loader;
pub mod magic;
pub mod metadata;
pub mod mutant;
pub mod mutators;
pub mod objfile;
pub mod parallel;
pub mod pipeline;
pub mod program;
pub mod runtime;
pub mod toolchain;
pub mod utils;

pub extern crate chrono;
