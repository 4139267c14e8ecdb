//! A compiler front- and middle-end for the SOM Smalltalk dialect.
//!
//! Given a set of `.som` class files and a main class, the pipeline parses
//! every reachable class, resolves names against the nested scope tree,
//! materializes the class/metaclass table model, and emits each method for a
//! Lua-style register VM (with optional Lua source text alongside).
//!
//! The crate is organized along the pipeline: [`lexer`] and [`parser`]
//! produce the per-class AST, [`model`] and [`loader`] hold and grow the
//! cross-class registry, [`resolver`] binds names and plans inline
//! expansion, [`object`] builds the runtime table model, and [`emit`]
//! produces [`bytecode`] modules. [`compiler`] ties the phases together.

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod corelib;
pub mod dump;
pub mod emit;
pub mod error;
pub mod intern;
pub mod lexer;
pub mod loader;
pub mod lua;
pub mod model;
pub mod object;
pub mod parser;
pub mod resolver;
pub mod selector;

pub use crate::{
    compiler::{Compilation, CompileFailure, CompileOptions, Compiler},
    error::{Diagnostic, Diagnostics, Phase, Severity},
    model::Model,
};
