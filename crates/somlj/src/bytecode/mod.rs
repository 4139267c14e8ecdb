//! The register-machine target: instruction set, prototypes, and the
//! per-function emission builder.

pub mod builder;
pub mod op;

pub use builder::{EmitError, FuncBuilder, SlotPool};
pub use op::{ClassModule, Const, ConstId, Instr, Proto, ProtoId, Upval};
