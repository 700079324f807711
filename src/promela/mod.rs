//! Promela model generation.
//!
//! The compiler turns a [`crate::mission::BehaviorNode`] tree into a Spin-checkable
//! program: task declarations, nondeterministic sensor reads and an `init` block
//! that mirrors the tree's control flow.

pub mod compiler;
pub mod program;

pub use compiler::{CompileError, ModelCompiler};
pub use program::CompiledProgram;
