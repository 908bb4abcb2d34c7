//! Shared vocabulary of the pipeline: the syntax tree, its traversal
//! hooks and the runtime value type.

pub mod ast;
pub mod value;
pub mod visit;
