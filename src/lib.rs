//! cinder: a small imperative language compiled to bytecode for a stack VM.
//!
//! Source flows through [`frontend`] (tokens, syntax tree), the optional
//! tree optimizer in [`opt`], code generation in [`bytecode`], and finally
//! the [`runtime`] VM. [`pipeline`] chains the stages for whole files;
//! [`repl`] keeps compiler and VM state between lines.

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod opt;
pub mod pipeline;
pub mod repl;
pub mod runtime;

pub use pipeline::{Error, compile_source, run_source};
