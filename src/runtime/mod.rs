pub mod profiler;
pub mod runtime_error;
pub mod vm;

pub use profiler::{ProfileReport, Profiler};
pub use runtime_error::RuntimeError;
pub use vm::{CallFrame, Vm, VmConfig};
