// lkc — Linalg Kernel Compiler bridge
//
// Library root. Lowers linalg-dialect kernels to shared objects and calls
// them with host arrays and scalars.

pub mod abi;
pub mod bind;
pub mod callable;
pub mod diag;
pub mod error;
pub mod id;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod signature;
pub mod stage;
pub mod types;
pub mod value;

pub use callable::Callable;
pub use error::{Error, Result};
pub use pipeline::{compile, CompileOptions, Toolchain};
pub use signature::{IrKernel, KernelSignature, KernelSource};
pub use value::{HostArray, HostValue, ScalarValue};
