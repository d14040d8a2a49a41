// signature.rs — Typed description of a kernel
//
// What the bridge needs to know about a computation: its entry name, the
// declared argument types in order, the declared return type, and how to
// serialize it to the IR text the first lowering stage consumes. Front-ends
// implement `KernelSource`; `IrKernel` pairs a signature with ready-made IR.

use std::path::PathBuf;

use chumsky::span::SimpleSpan;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::KernelType;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// A named parameter of a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: KernelType,
}

/// Declared signature of a kernel entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: KernelType,
}

impl KernelSignature {
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: KernelType) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    /// Parse the textual notation, e.g. `add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]`.
    pub fn parse(text: &str) -> Result<Self> {
        let result = crate::parser::parse(text);
        match result.signature {
            Some(sig) if result.diagnostics.is_empty() => Ok(sig),
            _ => Err(Error::Signature {
                diagnostics: result.diagnostics,
            }),
        }
    }

    pub fn arg_types(&self) -> Vec<KernelType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

/// A typed computation the front-end hands to the pipeline.
pub trait KernelSource {
    fn signature(&self) -> &KernelSignature;

    /// Serialize to the linalg-dialect IR text consumed by the first lowering stage.
    fn to_ir_text(&self) -> String;

    /// File the kernel was defined in; its stem prefixes artifact names.
    fn source_file(&self) -> Option<PathBuf> {
        None
    }
}

/// A kernel whose IR text already exists.
#[derive(Debug, Clone)]
pub struct IrKernel {
    pub signature: KernelSignature,
    pub ir: String,
    pub source_file: Option<PathBuf>,
}

impl KernelSource for IrKernel {
    fn signature(&self) -> &KernelSignature {
        &self.signature
    }

    fn to_ir_text(&self) -> String {
        self.ir.clone()
    }

    fn source_file(&self) -> Option<PathBuf> {
        self.source_file.clone()
    }
}
