// types.rs — Kernel boundary types and their classification
//
// Declared argument/return types of a kernel signature, the primitive
// element kinds, and the classifier that decides how many flat ABI words a
// type expands to.
//
// Preconditions: none.
// Postconditions: `classify` accepts exactly Scalar, Array and Symbol.
// Failure modes: `Opaque` types fail with `Error::UnsupportedType`.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Primitive kinds ─────────────────────────────────────────────────────────

/// Element kind of scalars and arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl PrimKind {
    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            PrimKind::Bool | PrimKind::I8 | PrimKind::U8 => 1,
            PrimKind::I16 | PrimKind::U16 => 2,
            PrimKind::I32 | PrimKind::U32 | PrimKind::F32 => 4,
            PrimKind::I64 | PrimKind::U64 | PrimKind::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimKind::F32 | PrimKind::F64)
    }

    /// Canonical short name, as used by the signature notation.
    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Bool => "bool",
            PrimKind::I8 => "i8",
            PrimKind::I16 => "i16",
            PrimKind::I32 => "i32",
            PrimKind::I64 => "i64",
            PrimKind::U8 => "u8",
            PrimKind::U16 => "u16",
            PrimKind::U32 => "u32",
            PrimKind::U64 => "u64",
            PrimKind::F32 => "f32",
            PrimKind::F64 => "f64",
        }
    }

    /// Look up a kind by canonical name or host alias (`float32`, `int64`, `double`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => PrimKind::Bool,
            "i8" | "int8" => PrimKind::I8,
            "i16" | "int16" => PrimKind::I16,
            "i32" | "int32" => PrimKind::I32,
            "i64" | "int64" => PrimKind::I64,
            "u8" | "uint8" => PrimKind::U8,
            "u16" | "uint16" => PrimKind::U16,
            "u32" | "uint32" => PrimKind::U32,
            "u64" | "uint64" => PrimKind::U64,
            "f32" | "float32" | "float" => PrimKind::F32,
            "f64" | "float64" | "double" => PrimKind::F64,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for PrimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Dimensions ──────────────────────────────────────────────────────────────

/// One declared array dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Literal(u64),
    Symbol(String),
}

impl Dim {
    pub fn sym(name: impl Into<String>) -> Self {
        Dim::Symbol(name.into())
    }
}

impl From<u64> for Dim {
    fn from(n: u64) -> Self {
        Dim::Literal(n)
    }
}

impl From<&str> for Dim {
    fn from(name: &str) -> Self {
        Dim::Symbol(name.to_string())
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Literal(n) => write!(f, "{}", n),
            Dim::Symbol(s) => f.write_str(s),
        }
    }
}

// ── Kernel types ────────────────────────────────────────────────────────────

/// A type at the kernel boundary.
///
/// `Opaque` carries the front-end's rendering of any type this crate cannot
/// lay out (tuples, strings, objects); it exists so that such types are
/// rejected with a proper error instead of being unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KernelType {
    Scalar { elem: PrimKind },
    Array { elem: PrimKind, shape: Vec<Dim> },
    Symbol { name: String },
    Opaque { name: String },
}

impl KernelType {
    pub fn scalar(elem: PrimKind) -> Self {
        KernelType::Scalar { elem }
    }

    pub fn array<D: Into<Dim>>(elem: PrimKind, shape: impl IntoIterator<Item = D>) -> Self {
        KernelType::Array {
            elem,
            shape: shape.into_iter().map(Into::into).collect(),
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        KernelType::Symbol { name: name.into() }
    }

    /// Element kind of a scalar or array type.
    pub fn elem(&self) -> Option<PrimKind> {
        match self {
            KernelType::Scalar { elem } | KernelType::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Declared rank of an array type.
    pub fn rank(&self) -> Option<usize> {
        match self {
            KernelType::Array { shape, .. } => Some(shape.len()),
            _ => None,
        }
    }

    /// Symbol names appearing in an array shape, in declaration order (with repeats).
    pub fn shape_symbols(&self) -> impl Iterator<Item = &str> {
        let dims: &[Dim] = match self {
            KernelType::Array { shape, .. } => shape,
            _ => &[],
        };
        dims.iter().filter_map(|d| match d {
            Dim::Symbol(s) => Some(s.as_str()),
            Dim::Literal(_) => None,
        })
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelType::Scalar { elem } => write!(f, "{}", elem),
            KernelType::Array { elem, shape } => {
                write!(f, "{}[", elem)?;
                for (i, d) in shape.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                f.write_str("]")
            }
            KernelType::Symbol { name } => write!(f, "symbol {}", name),
            KernelType::Opaque { name } => f.write_str(name),
        }
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// The three categories the calling convention knows how to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Scalar,
    Array,
    Symbol,
}

pub fn classify(ty: &KernelType) -> Result<TypeCategory> {
    match ty {
        KernelType::Scalar { .. } => Ok(TypeCategory::Scalar),
        KernelType::Array { .. } => Ok(TypeCategory::Array),
        KernelType::Symbol { .. } => Ok(TypeCategory::Symbol),
        KernelType::Opaque { .. } => Err(unsupported(ty)),
    }
}

/// Byte width of the primitive a type carries. Symbols are signed 64-bit.
pub fn primitive_width(ty: &KernelType) -> Result<usize> {
    match ty {
        KernelType::Scalar { elem } | KernelType::Array { elem, .. } => Ok(elem.width()),
        KernelType::Symbol { .. } => Ok(8),
        KernelType::Opaque { .. } => Err(unsupported(ty)),
    }
}

/// Number of flat ABI words `ty` expands to: 3 + 2·rank for arrays, 1 otherwise.
pub fn arity(ty: &KernelType) -> Result<usize> {
    match ty {
        KernelType::Array { shape, .. } => Ok(3 + 2 * shape.len()),
        KernelType::Scalar { .. } | KernelType::Symbol { .. } => Ok(1),
        KernelType::Opaque { .. } => Err(unsupported(ty)),
    }
}

pub(crate) fn unsupported(ty: &KernelType) -> Error {
    Error::UnsupportedType { ty: ty.to_string() }
}
