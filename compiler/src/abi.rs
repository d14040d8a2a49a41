// abi.rs — Flat calling-convention layout of kernel arguments
//
// A lowered linalg kernel takes every memref argument as a strided-array
// descriptor spread over individual parameters, scalars at their declared
// width, and trailing i64 values for each resolved symbol. This module is the
// one place that layout is spelled out: `ArrayDescriptor` for arrays,
// `to_flat_args` for a whole call, and `ffi_types` for the matching parameter
// type list.
//
// Preconditions: bound arguments come from `bind::assemble`.
// Postconditions: `to_flat_args(..).len() == flat_arity(..)` for the same types.
// Failure modes: UnsupportedType for opaque types; TypeMismatch if a value and
//   its type disagree (cannot happen for bound input).
// Side effects: none; pointers are copied out, never dereferenced.

use std::fmt;

use libffi::middle::{Arg, Type};

use crate::bind::{BoundArg, BoundValue};
use crate::error::{ArgPos, Error, Result};
use crate::types::{arity, unsupported, KernelType, PrimKind};
use crate::value::{HostArray, HostValue, ScalarValue};

// ── Flat words ─────────────────────────────────────────────────────────────

/// One parameter of the native entry point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlatWord {
    Ptr(*mut u8),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl FlatWord {
    /// libffi argument pointing at this word's storage.
    pub fn ffi_arg(&self) -> Arg {
        match self {
            FlatWord::Ptr(v) => Arg::new(v),
            FlatWord::I8(v) => Arg::new(v),
            FlatWord::I16(v) => Arg::new(v),
            FlatWord::I32(v) => Arg::new(v),
            FlatWord::I64(v) => Arg::new(v),
            FlatWord::U8(v) => Arg::new(v),
            FlatWord::U16(v) => Arg::new(v),
            FlatWord::U32(v) => Arg::new(v),
            FlatWord::U64(v) => Arg::new(v),
            FlatWord::F32(v) => Arg::new(v),
            FlatWord::F64(v) => Arg::new(v),
        }
    }
}

/// Addresses render as `ptr` so layouts compare across runs.
impl fmt::Display for FlatWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatWord::Ptr(_) => write!(f, "ptr"),
            FlatWord::I8(v) => write!(f, "i8 {}", v),
            FlatWord::I16(v) => write!(f, "i16 {}", v),
            FlatWord::I32(v) => write!(f, "i32 {}", v),
            FlatWord::I64(v) => write!(f, "i64 {}", v),
            FlatWord::U8(v) => write!(f, "u8 {}", v),
            FlatWord::U16(v) => write!(f, "u16 {}", v),
            FlatWord::U32(v) => write!(f, "u32 {}", v),
            FlatWord::U64(v) => write!(f, "u64 {}", v),
            FlatWord::F32(v) => write!(f, "f32 {}", v),
            FlatWord::F64(v) => write!(f, "f64 {}", v),
        }
    }
}

/// Narrow or widen a host scalar to the declared kind.
pub fn scalar_word(value: ScalarValue, kind: PrimKind) -> FlatWord {
    macro_rules! cast {
        ($t:ty) => {
            match value {
                ScalarValue::Bool(b) => b as i64 as $t,
                ScalarValue::Int(i) => i as $t,
                ScalarValue::Float(x) => x as $t,
            }
        };
    }
    match kind {
        PrimKind::Bool => FlatWord::U8(match value {
            ScalarValue::Bool(b) => b as u8,
            ScalarValue::Int(i) => (i != 0) as u8,
            ScalarValue::Float(x) => (x != 0.0) as u8,
        }),
        PrimKind::I8 => FlatWord::I8(cast!(i8)),
        PrimKind::I16 => FlatWord::I16(cast!(i16)),
        PrimKind::I32 => FlatWord::I32(cast!(i32)),
        PrimKind::I64 => FlatWord::I64(cast!(i64)),
        PrimKind::U8 => FlatWord::U8(cast!(u8)),
        PrimKind::U16 => FlatWord::U16(cast!(u16)),
        PrimKind::U32 => FlatWord::U32(cast!(u32)),
        PrimKind::U64 => FlatWord::U64(cast!(u64)),
        PrimKind::F32 => FlatWord::F32(cast!(f32)),
        PrimKind::F64 => FlatWord::F64(cast!(f64)),
    }
}

// ── Strided-array descriptor ───────────────────────────────────────────────

/// Memref descriptor of one array argument:
/// `[allocated, aligned, offset, sizes.., strides..]`.
///
/// Both pointers carry the same address; no separately aligned buffer is
/// tracked. Strides are in elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDescriptor {
    pub allocated: *mut u8,
    pub aligned: *mut u8,
    pub offset: i64,
    pub sizes: Vec<i64>,
    pub strides: Vec<i64>,
}

impl ArrayDescriptor {
    /// Descriptor for an array the kernel only reads.
    pub fn from_array(array: &HostArray) -> Self {
        Self::with_base(array.as_ptr() as *mut u8, array)
    }

    /// Descriptor for an array the kernel writes.
    pub fn from_array_mut(array: &mut HostArray) -> Self {
        let base = array.as_mut_ptr();
        Self::with_base(base, array)
    }

    fn with_base(base: *mut u8, array: &HostArray) -> Self {
        let width = array.elem().width() as isize;
        Self {
            allocated: base,
            aligned: base,
            offset: 0,
            sizes: array.shape().iter().map(|&s| s as i64).collect(),
            strides: array
                .byte_strides()
                .iter()
                .map(|&s| (s / width) as i64)
                .collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    pub fn word_count(&self) -> usize {
        3 + 2 * self.rank()
    }

    /// Append the descriptor's words in ABI order.
    pub fn push_words(&self, out: &mut Vec<FlatWord>) {
        out.push(FlatWord::Ptr(self.allocated));
        out.push(FlatWord::Ptr(self.aligned));
        out.push(FlatWord::I64(self.offset));
        out.extend(self.sizes.iter().map(|&s| FlatWord::I64(s)));
        out.extend(self.strides.iter().map(|&s| FlatWord::I64(s)));
    }

    /// Parameter types matching `push_words` for a given rank.
    pub fn ffi_types(rank: usize, out: &mut Vec<Type>) {
        out.push(Type::pointer());
        out.push(Type::pointer());
        out.push(Type::i64());
        out.extend((0..2 * rank).map(|_| Type::i64()));
    }
}

// ── Marshalling ────────────────────────────────────────────────────────────

/// Expand bound arguments into the flat parameter list of the native entry.
pub fn to_flat_args(bound: &mut [BoundArg<'_>]) -> Result<Vec<FlatWord>> {
    let mut words = Vec::new();
    for arg in bound.iter_mut() {
        let pos = arg.pos;
        let ty = &arg.ty;
        match (ty, &mut arg.value) {
            (KernelType::Opaque { .. }, _) => return Err(unsupported(ty)),
            (KernelType::Scalar { elem }, BoundValue::Host(HostValue::Scalar(s))) => {
                words.push(scalar_word(*s, *elem));
            }
            (KernelType::Scalar { elem }, BoundValue::Output(value)) => match &**value {
                HostValue::Scalar(s) => words.push(scalar_word(*s, *elem)),
                other => return Err(mismatch(pos, ty, other.describe())),
            },
            (KernelType::Array { .. }, BoundValue::Host(HostValue::Array(array))) => {
                ArrayDescriptor::from_array(array).push_words(&mut words);
            }
            (KernelType::Array { .. }, BoundValue::Output(value)) => match &mut **value {
                HostValue::Array(array) => {
                    ArrayDescriptor::from_array_mut(array).push_words(&mut words)
                }
                other => return Err(mismatch(pos, ty, other.describe())),
            },
            (KernelType::Symbol { .. }, BoundValue::Symbol(v)) => {
                words.push(FlatWord::I64(*v as i64));
            }
            (_, value) => {
                let found = match value {
                    BoundValue::Host(v) => v.describe(),
                    BoundValue::Output(v) => v.describe(),
                    BoundValue::Symbol(_) => "symbol value".to_string(),
                };
                return Err(mismatch(pos, ty, found));
            }
        }
    }
    Ok(words)
}

fn mismatch(pos: ArgPos, ty: &KernelType, found: String) -> Error {
    Error::TypeMismatch {
        pos,
        expected: ty.to_string(),
        found,
    }
}

/// Expected flat word count: Σ arity(args) + arity(ret) + one per symbol.
pub fn flat_arity(arg_types: &[KernelType], ret: &KernelType, symbol_count: usize) -> Result<usize> {
    let mut total = arity(ret)? + symbol_count;
    for ty in arg_types {
        total += arity(ty)?;
    }
    Ok(total)
}

/// Distinct symbols of the argument shapes, in first-seen order.
///
/// This is the order the binder inserts them in, so it fixes the trailing
/// symbol parameters of the entry point before any call is made.
pub fn arg_symbols(arg_types: &[KernelType]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for name in arg_types.iter().flat_map(|t| t.shape_symbols()) {
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

fn ffi_scalar(kind: PrimKind) -> Type {
    match kind {
        PrimKind::Bool | PrimKind::U8 => Type::u8(),
        PrimKind::I8 => Type::i8(),
        PrimKind::I16 => Type::i16(),
        PrimKind::I32 => Type::i32(),
        PrimKind::I64 => Type::i64(),
        PrimKind::U16 => Type::u16(),
        PrimKind::U32 => Type::u32(),
        PrimKind::U64 => Type::u64(),
        PrimKind::F32 => Type::f32(),
        PrimKind::F64 => Type::f64(),
    }
}

fn push_ffi_type(ty: &KernelType, out: &mut Vec<Type>) -> Result<()> {
    match ty {
        KernelType::Scalar { elem } => out.push(ffi_scalar(*elem)),
        KernelType::Array { shape, .. } => ArrayDescriptor::ffi_types(shape.len(), out),
        KernelType::Symbol { .. } => out.push(Type::i64()),
        KernelType::Opaque { .. } => return Err(unsupported(ty)),
    }
    Ok(())
}

/// Parameter types of the native entry point, in flat order.
pub fn ffi_types(arg_types: &[KernelType], ret: &KernelType, symbol_count: usize) -> Result<Vec<Type>> {
    let mut out = Vec::new();
    for ty in arg_types {
        push_ffi_type(ty, &mut out)?;
    }
    push_ffi_type(ret, &mut out)?;
    out.extend((0..symbol_count).map(|_| Type::i64()));
    Ok(out)
}

/// One word per line, for logs and snapshots.
pub fn render_words(words: &[FlatWord]) -> String {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| format!("{}: {}", i, w))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tests ──────────────────────────────────────────────────────────────────
