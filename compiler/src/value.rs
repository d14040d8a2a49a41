// value.rs — Host runtime values handed to a kernel
//
// The dynamically-typed side of the bridge: scalars carry a loose numeric
// value that is narrowed to the declared width at marshalling time; arrays are
// `ndarray` arrays of one of the supported element kinds, with arbitrary
// (possibly non-contiguous) strides.
//
// Preconditions: none.
// Postconditions: `HostArray::shape`/`strides` describe the live buffer.
// Failure modes: none (conversions return `Option`).
// Side effects: none.

use std::fmt;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::types::PrimKind;

// ── Scalars ─────────────────────────────────────────────────────────────────

/// A host scalar before it is narrowed to a declared kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ScalarValue {
    /// Zero of the value family that fits `kind`.
    pub fn zero(kind: PrimKind) -> Self {
        match kind {
            PrimKind::Bool => ScalarValue::Bool(false),
            k if k.is_float() => ScalarValue::Float(0.0),
            _ => ScalarValue::Int(0),
        }
    }

    fn family(&self) -> &'static str {
        match self {
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "int",
            ScalarValue::Float(_) => "float",
        }
    }
}

// ── Arrays ──────────────────────────────────────────────────────────────────

/// A host array of any supported element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    Bool(ArrayD<bool>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Dispatch `$body` over the typed array inside a `HostArray`.
macro_rules! with_array {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            HostArray::Bool($a) => $body,
            HostArray::I8($a) => $body,
            HostArray::I16($a) => $body,
            HostArray::I32($a) => $body,
            HostArray::I64($a) => $body,
            HostArray::U8($a) => $body,
            HostArray::U16($a) => $body,
            HostArray::U32($a) => $body,
            HostArray::U64($a) => $body,
            HostArray::F32($a) => $body,
            HostArray::F64($a) => $body,
        }
    };
}

impl HostArray {
    /// Zero-filled, row-major array of `elem` with the given extents.
    pub fn zeros(elem: PrimKind, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match elem {
            PrimKind::Bool => HostArray::Bool(ArrayD::from_elem(dim, false)),
            PrimKind::I8 => HostArray::I8(ArrayD::zeros(dim)),
            PrimKind::I16 => HostArray::I16(ArrayD::zeros(dim)),
            PrimKind::I32 => HostArray::I32(ArrayD::zeros(dim)),
            PrimKind::I64 => HostArray::I64(ArrayD::zeros(dim)),
            PrimKind::U8 => HostArray::U8(ArrayD::zeros(dim)),
            PrimKind::U16 => HostArray::U16(ArrayD::zeros(dim)),
            PrimKind::U32 => HostArray::U32(ArrayD::zeros(dim)),
            PrimKind::U64 => HostArray::U64(ArrayD::zeros(dim)),
            PrimKind::F32 => HostArray::F32(ArrayD::zeros(dim)),
            PrimKind::F64 => HostArray::F64(ArrayD::zeros(dim)),
        }
    }

    pub fn elem(&self) -> PrimKind {
        match self {
            HostArray::Bool(_) => PrimKind::Bool,
            HostArray::I8(_) => PrimKind::I8,
            HostArray::I16(_) => PrimKind::I16,
            HostArray::I32(_) => PrimKind::I32,
            HostArray::I64(_) => PrimKind::I64,
            HostArray::U8(_) => PrimKind::U8,
            HostArray::U16(_) => PrimKind::U16,
            HostArray::U32(_) => PrimKind::U32,
            HostArray::U64(_) => PrimKind::U64,
            HostArray::F32(_) => PrimKind::F32,
            HostArray::F64(_) => PrimKind::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Per-dimension strides in elements.
    pub fn strides(&self) -> &[isize] {
        with_array!(self, a => a.strides())
    }

    /// Per-dimension strides in bytes, the way a host runtime reports them.
    pub fn byte_strides(&self) -> Vec<isize> {
        let width = self.elem().width() as isize;
        self.strides().iter().map(|s| s * width).collect()
    }

    /// Address of the first element.
    pub fn as_ptr(&self) -> *const u8 {
        with_array!(self, a => a.as_ptr() as *const u8)
    }

    /// Address of the first element, for buffers the kernel writes.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        with_array!(self, a => a.as_mut_ptr() as *mut u8)
    }

    /// Typed view when the element kind is `T`.
    pub fn view<T: Element>(&self) -> Option<ArrayViewD<'_, T>> {
        T::view(self)
    }

    /// Typed array when the element kind is `T`.
    pub fn into_typed<T: Element>(self) -> Option<ArrayD<T>> {
        T::unwrap(self)
    }
}

impl fmt::Display for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} array of shape {:?}", self.elem(), self.shape())
    }
}

/// Element types a `HostArray` can hold.
pub trait Element: Clone + 'static {
    const KIND: PrimKind;
    fn wrap(array: ArrayD<Self>) -> HostArray;
    fn view(array: &HostArray) -> Option<ArrayViewD<'_, Self>>;
    fn unwrap(array: HostArray) -> Option<ArrayD<Self>>;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: PrimKind = PrimKind::$variant;

                fn wrap(array: ArrayD<Self>) -> HostArray {
                    HostArray::$variant(array)
                }

                fn view(array: &HostArray) -> Option<ArrayViewD<'_, Self>> {
                    match array {
                        HostArray::$variant(a) => Some(a.view()),
                        _ => None,
                    }
                }

                fn unwrap(array: HostArray) -> Option<ArrayD<Self>> {
                    match array {
                        HostArray::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }

            impl From<ArrayD<$ty>> for HostArray {
                fn from(array: ArrayD<$ty>) -> Self {
                    HostArray::$variant(array)
                }
            }

            impl From<ArrayD<$ty>> for HostValue {
                fn from(array: ArrayD<$ty>) -> Self {
                    HostValue::Array(HostArray::$variant(array))
                }
            }
        )*
    };
}

impl_element! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

// ── Host values ─────────────────────────────────────────────────────────────

/// Any value a caller passes to, or receives from, a kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Scalar(ScalarValue),
    Array(HostArray),
}

impl HostValue {
    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            HostValue::Scalar(_) => None,
        }
    }

    pub fn into_array(self) -> Option<HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            HostValue::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match self {
            HostValue::Scalar(s) => Some(*s),
            HostValue::Array(_) => None,
        }
    }

    /// Short description used in type-mismatch errors.
    pub fn describe(&self) -> String {
        match self {
            HostValue::Scalar(s) => format!("{} scalar", s.family()),
            HostValue::Array(a) => a.to_string(),
        }
    }
}

impl From<HostArray> for HostValue {
    fn from(array: HostArray) -> Self {
        HostValue::Array(array)
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Scalar(ScalarValue::Bool(v))
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Scalar(ScalarValue::Int(v))
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Scalar(ScalarValue::Float(v))
    }
}
