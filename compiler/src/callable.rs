// callable.rs — A loaded kernel behind an ordinary host-level call
//
// Owns the shared-object handle, the entry point resolved once at load time,
// the declared types and a libffi call interface prepared for the flat
// layout. `invoke` runs bind → return slot → marshal → native call and hands
// back the return value.
//
// Preconditions: the shared object exports `signature.name` with the flat
//   layout described in `abi` (asserted by the caller of `load`).
// Postconditions: `invoke` returns the caller-supplied or a freshly allocated
//   return value after the kernel has written it.
// Failure modes: Load, EntryNotFound, UnsupportedType at load; Arity,
//   TypeMismatch, ShapeMismatch, SymbolConflict, UnboundSymbol per call;
//   LayoutMismatch if marshalling and the call interface ever disagree.
// Side effects: the kernel writes the return buffer.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};

use libffi::middle::{Arg, Cif, CodePtr, Type};
use log::{debug, trace};

use crate::abi::{arg_symbols, ffi_types, flat_arity, render_words, to_flat_args, FlatWord};
use crate::bind::{assemble, bind_args, bind_return};
use crate::error::{Error, Result};
use crate::signature::KernelSignature;
use crate::types::{classify, KernelType};
use crate::value::HostValue;

/// A compiled kernel loaded from a shared object.
pub struct Callable {
    /// Keeps the code mapped for as long as `entry` is used.
    _lib: libloading::Library,
    entry: *const c_void,
    signature: KernelSignature,
    arg_types: Vec<KernelType>,
    /// Trailing symbol parameters, in the order the binder produces them.
    symbol_names: Vec<String>,
    flat_arity: usize,
    cif: Cif,
    path: PathBuf,
}

// SAFETY: `entry` points to read-only code in the library held by `_lib`.
// The call interface is immutable after construction and `invoke` keeps all
// per-call state on its own stack, so concurrent calls share nothing.
unsafe impl Send for Callable {}
unsafe impl Sync for Callable {}

impl Callable {
    /// Open `path` and prepare calls to `signature.name`.
    ///
    /// # Safety
    ///
    /// The library's initialisers run on load, and the exported entry must
    /// really take the flat parameter list implied by `signature`. Neither
    /// can be checked here.
    pub unsafe fn load(path: impl AsRef<Path>, signature: &KernelSignature) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let arg_types = signature.arg_types();
        for ty in arg_types.iter().chain(std::iter::once(&signature.ret)) {
            classify(ty)?;
        }
        let symbol_names = arg_symbols(&arg_types);
        let flat_arity = flat_arity(&arg_types, &signature.ret, symbol_names.len())?;
        let params = ffi_types(&arg_types, &signature.ret, symbol_names.len())?;
        let cif = Cif::new(params, Type::void());

        let lib = unsafe { libloading::Library::new(&path) }.map_err(|source| Error::Load {
            path: path.clone(),
            source,
        })?;
        let entry = unsafe {
            let func: libloading::Symbol<unsafe extern "C" fn()> = lib
                .get(signature.name.as_bytes())
                .map_err(|source| Error::EntryNotFound {
                    name: signature.name.clone(),
                    path: path.clone(),
                    source,
                })?;
            *func as *const c_void
        };

        debug!(
            "loaded `{}` from {} ({} flat parameters, symbols [{}])",
            signature.name,
            path.display(),
            flat_arity,
            symbol_names.join(", ")
        );

        Ok(Self {
            _lib: lib,
            entry,
            signature: signature.clone(),
            arg_types,
            symbol_names,
            flat_arity,
            cif,
            path,
        })
    }

    /// Call the kernel with host values.
    ///
    /// `ret` is an optional caller-owned output buffer; without one the
    /// return value is allocated from the resolved symbol extents.
    pub fn invoke(&self, args: &[HostValue], ret: Option<HostValue>) -> Result<HostValue> {
        if args.len() != self.arg_types.len() {
            return Err(Error::Arity {
                expected: self.arg_types.len(),
                actual: args.len(),
            });
        }

        let (bound, table) = bind_args(args, &self.arg_types)?;
        let mut ret = bind_return(&self.signature.ret, &table, ret)?;
        let words = {
            let mut all = assemble(bound, &mut ret, &self.signature.ret, &table);
            to_flat_args(&mut all)?
        };
        check_layout(self.flat_arity, words.len())?;

        debug!(
            "invoke `{}`: {} flat words, symbols {:?}",
            self.signature.name,
            words.len(),
            table.iter().collect::<Vec<_>>()
        );
        trace!("flat layout:\n{}", render_words(&words));

        let ffi_args: Vec<Arg> = words.iter().map(FlatWord::ffi_arg).collect();
        // SAFETY: `load`'s caller vouched for the entry's parameter list, which
        // `cif` mirrors. Every pointer word refers to an array in `args` or to
        // `ret`, both alive until after the call returns.
        unsafe {
            self.cif
                .call::<()>(CodePtr::from_ptr(self.entry), &ffi_args);
        }
        Ok(ret)
    }

    pub fn signature(&self) -> &KernelSignature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Symbol names in trailing-parameter order.
    pub fn symbol_names(&self) -> &[String] {
        &self.symbol_names
    }

    /// Number of native parameters of the entry point.
    pub fn flat_arity(&self) -> usize {
        self.flat_arity
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.signature.name)
            .field("path", &self.path)
            .field("flat_arity", &self.flat_arity)
            .field("symbol_names", &self.symbol_names)
            .finish()
    }
}

/// Every call must fill exactly the parameter list `cif` was prepared for.
fn check_layout(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::LayoutMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;
    use crate::types::PrimKind;

    #[test]
    fn missing_library_is_load_error() {
        let sig = KernelSignature::parse("add(a: f32[n], b: f32[n]) -> f32[n]").unwrap();
        let err = unsafe { Callable::load("/nonexistent/lkc/_missing.so", &sig) }.unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn opaque_type_rejected_before_loading() {
        let sig = KernelSignature::new(
            "f",
            vec![crate::signature::Param {
                name: "s".into(),
                ty: KernelType::Opaque { name: "str".into() },
            }],
            KernelType::scalar(PrimKind::F32),
        );
        let err = unsafe { Callable::load("/nonexistent/lkc/_missing.so", &sig) }.unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
    }

    #[test]
    fn layout_mismatch_is_not_an_arity_error() {
        assert!(check_layout(23, 23).is_ok());
        let err = check_layout(23, 22).unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutMismatch {
                expected: 23,
                actual: 22
            }
        ));
        assert_eq!(err.code(), codes::E0106);
        assert_ne!(
            err.code(),
            Error::Arity {
                expected: 2,
                actual: 1
            }
            .code()
        );
    }
}
