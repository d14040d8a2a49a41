// bind.rs — Symbol binding: declared types against actual host values
//
// Walks the declared argument types next to the caller's values, checks
// categories, element kinds, ranks and literal extents, and unifies symbolic
// dimensions into one ordered table. The table's insertion order is the order
// in which symbol values trail the flat ABI argument list.
//
// Preconditions: none.
// Postconditions: every symbol in an argument shape has exactly one value in
//   the returned table, equal to every extent it labels.
// Failure modes: Arity, UnsupportedType, TypeMismatch, ShapeMismatch,
//   SymbolConflict, UnboundSymbol (return shapes only).
// Side effects: none; caller values are only read. `bind_return` may allocate.

use std::collections::HashMap;

use log::trace;

use crate::error::{ArgPos, Error, Result};
use crate::types::{classify, Dim, KernelType, TypeCategory};
use crate::value::{HostArray, HostValue, ScalarValue};

// ── Symbol table ───────────────────────────────────────────────────────────

/// Symbol name → resolved extent, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.index.get(name).map(|&i| self.entries[i].1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Insert `name = actual` on first sight; afterwards require equality.
    fn unify(&mut self, name: &str, actual: u64, pos: ArgPos, dim: usize) -> Result<()> {
        match self.get(name) {
            Some(bound) if bound != actual => Err(Error::SymbolConflict {
                symbol: name.to_string(),
                bound,
                actual,
                pos,
                dim,
            }),
            Some(_) => Ok(()),
            None => {
                trace!("bind symbol {} = {} from {}", name, actual, pos);
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), actual));
                Ok(())
            }
        }
    }

    /// Require `name` to be bound to `actual` without inserting.
    fn check(&self, name: &str, actual: u64, pos: ArgPos, dim: usize) -> Result<()> {
        match self.get(name) {
            None => Err(Error::UnboundSymbol {
                symbol: name.to_string(),
                dim,
            }),
            Some(bound) if bound != actual => Err(Error::SymbolConflict {
                symbol: name.to_string(),
                bound,
                actual,
                pos,
                dim,
            }),
            Some(_) => Ok(()),
        }
    }
}

// ── Bound arguments ────────────────────────────────────────────────────────

/// The value half of a bound argument.
#[derive(Debug)]
pub enum BoundValue<'a> {
    /// A caller argument, read by the kernel.
    Host(&'a HostValue),
    /// The return slot, written by the kernel.
    Output(&'a mut HostValue),
    /// A resolved symbol value.
    Symbol(u64),
}

/// A value paired with the type it is marshalled as.
#[derive(Debug)]
pub struct BoundArg<'a> {
    pub pos: ArgPos,
    pub value: BoundValue<'a>,
    pub ty: KernelType,
}

// ── Binding ────────────────────────────────────────────────────────────────

/// How symbol dims of a value meet the table.
enum Symbols<'t> {
    Unify(&'t mut SymbolTable),
    Check(&'t SymbolTable),
}

/// Bind caller values to declared argument types.
///
/// Returns the bound arguments in declaration order together with the symbol
/// table accumulated from their shapes.
pub fn bind_args<'a>(
    values: &'a [HostValue],
    types: &[KernelType],
) -> Result<(Vec<BoundArg<'a>>, SymbolTable)> {
    if values.len() != types.len() {
        return Err(Error::Arity {
            expected: types.len(),
            actual: values.len(),
        });
    }

    let mut table = SymbolTable::new();
    let mut bound = Vec::with_capacity(values.len());
    for (i, (value, ty)) in values.iter().zip(types).enumerate() {
        let pos = ArgPos::Arg(i);
        check_value(pos, value, ty, Symbols::Unify(&mut table))?;
        bound.push(BoundArg {
            pos,
            value: BoundValue::Host(value),
            ty: ty.clone(),
        });
    }
    Ok((bound, table))
}

/// Produce the return-slot value.
///
/// Without a caller buffer, a zero-filled value is allocated whose extents
/// come from literal dims and the symbol table. A caller buffer is validated
/// against the same dims; its symbols are checked, never inserted.
pub fn bind_return(
    ret_ty: &KernelType,
    table: &SymbolTable,
    supplied: Option<HostValue>,
) -> Result<HostValue> {
    if let Some(value) = supplied {
        check_value(ArgPos::Return, &value, ret_ty, Symbols::Check(table))?;
        return Ok(value);
    }

    match ret_ty {
        KernelType::Array { elem, shape } => {
            let extents = resolve_shape(shape, table)?;
            Ok(HostValue::Array(HostArray::zeros(*elem, &extents)))
        }
        KernelType::Scalar { elem } => Ok(HostValue::Scalar(ScalarValue::zero(*elem))),
        _ => {
            classify(ret_ty)?;
            Err(Error::TypeMismatch {
                pos: ArgPos::Return,
                expected: "array or scalar".into(),
                found: ret_ty.to_string(),
            })
        }
    }
}

/// Concrete extents of a declared shape under `table`.
pub fn resolve_shape(shape: &[Dim], table: &SymbolTable) -> Result<Vec<usize>> {
    shape
        .iter()
        .enumerate()
        .map(|(dim, d)| match d {
            Dim::Literal(n) => Ok(*n as usize),
            Dim::Symbol(s) => table
                .get(s)
                .map(|v| v as usize)
                .ok_or_else(|| Error::UnboundSymbol {
                    symbol: s.clone(),
                    dim,
                }),
        })
        .collect()
}

/// Full bound-argument list: arguments, then the return slot, then one
/// entry per symbol in table order.
pub fn assemble<'a>(
    mut args: Vec<BoundArg<'a>>,
    ret: &'a mut HostValue,
    ret_ty: &KernelType,
    table: &SymbolTable,
) -> Vec<BoundArg<'a>> {
    args.reserve(1 + table.len());
    args.push(BoundArg {
        pos: ArgPos::Return,
        value: BoundValue::Output(ret),
        ty: ret_ty.clone(),
    });
    for (i, (name, value)) in table.iter().enumerate() {
        args.push(BoundArg {
            pos: ArgPos::Symbol(i),
            value: BoundValue::Symbol(value),
            ty: KernelType::symbol(name),
        });
    }
    args
}

fn check_value(
    pos: ArgPos,
    value: &HostValue,
    ty: &KernelType,
    mut symbols: Symbols<'_>,
) -> Result<()> {
    let mismatch = || Error::TypeMismatch {
        pos,
        expected: ty.to_string(),
        found: value.describe(),
    };

    match classify(ty)? {
        TypeCategory::Symbol => Err(Error::TypeMismatch {
            pos,
            expected: "array or scalar".into(),
            found: ty.to_string(),
        }),
        TypeCategory::Scalar => {
            let (Some(elem), HostValue::Scalar(s)) = (ty.elem(), value) else {
                return Err(mismatch());
            };
            let compatible = match s {
                ScalarValue::Float(_) => elem.is_float(),
                ScalarValue::Int(_) | ScalarValue::Bool(_) => true,
            };
            if compatible {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        TypeCategory::Array => {
            let (KernelType::Array { elem, shape }, HostValue::Array(array)) = (ty, value) else {
                return Err(mismatch());
            };
            if array.elem() != *elem || array.ndim() != shape.len() {
                return Err(mismatch());
            }
            for (dim, (declared, &actual)) in shape.iter().zip(array.shape()).enumerate() {
                let actual = actual as u64;
                match declared {
                    Dim::Literal(n) if *n != actual => {
                        return Err(Error::ShapeMismatch {
                            pos,
                            dim,
                            expected: *n,
                            actual,
                        });
                    }
                    Dim::Literal(_) => {}
                    Dim::Symbol(s) => match &mut symbols {
                        Symbols::Unify(table) => table.unify(s, actual, pos, dim)?,
                        Symbols::Check(table) => table.check(s, actual, pos, dim)?,
                    },
                }
            }
            Ok(())
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
