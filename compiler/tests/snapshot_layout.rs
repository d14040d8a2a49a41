// Snapshot tests: lock the flat call layout and user-facing error text.
//
// Uses the library API (parse → bind → assemble → to_flat_args) and snapshots
// the rendered word list. Pointer words render as `ptr`, so the output does
// not depend on addresses.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use lkc::abi::{render_words, to_flat_args};
use lkc::bind::{assemble, bind_args, bind_return};
use lkc::types::PrimKind;
use lkc::{HostArray, HostValue, KernelSignature};

/// Parse `signature`, bind `values` and render the flat layout.
fn layout(signature: &str, values: &[HostValue]) -> String {
    let sig = KernelSignature::parse(signature).unwrap();
    let types = sig.arg_types();
    let (bound, table) = bind_args(values, &types).unwrap();
    let mut ret = bind_return(&sig.ret, &table, None).unwrap();
    let mut all = assemble(bound, &mut ret, &sig.ret, &table);
    render_words(&to_flat_args(&mut all).unwrap())
}

#[test]
fn mixed_arrays_scalar_and_symbol() {
    let x = HostArray::zeros(PrimKind::F32, &[3, 2]);
    let y = HostArray::zeros(PrimKind::F32, &[3, 2]);
    let output = layout(
        "mix(x: f32[n, 2], k: i32, y: f32[n, 2]) -> f64[2, n]",
        &[x.into(), HostValue::from(5i64), y.into()],
    );
    insta::assert_snapshot!(output, @r"
    0: ptr
    1: ptr
    2: i64 0
    3: i64 3
    4: i64 2
    5: i64 2
    6: i64 1
    7: i32 5
    8: ptr
    9: ptr
    10: i64 0
    11: i64 3
    12: i64 2
    13: i64 2
    14: i64 1
    15: ptr
    16: ptr
    17: i64 0
    18: i64 2
    19: i64 3
    20: i64 3
    21: i64 1
    22: i64 3
    ");
}

#[test]
fn rank_zero_and_bool_scalar() {
    let z = HostArray::zeros(PrimKind::F64, &[]);
    let output = layout(
        "gate(z: f64[], on: bool) -> f64[]",
        &[z.into(), HostValue::from(true)],
    );
    insta::assert_snapshot!(output, @r"
    0: ptr
    1: ptr
    2: i64 0
    3: u8 1
    4: ptr
    5: ptr
    6: i64 0
    ");
}

#[test]
fn symbol_conflict_message() {
    let sig = KernelSignature::parse("add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]").unwrap();
    let values = [
        HostValue::from(HostArray::zeros(PrimKind::F32, &[3, 4])),
        HostValue::from(HostArray::zeros(PrimKind::F32, &[3, 5])),
    ];
    let err = bind_args(&values, &sig.arg_types()).unwrap_err();
    insta::assert_snapshot!(
        format!("error[{}]: {}", err.code(), err),
        @"error[E0103]: symbol `m` is bound to 4 but argument 1, dimension 1 has extent 5"
    );
}

#[test]
fn signature_diagnostics() {
    let err = KernelSignature::parse("f(a: f32[n], a: f32[n]) -> f32[n]").unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r"
    invalid kernel signature:
    error[E0003]: duplicate parameter 'a' at 13..14
      hint: first declared at 2..3
    ");
}
