// Integration tests: call real shared objects through the flat memref layout.
//
// The kernels are small C functions written against the same parameter list
// MLIR's LLVM lowering produces: every array as (allocated, aligned, offset,
// sizes.., strides..), scalars at their declared width, the return buffer
// after the arguments, then one i64 per symbol.
// Skipped automatically if no C compiler is found.

use std::path::{Path, PathBuf};
use std::process::Command;

use lkc::error::{ArgPos, Error};
use lkc::{Callable, HostArray, HostValue, KernelSignature};
use ndarray::{array, Array2, ArrayD};

const KERNELS_C: &str = r#"
#include <stdint.h>

void add(float *a, float *a_al, int64_t a_off, int64_t a_n, int64_t a_m, int64_t a_s0, int64_t a_s1,
         float *b, float *b_al, int64_t b_off, int64_t b_n, int64_t b_m, int64_t b_s0, int64_t b_s1,
         float *c, float *c_al, int64_t c_off, int64_t c_n, int64_t c_m, int64_t c_s0, int64_t c_s1,
         int64_t n, int64_t m) {
    for (int64_t i = 0; i < n; i++)
        for (int64_t j = 0; j < m; j++)
            c_al[c_off + i * c_s0 + j * c_s1] =
                a_al[a_off + i * a_s0 + j * a_s1] + b_al[b_off + i * b_s0 + j * b_s1];
}

void add_n2(float *a, float *a_al, int64_t a_off, int64_t a_n, int64_t a_m, int64_t a_s0, int64_t a_s1,
            float *b, float *b_al, int64_t b_off, int64_t b_n, int64_t b_m, int64_t b_s0, int64_t b_s1,
            float *c, float *c_al, int64_t c_off, int64_t c_n, int64_t c_m, int64_t c_s0, int64_t c_s1,
            int64_t n) {
    for (int64_t i = 0; i < n; i++)
        for (int64_t j = 0; j < 2; j++)
            c_al[c_off + i * c_s0 + j * c_s1] =
                a_al[a_off + i * a_s0 + j * a_s1] + b_al[b_off + i * b_s0 + j * b_s1];
}

void scale(double *x, double *x_al, int64_t x_off, int64_t x_n, int64_t x_s0,
           double k,
           double *r, double *r_al, int64_t r_off, int64_t r_n, int64_t r_s0,
           int64_t n) {
    for (int64_t i = 0; i < n; i++)
        r_al[r_off + i * r_s0] = k * x_al[x_off + i * x_s0];
}

void fill(int32_t v, int32_t *r, int32_t *r_al, int64_t r_off, int64_t r_n, int64_t r_s0) {
    for (int64_t i = 0; i < r_n; i++)
        r_al[r_off + i * r_s0] = v;
}
"#;

fn find_c_compiler() -> Option<String> {
    for compiler in &["cc", "gcc", "clang"] {
        if Command::new(compiler)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            return Some(compiler.to_string());
        }
    }
    None
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Build `KERNELS_C` into a shared object inside `dir`.
fn build_kernels(cc: &str, dir: &Path) -> PathBuf {
    let src = dir.join("kernels.c");
    let so = dir.join("kernels.so");
    std::fs::write(&src, KERNELS_C).expect("failed to write kernel source");
    let out = Command::new(cc)
        .args(["-shared", "-fPIC", "-O1", "-o"])
        .arg(&so)
        .arg(&src)
        .output()
        .expect("failed to run C compiler");
    assert!(
        out.status.success(),
        "C compiler failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    so
}

fn load(so: &Path, signature: &str) -> Callable {
    let sig = KernelSignature::parse(signature).expect("bad signature");
    unsafe { Callable::load(so, &sig) }.expect("failed to load kernel")
}

macro_rules! require_cc {
    () => {
        match find_c_compiler() {
            Some(c) => c,
            None => {
                eprintln!("SKIP: no C compiler found");
                return;
            }
        }
    };
}

// ── Elementwise add ─────────────────────────────────────────────────────────

#[test]
fn add_3x4_f32() {
    let _ = env_logger::builder().is_test(true).try_init();
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let add = load(&so, "add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]");
    assert_eq!(add.symbol_names(), &["n".to_string(), "m".to_string()]);
    assert_eq!(add.flat_arity(), 7 * 3 + 2);

    let a = Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as f32).into_dyn();
    let b = ArrayD::<f32>::from_elem(vec![3, 4], 0.5);
    let out = add
        .invoke(&[HostValue::from(a.clone()), HostValue::from(b.clone())], None)
        .unwrap();

    let out = out.into_array().unwrap().into_typed::<f32>().unwrap();
    assert_eq!(out.shape(), &[3, 4]);
    assert_eq!(out, &a + &b);
}

#[test]
fn add_mismatched_symbol_is_rejected_before_call() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let add = load(&so, "add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]");

    let a = HostArray::zeros(lkc::types::PrimKind::F32, &[3, 4]);
    let b = HostArray::zeros(lkc::types::PrimKind::F32, &[3, 5]);
    let err = add.invoke(&[a.into(), b.into()], None).unwrap_err();
    match err {
        Error::SymbolConflict {
            symbol,
            bound,
            actual,
            pos,
            dim,
        } => {
            assert_eq!(symbol, "m");
            assert_eq!((bound, actual), (4, 5));
            assert_eq!(pos, ArgPos::Arg(1));
            assert_eq!(dim, 1);
        }
        other => panic!("expected SymbolConflict, got {other}"),
    }
}

#[test]
fn add_reads_transposed_input_through_strides() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let add = load(&so, "add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]");

    // 4x3 storage viewed as 3x4: strides [1, 3].
    let t = Array2::from_shape_fn((4, 3), |(i, j)| (i * 10 + j) as f32)
        .reversed_axes()
        .into_dyn();
    let zeros = ArrayD::<f32>::zeros(vec![3, 4]);
    let out = add
        .invoke(&[HostValue::from(t.clone()), HostValue::from(zeros)], None)
        .unwrap();
    let out = out.into_array().unwrap().into_typed::<f32>().unwrap();
    assert_eq!(out, t);
}

#[test]
fn add_writes_caller_buffer() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    // The second extent is literal, so only `n` trails the return buffer.
    let add = load(&so, "add_n2(a: f32[n, 2], b: f32[n, 2]) -> f32[n, 2]");
    assert_eq!(add.symbol_names(), &["n".to_string()]);
    assert_eq!(add.flat_arity(), 22);

    let a = array![[1.0f32, 2.0], [3.0, 4.0]].into_dyn();
    let b = array![[10.0f32, 20.0], [30.0, 40.0]].into_dyn();
    let buf = HostValue::from(ArrayD::<f32>::from_elem(vec![2, 2], -1.0));
    let out = add
        .invoke(&[a.into(), b.into()], Some(buf))
        .unwrap();
    let out = out.into_array().unwrap().into_typed::<f32>().unwrap();
    assert_eq!(out, array![[11.0f32, 22.0], [33.0, 44.0]].into_dyn());

    let wrong = HostValue::from(ArrayD::<f32>::zeros(vec![2, 3]));
    let a = ArrayD::<f32>::zeros(vec![2, 2]);
    let err = add
        .invoke(&[a.clone().into(), a.into()], Some(wrong))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ShapeMismatch {
            pos: ArgPos::Return,
            dim: 1,
            expected: 2,
            actual: 3
        }
    ));
}

// ── Scalars ─────────────────────────────────────────────────────────────────

#[test]
fn scale_passes_f64_scalar() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let scale = load(&so, "scale(x: f64[n], k: f64) -> f64[n]");

    let x = array![1.0f64, -2.0, 3.5].into_dyn();
    let out = scale
        .invoke(&[x.into(), HostValue::from(2.0)], None)
        .unwrap();
    let out = out.into_array().unwrap().into_typed::<f64>().unwrap();
    assert_eq!(out, array![2.0f64, -4.0, 7.0].into_dyn());

    // Integers widen to a float scalar parameter.
    let x = array![1.0f64].into_dyn();
    let out = scale.invoke(&[x.into(), HostValue::from(3i64)], None).unwrap();
    assert_eq!(
        out.into_array().unwrap().into_typed::<f64>().unwrap(),
        array![3.0f64].into_dyn()
    );
}

#[test]
fn fill_narrows_integer_scalar_and_uses_literal_return_shape() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let fill = load(&so, "fill(v: i32) -> i32[5]");
    assert!(fill.symbol_names().is_empty());

    let out = fill.invoke(&[HostValue::from(-7i64)], None).unwrap();
    let out = out.into_array().unwrap().into_typed::<i32>().unwrap();
    assert_eq!(out, ArrayD::<i32>::from_elem(vec![5], -7));
}

#[test]
fn arity_and_type_errors() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let scale = load(&so, "scale(x: f64[n], k: f64) -> f64[n]");

    let x = HostValue::from(ArrayD::<f64>::zeros(vec![2]));
    assert!(matches!(
        scale.invoke(&[x.clone()], None).unwrap_err(),
        Error::Arity {
            expected: 2,
            actual: 1
        }
    ));

    let wrong_kind = HostValue::from(ArrayD::<f32>::zeros(vec![2]));
    assert!(matches!(
        scale
            .invoke(&[wrong_kind, HostValue::from(1.0)], None)
            .unwrap_err(),
        Error::TypeMismatch {
            pos: ArgPos::Arg(0),
            ..
        }
    ));
}

#[test]
fn missing_entry_is_reported() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let sig = KernelSignature::parse("matmul(a: f32[n, k], b: f32[k, m]) -> f32[n, m]").unwrap();
    let err = unsafe { Callable::load(&so, &sig) }.unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { ref name, .. } if name == "matmul"));
}

#[test]
fn callable_is_shared_across_threads() {
    let cc = require_cc!();
    let dir = tempfile::tempdir().unwrap();
    let so = build_kernels(&cc, dir.path());
    let add = std::sync::Arc::new(load(&so, "add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]"));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let add = add.clone();
            std::thread::spawn(move || {
                let a = ArrayD::<f32>::from_elem(vec![2, t + 1], t as f32);
                let out = add
                    .invoke(&[a.clone().into(), a.into()], None)
                    .unwrap();
                out.into_array().unwrap().into_typed::<f32>().unwrap()
            })
        })
        .collect();
    for (t, h) in handles.into_iter().enumerate() {
        let out = h.join().unwrap();
        assert_eq!(out, ArrayD::<f32>::from_elem(vec![2, t + 1], 2.0 * t as f32));
    }
}
