// Integration test: lower a real linalg kernel with the default toolchain.
//
// Runs mlir-opt, mlir-translate, llc and g++ with the stock flags, loads the
// result and checks elementwise add on 3x4 f32 arrays. The default pass list
// targets MLIR releases that still provide `--convert-linalg-to-llvm`, so the
// test is opt-in: `cargo test -- --ignored`.
// Skipped automatically if any of the tools is missing.

use std::process::Command;

use lkc::error::Error;
use lkc::id::ArtifactTag;
use lkc::pipeline::{compile, CompileOptions};
use lkc::signature::{IrKernel, KernelSignature};
use lkc::HostValue;
use ndarray::{Array2, ArrayD};

const ADD_MLIR: &str = r#"
#map = affine_map<(d0, d1) -> (d0, d1)>
func.func @add(%a: memref<?x?xf32>, %b: memref<?x?xf32>, %c: memref<?x?xf32>, %n: index, %m: index) {
  linalg.generic {indexing_maps = [#map, #map, #map], iterator_types = ["parallel", "parallel"]}
      ins(%a, %b : memref<?x?xf32>, memref<?x?xf32>) outs(%c : memref<?x?xf32>) {
  ^bb0(%x: f32, %y: f32, %z: f32):
    %s = arith.addf %x, %y : f32
    linalg.yield %s : f32
  }
  return
}
"#;

fn have_tool(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
#[ignore = "needs an MLIR toolchain that accepts the default pass list"]
fn lowered_add_matches_host_result() {
    let _ = env_logger::builder().is_test(true).try_init();
    for tool in ["mlir-opt", "mlir-translate", "llc", "g++"] {
        if !have_tool(tool) {
            eprintln!("SKIP: {} not found", tool);
            return;
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let kernel = IrKernel {
        signature: KernelSignature::parse("add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]").unwrap(),
        ir: ADD_MLIR.to_string(),
        source_file: Some("add.mlir".into()),
    };
    let options = CompileOptions {
        work_dir: dir.path().to_path_buf(),
        tag: Some(ArtifactTag::fresh()),
        ..Default::default()
    };

    let add = match compile(&kernel, &options) {
        Ok(c) => c,
        Err(e @ Error::ExternalTool { .. }) => panic!("toolchain rejected the kernel:\n{e}"),
        Err(e) => panic!("compile failed: {e}"),
    };

    let a = Array2::from_shape_fn((3, 4), |(i, j)| (i + j) as f32).into_dyn();
    let b = ArrayD::<f32>::from_elem(vec![3, 4], 1.0);
    let out = add
        .invoke(&[HostValue::from(a.clone()), HostValue::from(b.clone())], None)
        .unwrap();
    let out = out.into_array().unwrap().into_typed::<f32>().unwrap();
    assert_eq!(out, &a + &b);

    let bad = ArrayD::<f32>::zeros(vec![3, 5]);
    let err = add
        .invoke(&[HostValue::from(a), HostValue::from(bad)], None)
        .unwrap_err();
    assert!(matches!(err, Error::SymbolConflict { ref symbol, .. } if symbol == "m"));
}
