// pipeline.rs — Compilation state and stage orchestration
//
// Holds the artifact paths and products of one kernel compilation and runs
// the minimal set of stages for a given terminal StageId: write the linalg
// IR, lower it, translate it to LLVM IR, compile and link a shared object,
// and load it.
//
// Preconditions: the work directory exists (`compile` creates it).
// Postconditions: every stage in `required_stages(terminal)` has completed and
//   its artifact is on disk, or `status` names the failing stage.
// Failure modes: Io writing the IR; Spawn or ExternalTool from an external
//   stage; Load or EntryNotFound from the loader.
// Side effects: writes artifacts into the work directory; spawns processes;
//   calls `on_stage_complete` after each stage. Nothing is cleaned up.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::callable::Callable;
use crate::error::{Error, Result};
use crate::id::ArtifactTag;
use crate::signature::{KernelSignature, KernelSource};
use crate::stage::{required_stages, StageId};

// ── Toolchain configuration ────────────────────────────────────────────────

/// One external process: program plus its fixed flags.
///
/// Flags may contain `{input}` and `{output}` placeholders. Without any
/// placeholder the input path, `-o` and the output path are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, flags: &[&str]) -> Self {
        Self {
            program: program.into(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Full argument list for one invocation.
    pub fn render_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let templated = self
            .flags
            .iter()
            .any(|f| f.contains("{input}") || f.contains("{output}"));
        if !templated {
            let mut args: Vec<OsString> = self.flags.iter().map(OsString::from).collect();
            args.push(input.into());
            args.push("-o".into());
            args.push(output.into());
            return args;
        }
        self.flags
            .iter()
            .map(|f| -> OsString {
                match f.as_str() {
                    "{input}" => input.into(),
                    "{output}" => output.into(),
                    _ => f
                        .replace("{input}", &input.to_string_lossy())
                        .replace("{output}", &output.to_string_lossy())
                        .into(),
                }
            })
            .collect()
    }
}

/// The external programs behind the lowering stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    /// linalg dialect → LLVM dialect.
    pub lower: ToolCommand,
    /// LLVM dialect → LLVM IR.
    pub translate: ToolCommand,
    /// LLVM IR → object file.
    pub compile: ToolCommand,
    /// object file → shared object.
    pub link: ToolCommand,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            lower: ToolCommand::new(
                "mlir-opt",
                &[
                    "--convert-linalg-to-loops",
                    "--lower-affine",
                    "--convert-scf-to-cf",
                    "--convert-linalg-to-llvm",
                    "--convert-func-to-llvm",
                    "--convert-index-to-llvm",
                    "--convert-arith-to-llvm",
                    "--convert-memref-to-llvm",
                    "--convert-cf-to-llvm",
                    "--scf-for-loop-peeling",
                    "--scf-for-loop-specialization",
                    "--reconcile-unrealized-casts",
                ],
            ),
            translate: ToolCommand::new("mlir-translate", &["--mlir-to-llvmir"]),
            compile: ToolCommand::new("llc", &["-O3", "-filetype=obj"]),
            link: ToolCommand::new("g++", &["-shared", "-fPIC", "-o", "{output}", "{input}"]),
        }
    }
}

impl Toolchain {
    /// Parse overrides from JSON; missing commands keep their defaults.
    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, path)
    }
}

// ── Options and naming ─────────────────────────────────────────────────────

/// Base name used for every artifact in debug mode.
pub const DEBUG_BASE_NAME: &str = "_mlir_debug";

/// Stem used when the kernel has no source file.
const INLINE_STEM: &str = "inline";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory all artifacts are written to.
    pub work_dir: PathBuf,
    /// Name discriminator; a fresh one is generated when absent.
    pub tag: Option<ArtifactTag>,
    /// Fixed base name, and `ir_override` is honoured.
    pub debug: bool,
    /// IR text written instead of the kernel's own (debug mode only).
    pub ir_override: Option<String>,
    pub toolchain: Toolchain,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            tag: None,
            debug: false,
            ir_override: None,
            toolchain: Toolchain::default(),
        }
    }
}

/// `_<stem>___<kernel>_<tag>`
pub fn base_name(stem: &str, kernel: &str, tag: &ArtifactTag) -> String {
    format!("_{}___{}_{}", stem, kernel, tag)
}

/// Where each stage writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub base: String,
    /// `<base>.mlir`
    pub linalg_ir: PathBuf,
    /// `llvm_<base>.mlir`
    pub llvm_dialect_ir: PathBuf,
    /// `llvm_<base>.ll`
    pub llvm_ir: PathBuf,
    /// `llvm_<base>.ll.o`
    pub object: PathBuf,
    /// `<base>.so`
    pub shared_object: PathBuf,
    /// `<base>.build-info.json`
    pub build_info: PathBuf,
}

impl ArtifactPaths {
    pub fn new(work_dir: &Path, base: &str) -> Self {
        Self {
            base: base.to_string(),
            linalg_ir: work_dir.join(format!("{}.mlir", base)),
            llvm_dialect_ir: work_dir.join(format!("llvm_{}.mlir", base)),
            llvm_ir: work_dir.join(format!("llvm_{}.ll", base)),
            object: work_dir.join(format!("llvm_{}.ll.o", base)),
            shared_object: work_dir.join(format!("{}.so", base)),
            build_info: work_dir.join(format!("{}.build-info.json", base)),
        }
    }

    /// File produced by `stage`, if it produces one.
    pub fn output_of(&self, stage: StageId) -> Option<&Path> {
        match stage {
            StageId::EmitIr => Some(self.linalg_ir.as_path()),
            StageId::LowerToTarget => Some(self.llvm_dialect_ir.as_path()),
            StageId::TranslateToNativeIr => Some(self.llvm_ir.as_path()),
            StageId::CompileAndLink => Some(self.shared_object.as_path()),
            StageId::Load => None,
        }
    }
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// What a shared object was built from.
///
/// `ir_hash`: SHA-256 of the IR text handed to the first lowering stage.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub ir_hash: [u8; 32],
    pub signature: KernelSignature,
    pub base_name: String,
    pub stages: Vec<StageId>,
    pub toolchain: Toolchain,
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the IR hash (64 characters).
    pub fn ir_hash_hex(&self) -> String {
        bytes_to_hex(&self.ir_hash)
    }

    /// Build-info document written next to the artifact.
    pub fn to_json(&self) -> String {
        let doc = serde_json::json!({
            "ir_hash": self.ir_hash_hex(),
            "signature": self.signature,
            "base_name": self.base_name,
            "stages": self.stages.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            "toolchain": self.toolchain,
            "compiler_version": self.compiler_version,
        });
        format!("{:#}\n", doc)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(
    ir_text: &str,
    signature: &KernelSignature,
    base_name: &str,
    toolchain: &Toolchain,
) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(ir_text.as_bytes());
    let mut ir_hash = [0u8; 32];
    ir_hash.copy_from_slice(&hasher.finalize());

    Provenance {
        ir_hash,
        signature: signature.clone(),
        base_name: base_name.to_string(),
        stages: required_stages(StageId::Load),
        toolchain: toolchain.clone(),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    /// The requested terminal stage completed.
    Success,
    Failed(StageId),
}

/// One kernel compilation in progress.
pub struct CompilationState {
    pub signature: KernelSignature,
    /// IR text the EmitIr stage writes.
    pub ir_text: String,
    pub paths: ArtifactPaths,
    pub toolchain: Toolchain,
    pub status: PipelineStatus,
    /// Stages already run, in order.
    pub completed: Vec<StageId>,
    pub provenance: Option<Provenance>,
    pub callable: Option<Callable>,
}

impl CompilationState {
    /// Fix artifact names and IR text for `kernel` under `options`.
    pub fn new(kernel: &dyn KernelSource, options: &CompileOptions) -> Self {
        let signature = kernel.signature().clone();
        let base = if options.debug {
            DEBUG_BASE_NAME.to_string()
        } else {
            let stem = kernel
                .source_file()
                .as_deref()
                .and_then(Path::file_stem)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| INLINE_STEM.to_string());
            let tag = options.tag.clone().unwrap_or_else(ArtifactTag::fresh);
            base_name(&stem, &signature.name, &tag)
        };

        let ir_text = match (&options.ir_override, options.debug) {
            (Some(ir), true) => {
                warn!("debug mode: writing overridden IR for `{}`", signature.name);
                ir.clone()
            }
            (Some(_), false) => {
                warn!("IR override ignored outside debug mode");
                kernel.to_ir_text()
            }
            (None, _) => kernel.to_ir_text(),
        };

        Self {
            signature,
            ir_text,
            paths: ArtifactPaths::new(&options.work_dir, &base),
            toolchain: options.toolchain.clone(),
            status: PipelineStatus::Pending,
            completed: Vec::new(),
            provenance: None,
            callable: None,
        }
    }

    /// Write the provenance document, if EmitIr has produced one.
    pub fn write_build_info(&self) -> Result<()> {
        let Some(provenance) = &self.provenance else {
            return Ok(());
        };
        fs::write(&self.paths.build_info, provenance.to_json()).map_err(|source| Error::Io {
            path: self.paths.build_info.clone(),
            source,
        })
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the stages needed to produce `terminal`, skipping those already done.
///
/// Per-stage sequence: execute → record → on_stage_complete(callback).
/// The first failure stops the run; later stages are not attempted.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: StageId,
    mut on_stage_complete: impl FnMut(StageId, Duration),
) -> Result<()> {
    for stage in required_stages(terminal) {
        if state.completed.contains(&stage) {
            continue;
        }
        let t = Instant::now();
        if let Err(e) = run_stage(state, stage) {
            state.status = PipelineStatus::Failed(stage);
            return Err(e);
        }
        let elapsed = t.elapsed();
        state.completed.push(stage);
        debug!(
            "lkc: {} complete, {:.1}ms",
            stage,
            elapsed.as_secs_f64() * 1000.0
        );
        on_stage_complete(stage, elapsed);
    }
    state.status = PipelineStatus::Success;
    Ok(())
}

fn run_stage(state: &mut CompilationState, stage: StageId) -> Result<()> {
    let paths = &state.paths;
    let tools = &state.toolchain;
    match stage {
        StageId::EmitIr => {
            fs::write(&paths.linalg_ir, &state.ir_text).map_err(|source| Error::Io {
                path: paths.linalg_ir.clone(),
                source,
            })?;
            state.provenance = Some(compute_provenance(
                &state.ir_text,
                &state.signature,
                &paths.base,
                tools,
            ));
            state.write_build_info()?;
        }
        StageId::LowerToTarget => {
            run_tool(stage, &tools.lower, &paths.linalg_ir, &paths.llvm_dialect_ir)?;
        }
        StageId::TranslateToNativeIr => {
            run_tool(stage, &tools.translate, &paths.llvm_dialect_ir, &paths.llvm_ir)?;
        }
        StageId::CompileAndLink => {
            run_tool(stage, &tools.compile, &paths.llvm_ir, &paths.object)?;
            run_tool(stage, &tools.link, &paths.object, &paths.shared_object)?;
        }
        StageId::Load => {
            // SAFETY: the shared object was lowered from this kernel's own IR,
            // whose entry takes the flat layout of its signature.
            let callable = unsafe { Callable::load(&paths.shared_object, &state.signature)? };
            state.callable = Some(callable);
        }
    }
    Ok(())
}

/// Run one external process under the empty-stderr rule.
///
/// Standard output is logged; any error-stream output fails the stage and is
/// returned verbatim. The exit status alone never decides.
pub fn run_tool(stage: StageId, cmd: &ToolCommand, input: &Path, output: &Path) -> Result<()> {
    let args = cmd.render_args(input, output);
    debug!(
        "{}: {} {}",
        stage,
        cmd.program,
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let out = Command::new(&cmd.program)
        .args(&args)
        .output()
        .map_err(|source| Error::Spawn {
            stage,
            program: cmd.program.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    if !stdout.trim().is_empty() {
        info!("{} ({}): {}", stage, cmd.program, stdout.trim_end());
    }

    if !out.stderr.is_empty() {
        return Err(Error::ExternalTool {
            stage,
            program: cmd.program.clone(),
            diagnostics: String::from_utf8_lossy(&out.stderr).into_owned(),
        });
    }
    if !out.status.success() {
        warn!(
            "{}: {} exited with {} but wrote no diagnostics",
            stage, cmd.program, out.status
        );
    }
    Ok(())
}

/// Compile `kernel` through every stage and load the result.
///
/// `<base>.build-info.json` is written by EmitIr, before anything is lowered.
pub fn compile(kernel: &dyn KernelSource, options: &CompileOptions) -> Result<Callable> {
    fs::create_dir_all(&options.work_dir).map_err(|source| Error::Io {
        path: options.work_dir.clone(),
        source,
    })?;

    let mut state = CompilationState::new(kernel, options);
    debug!("compiling `{}` as {}", state.signature.name, state.paths.base);

    run_pipeline(&mut state, StageId::Load, |_, _| {})?;
    state.callable.take().ok_or_else(|| Error::Io {
        path: state.paths.shared_object.clone(),
        source: io::Error::new(io::ErrorKind::NotFound, "load stage produced no callable"),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────
