use clap::Parser;
use std::path::PathBuf;

use lkc::error::Error;
use lkc::id::ArtifactTag;
use lkc::pipeline::{run_pipeline, CompilationState, CompileOptions, Toolchain};
use lkc::signature::{IrKernel, KernelSignature};
use lkc::stage::StageId;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// LLVM-dialect MLIR
    Lowered,
    /// LLVM IR
    Llvm,
    /// Shared object
    Shared,
    /// Shared object, then load it and resolve the entry
    Load,
}

impl EmitStage {
    fn terminal(self) -> StageId {
        match self {
            EmitStage::Lowered => StageId::LowerToTarget,
            EmitStage::Llvm => StageId::TranslateToNativeIr,
            EmitStage::Shared => StageId::CompileAndLink,
            EmitStage::Load => StageId::Load,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lkc",
    version,
    about = "Linalg Kernel Compiler — lowers linalg-dialect MLIR kernels to loadable shared objects"
)]
struct Cli {
    /// Input linalg-dialect .mlir file
    source: PathBuf,

    /// Kernel signature, e.g. "add(a: f32[n, m], b: f32[n, m]) -> f32[n, m]"
    #[arg(short, long)]
    signature: String,

    /// Directory for intermediate and final artifacts
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Artifact name discriminator (default: time-derived)
    #[arg(long)]
    tag: Option<String>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Shared)]
    emit: EmitStage,

    /// JSON file overriding the external tool commands
    #[arg(long)]
    toolchain: Option<PathBuf>,

    /// Use the fixed debug base name for all artifacts
    #[arg(long)]
    debug: bool,

    /// Print stages and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if cli.verbose {
        eprintln!("lkc: source   = {}", cli.source.display());
        eprintln!("lkc: work dir = {}", cli.work_dir.display());
        eprintln!("lkc: emit     = {:?}", cli.emit);
    }

    // ── Signature ──
    let signature = match KernelSignature::parse(&cli.signature) {
        Ok(s) => s,
        Err(Error::Signature { diagnostics }) => {
            for d in &diagnostics {
                eprintln!("lkc: {}", d);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("lkc: error: {}", e);
            std::process::exit(1);
        }
    };

    // ── Toolchain ──
    let toolchain = match &cli.toolchain {
        Some(path) => match Toolchain::from_json_file(path) {
            Ok(tc) => tc,
            Err(e) => {
                eprintln!("lkc: error: {}", e);
                std::process::exit(2);
            }
        },
        None => Toolchain::default(),
    };

    // ── Read IR ──
    let ir = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("lkc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cli.work_dir) {
        eprintln!("lkc: error: {}: {}", cli.work_dir.display(), e);
        std::process::exit(2);
    }

    let kernel = IrKernel {
        signature,
        ir,
        source_file: Some(cli.source.clone()),
    };
    let options = CompileOptions {
        work_dir: cli.work_dir.clone(),
        tag: cli.tag.clone().map(ArtifactTag::new),
        debug: cli.debug,
        ir_override: None,
        toolchain,
    };

    // ── Pipeline ──
    let mut state = CompilationState::new(&kernel, &options);
    let verbose = cli.verbose;
    let result = run_pipeline(&mut state, cli.emit.terminal(), |stage, elapsed| {
        if verbose {
            eprintln!(
                "lkc: {} complete, {:.1}ms",
                stage,
                elapsed.as_secs_f64() * 1000.0
            );
        }
    });
    if let Err(e) = result {
        eprintln!("lkc: error[{}]: {}", e.code(), e);
        std::process::exit(1);
    }

    match cli.emit {
        EmitStage::Load => {
            if let Some(callable) = &state.callable {
                println!(
                    "{}: entry `{}`, {} parameters",
                    callable.path().display(),
                    callable.name(),
                    callable.flat_arity()
                );
            }
        }
        stage => {
            if let Some(path) = state.paths.output_of(stage.terminal()) {
                println!("{}", path.display());
            }
        }
    }
}
