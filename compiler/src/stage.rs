// stage.rs — Stage descriptor module: metadata, dependency resolution, artifact kinds
//
// Declares the five pipeline stages that turn a kernel description into a
// loaded native function, and the artifact each stage writes. Used by the
// pipeline runner to compute the minimal stage list for a requested terminal
// stage.

use std::collections::HashSet;
use std::fmt;

// ── Stage and artifact identifiers ─────────────────────────────────────────

/// One transition of the compilation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    EmitIr,
    LowerToTarget,
    TranslateToNativeIr,
    CompileAndLink,
    Load,
}

/// Files (or handles) produced along the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    LinalgIr,      // <base>.mlir
    LlvmDialectIr, // llvm_<base>.mlir
    LlvmIr,        // llvm_<base>.ll
    Object,        // llvm_<base>.ll.o
    SharedObject,  // <base>.so
    Callable,      // loaded entry point
}

// ── Stage descriptor ───────────────────────────────────────────────────────

/// Static metadata about a pipeline stage.
pub struct StageDescriptor {
    /// Name used in logs and errors.
    pub name: &'static str,
    /// Stages whose artifacts this stage consumes.
    pub inputs: &'static [StageId],
    /// Artifacts this stage produces.
    pub outputs: &'static [ArtifactKind],
}

/// Return the static descriptor for a given stage.
pub fn descriptor(id: StageId) -> StageDescriptor {
    match id {
        StageId::EmitIr => StageDescriptor {
            name: "emit_ir",
            inputs: &[],
            outputs: &[ArtifactKind::LinalgIr],
        },
        StageId::LowerToTarget => StageDescriptor {
            name: "lower_to_target",
            inputs: &[StageId::EmitIr],
            outputs: &[ArtifactKind::LlvmDialectIr],
        },
        StageId::TranslateToNativeIr => StageDescriptor {
            name: "translate_to_native_ir",
            inputs: &[StageId::LowerToTarget],
            outputs: &[ArtifactKind::LlvmIr],
        },
        StageId::CompileAndLink => StageDescriptor {
            name: "compile_and_link",
            inputs: &[StageId::TranslateToNativeIr],
            outputs: &[ArtifactKind::Object, ArtifactKind::SharedObject],
        },
        StageId::Load => StageDescriptor {
            name: "load",
            inputs: &[StageId::CompileAndLink],
            outputs: &[ArtifactKind::Callable],
        },
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(descriptor(*self).name)
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All stages in declaration order.
pub const ALL_STAGES: [StageId; 5] = [
    StageId::EmitIr,
    StageId::LowerToTarget,
    StageId::TranslateToNativeIr,
    StageId::CompileAndLink,
    StageId::Load,
];

/// Compute the minimal ordered list of stages needed to reach `terminal`.
/// Returns stages in execution order.
pub fn required_stages(terminal: StageId) -> Vec<StageId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: StageId, visited: &mut HashSet<StageId>, order: &mut Vec<StageId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
