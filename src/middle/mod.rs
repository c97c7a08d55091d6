//! Intermediate Representation (IR) and bytecode generation
//!
//! This module handles the transformation from AST to bytecode:
//!
//! ```text
//! Program ─ IrGenerator ─▶ Module ─ CorrelationAnalyzer ─▶ AnalysisResult
//!                            │                                  │
//!                            └──────────── Optimizer ◀──────────┘
//!                                              │
//!                                   BytecodeEmitter ─▶ BytecodeFile
//! ```

pub mod core;
pub mod passes;

pub use self::core::ir::*;
pub use self::core::ir_gen::{IrGenError, IrGenerator};
pub use passes::analysis::{AnalysisResult, CorrelationAnalyzer};
pub use passes::codegen::{BytecodeEmitter, BytecodeFile, EmitError};
pub use passes::optimize::{OptimizationLevel, OptimizationStats, Optimizer};

use thiserror::Error;
use tracing::debug;

use crate::frontend::ast::Program;
use crate::util::config::CompilerConfig;
use crate::util::diagnostic::DiagnosticSink;

/// Pipeline error
///
/// Only structural failures abort a compilation; optimization safety
/// violations are reported as warnings and never surface here.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    IrGen(#[from] IrGenError),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::IrGen(err) => err.code(),
            CompileError::Ir(err) => err.code(),
            CompileError::Emit(err) => err.code(),
        }
    }
}

/// Everything a successful compilation produces
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Sealed bytecode; the header checksum is filled in
    pub bytecode: BytecodeFile,
    /// Analysis of the unoptimized module
    pub analysis: AnalysisResult,
    pub stats: OptimizationStats,
    /// The optimized module the bytecode was emitted from
    pub module: Module,
}

/// Verify, analyze, optimize and emit a module
///
/// The input module is never mutated. Structural errors are reported to
/// `sink` at `error` severity before being returned.
pub fn compile_module<S: DiagnosticSink>(
    module: &Module,
    config: &CompilerConfig,
    sink: &mut S,
) -> Result<CompileOutput, CompileError> {
    debug!("Compiling module `{}`", module.name);

    if let Err(err) = module.verify() {
        sink.report(err.to_diagnostic(&module.source_file));
        return Err(err.into());
    }

    let analysis = CorrelationAnalyzer::from_config(&config.analysis).analyze(module);
    let outcome = Optimizer::from_config(&config.optimize).optimize(module, &analysis, sink);

    let bytecode = BytecodeEmitter::from_config(&config.emit)
        .with_optimized(true)
        .emit(&outcome.module, sink)?;

    debug!(
        "Compiled module `{}`: {} functions",
        module.name,
        bytecode.module.functions.len()
    );
    Ok(CompileOutput {
        bytecode,
        analysis,
        stats: outcome.stats,
        module: outcome.module,
    })
}

/// Lower a program and run the full pipeline over it
pub fn compile_program<S: DiagnosticSink>(
    program: &Program,
    module_name: &str,
    source_file: &str,
    config: &CompilerConfig,
    sink: &mut S,
) -> Result<CompileOutput, CompileError> {
    let module = IrGenerator::new(module_name, source_file)
        .with_entry_point(config.emit.entry_point.clone())
        .generate(program, sink)?;
    compile_module(&module, config, sink)
}
