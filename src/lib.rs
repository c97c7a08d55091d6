//! Entangle IR backend
//!
//! Compiler backend for programs over correlated ("entangled") resource pairs:
//! a module IR, a resource-correlation analyzer, a three-level optimization
//! pipeline and a versioned, checksummed bytecode emitter.
//!
//! # Example
//!
//! ```no_run
//! use entangle::{build_bytecode, dump_bytecode, Result};
//! use std::path::Path;
//!
//! fn main() -> Result<()> {
//!     build_bytecode(Path::new("demo.ir.json"), Path::new("demo.entb"))?;
//!     println!("{}", dump_bytecode(Path::new("demo.entb"))?);
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/entangle")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod frontend;
pub mod middle;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use middle::{compile_module, compile_program, CompileError, CompileOutput};

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::middle::core::ir::Module;
use crate::middle::passes::codegen::BytecodeFile;
use crate::util::config::{config_path, load_config};
use crate::util::diagnostic::TracingSink;
use crate::util::logger;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read a serialized module IR (JSON)
pub fn load_module(path: &Path) -> Result<Module> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read module IR: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse module IR: {}", path.display()))
}

/// Build a bytecode file from a serialized module IR
///
/// Configuration is read from `entangle.toml` next to the input, falling
/// back to defaults. Its `log_level` initializes the global logger unless
/// one is already installed. The output is written atomically: on any failure no
/// file exists at `output_path`.
pub fn build_bytecode(
    ir_path: &Path,
    output_path: &Path,
) -> Result<CompileOutput> {
    debug!("Building bytecode: {} -> {}", ir_path.display(), output_path.display());

    let dir = ir_path.parent().unwrap_or_else(|| Path::new("."));
    let config = load_config(&config_path(dir))
        .with_context(|| format!("Failed to load config for {}", ir_path.display()))?;
    logger::init_with_level(config.log_level);
    let module = load_module(ir_path)?;

    let output = compile_module(&module, &config, &mut TracingSink)
        .with_context(|| format!("Failed to compile module `{}`", module.name))?;
    output
        .bytecode
        .write_to_path(output_path)
        .with_context(|| format!("Failed to write bytecode: {}", output_path.display()))?;

    Ok(output)
}

/// Decode and disassemble a bytecode file for debugging
pub fn dump_bytecode(path: &Path) -> Result<String> {
    debug!("Dumping bytecode: {}", path.display());
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read bytecode: {}", path.display()))?;
    let file = BytecodeFile::from_bytes(&bytes)
        .with_context(|| format!("Invalid bytecode file: {}", path.display()))?;
    Ok(file.disassemble())
}
