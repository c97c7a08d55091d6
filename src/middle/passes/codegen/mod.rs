//! 字节码发射
//!
//! 将（优化后的）模块 IR 转换为带版本号和校验和的字节码文件。
//!
//! ## 模块职责
//!
//! - `mod.rs`: 编排层，入口查找 + 文件头 + 诊断上报
//! - `translator.rs`: IR → 字节码翻译
//! - `operand.rs`: 操作数解析与标签解析
//! - `opcode.rs`: 操作码表
//! - `buffer.rs`: 小端序编码缓冲区与解码游标
//! - `bytecode.rs`: 字节码格式定义 + 序列化

pub mod buffer;
pub mod bytecode;
pub mod opcode;
pub mod operand;
pub mod translator;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

use crate::middle::core::ir::Module;
use crate::util::config::{EmitConfig, DEFAULT_ENTRY_POINT};
use crate::util::diagnostic::{codes, Category, Diagnostic, DiagnosticBuilder, DiagnosticSink, Severity};
use translator::Translator;

// 重新导出公共类型
pub use bytecode::{
    verify_checksum, BytecodeError, BytecodeFile, BytecodeFunction, BytecodeInstruction,
    BytecodeModule, BytecodeOperand, FileHeader, FLAG_DEBUG_LINES, FLAG_OPTIMIZED, MAGIC,
    VERSION,
};
pub use opcode::Opcode;

/// 发射错误
///
/// 全部是结构性错误：发射中止，不产生任何输出。
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("entry function `{entry}` not found")]
    MissingEntry { entry: String },

    #[error("unresolved label `{label}` in function `{function}`")]
    UnresolvedLabel { label: String, function: String },

    #[error("{what} of function `{function}` does not fit the encoding")]
    Overflow { what: &'static str, function: String },

    #[error(transparent)]
    Encoding(#[from] BytecodeError),
}

impl EmitError {
    pub fn code(&self) -> &'static str {
        match self {
            EmitError::MissingEntry { .. } => codes::MISSING_ENTRY,
            EmitError::UnresolvedLabel { .. } => codes::UNRESOLVED_LABEL,
            EmitError::Overflow { .. } => codes::ENCODING_OVERFLOW,
            EmitError::Encoding(BytecodeError::Io { .. }) => codes::WRITE_FAILED,
            EmitError::Encoding(_) => codes::ENCODING_OVERFLOW,
        }
    }

    pub fn to_diagnostic(
        &self,
        source_file: &str,
    ) -> Diagnostic {
        // 无法写出产物是致命错误
        let (severity, category) = match self {
            EmitError::Encoding(BytecodeError::Io { .. }) => (Severity::Fatal, Category::Io),
            _ => (Severity::Error, Category::Codegen),
        };
        let builder = DiagnosticBuilder::new(severity, self.code(), self.to_string())
            .category(category)
            .in_file(source_file);
        match self {
            EmitError::MissingEntry { entry } => builder
                .suggest(format!("define a function named `{}`", entry))
                .build(),
            _ => builder.build(),
        }
    }
}

/// 字节码发射器
#[derive(Debug, Clone)]
pub struct BytecodeEmitter {
    entry_point: String,
    debug_lines: bool,
    optimized: bool,
    /// 固定时间戳；`None` 时使用当前时间
    timestamp: Option<u64>,
}

impl Default for BytecodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BytecodeEmitter {
    pub fn new() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            debug_lines: true,
            optimized: false,
            timestamp: None,
        }
    }

    pub fn from_config(config: &EmitConfig) -> Self {
        Self::new()
            .with_entry_point(config.entry_point.clone())
            .with_debug_lines(config.debug_lines)
    }

    pub fn with_entry_point(
        mut self,
        entry_point: impl Into<String>,
    ) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_debug_lines(
        mut self,
        debug_lines: bool,
    ) -> Self {
        self.debug_lines = debug_lines;
        self
    }

    /// 标记模块经过优化流水线
    pub fn with_optimized(
        mut self,
        optimized: bool,
    ) -> Self {
        self.optimized = optimized;
        self
    }

    /// 固定文件头时间戳，便于得到可复现的输出
    pub fn with_timestamp(
        mut self,
        timestamp: u64,
    ) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.debug_lines {
            flags |= FLAG_DEBUG_LINES;
        }
        if self.optimized {
            flags |= FLAG_OPTIMIZED;
        }
        flags
    }

    fn timestamp(&self) -> u64 {
        self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    /// 发射字节码文件；头部校验和已填写
    ///
    /// 失败时向 `sink` 上报一条 `error` 诊断并返回错误。
    pub fn emit<S: DiagnosticSink>(
        &self,
        module: &Module,
        sink: &mut S,
    ) -> Result<BytecodeFile, EmitError> {
        self.emit_inner(module).map_err(|err| {
            sink.report(err.to_diagnostic(&module.source_file));
            err
        })
    }

    fn emit_inner(
        &self,
        module: &Module,
    ) -> Result<BytecodeFile, EmitError> {
        debug!(
            "Emitting bytecode for `{}`: {} functions, {} constants",
            module.name,
            module.functions.len(),
            module.constants.len()
        );

        let entry = module
            .functions
            .iter()
            .position(|f| f.name == self.entry_point)
            .ok_or_else(|| EmitError::MissingEntry {
                entry: self.entry_point.clone(),
            })?;
        let entry = u32::try_from(entry).map_err(|_| EmitError::Overflow {
            what: "entry index",
            function: self.entry_point.clone(),
        })?;

        let translated = Translator::new(self.debug_lines).translate_module(module, entry)?;
        let mut file = BytecodeFile::new(FileHeader::new(self.flags(), self.timestamp()), translated);
        let bytes = file.seal()?;

        debug!(
            "Bytecode complete: {} bytes, checksum {:#010x}",
            bytes.len(),
            file.header.checksum
        );
        Ok(file)
    }

    /// 发射并原子写入 `path`；失败时 `path` 上不留任何文件
    pub fn emit_to_path<S: DiagnosticSink>(
        &self,
        module: &Module,
        path: &Path,
        sink: &mut S,
    ) -> Result<BytecodeFile, EmitError> {
        let file = self.emit(module, sink)?;
        file.write_to_path(path).map_err(|err| {
            let err = EmitError::from(err);
            sink.report(err.to_diagnostic(&module.source_file));
            err
        })?;
        Ok(file)
    }
}
