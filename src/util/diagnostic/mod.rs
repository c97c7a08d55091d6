//! 统一诊断系统
//!
//! 提供错误报告、诊断渲染和源码位置跟踪
//!
//! # 模块结构
//!
//! - [`error`] - 诊断数据结构 (Diagnostic, Severity, Category)
//! - [`collect`] - 诊断接收端 (DiagnosticSink, ErrorCollector, TracingSink)
//! - [`codes`] - 错误码注册表
//!
//! # 示例
//!
//! ```
//! use entangle::util::diagnostic::{DiagnosticBuilder, DiagnosticRenderer, Severity, codes};
//!
//! let diagnostic = DiagnosticBuilder::new(Severity::Error, codes::MISSING_ENTRY, "no `$main`").build();
//! let output = DiagnosticRenderer::plain().render(&diagnostic, None);
//! assert!(output.contains("error[E0301]"));
//! ```

pub mod codes;
pub mod collect;
pub mod error;

// 重新导出
pub use collect::{DiagnosticSink, ErrorCollector, TracingSink};
pub use error::{Category, Diagnostic, DiagnosticBuilder, Severity};

use crate::util::span::SourceFile;

/// 渲染器配置
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// 是否启用颜色输出
    pub use_colors: bool,
    /// 是否显示源码片段
    pub show_source: bool,
    /// 是否显示修复建议
    pub show_suggestions: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            show_source: true,
            show_suggestions: true,
        }
    }
}

/// 诊断渲染器
#[derive(Debug, Clone)]
pub struct DiagnosticRenderer {
    /// 渲染配置
    config: EmitterConfig,
}

impl DiagnosticRenderer {
    /// 创建新的渲染器
    pub fn new() -> Self {
        Self {
            config: EmitterConfig::default(),
        }
    }

    /// 无颜色渲染器（日志、测试）
    pub fn plain() -> Self {
        Self::with_config(EmitterConfig {
            use_colors: false,
            ..EmitterConfig::default()
        })
    }

    /// 使用自定义配置创建渲染器
    pub fn with_config(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// 渲染单个诊断信息
    pub fn render(
        &self,
        diagnostic: &Diagnostic,
        source_file: Option<&SourceFile>,
    ) -> String {
        let mut output = String::new();

        // 1. 头部
        output.push_str(&self.render_header(diagnostic));

        // 2. 位置和源码片段
        if self.config.show_source {
            output.push_str(&format!(" --> {}\n", diagnostic.location()));
            if let Some(snippet) = self.render_source_snippet(diagnostic, source_file) {
                output.push_str(&snippet);
            }
        }

        // 3. 修复建议
        if self.config.show_suggestions {
            for suggestion in &diagnostic.suggestions {
                output.push_str(&format!(
                    "{} = {}: {}\n",
                    " ".repeat(4),
                    self.color("help", "help"),
                    suggestion
                ));
            }
        }

        output
    }

    /// 渲染多个诊断信息
    pub fn render_all<'a>(
        &self,
        diagnostics: impl IntoIterator<Item = &'a Diagnostic>,
        source_file: Option<&SourceFile>,
    ) -> String {
        let mut output = String::new();
        for diagnostic in diagnostics {
            output.push_str(&self.render(diagnostic, source_file));
            output.push('\n');
        }
        output
    }

    /// 渲染头部
    fn render_header(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        let severity = diagnostic.severity.to_string();
        format!(
            "{}{}: {}\n",
            self.color(&severity, &severity),
            self.color("bold", &format!("[{}]", diagnostic.code)),
            diagnostic.message
        )
    }

    /// 渲染源码片段
    fn render_source_snippet(
        &self,
        diagnostic: &Diagnostic,
        source_file: Option<&SourceFile>,
    ) -> Option<String> {
        if diagnostic.line == 0 {
            return None;
        }
        let source_file = source_file?;
        let line = source_file.line(diagnostic.line)?;

        let mut output = String::new();
        output.push_str(&format!("{:>4} | {}\n", diagnostic.line, line));
        let spaces = " ".repeat(diagnostic.column.saturating_sub(1) as usize);
        output.push_str(&format!("{} | {}^\n", " ".repeat(4), spaces));
        Some(output)
    }

    /// 简单的颜色渲染
    fn color(
        &self,
        style: &str,
        text: &str,
    ) -> String {
        if !self.config.use_colors {
            return text.to_string();
        }

        match style {
            "error" | "fatal" => format!("\x1b[31m{}\x1b[0m", text),
            "warning" => format!("\x1b[33m{}\x1b[0m", text),
            "info" => format!("\x1b[34m{}\x1b[0m", text),
            "help" => format!("\x1b[36m{}\x1b[0m", text),
            "bold" => format!("\x1b[1m{}\x1b[0m", text),
            _ => text.to_string(),
        }
    }
}

impl Default for DiagnosticRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// 以 JSON 数组形式输出诊断（供 IDE / 构建工具消费）
pub fn render_json(diagnostics: &[Diagnostic]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(diagnostics)
}
