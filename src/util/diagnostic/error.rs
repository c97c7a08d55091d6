//! 诊断数据结构
//!
//! 提供统一的错误报告机制。所有阶段（IR 生成、优化、字节码发射）
//! 都通过 [`DiagnosticBuilder`] 构造诊断，再交给
//! [`DiagnosticSink`](super::collect::DiagnosticSink) 上报。
//!
//! # 创建方式
//!
//! ```ignore
//! DiagnosticBuilder::new(Severity::Warning, codes::UNSAFE_MERGE, "merge skipped")
//!     .category(Category::Optimization)
//!     .at("demo.ent", span)
//!     .suggest("check the merge policy")
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

use crate::util::span::Span;

/// 诊断严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// 获取严重级别对应的数字值
    pub fn as_u8(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
            Severity::Fatal => 4,
        }
    }

    /// 检查是否为错误级别（error 或 fatal）
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// 诊断类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// IR 结构错误（元数不匹配、未知节点、标签未解析）
    Structure,
    /// 资源关联分析
    Analysis,
    /// 优化安全性
    Optimization,
    /// 字节码发射
    Codegen,
    /// 配置
    Config,
    /// I/O
    Io,
}

impl std::fmt::Display for Category {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Category::Structure => write!(f, "structure"),
            Category::Analysis => write!(f, "analysis"),
            Category::Optimization => write!(f, "optimization"),
            Category::Codegen => write!(f, "codegen"),
            Category::Config => write!(f, "config"),
            Category::Io => write!(f, "io"),
        }
    }
}

/// 诊断信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 严重级别
    pub severity: Severity,
    /// 类别
    pub category: Category,
    /// 错误码
    pub code: String,
    /// 完整消息
    pub message: String,
    /// 源文件（模块级诊断可能为空）
    pub source_file: Option<String>,
    /// 行号（1 起始，0 表示未知）
    pub line: u32,
    /// 列号（1 起始，0 表示未知）
    pub column: u32,
    /// 修复建议
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// 是否为错误级别
    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    /// 位置的可读形式 `file:line:column`
    pub fn location(&self) -> String {
        let file = self.source_file.as_deref().unwrap_or("<module>");
        if self.line == 0 {
            file.to_string()
        } else {
            format!("{}:{}:{}", file, self.line, self.column)
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}

/// 诊断构建器
#[derive(Debug, Clone)]
pub struct DiagnosticBuilder {
    severity: Severity,
    category: Category,
    code: &'static str,
    message: String,
    source_file: Option<String>,
    span: Span,
    suggestions: Vec<String>,
}

impl DiagnosticBuilder {
    /// 创建新的诊断构建器
    pub fn new(
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: Category::Structure,
            code,
            message: message.into(),
            source_file: None,
            span: Span::dummy(),
            suggestions: Vec::new(),
        }
    }

    /// 设置类别
    #[inline]
    pub fn category(
        mut self,
        category: Category,
    ) -> Self {
        self.category = category;
        self
    }

    /// 设置位置
    #[inline]
    pub fn at(
        mut self,
        source_file: impl Into<String>,
        span: Span,
    ) -> Self {
        self.source_file = Some(source_file.into());
        self.span = span;
        self
    }

    /// 只设置源文件（模块级位置）
    #[inline]
    pub fn in_file(
        mut self,
        source_file: impl Into<String>,
    ) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// 添加修复建议
    pub fn suggest(
        mut self,
        suggestion: impl Into<String>,
    ) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// 构建 Diagnostic
    pub fn build(self) -> Diagnostic {
        Diagnostic {
            severity: self.severity,
            category: self.category,
            code: self.code.to_string(),
            message: self.message,
            source_file: self.source_file,
            line: self.span.start.line,
            column: self.span.start.column,
            suggestions: self.suggestions,
        }
    }
}
