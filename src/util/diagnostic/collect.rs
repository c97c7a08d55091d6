//! 诊断收集
//!
//! [`DiagnosticSink`] 是各编译阶段上报问题的唯一出口。
//! 阶段本身从不 panic 或把未处理的失败抛过自身边界。

use super::error::{Diagnostic, Severity};

/// 诊断接收端
pub trait DiagnosticSink {
    /// 上报一条诊断
    fn report(
        &mut self,
        diagnostic: Diagnostic,
    );
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(
        &mut self,
        diagnostic: Diagnostic,
    ) {
        (**self).report(diagnostic)
    }
}

/// 错误收集器
///
/// 按上报顺序保存全部诊断。
#[derive(Debug, Default, Clone)]
pub struct ErrorCollector {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorCollector {
    /// 创建新的收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有诊断
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// 指定级别的诊断
    pub fn with_severity(
        &self,
        severity: Severity,
    ) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    /// 指定错误码的诊断
    pub fn with_code<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    /// 是否有错误级别的诊断
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// 诊断数量
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 取出所有诊断
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl DiagnosticSink for ErrorCollector {
    fn report(
        &mut self,
        diagnostic: Diagnostic,
    ) {
        self.diagnostics.push(diagnostic);
    }
}

/// 将诊断直接写入 tracing 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(
        &mut self,
        diagnostic: Diagnostic,
    ) {
        let location = diagnostic.location();
        match diagnostic.severity {
            Severity::Info => {
                tracing::info!(code = %diagnostic.code, %location, "{}", diagnostic.message)
            }
            Severity::Warning => {
                tracing::warn!(code = %diagnostic.code, %location, "{}", diagnostic.message)
            }
            Severity::Error | Severity::Fatal => {
                tracing::error!(code = %diagnostic.code, %location, "{}", diagnostic.message)
            }
        }
    }
}
