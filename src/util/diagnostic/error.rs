//! 诊断数据结构
//!
//! `message` 和 `help` 在构造时已渲染完成，渲染器只负责排版。

use serde::Serialize;

use crate::util::span::Span;

/// 诊断严重级别；常量求值失败只产生错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

impl Severity {
    /// 检查是否为错误级别
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
        }
    }
}

/// 诊断信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// 严重级别
    pub severity: Severity,
    /// 错误码
    pub code: String,
    /// 完整消息
    pub message: String,
    /// 帮助信息（可为空）
    pub help: String,
    /// 位置信息
    pub span: Option<Span>,
}

impl Diagnostic {
    /// 创建错误诊断
    pub fn error(
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            help: String::new(),
            span: None,
        }
    }

    /// 设置帮助信息
    pub fn with_help(
        mut self,
        help: impl Into<String>,
    ) -> Self {
        self.help = help.into();
        self
    }

    /// 设置位置（哑位置视为无位置）
    pub fn at(
        mut self,
        span: Span,
    ) -> Self {
        self.span = if span.is_dummy() { None } else { Some(span) };
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
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
