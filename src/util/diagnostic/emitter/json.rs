//! JSON 诊断渲染器
//!
//! 每个诊断一行 JSON，位置采用 LSP 风格的 0 基行列。

use serde::Serialize;

use super::DiagnosticEmitter;
use crate::util::diagnostic::error::{Diagnostic, Severity};

/// LSP 位置
#[derive(Debug, Clone, Serialize)]
pub struct LspPosition {
    pub line: usize,
    pub character: usize,
}

/// LSP 位置范围
#[derive(Debug, Clone, Serialize)]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonDiagnostic<'a> {
    severity: u8,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    help: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<LspRange>,
}

/// JSON 诊断渲染器
#[derive(Debug, Clone, Default)]
pub struct JsonEmitter;

impl JsonEmitter {
    pub fn new() -> Self {
        JsonEmitter
    }

    fn lsp_severity(severity: Severity) -> u8 {
        match severity {
            Severity::Error => 1,
        }
    }
}

impl DiagnosticEmitter for JsonEmitter {
    fn emit(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        let range = diagnostic.span.map(|span| LspRange {
            start: LspPosition {
                line: span.start.line.saturating_sub(1),
                character: span.start.column.saturating_sub(1),
            },
            end: LspPosition {
                line: span.end.line.saturating_sub(1),
                character: span.end.column.saturating_sub(1),
            },
        });
        let payload = JsonDiagnostic {
            severity: Self::lsp_severity(diagnostic.severity),
            code: &diagnostic.code,
            message: &diagnostic.message,
            help: &diagnostic.help,
            range,
        };
        serde_json::to_string(&payload).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
