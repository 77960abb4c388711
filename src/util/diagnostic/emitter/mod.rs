//! 诊断输出模块

pub mod json;
pub mod text;

pub use json::JsonEmitter;
pub use text::{EmitterConfig, TextEmitter};

use super::error::Diagnostic;

/// 诊断渲染器 trait
pub trait DiagnosticEmitter {
    fn emit(
        &self,
        diagnostic: &Diagnostic,
    ) -> String;

    /// 渲染多个诊断，彼此以空行分隔
    fn emit_all(
        &self,
        diagnostics: &[Diagnostic],
    ) -> String {
        diagnostics
            .iter()
            .map(|d| self.emit(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
