//! 文本诊断渲染器
//!
//! 输出形如：
//!
//! ```text
//! error[C0004]: expression is not const-evaluable: ...
//!   --> 3:7
//!   = help: const function bodies may only use const-safe operations
//! ```

use super::DiagnosticEmitter;
use crate::util::diagnostic::error::Diagnostic;

/// 渲染器配置
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// 是否显示帮助信息
    pub show_help: bool,
    /// 是否显示位置行
    pub show_location: bool,
    /// 可选的文件名前缀（`file:line:col`）
    pub file_name: Option<String>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            show_help: true,
            show_location: true,
            file_name: None,
        }
    }
}

/// 文本诊断渲染器
#[derive(Debug, Clone, Default)]
pub struct TextEmitter {
    config: EmitterConfig,
}

impl TextEmitter {
    /// 创建新的文本渲染器
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用自定义配置创建渲染器
    pub fn with_config(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// 渲染单个诊断
    pub fn render(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        let mut out = format!("{}[{}]: {}\n", diagnostic.severity, diagnostic.code, diagnostic.message);

        if self.config.show_location {
            if let Some(span) = diagnostic.span {
                match &self.config.file_name {
                    Some(file) => out.push_str(&format!("  --> {}:{}\n", file, span.start)),
                    None => out.push_str(&format!("  --> {}\n", span.start)),
                }
            }
        }

        if self.config.show_help && !diagnostic.help.is_empty() {
            out.push_str(&format!("  = help: {}\n", diagnostic.help));
        }

        out
    }
}

impl DiagnosticEmitter for TextEmitter {
    fn emit(
        &self,
        diagnostic: &Diagnostic,
    ) -> String {
        self.render(diagnostic)
    }
}
