//! 统一诊断系统
//!
//! # 模块结构
//!
//! - [`error`] - 诊断数据结构 (Diagnostic, Severity)
//! - [`conversion`] - 求值错误到诊断的转换
//! - [`emitter`] - 文本与 JSON 渲染器
//!
//! # 示例
//!
//! ```ignore
//! use consteval::util::diagnostic::{Diagnostic, TextEmitter};
//!
//! let diagnostic = Diagnostic::from_const_error(&err, site.span);
//! println!("{}", TextEmitter::new().render(&diagnostic));
//! ```

pub mod conversion;
pub mod emitter;
pub mod error;

// 重新导出
pub use emitter::{DiagnosticEmitter, EmitterConfig, JsonEmitter, TextEmitter};
pub use error::{Diagnostic, Severity};
