//! 错误转换
//!
//! 把求值错误转换为带错误码与位置的诊断。

use super::error::Diagnostic;
use crate::frontend::const_eval::error::ConstEvalError;
use crate::util::span::Span;

impl Diagnostic {
    /// 由求值错误和调用点位置构造诊断
    pub fn from_const_error(
        err: &ConstEvalError,
        span: Span,
    ) -> Self {
        let kind = err.kind();
        Diagnostic::error(kind.code(), err.to_string())
            .with_help(kind.help())
            .at(span)
    }
}

impl From<&ConstEvalError> for Diagnostic {
    fn from(err: &ConstEvalError) -> Self {
        Diagnostic::from_const_error(err, Span::dummy())
    }
}
