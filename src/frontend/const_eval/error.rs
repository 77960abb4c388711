//! Const求值错误定义
//!
//! 所有错误都是编译期诊断，不会变成输出程序中的运行时异常。
//! 除 `InternalConsistencyFault` 外均可在整个程序层面恢复。

use thiserror::Error;

/// Const求值结果
pub type ConstEvalResult<T> = Result<T, ConstEvalError>;

/// Const求值错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstEvalError {
    /// 调用目标无法静态解析为唯一的const函数
    #[error("call to '{target}' is not a static invocation: {reason}")]
    NotStaticInvocation { target: String, reason: String },

    /// 非嵌套调用点的参数不是已解析的常量
    #[error("argument {index} of '{target}' is not a constant: {reason}")]
    NonConstArgument {
        target: String,
        index: usize,
        reason: String,
    },

    /// 引用的const函数/变量不存在或未声明为const
    #[error("unresolved const target '{name}': {reason}")]
    UnresolvedTarget { name: String, reason: String },

    /// 函数体包含const安全子集之外的操作
    #[error("expression is not const-evaluable: {reason}")]
    NotConstEvaluable { reason: String },

    /// 超出步数预算或调用深度
    #[error("evaluation of '{function}' did not terminate within {limit} {unit}")]
    NonTerminating {
        function: String,
        limit: usize,
        unit: &'static str,
    },

    /// 求值本身会抛出错误
    #[error("constant evaluation failed: {message}")]
    RuntimeFault { message: String },

    /// 参数数量不匹配
    #[error("'{function}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    /// 引擎自身的不变式被破坏
    #[error("internal consistency fault: {message}")]
    InternalConsistencyFault { message: String },
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotStaticInvocation,
    NonConstArgument,
    UnresolvedTarget,
    NotConstEvaluable,
    NonTerminating,
    RuntimeFault,
    ArityMismatch,
    InternalConsistencyFault,
}

impl ErrorKind {
    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotStaticInvocation => "C0001",
            ErrorKind::NonConstArgument => "C0002",
            ErrorKind::UnresolvedTarget => "C0003",
            ErrorKind::NotConstEvaluable => "C0004",
            ErrorKind::NonTerminating => "C0005",
            ErrorKind::RuntimeFault => "C0006",
            ErrorKind::ArityMismatch => "C0007",
            ErrorKind::InternalConsistencyFault => "C0008",
        }
    }

    /// 是否必须立即中止编译
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::InternalConsistencyFault)
    }

    /// 帮助信息
    pub fn help(&self) -> &'static str {
        match self {
            ErrorKind::NotStaticInvocation => {
                "const functions must be called directly by name; instance methods, dynamic calls and tear-offs are not allowed"
            }
            ErrorKind::NonConstArgument => "pass only constant values and resolved types to a const function",
            ErrorKind::UnresolvedTarget => "declare the referenced function or variable with the const qualifier",
            ErrorKind::NotConstEvaluable => "const function bodies may only use const-safe operations",
            ErrorKind::NonTerminating => "make sure every loop in the const function terminates",
            ErrorKind::RuntimeFault => "the constant expression would throw when evaluated",
            ErrorKind::ArityMismatch => "check the number of arguments passed to the const function",
            ErrorKind::InternalConsistencyFault => "this is a bug in the constant evaluation engine",
        }
    }
}

impl ConstEvalError {
    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConstEvalError::NotStaticInvocation { .. } => ErrorKind::NotStaticInvocation,
            ConstEvalError::NonConstArgument { .. } => ErrorKind::NonConstArgument,
            ConstEvalError::UnresolvedTarget { .. } => ErrorKind::UnresolvedTarget,
            ConstEvalError::NotConstEvaluable { .. } => ErrorKind::NotConstEvaluable,
            ConstEvalError::NonTerminating { .. } => ErrorKind::NonTerminating,
            ConstEvalError::RuntimeFault { .. } => ErrorKind::RuntimeFault,
            ConstEvalError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            ConstEvalError::InternalConsistencyFault { .. } => ErrorKind::InternalConsistencyFault,
        }
    }

    /// 是否致命
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub(crate) fn not_const(reason: impl Into<String>) -> Self {
        ConstEvalError::NotConstEvaluable {
            reason: reason.into(),
        }
    }

    pub(crate) fn fault(message: impl Into<String>) -> Self {
        ConstEvalError::RuntimeFault {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ConstEvalError::InternalConsistencyFault {
            message: message.into(),
        }
    }

    pub(crate) fn unresolved(
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConstEvalError::UnresolvedTarget {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let kinds = [
            ErrorKind::NotStaticInvocation,
            ErrorKind::NonConstArgument,
            ErrorKind::UnresolvedTarget,
            ErrorKind::NotConstEvaluable,
            ErrorKind::NonTerminating,
            ErrorKind::RuntimeFault,
            ErrorKind::ArityMismatch,
            ErrorKind::InternalConsistencyFault,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_only_internal_fault_is_fatal() {
        assert!(ConstEvalError::internal("dangling").is_fatal());
        assert!(!ConstEvalError::fault("boom").is_fatal());
        assert!(!ConstEvalError::not_const("x").is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ConstEvalError::NonTerminating {
            function: "spin".to_string(),
            limit: 10,
            unit: "steps",
        };
        assert_eq!(err.to_string(), "evaluation of 'spin' did not terminate within 10 steps");
        assert_eq!(err.kind().code(), "C0005");
    }
}
