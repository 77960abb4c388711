//! 调用点定义
//!
//! 外部编译管线发现的一次const函数静态调用。

use std::fmt;

use serde::Serialize;

use super::value::ValueId;
use crate::util::span::Span;

/// 调用点标识（由引擎在提交时分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SiteId(pub u32);

impl fmt::Display for SiteId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "site{}", self.0)
    }
}

/// 调用目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// 按名称调用的函数
    Function(String),
    /// 实例方法
    Instance { receiver: String, method: String },
    /// 动态派发（例如通过函数值调用）
    Dynamic(String),
    /// 函数撕取（把函数当作值）
    TearOff(String),
}

impl CallTarget {
    /// 用于诊断的名称
    pub fn display_name(&self) -> String {
        match self {
            CallTarget::Function(name) | CallTarget::TearOff(name) => name.clone(),
            CallTarget::Instance { receiver, method } => format!("{}.{}", receiver, method),
            CallTarget::Dynamic(description) => description.clone(),
        }
    }
}

/// 调用点实参
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// 已解析的常量
    Const(ValueId),
    /// 运行时表达式（附源码描述）
    NonConst(String),
    /// 非const上下文中的未解析类型参数
    TypeParameter(String),
}

/// 调用点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// 调用目标
    pub target: CallTarget,
    /// 类型实参
    pub type_args: Vec<Argument>,
    /// 值实参
    pub args: Vec<Argument>,
    /// 源码位置
    pub span: Span,
}

impl CallSite {
    /// 以常量实参调用函数
    pub fn new(
        function: impl Into<String>,
        args: Vec<ValueId>,
    ) -> Self {
        CallSite {
            target: CallTarget::Function(function.into()),
            type_args: Vec::new(),
            args: args.into_iter().map(Argument::Const).collect(),
            span: Span::default(),
        }
    }

    /// 任意目标与实参
    pub fn with_target(
        target: CallTarget,
        args: Vec<Argument>,
    ) -> Self {
        CallSite {
            target,
            type_args: Vec::new(),
            args,
            span: Span::default(),
        }
    }

    /// 设置类型实参
    pub fn with_type_args(
        mut self,
        type_args: Vec<Argument>,
    ) -> Self {
        self.type_args = type_args;
        self
    }

    /// 设置位置
    pub fn at(
        mut self,
        span: Span,
    ) -> Self {
        self.span = span;
        self
    }
}
