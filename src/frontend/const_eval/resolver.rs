//! 调用解析器
//!
//! 校验调用点（静态目标、全部实参为常量、参数数量），
//! 以 `(函数, 实参槽位)` 为键记忆化求值，并驱动求值器。
//! 函数体内的嵌套调用走同一套校验与缓存。

use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use super::const_evaluator::Evaluator;
use super::const_fn::{ConstFunctionDef, ConstNode, Param};
use super::context::EvalContext;
use super::error::{ConstEvalError, ConstEvalResult};
use super::memo::MemoKey;
use super::site::{Argument, CallSite, CallTarget};
use super::value::{Operand, Value, ValueId};

/// 嵌套调用链
#[derive(Debug, Clone, Copy)]
pub struct CallChain<'a> {
    /// 当前求值的函数或变量
    pub function: &'a str,
    pub parent: Option<&'a CallChain<'a>>,
    /// 根调用为 0
    pub depth: usize,
}

impl<'a> CallChain<'a> {
    /// 链上是否已有该名称
    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        let mut current = Some(self);
        while let Some(link) = current {
            if link.function == name {
                return true;
            }
            current = link.parent;
        }
        false
    }
}

/// 调用解析器
#[derive(Clone, Copy)]
pub struct CallResolver<'ctx> {
    ctx: &'ctx EvalContext,
}

impl<'ctx> CallResolver<'ctx> {
    pub fn new(ctx: &'ctx EvalContext) -> Self {
        CallResolver { ctx }
    }

    pub fn context(&self) -> &'ctx EvalContext {
        self.ctx
    }

    /// 解析一个非嵌套调用点
    pub fn resolve(
        &self,
        site: &CallSite,
    ) -> ConstEvalResult<ValueId> {
        let name = match &site.target {
            CallTarget::Function(name) => name,
            other => {
                let reason = match other {
                    CallTarget::Instance { .. } => "instance methods cannot be const",
                    CallTarget::Dynamic(_) => "dynamically dispatched calls cannot be resolved statically",
                    _ => "a tear-off is a function value, not an invocation",
                };
                return Err(ConstEvalError::NotStaticInvocation {
                    target: other.display_name(),
                    reason: reason.to_string(),
                });
            }
        };

        let program = self.ctx.program();
        let def = match program.const_fn(name) {
            Some(def) => def,
            None if program.is_plain_fn(name) => {
                return Err(ConstEvalError::unresolved(name.as_str(), "declared without the const qualifier"));
            }
            None => return Err(ConstEvalError::unresolved(name.as_str(), "no such const function")),
        };

        let type_args = site
            .type_args
            .iter()
            .enumerate()
            .map(|(index, arg)| self.type_argument(name, index, arg))
            .collect::<ConstEvalResult<SmallVec<[ValueId; 4]>>>()?;
        let args = site
            .args
            .iter()
            .enumerate()
            .map(|(index, arg)| self.value_argument(name, index, arg))
            .collect::<ConstEvalResult<SmallVec<[Operand; 4]>>>()?;

        debug!("resolve {}({} type, {} value argument(s))", name, type_args.len(), args.len());
        self.invoke(def, &type_args, &args, None)
    }

    /// 以已解析的实参求值const函数（记忆化）
    pub fn evaluate(
        &self,
        def: &Arc<ConstFunctionDef>,
        type_args: &[ValueId],
        args: &[Operand],
    ) -> ConstEvalResult<ValueId> {
        self.invoke(def, type_args, args, None)
    }

    fn value_argument(
        &self,
        target: &str,
        index: usize,
        arg: &Argument,
    ) -> ConstEvalResult<Operand> {
        match arg {
            Argument::Const(id) => self.ctx.store().operand_of(*id),
            Argument::NonConst(description) => Err(ConstEvalError::NonConstArgument {
                target: target.to_string(),
                index,
                reason: format!("'{}' is not a constant expression", description),
            }),
            Argument::TypeParameter(name) => Err(ConstEvalError::NonConstArgument {
                target: target.to_string(),
                index,
                reason: format!("type parameter '{}' is unresolved in a non-const context", name),
            }),
        }
    }

    fn type_argument(
        &self,
        target: &str,
        index: usize,
        arg: &Argument,
    ) -> ConstEvalResult<ValueId> {
        match arg {
            Argument::Const(id) => match self.ctx.store().get(*id)?.as_ref() {
                Value::Type(_) => Ok(*id),
                other => Err(ConstEvalError::NonConstArgument {
                    target: target.to_string(),
                    index,
                    reason: format!("type argument is a {} value, not a type", other.kind_name()),
                }),
            },
            Argument::NonConst(description) => Err(ConstEvalError::NonConstArgument {
                target: target.to_string(),
                index,
                reason: format!("type argument '{}' is not a constant type", description),
            }),
            Argument::TypeParameter(name) => Err(ConstEvalError::NonConstArgument {
                target: target.to_string(),
                index,
                reason: format!("type parameter '{}' is unresolved in a non-const context", name),
            }),
        }
    }

    /// 嵌套深度已由调用图高度静态限定，超出说明依赖收集有遗漏
    fn depth_of(
        &self,
        function: &str,
        parent: Option<&CallChain<'_>>,
    ) -> ConstEvalResult<usize> {
        let depth = parent.map_or(0, |p| p.depth + 1);
        if depth >= self.ctx.config().max_call_depth || parent.is_some_and(|p| p.contains(function)) {
            return Err(ConstEvalError::internal(format!(
                "'{}' reached at depth {} outside the static call graph",
                function, depth
            )));
        }
        Ok(depth)
    }

    /// 调用const函数：静态检查、参数数量，然后查缓存或求值
    pub(crate) fn invoke(
        &self,
        def: &Arc<ConstFunctionDef>,
        type_args: &[ValueId],
        args: &[Operand],
        parent: Option<&CallChain<'_>>,
    ) -> ConstEvalResult<ValueId> {
        let name = def.qualified_name();
        self.ctx.verdict(&ConstNode::Function(name.clone()))?;

        if def.arity() != args.len() {
            return Err(ConstEvalError::ArityMismatch {
                function: name,
                expected: def.arity(),
                found: args.len(),
            });
        }
        if def.type_arity() != type_args.len() {
            return Err(ConstEvalError::ArityMismatch {
                function: name,
                expected: def.type_arity(),
                found: type_args.len(),
            });
        }

        let depth = self.depth_of(&name, parent)?;
        let key = MemoKey::call(&name, type_args, args);
        self.ctx.memo().get_or_evaluate(key, || {
            let chain = CallChain {
                function: &name,
                parent,
                depth,
            };
            let params = bind(def, type_args, args);
            Evaluator::new(self, chain, params).run(&def.body)
        })
    }

    /// 读取const变量（首次读取时求值初始化表达式）
    pub(crate) fn read_variable(
        &self,
        name: &str,
        parent: Option<&CallChain<'_>>,
    ) -> ConstEvalResult<ValueId> {
        self.ctx.verdict(&ConstNode::Variable(name.to_string()))?;
        let def = self
            .ctx
            .program()
            .const_var(name)
            .ok_or_else(|| ConstEvalError::unresolved(name, "no such const variable"))?;
        let depth = self.depth_of(name, parent)?;
        self.ctx.memo().get_or_evaluate(MemoKey::Variable(name.to_string()), || {
            let chain = CallChain {
                function: name,
                parent,
                depth,
            };
            Evaluator::new(self, chain, HashMap::new()).run(&def.init)
        })
    }
}

/// 按声明顺序把实参绑定到形参
fn bind(
    def: &ConstFunctionDef,
    type_args: &[ValueId],
    args: &[Operand],
) -> HashMap<String, Operand> {
    let mut types = type_args.iter();
    let mut values = args.iter();
    let mut bound = HashMap::with_capacity(def.params.len());
    for param in &def.params {
        let slot = match param {
            Param::Type(_) => types.next().map(|t| Operand::Ref(*t)),
            Param::Value(_) => values.next().copied(),
        };
        if let Some(slot) = slot {
            bound.insert(param.name().to_string(), slot);
        }
    }
    bound
}
