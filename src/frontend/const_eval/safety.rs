//! Const安全检查
//!
//! 在求值之前静态遍历const函数体（包括永远不会执行的分支），
//! 拒绝const安全子集之外的操作，并收集函数体直接依赖的const函数和const变量。

use hashbrown::HashSet;
use indexmap::IndexSet;

use super::const_fn::{is_known_type, ConstFunctionDef, ConstNode, ConstVarDef, Program, ProgramModel};
use super::error::{ConstEvalError, ConstEvalResult};
use super::expr::{Callee, ConstExpr, Reflection, Stmt, TypeExpr};

/// 函数体直接依赖的const节点（按首次出现顺序）
pub type Dependencies = IndexSet<ConstNode>;

/// 检查const函数体
pub fn check_function(
    def: &ConstFunctionDef,
    program: &Program,
    model: &dyn ProgramModel,
) -> ConstEvalResult<Dependencies> {
    let mut checker = SafetyChecker::new(def.qualified_name(), program, model);
    checker.type_params = def.type_params().map(str::to_string).collect();
    checker.scopes[0] = def.value_params().map(str::to_string).collect();
    checker.expr(&def.body)?;
    Ok(checker.deps)
}

/// 检查const变量的初始化表达式
pub fn check_variable(
    def: &ConstVarDef,
    program: &Program,
    model: &dyn ProgramModel,
) -> ConstEvalResult<Dependencies> {
    let mut checker = SafetyChecker::new(def.name.clone(), program, model);
    checker.expr(&def.init)?;
    Ok(checker.deps)
}

struct SafetyChecker<'p> {
    owner: String,
    program: &'p Program,
    model: &'p dyn ProgramModel,
    type_params: Vec<String>,
    /// scopes[0] 为形参，不可赋值
    scopes: Vec<HashSet<String>>,
    loop_depth: usize,
    deps: Dependencies,
}

impl<'p> SafetyChecker<'p> {
    fn new(
        owner: String,
        program: &'p Program,
        model: &'p dyn ProgramModel,
    ) -> Self {
        SafetyChecker {
            owner,
            program,
            model,
            type_params: Vec::new(),
            scopes: vec![HashSet::new()],
            loop_depth: 0,
            deps: IndexSet::new(),
        }
    }

    fn scope_of(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.scopes.iter().rposition(|scope| scope.contains(name))
    }

    fn declare(
        &mut self,
        name: &str,
    ) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ConstEvalResult<T>,
    ) -> ConstEvalResult<T> {
        self.scopes.push(HashSet::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn reference(
        &mut self,
        name: &str,
    ) -> ConstEvalResult<()> {
        if self.scope_of(name).is_some() || self.type_params.iter().any(|t| t == name) {
            return Ok(());
        }
        if self.program.const_var(name).is_some() {
            self.deps.insert(ConstNode::Variable(name.to_string()));
            return Ok(());
        }
        if self.program.is_plain_var(name) {
            return Err(ConstEvalError::not_const(format!(
                "'{}' reads non-const variable '{}'",
                self.owner, name
            )));
        }
        if self.program.const_fn(name).is_some() || self.program.is_plain_fn(name) {
            return Err(ConstEvalError::NotStaticInvocation {
                target: name.to_string(),
                reason: "functions cannot be used as values".to_string(),
            });
        }
        Err(ConstEvalError::unresolved(name, "no local, parameter or const variable with this name"))
    }

    fn assign(
        &mut self,
        name: &str,
    ) -> ConstEvalResult<()> {
        match self.scope_of(name) {
            Some(0) => Err(ConstEvalError::not_const(format!(
                "'{}' assigns to parameter '{}'",
                self.owner, name
            ))),
            Some(_) => Ok(()),
            None if self.program.const_var(name).is_some() => Err(ConstEvalError::not_const(format!(
                "'{}' assigns to const variable '{}'",
                self.owner, name
            ))),
            None if self.program.is_plain_var(name) => Err(ConstEvalError::not_const(format!(
                "'{}' writes non-const variable '{}'",
                self.owner, name
            ))),
            None => Err(ConstEvalError::unresolved(name, "assignment to an undeclared variable")),
        }
    }

    fn ty(
        &mut self,
        ty: &TypeExpr,
    ) -> ConstEvalResult<()> {
        match ty {
            TypeExpr::Named { name, args } => {
                if !is_known_type(self.model, name) {
                    return Err(ConstEvalError::unresolved(name.as_str(), "no such type"));
                }
                args.iter().try_for_each(|arg| self.ty(arg))
            }
            TypeExpr::Param(name) => {
                if self.type_params.iter().any(|t| t == name) {
                    Ok(())
                } else {
                    Err(ConstEvalError::unresolved(
                        name.as_str(),
                        format!("not a type parameter of '{}'", self.owner),
                    ))
                }
            }
        }
    }

    fn call(
        &mut self,
        callee: &Callee,
        type_args: &[TypeExpr],
        args: &[ConstExpr],
    ) -> ConstEvalResult<()> {
        let name = match callee {
            Callee::Function(name) => name,
            Callee::Method { name, .. } => {
                return Err(ConstEvalError::NotStaticInvocation {
                    target: name.clone(),
                    reason: "instance methods cannot be const".to_string(),
                });
            }
        };

        match self.program.const_fn(name) {
            Some(def) => {
                if def.arity() != args.len() {
                    return Err(ConstEvalError::ArityMismatch {
                        function: name.clone(),
                        expected: def.arity(),
                        found: args.len(),
                    });
                }
                if def.type_arity() != type_args.len() {
                    return Err(ConstEvalError::ArityMismatch {
                        function: name.clone(),
                        expected: def.type_arity(),
                        found: type_args.len(),
                    });
                }
                self.deps.insert(ConstNode::Function(name.clone()));
            }
            None if self.program.is_plain_fn(name) => {
                return Err(ConstEvalError::not_const(format!(
                    "'{}' calls non-const function '{}'",
                    self.owner, name
                )));
            }
            None => return Err(ConstEvalError::unresolved(name.as_str(), "no such const function")),
        }

        type_args.iter().try_for_each(|t| self.ty(t))?;
        args.iter().try_for_each(|a| self.expr(a))
    }

    fn expr(
        &mut self,
        expr: &ConstExpr,
    ) -> ConstEvalResult<()> {
        match expr {
            ConstExpr::Lit(_) => Ok(()),
            ConstExpr::Ref(name) => self.reference(name),
            ConstExpr::Unary { expr, .. } | ConstExpr::Throw(expr) => self.expr(expr),
            ConstExpr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            ConstExpr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition)?;
                self.expr(then_branch)?;
                self.expr(else_branch)
            }
            ConstExpr::Block { stmts, result } => self.scoped(|c| {
                c.stmts(stmts)?;
                c.expr(result)
            }),
            ConstExpr::List(items) => items.iter().try_for_each(|item| self.expr(item)),
            ConstExpr::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                self.expr(k)?;
                self.expr(v)
            }),
            ConstExpr::Object { class, fields } => {
                if self.model.type_declaration(class).is_none() {
                    return Err(ConstEvalError::unresolved(class.as_str(), "no such class"));
                }
                fields.iter().try_for_each(|(_, value)| self.expr(value))
            }
            ConstExpr::ListFor {
                var,
                iterable,
                filter,
                element,
            } => {
                self.expr(iterable)?;
                self.scoped(|c| {
                    c.declare(var);
                    if let Some(filter) = filter {
                        c.expr(filter)?;
                    }
                    c.expr(element)
                })
            }
            ConstExpr::Range { start, end } => {
                self.expr(start)?;
                self.expr(end)
            }
            ConstExpr::Index { target, index } => {
                self.expr(target)?;
                self.expr(index)
            }
            ConstExpr::Field { target, .. } => self.expr(target),
            ConstExpr::Type(ty) => self.ty(ty),
            ConstExpr::Reflect(query) => match query {
                Reflection::FieldNames(ty) | Reflection::FieldTypes(ty) | Reflection::TypeName(ty) => {
                    self.ty(ty)
                }
            },
            ConstExpr::Call {
                callee,
                type_args,
                args,
            } => self.call(callee, type_args, args),
            ConstExpr::TearOff(name) => Err(ConstEvalError::NotStaticInvocation {
                target: name.clone(),
                reason: "tear-offs are not static invocations".to_string(),
            }),
        }
    }

    fn stmts(
        &mut self,
        stmts: &[Stmt],
    ) -> ConstEvalResult<()> {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(
        &mut self,
        stmt: &Stmt,
    ) -> ConstEvalResult<()> {
        match stmt {
            Stmt::Let { name, value } => {
                self.expr(value)?;
                self.declare(name);
                Ok(())
            }
            Stmt::Assign { name, value } => {
                self.assign(name)?;
                self.expr(value)
            }
            Stmt::Expr(expr) | Stmt::Return(expr) => self.expr(expr),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition)?;
                self.scoped(|c| c.stmts(then_body))?;
                self.scoped(|c| c.stmts(else_body))
            }
            Stmt::While { condition, body } => {
                self.expr(condition)?;
                self.in_loop(|c| c.stmts(body))
            }
            Stmt::For { var, iterable, body } => {
                self.expr(iterable)?;
                self.in_loop(|c| {
                    c.declare(var);
                    c.stmts(body)
                })
            }
            Stmt::Break | Stmt::Continue => {
                if self.loop_depth == 0 {
                    Err(ConstEvalError::not_const(format!(
                        "'{}' uses break or continue outside of a loop",
                        self.owner
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn in_loop(
        &mut self,
        f: impl FnOnce(&mut Self) -> ConstEvalResult<()>,
    ) -> ConstEvalResult<()> {
        self.loop_depth += 1;
        let result = self.scoped(f);
        self.loop_depth -= 1;
        result
    }
}
