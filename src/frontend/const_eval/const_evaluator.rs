//! Const求值器
//!
//! 在const安全规则下执行const函数体：
//! - 每个被求值的表达式和每次循环迭代消耗一步，超出预算报告 `NonTerminating`
//! - 嵌套const调用经由调用解析器（记忆化）
//! - 临时值保存在求值器本地，结果与嵌套调用实参逃逸时才驻留并记录使用边
//! - 反射查询只读访问程序模型，只有派生出的常量进入常量表

use hashbrown::HashMap;
use tracing::trace;

use super::const_fn::{is_known_type, BUILTIN_TYPES};
use super::error::{ConstEvalError, ConstEvalResult};
use super::expr::{BinOp, Callee, ConstExpr, Literal, Reflection, Stmt, TypeExpr, UnOp};
use super::local::{Local, Node, Shape, Temp};
use super::resolver::{CallChain, CallResolver};
use super::value::{Immediate, Operand, ValueId};

/// 求值中断：提前返回、循环控制或错误
#[derive(Debug)]
enum Interrupt {
    Return(Local),
    Break,
    Continue,
    Fail(ConstEvalError),
}

impl From<ConstEvalError> for Interrupt {
    fn from(err: ConstEvalError) -> Self {
        Interrupt::Fail(err)
    }
}

type EvalResult<T> = Result<T, Interrupt>;

/// 数值视图
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Double(f64),
}

impl Num {
    fn of(local: &Local) -> Option<Num> {
        match local.as_imm()? {
            Immediate::Int(n) => Some(Num::Int(n)),
            Immediate::Double(d) => Some(Num::Double(d.get())),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Double(d) => d,
        }
    }
}

/// 单次函数体求值
pub struct Evaluator<'a> {
    resolver: &'a CallResolver<'a>,
    chain: CallChain<'a>,
    /// 形参（值形参与类型形参）
    params: HashMap<String, Operand>,
    /// 局部作用域栈
    scopes: Vec<HashMap<String, Local>>,
    steps: usize,
    budget: usize,
}

impl<'a> Evaluator<'a> {
    /// 创建求值器
    pub fn new(
        resolver: &'a CallResolver<'a>,
        chain: CallChain<'a>,
        params: HashMap<String, Operand>,
    ) -> Self {
        let budget = resolver.context().config().step_budget;
        Evaluator {
            resolver,
            chain,
            params,
            scopes: vec![HashMap::new()],
            steps: 0,
            budget,
        }
    }

    /// 执行函数体并驻留结果
    pub fn run(
        mut self,
        body: &ConstExpr,
    ) -> ConstEvalResult<ValueId> {
        let result = match self.eval(body) {
            Ok(value) | Err(Interrupt::Return(value)) => value,
            Err(Interrupt::Fail(err)) => return Err(err),
            Err(Interrupt::Break) | Err(Interrupt::Continue) => {
                return Err(ConstEvalError::not_const(format!(
                    "break or continue escaped the body of '{}'",
                    self.chain.function
                )));
            }
        };
        trace!("{} finished in {} step(s)", self.chain.function, self.steps);
        let ctx = self.resolver.context();
        let operand = result.escape(ctx)?;
        ctx.store().intern_operand(operand)
    }

    fn tick(&mut self) -> ConstEvalResult<()> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(ConstEvalError::NonTerminating {
                function: self.chain.function.to_string(),
                limit: self.budget,
                unit: "steps",
            });
        }
        Ok(())
    }

    fn open(
        &self,
        local: &Local,
    ) -> ConstEvalResult<Option<Node>> {
        local.open(self.resolver.context().store())
    }

    fn type_name_of(
        &self,
        local: &Local,
    ) -> String {
        match local {
            Local::Imm(imm) => imm.type_name().to_string(),
            other => match self.open(other) {
                Ok(Some(node)) => node.type_name(),
                _ => "<unknown>".to_string(),
            },
        }
    }

    fn mismatch(
        &self,
        op: &str,
        left: &Local,
        right: Option<&Local>,
    ) -> ConstEvalError {
        match right {
            Some(right) => ConstEvalError::fault(format!(
                "operator '{}' cannot be applied to {} and {}",
                op,
                self.type_name_of(left),
                self.type_name_of(right)
            )),
            None => ConstEvalError::fault(format!(
                "operator '{}' cannot be applied to {}",
                op,
                self.type_name_of(left)
            )),
        }
    }

    /// 用于 throw 与诊断消息的文本形式；顶层字符串不加引号
    fn render(
        &self,
        local: &Local,
    ) -> ConstEvalResult<String> {
        match self.open(local)? {
            Some(node) => match node.shape() {
                Shape::Str(s) => Ok(s.to_string()),
                _ => self.describe(local),
            },
            None => self.describe(local),
        }
    }

    fn describe(
        &self,
        local: &Local,
    ) -> ConstEvalResult<String> {
        let node = match (local, self.open(local)?) {
            (_, Some(node)) => node,
            (Local::Imm(imm), None) => return Ok(imm.to_string()),
            (_, None) => return Err(ConstEvalError::internal("composite value without contents")),
        };
        let join = |items: Vec<String>| items.join(", ");
        Ok(match node.shape() {
            Shape::Imm(imm) => imm.to_string(),
            Shape::Str(s) => format!("{:?}", s),
            Shape::List(items) => {
                let parts = items.iter().map(|i| self.describe(i)).collect::<ConstEvalResult<Vec<_>>>()?;
                format!("[{}]", join(parts))
            }
            Shape::Map(entries) => {
                let mut parts = Vec::with_capacity(entries.len());
                for (k, v) in &entries {
                    parts.push(format!("{}: {}", self.describe(k)?, self.describe(v)?));
                }
                format!("{{{}}}", join(parts))
            }
            Shape::Object { class, fields } => {
                let mut parts = Vec::with_capacity(fields.len());
                for (name, v) in &fields {
                    parts.push(format!("{}: {}", name, self.describe(v)?));
                }
                format!("{}({})", class, join(parts))
            }
            Shape::Type { name, args } if args.is_empty() => name.to_string(),
            Shape::Type { name, args } => {
                let parts = args.iter().map(|a| self.describe(a)).collect::<ConstEvalResult<Vec<_>>>()?;
                format!("{}<{}>", name, join(parts))
            }
        })
    }

    fn with_scope<T>(
        &mut self,
        binding: Option<(&str, Local)>,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let mut scope = HashMap::new();
        if let Some((name, value)) = binding {
            scope.insert(name.to_string(), value);
        }
        self.scopes.push(scope);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn eval_bool(
        &mut self,
        expr: &ConstExpr,
        what: &str,
    ) -> EvalResult<bool> {
        match self.eval(expr)? {
            Local::Imm(Immediate::Bool(b)) => Ok(b),
            other => Err(ConstEvalError::fault(format!(
                "{} must be a bool, found {}",
                what,
                self.type_name_of(&other)
            ))
            .into()),
        }
    }

    fn eval_int(
        &mut self,
        expr: &ConstExpr,
        what: &str,
    ) -> EvalResult<i64> {
        match self.eval(expr)? {
            Local::Imm(Immediate::Int(n)) => Ok(n),
            other => Err(ConstEvalError::fault(format!(
                "{} must be an int, found {}",
                what,
                self.type_name_of(&other)
            ))
            .into()),
        }
    }

    fn eval(
        &mut self,
        expr: &ConstExpr,
    ) -> EvalResult<Local> {
        self.tick()?;
        match expr {
            ConstExpr::Lit(lit) => Ok(literal(lit)),
            ConstExpr::Ref(name) => Ok(self.lookup(name)?),
            ConstExpr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                Ok(self.unary(*op, &value)?)
            }
            ConstExpr::Binary { op: BinOp::And, left, right } => {
                let value = self.eval_bool(left, "left operand of '&&'")?
                    && self.eval_bool(right, "right operand of '&&'")?;
                Ok(Local::bool(value))
            }
            ConstExpr::Binary { op: BinOp::Or, left, right } => {
                let value = self.eval_bool(left, "left operand of '||'")?
                    || self.eval_bool(right, "right operand of '||'")?;
                Ok(Local::bool(value))
            }
            ConstExpr::Binary {
                op: BinOp::IfNull,
                left,
                right,
            } => match self.eval(left)? {
                Local::Imm(Immediate::Null) => self.eval(right),
                value => Ok(value),
            },
            ConstExpr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(self.binary(*op, &l, &r)?)
            }
            ConstExpr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(condition, "condition")? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            ConstExpr::Block { stmts, result } => self.with_scope(None, |e| {
                e.exec_all(stmts)?;
                e.eval(result)
            }),
            ConstExpr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Local::list(values))
            }
            ConstExpr::Map(entries) => self.map_literal(entries),
            ConstExpr::Object { class, fields } => self.construct(class, fields),
            ConstExpr::ListFor {
                var,
                iterable,
                filter,
                element,
            } => {
                let source = self.eval(iterable)?;
                let items = self.iterate(&source)?;
                let mut values = Vec::new();
                for item in items {
                    self.tick()?;
                    let produced = self.with_scope(Some((var.as_str(), item)), |e| {
                        if let Some(filter) = filter {
                            if !e.eval_bool(filter, "comprehension filter")? {
                                return Ok(None);
                            }
                        }
                        e.eval(element).map(Some)
                    })?;
                    values.extend(produced);
                }
                Ok(Local::list(values))
            }
            ConstExpr::Range { start, end } => {
                let start = self.eval_int(start, "range start")?;
                let end = self.eval_int(end, "range end")?;
                let mut values = Vec::new();
                let mut n = start;
                while n < end {
                    self.tick()?;
                    values.push(Local::int(n));
                    n += 1;
                }
                Ok(Local::list(values))
            }
            ConstExpr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(self.index(&target, &index)?)
            }
            ConstExpr::Field { target, name } => {
                let target = self.eval(target)?;
                Ok(self.field(&target, name)?)
            }
            ConstExpr::Type(ty) => Ok(self.eval_type(ty)?),
            ConstExpr::Reflect(query) => Ok(self.reflect(query)?),
            ConstExpr::Throw(message) => {
                let message = self.eval(message)?;
                let text = self.render(&message)?;
                Err(ConstEvalError::fault(format!("'{}' threw: {}", self.chain.function, text)).into())
            }
            ConstExpr::Call {
                callee,
                type_args,
                args,
            } => self.call(callee, type_args, args),
            ConstExpr::TearOff(name) => Err(ConstEvalError::NotStaticInvocation {
                target: name.clone(),
                reason: "tear-offs are not static invocations".to_string(),
            }
            .into()),
        }
    }

    fn exec_all(
        &mut self,
        stmts: &[Stmt],
    ) -> EvalResult<()> {
        stmts.iter().try_for_each(|stmt| self.exec(stmt))
    }

    fn exec(
        &mut self,
        stmt: &Stmt,
    ) -> EvalResult<()> {
        match stmt {
            Stmt::Let { name, value } => {
                let value = self.eval(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
                Ok(())
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                match self.scopes.iter_mut().rev().find_map(|scope| scope.get_mut(name)) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(ConstEvalError::unresolved(name.as_str(), "assignment to an undeclared variable").into()),
                }
            }
            Stmt::Expr(expr) => self.eval(expr).map(drop),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                let body = if self.eval_bool(condition, "condition")? {
                    then_body
                } else {
                    else_body
                };
                self.with_scope(None, |e| e.exec_all(body))
            }
            Stmt::While { condition, body } => {
                loop {
                    self.tick()?;
                    if !self.eval_bool(condition, "loop condition")? {
                        return Ok(());
                    }
                    match self.with_scope(None, |e| e.exec_all(body)) {
                        Ok(()) | Err(Interrupt::Continue) => {}
                        Err(Interrupt::Break) => return Ok(()),
                        Err(other) => return Err(other),
                    }
                }
            }
            Stmt::For { var, iterable, body } => {
                let source = self.eval(iterable)?;
                for item in self.iterate(&source)? {
                    self.tick()?;
                    match self.with_scope(Some((var.as_str(), item)), |e| e.exec_all(body)) {
                        Ok(()) | Err(Interrupt::Continue) => {}
                        Err(Interrupt::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::Break => Err(Interrupt::Break),
            Stmt::Continue => Err(Interrupt::Continue),
            Stmt::Return(expr) => {
                let value = self.eval(expr)?;
                Err(Interrupt::Return(value))
            }
        }
    }

    /// 名称解析：局部变量 → 形参 → const变量
    fn lookup(
        &self,
        name: &str,
    ) -> ConstEvalResult<Local> {
        if let Some(value) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.params.get(name) {
            return Ok(Local::from(*value));
        }

        let program = self.resolver.context().program();
        if program.const_var(name).is_some() {
            let id = self.resolver.read_variable(name, Some(&self.chain))?;
            return self.resolver.context().store().operand_of(id).map(Local::from);
        }
        if program.is_plain_var(name) {
            return Err(ConstEvalError::not_const(format!(
                "'{}' reads non-const variable '{}'",
                self.chain.function, name
            )));
        }
        if program.const_fn(name).is_some() || program.is_plain_fn(name) {
            return Err(ConstEvalError::NotStaticInvocation {
                target: name.to_string(),
                reason: "functions cannot be used as values".to_string(),
            });
        }
        Err(ConstEvalError::unresolved(name, "no local, parameter or const variable with this name"))
    }

    fn unary(
        &self,
        op: UnOp,
        value: &Local,
    ) -> ConstEvalResult<Local> {
        match (op, value.as_imm()) {
            (UnOp::Neg, Some(Immediate::Int(n))) => n
                .checked_neg()
                .map(Local::int)
                .ok_or_else(|| ConstEvalError::fault(format!("integer overflow in -({})", n))),
            (UnOp::Neg, Some(Immediate::Double(d))) => Ok(Local::double(-d.get())),
            (UnOp::Not, Some(Immediate::Bool(b))) => Ok(Local::bool(!b)),
            (UnOp::BitNot, Some(Immediate::Int(n))) => Ok(Local::int(!n)),
            (op, _) => {
                let symbol = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "!",
                    UnOp::BitNot => "~",
                };
                Err(self.mismatch(symbol, value, None))
            }
        }
    }

    /// `==` 语义：数值跨 int/double 比较，其余按结构（与驻留同一性一致）
    fn equals(
        &self,
        left: &Local,
        right: &Local,
    ) -> ConstEvalResult<bool> {
        match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a == b),
            (Some(a), Some(b)) => Ok(a.as_f64() == b.as_f64()),
            _ => self.same(left, right),
        }
    }

    /// 结构相等：驻留后会得到同一个 ValueId
    fn same(
        &self,
        left: &Local,
        right: &Local,
    ) -> ConstEvalResult<bool> {
        match (left, right) {
            (Local::Imm(a), Local::Imm(b)) => return Ok(a == b),
            (Local::Ref(a), Local::Ref(b)) => return Ok(a == b),
            (Local::Imm(_), _) | (_, Local::Imm(_)) => return Ok(false),
            _ => {}
        }
        let (Some(a), Some(b)) = (self.open(left)?, self.open(right)?) else {
            return Ok(false);
        };
        Ok(match (a.shape(), b.shape()) {
            (Shape::Imm(x), Shape::Imm(y)) => x == y,
            (Shape::Str(x), Shape::Str(y)) => x == y,
            (Shape::List(x), Shape::List(y)) => self.all_same(&x, &y)?,
            (Shape::Map(x), Shape::Map(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for ((xk, xv), (yk, yv)) in x.iter().zip(&y) {
                    if !self.same(xk, yk)? || !self.same(xv, yv)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Shape::Object { class: xc, fields: xf }, Shape::Object { class: yc, fields: yf }) => {
                if xc != yc || xf.len() != yf.len() {
                    return Ok(false);
                }
                for ((xn, xv), (yn, yv)) in xf.iter().zip(&yf) {
                    if xn != yn || !self.same(xv, yv)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Shape::Type { name: xn, args: xa }, Shape::Type { name: yn, args: ya }) => {
                xn == yn && self.all_same(&xa, &ya)?
            }
            _ => false,
        })
    }

    fn all_same(
        &self,
        left: &[Local],
        right: &[Local],
    ) -> ConstEvalResult<bool> {
        if left.len() != right.len() {
            return Ok(false);
        }
        for (a, b) in left.iter().zip(right) {
            if !self.same(a, b)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn overflow(
        &self,
        op: BinOp,
        a: i64,
        b: i64,
    ) -> ConstEvalError {
        ConstEvalError::fault(format!("integer overflow in {} {} {}", a, op.symbol(), b))
    }

    fn binary(
        &self,
        op: BinOp,
        left: &Local,
        right: &Local,
    ) -> ConstEvalResult<Local> {
        use Immediate::{Bool, Int};

        match op {
            BinOp::Eq => return Ok(Local::bool(self.equals(left, right)?)),
            BinOp::Ne => return Ok(Local::bool(!self.equals(left, right)?)),
            _ => {}
        }

        if let (Some(Int(a)), Some(Int(b))) = (left.as_imm(), right.as_imm()) {
            let checked = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => return Ok(Local::double(a as f64 / b as f64)),
                BinOp::IntDiv | BinOp::Mod if b == 0 => {
                    return Err(ConstEvalError::fault(format!("integer division by zero in {} {} 0", a, op.symbol())));
                }
                BinOp::IntDiv => a.checked_div(b),
                BinOp::Mod => a.checked_rem_euclid(b),
                BinOp::Lt => return Ok(Local::bool(a < b)),
                BinOp::Le => return Ok(Local::bool(a <= b)),
                BinOp::Gt => return Ok(Local::bool(a > b)),
                BinOp::Ge => return Ok(Local::bool(a >= b)),
                BinOp::BitAnd => Some(a & b),
                BinOp::BitOr => Some(a | b),
                BinOp::BitXor => Some(a ^ b),
                BinOp::Shl | BinOp::Shr => {
                    if !(0..64).contains(&b) {
                        return Err(ConstEvalError::fault(format!("shift amount {} is out of range", b)));
                    }
                    if op == BinOp::Shl {
                        Some(a.wrapping_shl(b as u32))
                    } else {
                        Some(a >> b)
                    }
                }
                _ => return Err(ConstEvalError::internal(format!("operator '{}' reached binary()", op.symbol()))),
            };
            return checked.map(Local::int).ok_or_else(|| self.overflow(op, a, b));
        }

        if let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) {
            let (x, y) = (a.as_f64(), b.as_f64());
            return match op {
                BinOp::Add => Ok(Local::double(x + y)),
                BinOp::Sub => Ok(Local::double(x - y)),
                BinOp::Mul => Ok(Local::double(x * y)),
                BinOp::Div => Ok(Local::double(x / y)),
                BinOp::Mod => Ok(Local::double(x.rem_euclid(y))),
                BinOp::IntDiv => {
                    let q = (x / y).trunc();
                    if !q.is_finite() || q < i64::MIN as f64 || q >= i64::MAX as f64 {
                        Err(ConstEvalError::fault(format!("result of {} ~/ {} is not a representable int", x, y)))
                    } else {
                        Ok(Local::int(q as i64))
                    }
                }
                BinOp::Lt => Ok(Local::bool(x < y)),
                BinOp::Le => Ok(Local::bool(x <= y)),
                BinOp::Gt => Ok(Local::bool(x > y)),
                BinOp::Ge => Ok(Local::bool(x >= y)),
                _ => Err(self.mismatch(op.symbol(), left, Some(right))),
            };
        }

        if let (Some(Bool(a)), Some(Bool(b))) = (left.as_imm(), right.as_imm()) {
            return match op {
                BinOp::BitAnd => Ok(Local::bool(a & b)),
                BinOp::BitOr => Ok(Local::bool(a | b)),
                BinOp::BitXor => Ok(Local::bool(a ^ b)),
                _ => Err(self.mismatch(op.symbol(), left, Some(right))),
            };
        }

        if let (Some(a), Some(b)) = (self.open(left)?, self.open(right)?) {
            match (op, a.shape(), b.shape()) {
                (BinOp::Add, Shape::Str(x), Shape::Str(y)) => {
                    let mut joined = String::with_capacity(x.len() + y.len());
                    joined.push_str(x);
                    joined.push_str(y);
                    return Ok(Local::str(joined));
                }
                (BinOp::Add, Shape::List(mut x), Shape::List(y)) => {
                    x.extend(y);
                    return Ok(Local::list(x));
                }
                (BinOp::Lt, Shape::Str(x), Shape::Str(y)) => return Ok(Local::bool(x < y)),
                (BinOp::Le, Shape::Str(x), Shape::Str(y)) => return Ok(Local::bool(x <= y)),
                (BinOp::Gt, Shape::Str(x), Shape::Str(y)) => return Ok(Local::bool(x > y)),
                (BinOp::Ge, Shape::Str(x), Shape::Str(y)) => return Ok(Local::bool(x >= y)),
                _ => {}
            }
        }

        Err(self.mismatch(op.symbol(), left, Some(right)))
    }

    fn map_literal(
        &mut self,
        entries: &[(ConstExpr, ConstExpr)],
    ) -> EvalResult<Local> {
        let mut pairs: Vec<(Local, Local)> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.eval(key)?;
            let value = self.eval(value)?;
            for (existing, _) in &pairs {
                if self.equals(existing, &key)? {
                    let shown = self.render(&key)?;
                    return Err(ConstEvalError::fault(format!("duplicate key {} in const map", shown)).into());
                }
            }
            pairs.push((key, value));
        }
        Ok(Local::temp(Temp::Map(pairs)))
    }

    fn construct(
        &mut self,
        class: &str,
        fields: &[(String, ConstExpr)],
    ) -> EvalResult<Local> {
        let decl = self
            .resolver
            .context()
            .model()
            .type_declaration(class)
            .ok_or_else(|| ConstEvalError::unresolved(class, "no such class"))?;

        let mut values: Vec<(String, Local)> = Vec::with_capacity(fields.len());
        for (name, expr) in fields {
            if !decl.has_field(name) {
                return Err(ConstEvalError::fault(format!("'{}' has no field '{}'", class, name)).into());
            }
            if values.iter().any(|(n, _)| n == name) {
                return Err(ConstEvalError::fault(format!("field '{}' of '{}' is given more than once", name, class)).into());
            }
            let value = self.eval(expr)?;
            values.push((name.clone(), value));
        }
        if let Some(missing) = decl.fields.iter().find(|f| !values.iter().any(|(n, _)| *n == f.name)) {
            return Err(
                ConstEvalError::fault(format!("missing field '{}' in const construction of '{}'", missing.name, class)).into(),
            );
        }
        Ok(Local::object(class, values))
    }

    /// 可迭代值的元素：列表元素或映射的键
    fn iterate(
        &self,
        source: &Local,
    ) -> ConstEvalResult<Vec<Local>> {
        if let Some(node) = self.open(source)? {
            match node.shape() {
                Shape::List(items) => return Ok(items),
                Shape::Map(entries) => return Ok(entries.into_iter().map(|(k, _)| k).collect()),
                _ => {}
            }
        }
        Err(ConstEvalError::fault(format!("cannot iterate over {}", self.type_name_of(source))))
    }

    fn index(
        &self,
        target: &Local,
        index: &Local,
    ) -> ConstEvalResult<Local> {
        let Some(node) = self.open(target)? else {
            return Err(self.mismatch("[]", target, Some(index)));
        };
        let position = match index.as_imm() {
            Some(Immediate::Int(i)) => Some(i),
            _ => None,
        };

        if let (Some(len), Some(i)) = (node.list_len(), position) {
            return usize::try_from(i)
                .ok()
                .and_then(|i| node.item(i))
                .ok_or_else(|| ConstEvalError::fault(format!("index {} is out of range for a list of length {}", i, len)));
        }
        match (node.shape(), position) {
            (Shape::Map(entries), _) => {
                for (key, value) in entries {
                    if self.equals(&key, index)? {
                        return Ok(value);
                    }
                }
                Ok(Local::NULL)
            }
            (Shape::Str(s), Some(i)) => {
                let ch = usize::try_from(i).ok().and_then(|i| s.chars().nth(i)).ok_or_else(|| {
                    ConstEvalError::fault(format!(
                        "index {} is out of range for a string of length {}",
                        i,
                        s.chars().count()
                    ))
                })?;
                Ok(Local::str(ch.to_string()))
            }
            _ => Err(self.mismatch("[]", target, Some(index))),
        }
    }

    fn field(
        &self,
        target: &Local,
        name: &str,
    ) -> ConstEvalResult<Local> {
        if let Some(node) = self.open(target)? {
            if let (Some(length), "length") = (node.length(), name) {
                return Ok(Local::int(length as i64));
            }
            if let Shape::Object { class, fields } = node.shape() {
                return fields
                    .into_iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| ConstEvalError::fault(format!("'{}' has no field '{}'", class, name)));
            }
        }
        Err(ConstEvalError::fault(format!(
            "{} has no field '{}'",
            self.type_name_of(target),
            name
        )))
    }

    /// 类型表达式求值为类型值（不驻留）
    fn eval_type(
        &mut self,
        ty: &TypeExpr,
    ) -> ConstEvalResult<Local> {
        match ty {
            TypeExpr::Named { name, args } => {
                if !is_known_type(self.resolver.context().model(), name) {
                    return Err(ConstEvalError::unresolved(name.as_str(), "no such type"));
                }
                let mut locals = Vec::with_capacity(args.len());
                for arg in args {
                    locals.push(self.eval_type(arg)?);
                }
                Ok(Local::type_ref(name.as_str(), locals))
            }
            TypeExpr::Param(name) => match self.params.get(name) {
                Some(Operand::Ref(id)) => Ok(Local::Ref(*id)),
                _ => Err(ConstEvalError::unresolved(
                    name.as_str(),
                    format!("not a type parameter of '{}'", self.chain.function),
                )),
            },
        }
    }

    fn reflect(
        &mut self,
        query: &Reflection,
    ) -> ConstEvalResult<Local> {
        let ty = match query {
            Reflection::FieldNames(ty) | Reflection::FieldTypes(ty) | Reflection::TypeName(ty) => ty,
        };
        let local = self.eval_type(ty)?;
        let node = self.open(&local)?;
        let name = match node.as_ref().map(Node::shape) {
            Some(Shape::Type { name, .. }) => name.to_string(),
            _ => return Err(ConstEvalError::fault(format!("{} is not a type", self.type_name_of(&local)))),
        };

        if let Reflection::TypeName(_) = query {
            return Ok(Local::str(self.describe(&local)?));
        }

        let fields = match self.resolver.context().model().type_declaration(&name) {
            Some(decl) => decl.fields,
            None if BUILTIN_TYPES.contains(&name.as_str()) => Vec::new(),
            None => return Err(ConstEvalError::unresolved(name, "no declaration to reflect on")),
        };
        let items = fields
            .into_iter()
            .map(|field| match query {
                Reflection::FieldNames(_) => Local::str(field.name),
                _ => Local::type_ref(field.ty, Vec::new()),
            })
            .collect();
        Ok(Local::list(items))
    }

    fn call(
        &mut self,
        callee: &Callee,
        type_args: &[TypeExpr],
        args: &[ConstExpr],
    ) -> EvalResult<Local> {
        let name = match callee {
            Callee::Function(name) => name,
            Callee::Method { name, .. } => {
                return Err(ConstEvalError::NotStaticInvocation {
                    target: name.clone(),
                    reason: "instance methods cannot be const".to_string(),
                }
                .into());
            }
        };

        let program = self.resolver.context().program();
        let def = match program.const_fn(name) {
            Some(def) => std::sync::Arc::clone(def),
            None if program.is_plain_fn(name) => {
                return Err(ConstEvalError::not_const(format!(
                    "'{}' calls non-const function '{}'",
                    self.chain.function, name
                ))
                .into());
            }
            None => return Err(ConstEvalError::unresolved(name.as_str(), "no such const function").into()),
        };

        // 实参逃逸到被调函数：驻留后作为缓存键
        let resolver = self.resolver;
        let ctx = resolver.context();
        let mut types = Vec::with_capacity(type_args.len());
        for ty in type_args {
            let local = self.eval_type(ty)?;
            types.push(local.escape_type(ctx)?);
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let local = self.eval(arg)?;
            values.push(local.escape(ctx)?);
        }

        let id = resolver.invoke(&def, &types, &values, Some(&self.chain))?;
        Ok(ctx.store().operand_of(id).map(Local::from)?)
    }
}

fn literal(lit: &Literal) -> Local {
    match lit {
        Literal::Null => Local::NULL,
        Literal::Bool(b) => Local::bool(*b),
        Literal::Int(n) => Local::int(*n),
        Literal::Double(d) => Local::double(*d),
        Literal::Str(s) => Local::str(s.as_str()),
    }
}
