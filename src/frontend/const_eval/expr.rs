//! Const表达式定义
//!
//! const函数体使用的受限表达式语言。解析由外部编译管线完成，
//! 这里只描述已经过名称解析的表达式树。

/// 字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// 算术运算
    Add,
    Sub,
    Mul,
    /// 浮点除法（`/`）
    Div,
    /// 整除（`~/`）
    IntDiv,
    Mod,
    /// 比较运算
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// 逻辑运算（短路）
    And,
    Or,
    /// 位运算
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// 空值合并（`??`）
    IfNull,
}

impl BinOp {
    /// 运算符的源码形式
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "~/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::IfNull => "??",
        }
    }
}

/// 一元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// 负号
    Neg,
    /// 逻辑非
    Not,
    /// 位反
    BitNot,
}

/// 类型表达式
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// 具名类型（可带类型实参）
    Named { name: String, args: Vec<TypeExpr> },
    /// 当前const函数的类型参数
    Param(String),
}

impl TypeExpr {
    /// 无实参的具名类型
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// 带实参的具名类型
    pub fn generic(
        name: impl Into<String>,
        args: Vec<TypeExpr>,
    ) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args,
        }
    }
}

/// 对程序模型的只读反射查询
#[derive(Debug, Clone, PartialEq)]
pub enum Reflection {
    /// 类型声明的字段名列表
    FieldNames(TypeExpr),
    /// 类型声明的字段类型列表
    FieldTypes(TypeExpr),
    /// 类型名称
    TypeName(TypeExpr),
}

/// 调用目标
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// 按名称的静态调用
    Function(String),
    /// 实例方法调用（总是被拒绝）
    Method {
        receiver: Box<ConstExpr>,
        name: String,
    },
}

/// Const表达式
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    /// 字面量
    Lit(Literal),
    /// 名称引用：局部变量、参数或const变量
    Ref(String),
    /// 一元运算
    Unary { op: UnOp, expr: Box<ConstExpr> },
    /// 二元运算
    Binary {
        op: BinOp,
        left: Box<ConstExpr>,
        right: Box<ConstExpr>,
    },
    /// 条件表达式
    If {
        condition: Box<ConstExpr>,
        then_branch: Box<ConstExpr>,
        else_branch: Box<ConstExpr>,
    },
    /// 语句块，结果为末尾表达式
    Block {
        stmts: Vec<Stmt>,
        result: Box<ConstExpr>,
    },
    /// 列表字面量
    List(Vec<ConstExpr>),
    /// 映射字面量
    Map(Vec<(ConstExpr, ConstExpr)>),
    /// const构造
    Object {
        class: String,
        fields: Vec<(String, ConstExpr)>,
    },
    /// 列表推导 `[for (var in iterable) if (filter) element]`
    ListFor {
        var: String,
        iterable: Box<ConstExpr>,
        filter: Option<Box<ConstExpr>>,
        element: Box<ConstExpr>,
    },
    /// 整数区间 `[start, end)`
    Range {
        start: Box<ConstExpr>,
        end: Box<ConstExpr>,
    },
    /// 下标访问
    Index {
        target: Box<ConstExpr>,
        index: Box<ConstExpr>,
    },
    /// 字段访问（包括 `length`）
    Field { target: Box<ConstExpr>, name: String },
    /// 作为数据使用的类型
    Type(TypeExpr),
    /// 反射查询
    Reflect(Reflection),
    /// 抛出错误
    Throw(Box<ConstExpr>),
    /// 函数调用
    Call {
        callee: Callee,
        type_args: Vec<TypeExpr>,
        args: Vec<ConstExpr>,
    },
    /// 把函数当作值引用（总是被拒绝）
    TearOff(String),
}

/// 语句
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// 局部变量声明
    Let { name: String, value: ConstExpr },
    /// 局部变量赋值
    Assign { name: String, value: ConstExpr },
    /// 表达式语句
    Expr(ConstExpr),
    /// 条件语句
    If {
        condition: ConstExpr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// while 循环
    While { condition: ConstExpr, body: Vec<Stmt> },
    /// for-in 循环（列表元素或映射的键）
    For {
        var: String,
        iterable: ConstExpr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    /// 提前返回
    Return(ConstExpr),
}

// 构造辅助，供管线和测试使用
impl ConstExpr {
    pub fn null() -> Self {
        ConstExpr::Lit(Literal::Null)
    }

    pub fn int(n: i64) -> Self {
        ConstExpr::Lit(Literal::Int(n))
    }

    pub fn double(d: f64) -> Self {
        ConstExpr::Lit(Literal::Double(d))
    }

    pub fn bool(b: bool) -> Self {
        ConstExpr::Lit(Literal::Bool(b))
    }

    pub fn str(s: impl Into<String>) -> Self {
        ConstExpr::Lit(Literal::Str(s.into()))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        ConstExpr::Ref(name.into())
    }

    pub fn unary(
        op: UnOp,
        expr: ConstExpr,
    ) -> Self {
        ConstExpr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn binary(
        op: BinOp,
        left: ConstExpr,
        right: ConstExpr,
    ) -> Self {
        ConstExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn if_else(
        condition: ConstExpr,
        then_branch: ConstExpr,
        else_branch: ConstExpr,
    ) -> Self {
        ConstExpr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn block(
        stmts: Vec<Stmt>,
        result: ConstExpr,
    ) -> Self {
        ConstExpr::Block {
            stmts,
            result: Box::new(result),
        }
    }

    /// 静态调用（无类型实参）
    pub fn call(
        name: impl Into<String>,
        args: Vec<ConstExpr>,
    ) -> Self {
        ConstExpr::Call {
            callee: Callee::Function(name.into()),
            type_args: Vec::new(),
            args,
        }
    }

    /// 带类型实参的静态调用
    pub fn call_generic(
        name: impl Into<String>,
        type_args: Vec<TypeExpr>,
        args: Vec<ConstExpr>,
    ) -> Self {
        ConstExpr::Call {
            callee: Callee::Function(name.into()),
            type_args,
            args,
        }
    }

    pub fn object(
        class: impl Into<String>,
        fields: Vec<(&str, ConstExpr)>,
    ) -> Self {
        ConstExpr::Object {
            class: class.into(),
            fields: fields.into_iter().map(|(n, e)| (n.to_string(), e)).collect(),
        }
    }

    pub fn field(
        target: ConstExpr,
        name: impl Into<String>,
    ) -> Self {
        ConstExpr::Field {
            target: Box::new(target),
            name: name.into(),
        }
    }

    pub fn index(
        target: ConstExpr,
        index: ConstExpr,
    ) -> Self {
        ConstExpr::Index {
            target: Box::new(target),
            index: Box::new(index),
        }
    }

    pub fn range(
        start: ConstExpr,
        end: ConstExpr,
    ) -> Self {
        ConstExpr::Range {
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    pub fn throw(message: ConstExpr) -> Self {
        ConstExpr::Throw(Box::new(message))
    }
}
