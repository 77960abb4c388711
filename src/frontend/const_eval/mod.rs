//! Const求值模块
//!
//! 编译期执行const函数调用，并把结果驻留为去重的常量：
//! - 静态检查：const安全子集与递归检测
//! - 调用解析：静态目标、常量实参、参数数量
//! - 记忆化：相同 `(函数, 实参)` 只求值一次
//! - 驻留表：结构相等的值共享同一个 ValueId
//! - 局部值：函数体内的临时值只在逃逸时驻留

pub mod const_evaluator;
pub mod const_fn;
pub mod context;
pub mod error;
pub mod expr;
pub mod local;
pub mod memo;
pub mod resolver;
pub mod safety;
pub mod site;
pub mod store;
pub mod value;


// 导出主要类型
pub use const_evaluator::Evaluator;
pub use const_fn::{
    ConstFunctionDef, ConstNode, ConstVarDef, DeclScope, FieldDecl, Param, Program, ProgramModel,
    TypeDeclaration,
};
pub use context::EvalContext;
pub use expr::{BinOp, Callee, ConstExpr, Literal, Reflection, Stmt, TypeExpr, UnOp};
pub use memo::{MemoCache, MemoKey, MemoStats};
pub use resolver::CallResolver;
pub use site::{Argument, CallSite, CallTarget, SiteId};
pub use store::{StoreStats, ValueStore};
pub use value::{ConstDouble, Immediate, Operand, TypeValue, Value, ValueId};

// 导出错误类型
pub use error::{ConstEvalError, ConstEvalResult, ErrorKind};
