//! Compile-time evaluation of const function calls
//!
//! Whole-program analysis submits every static call to a const function;
//! the engine evaluates each call once, interns the results so that
//! structurally equal constants share one identity, and finally keeps only
//! the constants reachable from the call sites that survive compilation.
//!
//! # Example
//!
//! ```rust
//! use consteval::{BinOp, CallSite, ConstEngine, ConstExpr, ConstFunctionDef, Immediate, Program, Value};
//!
//! let mut program = Program::new();
//! program
//!     .declare_const_fn(ConstFunctionDef::with_value_params(
//!         "addOne",
//!         &["x"],
//!         ConstExpr::binary(BinOp::Add, ConstExpr::reference("x"), ConstExpr::int(1)),
//!     ))
//!     .unwrap();
//!
//! let mut engine = ConstEngine::new(program);
//! let five = engine.intern_immediate(Immediate::Int(5)).unwrap();
//! let site = engine.submit(CallSite::new("addOne", vec![five]));
//! let shaken = engine.finish_all().unwrap();
//!
//! let id = shaken.rewrites[&site];
//! assert_eq!(*engine.store().get(id).unwrap(), Value::Imm(Immediate::Int(6)));
//! ```

#![doc(html_root_url = "https://docs.rs/consteval")]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod frontend;
pub mod middle;
pub mod util;

// Re-exports
pub use engine::{ConstEngine, EvalReport};
pub use frontend::const_eval::{
    Argument, BinOp, CallSite, CallTarget, Callee, ConstEvalError, ConstEvalResult, ConstExpr,
    ConstFunctionDef, ConstVarDef, DeclScope, ErrorKind, Immediate, Literal, Operand, Param, Program,
    ProgramModel, Reflection, SiteId, Stmt, TypeDeclaration, TypeExpr, UnOp, Value, ValueId,
};
pub use middle::passes::tree_shake::{ConstantTable, ShakeResult};
pub use util::config::EngineConfig;
pub use util::diagnostic::{Diagnostic, DiagnosticEmitter, JsonEmitter, TextEmitter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
