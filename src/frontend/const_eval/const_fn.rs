//! Const函数与程序声明
//!
//! - ConstFunctionDef: const函数定义（只能是顶层、类静态或局部函数）
//! - ConstVarDef: const变量定义
//! - Program: 一次编译中所有声明的注册表
//! - ProgramModel: 反射查询使用的只读程序模型
//!
//! 示例：
//! const addOne(x) => x + 1

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::error::{ConstEvalError, ConstEvalResult};
use super::expr::ConstExpr;
use crate::util::span::Span;

/// 内建类型名称
pub const BUILTIN_TYPES: &[&str] = &[
    "int", "double", "num", "bool", "String", "Null", "Object", "dynamic", "List", "Map", "Type",
];

/// 形参
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// 普通const形参
    Value(String),
    /// 类型形参
    Type(String),
}

impl Param {
    /// 形参名称
    pub fn name(&self) -> &str {
        match self {
            Param::Value(name) | Param::Type(name) => name,
        }
    }
}

/// 声明作用域（能力标签：永远不会是实例作用域）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclScope {
    /// 顶层函数
    TopLevel,
    /// 类的静态成员
    Static { class: String },
    /// 另一个函数内部的局部函数
    Local { enclosing: String },
}

/// Const函数定义
#[derive(Debug, Clone, PartialEq)]
pub struct ConstFunctionDef {
    /// 函数名称
    pub name: String,
    /// 形参列表
    pub params: Vec<Param>,
    /// 函数体
    pub body: ConstExpr,
    /// 声明作用域
    pub scope: DeclScope,
    /// 位置信息
    pub span: Span,
}

impl ConstFunctionDef {
    /// 创建新的顶层Const函数
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        body: ConstExpr,
    ) -> Self {
        ConstFunctionDef {
            name: name.into(),
            params,
            body,
            scope: DeclScope::TopLevel,
            span: Span::default(),
        }
    }

    /// 只有值形参的便捷构造
    pub fn with_value_params(
        name: impl Into<String>,
        params: &[&str],
        body: ConstExpr,
    ) -> Self {
        let params = params.iter().map(|p| Param::Value(p.to_string())).collect();
        Self::new(name, params, body)
    }

    /// 设置声明作用域
    pub fn in_scope(
        mut self,
        scope: DeclScope,
    ) -> Self {
        self.scope = scope;
        self
    }

    /// 设置位置信息
    pub fn at(
        mut self,
        span: Span,
    ) -> Self {
        self.span = span;
        self
    }

    /// 调用点使用的限定名
    pub fn qualified_name(&self) -> String {
        match &self.scope {
            DeclScope::TopLevel => self.name.clone(),
            DeclScope::Static { class } => format!("{}.{}", class, self.name),
            DeclScope::Local { enclosing } => format!("{}.{}", enclosing, self.name),
        }
    }

    /// 值形参名称
    pub fn value_params(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| match p {
            Param::Value(name) => Some(name.as_str()),
            Param::Type(_) => None,
        })
    }

    /// 类型形参名称
    pub fn type_params(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| match p {
            Param::Type(name) => Some(name.as_str()),
            Param::Value(_) => None,
        })
    }

    /// 值形参数量
    pub fn arity(&self) -> usize {
        self.value_params().count()
    }

    /// 类型形参数量
    pub fn type_arity(&self) -> usize {
        self.type_params().count()
    }
}

/// Const变量定义
#[derive(Debug, Clone, PartialEq)]
pub struct ConstVarDef {
    /// 变量名称
    pub name: String,
    /// 初始化表达式
    pub init: ConstExpr,
    /// 位置信息
    pub span: Span,
}

impl ConstVarDef {
    pub fn new(
        name: impl Into<String>,
        init: ConstExpr,
    ) -> Self {
        ConstVarDef {
            name: name.into(),
            init,
            span: Span::default(),
        }
    }
}

/// 字段声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// 字段名称
    pub name: String,
    /// 字段类型名称
    pub ty: String,
}

/// 类型声明（反射查询的对象）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    /// 类型名称
    pub name: String,
    /// 按声明顺序的字段
    pub fields: Vec<FieldDecl>,
}

impl TypeDeclaration {
    /// 由 (字段名, 类型名) 列表构造
    pub fn new(
        name: impl Into<String>,
        fields: &[(&str, &str)],
    ) -> Self {
        TypeDeclaration {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(n, t)| FieldDecl {
                    name: n.to_string(),
                    ty: t.to_string(),
                })
                .collect(),
        }
    }

    /// 是否声明了该字段
    pub fn has_field(
        &self,
        name: &str,
    ) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// 只读程序模型
///
/// 求值器可以在求值期间查询它，但只有查询得到的常量值会进入常量表。
pub trait ProgramModel: Send + Sync {
    /// 查找类型声明
    fn type_declaration(
        &self,
        name: &str,
    ) -> Option<TypeDeclaration>;
}

/// 程序声明注册表
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// const函数（按限定名）
    const_fns: IndexMap<String, Arc<ConstFunctionDef>>,
    /// const变量
    const_vars: IndexMap<String, Arc<ConstVarDef>>,
    /// 未加 const 限定的函数
    plain_fns: IndexSet<String>,
    /// 非const变量
    plain_vars: IndexSet<String>,
    /// 类型声明
    types: IndexMap<String, TypeDeclaration>,
}

impl Program {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(
        &self,
        name: &str,
    ) -> ConstEvalResult<()> {
        if self.const_fns.contains_key(name)
            || self.const_vars.contains_key(name)
            || self.plain_fns.contains(name)
            || self.plain_vars.contains(name)
        {
            return Err(ConstEvalError::NotStaticInvocation {
                target: name.to_string(),
                reason: "the name is declared more than once".to_string(),
            });
        }
        Ok(())
    }

    /// 注册const函数
    pub fn declare_const_fn(
        &mut self,
        def: ConstFunctionDef,
    ) -> ConstEvalResult<&mut Self> {
        let key = def.qualified_name();
        self.ensure_free(&key)?;
        // 值形参与类型形参共用一个命名空间
        for (i, param) in def.params.iter().enumerate() {
            if def.params[..i].iter().any(|p| p.name() == param.name()) {
                return Err(ConstEvalError::not_const(format!(
                    "parameter '{}' of '{}' is declared more than once",
                    param.name(),
                    key
                )));
            }
        }
        self.const_fns.insert(key, Arc::new(def));
        Ok(self)
    }

    /// 注册const变量
    pub fn declare_const_var(
        &mut self,
        def: ConstVarDef,
    ) -> ConstEvalResult<&mut Self> {
        self.ensure_free(&def.name)?;
        self.const_vars.insert(def.name.clone(), Arc::new(def));
        Ok(self)
    }

    /// 注册普通函数
    pub fn declare_plain_fn(
        &mut self,
        name: impl Into<String>,
    ) -> ConstEvalResult<&mut Self> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.plain_fns.insert(name);
        Ok(self)
    }

    /// 注册非const变量
    pub fn declare_plain_var(
        &mut self,
        name: impl Into<String>,
    ) -> ConstEvalResult<&mut Self> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.plain_vars.insert(name);
        Ok(self)
    }

    /// 注册类型声明
    pub fn declare_type(
        &mut self,
        decl: TypeDeclaration,
    ) -> &mut Self {
        self.types.insert(decl.name.clone(), decl);
        self
    }

    pub fn const_fn(
        &self,
        name: &str,
    ) -> Option<&Arc<ConstFunctionDef>> {
        self.const_fns.get(name)
    }

    pub fn const_var(
        &self,
        name: &str,
    ) -> Option<&Arc<ConstVarDef>> {
        self.const_vars.get(name)
    }

    pub fn is_plain_fn(
        &self,
        name: &str,
    ) -> bool {
        self.plain_fns.contains(name)
    }

    pub fn is_plain_var(
        &self,
        name: &str,
    ) -> bool {
        self.plain_vars.contains(name)
    }

    /// 所有const函数
    pub fn const_fns(&self) -> impl Iterator<Item = (&str, &Arc<ConstFunctionDef>)> {
        self.const_fns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 所有const变量
    pub fn const_vars(&self) -> impl Iterator<Item = (&str, &Arc<ConstVarDef>)> {
        self.const_vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl ProgramModel for Program {
    fn type_declaration(
        &self,
        name: &str,
    ) -> Option<TypeDeclaration> {
        self.types.get(name).cloned()
    }
}

/// 调用图节点：一个const函数或const变量
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstNode {
    Function(String),
    Variable(String),
}

impl ConstNode {
    pub fn name(&self) -> &str {
        match self {
            ConstNode::Function(name) | ConstNode::Variable(name) => name,
        }
    }
}

impl std::fmt::Display for ConstNode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConstNode::Function(name) => write!(f, "{}()", name),
            ConstNode::Variable(name) => write!(f, "{}", name),
        }
    }
}

/// 类型名是否可解析（内建或由模型声明）
pub fn is_known_type(
    model: &dyn ProgramModel,
    name: &str,
) -> bool {
    BUILTIN_TYPES.contains(&name) || model.type_declaration(name).is_some()
}
