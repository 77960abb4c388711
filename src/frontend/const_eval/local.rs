//! 求值器局部值
//!
//! 函数体内的临时值不进入驻留表：
//! - Local: 内联标量、已驻留值的引用，或尚未驻留的临时组合值
//! - 只有逃逸的值（函数体结果、嵌套调用实参）才自底向上驻留
//!
//! 累加循环 `s = s + "x"` 因此只在结束时驻留最终结果。

use std::sync::Arc;

use super::context::EvalContext;
use super::error::{ConstEvalError, ConstEvalResult};
use super::store::ValueStore;
use super::value::{ConstDouble, Immediate, Operand, Value, ValueId};

/// 求值器中的值
#[derive(Debug, Clone)]
pub enum Local {
    /// 内联标量
    Imm(Immediate),
    /// 已驻留值
    Ref(ValueId),
    /// 尚未驻留的临时组合值
    Temp(Arc<Temp>),
}

/// 临时组合值，子值仍是 Local
#[derive(Debug, Clone)]
pub enum Temp {
    Str(String),
    List(Vec<Local>),
    Map(Vec<(Local, Local)>),
    /// 字段按名称排序
    Object {
        class: String,
        fields: Vec<(String, Local)>,
    },
    Type {
        name: String,
        args: Vec<Local>,
    },
}

impl Temp {
    fn kind_name(&self) -> &'static str {
        match self {
            Temp::Str(_) => "String",
            Temp::List(_) => "List",
            Temp::Map(_) => "Map",
            Temp::Object { .. } => "Object",
            Temp::Type { .. } => "Type",
        }
    }
}

impl Local {
    pub const NULL: Local = Local::Imm(Immediate::Null);

    #[inline]
    pub fn int(n: i64) -> Self {
        Local::Imm(Immediate::Int(n))
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        Local::Imm(Immediate::Bool(b))
    }

    #[inline]
    pub fn double(d: f64) -> Self {
        Local::Imm(Immediate::Double(ConstDouble::new(d)))
    }

    pub fn temp(temp: Temp) -> Self {
        Local::Temp(Arc::new(temp))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::temp(Temp::Str(s.into()))
    }

    pub fn list(items: Vec<Local>) -> Self {
        Self::temp(Temp::List(items))
    }

    /// 构造对象，字段按名称规范化排序
    pub fn object(
        class: impl Into<String>,
        mut fields: Vec<(String, Local)>,
    ) -> Self {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Self::temp(Temp::Object {
            class: class.into(),
            fields,
        })
    }

    pub fn type_ref(
        name: impl Into<String>,
        args: Vec<Local>,
    ) -> Self {
        Self::temp(Temp::Type {
            name: name.into(),
            args,
        })
    }

    #[inline]
    pub fn as_imm(&self) -> Option<Immediate> {
        match self {
            Local::Imm(imm) => Some(*imm),
            _ => None,
        }
    }

    /// 打开组合值；标量返回 None
    pub fn open(
        &self,
        store: &ValueStore,
    ) -> ConstEvalResult<Option<Node>> {
        Ok(match self {
            Local::Imm(_) => None,
            Local::Ref(id) => Some(Node::Stored(store.get(*id)?)),
            Local::Temp(temp) => Some(Node::Temp(Arc::clone(temp))),
        })
    }

    /// 驻留为槽位：先驻留子值，标量保持内联
    pub fn escape(
        &self,
        ctx: &EvalContext,
    ) -> ConstEvalResult<Operand> {
        let temp = match self {
            Local::Imm(imm) => return Ok(Operand::Imm(*imm)),
            Local::Ref(id) => return Ok(Operand::Ref(*id)),
            Local::Temp(temp) => temp,
        };
        let value = match temp.as_ref() {
            Temp::Str(s) => Value::Str(s.clone()),
            Temp::List(items) => {
                let mut slots = Vec::with_capacity(items.len());
                for item in items {
                    slots.push(item.escape(ctx)?);
                }
                Value::List(slots)
            }
            Temp::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    pairs.push((key.escape(ctx)?, value.escape(ctx)?));
                }
                Value::Map(pairs)
            }
            Temp::Object { class, fields } => {
                let mut slots = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    slots.push((name.clone(), value.escape(ctx)?));
                }
                Value::object(class.as_str(), slots)
            }
            Temp::Type { name, args } => {
                let mut ids = Vec::with_capacity(args.len());
                for arg in args {
                    ids.push(arg.escape_type(ctx)?);
                }
                Value::type_ref(name.as_str(), ids)
            }
        };
        ctx.intern(value).map(Operand::Ref)
    }

    /// 驻留一个类型值
    pub fn escape_type(
        &self,
        ctx: &EvalContext,
    ) -> ConstEvalResult<ValueId> {
        match self.escape(ctx)? {
            Operand::Ref(id) => Ok(id),
            Operand::Imm(imm) => Err(ConstEvalError::internal(format!("{} used as a type argument", imm))),
        }
    }
}

impl From<Operand> for Local {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Imm(imm) => Local::Imm(imm),
            Operand::Ref(id) => Local::Ref(id),
        }
    }
}

/// 已打开的组合值：驻留值或临时值
#[derive(Debug, Clone)]
pub enum Node {
    Stored(Arc<Value>),
    Temp(Arc<Temp>),
}

/// 组合值的统一视图
#[derive(Debug)]
pub enum Shape<'n> {
    Imm(Immediate),
    Str(&'n str),
    List(Vec<Local>),
    Map(Vec<(Local, Local)>),
    Object {
        class: &'n str,
        fields: Vec<(&'n str, Local)>,
    },
    Type {
        name: &'n str,
        args: Vec<Local>,
    },
}

impl Node {
    pub fn shape(&self) -> Shape<'_> {
        match self {
            Node::Stored(value) => match value.as_ref() {
                Value::Imm(imm) => Shape::Imm(*imm),
                Value::Str(s) => Shape::Str(s),
                Value::List(items) => Shape::List(items.iter().copied().map(Local::from).collect()),
                Value::Map(entries) => {
                    Shape::Map(entries.iter().map(|(k, v)| (Local::from(*k), Local::from(*v))).collect())
                }
                Value::Object { class, fields } => Shape::Object {
                    class,
                    fields: fields.iter().map(|(n, v)| (n.as_str(), Local::from(*v))).collect(),
                },
                Value::Type(ty) => Shape::Type {
                    name: &ty.name,
                    args: ty.args.iter().copied().map(Local::Ref).collect(),
                },
            },
            Node::Temp(temp) => match temp.as_ref() {
                Temp::Str(s) => Shape::Str(s),
                Temp::List(items) => Shape::List(items.clone()),
                Temp::Map(entries) => Shape::Map(entries.clone()),
                Temp::Object { class, fields } => Shape::Object {
                    class,
                    fields: fields.iter().map(|(n, v)| (n.as_str(), v.clone())).collect(),
                },
                Temp::Type { name, args } => Shape::Type {
                    name,
                    args: args.clone(),
                },
            },
        }
    }

    /// 诊断用类型名：对象取类名
    pub fn type_name(&self) -> String {
        match self {
            Node::Stored(value) => match value.as_ref() {
                Value::Object { class, .. } => class.clone(),
                other => other.kind_name().to_string(),
            },
            Node::Temp(temp) => match temp.as_ref() {
                Temp::Object { class, .. } => class.clone(),
                other => other.kind_name().to_string(),
            },
        }
    }

    /// `length` 属性：字符串、列表与映射
    pub fn length(&self) -> Option<usize> {
        match self {
            Node::Stored(value) => match value.as_ref() {
                Value::Str(s) => Some(s.chars().count()),
                Value::List(items) => Some(items.len()),
                Value::Map(entries) => Some(entries.len()),
                _ => None,
            },
            Node::Temp(temp) => match temp.as_ref() {
                Temp::Str(s) => Some(s.chars().count()),
                Temp::List(items) => Some(items.len()),
                Temp::Map(entries) => Some(entries.len()),
                _ => None,
            },
        }
    }

    /// 列表长度；不是列表时为 None
    pub fn list_len(&self) -> Option<usize> {
        match self {
            Node::Stored(value) => match value.as_ref() {
                Value::List(items) => Some(items.len()),
                _ => None,
            },
            Node::Temp(temp) => match temp.as_ref() {
                Temp::List(items) => Some(items.len()),
                _ => None,
            },
        }
    }

    /// 列表元素
    pub fn item(
        &self,
        index: usize,
    ) -> Option<Local> {
        match self {
            Node::Stored(value) => match value.as_ref() {
                Value::List(items) => items.get(index).copied().map(Local::from),
                _ => None,
            },
            Node::Temp(temp) => match temp.as_ref() {
                Temp::List(items) => items.get(index).cloned(),
                _ => None,
            },
        }
    }
}
