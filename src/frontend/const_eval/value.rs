//! Const值定义
//!
//! 编译期常量的三层表示：
//! - Immediate: 内联标量（null、bool、int、double）
//! - Operand: 组合值的槽位，内联标量或指向已驻留值的引用
//! - Value: 常量表中的驻留值，带有稳定的 ValueId

use serde::Serialize;
use std::fmt;

/// 驻留值标识（常量表下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ValueId(pub u32);

impl ValueId {
    /// 获取下标
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 按位模式比较的浮点常量
///
/// 常量相等即同一性：`0.0` 与 `-0.0` 不同，`NaN` 与自身相同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConstDouble(u64);

impl ConstDouble {
    /// 从 f64 构造
    #[inline]
    pub fn new(value: f64) -> Self {
        ConstDouble(value.to_bits())
    }

    /// 取回 f64
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// 内联标量常量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Immediate {
    Null,
    Bool(bool),
    Int(i64),
    Double(ConstDouble),
}

impl Immediate {
    /// 类型名称（用于诊断）
    pub fn type_name(&self) -> &'static str {
        match self {
            Immediate::Null => "Null",
            Immediate::Bool(_) => "bool",
            Immediate::Int(_) => "int",
            Immediate::Double(_) => "double",
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Immediate::Null => write!(f, "null"),
            Immediate::Bool(b) => write!(f, "{}", b),
            Immediate::Int(n) => write!(f, "{}", n),
            Immediate::Double(d) => write!(f, "{:?}", d.get()),
        }
    }
}

/// 组合值槽位 / 求值临时值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operand {
    /// 内联标量
    Imm(Immediate),
    /// 已驻留值的引用
    Ref(ValueId),
}

impl Operand {
    pub const NULL: Operand = Operand::Imm(Immediate::Null);

    #[inline]
    pub fn int(n: i64) -> Self {
        Operand::Imm(Immediate::Int(n))
    }

    #[inline]
    pub fn bool(b: bool) -> Self {
        Operand::Imm(Immediate::Bool(b))
    }

    #[inline]
    pub fn double(d: f64) -> Self {
        Operand::Imm(Immediate::Double(ConstDouble::new(d)))
    }

    /// 若为引用则返回其 ValueId
    #[inline]
    pub fn as_ref_id(&self) -> Option<ValueId> {
        match self {
            Operand::Ref(id) => Some(*id),
            Operand::Imm(_) => None,
        }
    }
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Operand::Imm(imm)
    }
}

impl fmt::Display for Operand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Operand::Imm(imm) => write!(f, "{}", imm),
            Operand::Ref(id) => write!(f, "{}", id),
        }
    }
}

/// 作为数据使用的已解析类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeValue {
    /// 类型名称
    pub name: String,
    /// 类型实参（均为 Type 值）
    pub args: Vec<ValueId>,
}

/// 驻留常量值
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Value {
    /// 标量（标量作为调用结果时也需要自己的 ValueId）
    Imm(Immediate),
    /// 字符串
    Str(String),
    /// 列表
    List(Vec<Operand>),
    /// 映射（按插入顺序，键唯一）
    Map(Vec<(Operand, Operand)>),
    /// 对象（字段按名称排序）
    Object {
        class: String,
        fields: Vec<(String, Operand)>,
    },
    /// 类型引用
    Type(TypeValue),
}

impl Value {
    /// 构造对象值，字段按名称规范化排序
    pub fn object(
        class: impl Into<String>,
        mut fields: Vec<(String, Operand)>,
    ) -> Self {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Object {
            class: class.into(),
            fields,
        }
    }

    /// 构造类型值
    pub fn type_ref(
        name: impl Into<String>,
        args: Vec<ValueId>,
    ) -> Self {
        Value::Type(TypeValue {
            name: name.into(),
            args,
        })
    }

    /// 判别式名称
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Imm(imm) => imm.type_name(),
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Object { .. } => "Object",
            Value::Type(_) => "Type",
        }
    }

    /// 直接引用的子值（按出现顺序，可能重复）
    pub fn children(&self) -> Vec<ValueId> {
        match self {
            Value::Imm(_) | Value::Str(_) => Vec::new(),
            Value::List(items) => items.iter().filter_map(Operand::as_ref_id).collect(),
            Value::Map(entries) => entries
                .iter()
                .flat_map(|(k, v)| [k.as_ref_id(), v.as_ref_id()])
                .flatten()
                .collect(),
            Value::Object { fields, .. } => {
                fields.iter().filter_map(|(_, v)| v.as_ref_id()).collect()
            }
            Value::Type(ty) => ty.args.clone(),
        }
    }

    /// 是否为组合值
    pub fn is_composite(&self) -> bool {
        !matches!(self, Value::Imm(_) | Value::Str(_))
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
            items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
        }

        match self {
            Value::Imm(imm) => write!(f, "{}", imm),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => write!(f, "[{}]", join(items.iter())),
            Value::Map(entries) => write!(
                f,
                "{{{}}}",
                join(entries.iter().map(|(k, v)| format!("{}: {}", k, v)))
            ),
            Value::Object { class, fields } => write!(
                f,
                "{}({})",
                class,
                join(fields.iter().map(|(n, v)| format!("{}: {}", n, v)))
            ),
            Value::Type(ty) if ty.args.is_empty() => write!(f, "{}", ty.name),
            Value::Type(ty) => write!(f, "{}<{}>", ty.name, join(ty.args.iter())),
        }
    }
}
