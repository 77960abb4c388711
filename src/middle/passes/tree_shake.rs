//! 常量表摇树优化
//!
//! 整程序分析结束后，只保留从保留调用点可达的常量：
//! - emit / discard：按 ValueId 升序划分全部驻留值
//! - rewrites：保留且成功解析的调用点 → 常量
//! - ConstantTable：最小化常量表，条目之间按紧凑槽位互相引用

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::reachability::{LiveSet, UseGraph};
use crate::frontend::const_eval::error::{ConstEvalError, ConstEvalResult};
use crate::frontend::const_eval::site::SiteId;
use crate::frontend::const_eval::store::ValueStore;
use crate::frontend::const_eval::value::{Immediate, Operand, Value, ValueId};

/// 常量表内的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// 内联标量
    Imm(Immediate),
    /// 指向更早的表条目
    Entry(u32),
}

/// 常量表条目的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableValue {
    Scalar { value: Immediate },
    Str { value: String },
    List { items: Vec<Slot> },
    Map { entries: Vec<(Slot, Slot)> },
    Object { class: String, fields: Vec<(String, Slot)> },
    Type { name: String, args: Vec<u32> },
}

/// 常量表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    /// 表内下标
    pub slot: u32,
    /// 驻留表中的原始 id
    pub source: ValueId,
    pub value: TableValue,
}

/// 最小化常量表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstantTable {
    entries: Vec<TableEntry>,
}

impl ConstantTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn get(
        &self,
        slot: u32,
    ) -> Option<&TableEntry> {
        self.entries.get(slot as usize)
    }

    /// 原始 id 对应的槽位
    pub fn slot_of(
        &self,
        id: ValueId,
    ) -> Option<u32> {
        self.entries
            .binary_search_by_key(&id, |entry| entry.source)
            .ok()
            .map(|index| index as u32)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 摇树统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShakeStats {
    /// 驻留值总数
    pub total_values: usize,
    /// 保留的值
    pub kept: usize,
    /// 消除的值
    pub eliminated: usize,
    /// 保留调用点数
    pub retained_sites: usize,
    /// 根值数
    pub roots: usize,
    /// 使用边数
    pub use_edges: usize,
    /// 最大深度
    pub max_depth: Option<usize>,
    /// 消除率
    pub elimination_rate: f64,
}

impl ShakeStats {
    /// 格式化统计信息
    pub fn format(&self) -> String {
        format!(
            "Constant Table Statistics:\n\
             - Total values: {}\n\
             - Kept: {}\n\
             - Eliminated: {} ({:.1}%)\n\
             - Retained sites: {}\n\
             - Roots: {}\n\
             - Use edges: {}\n\
             - Max depth: {:?}",
            self.total_values,
            self.kept,
            self.eliminated,
            self.elimination_rate * 100.0,
            self.retained_sites,
            self.roots,
            self.use_edges,
            self.max_depth,
        )
    }
}

/// 摇树结果
#[derive(Debug, Clone, Default)]
pub struct ShakeResult {
    /// 保留的值（升序）
    pub emit: Vec<ValueId>,
    /// 丢弃的值（升序）
    pub discard: Vec<ValueId>,
    /// 调用点改写
    pub rewrites: IndexMap<SiteId, ValueId>,
    /// 最小化常量表
    pub table: ConstantTable,
    pub stats: ShakeStats,
}

impl ShakeResult {
    /// 调用点改写后指向的表槽位
    pub fn slot_for(
        &self,
        site: SiteId,
    ) -> Option<u32> {
        self.rewrites.get(&site).and_then(|id| self.table.slot_of(*id))
    }
}

/// 摇树器
pub struct TreeShaker<'a> {
    store: &'a ValueStore,
    uses: &'a UseGraph,
}

impl<'a> TreeShaker<'a> {
    pub fn new(
        store: &'a ValueStore,
        uses: &'a UseGraph,
    ) -> Self {
        TreeShaker { store, uses }
    }

    /// 按保留调用点摇树
    ///
    /// 未解析或解析失败的调用点既没有改写也不贡献根。
    pub fn shake(
        &self,
        resolutions: &IndexMap<SiteId, ConstEvalResult<ValueId>>,
        retained: &[SiteId],
    ) -> ConstEvalResult<ShakeResult> {
        let mut rewrites = IndexMap::new();
        for site in retained {
            if let Some(Ok(id)) = resolutions.get(site) {
                rewrites.insert(*site, *id);
            }
        }

        let sites: Vec<SiteId> = rewrites.keys().copied().collect();
        let roots = self.uses.roots_for(&sites);
        let live = self.uses.compute_live_set(&roots);
        for (site, id) in &rewrites {
            if !live.contains(*id) {
                return Err(ConstEvalError::internal(format!(
                    "{} resolved to {} but no use edge records it",
                    site, id
                )));
            }
        }

        let values = self.store.snapshot();
        if let Some(max) = live.sorted().last() {
            if max.index() >= values.len() {
                return Err(ConstEvalError::internal(format!("live value {} is not in the store", max)));
            }
        }

        let mut emit = Vec::with_capacity(live.len());
        let mut discard = Vec::new();
        for index in 0..values.len() {
            let id = ValueId(index as u32);
            if live.contains(id) {
                emit.push(id);
            } else {
                discard.push(id);
            }
        }

        let table = build_table(&values, &emit, &live)?;

        let total = values.len();
        let stats = ShakeStats {
            total_values: total,
            kept: emit.len(),
            eliminated: discard.len(),
            retained_sites: retained.len(),
            roots: roots.len(),
            use_edges: self.uses.len(),
            max_depth: live.max_depth(),
            elimination_rate: if total == 0 {
                0.0
            } else {
                discard.len() as f64 / total as f64
            },
        };
        debug!("tree shaking kept {} of {} constant(s)", stats.kept, stats.total_values);

        Ok(ShakeResult {
            emit,
            discard,
            rewrites,
            table,
            stats,
        })
    }
}

fn build_table(
    values: &[std::sync::Arc<Value>],
    emit: &[ValueId],
    live: &LiveSet,
) -> ConstEvalResult<ConstantTable> {
    let mut slots: hashbrown::HashMap<ValueId, u32> = hashbrown::HashMap::with_capacity(emit.len());
    let mut entries = Vec::with_capacity(emit.len());

    for (slot, id) in emit.iter().enumerate() {
        let slot = slot as u32;
        let value = &values[id.index()];

        let lookup = |child: ValueId| -> ConstEvalResult<u32> {
            if !live.contains(child) {
                return Err(ConstEvalError::internal(format!(
                    "emitted {} references discarded {}",
                    id, child
                )));
            }
            slots
                .get(&child)
                .copied()
                .ok_or_else(|| ConstEvalError::internal(format!("{} references later value {}", id, child)))
        };
        let slot_of = |operand: Operand| -> ConstEvalResult<Slot> {
            match operand {
                Operand::Imm(imm) => Ok(Slot::Imm(imm)),
                Operand::Ref(child) => lookup(child).map(Slot::Entry),
            }
        };

        let content = match value.as_ref() {
            Value::Imm(imm) => TableValue::Scalar { value: *imm },
            Value::Str(s) => TableValue::Str { value: s.clone() },
            Value::List(items) => TableValue::List {
                items: items.iter().map(|item| slot_of(*item)).collect::<ConstEvalResult<_>>()?,
            },
            Value::Map(pairs) => TableValue::Map {
                entries: pairs
                    .iter()
                    .map(|(k, v)| -> ConstEvalResult<(Slot, Slot)> { Ok((slot_of(*k)?, slot_of(*v)?)) })
                    .collect::<ConstEvalResult<_>>()?,
            },
            Value::Object { class, fields } => TableValue::Object {
                class: class.clone(),
                fields: fields
                    .iter()
                    .map(|(name, v)| -> ConstEvalResult<(String, Slot)> { Ok((name.clone(), slot_of(*v)?)) })
                    .collect::<ConstEvalResult<_>>()?,
            },
            Value::Type(ty) => TableValue::Type {
                name: ty.name.clone(),
                args: ty.args.iter().map(|arg| lookup(*arg)).collect::<ConstEvalResult<_>>()?,
            },
        };

        slots.insert(*id, slot);
        entries.push(TableEntry {
            slot,
            source: *id,
            value: content,
        });
    }

    Ok(ConstantTable { entries })
}
