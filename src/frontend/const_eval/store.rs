//! 常量驻留表（Value Store）
//!
//! - 结构相等的值共享同一个 ValueId
//! - 驻留自底向上：子值必须先于父值驻留，引用只能指向更小的 id
//! - 线程安全：查找与插入在同一个 `parking_lot::Mutex` 临界区内完成

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::trace;

use super::error::{ConstEvalError, ConstEvalResult};
use super::value::{Immediate, Operand, Value, ValueId};

/// 驻留统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// intern 调用次数
    pub requests: usize,
    /// 命中已有值的次数
    pub deduplicated: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    values: IndexSet<Arc<Value>>,
    stats: StoreStats,
}

/// 常量驻留表
#[derive(Debug, Default)]
pub struct ValueStore {
    inner: Mutex<StoreInner>,
}

impl ValueStore {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 驻留候选值，返回已有的结构相等值的 id 或新 id
    ///
    /// 候选值引用不存在的 id 属于调用方的编程错误，报告为 `InternalConsistencyFault`。
    pub fn intern(
        &self,
        candidate: Value,
    ) -> ConstEvalResult<ValueId> {
        let mut inner = self.inner.lock();
        inner.stats.requests += 1;

        if let Some(index) = inner.values.get_index_of(&candidate) {
            inner.stats.deduplicated += 1;
            return Ok(ValueId(index as u32));
        }

        let len = inner.values.len();
        if let Some(dangling) = candidate.children().into_iter().find(|c| c.index() >= len) {
            return Err(ConstEvalError::internal(format!(
                "value {} references {} which has not been interned",
                candidate, dangling
            )));
        }

        let id = u32::try_from(len)
            .map(ValueId)
            .map_err(|_| ConstEvalError::internal("constant table exceeds u32::MAX entries"))?;
        trace!("intern {} = {}", id, candidate);
        inner.values.insert(Arc::new(candidate));
        Ok(id)
    }

    /// 驻留一个槽位值（标量转为 `Value::Imm`）
    pub fn intern_operand(
        &self,
        operand: Operand,
    ) -> ConstEvalResult<ValueId> {
        match operand {
            Operand::Ref(id) => {
                self.get(id)?;
                Ok(id)
            }
            Operand::Imm(imm) => self.intern(Value::Imm(imm)),
        }
    }

    /// 按 id 取值
    pub fn get(
        &self,
        id: ValueId,
    ) -> ConstEvalResult<Arc<Value>> {
        self.inner
            .lock()
            .values
            .get_index(id.index())
            .cloned()
            .ok_or_else(|| ConstEvalError::internal(format!("unknown value id {}", id)))
    }

    /// 把 id 转为槽位：标量内联，其余保持引用
    pub fn operand_of(
        &self,
        id: ValueId,
    ) -> ConstEvalResult<Operand> {
        let value = self.get(id)?;
        Ok(match value.as_ref() {
            Value::Imm(imm) => Operand::Imm(*imm),
            _ => Operand::Ref(id),
        })
    }

    /// 按槽位读取标量（引用到 `Value::Imm` 也会解开）
    pub fn immediate_of(
        &self,
        operand: Operand,
    ) -> ConstEvalResult<Option<Immediate>> {
        match operand {
            Operand::Imm(imm) => Ok(Some(imm)),
            Operand::Ref(id) => match self.get(id)?.as_ref() {
                Value::Imm(imm) => Ok(Some(*imm)),
                _ => Ok(None),
            },
        }
    }

    /// 已驻留值数量
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 统计信息
    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats
    }

    /// 当前全部值的快照（按 id 顺序）
    pub fn snapshot(&self) -> Vec<Arc<Value>> {
        self.inner.lock().values.iter().cloned().collect()
    }
}
