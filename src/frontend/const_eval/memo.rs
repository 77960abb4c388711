//! 求值记忆化缓存
//!
//! 每个键对应一个 `OnceCell`：
//! - 同一个键最多求值一次，并发请求者阻塞等待第一个求值者并采用其结果
//! - 错误同样被缓存，重复调用得到相同诊断
//!
//! 递归在求值前被调用图拒绝，因此等待关系沿无环的调用图展开，不会死锁。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::error::ConstEvalResult;
use super::value::{Operand, ValueId};

/// 参数槽位：类型实参在前，值实参在后
pub type ArgList = SmallVec<[Operand; 4]>;

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoKey {
    /// const函数调用
    Call { function: String, args: ArgList },
    /// const变量
    Variable(String),
}

impl MemoKey {
    pub fn call(
        function: &str,
        type_args: &[ValueId],
        args: &[Operand],
    ) -> Self {
        let mut slots = ArgList::with_capacity(type_args.len() + args.len());
        slots.extend(type_args.iter().map(|t| Operand::Ref(*t)));
        slots.extend(args.iter().copied());
        MemoKey::Call {
            function: function.to_string(),
            args: slots,
        }
    }
}

type Cell = Arc<OnceCell<ConstEvalResult<ValueId>>>;

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    /// 缓存命中次数（包括等待其他线程完成的请求）
    pub hits: usize,
    /// 实际求值次数
    pub misses: usize,
    /// 缓存条目数
    pub entries: usize,
}

impl MemoStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 记忆化缓存
#[derive(Debug, Default)]
pub struct MemoCache {
    cells: Mutex<HashMap<MemoKey, Cell>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(
        &self,
        key: MemoKey,
    ) -> Cell {
        Arc::clone(self.cells.lock().entry(key).or_default())
    }

    /// 取缓存结果，或在当前线程求值并写入
    ///
    /// 锁只在取出 cell 时持有，`evaluate` 执行期间不持有任何锁。
    pub fn get_or_evaluate(
        &self,
        key: MemoKey,
        evaluate: impl FnOnce() -> ConstEvalResult<ValueId>,
    ) -> ConstEvalResult<ValueId> {
        let cell = self.cell(key.clone());
        let mut evaluated = false;
        let result = cell
            .get_or_init(|| {
                evaluated = true;
                evaluate()
            })
            .clone();

        if evaluated {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("memo hit {:?}", key);
        }
        result
    }

    /// 查看已缓存的结果（不触发求值）
    pub fn peek(
        &self,
        key: &MemoKey,
    ) -> Option<ConstEvalResult<ValueId>> {
        let cell = self.cells.lock().get(key).cloned()?;
        cell.get().cloned()
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cells.lock().len(),
        }
    }
}
