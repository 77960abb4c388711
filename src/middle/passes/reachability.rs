//! 常量可达性分析
//!
//! 记录使用边（UseEdge），并从保留的调用点出发计算活跃常量集合，
//! 用于常量表的摇树优化。

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::trace;

use crate::frontend::const_eval::site::SiteId;
use crate::frontend::const_eval::value::ValueId;

/// 使用边的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSource {
    /// 调用点直接引用其结果
    Site(SiteId),
    /// 组合值引用其子值
    Value(ValueId),
}

/// 一条使用边
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseEdge {
    pub from: UseSource,
    pub to: ValueId,
}

#[derive(Debug, Default)]
struct UseGraphInner {
    edges: IndexSet<UseEdge>,
    adjacency: HashMap<UseSource, Vec<ValueId>>,
}

/// 使用边集合（只增不改，可并发记录）
#[derive(Debug, Default)]
pub struct UseGraph {
    inner: Mutex<UseGraphInner>,
}

impl UseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条边，重复记录返回 false
    pub fn record(
        &self,
        from: UseSource,
        to: ValueId,
    ) -> bool {
        let mut inner = self.inner.lock();
        if !inner.edges.insert(UseEdge { from, to }) {
            return false;
        }
        trace!("use {:?} -> {}", from, to);
        inner.adjacency.entry(from).or_default().push(to);
        true
    }

    /// 按记录顺序的全部边
    pub fn edges(&self) -> Vec<UseEdge> {
        self.inner.lock().edges.iter().copied().collect()
    }

    /// 某个来源直接引用的值
    pub fn targets_of(
        &self,
        from: UseSource,
    ) -> Vec<ValueId> {
        self.inner.lock().adjacency.get(&from).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 保留调用点直接引用的根值
    pub fn roots_for(
        &self,
        sites: &[SiteId],
    ) -> Vec<ValueId> {
        let inner = self.inner.lock();
        let mut roots = IndexSet::new();
        for site in sites {
            if let Some(targets) = inner.adjacency.get(&UseSource::Site(*site)) {
                roots.extend(targets.iter().copied());
            }
        }
        roots.into_iter().collect()
    }

    /// 从根值出发沿 Value 边做 BFS
    ///
    /// 不修改任何状态，可重复调用。
    pub fn compute_live_set(
        &self,
        roots: &[ValueId],
    ) -> LiveSet {
        let inner = self.inner.lock();
        let mut live = LiveSet::default();
        let mut queue = VecDeque::new();

        for root in roots {
            if live.depth.insert(*root, 0).is_none() {
                live.roots.insert(*root);
                queue.push_back(*root);
            }
        }

        while let Some(current) = queue.pop_front() {
            let depth = live.depth.get(&current).copied().unwrap_or(0);
            let Some(children) = inner.adjacency.get(&UseSource::Value(current)) else {
                continue;
            };
            for child in children {
                if !live.depth.contains_key(child) {
                    live.depth.insert(*child, depth + 1);
                    queue.push_back(*child);
                }
            }
        }

        live
    }
}

/// 活跃常量集合
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    roots: HashSet<ValueId>,
    /// 每个活跃值距最近根的距离
    depth: HashMap<ValueId, usize>,
}

impl LiveSet {
    pub fn contains(
        &self,
        id: ValueId,
    ) -> bool {
        self.depth.contains_key(&id)
    }

    pub fn is_root(
        &self,
        id: ValueId,
    ) -> bool {
        self.roots.contains(&id)
    }

    pub fn depth(
        &self,
        id: ValueId,
    ) -> Option<usize> {
        self.depth.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    /// 按 id 升序
    pub fn sorted(&self) -> Vec<ValueId> {
        let mut ids: Vec<ValueId> = self.depth.keys().copied().collect();
        ids.sort();
        ids
    }

    /// 最大深度
    pub fn max_depth(&self) -> Option<usize> {
        self.depth.values().max().copied()
    }
}
