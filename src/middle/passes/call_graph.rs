//! Const调用图
//!
//! const函数与const变量之间的静态依赖图。
//! - Kahn 拓扑排序：排序后剩余的节点位于环上或依赖环
//! - 高度：叶子为 0，其余为依赖最大高度加一；同高度的调用点构成一个求值波次

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::frontend::const_eval::const_fn::ConstNode;
use crate::frontend::const_eval::safety::Dependencies;

/// Const调用图
#[derive(Debug, Clone, Default)]
pub struct ConstCallGraph {
    deps: IndexMap<ConstNode, Dependencies>,
    /// 依赖在前的拓扑序（不含剩余节点）
    order: Vec<ConstNode>,
    heights: HashMap<ConstNode, usize>,
    /// 位于环上的节点
    cyclic: IndexSet<ConstNode>,
}

impl ConstCallGraph {
    /// 由每个节点的直接依赖构建
    pub fn build(deps: IndexMap<ConstNode, Dependencies>) -> Self {
        let (order, heights, cyclic) = kahn(&deps);
        if !cyclic.is_empty() {
            debug!(
                "const call graph has {} recursive node(s): {}",
                cyclic.len(),
                cyclic.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
            );
        }
        ConstCallGraph {
            deps,
            order,
            heights,
            cyclic,
        }
    }

    /// 节点高度（未知节点为 0）
    pub fn height(
        &self,
        node: &ConstNode,
    ) -> usize {
        self.heights.get(node).copied().unwrap_or(0)
    }

    /// 节点是否在环上（直接或间接递归）
    pub fn is_cyclic(
        &self,
        node: &ConstNode,
    ) -> bool {
        self.cyclic.contains(node)
    }

    pub fn cyclic(&self) -> impl Iterator<Item = &ConstNode> {
        self.cyclic.iter()
    }

    pub fn topological_order(&self) -> &[ConstNode] {
        &self.order
    }

    pub fn dependencies(
        &self,
        node: &ConstNode,
    ) -> Option<&Dependencies> {
        self.deps.get(node)
    }

    pub fn node_count(&self) -> usize {
        self.deps.len()
    }
}

type SortResult = (Vec<ConstNode>, HashMap<ConstNode, usize>, IndexSet<ConstNode>);

fn kahn(deps: &IndexMap<ConstNode, Dependencies>) -> SortResult {
    let mut in_degree: HashMap<&ConstNode, usize> = HashMap::new();
    let mut dependents: HashMap<&ConstNode, Vec<&ConstNode>> = HashMap::new();

    for (node, node_deps) in deps {
        let known: Vec<&ConstNode> = node_deps.iter().filter(|d| deps.contains_key(*d)).collect();
        in_degree.insert(node, known.len());
        for dep in known {
            dependents.entry(dep).or_default().push(node);
        }
    }

    let mut queue: VecDeque<&ConstNode> = deps
        .keys()
        .filter(|n| in_degree.get(n).copied() == Some(0))
        .collect();
    let mut order = Vec::with_capacity(deps.len());
    let mut heights: HashMap<ConstNode, usize> = HashMap::new();

    while let Some(node) = queue.pop_front() {
        let height = deps
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|d| heights.get(d))
            .map(|h| h + 1)
            .max()
            .unwrap_or(0);
        heights.insert(node.clone(), height);
        order.push(node.clone());

        for dependent in dependents.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    // 剩余节点统一放在最高层之上
    let top = heights.values().max().map(|h| h + 1).unwrap_or(0);
    let mut cyclic = IndexSet::new();
    for node in deps.keys() {
        if heights.contains_key(node) {
            continue;
        }
        if reaches(deps, node, node) {
            cyclic.insert(node.clone());
        }
        heights.insert(node.clone(), top);
    }

    (order, heights, cyclic)
}

/// `from` 的依赖能否到达 `target`
fn reaches(
    deps: &IndexMap<ConstNode, Dependencies>,
    from: &ConstNode,
    target: &ConstNode,
) -> bool {
    let mut stack: Vec<&ConstNode> = deps.get(from).into_iter().flatten().collect();
    let mut seen: HashSet<&ConstNode> = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if seen.insert(node) {
            stack.extend(deps.get(node).into_iter().flatten());
        }
    }
    false
}
