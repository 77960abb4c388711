//! 求值上下文
//!
//! 一次整程序分析共享的全部状态：声明、程序模型、驻留表、使用边、
//! 记忆化缓存以及调用图。随编译上下文传递，没有进程级全局状态。

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::const_fn::{ConstNode, Program, ProgramModel};
use super::error::{ConstEvalError, ConstEvalResult};
use super::memo::MemoCache;
use super::safety::{check_function, check_variable, Dependencies};
use super::store::ValueStore;
use super::value::{Value, ValueId};
use crate::middle::passes::call_graph::ConstCallGraph;
use crate::middle::passes::reachability::{UseGraph, UseSource};
use crate::util::config::EngineConfig;

/// 求值上下文
pub struct EvalContext {
    program: Arc<Program>,
    model: Arc<dyn ProgramModel>,
    config: EngineConfig,
    store: ValueStore,
    uses: UseGraph,
    memo: MemoCache,
    graph: ConstCallGraph,
    /// 每个const节点的静态检查结论（安全检查 + 递归检查）
    verdicts: IndexMap<ConstNode, ConstEvalResult<()>>,
}

impl EvalContext {
    /// 创建上下文并对全部const声明做静态检查
    pub fn new(
        program: Arc<Program>,
        model: Arc<dyn ProgramModel>,
        config: EngineConfig,
    ) -> Self {
        let mut verdicts = IndexMap::new();
        let mut deps: IndexMap<ConstNode, Dependencies> = IndexMap::new();

        for (name, def) in program.const_fns() {
            let node = ConstNode::Function(name.to_string());
            let checked = check_function(def, &program, model.as_ref());
            record(&mut verdicts, &mut deps, node, checked);
        }
        for (name, def) in program.const_vars() {
            let node = ConstNode::Variable(name.to_string());
            let checked = check_variable(def, &program, model.as_ref());
            record(&mut verdicts, &mut deps, node, checked);
        }

        let graph = ConstCallGraph::build(deps);
        for node in graph.cyclic() {
            let reason = match node {
                ConstNode::Function(name) => format!("'{}' is recursive", name),
                ConstNode::Variable(name) => format!("const variable '{}' depends on itself", name),
            };
            verdicts.insert(node.clone(), Err(ConstEvalError::not_const(reason)));
        }

        // 高度即从该节点出发的最长嵌套调用链，深度限制与调用顺序无关
        let limit = config.max_call_depth;
        for node in graph.topological_order() {
            let accepted = verdicts.get(node).is_some_and(|v| v.is_ok());
            if accepted && graph.height(node) >= limit {
                verdicts.insert(
                    node.clone(),
                    Err(ConstEvalError::NonTerminating {
                        function: node.name().to_string(),
                        limit,
                        unit: "nested calls",
                    }),
                );
            }
        }

        debug!(
            "const declarations checked: {} node(s), {} rejected",
            verdicts.len(),
            verdicts.values().filter(|v| v.is_err()).count()
        );

        EvalContext {
            program,
            model,
            config,
            store: ValueStore::new(),
            uses: UseGraph::new(),
            memo: MemoCache::new(),
            graph,
            verdicts,
        }
    }

    /// 节点的静态检查结论
    pub fn verdict(
        &self,
        node: &ConstNode,
    ) -> ConstEvalResult<()> {
        match self.verdicts.get(node) {
            Some(verdict) => verdict.clone(),
            None => Err(ConstEvalError::unresolved(node.name(), "not a declared const function or variable")),
        }
    }

    /// 驻留值并为每个引用子值记录使用边
    pub fn intern(
        &self,
        value: Value,
    ) -> ConstEvalResult<ValueId> {
        let children = value.children();
        let id = self.store.intern(value)?;
        for child in children {
            self.uses.record(UseSource::Value(id), child);
        }
        Ok(id)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn model(&self) -> &dyn ProgramModel {
        self.model.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn uses(&self) -> &UseGraph {
        &self.uses
    }

    pub fn memo(&self) -> &MemoCache {
        &self.memo
    }

    pub fn call_graph(&self) -> &ConstCallGraph {
        &self.graph
    }
}

fn record(
    verdicts: &mut IndexMap<ConstNode, ConstEvalResult<()>>,
    deps: &mut IndexMap<ConstNode, Dependencies>,
    node: ConstNode,
    checked: ConstEvalResult<Dependencies>,
) {
    match checked {
        Ok(node_deps) => {
            verdicts.insert(node.clone(), Ok(()));
            deps.insert(node, node_deps);
        }
        Err(err) => {
            debug!("{} rejected: {}", node, err);
            verdicts.insert(node.clone(), Err(err));
            deps.insert(node, Dependencies::new());
        }
    }
}
