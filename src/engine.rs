//! 常量求值引擎
//!
//! 随编译上下文传递的编排对象：整程序分析开始时创建，
//! 接收调用点，按调用图波次求值，最后做摇树。

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, warn};

use crate::frontend::const_eval::const_fn::{ConstNode, Program, ProgramModel};
use crate::frontend::const_eval::context::EvalContext;
use crate::frontend::const_eval::error::{ConstEvalError, ConstEvalResult};
use crate::frontend::const_eval::resolver::CallResolver;
use crate::frontend::const_eval::site::{CallSite, CallTarget, SiteId};
use crate::frontend::const_eval::store::ValueStore;
use crate::frontend::const_eval::value::{Immediate, Value, ValueId};
use crate::middle::passes::reachability::UseSource;
use crate::middle::passes::tree_shake::{ShakeResult, TreeShaker};
use crate::util::config::EngineConfig;
use crate::util::diagnostic::Diagnostic;

/// 一次 `evaluate` 的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalReport {
    /// 本次求值的调用点数
    pub evaluated: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 调用图波次数
    pub waves: usize,
}

/// 常量求值引擎
pub struct ConstEngine {
    ctx: EvalContext,
    pool: Option<ThreadPool>,
    sites: IndexMap<SiteId, CallSite>,
    resolutions: IndexMap<SiteId, ConstEvalResult<ValueId>>,
    diagnostics: Vec<Diagnostic>,
}

impl ConstEngine {
    /// 使用默认配置创建引擎
    pub fn new(program: Program) -> Self {
        Self::with_config(program, EngineConfig::default())
    }

    /// 创建引擎，声明注册表同时作为反射模型
    pub fn with_config(
        program: Program,
        config: EngineConfig,
    ) -> Self {
        let program = Arc::new(program);
        let model: Arc<dyn ProgramModel> = program.clone();
        Self::with_model(program, model, config)
    }

    /// 使用独立的反射模型创建引擎
    pub fn with_model(
        program: Arc<Program>,
        model: Arc<dyn ProgramModel>,
        config: EngineConfig,
    ) -> Self {
        let pool = if config.parallel {
            build_pool(config.workers)
        } else {
            None
        };
        ConstEngine {
            ctx: EvalContext::new(program, model, config),
            pool,
            sites: IndexMap::new(),
            resolutions: IndexMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    pub fn store(&self) -> &ValueStore {
        self.ctx.store()
    }

    /// 驻留实参值（子值须已驻留）
    pub fn intern(
        &self,
        value: Value,
    ) -> ConstEvalResult<ValueId> {
        self.ctx.intern(value)
    }

    pub fn intern_immediate(
        &self,
        imm: Immediate,
    ) -> ConstEvalResult<ValueId> {
        self.ctx.intern(Value::Imm(imm))
    }

    pub fn intern_str(
        &self,
        s: impl Into<String>,
    ) -> ConstEvalResult<ValueId> {
        self.ctx.intern(Value::Str(s.into()))
    }

    /// 驻留用作类型实参的已解析类型
    pub fn intern_type(
        &self,
        name: impl Into<String>,
        args: Vec<ValueId>,
    ) -> ConstEvalResult<ValueId> {
        self.ctx.intern(Value::type_ref(name, args))
    }

    /// 登记待求值的调用点
    pub fn submit(
        &mut self,
        site: CallSite,
    ) -> SiteId {
        let id = SiteId(self.sites.len() as u32);
        self.sites.insert(id, site);
        id
    }

    pub fn site(
        &self,
        id: SiteId,
    ) -> Option<&CallSite> {
        self.sites.get(&id)
    }

    /// 求值上次之后提交的全部调用点
    ///
    /// 非致命错误记为诊断并继续；内部一致性错误中止本次求值。
    pub fn evaluate(&mut self) -> ConstEvalResult<EvalReport> {
        let waves = self.plan_waves();
        let mut report = EvalReport {
            waves: waves.len(),
            ..EvalReport::default()
        };

        for (height, ids) in waves {
            debug!("evaluating wave {} with {} site(s)", height, ids.len());
            for (id, result) in self.run_wave(&ids) {
                report.evaluated += 1;
                if result.is_ok() {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
                self.settle(id, result)?;
            }
        }

        info!(
            "constant evaluation: {} site(s) evaluated, {} failed, {} value(s) interned",
            report.evaluated,
            report.failed,
            self.ctx.store().len()
        );
        Ok(report)
    }

    /// 按目标在调用图中的高度分组待求值调用点
    fn plan_waves(&self) -> BTreeMap<usize, Vec<SiteId>> {
        let graph = self.ctx.call_graph();
        let mut waves: BTreeMap<usize, Vec<SiteId>> = BTreeMap::new();
        for (id, site) in &self.sites {
            if self.resolutions.contains_key(id) {
                continue;
            }
            let height = match &site.target {
                CallTarget::Function(name) => graph.height(&ConstNode::Function(name.clone())),
                _ => 0,
            };
            waves.entry(height).or_default().push(*id);
        }
        waves
    }

    fn run_wave(
        &self,
        ids: &[SiteId],
    ) -> Vec<(SiteId, ConstEvalResult<ValueId>)> {
        let resolver = CallResolver::new(&self.ctx);
        let resolve = |id: &SiteId| {
            let result = match self.sites.get(id) {
                Some(site) => resolver.resolve(site),
                None => Err(ConstEvalError::internal(format!("{} was never submitted", id))),
            };
            (*id, result)
        };

        if !self.ctx.config().parallel || ids.len() < 2 {
            return ids.iter().map(resolve).collect();
        }
        match &self.pool {
            Some(pool) => pool.install(|| ids.par_iter().map(resolve).collect()),
            None => ids.par_iter().map(resolve).collect(),
        }
    }

    fn settle(
        &mut self,
        id: SiteId,
        result: ConstEvalResult<ValueId>,
    ) -> ConstEvalResult<()> {
        match &result {
            Ok(value) => {
                self.ctx.uses().record(UseSource::Site(id), *value);
            }
            Err(err) if !err.is_fatal() => {
                let span = self.sites.get(&id).map(|site| site.span).unwrap_or_default();
                debug!("{} failed: {}", id, err);
                self.diagnostics.push(Diagnostic::from_const_error(err, span));
            }
            Err(_) => {}
        }

        let fatal = result.as_ref().err().filter(|err| err.is_fatal()).cloned();
        self.resolutions.insert(id, result);
        if let Some(err) = fatal {
            error!("{}: {}", id, err);
            return Err(err);
        }
        Ok(())
    }

    pub fn resolution(
        &self,
        site: SiteId,
    ) -> Option<&ConstEvalResult<ValueId>> {
        self.resolutions.get(&site)
    }

    /// 调用点成功解析出的常量
    pub fn value_of(
        &self,
        site: SiteId,
    ) -> Option<ValueId> {
        self.resolutions.get(&site).and_then(|r| r.as_ref().ok().copied())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// 收尾：求值剩余调用点，再按保留的调用点摇树
    pub fn finish(
        &mut self,
        retained: &[SiteId],
    ) -> ConstEvalResult<ShakeResult> {
        if self.sites.keys().any(|id| !self.resolutions.contains_key(id)) {
            self.evaluate()?;
        }
        let shaker = TreeShaker::new(self.ctx.store(), self.ctx.uses());
        let result = shaker.shake(&self.resolutions, retained)?;
        info!(
            "constant table: {} of {} value(s) kept, {} site(s) rewritten",
            result.stats.kept,
            result.stats.total_values,
            result.rewrites.len()
        );
        Ok(result)
    }

    /// 保留全部调用点收尾
    pub fn finish_all(&mut self) -> ConstEvalResult<ShakeResult> {
        let retained: Vec<SiteId> = self.sites.keys().copied().collect();
        self.finish(&retained)
    }
}

fn build_pool(workers: Option<usize>) -> Option<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("consteval-{}", i));
    if let Some(workers) = workers {
        builder = builder.num_threads(workers);
    }
    match builder.build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("failed to build the evaluation pool, falling back to the global pool: {}", e);
            None
        }
    }
}
