//! Parallel evaluation tests
//!
//! Sites in one wave run on the worker pool; results, memo behaviour and the
//! interned constants must match a sequential run.

use consteval::{
    BinOp, CallSite, ConstEngine, ConstExpr, ConstFunctionDef, EngineConfig, Immediate, Program, SiteId,
    Stmt, Value,
};

fn program() -> Program {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "square",
            &["x"],
            ConstExpr::binary(BinOp::Mul, ConstExpr::reference("x"), ConstExpr::reference("x")),
        ))
        .unwrap();
    // sumSquares(n) = 0² + 1² + ... + (n-1)²
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "sumSquares",
            &["n"],
            ConstExpr::block(
                vec![
                    Stmt::Let {
                        name: "acc".to_string(),
                        value: ConstExpr::int(0),
                    },
                    Stmt::For {
                        var: "i".to_string(),
                        iterable: ConstExpr::range(ConstExpr::int(0), ConstExpr::reference("n")),
                        body: vec![Stmt::Assign {
                            name: "acc".to_string(),
                            value: ConstExpr::binary(
                                BinOp::Add,
                                ConstExpr::reference("acc"),
                                ConstExpr::call("square", vec![ConstExpr::reference("i")]),
                            ),
                        }],
                    },
                ],
                ConstExpr::reference("acc"),
            ),
        ))
        .unwrap();
    // table(n) = [[i, square(i)] for i in 0..n]
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "table",
            &["n"],
            ConstExpr::ListFor {
                var: "i".to_string(),
                iterable: Box::new(ConstExpr::range(ConstExpr::int(0), ConstExpr::reference("n"))),
                filter: None,
                element: Box::new(ConstExpr::List(vec![
                    ConstExpr::reference("i"),
                    ConstExpr::call("square", vec![ConstExpr::reference("i")]),
                ])),
            },
        ))
        .unwrap();
    program
}

fn run(config: EngineConfig) -> (ConstEngine, Vec<SiteId>) {
    let mut engine = ConstEngine::with_config(program(), config);
    let mut sites = Vec::new();
    for i in 0..120 {
        let n = engine.intern_immediate(Immediate::Int(i % 15)).unwrap();
        let function = if i % 2 == 0 { "sumSquares" } else { "table" };
        sites.push(engine.submit(CallSite::new(function, vec![n])));
    }
    engine.evaluate().unwrap();
    (engine, sites)
}

/// 把结果展开为与 id 无关的文本形式
fn render(
    engine: &ConstEngine,
    value: &Value,
) -> String {
    match value {
        Value::List(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item.as_ref_id() {
                    Some(id) => render(engine, &engine.store().get(id).unwrap()),
                    None => item.to_string(),
                })
                .collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let (sequential, seq_sites) = run(EngineConfig::default());
    let (parallel, par_sites) = run(EngineConfig::default().with_parallel(Some(4)));

    for (a, b) in seq_sites.iter().zip(&par_sites) {
        let left = sequential.store().get(sequential.value_of(*a).unwrap()).unwrap();
        let right = parallel.store().get(parallel.value_of(*b).unwrap()).unwrap();
        assert_eq!(render(&sequential, &left), render(&parallel, &right));
    }
    assert_eq!(sequential.store().len(), parallel.store().len());

    let seq_stats = sequential.context().memo().stats();
    let par_stats = parallel.context().memo().stats();
    assert_eq!(seq_stats.misses, par_stats.misses);
    assert_eq!(seq_stats.entries, par_stats.entries);
}

#[test]
fn test_parallel_evaluates_each_key_once() {
    let (engine, sites) = run(EngineConfig::default().with_parallel(None));
    let stats = engine.context().memo().stats();
    // 15 个 sumSquares 键、15 个 table 键、14 个 square 键
    assert_eq!(stats.misses, 44);
    assert!(stats.hits > 0);

    let repeated = engine.value_of(sites[0]).unwrap();
    assert_eq!(engine.value_of(sites[30]), Some(repeated));
    assert_eq!(*engine.store().get(repeated).unwrap(), Value::Imm(Immediate::Int(0)));
}

#[test]
fn test_parallel_shake_is_consistent() {
    let (mut sequential, seq_sites) = run(EngineConfig::default());
    let (mut parallel, par_sites) = run(EngineConfig::default().with_parallel(Some(2)));

    let keep_seq: Vec<SiteId> = seq_sites.iter().copied().step_by(7).collect();
    let keep_par: Vec<SiteId> = par_sites.iter().copied().step_by(7).collect();
    let left = sequential.finish(&keep_seq).unwrap();
    let right = parallel.finish(&keep_par).unwrap();

    assert_eq!(left.table.len(), right.table.len());
    assert_eq!(left.rewrites.len(), right.rewrites.len());
    assert_eq!(left.stats.eliminated, right.stats.eliminated);
}
