//! End-to-end scenarios
//!
//! Whole-program flows: submit call sites, evaluate, shake the constant table.

use consteval::middle::UseSource;
use consteval::{
    BinOp, CallSite, ConstEngine, ConstExpr, ConstFunctionDef, EngineConfig, ErrorKind, Immediate,
    Operand, Program, Reflection, TypeDeclaration, TypeExpr, Value,
};

fn declare(
    program: &mut Program,
    name: &str,
    params: &[&str],
    body: ConstExpr,
) {
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(name, params, body))
        .unwrap();
}

#[test]
fn test_add_one_yields_interned_six() {
    let mut program = Program::new();
    declare(
        &mut program,
        "addOne",
        &["x"],
        ConstExpr::binary(BinOp::Add, ConstExpr::reference("x"), ConstExpr::int(1)),
    );
    let mut engine = ConstEngine::new(program);
    let five = engine.intern_immediate(Immediate::Int(5)).unwrap();
    let site = engine.submit(CallSite::new("addOne", vec![five]));

    let report = engine.evaluate().unwrap();
    assert_eq!((report.succeeded, report.failed), (1, 0));
    let six = engine.value_of(site).unwrap();
    assert_eq!(*engine.store().get(six).unwrap(), Value::Imm(Immediate::Int(6)));

    // 参数 5 没有被任何保留的调用点引用
    let shaken = engine.finish_all().unwrap();
    assert_eq!(shaken.emit, vec![six]);
    assert!(shaken.discard.contains(&five));
    assert_eq!(shaken.table.len(), 1);
    assert_eq!(shaken.slot_for(site), Some(0));
}

#[test]
fn test_two_sites_share_one_constant() {
    let mut program = Program::new();
    declare(&mut program, "five", &[], ConstExpr::int(5));
    let mut engine = ConstEngine::new(program);
    let a = engine.submit(CallSite::new("five", vec![]));
    let b = engine.submit(CallSite::new("five", vec![]));
    engine.evaluate().unwrap();

    let id = engine.value_of(a).unwrap();
    assert_eq!(engine.value_of(b), Some(id));
    assert_eq!(engine.context().memo().stats().misses, 1);

    let kept = engine.finish(&[b]).unwrap();
    assert_eq!(kept.table.len(), 1);
    assert_eq!(kept.rewrites.len(), 1);

    let none = engine.finish(&[]).unwrap();
    assert!(none.emit.is_empty());
    assert_eq!(none.discard, vec![id]);
    assert!(none.rewrites.is_empty());
}

fn config_program() -> Program {
    let mut program = Program::new();
    program.declare_type(TypeDeclaration::new(
        "Config",
        &[("name", "String"), ("tags", "List"), ("size", "int")],
    ));
    declare(&mut program, "label", &[], ConstExpr::str("cfg"));
    declare(
        &mut program,
        "tags",
        &[],
        ConstExpr::List(vec![ConstExpr::int(1), ConstExpr::int(2)]),
    );
    declare(
        &mut program,
        "build",
        &[],
        ConstExpr::object(
            "Config",
            vec![
                ("name", ConstExpr::call("label", vec![])),
                ("tags", ConstExpr::call("tags", vec![])),
                ("size", ConstExpr::int(3)),
            ],
        ),
    );
    program
}

#[test]
fn test_composite_records_edges_to_nested_results() {
    let mut engine = ConstEngine::new(config_program());
    let site = engine.submit(CallSite::new("build", vec![]));
    engine.evaluate().unwrap();

    let object = engine.value_of(site).unwrap();
    let children = engine.context().uses().targets_of(UseSource::Value(object));
    assert_eq!(children.len(), 2);
    assert_eq!(engine.store().len(), 3);

    let kept = engine.finish(&[site]).unwrap();
    assert_eq!(kept.emit.len(), 3);
    assert_eq!(kept.slot_for(site), Some(2));

    // 调用点不可达时三个值一起被丢弃
    let dropped = engine.finish(&[]).unwrap();
    assert!(dropped.emit.is_empty());
    assert_eq!(dropped.discard.len(), 3);
}

#[test]
fn test_non_terminating_loop_reports_instead_of_hanging() {
    let mut program = Program::new();
    declare(
        &mut program,
        "spin",
        &[],
        ConstExpr::block(
            vec![consteval::Stmt::While {
                condition: ConstExpr::bool(true),
                body: vec![],
            }],
            ConstExpr::null(),
        ),
    );
    let mut engine = ConstEngine::with_config(program, EngineConfig::default().with_step_budget(1_000));
    let site = engine.submit(CallSite::new("spin", vec![]));

    let report = engine.evaluate().unwrap();
    assert_eq!(report.failed, 1);
    let err = engine.resolution(site).unwrap().as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonTerminating);
    assert_eq!(engine.diagnostics()[0].code, "C0005");
    assert!(engine.finish_all().unwrap().rewrites.is_empty());
}

#[test]
fn test_equal_composites_from_distinct_paths_collapse() {
    let mut program = Program::new();
    declare(
        &mut program,
        "literal",
        &[],
        ConstExpr::List(vec![ConstExpr::str("a"), ConstExpr::int(2)]),
    );
    declare(
        &mut program,
        "computed",
        &["s"],
        ConstExpr::List(vec![
            ConstExpr::binary(BinOp::Add, ConstExpr::reference("s"), ConstExpr::str("")),
            ConstExpr::binary(BinOp::Add, ConstExpr::int(1), ConstExpr::int(1)),
        ]),
    );
    let mut engine = ConstEngine::new(program);
    let a = engine.intern_str("a").unwrap();
    let first = engine.submit(CallSite::new("literal", vec![]));
    let second = engine.submit(CallSite::new("computed", vec![a]));
    engine.evaluate().unwrap();

    let id = engine.value_of(first).unwrap();
    assert_eq!(engine.value_of(second), Some(id));
    assert_eq!(
        *engine.store().get(id).unwrap(),
        Value::List(vec![Operand::Ref(a), Operand::int(2)])
    );

    // 任意一条路径保留都会让同一个值存活
    let kept = engine.finish(&[second]).unwrap();
    assert!(kept.emit.contains(&id));
    assert!(kept.emit.contains(&a));
    assert_eq!(kept.rewrites.get(&second), Some(&id));
    assert!(kept.rewrites.get(&first).is_none());
}

#[test]
fn test_reflection_keeps_only_derived_constants() {
    let mut program = Program::new();
    program.declare_type(TypeDeclaration::new("Point", &[("x", "int"), ("y", "int")]));
    declare(
        &mut program,
        "fields",
        &[],
        ConstExpr::Reflect(Reflection::FieldNames(TypeExpr::named("Point"))),
    );
    let mut engine = ConstEngine::new(program);
    let site = engine.submit(CallSite::new("fields", vec![]));
    let shaken = engine.finish_all().unwrap();

    // 两个字段名加一个列表
    assert_eq!(engine.store().len(), 3);
    assert_eq!(shaken.table.len(), 3);
    let id = shaken.rewrites[&site];
    assert_eq!(engine.store().get(id).unwrap().to_string(), "[#0, #1]");
}

#[test]
fn test_callers_and_callees_run_in_separate_waves() {
    let mut program = Program::new();
    declare(
        &mut program,
        "square",
        &["x"],
        ConstExpr::binary(BinOp::Mul, ConstExpr::reference("x"), ConstExpr::reference("x")),
    );
    declare(
        &mut program,
        "quad",
        &["x"],
        ConstExpr::call("square", vec![ConstExpr::call("square", vec![ConstExpr::reference("x")])]),
    );
    let mut engine = ConstEngine::new(program);
    let three = engine.intern_immediate(Immediate::Int(3)).unwrap();
    let nine = engine.intern_immediate(Immediate::Int(9)).unwrap();
    let outer = engine.submit(CallSite::new("quad", vec![three]));
    let inner = engine.submit(CallSite::new("square", vec![nine]));

    let report = engine.evaluate().unwrap();
    assert_eq!(report.waves, 2);
    assert_eq!(*engine.store().get(engine.value_of(outer).unwrap()).unwrap(), Value::Imm(Immediate::Int(81)));
    assert_eq!(engine.value_of(inner), engine.value_of(outer));
    // square(9) 在第一波求值，quad 内部的调用命中缓存
    assert_eq!(engine.context().memo().stats().hits, 1);
}

#[test]
fn test_generic_const_function_with_type_argument() {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::new(
            "name",
            vec![consteval::Param::Type("T".to_string())],
            ConstExpr::Reflect(Reflection::TypeName(TypeExpr::Param("T".to_string()))),
        ))
        .unwrap();
    let mut engine = ConstEngine::new(program);
    let int_ty = engine.intern_type("int", vec![]).unwrap();
    let map_ty = engine.intern_type("Map", vec![int_ty, int_ty]).unwrap();
    let site = engine.submit(
        CallSite::new("name", vec![]).with_type_args(vec![consteval::Argument::Const(map_ty)]),
    );
    engine.evaluate().unwrap();
    let id = engine.value_of(site).unwrap();
    assert_eq!(*engine.store().get(id).unwrap(), Value::Str("Map<int, int>".to_string()));
}

#[test]
fn test_string_builder_loop_keeps_the_table_small() {
    use consteval::Stmt;

    fn r(name: &str) -> ConstExpr {
        ConstExpr::reference(name)
    }

    let mut program = Program::new();
    declare(
        &mut program,
        "build",
        &["n"],
        ConstExpr::block(
            vec![
                Stmt::Let { name: "s".to_string(), value: ConstExpr::str("") },
                Stmt::Let { name: "i".to_string(), value: ConstExpr::int(0) },
                Stmt::While {
                    condition: ConstExpr::binary(BinOp::Lt, r("i"), r("n")),
                    body: vec![
                        Stmt::Assign {
                            name: "s".to_string(),
                            value: ConstExpr::binary(BinOp::Add, r("s"), ConstExpr::str("x")),
                        },
                        Stmt::Assign {
                            name: "i".to_string(),
                            value: ConstExpr::binary(BinOp::Add, r("i"), ConstExpr::int(1)),
                        },
                    ],
                },
            ],
            r("s"),
        ),
    );
    let mut engine = ConstEngine::new(program);
    let n = engine.intern_immediate(Immediate::Int(5_000)).unwrap();
    let site = engine.submit(CallSite::new("build", vec![n]));
    engine.evaluate().unwrap();

    // 实参与最终字符串
    assert_eq!(engine.store().len(), 2);
    let id = engine.value_of(site).unwrap();
    assert_eq!(*engine.store().get(id).unwrap(), Value::Str("x".repeat(5_000)));
}
