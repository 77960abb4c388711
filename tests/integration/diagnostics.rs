//! Diagnostics integration tests
//!
//! Every recoverable failure becomes a diagnostic with a stable code and the
//! call site's location; only an internal consistency fault aborts the pass.

use consteval::util::span::Span;
use consteval::{
    Argument, BinOp, CallSite, CallTarget, ConstEngine, ConstExpr, ConstFunctionDef, Diagnostic,
    DiagnosticEmitter, Immediate, JsonEmitter, Program, TextEmitter, ValueId,
};

fn program() -> Program {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "addOne",
            &["x"],
            ConstExpr::binary(BinOp::Add, ConstExpr::reference("x"), ConstExpr::int(1)),
        ))
        .unwrap();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "fact",
            &["n"],
            ConstExpr::if_else(
                ConstExpr::binary(BinOp::Le, ConstExpr::reference("n"), ConstExpr::int(1)),
                ConstExpr::int(1),
                ConstExpr::binary(
                    BinOp::Mul,
                    ConstExpr::reference("n"),
                    ConstExpr::call(
                        "fact",
                        vec![ConstExpr::binary(BinOp::Sub, ConstExpr::reference("n"), ConstExpr::int(1))],
                    ),
                ),
            ),
        ))
        .unwrap();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "fail",
            &[],
            ConstExpr::throw(ConstExpr::str("unsupported")),
        ))
        .unwrap();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "impure",
            &[],
            ConstExpr::call("readLine", vec![]),
        ))
        .unwrap();
    program.declare_plain_fn("readLine").unwrap();
    program
}

/// 提交单个调用点并返回其诊断
fn diagnose(site: CallSite) -> Diagnostic {
    let mut engine = ConstEngine::new(program());
    engine.submit(site);
    let report = engine.evaluate().unwrap();
    assert_eq!(report.failed, 1);
    assert!(engine.has_errors());
    engine.diagnostics()[0].clone()
}

#[test]
fn test_non_const_argument() {
    let site = CallSite::with_target(
        CallTarget::Function("addOne".to_string()),
        vec![Argument::NonConst("readLine()".to_string())],
    )
    .at(Span::on_line(4, 9, 24));
    let diag = diagnose(site);
    assert_eq!(diag.code, "C0002");
    assert_eq!(
        TextEmitter::new().render(&diag),
        "error[C0002]: argument 0 of 'addOne' is not a constant: 'readLine()' is not a constant expression\n  \
         --> 4:9\n  = help: pass only constant values and resolved types to a const function\n"
    );
}

#[test]
fn test_unresolved_type_parameter_argument() {
    let site = CallSite::with_target(
        CallTarget::Function("addOne".to_string()),
        vec![Argument::TypeParameter("T".to_string())],
    );
    let diag = diagnose(site);
    assert_eq!(diag.code, "C0002");
    assert!(diag.message.contains("type parameter 'T'"));
}

#[test]
fn test_dynamic_targets_are_not_static() {
    let instance = CallSite::with_target(
        CallTarget::Instance {
            receiver: "point".to_string(),
            method: "scale".to_string(),
        },
        vec![],
    );
    assert_eq!(diagnose(instance).code, "C0001");

    let dynamic = CallSite::with_target(CallTarget::Dynamic("callbacks[0]".to_string()), vec![]);
    assert_eq!(diagnose(dynamic).code, "C0001");

    let tear_off = CallSite::with_target(CallTarget::TearOff("addOne".to_string()), vec![]);
    let diag = diagnose(tear_off);
    assert!(diag.message.contains("tear-off"));
}

#[test]
fn test_unresolved_targets() {
    let plain = diagnose(CallSite::new("readLine", vec![]));
    assert_eq!(plain.code, "C0003");
    assert!(plain.message.contains("const qualifier"));

    let missing = diagnose(CallSite::new("nowhere", vec![]));
    assert_eq!(missing.code, "C0003");
}

#[test]
fn test_body_rejections() {
    let mut engine = ConstEngine::new(program());
    let three = engine.intern_immediate(Immediate::Int(3)).unwrap();
    let recursive = engine.submit(CallSite::new("fact", vec![three]));
    let impure = engine.submit(CallSite::new("impure", vec![]));
    let throws = engine.submit(CallSite::new("fail", vec![]));
    let arity = engine.submit(CallSite::new("addOne", vec![three, three]));
    engine.evaluate().unwrap();

    let code = |site| {
        let err = engine.resolution(site).unwrap().as_ref().unwrap_err();
        (err.kind().code(), err.to_string())
    };
    let (c, message) = code(recursive);
    assert_eq!(c, "C0004");
    assert!(message.contains("'fact' is recursive"));
    let (c, message) = code(impure);
    assert_eq!(c, "C0004");
    assert!(message.contains("non-const function 'readLine'"));
    let (c, message) = code(throws);
    assert_eq!(c, "C0006");
    assert!(message.contains("unsupported"));
    assert_eq!(code(arity).0, "C0007");

    // 递归函数位于最后一个波次
    let codes: Vec<&str> = engine.diagnostics().iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["C0004", "C0006", "C0007", "C0004"]);
}

#[test]
fn test_failures_do_not_stop_other_sites() {
    let mut engine = ConstEngine::new(program());
    let four = engine.intern_immediate(Immediate::Int(4)).unwrap();
    let bad = engine.submit(CallSite::new("fail", vec![]));
    let good = engine.submit(CallSite::new("addOne", vec![four]));
    let report = engine.evaluate().unwrap();
    assert_eq!((report.succeeded, report.failed), (1, 1));

    let shaken = engine.finish_all().unwrap();
    assert!(shaken.rewrites.contains_key(&good));
    assert!(!shaken.rewrites.contains_key(&bad));
}

#[test]
fn test_dangling_argument_is_fatal() {
    let mut engine = ConstEngine::new(program());
    engine.submit(CallSite::new("addOne", vec![ValueId(99)]));
    let err = engine.evaluate().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.kind().code(), "C0008");
    assert!(engine.diagnostics().is_empty());
}

#[test]
fn test_json_emitter_one_line_per_diagnostic() {
    let mut engine = ConstEngine::new(program());
    engine.submit(CallSite::new("fail", vec![]).at(Span::on_line(2, 3, 9)));
    engine.submit(CallSite::new("nowhere", vec![]));
    engine.evaluate().unwrap();

    let output = JsonEmitter::new().emit_all(engine.diagnostics());
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["code"], "C0006");
    assert_eq!(lines[0]["range"]["start"]["line"], 1);
    assert_eq!(lines[1]["code"], "C0003");
    assert!(lines[1].get("range").is_none());
}
