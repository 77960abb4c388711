//! Configuration integration tests
//!
//! `consteval.toml` limits flow through to evaluation.

use std::fs;

use consteval::util::config::{load_config, CONFIG_FILE_NAME};
use consteval::{CallSite, ConstEngine, ConstEvalError, ConstExpr, ConstFunctionDef, Program, Stmt};

fn spin_program() -> Program {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "spin",
            &[],
            ConstExpr::block(
                vec![Stmt::While {
                    condition: ConstExpr::bool(true),
                    body: vec![],
                }],
                ConstExpr::null(),
            ),
        ))
        .unwrap();
    program
}

#[test]
fn test_project_config_sets_step_budget() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[const_eval]\nstep_budget = 50\nparallel = true\nworkers = 2\n",
    )
    .unwrap();
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.step_budget, 50);
    assert_eq!(config.workers, Some(2));

    let mut engine = ConstEngine::with_config(spin_program(), config);
    let site = engine.submit(CallSite::new("spin", vec![]));
    engine.evaluate().unwrap();
    assert_eq!(
        engine.resolution(site).unwrap().as_ref().unwrap_err(),
        &ConstEvalError::NonTerminating {
            function: "spin".to_string(),
            limit: 50,
            unit: "steps",
        }
    );
}

#[test]
fn test_missing_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.max_call_depth, 256);
    assert!(config.step_budget > 0);
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), "[const_eval]\nworkers = 0\n").unwrap();
    let err = load_config(dir.path()).unwrap_err();
    assert!(err.to_string().contains("workers"));
}
