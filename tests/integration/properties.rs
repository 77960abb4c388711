//! Property tests
//!
//! Interning, memoized evaluation and tree shaking over generated inputs.

use std::collections::HashSet;

use consteval::{
    BinOp, CallSite, ConstEngine, ConstExpr, ConstFunctionDef, Immediate, Operand, Program, SiteId,
    Value, ValueId,
};
use proptest::prelude::*;

fn add_one_engine() -> ConstEngine {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "addOne",
            &["x"],
            ConstExpr::binary(BinOp::Add, ConstExpr::reference("x"), ConstExpr::int(1)),
        ))
        .unwrap();
    ConstEngine::new(program)
}

/// nest(n) = [[0], [1], ..., [n-1]]，内层列表在不同的 n 之间共享
fn nest_engine() -> ConstEngine {
    let mut program = Program::new();
    program
        .declare_const_fn(ConstFunctionDef::with_value_params(
            "nest",
            &["n"],
            ConstExpr::ListFor {
                var: "i".to_string(),
                iterable: Box::new(ConstExpr::range(ConstExpr::int(0), ConstExpr::reference("n"))),
                filter: None,
                element: Box::new(ConstExpr::List(vec![ConstExpr::reference("i")])),
            },
        ))
        .unwrap();
    ConstEngine::new(program)
}

proptest! {
    #[test]
    fn test_add_one_matches_native(x in -1_000_000_000i64..1_000_000_000) {
        let mut engine = add_one_engine();
        let arg = engine.intern_immediate(Immediate::Int(x)).unwrap();
        let site = engine.submit(CallSite::new("addOne", vec![arg]));
        engine.evaluate().unwrap();
        let id = engine.value_of(site).unwrap();
        let stored = engine.store().get(id).unwrap();
        prop_assert_eq!(stored.as_ref(), &Value::Imm(Immediate::Int(x + 1)));
    }

    #[test]
    fn test_interning_is_idempotent(items in prop::collection::vec(any::<i64>(), 0..16)) {
        let engine = add_one_engine();
        let operands: Vec<Operand> = items.iter().map(|n| Operand::int(*n)).collect();
        let first = engine.intern(Value::List(operands.clone())).unwrap();
        let second = engine.intern(Value::List(operands)).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_repeated_calls_share_ids(args in prop::collection::vec(-50i64..50, 1..24)) {
        let mut engine = add_one_engine();
        let mut sites = Vec::new();
        for n in &args {
            let arg = engine.intern_immediate(Immediate::Int(*n)).unwrap();
            sites.push((*n, engine.submit(CallSite::new("addOne", vec![arg]))));
        }
        engine.evaluate().unwrap();

        let distinct: HashSet<i64> = args.iter().copied().collect();
        prop_assert_eq!(engine.context().memo().stats().misses, distinct.len());
        for (n, site) in &sites {
            for (m, other) in &sites {
                prop_assert_eq!(n == m, engine.value_of(*site) == engine.value_of(*other));
            }
        }
    }

    #[test]
    fn test_shake_is_a_closed_partition(sizes in prop::collection::vec(0i64..8, 1..10), mask in any::<u16>()) {
        let mut engine = nest_engine();
        let mut sites = Vec::new();
        for n in &sizes {
            let arg = engine.intern_immediate(Immediate::Int(*n)).unwrap();
            sites.push(engine.submit(CallSite::new("nest", vec![arg])));
        }
        let retained: Vec<SiteId> = sites
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1u16 << *i) != 0)
            .map(|(_, site)| *site)
            .collect();
        let shaken = engine.finish(&retained).unwrap();

        // emit 与 discard 恰好划分全部值
        let emitted: HashSet<ValueId> = shaken.emit.iter().copied().collect();
        let discarded: HashSet<ValueId> = shaken.discard.iter().copied().collect();
        prop_assert!(emitted.is_disjoint(&discarded));
        prop_assert_eq!(emitted.len() + discarded.len(), engine.store().len());

        // 保留值的子值也被保留
        for id in &shaken.emit {
            for child in engine.store().get(*id).unwrap().children() {
                prop_assert!(emitted.contains(&child));
            }
        }
        for site in &retained {
            let id = shaken.rewrites[site];
            prop_assert!(emitted.contains(&id));
            prop_assert!(shaken.slot_for(*site).is_some());
        }
        prop_assert_eq!(shaken.table.len(), shaken.emit.len());
    }
}
