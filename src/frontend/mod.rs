//! Frontend analysis
//!
//! Declarations, const expressions and the compile-time evaluator that
//! whole-program analysis feeds call sites into.

pub mod const_eval;
