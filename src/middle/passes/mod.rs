//! 整程序分析阶段
//!
//! 包含常量调用图、可达性分析与常量表摇树。

pub mod call_graph;
pub mod reachability;
pub mod tree_shake;
