//! 核心中间表示
//!
//! 定义模块 IR 的数据结构以及从 AST 到 IR 的生成。
//! 这是整个 middle 层的基石，所有其他模块都依赖于此。

pub mod ir;
pub mod ir_gen;

pub use ir::*;
pub use ir_gen::*;
