//! 编译器后端各个阶段
//!
//! 分析 → 优化 → 字节码发射，按此顺序由 [`crate::middle::compile_module`] 编排。

pub mod analysis;
pub mod codegen;
pub mod optimize;

#[cfg(test)]
pub mod tests;
