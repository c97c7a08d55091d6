//! 第三级：跨函数与全局优化
//!
//! 三个策略接口，必须保持程序可观察行为不变：
//!
//! - [`PairSharing`]: 在函数之间共享资源对，默认 [`NoSharing`]
//! - [`AllocationBalancer`]: 全模块资源分配再平衡，默认 [`NoRebalance`]
//! - [`OperationScheduler`]: 关联操作重排以缩短关键路径，默认 [`LayeredScheduler`]
//!
//! 策略返回错误时，流水线会丢弃它对模块的修改。

use std::collections::HashSet;
use std::fmt;

use super::placement::verify_pair_order;
use super::OptimizeError;
use crate::middle::core::ir::{Function, Instruction, Module, OpKind, ResourceId};
use crate::middle::passes::analysis::AnalysisResult;

/// 跨函数共享资源对
pub trait PairSharing {
    fn name(&self) -> &'static str;

    /// 返回共享的资源对数量
    fn share(
        &self,
        module: &mut Module,
        analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError>;
}

/// 不共享
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSharing;

impl PairSharing for NoSharing {
    fn name(&self) -> &'static str {
        "none"
    }

    fn share(
        &self,
        _module: &mut Module,
        _analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError> {
        Ok(0)
    }
}

/// 全模块资源分配再平衡
pub trait AllocationBalancer {
    fn name(&self) -> &'static str;

    /// 返回调整的分配数量
    fn rebalance(
        &self,
        module: &mut Module,
        analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError>;
}

/// 不做再平衡
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRebalance;

impl AllocationBalancer for NoRebalance {
    fn name(&self) -> &'static str {
        "none"
    }

    fn rebalance(
        &self,
        _module: &mut Module,
        _analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError> {
        Ok(0)
    }
}

/// 关联操作重排
pub trait OperationScheduler {
    fn name(&self) -> &'static str;

    /// 重排单个函数，返回位置发生变化的指令数
    fn schedule(
        &self,
        function: &mut Function,
        analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError>;
}

/// 分层调度
///
/// 在每个块内找出连续的、不改变求值栈的资源操作序列
/// （`AllocResource` / `CreatePair` / `BreakPair` / `SwapPair`），
/// 按依赖深度稳定排序：共享任一资源的两条指令保持原相对顺序，
/// 互不相关的指令被归入同一层并相邻排列。
#[derive(Debug, Default, Clone, Copy)]
pub struct LayeredScheduler;

impl LayeredScheduler {
    fn layer_run(run: &[Instruction]) -> Vec<usize> {
        let footprints: Vec<HashSet<ResourceId>> =
            run.iter().map(|instr| instr.resources().collect()).collect();
        let mut depth = vec![0usize; run.len()];
        for k in 0..run.len() {
            for j in 0..k {
                if !footprints[j].is_disjoint(&footprints[k]) {
                    depth[k] = depth[k].max(depth[j] + 1);
                }
            }
        }
        depth
    }
}

impl OperationScheduler for LayeredScheduler {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn schedule(
        &self,
        function: &mut Function,
        _analysis: &AnalysisResult,
    ) -> Result<usize, OptimizeError> {
        let mut moved = 0;
        for block in &mut function.blocks {
            let mut start = 0;
            while start < block.instructions.len() {
                if !block.instructions[start].op.is_stack_neutral_resource() {
                    start += 1;
                    continue;
                }
                let end = block.instructions[start..]
                    .iter()
                    .position(|instr| !instr.op.is_stack_neutral_resource())
                    .map_or(block.instructions.len(), |offset| start + offset);

                let run = &mut block.instructions[start..end];
                let depth = Self::layer_run(run);
                let mut order: Vec<usize> = (0..run.len()).collect();
                order.sort_by_key(|&k| depth[k]);
                moved += order.iter().enumerate().filter(|(pos, k)| *pos != **k).count();

                let reordered: Vec<Instruction> = order.iter().map(|&k| run[k].clone()).collect();
                run.clone_from_slice(&reordered);
                start = end;
            }
        }

        let pairs: Vec<ResourceId> = function
            .all_instructions()
            .filter(|instr| instr.op == OpKind::CreatePair)
            .filter_map(Instruction::correlated_resource)
            .collect();
        for pair in pairs {
            verify_pair_order(function, pair).map_err(|reason| OptimizeError::UnsafeReorder {
                function: function.name.clone(),
                reason,
            })?;
        }
        Ok(moved)
    }
}

impl fmt::Debug for dyn PairSharing {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "PairSharing({})", self.name())
    }
}

impl fmt::Debug for dyn AllocationBalancer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "AllocationBalancer({})", self.name())
    }
}

impl fmt::Debug for dyn OperationScheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "OperationScheduler({})", self.name())
    }
}
