//! 第一级：冗余消除
//!
//! - 未使用资源删除：使用次数 ≤ 1 的 `CreatePair`（只有创建、没有后续使用）被删除
//! - 相似资源合并：由 [`MergePolicy`] 给出候选，检查安全后把 source 的使用改写为 target
//!
//! 删除先收集位置，再按 `(块下标降序, 指令下标降序)` 执行，
//! 保证较小的下标在删除过程中始终有效。

use std::collections::HashSet;
use std::fmt;

use super::OptimizeError;
use crate::middle::core::ir::{Function, Module, OpKind, Operand, ResourceId};
use crate::middle::passes::analysis::AnalysisResult;

/// 批量删除指令，返回实际删除的数量
pub fn delete_batch(
    function: &mut Function,
    mut positions: Vec<(usize, usize)>,
) -> usize {
    positions.sort_unstable_by(|a, b| b.cmp(a));
    positions.dedup();

    let mut removed = 0;
    for (block_idx, instr_idx) in positions {
        if let Some(block) = function.blocks.get_mut(block_idx) {
            if instr_idx < block.instructions.len() {
                block.instructions.remove(instr_idx);
                removed += 1;
            }
        }
    }
    removed
}

/// 删除未使用资源的 `CreatePair`
pub fn remove_unused_resources(
    module: &mut Module,
    analysis: &AnalysisResult,
) -> usize {
    let mut removed = 0;
    for function in module
        .functions
        .iter_mut()
        .filter(|f| f.is_resource_bearing)
    {
        let mut doomed = Vec::new();
        for (block_idx, block) in function.blocks.iter().enumerate() {
            for (instr_idx, instr) in block.instructions.iter().enumerate() {
                if instr.op != OpKind::CreatePair {
                    continue;
                }
                if let Some(resource) = instr.correlated_resource() {
                    if analysis.use_count(resource) <= 1 {
                        doomed.push((block_idx, instr_idx));
                    }
                }
            }
        }
        removed += delete_batch(function, doomed);
    }
    removed
}

/// 把函数内每个关联操作中引用 `from` 的关联资源操作数改写为 `to`
///
/// 操作数位置与使用扫描一致：`CreatePair` 取第三个，其余取第一个。
pub fn rewrite_resource_uses(
    function: &mut Function,
    from: ResourceId,
    to: ResourceId,
) -> usize {
    let mut rewritten = 0;
    for block in &mut function.blocks {
        for instr in &mut block.instructions {
            if let Some(operand) = instr.correlated_operand_mut() {
                if *operand == Operand::Resource(from) {
                    *operand = Operand::Resource(to);
                    rewritten += 1;
                }
            }
        }
    }
    rewritten
}

/// 合并候选：把 `source` 并入 `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCandidate {
    pub source: ResourceId,
    pub target: ResourceId,
}

/// 合并策略
///
/// 只负责给出候选；安全检查由流水线统一执行，不安全的候选会被跳过并告警。
pub trait MergePolicy {
    fn name(&self) -> &'static str;

    /// `function` 内的合并候选
    fn candidates(
        &self,
        function: &Function,
        analysis: &AnalysisResult,
    ) -> Vec<MergeCandidate>;
}

/// 从不合并（默认）
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverMerge;

impl MergePolicy for NeverMerge {
    fn name(&self) -> &'static str {
        "never"
    }

    fn candidates(
        &self,
        _function: &Function,
        _analysis: &AnalysisResult,
    ) -> Vec<MergeCandidate> {
        Vec::new()
    }
}

/// 端点相同的两个资源对视为相似：较晚创建的并入最早创建的那个
#[derive(Debug, Default, Clone, Copy)]
pub struct SameEndpointsPolicy;

impl MergePolicy for SameEndpointsPolicy {
    fn name(&self) -> &'static str {
        "same-endpoints"
    }

    fn candidates(
        &self,
        function: &Function,
        _analysis: &AnalysisResult,
    ) -> Vec<MergeCandidate> {
        let mut first_seen: Vec<((ResourceId, ResourceId), ResourceId)> = Vec::new();
        let mut candidates = Vec::new();
        for instr in function.all_instructions() {
            let (Some(endpoints), Some(pair)) = (instr.pair_endpoints(), instr.correlated_resource())
            else {
                continue;
            };
            match first_seen.iter().find(|(seen, _)| *seen == endpoints) {
                Some((_, target)) if *target != pair => candidates.push(MergeCandidate {
                    source: pair,
                    target: *target,
                }),
                Some(_) => {}
                None => first_seen.push((endpoints, pair)),
            }
        }
        candidates
    }
}

impl fmt::Debug for dyn MergePolicy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "MergePolicy({})", self.name())
    }
}

/// 检查合并是否安全
///
/// 合并后的资源以 target 的 `CreatePair` 为创建点，使用集合为两者之并。
/// 安全条件（函数内按 `(块, 下标)` 的展开顺序）：
/// - source 的全部使用点都在本函数内
/// - source 只出现在关联操作数位置上（不能是 `SwapPair`/`JointMeasure` 的第二个操作数）
/// - target 的创建早于合并后的所有其他使用
/// - 至多保留一个 `BreakPair`，且它位于所有使用之后
pub fn check_merge(
    function: &Function,
    candidate: MergeCandidate,
    analysis: &AnalysisResult,
) -> Result<(), OptimizeError> {
    let MergeCandidate { source, target } = candidate;
    let unsafe_merge = |reason: &str| OptimizeError::UnsafeMerge {
        merged: source,
        into: target,
        function: function.name.clone(),
        reason: reason.to_string(),
    };

    if source == target {
        return Err(unsafe_merge("a resource cannot be merged into itself"));
    }
    if let Some(record) = analysis.usage.get(&source) {
        if record.sites.iter().any(|site| site.function != function.name) {
            return Err(unsafe_merge("source is used outside this function"));
        }
    }

    let source_create = function.find_create_pair(source);
    let target_create = function.find_create_pair(target);
    let (Some(source_create), Some(target_create)) = (source_create, target_create) else {
        return Err(unsafe_merge("both resources must be created in this function"));
    };
    if target_create >= source_create {
        return Err(unsafe_merge("target is not created before source"));
    }

    let merged: HashSet<ResourceId> = [source, target].into_iter().collect();
    let mut uses = Vec::new();
    let mut breaks = Vec::new();
    for (block_idx, block) in function.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.instructions.iter().enumerate() {
            let pos = (block_idx, instr_idx);
            // 改写只覆盖关联位置，其余位置上的 source 会在删除创建点后悬空
            let source_refs = instr.resources().filter(|id| *id == source).count();
            let correlated_refs = usize::from(instr.correlated_resource() == Some(source));
            if source_refs > correlated_refs {
                return Err(unsafe_merge("source is referenced outside a correlated operand"));
            }
            if pos == source_create || pos == target_create {
                continue;
            }
            let Some(resource) = instr.correlated_resource() else {
                continue;
            };
            if !merged.contains(&resource) {
                continue;
            }
            if instr.op == OpKind::BreakPair {
                breaks.push(pos);
            } else {
                uses.push(pos);
            }
        }
    }

    if uses.iter().chain(&breaks).any(|pos| *pos < target_create) {
        return Err(unsafe_merge("a use would precede the surviving create-pair"));
    }
    if breaks.len() > 1 {
        return Err(unsafe_merge("the merged pair would be broken twice"));
    }
    if let (Some(brk), Some(last_use)) = (breaks.first(), uses.iter().max()) {
        if brk < last_use {
            return Err(unsafe_merge("target is broken before the last use of source"));
        }
    }
    Ok(())
}

/// 执行合并：删除 source 的 `CreatePair`，再改写 source 的全部使用
pub fn apply_merge(
    function: &mut Function,
    candidate: MergeCandidate,
) -> usize {
    if let Some(pos) = function.find_create_pair(candidate.source) {
        delete_batch(function, vec![pos]);
    }
    rewrite_resource_uses(function, candidate.source, candidate.target)
}
