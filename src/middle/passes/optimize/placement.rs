//! 第二级：放置优化
//!
//! - [`sink_create_pair`]：把 `CreatePair` 下沉到块内第一条触及该资源对（或其端点）的指令之前
//! - [`settle_break_pair`]：把 `BreakPair` 提前到块内最后一条触及该资源对的指令之后
//!
//! 两种移动都只在块内进行，遇到调用或跳转即停止。
//! 移动后校验顺序不变式（创建先于一切使用，拆除晚于一切使用），违反则回滚。

use std::collections::HashSet;

use super::OptimizeError;
use crate::middle::core::ir::{Function, Instruction, OpFamily, OpKind, ResourceId};

/// 顺序不变式检查
///
/// 按 `(块, 下标)` 展开顺序：`CreatePair` 在所有引用该资源的指令之前，
/// `BreakPair` 在所有其他引用之后。函数内没有创建点时不作检查。
pub fn verify_pair_order(
    function: &Function,
    pair: ResourceId,
) -> Result<(), String> {
    let Some(create) = function.find_create_pair(pair) else {
        return Ok(());
    };

    let mut uses = Vec::new();
    let mut breaks = Vec::new();
    for (block_idx, block) in function.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.instructions.iter().enumerate() {
            let pos = (block_idx, instr_idx);
            if pos == create || !instr.resources().any(|r| r == pair) {
                continue;
            }
            if instr.op == OpKind::BreakPair && instr.correlated_resource() == Some(pair) {
                breaks.push(pos);
            } else {
                uses.push(pos);
            }
        }
    }

    if let Some(pos) = uses.iter().chain(&breaks).find(|pos| **pos < create) {
        return Err(format!(
            "{} is referenced at {:?} before its create-pair at {:?}",
            pair, pos, create
        ));
    }
    if let Some(last_use) = uses.iter().max() {
        if let Some(brk) = breaks.iter().find(|brk| *brk < last_use) {
            return Err(format!(
                "{} is broken at {:?} before its use at {:?}",
                pair, brk, last_use
            ));
        }
    }
    Ok(())
}

/// 调用和跳转之间不移动指令
fn is_barrier(instr: &Instruction) -> bool {
    instr.op.is_call() || instr.op.is_terminator() || instr.op.family() == OpFamily::Jump
}

/// 创建点（及端点）的足迹
fn create_footprint(
    function: &Function,
    pair: ResourceId,
) -> HashSet<ResourceId> {
    let mut footprint: HashSet<ResourceId> = [pair].into_iter().collect();
    if let Some((b, i)) = function.find_create_pair(pair) {
        if let Some((left, right)) = function.blocks[b].instructions[i].pair_endpoints() {
            footprint.insert(left);
            footprint.insert(right);
        }
    }
    footprint
}

/// `CreatePair` 到块内第一次使用的距离；块内没有使用时为到块尾的距离
pub fn create_distance(
    function: &Function,
    pair: ResourceId,
) -> Option<usize> {
    let (b, i) = function.find_create_pair(pair)?;
    let footprint = create_footprint(function, pair);
    let block = &function.blocks[b];
    let first_use = block.instructions[i + 1..]
        .iter()
        .position(|instr| instr.touches(&footprint))
        .map(|offset| offset + 1);
    Some(first_use.unwrap_or(block.instructions.len() - i))
}

/// 移动一条指令，校验不变式，失败时回滚
fn move_checked(
    function: &mut Function,
    pair: ResourceId,
    block_idx: usize,
    from: usize,
    to: usize,
) -> Result<bool, OptimizeError> {
    if from == to {
        return Ok(false);
    }
    let saved = function.blocks[block_idx].instructions.clone();
    let instr = function.blocks[block_idx].instructions.remove(from);
    function.blocks[block_idx].instructions.insert(to, instr);

    if let Err(reason) = verify_pair_order(function, pair) {
        function.blocks[block_idx].instructions = saved;
        return Err(OptimizeError::UnsafeMove {
            resource: pair,
            function: function.name.clone(),
            reason,
        });
    }
    Ok(true)
}

/// 把 `pair` 的 `CreatePair` 下沉到块内第一次触及之前
///
/// 返回是否发生了移动。
pub fn sink_create_pair(
    function: &mut Function,
    pair: ResourceId,
) -> Result<bool, OptimizeError> {
    let Some((b, i)) = function.find_create_pair(pair) else {
        return Ok(false);
    };
    let footprint = create_footprint(function, pair);
    let instructions = &function.blocks[b].instructions;

    let stop = instructions[i + 1..]
        .iter()
        .position(|instr| instr.touches(&footprint) || is_barrier(instr))
        .map(|offset| i + 1 + offset)
        .unwrap_or(instructions.len());

    // 移除后插入到 stop 之前的位置
    move_checked(function, pair, b, i, stop - 1)
}

/// 把 `pair` 的每条 `BreakPair` 提前到块内最后一次触及（资源对或其端点）之后
///
/// 块内找不到触及点或屏障时不移动。返回移动的条数。
pub fn settle_break_pair(
    function: &mut Function,
    pair: ResourceId,
) -> Result<usize, OptimizeError> {
    let footprint = create_footprint(function, pair);
    let mut breaks = Vec::new();
    for (b, block) in function.blocks.iter().enumerate() {
        for (k, instr) in block.instructions.iter().enumerate() {
            if instr.op == OpKind::BreakPair && instr.correlated_resource() == Some(pair) {
                breaks.push((b, k));
            }
        }
    }

    let mut moved = 0;
    // 逆序处理，前面的下标不受影响
    for (b, k) in breaks.into_iter().rev() {
        let instructions = &function.blocks[b].instructions;
        let Some(anchor) = instructions[..k]
            .iter()
            .rposition(|instr| instr.touches(&footprint) || is_barrier(instr))
        else {
            continue;
        };
        if move_checked(function, pair, b, k, anchor + 1)? {
            moved += 1;
        }
    }
    Ok(moved)
}
