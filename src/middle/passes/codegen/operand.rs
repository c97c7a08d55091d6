//! 操作数解析器
//!
//! 将 IR 操作数转换为字节码操作数；标签在这里被解析为函数内指令下标。

use std::collections::HashMap;

use super::bytecode::BytecodeOperand;
use super::EmitError;
use crate::middle::core::ir::{Function, Operand};

/// 操作数解析器
///
/// 持有一个函数的 标签 → 指令下标 映射。
#[derive(Debug, Default)]
pub struct OperandResolver {
    labels: HashMap<String, u32>,
    function: String,
}

impl OperandResolver {
    /// 第一遍：按块顺序展开函数，记录每个块首条指令的下标
    pub fn for_function(function: &Function) -> Result<Self, EmitError> {
        let mut labels = HashMap::new();
        let mut offset = 0usize;
        for block in &function.blocks {
            let index = u32::try_from(offset).map_err(|_| EmitError::Overflow {
                what: "instruction index",
                function: function.name.clone(),
            })?;
            labels.insert(block.label.clone(), index);
            offset += block.instructions.len();
        }
        Ok(Self {
            labels,
            function: function.name.clone(),
        })
    }

    /// 标签对应的指令下标
    pub fn target(
        &self,
        label: &str,
    ) -> Option<u32> {
        self.labels.get(label).copied()
    }

    /// 解析单个操作数
    pub fn resolve(
        &self,
        operand: &Operand,
    ) -> Result<BytecodeOperand, EmitError> {
        match operand {
            Operand::Int(v) => Ok(BytecodeOperand::Int(*v)),
            Operand::Float(v) => Ok(BytecodeOperand::Float(*v)),
            Operand::Const(idx) => Ok(BytecodeOperand::Const(*idx)),
            Operand::Resource(id) => Ok(BytecodeOperand::Resource(id.0)),
            Operand::Label(label) => {
                self.target(label)
                    .map(BytecodeOperand::Target)
                    .ok_or_else(|| EmitError::UnresolvedLabel {
                        label: label.clone(),
                        function: self.function.clone(),
                    })
            }
        }
    }
}
