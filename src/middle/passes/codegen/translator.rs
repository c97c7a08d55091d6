//! IR 到字节码翻译器
//!
//! 两遍翻译：第一遍由 [`OperandResolver`] 记录每个块的起始下标，
//! 第二遍按块顺序展开指令并把标签替换为目标下标，不需要跳转回填。

use tracing::debug;

use super::bytecode::{BytecodeFunction, BytecodeInstruction, BytecodeModule};
use super::opcode::Opcode;
use super::operand::OperandResolver;
use super::EmitError;
use crate::middle::core::ir::{Function, Module};

/// IR 到字节码翻译器
#[derive(Debug, Clone)]
pub struct Translator {
    /// 是否填写源码行表；关闭时行号全部为 0
    debug_lines: bool,
}

impl Translator {
    pub fn new(debug_lines: bool) -> Self {
        Self { debug_lines }
    }

    /// 翻译模块；`entry` 是入口函数在 `module.functions` 中的下标
    pub fn translate_module(
        &self,
        module: &Module,
        entry: u32,
    ) -> Result<BytecodeModule, EmitError> {
        let functions = module
            .functions
            .iter()
            .map(|function| self.translate_function(function))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BytecodeModule {
            globals: module.globals.iter().map(|g| g.name.clone()).collect(),
            constants: module.constants.clone(),
            functions,
            entry,
        })
    }

    /// 翻译单个函数
    pub fn translate_function(
        &self,
        function: &Function,
    ) -> Result<BytecodeFunction, EmitError> {
        let resolver = OperandResolver::for_function(function)?;
        let arity = u16::try_from(function.arity()).map_err(|_| EmitError::Overflow {
            what: "parameter count",
            function: function.name.clone(),
        })?;

        let mut instructions = Vec::with_capacity(function.instruction_count());
        let mut lines = Vec::with_capacity(function.instruction_count());
        for instr in function.all_instructions() {
            let operands = instr
                .operands
                .iter()
                .map(|operand| resolver.resolve(operand))
                .collect::<Result<Vec<_>, _>>()?;
            instructions.push(BytecodeInstruction::new(Opcode::from(instr.op), operands));
            lines.push(if self.debug_lines {
                instr.span.line()
            } else {
                0
            });
        }

        debug!(
            "Translated `{}`: {} instructions",
            function.name,
            instructions.len()
        );
        Ok(BytecodeFunction {
            name: function.name.clone(),
            arity,
            local_count: function.local_count,
            instructions,
            lines,
        })
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(true)
    }
}
