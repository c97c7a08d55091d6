//! 统一测试套件
//!
//! 分析、优化、发射三个阶段的跨模块测试，共享下面的模块构造工具。


use crate::middle::core::ir::{Function, IrType, Module, OpKind, Operand, ResourceId};
use crate::util::span::Span;

/// 逐条追加指令的函数构造器
pub struct FnBuilder<'m> {
    module: &'m mut Module,
    function: Function,
    line: u32,
}

impl<'m> FnBuilder<'m> {
    pub fn new(
        module: &'m mut Module,
        name: &str,
    ) -> Self {
        let id = module.generate_id();
        let mut function = Function::new(id, name, IrType::Void);
        function.add_block("entry");
        Self {
            module,
            function,
            line: 0,
        }
    }

    /// 开始一个新块
    pub fn block(
        &mut self,
        label: &str,
    ) -> &mut Self {
        self.function.add_block(label);
        self
    }

    /// 追加到最后一个块，每条指令占一行
    pub fn op(
        &mut self,
        op: OpKind,
        operands: Vec<Operand>,
    ) -> &mut Self {
        self.line += 1;
        let instr = self
            .module
            .instruction(op, operands, Span::at(self.line, 1))
            .unwrap();
        self.function.blocks.last_mut().unwrap().push(instr);
        self
    }

    pub fn alloc(&mut self) -> ResourceId {
        let r = self.module.generate_resource();
        self.op(OpKind::AllocResource, vec![Operand::Resource(r)]);
        r
    }

    pub fn create_pair(
        &mut self,
        left: ResourceId,
        right: ResourceId,
    ) -> ResourceId {
        let pair = self.module.generate_resource();
        self.op(
            OpKind::CreatePair,
            vec![
                Operand::Resource(left),
                Operand::Resource(right),
                Operand::Resource(pair),
            ],
        );
        pair
    }

    /// `MeasurePaired` + `Pop`
    pub fn measure(
        &mut self,
        pair: ResourceId,
    ) -> &mut Self {
        self.op(OpKind::MeasurePaired, vec![Operand::Resource(pair)])
            .op(OpKind::Pop, vec![])
    }

    pub fn swap(
        &mut self,
        pair: ResourceId,
        other: ResourceId,
    ) -> &mut Self {
        self.op(
            OpKind::SwapPair,
            vec![Operand::Resource(pair), Operand::Resource(other)],
        )
    }

    pub fn break_pair(
        &mut self,
        pair: ResourceId,
    ) -> &mut Self {
        self.op(OpKind::BreakPair, vec![Operand::Resource(pair)])
    }

    /// 把函数加入模块并刷新资源标记
    pub fn finish(self) -> usize {
        let mut function = self.function;
        function.refresh_resource_flag();
        self.module.add_function(function)
    }
}

/// 只含 `Halt` 的 `$main`
pub fn halt_module() -> Module {
    let mut module = Module::new("halt", "halt.ent");
    let mut main = FnBuilder::new(&mut module, "$main");
    main.op(OpKind::Halt, vec![]);
    main.finish();
    module
}

/// 三个资源对：
/// - R1 创建后不再使用（使用次数 1）
/// - R2 创建后测量一次（使用次数 2）
/// - R3 创建、测量、交换、再测量、联合测量、拆除（使用次数 6）
pub fn r123_module() -> (Module, [ResourceId; 3]) {
    let mut module = Module::new("r123", "r123.ent");
    let mut main = FnBuilder::new(&mut module, "$main");
    let a = main.alloc();
    let b = main.alloc();

    let r1 = main.create_pair(a, b);

    let r2 = main.create_pair(a, b);
    main.measure(r2);

    let r3 = main.create_pair(a, b);
    main.measure(r3)
        .swap(r3, a)
        .measure(r3)
        .op(
            OpKind::JointMeasure,
            vec![Operand::Resource(r3), Operand::Resource(b)],
        )
        .op(OpKind::Pop, vec![])
        .break_pair(r3)
        .op(OpKind::Halt, vec![]);
    main.finish();
    (module, [r1, r2, r3])
}

/// 列出函数内全部操作码
pub fn ops(function: &Function) -> Vec<OpKind> {
    function.all_instructions().map(|i| i.op).collect()
}
