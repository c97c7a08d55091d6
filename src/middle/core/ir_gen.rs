//! AST 到 IR 的生成器
//!
//! 把前端交付的 [`Program`] 降级为 [`Module`]。
//!
//! - 顶层语句与全局变量的非字面量初始化按出现顺序收集进入口函数（默认 `$main`），
//!   入口函数以 `Halt` 结尾；其余函数以 `Return` 结尾
//! - 类的方法降级为 `Class.method`，首个参数为 `self`
//! - 资源实体（`qubit` / `pair`）在声明处分配 [`ResourceId`]
//!
//! 遇到不认识或位置不对的节点时立即失败，并通过 [`DiagnosticSink`] 报告。

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::frontend::ast::{
    BinOp, Block, Expr, FnDecl, Item, ItemKind, Literal, Param as AstParam, Program, ResourceKind,
    ResourceOp, Stmt, StmtKind, UnOp,
};
use crate::middle::core::ir::{
    Constant, Function, IrError, IrType, Module, OpKind, Operand, Param, ResourceId,
};
use crate::util::config::DEFAULT_ENTRY_POINT;
use crate::util::diagnostic::{codes, Category, Diagnostic, DiagnosticBuilder, DiagnosticSink, Severity};
use crate::util::span::Span;

/// IR 生成错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IrGenError {
    #[error("unsupported node kind `{kind}`")]
    Unsupported { kind: String, span: Span },

    #[error("{kind} is not allowed here")]
    Misplaced { kind: String, span: Span },

    #[error("unknown resource `{name}`")]
    UnknownResource { name: String, span: Span },

    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String, span: Span },

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl IrGenError {
    /// 对应的错误码
    pub fn code(&self) -> &'static str {
        match self {
            IrGenError::Unsupported { .. } => codes::UNKNOWN_NODE,
            IrGenError::Misplaced { .. } => codes::MISPLACED_NODE,
            IrGenError::UnknownResource { .. } => codes::UNKNOWN_RESOURCE,
            IrGenError::UnknownVariable { .. } => codes::UNKNOWN_VARIABLE,
            IrGenError::Ir(err) => err.code(),
        }
    }

    /// 转换为 `error` 级诊断
    pub fn to_diagnostic(
        &self,
        source_file: &str,
    ) -> Diagnostic {
        let span = match self {
            IrGenError::Unsupported { span, .. }
            | IrGenError::Misplaced { span, .. }
            | IrGenError::UnknownResource { span, .. }
            | IrGenError::UnknownVariable { span, .. } => *span,
            IrGenError::Ir(err) => return err.to_diagnostic(source_file),
        };
        let builder = DiagnosticBuilder::new(Severity::Error, self.code(), self.to_string())
            .category(Category::Structure)
            .at(source_file, span);
        match self {
            IrGenError::UnknownResource { name, .. } => builder
                .suggest(format!("declare it first with `qubit {}` or `pair {}`", name, name))
                .build(),
            _ => builder.build(),
        }
    }
}

/// AST 到 IR 的生成器
#[derive(Debug)]
pub struct IrGenerator {
    module: Module,
    entry_point: String,
}

impl IrGenerator {
    /// 创建生成器
    pub fn new(
        module_name: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            module: Module::new(module_name, source_file),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }

    /// 自定义入口函数名
    pub fn with_entry_point(
        mut self,
        entry_point: impl Into<String>,
    ) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// 生成模块；首个结构错误会上报到 `sink` 并中止
    pub fn generate<S: DiagnosticSink>(
        self,
        program: &Program,
        sink: &mut S,
    ) -> Result<Module, IrGenError> {
        let source_file = self.module.source_file.clone();
        match self.lower_program(program) {
            Ok(module) => Ok(module),
            Err(err) => {
                sink.report(err.to_diagnostic(&source_file));
                Err(err)
            }
        }
    }

    fn lower_program(
        mut self,
        program: &Program,
    ) -> Result<Module, IrGenError> {
        debug!(
            "Lowering module `{}` ({} items)",
            self.module.name,
            program.items.len()
        );

        // 全局变量先登记，函数体内才能解析到
        for item in &program.items {
            if let ItemKind::Var { name, initializer } = &item.kind {
                let init = match initializer.as_deref() {
                    Some(Expr::Lit(lit, _)) => Some(constant_of(lit)),
                    _ => None,
                };
                self.module.add_global(name.clone(), IrType::Any, init);
            }
        }

        let entry_id = self.module.generate_id();
        let entry = Function::new(entry_id, self.entry_point.clone(), IrType::Void);
        let mut main = FunctionLowering::new(&mut self.module, entry, true);

        let mut functions = Vec::new();
        let mut imports = Vec::new();
        for item in &program.items {
            match &item.kind {
                ItemKind::Import { path } => imports.push(path.clone()),
                ItemKind::Var { name, initializer } => {
                    // 字面量初值也要在入口函数里落地，字节码的全局区只记录名字
                    if let Some(expr) = initializer.as_deref() {
                        main.lower_value(expr)?;
                        let index = main.global_slot(name, item.span)?;
                        main.emit(OpKind::StoreGlobal, [Operand::Int(index)], item.span)?;
                    }
                }
                ItemKind::Stmt(stmt) => main.lower_stmt(stmt)?,
                ItemKind::Fn(decl) => functions.push((decl.name.clone(), decl, false)),
                ItemKind::Class { name, methods } => {
                    for method in methods {
                        functions.push((format!("{}.{}", name, method.name), method, true));
                    }
                }
                ItemKind::Opaque { kind } => {
                    return Err(IrGenError::Unsupported {
                        kind: kind.clone(),
                        span: item.span,
                    })
                }
            }
        }
        let main = main.finish()?;
        self.module.add_function(main);

        for (name, decl, is_method) in functions {
            let function = self.lower_function(name, decl, is_method)?;
            self.module.add_function(function);
        }

        for (idx, path) in imports.into_iter().enumerate() {
            self.module.metadata.insert(format!("import.{}", idx), path);
        }

        debug!(
            "Lowered module `{}`: {} function(s), {} global(s), {} constant(s)",
            self.module.name,
            self.module.functions.len(),
            self.module.globals.len(),
            self.module.constants.len()
        );
        Ok(self.module)
    }

    fn lower_function(
        &mut self,
        name: String,
        decl: &FnDecl,
        is_method: bool,
    ) -> Result<Function, IrGenError> {
        let id = self.module.generate_id();
        let mut function = Function::new(id, name, ir_type(decl.return_type.as_deref()));
        if is_method {
            function.params.push(Param {
                name: "self".to_string(),
                ty: IrType::Any,
            });
        }
        function
            .params
            .extend(decl.params.iter().map(|p: &AstParam| Param {
                name: p.name.clone(),
                ty: ir_type(p.ty.as_deref()),
            }));

        let mut lowering = FunctionLowering::new(&mut self.module, function, false);
        lowering.lower_block(&decl.body)?;
        lowering.finish()
    }
}

/// 单个函数的降级状态
struct FunctionLowering<'m> {
    module: &'m mut Module,
    function: Function,
    is_entry: bool,
    /// 当前块下标
    current: usize,
    locals: HashMap<String, u32>,
    resources: HashMap<String, ResourceId>,
    next_label: usize,
}

impl<'m> FunctionLowering<'m> {
    fn new(
        module: &'m mut Module,
        mut function: Function,
        is_entry: bool,
    ) -> Self {
        let mut locals = HashMap::new();
        for (slot, param) in function.params.iter().enumerate() {
            locals.insert(param.name.clone(), slot as u32);
        }
        function.add_block("entry");
        Self {
            module,
            function,
            is_entry,
            current: 0,
            locals,
            resources: HashMap::new(),
            next_label: 0,
        }
    }

    fn finish(mut self) -> Result<Function, IrGenError> {
        if !self.function.blocks[self.current].is_terminated() {
            let op = if self.is_entry {
                OpKind::Halt
            } else {
                OpKind::Return
            };
            self.emit(op, [], Span::dummy())?;
        }
        self.function.local_count = self.locals.len() as u32;
        self.function.refresh_resource_flag();
        Ok(self.function)
    }

    fn fresh_label(
        &mut self,
        prefix: &str,
    ) -> String {
        self.next_label += 1;
        format!("{}.{}", prefix, self.next_label)
    }

    fn start_block(
        &mut self,
        label: String,
    ) {
        self.function.add_block(label);
        self.current = self.function.blocks.len() - 1;
    }

    /// 追加指令；当前块已终结时开一个不可达块承接
    fn emit(
        &mut self,
        op: OpKind,
        operands: impl IntoIterator<Item = Operand>,
        span: Span,
    ) -> Result<(), IrGenError> {
        if self.function.blocks[self.current].is_terminated() {
            let label = self.fresh_label("dead");
            self.start_block(label);
        }
        let instr = self.module.instruction(op, operands, span)?;
        self.function.blocks[self.current].push(instr);
        Ok(())
    }

    /// 以 `Jump` 结束当前块（已终结则不动）
    fn jump_to(
        &mut self,
        label: &str,
        span: Span,
    ) -> Result<(), IrGenError> {
        if self.function.blocks[self.current].is_terminated() {
            return Ok(());
        }
        self.emit(OpKind::Jump, [Operand::Label(label.to_string())], span)
    }

    fn const_operand(
        &mut self,
        value: Constant,
    ) -> Operand {
        Operand::Const(self.module.intern_constant(value))
    }

    fn declare_local(
        &mut self,
        name: &str,
    ) -> u32 {
        let next = self.locals.len() as u32;
        *self.locals.entry(name.to_string()).or_insert(next)
    }

    fn global_slot(
        &self,
        name: &str,
        span: Span,
    ) -> Result<i64, IrGenError> {
        self.module
            .global_index(name)
            .map(|idx| idx as i64)
            .ok_or_else(|| IrGenError::UnknownVariable {
                name: name.to_string(),
                span,
            })
    }

    fn resource(
        &self,
        name: &str,
        span: Span,
    ) -> Result<ResourceId, IrGenError> {
        self.resources
            .get(name)
            .copied()
            .ok_or_else(|| IrGenError::UnknownResource {
                name: name.to_string(),
                span,
            })
    }

    fn lower_block(
        &mut self,
        block: &Block,
    ) -> Result<(), IrGenError> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(
        &mut self,
        stmt: &Stmt,
    ) -> Result<(), IrGenError> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                if self.lower_expr(expr)? {
                    self.emit(OpKind::Pop, [], span)?;
                }
            }
            StmtKind::Var { name, initializer } => {
                let slot = self.declare_local(name);
                if let Some(init) = initializer {
                    self.lower_value(init)?;
                    self.emit(OpKind::StoreLocal, [Operand::Int(slot as i64)], span)?;
                }
            }
            StmtKind::Assign { target, value } => {
                self.lower_value(value)?;
                if let Some(&slot) = self.locals.get(target) {
                    self.emit(OpKind::StoreLocal, [Operand::Int(slot as i64)], span)?;
                } else {
                    let index = self.global_slot(target, span)?;
                    self.emit(OpKind::StoreGlobal, [Operand::Int(index)], span)?;
                }
            }
            StmtKind::SetField {
                object,
                field,
                value,
            } => {
                self.lower_value(object)?;
                self.lower_value(value)?;
                let name = self.const_operand(Constant::Str(field.clone()));
                self.emit(OpKind::SetField, [name], span)?;
            }
            StmtKind::SetIndex {
                target,
                index,
                value,
            } => {
                self.lower_value(target)?;
                self.lower_value(index)?;
                self.lower_value(value)?;
                self.emit(OpKind::SetIndex, [], span)?;
            }
            StmtKind::Resource { name, kind } => {
                let id = self.module.generate_resource();
                self.resources.insert(name.clone(), id);
                if *kind == ResourceKind::Qubit {
                    self.emit(OpKind::AllocResource, [Operand::Resource(id)], span)?;
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let then_label = self.fresh_label("then");
                let else_label = self.fresh_label("else");
                let end_label = self.fresh_label("endif");
                let false_target = if else_branch.is_some() {
                    &else_label
                } else {
                    &end_label
                };

                self.lower_value(condition)?;
                self.emit(OpKind::JumpIfNot, [Operand::Label(false_target.clone())], span)?;
                self.jump_to(&then_label, span)?;

                self.start_block(then_label);
                self.lower_block(then_branch)?;
                self.jump_to(&end_label, span)?;

                if let Some(else_branch) = else_branch {
                    self.start_block(else_label);
                    self.lower_block(else_branch)?;
                    self.jump_to(&end_label, span)?;
                }
                self.start_block(end_label);
            }
            StmtKind::While { condition, body } => {
                let cond_label = self.fresh_label("while.cond");
                let body_label = self.fresh_label("while.body");
                let end_label = self.fresh_label("while.end");

                self.jump_to(&cond_label, span)?;
                self.start_block(cond_label.clone());
                self.lower_value(condition)?;
                self.emit(OpKind::JumpIfNot, [Operand::Label(end_label.clone())], span)?;
                self.jump_to(&body_label, span)?;

                self.start_block(body_label);
                self.lower_block(body)?;
                self.jump_to(&cond_label, span)?;

                self.start_block(end_label);
            }
            StmtKind::Return(value) => match value {
                Some(expr) => {
                    self.lower_value(expr)?;
                    self.emit(OpKind::ReturnValue, [], span)?;
                }
                None => self.emit(OpKind::Return, [], span)?,
            },
            StmtKind::Block(block) => self.lower_block(block)?,
            StmtKind::Item(item) => {
                return Err(IrGenError::Misplaced {
                    kind: item_kind_name(item),
                    span: item.span,
                })
            }
            StmtKind::Opaque { kind } => {
                return Err(IrGenError::Unsupported {
                    kind: kind.clone(),
                    span,
                })
            }
        }
        Ok(())
    }

    /// 降级一个必须产生值的表达式
    fn lower_value(
        &mut self,
        expr: &Expr,
    ) -> Result<(), IrGenError> {
        if self.lower_expr(expr)? {
            Ok(())
        } else {
            let kind = match expr {
                Expr::Resource { op, .. } => format!("resource operation `{}` used as a value", op.name()),
                _ => "expression without a value".to_string(),
            };
            Err(IrGenError::Misplaced {
                kind,
                span: expr.span(),
            })
        }
    }

    /// 降级表达式，返回是否压栈
    fn lower_expr(
        &mut self,
        expr: &Expr,
    ) -> Result<bool, IrGenError> {
        let span = expr.span();
        match expr {
            Expr::Lit(lit, _) => {
                let operand = self.const_operand(constant_of(lit));
                self.emit(OpKind::LoadConst, [operand], span)?;
            }
            Expr::Var(name, _) => {
                if let Some(&slot) = self.locals.get(name) {
                    self.emit(OpKind::LoadLocal, [Operand::Int(slot as i64)], span)?;
                } else {
                    let index = self.global_slot(name, span)?;
                    self.emit(OpKind::LoadGlobal, [Operand::Int(index)], span)?;
                }
            }
            Expr::BinOp {
                op, left, right, ..
            } => {
                self.lower_value(left)?;
                self.lower_value(right)?;
                self.emit(binary_op(*op), [], span)?;
            }
            Expr::UnOp { op, expr, .. } => {
                self.lower_value(expr)?;
                let op = match op {
                    UnOp::Neg => OpKind::Neg,
                    UnOp::Not => OpKind::Not,
                    UnOp::BitNot => OpKind::BitNot,
                };
                self.emit(op, [], span)?;
            }
            Expr::Call { func, args, .. } => {
                for arg in args {
                    self.lower_value(arg)?;
                }
                let callee = self.const_operand(Constant::Str(func.clone()));
                self.emit(
                    OpKind::Call,
                    [callee, Operand::Int(args.len() as i64)],
                    span,
                )?;
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
                ..
            } => {
                self.lower_value(receiver)?;
                for arg in args {
                    self.lower_value(arg)?;
                }
                let name = self.const_operand(Constant::Str(method.clone()));
                self.emit(
                    OpKind::CallMethod,
                    [name, Operand::Int(args.len() as i64)],
                    span,
                )?;
            }
            Expr::List(elements, _) => {
                for element in elements {
                    self.lower_value(element)?;
                }
                self.emit(
                    OpKind::NewList,
                    [Operand::Int(elements.len() as i64)],
                    span,
                )?;
            }
            Expr::Index { expr, index, .. } => {
                self.lower_value(expr)?;
                self.lower_value(index)?;
                self.emit(OpKind::GetIndex, [], span)?;
            }
            Expr::FieldAccess { expr, field, .. } => {
                self.lower_value(expr)?;
                let name = self.const_operand(Constant::Str(field.clone()));
                self.emit(OpKind::GetField, [name], span)?;
            }
            Expr::New { class, .. } => {
                let name = self.const_operand(Constant::Str(class.clone()));
                self.emit(OpKind::NewObject, [name], span)?;
            }
            Expr::Resource { op, args, .. } => {
                let operands = args
                    .iter()
                    .map(|name| self.resource(name, span).map(Operand::Resource))
                    .collect::<Result<Vec<_>, _>>()?;
                let kind = resource_op(*op);
                self.emit(kind, operands, span)?;
                return Ok(!kind.is_stack_neutral_resource());
            }
            Expr::Opaque { kind, .. } => {
                return Err(IrGenError::Unsupported {
                    kind: kind.clone(),
                    span,
                })
            }
        }
        Ok(true)
    }
}

fn constant_of(lit: &Literal) -> Constant {
    match lit {
        Literal::Int(v) => Constant::Int(*v),
        Literal::Float(v) => Constant::Float(*v),
        Literal::Bool(v) => Constant::Bool(*v),
        Literal::String(s) => Constant::Str(s.clone()),
        Literal::None => Constant::None,
    }
}

fn ir_type(name: Option<&str>) -> IrType {
    match name {
        None => IrType::Any,
        Some("void") => IrType::Void,
        Some("bool") => IrType::Bool,
        Some("int") => IrType::Int,
        Some("float") => IrType::Float,
        Some("str") => IrType::Str,
        Some("qubit") => IrType::Qubit,
        Some("pair") => IrType::Pair,
        Some(other) => IrType::Object(other.to_string()),
    }
}

fn binary_op(op: BinOp) -> OpKind {
    match op {
        BinOp::Add => OpKind::Add,
        BinOp::Sub => OpKind::Sub,
        BinOp::Mul => OpKind::Mul,
        BinOp::Div => OpKind::Div,
        BinOp::Mod => OpKind::Mod,
        BinOp::BitAnd => OpKind::BitAnd,
        BinOp::BitOr => OpKind::BitOr,
        BinOp::BitXor => OpKind::BitXor,
        BinOp::Shl => OpKind::Shl,
        BinOp::Shr => OpKind::Shr,
        BinOp::Eq => OpKind::Eq,
        BinOp::Neq => OpKind::Ne,
        BinOp::Lt => OpKind::Lt,
        BinOp::Le => OpKind::Le,
        BinOp::Gt => OpKind::Gt,
        BinOp::Ge => OpKind::Ge,
        BinOp::And => OpKind::And,
        BinOp::Or => OpKind::Or,
    }
}

fn resource_op(op: ResourceOp) -> OpKind {
    match op {
        ResourceOp::Measure => OpKind::Measure,
        ResourceOp::Entangle => OpKind::CreatePair,
        ResourceOp::Disentangle => OpKind::BreakPair,
        ResourceOp::Swap => OpKind::SwapPair,
        ResourceOp::MeasurePair => OpKind::MeasurePaired,
        ResourceOp::JointMeasure => OpKind::JointMeasure,
    }
}

fn item_kind_name(item: &Item) -> String {
    match &item.kind {
        ItemKind::Import { .. } => "import",
        ItemKind::Var { .. } => "variable declaration",
        ItemKind::Fn(_) => "function declaration",
        ItemKind::Class { .. } => "class declaration",
        ItemKind::Stmt(_) => "statement",
        ItemKind::Opaque { .. } => "unknown item",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::diagnostic::ErrorCollector;

    fn sp(line: u32) -> Span {
        Span::at(line, 1)
    }

    fn stmt(
        kind: StmtKind,
        line: u32,
    ) -> Item {
        Item {
            kind: ItemKind::Stmt(Stmt {
                kind,
                span: sp(line),
            }),
            span: sp(line),
        }
    }

    fn resource(
        op: ResourceOp,
        args: &[&str],
        line: u32,
    ) -> StmtKind {
        StmtKind::Expr(Box::new(Expr::Resource {
            op,
            args: args.iter().map(|s| s.to_string()).collect(),
            span: sp(line),
        }))
    }

    fn declare(
        name: &str,
        kind: ResourceKind,
        line: u32,
    ) -> Item {
        stmt(
            StmtKind::Resource {
                name: name.to_string(),
                kind,
            },
            line,
        )
    }

    fn generate(program: &Program) -> (Result<Module, IrGenError>, ErrorCollector) {
        let mut sink = ErrorCollector::new();
        let result = IrGenerator::new("demo", "demo.ent").generate(program, &mut sink);
        (result, sink)
    }

    #[test]
    fn test_lower_resource_program() {
        let program = Program {
            items: vec![
                declare("a", ResourceKind::Qubit, 1),
                declare("b", ResourceKind::Qubit, 2),
                declare("p", ResourceKind::Pair, 3),
                stmt(resource(ResourceOp::Entangle, &["a", "b", "p"], 4), 4),
                stmt(resource(ResourceOp::MeasurePair, &["p"], 5), 5),
                stmt(resource(ResourceOp::Disentangle, &["p"], 6), 6),
            ],
        };
        let (result, sink) = generate(&program);
        let module = result.unwrap();
        assert!(sink.is_empty());
        assert_eq!(module.verify(), Ok(()));

        let main = module.find_function("$main").unwrap();
        assert!(main.is_resource_bearing);
        let ops: Vec<OpKind> = main.all_instructions().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![
                OpKind::AllocResource,
                OpKind::AllocResource,
                OpKind::CreatePair,
                OpKind::MeasurePaired,
                OpKind::Pop,
                OpKind::BreakPair,
                OpKind::Halt,
            ]
        );
        let create = main.all_instructions().nth(2).unwrap();
        assert_eq!(create.span.line(), 4);
        let pair = create.correlated_resource().unwrap();
        assert_eq!(main.find_create_pair(pair), Some((0, 2)));
    }

    #[test]
    fn test_opaque_item_is_rejected() {
        let program = Program {
            items: vec![Item {
                kind: ItemKind::Opaque {
                    kind: "macro_rules".to_string(),
                },
                span: Span::at(7, 3),
            }],
        };
        let (result, sink) = generate(&program);
        assert!(matches!(result, Err(IrGenError::Unsupported { .. })));
        let diags = sink.with_code(codes::UNKNOWN_NODE).collect::<Vec<_>>();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].line, 7);
        assert_eq!(diags[0].column, 3);
    }

    #[test]
    fn test_opaque_expression_is_rejected() {
        let program = Program {
            items: vec![stmt(
                StmtKind::Expr(Box::new(Expr::Opaque {
                    kind: "await".to_string(),
                    span: sp(2),
                })),
                2,
            )],
        };
        let (result, sink) = generate(&program);
        assert_eq!(
            result.unwrap_err(),
            IrGenError::Unsupported {
                kind: "await".to_string(),
                span: sp(2)
            }
        );
        assert!(sink.has_errors());
    }

    #[test]
    fn test_unknown_resource() {
        let program = Program {
            items: vec![stmt(resource(ResourceOp::Disentangle, &["ghost"], 3), 3)],
        };
        let (result, sink) = generate(&program);
        assert!(matches!(result, Err(IrGenError::UnknownResource { .. })));
        let diag = &sink.diagnostics()[0];
        assert_eq!(diag.code, codes::UNKNOWN_RESOURCE);
        assert!(!diag.suggestions.is_empty());
    }

    #[test]
    fn test_resource_arity_is_checked() {
        let program = Program {
            items: vec![
                declare("a", ResourceKind::Qubit, 1),
                declare("p", ResourceKind::Pair, 2),
                stmt(resource(ResourceOp::Entangle, &["a", "p"], 3), 3),
            ],
        };
        let (result, sink) = generate(&program);
        assert!(matches!(
            result,
            Err(IrGenError::Ir(IrError::ArityMismatch { expected: 3, found: 2, .. }))
        ));
        assert_eq!(sink.diagnostics()[0].code, codes::ARITY_MISMATCH);
    }

    #[test]
    fn test_neutral_resource_op_as_value_is_misplaced() {
        let program = Program {
            items: vec![
                declare("p", ResourceKind::Pair, 1),
                stmt(
                    StmtKind::Var {
                        name: "x".to_string(),
                        initializer: Some(Box::new(Expr::Resource {
                            op: ResourceOp::Disentangle,
                            args: vec!["p".to_string()],
                            span: sp(2),
                        })),
                    },
                    2,
                ),
            ],
        };
        let (result, _) = generate(&program);
        assert!(matches!(result, Err(IrGenError::Misplaced { .. })));
    }

    #[test]
    fn test_nested_function_is_misplaced() {
        let inner = Item {
            kind: ItemKind::Fn(FnDecl {
                name: "inner".to_string(),
                params: vec![],
                return_type: None,
                body: Block::default(),
                span: sp(3),
            }),
            span: sp(3),
        };
        let outer = FnDecl {
            name: "outer".to_string(),
            params: vec![],
            return_type: None,
            body: Block {
                stmts: vec![Stmt {
                    kind: StmtKind::Item(Box::new(inner)),
                    span: sp(3),
                }],
                span: sp(2),
            },
            span: sp(2),
        };
        let program = Program {
            items: vec![Item {
                kind: ItemKind::Fn(outer),
                span: sp(2),
            }],
        };
        let (result, sink) = generate(&program);
        assert!(matches!(result, Err(IrGenError::Misplaced { .. })));
        assert_eq!(sink.diagnostics()[0].code, codes::MISPLACED_NODE);
    }

    #[test]
    fn test_control_flow_and_functions() {
        let cond = Expr::BinOp {
            op: BinOp::Lt,
            left: Box::new(Expr::Var("n".to_string(), sp(2))),
            right: Box::new(Expr::Lit(Literal::Int(10), sp(2))),
            span: sp(2),
        };
        let body = FnDecl {
            name: "count".to_string(),
            params: vec![AstParam {
                name: "n".to_string(),
                ty: Some("int".to_string()),
            }],
            return_type: Some("int".to_string()),
            body: Block {
                stmts: vec![
                    Stmt {
                        kind: StmtKind::While {
                            condition: Box::new(cond.clone()),
                            body: Box::new(Block {
                                stmts: vec![Stmt {
                                    kind: StmtKind::Assign {
                                        target: "n".to_string(),
                                        value: Box::new(Expr::BinOp {
                                            op: BinOp::Add,
                                            left: Box::new(Expr::Var("n".to_string(), sp(3))),
                                            right: Box::new(Expr::Lit(Literal::Int(1), sp(3))),
                                            span: sp(3),
                                        }),
                                    },
                                    span: sp(3),
                                }],
                                span: sp(3),
                            }),
                        },
                        span: sp(2),
                    },
                    Stmt {
                        kind: StmtKind::If {
                            condition: Box::new(cond),
                            then_branch: Box::new(Block {
                                stmts: vec![Stmt {
                                    kind: StmtKind::Return(Some(Box::new(Expr::Var(
                                        "n".to_string(),
                                        sp(5),
                                    )))),
                                    span: sp(5),
                                }],
                                span: sp(5),
                            }),
                            else_branch: Some(Box::new(Block::default())),
                        },
                        span: sp(4),
                    },
                ],
                span: sp(1),
            },
            span: sp(1),
        };
        let program = Program {
            items: vec![
                Item {
                    kind: ItemKind::Import {
                        path: "std.io".to_string(),
                    },
                    span: sp(1),
                },
                Item {
                    kind: ItemKind::Var {
                        name: "total".to_string(),
                        initializer: Some(Box::new(Expr::Lit(Literal::Int(0), sp(1)))),
                    },
                    span: sp(1),
                },
                Item {
                    kind: ItemKind::Fn(body),
                    span: sp(1),
                },
                stmt(
                    StmtKind::Assign {
                        target: "total".to_string(),
                        value: Box::new(Expr::Call {
                            func: "count".to_string(),
                            args: vec![Expr::Lit(Literal::Int(1), sp(9))],
                            span: sp(9),
                        }),
                    },
                    9,
                ),
            ],
        };
        let (result, sink) = generate(&program);
        let module = result.unwrap();
        assert!(sink.is_empty());
        assert_eq!(module.verify(), Ok(()));
        assert_eq!(module.metadata.get("import.0").map(String::as_str), Some("std.io"));
        assert_eq!(module.globals[0].initializer, Some(Constant::Int(0)));

        let count = module.find_function("count").unwrap();
        assert_eq!(count.arity(), 1);
        assert_eq!(count.local_count, 1);
        assert_eq!(count.return_type, IrType::Int);
        assert!(!count.is_resource_bearing);
        assert!(count.block("while.body.2").is_some());
        assert!(count
            .all_instructions()
            .any(|i| i.op == OpKind::ReturnValue));

        let main = module.find_function("$main").unwrap();
        let ops: Vec<OpKind> = main.all_instructions().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![
                OpKind::LoadConst,
                OpKind::StoreGlobal,
                OpKind::LoadConst,
                OpKind::Call,
                OpKind::StoreGlobal,
                OpKind::Halt,
            ]
        );
        let init = main.all_instructions().next().unwrap();
        let Operand::Const(idx) = init.operands[0] else {
            panic!("expected a constant operand, got {}", init.operands[0]);
        };
        assert_eq!(module.constants[idx as usize], Constant::Int(0));
    }

    #[test]
    fn test_class_methods_take_self() {
        let method = FnDecl {
            name: "get".to_string(),
            params: vec![],
            return_type: None,
            body: Block {
                stmts: vec![Stmt {
                    kind: StmtKind::Return(Some(Box::new(Expr::FieldAccess {
                        expr: Box::new(Expr::Var("self".to_string(), sp(2))),
                        field: "x".to_string(),
                        span: sp(2),
                    }))),
                    span: sp(2),
                }],
                span: sp(2),
            },
            span: sp(1),
        };
        let program = Program {
            items: vec![Item {
                kind: ItemKind::Class {
                    name: "Point".to_string(),
                    methods: vec![method],
                },
                span: sp(1),
            }],
        };
        let (result, _) = generate(&program);
        let module = result.unwrap();
        let get = module.find_function("Point.get").unwrap();
        assert_eq!(get.params[0].name, "self");
        assert_eq!(module.verify(), Ok(()));
    }
}
