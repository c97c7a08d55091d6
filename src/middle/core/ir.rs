//! Intermediate Representation
//!
//! The single mutable representation shared by every later phase: a
//! [`Module`] owns functions, basic blocks and instructions, and is the only
//! source of node identity through [`Module::generate_id`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::util::diagnostic::{codes, Category, Diagnostic, DiagnosticBuilder, Severity};
use crate::util::span::Span;

/// Node identity, unique for the lifetime of the issuing module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Correlated-resource identity (drawn from the same module counter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Value type of functions, params and globals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    Void,
    Bool,
    Int,
    Float,
    Str,
    /// Single resource handle
    Qubit,
    /// Correlated resource pair
    Pair,
    List(Box<IrType>),
    Object(String),
    Any,
}

impl fmt::Display for IrType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::Int => write!(f, "int"),
            IrType::Float => write!(f, "float"),
            IrType::Str => write!(f, "str"),
            IrType::Qubit => write!(f, "qubit"),
            IrType::Pair => write!(f, "pair"),
            IrType::List(elem) => write!(f, "[{}]", elem),
            IrType::Object(name) => write!(f, "{}", name),
            IrType::Any => write!(f, "any"),
        }
    }
}

/// Module-level constant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PartialEq for Constant {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(l0), Self::Bool(r0)) => l0 == r0,
            (Self::Int(l0), Self::Int(r0)) => l0 == r0,
            (Self::Float(l0), Self::Float(r0)) => l0.to_bits() == r0.to_bits(),
            (Self::Str(l0), Self::Str(r0)) => l0 == r0,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl std::hash::Hash for Constant {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::None => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Constant::None => write!(f, "none"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Float(x) => write!(f, "{:?}", x),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Immediate integer
    Int(i64),
    /// Immediate float
    Float(f64),
    /// Constant-pool index
    Const(u32),
    /// Basic-block label in the same function
    Label(String),
    /// Correlated-resource reference
    Resource(ResourceId),
}

impl Operand {
    /// The resource id, if this is a resource operand
    pub fn as_resource(&self) -> Option<ResourceId> {
        match self {
            Operand::Resource(id) => Some(*id),
            _ => None,
        }
    }

    /// The label, if this is a label operand
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Operand::Label(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Operand::Int(v) => write!(f, "{}", v),
            Operand::Float(v) => write!(f, "{:?}", v),
            Operand::Const(idx) => write!(f, "#{}", idx),
            Operand::Label(label) => write!(f, "^{}", label),
            Operand::Resource(id) => write!(f, "{}", id),
        }
    }
}

/// Operation family, mirrored by the bytecode opcode ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpFamily {
    Control,
    Data,
    Composite,
    Function,
    Jump,
    Arithmetic,
    Bitwise,
    Logical,
    Comparison,
    Resource,
}

/// IR operation kind
///
/// Every operation of the stack machine. Operands carry immediates only;
/// runtime values flow through the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    // =====================
    // Control
    // =====================
    Nop,
    Halt,
    Return,
    ReturnValue,

    // =====================
    // Data
    // =====================
    /// `[Const]`
    LoadConst,
    /// `[Int global_index]`
    LoadGlobal,
    /// `[Int global_index]`
    StoreGlobal,
    /// `[Int slot]`
    LoadLocal,
    /// `[Int slot]`
    StoreLocal,
    Pop,
    Dup,

    // =====================
    // Composite / indexing
    // =====================
    /// `[Int element_count]`
    NewList,
    /// `[Const class_name]`
    NewObject,
    /// `[Const field_name]`
    GetField,
    /// `[Const field_name]`
    SetField,
    GetIndex,
    SetIndex,

    // =====================
    // Function
    // =====================
    /// `[Const callee_name, Int argc]`
    Call,
    /// `[Const method_name, Int argc]`
    CallMethod,

    // =====================
    // Jump
    // =====================
    /// `[Label]`
    Jump,
    /// `[Label]`, pops the condition
    JumpIf,
    /// `[Label]`, pops the condition
    JumpIfNot,

    // =====================
    // Arithmetic
    // =====================
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,

    // =====================
    // Bitwise
    // =====================
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    BitNot,

    // =====================
    // Logical
    // =====================
    And,
    Or,
    Not,

    // =====================
    // Comparison
    // =====================
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // =====================
    // Resource operations
    // =====================
    /// `[Resource]`
    AllocResource,
    /// `[Resource]`, pushes the outcome
    Measure,
    /// `[Resource left, Resource right, Resource pair]`
    CreatePair,
    /// `[Resource pair]`
    BreakPair,
    /// `[Resource pair, Resource other]`
    SwapPair,
    /// `[Resource pair]`, pushes the outcome
    MeasurePaired,
    /// `[Resource pair, Resource other]`, pushes the outcome
    JointMeasure,
}

impl OpKind {
    /// Every operation kind, in declaration order
    pub const ALL: [OpKind; 50] = [
        OpKind::Nop,
        OpKind::Halt,
        OpKind::Return,
        OpKind::ReturnValue,
        OpKind::LoadConst,
        OpKind::LoadGlobal,
        OpKind::StoreGlobal,
        OpKind::LoadLocal,
        OpKind::StoreLocal,
        OpKind::Pop,
        OpKind::Dup,
        OpKind::NewList,
        OpKind::NewObject,
        OpKind::GetField,
        OpKind::SetField,
        OpKind::GetIndex,
        OpKind::SetIndex,
        OpKind::Call,
        OpKind::CallMethod,
        OpKind::Jump,
        OpKind::JumpIf,
        OpKind::JumpIfNot,
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Mod,
        OpKind::Neg,
        OpKind::BitAnd,
        OpKind::BitOr,
        OpKind::BitXor,
        OpKind::Shl,
        OpKind::Shr,
        OpKind::BitNot,
        OpKind::And,
        OpKind::Or,
        OpKind::Not,
        OpKind::Eq,
        OpKind::Ne,
        OpKind::Lt,
        OpKind::Le,
        OpKind::Gt,
        OpKind::Ge,
        OpKind::AllocResource,
        OpKind::Measure,
        OpKind::CreatePair,
        OpKind::BreakPair,
        OpKind::SwapPair,
        OpKind::MeasurePaired,
        OpKind::JointMeasure,
    ];

    /// Operand count required by this operation
    pub fn arity(self) -> usize {
        use OpKind::*;
        match self {
            Nop | Halt | Return | ReturnValue => 0,
            LoadConst | LoadGlobal | StoreGlobal | LoadLocal | StoreLocal => 1,
            Pop | Dup => 0,
            NewList | NewObject | GetField | SetField => 1,
            GetIndex | SetIndex => 0,
            Call | CallMethod => 2,
            Jump | JumpIf | JumpIfNot => 1,
            Add | Sub | Mul | Div | Mod | Neg => 0,
            BitAnd | BitOr | BitXor | Shl | Shr | BitNot => 0,
            And | Or | Not => 0,
            Eq | Ne | Lt | Le | Gt | Ge => 0,
            AllocResource | Measure => 1,
            CreatePair => 3,
            BreakPair | MeasurePaired => 1,
            SwapPair | JointMeasure => 2,
        }
    }

    /// Operation family
    pub fn family(self) -> OpFamily {
        use OpKind::*;
        match self {
            Nop | Halt | Return | ReturnValue => OpFamily::Control,
            LoadConst | LoadGlobal | StoreGlobal | LoadLocal | StoreLocal | Pop | Dup => {
                OpFamily::Data
            }
            NewList | NewObject | GetField | SetField | GetIndex | SetIndex => OpFamily::Composite,
            Call | CallMethod => OpFamily::Function,
            Jump | JumpIf | JumpIfNot => OpFamily::Jump,
            Add | Sub | Mul | Div | Mod | Neg => OpFamily::Arithmetic,
            BitAnd | BitOr | BitXor | Shl | Shr | BitNot => OpFamily::Bitwise,
            And | Or | Not => OpFamily::Logical,
            Eq | Ne | Lt | Le | Gt | Ge => OpFamily::Comparison,
            AllocResource | Measure | CreatePair | BreakPair | SwapPair | MeasurePaired
            | JointMeasure => OpFamily::Resource,
        }
    }

    /// Ends a basic block; conditional jumps fall through and do not
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpKind::Halt | OpKind::Return | OpKind::ReturnValue | OpKind::Jump
        )
    }

    /// One of the five correlated-resource operations
    pub fn is_correlated(self) -> bool {
        matches!(
            self,
            OpKind::CreatePair
                | OpKind::BreakPair
                | OpKind::SwapPair
                | OpKind::MeasurePaired
                | OpKind::JointMeasure
        )
    }

    /// Any resource operation (correlated or single-handle)
    pub fn is_resource(self) -> bool {
        self.family() == OpFamily::Resource
    }

    /// Resource operation that leaves the evaluation stack untouched
    pub fn is_stack_neutral_resource(self) -> bool {
        matches!(
            self,
            OpKind::AllocResource | OpKind::CreatePair | OpKind::BreakPair | OpKind::SwapPair
        )
    }

    /// Opaque to local reasoning (control may leave the function)
    pub fn is_call(self) -> bool {
        matches!(self, OpKind::Call | OpKind::CallMethod)
    }

    /// Textual mnemonic
    pub fn mnemonic(self) -> &'static str {
        use OpKind::*;
        match self {
            Nop => "nop",
            Halt => "halt",
            Return => "ret",
            ReturnValue => "retv",
            LoadConst => "ldc",
            LoadGlobal => "ldg",
            StoreGlobal => "stg",
            LoadLocal => "ldl",
            StoreLocal => "stl",
            Pop => "pop",
            Dup => "dup",
            NewList => "newlist",
            NewObject => "newobj",
            GetField => "getfield",
            SetField => "setfield",
            GetIndex => "getindex",
            SetIndex => "setindex",
            Call => "call",
            CallMethod => "callmethod",
            Jump => "jmp",
            JumpIf => "jmpif",
            JumpIfNot => "jmpifnot",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Neg => "neg",
            BitAnd => "band",
            BitOr => "bor",
            BitXor => "bxor",
            Shl => "shl",
            Shr => "shr",
            BitNot => "bnot",
            And => "and",
            Or => "or",
            Not => "not",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            AllocResource => "alloc",
            Measure => "measure",
            CreatePair => "create_pair",
            BreakPair => "break_pair",
            SwapPair => "swap_pair",
            MeasurePaired => "measure_paired",
            JointMeasure => "joint_measure",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand list; three inline slots cover every opcode
pub type Operands = SmallVec<[Operand; 3]>;

/// Instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: NodeId,
    pub op: OpKind,
    pub operands: Operands,
    /// Source span for error reporting and the bytecode line table
    pub span: Span,
}

impl Instruction {
    /// Build an instruction, rejecting an operand count that does not match
    /// the opcode's arity
    pub fn new(
        id: NodeId,
        op: OpKind,
        operands: impl IntoIterator<Item = Operand>,
        span: Span,
    ) -> Result<Self, IrError> {
        let operands: Operands = operands.into_iter().collect();
        if operands.len() != op.arity() {
            return Err(IrError::ArityMismatch {
                op,
                expected: op.arity(),
                found: operands.len(),
                span,
            });
        }
        Ok(Self {
            id,
            op,
            operands,
            span,
        })
    }

    /// Position of the correlated-resource operand: the third operand of a
    /// create-pair, the first one of every other correlated operation
    fn correlated_position(&self) -> Option<usize> {
        match self.op {
            OpKind::CreatePair => Some(2),
            op if op.is_correlated() => Some(0),
            _ => None,
        }
    }

    /// The correlated resource this instruction refers to
    pub fn correlated_resource(&self) -> Option<ResourceId> {
        let pos = self.correlated_position()?;
        self.operands.get(pos).and_then(Operand::as_resource)
    }

    /// Mutable access to the correlated-resource operand
    pub fn correlated_operand_mut(&mut self) -> Option<&mut Operand> {
        let pos = self.correlated_position()?;
        self.operands.get_mut(pos)
    }

    /// Every resource operand, in operand order
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.operands.iter().filter_map(Operand::as_resource)
    }

    /// Whether any resource operand is in `set`
    pub fn touches(
        &self,
        set: &HashSet<ResourceId>,
    ) -> bool {
        self.resources().any(|id| set.contains(&id))
    }

    /// Endpoints of a create-pair instruction
    pub fn pair_endpoints(&self) -> Option<(ResourceId, ResourceId)> {
        if self.op != OpKind::CreatePair {
            return None;
        }
        let left = self.operands.first()?.as_resource()?;
        let right = self.operands.get(1)?.as_resource()?;
        Some((left, right))
    }

    /// Jump target label, if this is a jump
    pub fn jump_target(&self) -> Option<&str> {
        if self.op.family() == OpFamily::Jump {
            self.operands.first().and_then(Operand::as_label)
        } else {
            None
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.op)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", operand)?;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        Ok(())
    }
}

/// Basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Create an empty block
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
        }
    }

    /// Append an instruction
    pub fn push(
        &mut self,
        instr: Instruction,
    ) {
        self.instructions.push(instr);
    }

    /// Last instruction, if it is a terminator
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.op.is_terminator())
    }

    /// Whether the block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

/// Function IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: NodeId,
    pub name: String,
    pub return_type: IrType,
    /// Contains at least one correlated-resource operation
    pub is_resource_bearing: bool,
    pub params: Vec<Param>,
    /// Local slots, parameters included
    pub local_count: u32,
    /// First block is the entry block
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// Create an empty function
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        return_type: IrType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            return_type,
            is_resource_bearing: false,
            params: Vec::new(),
            local_count: 0,
            blocks: Vec::new(),
        }
    }

    /// Parameter count
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Entry block
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Append a block and return it
    pub fn add_block(
        &mut self,
        label: impl Into<String>,
    ) -> &mut BasicBlock {
        self.blocks.push(BasicBlock::new(label));
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    /// Index of the block with `label`
    pub fn block_index(
        &self,
        label: &str,
    ) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Block with `label`
    pub fn block(
        &self,
        label: &str,
    ) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// 迭代所有指令
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions.iter())
    }

    /// Total instruction count
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// Recompute the resource-bearing flag from the body
    pub fn refresh_resource_flag(&mut self) -> bool {
        let flag = self.all_instructions().any(|i| i.op.is_correlated());
        self.is_resource_bearing = flag;
        flag
    }

    /// Location of the create-pair instruction for `pair`
    pub fn find_create_pair(
        &self,
        pair: ResourceId,
    ) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(b, block)| {
            block
                .instructions
                .iter()
                .position(|i| i.op == OpKind::CreatePair && i.correlated_resource() == Some(pair))
                .map(|idx| (b, idx))
        })
    }

    fn verify(&self) -> Result<(), IrError> {
        if self.blocks.is_empty() {
            return Err(IrError::EmptyFunction {
                function: self.name.clone(),
            });
        }

        let mut labels = HashSet::new();
        for block in &self.blocks {
            if !labels.insert(block.label.as_str()) {
                return Err(IrError::DuplicateLabel {
                    function: self.name.clone(),
                    label: block.label.clone(),
                });
            }

            let last = block.instructions.len().checked_sub(1);
            for (idx, instr) in block.instructions.iter().enumerate() {
                if instr.operands.len() != instr.op.arity() {
                    return Err(IrError::ArityMismatch {
                        op: instr.op,
                        expected: instr.op.arity(),
                        found: instr.operands.len(),
                        span: instr.span,
                    });
                }
                if instr.op.is_terminator() && Some(idx) != last {
                    return Err(IrError::MisplacedTerminator {
                        function: self.name.clone(),
                        block: block.label.clone(),
                        index: idx,
                    });
                }
            }
            if !block.is_terminated() {
                return Err(IrError::MissingTerminator {
                    function: self.name.clone(),
                    block: block.label.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        write!(
            f,
            "fn {}({}) -> {}",
            self.name,
            params.join(", "),
            self.return_type
        )?;
        if self.is_resource_bearing {
            write!(f, " [resource]")?;
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for instr in &block.instructions {
                writeln!(f, "  {}", instr)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Global variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub id: NodeId,
    pub name: String,
    pub ty: IrType,
    pub initializer: Option<Constant>,
}

/// Module IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub source_file: String,
    /// Next id handed out by `generate_id`
    next_id: u64,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub constants: Vec<Constant>,
    /// Free-form comments attached to nodes
    pub comments: IndexMap<NodeId, String>,
    pub metadata: IndexMap<String, String>,
}

impl Module {
    /// Create an empty module
    pub fn new(
        name: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_file: source_file.into(),
            next_id: 0,
            functions: Vec::new(),
            globals: Vec::new(),
            constants: Vec::new(),
            comments: IndexMap::new(),
            metadata: IndexMap::new(),
        }
    }

    /// Allocate a fresh node id; strictly increasing within this module
    pub fn generate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocate a fresh resource id
    pub fn generate_resource(&mut self) -> ResourceId {
        ResourceId(self.generate_id().0)
    }

    /// Build an instruction with a freshly generated id
    pub fn instruction(
        &mut self,
        op: OpKind,
        operands: impl IntoIterator<Item = Operand>,
        span: Span,
    ) -> Result<Instruction, IrError> {
        let id = self.generate_id();
        Instruction::new(id, op, operands, span)
    }

    /// Append a function and return its index
    pub fn add_function(
        &mut self,
        function: Function,
    ) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    /// Append a global and return its index
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: IrType,
        initializer: Option<Constant>,
    ) -> usize {
        let id = self.generate_id();
        self.globals.push(Global {
            id,
            name: name.into(),
            ty,
            initializer,
        });
        self.globals.len() - 1
    }

    /// Append a constant and return its index
    pub fn add_constant(
        &mut self,
        value: Constant,
    ) -> u32 {
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Return the index of an equal constant, appending it if absent
    pub fn intern_constant(
        &mut self,
        value: Constant,
    ) -> u32 {
        match self.constants.iter().position(|c| c == &value) {
            Some(idx) => idx as u32,
            None => self.add_constant(value),
        }
    }

    /// Find a function by name; absence is a normal outcome
    pub fn find_function(
        &self,
        name: &str,
    ) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find a function by name, mutably
    pub fn find_function_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Index of a global by name
    pub fn global_index(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.globals.iter().position(|g| g.name == name)
    }

    /// Attach a comment to a node
    pub fn annotate(
        &mut self,
        id: NodeId,
        comment: impl Into<String>,
    ) {
        self.comments.insert(id, comment.into());
    }

    /// Recompute every function's resource-bearing flag
    pub fn refresh_resource_flags(&mut self) {
        for function in &mut self.functions {
            function.refresh_resource_flag();
        }
    }

    /// Check the structural invariants: unique function names, non-empty
    /// bodies, unique labels, matching arities and exactly one trailing
    /// terminator per block
    pub fn verify(&self) -> Result<(), IrError> {
        let mut names = HashSet::new();
        for function in &self.functions {
            if !names.insert(function.name.as_str()) {
                return Err(IrError::DuplicateFunction {
                    name: function.name.clone(),
                });
            }
            function.verify()?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "; module {} ({})", self.name, self.source_file)?;
        for (key, value) in &self.metadata {
            writeln!(f, "; {} = {}", key, value)?;
        }
        for (idx, global) in self.globals.iter().enumerate() {
            match &global.initializer {
                Some(init) => writeln!(f, "global @{} {}: {} = {}", idx, global.name, global.ty, init)?,
                None => writeln!(f, "global @{} {}: {}", idx, global.name, global.ty)?,
            }
        }
        for (idx, constant) in self.constants.iter().enumerate() {
            writeln!(f, "const #{} = {}", idx, constant)?;
        }
        for function in &self.functions {
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

/// Structural IR errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IrError {
    #[error("`{op}` expects {expected} operand(s), found {found}")]
    ArityMismatch {
        op: OpKind,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("duplicate block label `{label}` in function `{function}`")]
    DuplicateLabel { function: String, label: String },

    #[error("block `{block}` in function `{function}` does not end in a terminator")]
    MissingTerminator { function: String, block: String },

    #[error("terminator at index {index} of block `{block}` in function `{function}` is not the last instruction")]
    MisplacedTerminator {
        function: String,
        block: String,
        index: usize,
    },

    #[error("function `{function}` has no basic blocks")]
    EmptyFunction { function: String },

    #[error("duplicate function `{name}`")]
    DuplicateFunction { name: String },
}

impl IrError {
    /// Error code in the diagnostic registry
    pub fn code(&self) -> &'static str {
        match self {
            IrError::ArityMismatch { .. } => codes::ARITY_MISMATCH,
            IrError::DuplicateLabel { .. } => codes::DUPLICATE_LABEL,
            IrError::MissingTerminator { .. } | IrError::MisplacedTerminator { .. } => {
                codes::BAD_TERMINATOR
            }
            IrError::EmptyFunction { .. } => codes::EMPTY_FUNCTION,
            IrError::DuplicateFunction { .. } => codes::DUPLICATE_FUNCTION,
        }
    }

    /// Convert to an `error` diagnostic, with the precise span when known
    pub fn to_diagnostic(
        &self,
        source_file: &str,
    ) -> Diagnostic {
        let span = match self {
            IrError::ArityMismatch { span, .. } => *span,
            _ => Span::dummy(),
        };
        DiagnosticBuilder::new(Severity::Error, self.code(), self.to_string())
            .category(Category::Structure)
            .at(source_file, span)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn halt_function(module: &mut Module) -> Function {
        let id = module.generate_id();
        let mut function = Function::new(id, "$main", IrType::Void);
        let halt = module.instruction(OpKind::Halt, [], Span::at(1, 1)).unwrap();
        function.add_block("entry").push(halt);
        function
    }

    #[test]
    fn test_generate_id_is_strictly_increasing() {
        let mut module = Module::new("m", "m.ent");
        let a = module.generate_id();
        let b = module.generate_id();
        let r = module.generate_resource();
        assert!(a < b);
        assert!(b.0 < r.0);
    }

    proptest! {
        #[test]
        fn prop_ids_unique_and_increasing(n in 1usize..500) {
            let mut module = Module::new("m", "m.ent");
            let ids: Vec<NodeId> = (0..n).map(|_| module.generate_id()).collect();
            for pair in ids.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), n);
        }
    }

    #[test]
    fn test_arity_mismatch_is_rejected() {
        let err = Instruction::new(
            NodeId(0),
            OpKind::CreatePair,
            [Operand::Resource(ResourceId(1))],
            Span::at(3, 4),
        )
        .unwrap_err();
        assert_eq!(
            err,
            IrError::ArityMismatch {
                op: OpKind::CreatePair,
                expected: 3,
                found: 1,
                span: Span::at(3, 4),
            }
        );
        let diag = err.to_diagnostic("x.ent");
        assert_eq!(diag.code, codes::ARITY_MISMATCH);
        assert_eq!(diag.line, 3);
    }

    #[test]
    fn test_every_op_accepts_its_arity() {
        for op in OpKind::ALL {
            let operands = vec![Operand::Int(0); op.arity()];
            assert!(Instruction::new(NodeId(0), op, operands, Span::dummy()).is_ok(), "{op}");
        }
    }

    #[test]
    fn test_correlated_position_rule() {
        let create = Instruction::new(
            NodeId(0),
            OpKind::CreatePair,
            [
                Operand::Resource(ResourceId(1)),
                Operand::Resource(ResourceId(2)),
                Operand::Resource(ResourceId(3)),
            ],
            Span::dummy(),
        )
        .unwrap();
        assert_eq!(create.correlated_resource(), Some(ResourceId(3)));
        assert_eq!(create.pair_endpoints(), Some((ResourceId(1), ResourceId(2))));

        let swap = Instruction::new(
            NodeId(1),
            OpKind::SwapPair,
            [Operand::Resource(ResourceId(3)), Operand::Resource(ResourceId(9))],
            Span::dummy(),
        )
        .unwrap();
        assert_eq!(swap.correlated_resource(), Some(ResourceId(3)));

        let measure = Instruction::new(
            NodeId(2),
            OpKind::Measure,
            [Operand::Resource(ResourceId(1))],
            Span::dummy(),
        )
        .unwrap();
        assert_eq!(measure.correlated_resource(), None);
        assert_eq!(measure.resources().collect::<Vec<_>>(), vec![ResourceId(1)]);
    }

    #[test]
    fn test_find_function_absent() {
        let mut module = Module::new("m", "m.ent");
        let main = halt_function(&mut module);
        module.add_function(main);
        assert!(module.find_function("$main").is_some());
        assert!(module.find_function("missing").is_none());
    }

    #[test]
    fn test_refresh_resource_flag() {
        let mut module = Module::new("m", "m.ent");
        let mut main = halt_function(&mut module);
        assert!(!main.refresh_resource_flag());

        let pair = module.generate_resource();
        let measure = module
            .instruction(OpKind::MeasurePaired, [Operand::Resource(pair)], Span::dummy())
            .unwrap();
        main.blocks[0].instructions.insert(0, measure);
        assert!(main.refresh_resource_flag());
        assert!(main.is_resource_bearing);
    }

    #[test]
    fn test_verify_accepts_well_formed() {
        let mut module = Module::new("m", "m.ent");
        let main = halt_function(&mut module);
        module.add_function(main);
        assert_eq!(module.verify(), Ok(()));
    }

    #[test]
    fn test_verify_rejects_missing_terminator() {
        let mut module = Module::new("m", "m.ent");
        let id = module.generate_id();
        let mut function = Function::new(id, "f", IrType::Void);
        let nop = module.instruction(OpKind::Nop, [], Span::dummy()).unwrap();
        function.add_block("entry").push(nop);
        module.add_function(function);
        assert!(matches!(
            module.verify(),
            Err(IrError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_duplicate_label_and_early_terminator() {
        let mut module = Module::new("m", "m.ent");
        let mut function = halt_function(&mut module);
        let halt = module.instruction(OpKind::Halt, [], Span::dummy()).unwrap();
        function.add_block("entry").push(halt);
        let mut dup = module.clone();
        dup.add_function(function.clone());
        assert!(matches!(dup.verify(), Err(IrError::DuplicateLabel { .. })));

        let mut early = halt_function(&mut module);
        let nop = module.instruction(OpKind::Nop, [], Span::dummy()).unwrap();
        early.blocks[0].instructions.push(nop);
        let mut bad = module.clone();
        bad.add_function(early);
        assert!(matches!(
            bad.verify(),
            Err(IrError::MisplacedTerminator { index: 0, .. })
        ));
    }

    #[test]
    fn test_verify_rejects_duplicate_function() {
        let mut module = Module::new("m", "m.ent");
        let a = halt_function(&mut module);
        let b = halt_function(&mut module);
        module.add_function(a);
        module.add_function(b);
        assert_eq!(
            module.verify(),
            Err(IrError::DuplicateFunction {
                name: "$main".to_string()
            })
        );
    }

    #[test]
    fn test_intern_constant() {
        let mut module = Module::new("m", "m.ent");
        assert_eq!(module.intern_constant(Constant::Str("a".into())), 0);
        assert_eq!(module.intern_constant(Constant::Int(1)), 1);
        assert_eq!(module.intern_constant(Constant::Str("a".into())), 0);
        assert_eq!(module.add_constant(Constant::Int(1)), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut module = Module::new("m", "m.ent");
        let main = halt_function(&mut module);
        module.add_function(main);
        let mut copy = module.clone();
        copy.functions[0].blocks[0].instructions.clear();
        assert_eq!(module.functions[0].instruction_count(), 1);
        assert_eq!(copy.generate_id(), module.clone().generate_id());
    }

    #[test]
    fn test_display() {
        let mut module = Module::new("demo", "demo.ent");
        module.add_global("counter", IrType::Int, Some(Constant::Int(0)));
        module.add_constant(Constant::Str("hi".into()));
        let id = module.generate_id();
        let mut function = Function::new(id, "$main", IrType::Void);
        let l = module.generate_resource();
        let r = module.generate_resource();
        let p = module.generate_resource();
        let create = module
            .instruction(
                OpKind::CreatePair,
                [Operand::Resource(l), Operand::Resource(r), Operand::Resource(p)],
                Span::dummy(),
            )
            .unwrap();
        let halt = module.instruction(OpKind::Halt, [], Span::dummy()).unwrap();
        let block = function.add_block("entry");
        block.push(create);
        block.push(halt);
        function.refresh_resource_flag();
        module.add_function(function);

        let text = module.to_string();
        assert!(text.contains("; module demo (demo.ent)"), "{text}");
        assert!(text.contains("global @0 counter: int = 0"), "{text}");
        assert!(text.contains("const #0 = \"hi\""), "{text}");
        assert!(text.contains("fn $main() -> void [resource] {"), "{text}");
        let create_line = format!("  create_pair {}, {}, {}", l, r, p);
        assert!(text.contains(&create_line), "{text}");
        assert!(text.contains("  halt"), "{text}");
    }
}
