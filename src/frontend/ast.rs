//! Abstract Syntax Tree types
//!
//! The tree handed over by the front end. Parsing and semantic analysis live
//! outside this crate; IR generation only consumes these types.

use crate::util::span::Span;

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    None,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Resource operation written in source
///
/// `entangle(a, b, p)` pairs `a` and `b` under the pair handle `p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOp {
    /// `measure(q)`
    Measure,
    /// `entangle(left, right, pair)`
    Entangle,
    /// `disentangle(pair)`
    Disentangle,
    /// `swap(pair, other)`
    Swap,
    /// `measure_pair(pair)`
    MeasurePair,
    /// `joint_measure(pair, other)`
    JointMeasure,
}

impl ResourceOp {
    /// Source-level name
    pub fn name(self) -> &'static str {
        match self {
            ResourceOp::Measure => "measure",
            ResourceOp::Entangle => "entangle",
            ResourceOp::Disentangle => "disentangle",
            ResourceOp::Swap => "swap",
            ResourceOp::MeasurePair => "measure_pair",
            ResourceOp::JointMeasure => "joint_measure",
        }
    }
}

/// Kind of a declared resource entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// `qubit q` allocates a single handle
    Qubit,
    /// `pair p` names a pair created later by `entangle`
    Pair,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Literal, Span),
    Var(String, Span),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    UnOp {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    /// Call of a named function
    Call {
        func: String,
        args: Vec<Expr>,
        span: Span,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        span: Span,
    },
    List(Vec<Expr>, Span),
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    FieldAccess {
        expr: Box<Expr>,
        field: String,
        span: Span,
    },
    /// Instantiate a declared class
    New { class: String, span: Span },
    /// Resource operation over named resource entities
    Resource {
        op: ResourceOp,
        args: Vec<String>,
        span: Span,
    },
    /// Node kind this crate does not know about
    Opaque { kind: String, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Lit(_, span) | Expr::Var(_, span) | Expr::List(_, span) => *span,
            Expr::BinOp { span, .. }
            | Expr::UnOp { span, .. }
            | Expr::Call { span, .. }
            | Expr::MethodCall { span, .. }
            | Expr::Index { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::New { span, .. }
            | Expr::Resource { span, .. }
            | Expr::Opaque { span, .. } => *span,
        }
    }
}

/// Block of statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Statement kind
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Box<Expr>),
    /// Variable declaration: `let name [= expr]`
    Var {
        name: String,
        initializer: Option<Box<Expr>>,
    },
    /// `name = value`
    Assign { target: String, value: Box<Expr> },
    /// `object.field = value`
    SetField {
        object: Box<Expr>,
        field: String,
        value: Box<Expr>,
    },
    /// `target[index] = value`
    SetIndex {
        target: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    /// Resource-entity declaration: `qubit q` / `pair p`
    Resource { name: String, kind: ResourceKind },
    If {
        condition: Box<Expr>,
        then_branch: Box<Block>,
        else_branch: Option<Box<Block>>,
    },
    While {
        condition: Box<Expr>,
        body: Box<Block>,
    },
    Return(Option<Box<Expr>>),
    Block(Box<Block>),
    /// Item appearing where only statements are allowed
    Item(Box<Item>),
    Opaque { kind: String },
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Type name as written, e.g. `int`, `qubit`, `Point`
    pub ty: Option<String>,
}

/// Function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub body: Block,
    pub span: Span,
}

/// Top-level item
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

/// Top-level item kind
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// `import path`
    Import { path: String },
    /// Module-level variable
    Var {
        name: String,
        initializer: Option<Box<Expr>>,
    },
    Fn(FnDecl),
    /// Class with methods; methods receive `self` as their first parameter
    Class { name: String, methods: Vec<FnDecl> },
    /// Top-level statement, collected into the entry function
    Stmt(Stmt),
    Opaque { kind: String },
}

/// Whole program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}
