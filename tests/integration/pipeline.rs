//! End-to-end pipeline: AST -> IR -> analysis -> optimization -> bytecode

use entangle::frontend::ast::{
    Block, Expr, FnDecl, Item, ItemKind, Literal, Program, ResourceKind, ResourceOp, Stmt,
    StmtKind,
};
use entangle::middle::passes::codegen::{BytecodeFile, BytecodeOperand, Opcode, FLAG_OPTIMIZED};
use entangle::middle::{compile_module, compile_program, CompileError, Constant, Module, OpKind};
use entangle::util::config::CompilerConfig;
use entangle::util::diagnostic::{codes, ErrorCollector, Severity};
use entangle::util::span::Span;

fn sp(line: u32) -> Span {
    Span::at(line, 1)
}

fn stmt(
    kind: StmtKind,
    line: u32,
) -> Stmt {
    Stmt {
        kind,
        span: sp(line),
    }
}

fn top(stmt: Stmt) -> Item {
    let span = stmt.span;
    Item {
        kind: ItemKind::Stmt(stmt),
        span,
    }
}

fn declare(
    name: &str,
    kind: ResourceKind,
    line: u32,
) -> Item {
    top(stmt(
        StmtKind::Resource {
            name: name.to_string(),
            kind,
        },
        line,
    ))
}

fn resource(
    op: ResourceOp,
    args: &[&str],
    line: u32,
) -> Item {
    top(stmt(
        StmtKind::Expr(Box::new(Expr::Resource {
            op,
            args: args.iter().map(|s| s.to_string()).collect(),
            span: sp(line),
        })),
        line,
    ))
}

/// Two pairs over the same endpoints; `spare` is entangled and never used.
fn bell_program() -> Program {
    Program {
        items: vec![
            declare("a", ResourceKind::Qubit, 1),
            declare("b", ResourceKind::Qubit, 2),
            declare("p", ResourceKind::Pair, 3),
            declare("spare", ResourceKind::Pair, 4),
            resource(ResourceOp::Entangle, &["a", "b", "spare"], 5),
            resource(ResourceOp::Entangle, &["a", "b", "p"], 6),
            resource(ResourceOp::MeasurePair, &["p"], 7),
            resource(ResourceOp::Disentangle, &["p"], 8),
        ],
    }
}

#[test]
fn test_program_compiles_to_bytecode() {
    let mut sink = ErrorCollector::new();
    let output = compile_program(
        &bell_program(),
        "bell",
        "bell.ent",
        &CompilerConfig::default(),
        &mut sink,
    )
    .unwrap();
    assert!(!sink.has_errors());

    assert_eq!(output.stats.removed_unused, 1);
    let entry = output.bytecode.module.entry_function().unwrap();
    assert_eq!(entry.name, "$main");
    let opcodes: Vec<Opcode> = entry.instructions.iter().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::AllocResource,
            Opcode::AllocResource,
            Opcode::CreatePair,
            Opcode::MeasurePaired,
            Opcode::Pop,
            Opcode::BreakPair,
            Opcode::Halt,
        ]
    );
    assert_eq!(entry.lines, vec![1, 2, 6, 7, 7, 8, 0]);
    assert!(output.bytecode.has_flag(FLAG_OPTIMIZED));

    let bytes = output.bytecode.to_bytes().unwrap();
    let decoded = BytecodeFile::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.module, output.bytecode.module);
}

#[test]
fn test_functions_and_calls() {
    let helper = FnDecl {
        name: "twice".to_string(),
        params: vec![entangle::frontend::ast::Param {
            name: "n".to_string(),
            ty: Some("int".to_string()),
        }],
        return_type: Some("int".to_string()),
        body: Block {
            stmts: vec![stmt(
                StmtKind::Return(Some(Box::new(Expr::BinOp {
                    op: entangle::frontend::ast::BinOp::Mul,
                    left: Box::new(Expr::Var("n".to_string(), sp(2))),
                    right: Box::new(Expr::Lit(Literal::Int(2), sp(2))),
                    span: sp(2),
                }))),
                2,
            )],
            span: sp(1),
        },
        span: sp(1),
    };
    let program = Program {
        items: vec![
            Item {
                kind: ItemKind::Fn(helper),
                span: sp(1),
            },
            top(stmt(
                StmtKind::Expr(Box::new(Expr::Call {
                    func: "twice".to_string(),
                    args: vec![Expr::Lit(Literal::Int(21), sp(4))],
                    span: sp(4),
                })),
                4,
            )),
        ],
    };

    let mut sink = ErrorCollector::new();
    let output = compile_program(
        &program,
        "calls",
        "calls.ent",
        &CompilerConfig::default(),
        &mut sink,
    )
    .unwrap();
    let twice = output.bytecode.module.function("twice").unwrap();
    assert_eq!(twice.arity, 1);
    assert!(twice.local_count >= 1);
    let main = output.bytecode.module.entry_function().unwrap();
    assert!(main.instructions.iter().any(|i| i.opcode == Opcode::Call));
}

#[test]
fn test_literal_global_initializer_reaches_bytecode() {
    let program = Program {
        items: vec![
            Item {
                kind: ItemKind::Var {
                    name: "x".to_string(),
                    initializer: Some(Box::new(Expr::Lit(Literal::Int(42), sp(1)))),
                },
                span: sp(1),
            },
            top(stmt(
                StmtKind::Expr(Box::new(Expr::Var("x".to_string(), sp(2)))),
                2,
            )),
        ],
    };
    let mut sink = ErrorCollector::new();
    let output = compile_program(
        &program,
        "globals",
        "globals.ent",
        &CompilerConfig::default(),
        &mut sink,
    )
    .unwrap();

    let bytes = output.bytecode.to_bytes().unwrap();
    let decoded = BytecodeFile::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.module.globals, vec!["x"]);
    let slot = decoded
        .module
        .constants
        .iter()
        .position(|c| *c == Constant::Int(42))
        .expect("initializer constant is encoded") as u32;

    let entry = decoded.module.entry_function().unwrap();
    assert_eq!(entry.instructions[0].opcode, Opcode::LoadConst);
    assert_eq!(entry.instructions[0].operands[..], [BytecodeOperand::Const(slot)]);
    assert_eq!(entry.instructions[1].opcode, Opcode::StoreGlobal);
    assert_eq!(entry.instructions[1].operands[..], [BytecodeOperand::Int(0)]);
}

#[test]
fn test_opaque_node_is_rejected() {
    let program = Program {
        items: vec![Item {
            kind: ItemKind::Opaque {
                kind: "macro".to_string(),
            },
            span: sp(3),
        }],
    };
    let mut sink = ErrorCollector::new();
    let err = compile_program(
        &program,
        "m",
        "m.ent",
        &CompilerConfig::default(),
        &mut sink,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::IrGen(_)));
    assert_eq!(sink.with_severity(Severity::Error).count(), 1);
}

#[test]
fn test_structural_error_aborts_before_optimization() {
    let mut module = Module::new("broken", "broken.ent");
    let id = module.generate_id();
    let mut main = entangle::middle::Function::new(id, "$main", entangle::middle::IrType::Void);
    let nop = module.instruction(OpKind::Nop, [], sp(1)).unwrap();
    main.add_block("entry").push(nop);
    module.add_function(main);

    let mut sink = ErrorCollector::new();
    let err = compile_module(&module, &CompilerConfig::default(), &mut sink).unwrap_err();
    assert!(matches!(err, CompileError::Ir(_)));
    assert_eq!(err.code(), codes::BAD_TERMINATOR);
    assert!(sink.has_errors());
}

#[test]
fn test_configured_level_is_clamped() {
    for (requested, effective) in [(7, 3), (1000, 3), (-1, 1)] {
        let config: CompilerConfig = format!("[optimize]\nlevel = {}\n", requested)
            .parse()
            .unwrap();
        let mut sink = ErrorCollector::new();
        let output =
            compile_program(&bell_program(), "bell", "bell.ent", &config, &mut sink).unwrap();

        assert_eq!(output.stats.level, effective);
        let clamped: Vec<_> = sink.with_code(codes::LEVEL_CLAMPED).collect();
        assert_eq!(clamped.len(), 1);
        assert_eq!(clamped[0].severity, Severity::Info);
        assert!(!sink.has_errors());
    }
}

#[test]
fn test_missing_configured_entry() {
    let config: CompilerConfig = "[emit]\nentry_point = \"start\"\n".parse().unwrap();
    let mut module = Module::new("m", "m.ent");
    let id = module.generate_id();
    let mut main = entangle::middle::Function::new(id, "$main", entangle::middle::IrType::Void);
    let halt = module.instruction(OpKind::Halt, [], sp(1)).unwrap();
    main.add_block("entry").push(halt);
    module.add_function(main);

    let mut sink = ErrorCollector::new();
    let err = compile_module(&module, &config, &mut sink).unwrap_err();
    assert_eq!(err.code(), codes::MISSING_ENTRY);
    assert_eq!(sink.with_code(codes::MISSING_ENTRY).count(), 1);
}
