//! File-level helpers: config discovery, atomic writes, dumping

use std::fs;

use entangle::middle::passes::codegen::{BytecodeEmitter, BytecodeFile, FLAG_DEBUG_LINES};
use entangle::middle::{Function, IrType, Module, OpKind, Operand};
use entangle::util::diagnostic::{codes, ErrorCollector, Severity};
use entangle::util::span::Span;
use entangle::{build_bytecode, dump_bytecode};

fn pair_module() -> Module {
    let mut module = Module::new("pairs", "pairs.ent");
    let id = module.generate_id();
    let mut main = Function::new(id, "$main", IrType::Void);
    let a = module.generate_resource();
    let b = module.generate_resource();
    let p = module.generate_resource();
    let ops = [
        (OpKind::AllocResource, vec![Operand::Resource(a)]),
        (OpKind::AllocResource, vec![Operand::Resource(b)]),
        (
            OpKind::CreatePair,
            vec![Operand::Resource(a), Operand::Resource(b), Operand::Resource(p)],
        ),
        (OpKind::MeasurePaired, vec![Operand::Resource(p)]),
        (OpKind::Pop, vec![]),
        (OpKind::BreakPair, vec![Operand::Resource(p)]),
        (OpKind::Halt, vec![]),
    ];
    let mut instructions = Vec::new();
    for (line, (op, operands)) in ops.into_iter().enumerate() {
        instructions.push(
            module
                .instruction(op, operands, Span::at(line as u32 + 1, 1))
                .unwrap(),
        );
    }
    let entry = main.add_block("entry");
    for instr in instructions {
        entry.push(instr);
    }
    main.refresh_resource_flag();
    module.add_function(main);
    module
}

#[test]
fn test_build_and_dump() {
    let dir = tempfile::tempdir().unwrap();
    let ir_path = dir.path().join("pairs.ir.json");
    let out_path = dir.path().join("pairs.entb");
    fs::write(&ir_path, serde_json::to_string(&pair_module()).unwrap()).unwrap();
    fs::write(
        dir.path().join("entangle.toml"),
        "[emit]\ndebug_lines = false\n",
    )
    .unwrap();

    let output = build_bytecode(&ir_path, &out_path).unwrap();
    assert!(!output.bytecode.has_flag(FLAG_DEBUG_LINES));

    let bytes = fs::read(&out_path).unwrap();
    assert_eq!(BytecodeFile::from_bytes(&bytes).unwrap(), output.bytecode);

    let text = dump_bytecode(&out_path).unwrap();
    assert!(text.contains("create_pair"));
    assert!(text.contains("$main (entry)"));
}

#[test]
fn test_failed_compile_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let ir_path = dir.path().join("broken.ir.json");
    let out_path = dir.path().join("broken.entb");

    let mut module = pair_module();
    module.functions[0].name = "helper".to_string();
    fs::write(&ir_path, serde_json::to_string(&module).unwrap()).unwrap();

    let err = build_bytecode(&ir_path, &out_path).unwrap_err();
    assert!(format!("{:#}", err).contains("entry function"));
    assert!(!out_path.exists());
}

#[test]
fn test_unwritable_destination_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("missing").join("out.entb");

    let mut sink = ErrorCollector::new();
    let result = BytecodeEmitter::new().emit_to_path(&pair_module(), &out_path, &mut sink);
    assert!(result.is_err());
    let failures: Vec<_> = sink.with_code(codes::WRITE_FAILED).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].severity, Severity::Fatal);
    assert!(!out_path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_rewrite_replaces_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.entb");
    fs::write(&out_path, b"stale").unwrap();

    let file = BytecodeEmitter::new()
        .emit_to_path(&pair_module(), &out_path, &mut ErrorCollector::new())
        .unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), file.to_bytes().unwrap());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_dump_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.entb");
    let file = BytecodeEmitter::new()
        .emit_to_path(&pair_module(), &out_path, &mut ErrorCollector::new())
        .unwrap();

    let mut bytes = file.to_bytes().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;
    fs::write(&out_path, bytes).unwrap();

    let err = dump_bytecode(&out_path).unwrap_err();
    assert!(format!("{:#}", err).contains("checksum mismatch"));
}
