//! Byte-level layout of version 1 bytecode files

use entangle::middle::passes::codegen::{
    verify_checksum, BytecodeEmitter, BytecodeError, BytecodeFile, FLAG_DEBUG_LINES, MAGIC, VERSION,
};
use entangle::middle::{Constant, Function, IrType, Module, OpKind, Operand, ResourceId};
use entangle::util::diagnostic::ErrorCollector;
use entangle::util::span::Span;

fn halt_module() -> Module {
    let mut module = Module::new("halt", "halt.ent");
    let id = module.generate_id();
    let mut main = Function::new(id, "$main", IrType::Void);
    let halt = module.instruction(OpKind::Halt, [], Span::at(1, 1)).unwrap();
    main.add_block("entry").push(halt);
    module.add_function(main);
    module
}

fn emit(module: &Module) -> BytecodeFile {
    BytecodeEmitter::new()
        .with_timestamp(0)
        .emit(module, &mut ErrorCollector::new())
        .unwrap()
}

#[test]
fn test_halt_module_bytes() {
    let bytes = emit(&halt_module()).to_bytes().unwrap();

    let mut body = Vec::new();
    // globals: count 0
    body.extend_from_slice(&4u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    // constants: count 0
    body.extend_from_slice(&4u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    // functions: entry 0, count 1, one 29-byte function record
    body.extend_from_slice(&37u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&25u32.to_le_bytes());
    body.extend_from_slice(&5u32.to_le_bytes());
    body.extend_from_slice(b"$main");
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.push(0x01);
    body.push(0);
    body.extend_from_slice(&1u32.to_le_bytes());

    let mut expected = Vec::new();
    expected.extend_from_slice(&MAGIC);
    expected.extend_from_slice(&VERSION.to_le_bytes());
    expected.extend_from_slice(&FLAG_DEBUG_LINES.to_le_bytes());
    expected.extend_from_slice(&0u64.to_le_bytes());
    expected.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    expected.extend_from_slice(&body);

    assert_eq!(bytes, expected);
}

#[test]
fn test_operand_encodings() {
    let mut module = Module::new("ops", "ops.ent");
    let greeting = module.add_constant(Constant::Str("hi".into()));
    let id = module.generate_id();
    let mut main = Function::new(id, "$main", IrType::Void);
    let load = module
        .instruction(OpKind::LoadConst, [Operand::Const(greeting)], Span::at(1, 1))
        .unwrap();
    let pop = module.instruction(OpKind::Pop, [], Span::at(1, 1)).unwrap();
    let alloc = module
        .instruction(
            OpKind::AllocResource,
            [Operand::Resource(ResourceId(u64::MAX))],
            Span::at(2, 1),
        )
        .unwrap();
    let halt = module.instruction(OpKind::Halt, [], Span::at(3, 1)).unwrap();
    let entry = main.add_block("entry");
    entry.push(load);
    entry.push(pop);
    entry.push(alloc);
    entry.push(halt);
    module.add_function(main);

    let bytes = emit(&module).to_bytes().unwrap();

    let mut constants = Vec::new();
    constants.extend_from_slice(&1u32.to_le_bytes());
    constants.push(2);
    constants.extend_from_slice(&2u32.to_le_bytes());
    constants.extend_from_slice(b"hi");
    let section_at = 24 + 8;
    assert_eq!(
        &bytes[section_at..section_at + 4],
        &(constants.len() as u32).to_le_bytes()
    );
    assert_eq!(
        &bytes[section_at + 4..section_at + 4 + constants.len()],
        &constants[..]
    );

    let mut resource_operand = vec![0x90, 1, 4];
    resource_operand.extend_from_slice(&u64::MAX.to_le_bytes());
    assert!(bytes
        .windows(resource_operand.len())
        .any(|w| w == resource_operand.as_slice()));

    let decoded = BytecodeFile::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.module.constants, vec![Constant::Str("hi".into())]);
}

#[test]
fn test_header_edits_do_not_affect_checksum() {
    let mut bytes = emit(&halt_module()).to_bytes().unwrap();
    bytes[12..20].copy_from_slice(&99u64.to_le_bytes());
    assert!(verify_checksum(&bytes).is_ok());
    assert_eq!(BytecodeFile::from_bytes(&bytes).unwrap().header.timestamp, 99);
}

#[test]
fn test_trailing_garbage_is_rejected() {
    let mut bytes = emit(&halt_module()).to_bytes().unwrap();
    bytes.push(0);
    let checksum = crc32fast::hash(&bytes[24..]);
    bytes[20..24].copy_from_slice(&checksum.to_le_bytes());
    assert!(matches!(
        BytecodeFile::from_bytes(&bytes),
        Err(BytecodeError::TrailingBytes { .. })
    ));
}

#[test]
fn test_unknown_opcode_is_rejected() {
    let mut bytes = emit(&halt_module()).to_bytes().unwrap();
    let halt_at = bytes.len() - 6;
    assert_eq!(bytes[halt_at], 0x01);
    bytes[halt_at] = 0xFF;
    let checksum = crc32fast::hash(&bytes[24..]);
    bytes[20..24].copy_from_slice(&checksum.to_le_bytes());
    assert!(matches!(
        BytecodeFile::from_bytes(&bytes),
        Err(BytecodeError::UnknownOpcode { opcode: 0xFF, .. })
    ));
}
