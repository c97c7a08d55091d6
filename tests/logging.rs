//! `build_bytecode` installs the logger at the configured level.
//!
//! Kept in its own test binary: the global subscriber can only be set once
//! per process.

use std::fs;

use entangle::build_bytecode;
use entangle::middle::{Function, IrType, Module, OpKind};
use entangle::util::span::Span;
use tracing::level_filters::LevelFilter;

#[test]
fn test_configured_log_level_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let ir_path = dir.path().join("halt.ir.json");
    let out_path = dir.path().join("halt.entb");

    let mut module = Module::new("halt", "halt.ent");
    let id = module.generate_id();
    let mut main = Function::new(id, "$main", IrType::Void);
    let halt = module.instruction(OpKind::Halt, [], Span::at(1, 1)).unwrap();
    main.add_block("entry").push(halt);
    module.add_function(main);

    fs::write(&ir_path, serde_json::to_string(&module).unwrap()).unwrap();
    fs::write(dir.path().join("entangle.toml"), "log_level = \"debug\"\n").unwrap();

    build_bytecode(&ir_path, &out_path).unwrap();
    assert_eq!(LevelFilter::current(), LevelFilter::DEBUG);
    assert!(out_path.exists());
}
