//! Front-end interface
//!
//! Lexing, parsing and semantic analysis happen upstream; this module only
//! defines the tree they hand to IR generation.

pub mod ast;
