//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the statement list
//!   together with the local variable table.
//! - `codegen` lowers the program into x86-64 Intel-syntax assembly.
//! - `error` centralises the caret diagnostics shared by the other modules.
//!
//! Each stage runs to completion before the next one starts, and the first
//! error aborts the whole compilation.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;

pub use error::{CompileError, CompileResult};
pub use parser::{AstNode, BinaryOp, LocalTable, LocalVar, Program};

/// Compile a source string into assembly, one line per element.
pub fn compile(source: &str) -> CompileResult<Vec<String>> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  Ok(codegen::generate(&program))
}

/// Compile a source string into a newline-terminated assembly listing.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let mut asm = compile(source)?.join("\n");
  asm.push('\n');
  Ok(asm)
}
