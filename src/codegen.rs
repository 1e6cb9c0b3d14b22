//! Code generation: lower the parsed AST into Intel-syntax x86-64 assembly.
//!
//! The emitter is a simple stack machine: every expression leaves a single
//! value on the stack, binary operators pop their right operand into `rdi`
//! and their left operand into `rax`. Locals live in the stack frame and are
//! addressed relative to `rbp`.

use tracing::debug;

use crate::parser::{AstNode, BinaryOp, Program};

/// Emit assembly for a whole program, one instruction or directive per line.
pub fn generate(program: &Program) -> Vec<String> {
  let mut asm = Asm::default();

  asm.raw(".intel_syntax noprefix");
  asm.raw(".globl main");
  asm.raw("main:");

  asm.emit("push rbp");
  asm.emit("mov rbp, rsp");
  let stack_size = program.stack_size();
  if stack_size > 0 {
    asm.emit(format!("sub rsp, {stack_size}"));
  }

  for stmt in &program.body {
    emit_expr(stmt, &mut asm);
    // The last pop leaves the program's result in rax.
    asm.pop("rax");
    debug_assert_eq!(asm.depth, 0, "statement left the stack unbalanced");
  }

  if program.body.is_empty() {
    asm.emit("mov rax, 0");
  }

  asm.emit("mov rsp, rbp");
  asm.emit("pop rbp");
  asm.emit("ret");

  debug!(lines = asm.lines.len(), stack_size, "generated assembly");
  asm.lines
}

/// Line buffer that also tracks how many values the stack machine holds.
#[derive(Default)]
struct Asm {
  lines: Vec<String>,
  depth: usize,
}

impl Asm {
  fn raw(&mut self, line: impl Into<String>) {
    self.lines.push(line.into());
  }

  fn emit(&mut self, insn: impl AsRef<str>) {
    self.lines.push(format!("  {}", insn.as_ref()));
  }

  fn push(&mut self, operand: impl AsRef<str>) {
    self.emit(format!("push {}", operand.as_ref()));
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.emit(format!("pop {reg}"));
    self.depth -= 1;
  }
}

/// Emit stack-based code for a single expression node.
fn emit_expr(node: &AstNode, asm: &mut Asm) {
  match node {
    AstNode::Num { value } => {
      // push only takes a sign-extended 32-bit immediate.
      if i32::try_from(*value).is_ok() {
        asm.push(value.to_string());
      } else {
        asm.emit(format!("mov rax, {value}"));
        asm.push("rax");
      }
    }
    AstNode::Var { offset } => {
      emit_addr(*offset, asm);
      asm.pop("rax");
      asm.emit("mov rax, [rax]");
      asm.push("rax");
    }
    AstNode::Assign { offset, rhs } => {
      emit_addr(*offset, asm);
      emit_expr(rhs, asm);
      asm.pop("rdi");
      asm.pop("rax");
      asm.emit("mov [rax], rdi");
      asm.push("rdi");
    }
    AstNode::Neg { operand } => {
      emit_expr(operand, asm);
      asm.pop("rax");
      asm.emit("neg rax");
      asm.push("rax");
    }
    AstNode::Binary { op, lhs, rhs } => {
      emit_expr(lhs, asm);
      emit_expr(rhs, asm);
      asm.pop("rdi");
      asm.pop("rax");
      match op {
        BinaryOp::Add => asm.emit("add rax, rdi"),
        BinaryOp::Sub => asm.emit("sub rax, rdi"),
        BinaryOp::Mul => asm.emit("imul rax, rdi"),
        BinaryOp::Div => {
          asm.emit("cqo");
          asm.emit("idiv rdi");
        }
        BinaryOp::Eq => emit_compare("sete", asm),
        BinaryOp::Ne => emit_compare("setne", asm),
        BinaryOp::Lt => emit_compare("setl", asm),
        BinaryOp::Le => emit_compare("setle", asm),
      }
      asm.push("rax");
    }
  }
}

fn emit_compare(set: &str, asm: &mut Asm) {
  asm.emit("cmp rax, rdi");
  asm.emit(format!("{set} al"));
  asm.emit("movzb rax, al");
}

/// Push the address of the local at `rbp - offset`.
fn emit_addr(offset: usize, asm: &mut Asm) {
  asm.emit("mov rax, rbp");
  asm.emit(format!("sub rax, {offset}"));
  asm.push("rax");
}
