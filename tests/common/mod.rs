//! Test harness: a tiny interpreter for the instructions the compiler emits,
//! so programs can be "run" without an assembler or linker.

#![allow(dead_code)]

use std::collections::HashMap;

const STACK_TOP: i64 = 0x7fff_0000;

#[derive(Debug, Default)]
struct Machine {
  regs: HashMap<&'static str, i64>,
  memory: HashMap<i64, i64>,
  flags: Option<(i64, i64)>,
}

impl Machine {
  fn new() -> Self {
    let mut machine = Self::default();
    for reg in ["rax", "rdi", "rdx", "rbp"] {
      machine.regs.insert(reg, 0);
    }
    machine.regs.insert("rsp", STACK_TOP);
    machine
  }

  fn reg(&self, name: &str) -> Result<i64, String> {
    match name {
      "al" => Ok(self.reg("rax")? & 0xff),
      _ => self
        .regs
        .get(name)
        .copied()
        .ok_or_else(|| format!("unknown register {name}")),
    }
  }

  fn set(&mut self, name: &str, value: i64) -> Result<(), String> {
    let slot = self
      .regs
      .get_mut(name)
      .ok_or_else(|| format!("unknown register {name}"))?;
    *slot = value;
    Ok(())
  }

  fn load(&self, addr: i64) -> Result<i64, String> {
    self
      .memory
      .get(&addr)
      .copied()
      .ok_or_else(|| format!("read of uninitialised memory at {addr:#x}"))
  }

  /// Register, immediate, or `[reg]` memory operand.
  fn operand(&self, text: &str) -> Result<i64, String> {
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
      return self.load(self.reg(inner)?);
    }
    match text.parse::<i64>() {
      Ok(value) => Ok(value),
      Err(_) => self.reg(text),
    }
  }

  fn push(&mut self, value: i64) -> Result<(), String> {
    let rsp = self.reg("rsp")? - 8;
    self.set("rsp", rsp)?;
    self.memory.insert(rsp, value);
    Ok(())
  }

  fn pop(&mut self) -> Result<i64, String> {
    let rsp = self.reg("rsp")?;
    if rsp >= STACK_TOP {
      return Err("pop from empty stack".to_string());
    }
    let value = self.load(rsp)?;
    self.set("rsp", rsp + 8)?;
    Ok(value)
  }

  fn compare(&self, test: fn(i64, i64) -> bool) -> Result<i64, String> {
    let (lhs, rhs) = self.flags.ok_or("set without a preceding cmp")?;
    Ok(i64::from(test(lhs, rhs)))
  }

  fn step(&mut self, insn: &str) -> Result<Option<i64>, String> {
    let (mnemonic, rest) = insn.split_once(' ').unwrap_or((insn, ""));
    let args: Vec<&str> = rest
      .split(',')
      .map(str::trim)
      .filter(|arg| !arg.is_empty())
      .collect();

    match (mnemonic, args.as_slice()) {
      ("push", [src]) => {
        let value = self.operand(src)?;
        self.push(value)?;
      }
      ("pop", [dst]) => {
        let value = self.pop()?;
        self.set(dst, value)?;
      }
      ("mov", [dst, src]) => {
        let value = self.operand(src)?;
        if let Some(inner) = dst.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
          let addr = self.reg(inner)?;
          self.memory.insert(addr, value);
        } else {
          self.set(dst, value)?;
        }
      }
      ("add", [dst, src]) => {
        let value = self.reg(dst)?.wrapping_add(self.operand(src)?);
        self.set(dst, value)?;
      }
      ("sub", [dst, src]) => {
        let value = self.reg(dst)?.wrapping_sub(self.operand(src)?);
        self.set(dst, value)?;
      }
      ("imul", [dst, src]) => {
        let value = self.reg(dst)?.wrapping_mul(self.operand(src)?);
        self.set(dst, value)?;
      }
      ("neg", [dst]) => {
        let value = self.reg(dst)?.wrapping_neg();
        self.set(dst, value)?;
      }
      ("cqo", []) => {
        let rdx = if self.reg("rax")? < 0 { -1 } else { 0 };
        self.set("rdx", rdx)?;
      }
      ("idiv", [src]) => {
        let divisor = self.operand(src)?;
        if divisor == 0 {
          return Err("division by zero".to_string());
        }
        let dividend = self.reg("rax")?;
        self.set("rax", dividend.wrapping_div(divisor))?;
        self.set("rdx", dividend.wrapping_rem(divisor))?;
      }
      ("cmp", [lhs, rhs]) => {
        self.flags = Some((self.operand(lhs)?, self.operand(rhs)?));
      }
      ("sete" | "setne" | "setl" | "setle", ["al"]) => {
        let bit = match mnemonic {
          "sete" => self.compare(|l, r| l == r)?,
          "setne" => self.compare(|l, r| l != r)?,
          "setl" => self.compare(|l, r| l < r)?,
          _ => self.compare(|l, r| l <= r)?,
        };
        let rax = (self.reg("rax")? & !0xff) | bit;
        self.set("rax", rax)?;
      }
      ("movzb", ["rax", "al"]) => {
        let al = self.reg("al")?;
        self.set("rax", al)?;
      }
      ("ret", []) => {
        if self.reg("rsp")? != STACK_TOP {
          return Err("stack not restored before ret".to_string());
        }
        return self.reg("rax").map(Some);
      }
      _ => return Err(format!("unsupported instruction: {insn}")),
    }
    Ok(None)
  }
}

/// Execute assembly produced by the compiler and return `rax` at `ret`.
pub fn execute(lines: &[String]) -> Result<i64, String> {
  let mut machine = Machine::new();
  for line in lines {
    let Some(insn) = line.strip_prefix("  ") else {
      continue;
    };
    if let Some(result) = machine.step(insn.trim())? {
      return Ok(result);
    }
  }
  Err("fell off the end without ret".to_string())
}

/// Compile and run `source`, panicking on any compile or runtime failure.
pub fn run(source: &str) -> i64 {
  let lines = rs9cc::compile(source).unwrap_or_else(|err| panic!("compile failed:\n{err}"));
  execute(&lines).unwrap_or_else(|err| panic!("execution failed for {source:?}: {err}"))
}
