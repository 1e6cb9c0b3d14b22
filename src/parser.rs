//! Recursive-descent parser producing a statement list and expression AST.
//!
//! Precedence is encoded by nesting: each grammar level calls the next
//! tighter one and loops to fold left-associative chains, except assignment
//! which recurses on its right operand.
//!
//! ```text
//! program    = stmt* EOF
//! stmt       = expr ";"
//! expr       = assign
//! assign     = equality ("=" assign)?
//! equality   = relational ("==" relational | "!=" relational)*
//! relational = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add        = mul ("+" mul | "-" mul)*
//! mul        = unary ("*" unary | "/" unary)*
//! unary      = ("+" | "-")? unary | primary
//! primary    = "(" expr ")" | ident | num
//! ```
//!
//! Local variables are allocated while parsing: the first reference to a
//! name reserves the next 8-byte stack slot.

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

/// Binary operators recognised by the language. `>` and `>=` are parsed into
/// `Lt`/`Le` with swapped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  Num {
    value: i64,
  },
  /// Local variable living at `rbp - offset`.
  Var {
    offset: usize,
  },
  /// Arithmetic negation. The parser lowers unary minus to `0 - x`, so only
  /// trees built by hand contain this node.
  Neg {
    operand: Box<AstNode>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  /// Store `rhs` into the local at `rbp - offset`. Only variables can be
  /// assigned to, so the target is kept as an offset rather than a node.
  Assign {
    offset: usize,
    rhs: Box<AstNode>,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(offset: usize) -> Self {
    Self::Var { offset }
  }

  pub fn unary_neg(operand: AstNode) -> Self {
    Self::Neg {
      operand: Box::new(operand),
    }
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(offset: usize, rhs: AstNode) -> Self {
    Self::Assign {
      offset,
      rhs: Box::new(rhs),
    }
  }
}

/// A named stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
  pub name: String,
  pub offset: usize,
}

/// Local variables in declaration order. Names are unique and offsets never
/// change once assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTable {
  vars: Vec<LocalVar>,
}

impl LocalTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn find(&self, name: &str) -> Option<&LocalVar> {
    self.vars.iter().find(|var| var.name == name)
  }

  /// Offset of `name`, allocating a fresh slot on first use.
  pub fn resolve(&mut self, name: &str) -> usize {
    if let Some(var) = self.find(name) {
      return var.offset;
    }

    let offset = self.stack_size() + 8;
    trace!(name, offset, "allocated local");
    self.vars.push(LocalVar {
      name: name.to_string(),
      offset,
    });
    offset
  }

  /// Bytes of stack needed for every local: the highest offset, or 0.
  pub fn stack_size(&self) -> usize {
    self.vars.last().map_or(0, |var| var.offset)
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &LocalVar> {
    self.vars.iter()
  }
}

/// Top-level statements in source order plus the locals they reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub body: Vec<AstNode>,
  pub locals: LocalTable,
}

impl Program {
  pub fn stack_size(&self) -> usize {
    self.locals.stack_size()
  }
}

/// Deepest expression tree, and deepest rule nesting, accepted by the parser.
const MAX_DEPTH: usize = 256;

/// Parse a sequence of statements from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser {
    stream: TokenStream::new(tokens, source),
    locals: LocalTable::new(),
    depth: 0,
  };

  let mut body = Vec::new();
  while !parser.stream.is_eof() {
    body.push(parser.stmt()?);
  }

  debug!(
    statements = body.len(),
    locals = parser.locals.len(),
    stack_size = parser.locals.stack_size(),
    "parsed program"
  );

  Ok(Program {
    body,
    locals: parser.locals,
  })
}

/// A node under construction together with its height.
struct Tree {
  node: AstNode,
  height: usize,
}

impl Tree {
  fn leaf(node: AstNode) -> Self {
    Self { node, height: 1 }
  }
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  locals: LocalTable,
  depth: usize,
}

impl Parser<'_> {
  fn stmt(&mut self) -> CompileResult<AstNode> {
    let tree = self.expr()?;
    self.stream.skip(";")?;
    Ok(tree.node)
  }

  fn expr(&mut self) -> CompileResult<Tree> {
    self.nested(Self::assign)
  }

  fn assign(&mut self) -> CompileResult<Tree> {
    let start = self.stream.loc();
    let lhs = self.equality()?;

    if !self.stream.equal("=") {
      return Ok(lhs);
    }

    let AstNode::Var { offset } = lhs.node else {
      return Err(CompileError::parse(
        self.stream.source,
        start,
        "left-hand side of assignment is not a variable",
      ));
    };
    let rhs = self.nested(Self::assign)?;
    let height = self.check_height(start, rhs.height + 1)?;
    Ok(Tree {
      node: AstNode::assign(offset, rhs.node),
      height,
    })
  }

  fn equality(&mut self) -> CompileResult<Tree> {
    let mut node = self.relational()?;

    loop {
      let loc = self.stream.loc();
      let op = if self.stream.equal("==") {
        BinaryOp::Eq
      } else if self.stream.equal("!=") {
        BinaryOp::Ne
      } else {
        return Ok(node);
      };
      let rhs = self.relational()?;
      node = self.join(loc, op, node, rhs)?;
    }
  }

  fn relational(&mut self) -> CompileResult<Tree> {
    let mut node = self.add()?;

    loop {
      let loc = self.stream.loc();
      let (op, swap) = if self.stream.equal("<") {
        (BinaryOp::Lt, false)
      } else if self.stream.equal("<=") {
        (BinaryOp::Le, false)
      } else if self.stream.equal(">") {
        (BinaryOp::Lt, true)
      } else if self.stream.equal(">=") {
        (BinaryOp::Le, true)
      } else {
        return Ok(node);
      };
      let rhs = self.add()?;
      node = if swap {
        self.join(loc, op, rhs, node)?
      } else {
        self.join(loc, op, node, rhs)?
      };
    }
  }

  fn add(&mut self) -> CompileResult<Tree> {
    let mut node = self.mul()?;

    loop {
      let loc = self.stream.loc();
      let op = if self.stream.equal("+") {
        BinaryOp::Add
      } else if self.stream.equal("-") {
        BinaryOp::Sub
      } else {
        return Ok(node);
      };
      let rhs = self.mul()?;
      node = self.join(loc, op, node, rhs)?;
    }
  }

  fn mul(&mut self) -> CompileResult<Tree> {
    let mut node = self.unary()?;

    loop {
      let loc = self.stream.loc();
      let op = if self.stream.equal("*") {
        BinaryOp::Mul
      } else if self.stream.equal("/") {
        BinaryOp::Div
      } else {
        return Ok(node);
      };
      let rhs = self.unary()?;
      node = self.join(loc, op, node, rhs)?;
    }
  }

  fn unary(&mut self) -> CompileResult<Tree> {
    if self.stream.equal("+") {
      return self.nested(Self::unary);
    }

    let loc = self.stream.loc();
    if self.stream.equal("-") {
      let operand = self.nested(Self::unary)?;
      let zero = Tree::leaf(AstNode::number(0));
      return self.join(loc, BinaryOp::Sub, zero, operand);
    }

    self.primary()
  }

  fn primary(&mut self) -> CompileResult<Tree> {
    if self.stream.equal("(") {
      let tree = self.expr()?;
      self.stream.skip(")")?;
      return Ok(tree);
    }

    if let Some(name) = self.stream.consume_ident() {
      return Ok(Tree::leaf(AstNode::var(self.locals.resolve(name))));
    }

    let value = self.stream.get_number()?;
    Ok(Tree::leaf(AstNode::number(value)))
  }

  /// Run a rule one level deeper, failing once nesting exceeds `MAX_DEPTH`.
  fn nested(&mut self, rule: fn(&mut Self) -> CompileResult<Tree>) -> CompileResult<Tree> {
    if self.depth >= MAX_DEPTH {
      return Err(self.too_deep(self.stream.loc()));
    }
    self.depth += 1;
    let tree = rule(self);
    self.depth -= 1;
    tree
  }

  fn join(&self, loc: usize, op: BinaryOp, lhs: Tree, rhs: Tree) -> CompileResult<Tree> {
    let height = self.check_height(loc, lhs.height.max(rhs.height) + 1)?;
    Ok(Tree {
      node: AstNode::binary(op, lhs.node, rhs.node),
      height,
    })
  }

  /// Trees deeper than `MAX_DEPTH` would exhaust the stack when lowered.
  fn check_height(&self, loc: usize, height: usize) -> CompileResult<usize> {
    if height > MAX_DEPTH {
      return Err(self.too_deep(loc));
    }
    Ok(height)
  }

  fn too_deep(&self, loc: usize) -> CompileError {
    CompileError::parse(self.stream.source, loc, "expression is nested too deeply")
  }
}

/// Single cursor over the token vector; one token of lookahead.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  /// Byte offset of the current token, or end of input.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Reserved
      && token.len == op.len()
      && token_text(token, self.source) == op
    {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      return Ok(());
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::parse(
      self.source,
      self.loc(),
      format!("expected \"{s}\", but got \"{got}\""),
    ))
  }

  /// Consume an identifier and return its text.
  fn consume_ident(&mut self) -> Option<&'a str> {
    let token = self.peek().filter(|token| token.kind == TokenKind::Ident)?;
    let name = token_text(token, self.source);
    self.pos += 1;
    Some(name)
  }

  fn get_number(&mut self) -> CompileResult<i64> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let value = token.value.ok_or_else(|| {
        CompileError::parse(
          self.source,
          token.loc,
          "internal error: numeric token missing value",
        )
      })?;
      self.pos += 1;
      return Ok(value);
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::parse(
      self.source,
      self.loc(),
      format!("expected a number, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    self
      .peek()
      .is_none_or(|token| token.kind == TokenKind::Eof)
  }
}
