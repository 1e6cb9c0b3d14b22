//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage fails fast: the first problem aborts compilation with a single
//! diagnostic that echoes the offending source line and points at the byte
//! with a caret, chibicc style.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// The tokenizer hit a character it cannot classify.
  #[snafu(display("{line}\n{marker} {message}"))]
  Lex {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
  /// The token stream does not match the grammar.
  #[snafu(display("{line}\n{marker} {message}"))]
  Parse {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
}

impl CompileError {
  /// Lexical error anchored at byte offset `loc` of `input`.
  pub fn lex(input: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, marker) = locate(input, loc);
    LexSnafu {
      loc,
      line,
      marker,
      message: message.into(),
    }
    .build()
  }

  /// Syntax error anchored at byte offset `loc` of `input`.
  pub fn parse(input: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, marker) = locate(input, loc);
    ParseSnafu {
      loc,
      line,
      marker,
      message: message.into(),
    }
    .build()
  }

  /// Byte offset into the compiled input.
  pub fn loc(&self) -> usize {
    match self {
      Self::Lex { loc, .. } | Self::Parse { loc, .. } => *loc,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::Lex { message, .. } | Self::Parse { message, .. } => message,
    }
  }

  pub fn is_lex(&self) -> bool {
    matches!(self, Self::Lex { .. })
  }

  pub fn is_parse(&self) -> bool {
    matches!(self, Self::Parse { .. })
  }
}

/// Return the source line containing `loc` and a caret line under its column.
fn locate(input: &str, loc: usize) -> (String, String) {
  let mut loc = loc.min(input.len());
  while !input.is_char_boundary(loc) {
    loc -= 1;
  }

  let start = input[..loc].rfind('\n').map_or(0, |i| i + 1);
  let end = input[loc..].find('\n').map_or(input.len(), |i| loc + i);
  let line = input[start..end].trim_end_matches('\r');
  let column = input[start..loc].chars().count();

  (line.to_string(), format!("{}^", " ".repeat(column)))
}
