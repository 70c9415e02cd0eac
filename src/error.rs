use std::fmt;
use std::io;

use thiserror::Error;

/// A 1-based line/column location. Columns count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets of a source text to [`Position`]s.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { line_starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line - 1];
        Position::new(line as u32, (offset - start + 1) as u32)
    }
}

/// Errors that stop a program from compiling. No part of a program that
/// fails with one of these is ever executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{pos}: syntax error: {message}")]
    Syntax { pos: Position, message: String },

    #[error("{pos}: {message}")]
    Structural { pos: Position, message: String },

    #[error("{pos}: variable `{name}` is used before it is assigned on every path")]
    UndefinedVariable { pos: Position, name: String },
}

impl CompileError {
    pub fn structural(pos: Position, message: impl Into<String>) -> Self {
        CompileError::Structural {
            pos,
            message: message.into(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            CompileError::Syntax { pos, .. }
            | CompileError::Structural { pos, .. }
            | CompileError::UndefinedVariable { pos, .. } => *pos,
        }
    }
}

/// Errors raised while a program runs. Every one of them unwinds the whole
/// call stack.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{}type mismatch: {message}", at(.pos))]
    TypeMismatch {
        pos: Option<Position>,
        message: String,
    },

    #[error("{}arithmetic error: {message}", at(.pos))]
    Arithmetic {
        pos: Option<Position>,
        message: String,
    },

    #[error("{}unsupported operation: {message}", at(.pos))]
    UnsupportedOperation {
        pos: Option<Position>,
        message: String,
    },

    #[error("{}stack overflow: call depth exceeded {limit}", at(.pos))]
    StackOverflow { pos: Option<Position>, limit: usize },

    #[error("`{function}` expects {expected} arguments but {found} were supplied")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("step limit of {limit} block transitions reached")]
    StepLimit { limit: u64 },

    #[error("execution cancelled")]
    Cancelled,

    #[error("failed to write program output: {0}")]
    Output(#[from] io::Error),
}

impl RuntimeError {
    pub fn type_mismatch(pos: Position, message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            pos: Some(pos),
            message: message.into(),
        }
    }

    pub fn arithmetic(pos: Position, message: impl Into<String>) -> Self {
        RuntimeError::Arithmetic {
            pos: Some(pos),
            message: message.into(),
        }
    }

    pub fn unsupported(pos: Option<Position>, message: impl Into<String>) -> Self {
        RuntimeError::UnsupportedOperation {
            pos,
            message: message.into(),
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            RuntimeError::TypeMismatch { pos, .. }
            | RuntimeError::Arithmetic { pos, .. }
            | RuntimeError::UnsupportedOperation { pos, .. }
            | RuntimeError::StackOverflow { pos, .. } => *pos,
            _ => None,
        }
    }
}

fn at(pos: &Option<Position>) -> String {
    match pos {
        Some(pos) => format!("{}: ", pos),
        None => String::new(),
    }
}
