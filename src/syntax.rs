use lalrpop_util::lexer::Token;
use lalrpop_util::ParseError;

use crate::error::{CompileError, LineIndex};
use crate::parser::ProgramParser;

/// Byte range of a construct in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Var(String),
    Num(i64),
    Str(String),
    Bool(bool),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    UnOp(UnOp, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr, span: Span) -> Self {
        Expr::new(ExprKind::BinOp(op, Box::new(lhs), Box::new(rhs)), span)
    }

    pub fn unary(op: UnOp, operand: Expr, span: Span) -> Self {
        Expr::new(ExprKind::UnOp(op, Box::new(operand)), span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnOp::Neg => "neg",
            UnOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `var x = e` or `let x = e`
    Declare(String, Expr),
    Assign(String, Expr),
    /// A call evaluated for its effect, e.g. `print(x)`.
    Expr(Expr),
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    Break,
    Continue,
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(pub Vec<Stmt>);

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FnDecl),
    Stmt(Stmt),
}

/// A parsed source file. Top-level statements are kept apart from the
/// declared functions; they become the body of the implicit `main`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub functions: Vec<FnDecl>,
    pub top_level: Vec<Stmt>,
}

impl Program {
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut program = Program::default();
        for item in items {
            match item {
                Item::Function(f) => program.functions.push(f),
                Item::Stmt(s) => program.top_level.push(s),
            }
        }
        program
    }
}

/// Raised from grammar actions, e.g. for an integer literal that does not fit in `i64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

pub fn parse(source: &str, lines: &LineIndex) -> Result<Program, CompileError> {
    ProgramParser::new()
        .parse(source)
        .map_err(|err| syntax_error(err, lines))
}

fn syntax_error(err: ParseError<usize, Token<'_>, LiteralError>, lines: &LineIndex) -> CompileError {
    let (offset, message) = match err {
        ParseError::InvalidToken { location } => (location, "invalid token".to_string()),
        ParseError::UnrecognizedEof { location, expected } => (
            location,
            format!("unexpected end of input{}", expected_suffix(&expected)),
        ),
        ParseError::UnrecognizedToken {
            token: (start, tok, _),
            expected,
        } => (
            start,
            format!("unexpected `{}`{}", tok.1, expected_suffix(&expected)),
        ),
        ParseError::ExtraToken {
            token: (start, tok, _),
        } => (start, format!("extra token `{}`", tok.1)),
        ParseError::User { error } => (error.offset, error.message),
    };

    CompileError::Syntax {
        pos: lines.position(offset),
        message,
    }
}

fn expected_suffix(expected: &[String]) -> String {
    if expected.is_empty() {
        String::new()
    } else {
        format!(", expected one of {}", expected.join(", "))
    }
}

/// Resolves the escapes of a quoted string literal. `offset` points at the opening quote.
pub fn unescape(quoted: &str, offset: usize) -> Result<String, LiteralError> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => out.push('\n'),
            Some((_, 't')) => out.push('\t'),
            Some((_, '"')) => out.push('"'),
            Some((_, '\\')) => out.push('\\'),
            Some((_, other)) => {
                return Err(LiteralError {
                    offset: offset + 1 + i,
                    message: format!("unknown escape sequence `\\{}`", other),
                })
            }
            None => {
                return Err(LiteralError {
                    offset: offset + 1 + i,
                    message: "unterminated escape sequence".to_string(),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn parse_ok(src: &str) -> Program {
        parse(src, &LineIndex::new(src)).expect("valid syntax")
    }

    fn parse_err(src: &str) -> (Position, String) {
        match parse(src, &LineIndex::new(src)) {
            Err(CompileError::Syntax { pos, message }) => (pos, message),
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    fn only_expr(program: &Program) -> &Expr {
        match &program.top_level[0].kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let p = parse_ok("print(1+2*3)");
        let ExprKind::Call(name, args) = &only_expr(&p).kind else {
            panic!("expected call");
        };
        assert_eq!(name, "print");
        let ExprKind::BinOp(BinOp::Add, lhs, rhs) = &args[0].kind else {
            panic!("expected addition at the root");
        };
        assert_eq!(lhs.kind, ExprKind::Num(1));
        assert!(matches!(rhs.kind, ExprKind::BinOp(BinOp::Mul, _, _)));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let p = parse_ok("x = 10 - 3 - 2");
        let StmtKind::Assign(_, e) = &p.top_level[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::BinOp(BinOp::Sub, lhs, rhs) = &e.kind else {
            panic!("expected subtraction");
        };
        assert!(matches!(lhs.kind, ExprKind::BinOp(BinOp::Sub, _, _)));
        assert_eq!(rhs.kind, ExprKind::Num(2));
    }

    #[test]
    fn statements_need_no_semicolons() {
        let p = parse_ok("if (1 < 2) { x = 1 } else { x = 2 } print(x)");
        assert_eq!(p.top_level.len(), 2);
        assert!(matches!(p.top_level[0].kind, StmtKind::If(_, _, Some(_))));
    }

    #[test]
    fn semicolons_are_accepted() {
        let p = parse_ok("var x = 1; x = x + 1; print(x);");
        assert_eq!(p.top_level.len(), 3);
        assert!(matches!(p.top_level[0].kind, StmtKind::Declare(_, _)));
    }

    #[test]
    fn functions_and_top_level_statements_are_split() {
        let p = parse_ok(
            "fn add(a, b) { return a + b }\n\
             print(add(1, 2))\n\
             fn unused() { return; }",
        );
        assert_eq!(p.functions.len(), 2);
        assert_eq!(p.functions[0].params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(p.functions[1].body.0[0].kind, StmtKind::Return(None));
        assert_eq!(p.top_level.len(), 1);
    }

    #[test]
    fn else_if_chains_nest_in_the_else_block() {
        let p = parse_ok("if (a) { x = 1 } else if (b) { x = 2 } else { x = 3 }");
        let StmtKind::If(_, _, Some(otherwise)) = &p.top_level[0].kind else {
            panic!("expected if/else");
        };
        assert_eq!(otherwise.0.len(), 1);
        assert!(matches!(otherwise.0[0].kind, StmtKind::If(_, _, Some(_))));
    }

    #[test]
    fn comments_are_skipped() {
        let p = parse_ok("// leading comment\nprint(1) // trailing\n");
        assert_eq!(p.top_level.len(), 1);
    }

    #[test]
    fn string_escapes_are_resolved() {
        let p = parse_ok(r#"print("a\tb\n\"c\"")"#);
        let ExprKind::Call(_, args) = &only_expr(&p).kind else {
            panic!("expected call");
        };
        assert_eq!(args[0].kind, ExprKind::Str("a\tb\n\"c\"".to_string()));
    }

    #[test]
    fn unexpected_token_reports_line_and_column() {
        let (pos, message) = parse_err("x = 1\ny = * 2");
        assert_eq!(pos, Position { line: 2, column: 5 });
        assert!(message.starts_with("unexpected `*`"), "{}", message);
    }

    #[test]
    fn bare_expression_statement_is_rejected() {
        let (pos, _) = parse_err("1 + 2");
        assert_eq!(pos, Position { line: 1, column: 1 });
    }

    #[test]
    fn oversized_integer_literal_is_a_syntax_error() {
        let (pos, message) = parse_err("print(99999999999999999999)");
        assert_eq!(pos, Position { line: 1, column: 7 });
        assert!(message.contains("out of range"));
    }

    #[test]
    fn unknown_escape_is_a_syntax_error() {
        let (_, message) = parse_err(r#"print("\q")"#);
        assert!(message.contains("unknown escape"));
    }

    #[test]
    fn missing_brace_reports_end_of_input() {
        let (_, message) = parse_err("fn f() { return 1");
        assert!(message.starts_with("unexpected end of input"));
    }
}
