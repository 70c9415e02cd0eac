// constant folding on the AST, done with an egraph.
//
// every maximal subtree built only from integer literals, arithmetic and negation goes into its own
// egraph. the analysis tracks the value of each eclass (using checked arithmetic) and adds a literal
// node to any class whose value is known, so extraction by AST size picks the folded form.
//
// an operation that would overflow or divide by zero has no value. a subtree containing one is not
// replaced; only its foldable parts are, and it still fails at run time.

use egg::{define_language, rewrite, Analysis, AstSize, DidMerge, EGraph, Extractor, Id, RecExpr, Rewrite, Runner};
use tracing::trace;

use crate::syntax::{BinOp, Block, Expr, ExprKind, Program, StmtKind, UnOp};

define_language! {
    enum ConstExpr {
        Num(i64),
        "+" = Add([Id; 2]),
        "-" = Sub([Id; 2]),
        "*" = Mul([Id; 2]),
        "/" = Div([Id; 2]),
        "%" = Rem([Id; 2]),
        "neg" = Neg(Id),
    }
}

#[derive(Default)]
struct ConstantFold;

impl Analysis<ConstExpr> for ConstantFold {
    type Data = Option<i64>;

    fn make(egraph: &EGraph<ConstExpr, Self>, enode: &ConstExpr) -> Self::Data {
        let x = |i: &Id| egraph[*i].data;
        match enode {
            ConstExpr::Num(n) => Some(*n),
            ConstExpr::Add([a, b]) => x(a)?.checked_add(x(b)?),
            ConstExpr::Sub([a, b]) => x(a)?.checked_sub(x(b)?),
            ConstExpr::Mul([a, b]) => x(a)?.checked_mul(x(b)?),
            ConstExpr::Div([a, b]) => x(a)?.checked_div(x(b)?),
            ConstExpr::Rem([a, b]) => x(a)?.checked_rem(x(b)?),
            ConstExpr::Neg(a) => x(a)?.checked_neg(),
        }
    }

    fn merge(&mut self, to: &mut Self::Data, from: Self::Data) -> DidMerge {
        egg::merge_option(to, from, |a, b| {
            debug_assert_eq!(*a, b, "merged eclasses with different values");
            DidMerge(false, false)
        })
    }

    fn modify(egraph: &mut EGraph<ConstExpr, Self>, id: Id) {
        if let Some(n) = egraph[id].data {
            let literal = egraph.add(ConstExpr::Num(n));
            egraph.union(id, literal);
        }
    }
}

// only identities that hold for every input, including the ones that fail at run time.
// `x * 0 => 0` would hide a division by zero inside x.
fn rules() -> Vec<Rewrite<ConstExpr, ConstantFold>> {
    vec![
        rewrite!("add-comm"; "(+ ?x ?y)" => "(+ ?y ?x)"),
        rewrite!("mul-comm"; "(* ?x ?y)" => "(* ?y ?x)"),
        rewrite!("add-0"; "(+ ?x 0)" => "?x"),
        rewrite!("sub-0"; "(- ?x 0)" => "?x"),
        rewrite!("mul-1"; "(* ?x 1)" => "?x"),
        rewrite!("div-1"; "(/ ?x 1)" => "?x"),
    ]
}

/// Folds the constant arithmetic in every expression of `program`.
/// Returns the number of expressions that were rewritten.
pub fn fold_program(program: &mut Program) -> usize {
    let rules = rules();
    let mut folded = 0;
    for function in &mut program.functions {
        folded += fold_block(&mut function.body, &rules);
    }
    for stmt in &mut program.top_level {
        folded += fold_stmt(&mut stmt.kind, &rules);
    }
    folded
}

fn fold_block(block: &mut Block, rules: &[Rewrite<ConstExpr, ConstantFold>]) -> usize {
    block.0.iter_mut().map(|s| fold_stmt(&mut s.kind, rules)).sum()
}

fn fold_stmt(stmt: &mut StmtKind, rules: &[Rewrite<ConstExpr, ConstantFold>]) -> usize {
    match stmt {
        StmtKind::Declare(_, e) | StmtKind::Assign(_, e) | StmtKind::Expr(e) => fold_expr(e, rules),
        StmtKind::Return(Some(e)) => fold_expr(e, rules),
        StmtKind::If(cond, then, otherwise) => {
            let mut n = fold_expr(cond, rules) + fold_block(then, rules);
            if let Some(otherwise) = otherwise {
                n += fold_block(otherwise, rules);
            }
            n
        }
        StmtKind::While(cond, body) => fold_expr(cond, rules) + fold_block(body, rules),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => 0,
    }
}

fn fold_expr(e: &mut Expr, rules: &[Rewrite<ConstExpr, ConstantFold>]) -> usize {
    if !matches!(e.kind, ExprKind::Num(_)) {
        let mut rec = RecExpr::default();
        if to_const_expr(e, &mut rec).is_some() {
            if let [ConstExpr::Num(n)] = simplify(&rec, rules).as_ref() {
                trace!(before = %rec, after = *n, "folded constant expression");
                *e = Expr::new(ExprKind::Num(*n), e.span);
                return 1;
            }
        }
    }

    // anything that did not fold to a single literal keeps its own nodes and
    // spans, so a failure in what is left points at the same place
    match &mut e.kind {
        ExprKind::BinOp(_, lhs, rhs) => fold_expr(lhs, rules) + fold_expr(rhs, rules),
        ExprKind::UnOp(_, operand) => fold_expr(operand, rules),
        ExprKind::Call(_, args) => args.iter_mut().map(|arg| fold_expr(arg, rules)).sum(),
        ExprKind::Var(_) | ExprKind::Num(_) | ExprKind::Str(_) | ExprKind::Bool(_) => 0,
    }
}

fn simplify(rec: &RecExpr<ConstExpr>, rules: &[Rewrite<ConstExpr, ConstantFold>]) -> RecExpr<ConstExpr> {
    let runner = Runner::<ConstExpr, ConstantFold, ()>::default()
        .with_expr(rec)
        .run(rules);
    let extractor = Extractor::new(&runner.egraph, AstSize);
    let (_cost, best) = extractor.find_best(runner.roots[0]);
    best
}

// None when the expression is anything but integer arithmetic on literals
fn to_const_expr(e: &Expr, rec: &mut RecExpr<ConstExpr>) -> Option<Id> {
    let node = match &e.kind {
        ExprKind::Num(n) => ConstExpr::Num(*n),
        ExprKind::UnOp(UnOp::Neg, operand) => ConstExpr::Neg(to_const_expr(operand, rec)?),
        ExprKind::BinOp(op, lhs, rhs) => {
            let operands = [to_const_expr(lhs, rec)?, to_const_expr(rhs, rec)?];
            match op {
                BinOp::Add => ConstExpr::Add(operands),
                BinOp::Sub => ConstExpr::Sub(operands),
                BinOp::Mul => ConstExpr::Mul(operands),
                BinOp::Div => ConstExpr::Div(operands),
                BinOp::Rem => ConstExpr::Rem(operands),
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(rec.add(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LineIndex;
    use crate::syntax;

    fn folded(src: &str) -> (Program, usize) {
        let mut program = syntax::parse(src, &LineIndex::new(src)).expect("valid syntax");
        let n = fold_program(&mut program);
        (program, n)
    }

    fn first_arg(program: &Program) -> &ExprKind {
        match &program.top_level[0].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Call(_, args),
                ..
            }) => &args[0].kind,
            other => panic!("expected a call statement, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_on_literals_folds_to_one_literal() {
        let (p, n) = folded("print(1+2*3)");
        assert_eq!(n, 1);
        assert_eq!(first_arg(&p), &ExprKind::Num(7));
    }

    #[test]
    fn negation_folds() {
        let (p, _) = folded("print(-(4 - 6) * 3)");
        assert_eq!(first_arg(&p), &ExprKind::Num(6));
    }

    #[test]
    fn division_by_zero_is_kept() {
        let (p, n) = folded("print(10/0)");
        assert_eq!(n, 0);
        assert!(matches!(first_arg(&p), ExprKind::BinOp(BinOp::Div, _, _)));
    }

    #[test]
    fn the_foldable_part_of_a_failing_division_still_folds() {
        let (p, n) = folded("print((1+2)/0)");
        assert_eq!(n, 1);
        let ExprKind::BinOp(BinOp::Div, lhs, rhs) = first_arg(&p) else {
            panic!("expected the division to survive");
        };
        assert_eq!(lhs.kind, ExprKind::Num(3));
        assert_eq!(rhs.kind, ExprKind::Num(0));
    }

    #[test]
    fn overflow_is_kept() {
        let (_, n) = folded("print(9223372036854775807 + 1)");
        assert_eq!(n, 0);
    }

    #[test]
    fn variables_and_calls_block_folding_but_their_operands_fold() {
        let (p, n) = folded("x = 1 print(x + (2 * 3), f(4 - 1))");
        assert_eq!(n, 2);
        let StmtKind::Expr(Expr {
            kind: ExprKind::Call(_, args),
            ..
        }) = &p.top_level[1].kind
        else {
            panic!("expected the print call");
        };
        let ExprKind::BinOp(BinOp::Add, lhs, rhs) = &args[0].kind else {
            panic!("expected the addition to survive");
        };
        assert_eq!(lhs.kind, ExprKind::Var("x".to_string()));
        assert_eq!(rhs.kind, ExprKind::Num(6));
    }

    #[test]
    fn comparisons_are_left_alone() {
        let (p, n) = folded("if (1 + 1 < 3) { print(1) }");
        assert_eq!(n, 1);
        let StmtKind::If(cond, _, _) = &p.top_level[0].kind else {
            panic!("expected an if");
        };
        assert!(matches!(cond.kind, ExprKind::BinOp(BinOp::Lt, _, _)));
    }

    #[test]
    fn folded_expression_keeps_its_span() {
        let src = "print(1 + 2)";
        let (p, _) = folded(src);
        let StmtKind::Expr(Expr {
            kind: ExprKind::Call(_, args),
            ..
        }) = &p.top_level[0].kind
        else {
            panic!("expected the print call");
        };
        assert_eq!(args[0].span, syntax::Span::new(6, 11));
    }
}
