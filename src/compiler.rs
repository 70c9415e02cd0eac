use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::cfg::{
    BasicBlock, Basic, BlockRef, Constant, Control, FuncRef, Function, Insn, Module, ValueRef, Var,
};
use crate::error::{CompileError, LineIndex, Position};
use crate::syntax::{Block, Expr, ExprKind, FnDecl, Program, Span, Stmt, StmtKind};

/// Name and arity of every declared function, indexed by [`FuncRef`].
struct Signatures {
    index: HashMap<String, FuncRef>,
    arity: Vec<usize>,
}

/// Lowers a parsed program into a [`Module`] of control-flow graphs.
///
/// Named variables are still accessed through `load`/`store` in the result;
/// run [`crate::ssa::construct`] to get SSA form.
///
/// Return policy: a function with no `return` statement anywhere gets an
/// explicit `return ()` appended to its fall-through path. A function that
/// contains a `return` must end every path with one.
pub fn lower(program: &Program, lines: &LineIndex) -> Result<Module, CompileError> {
    let implicit_main;
    let mut decls: Vec<&FnDecl> = program.functions.iter().collect();

    if let Some(main) = program.functions.iter().find(|f| f.name == "main") {
        if let Some(stmt) = program.top_level.first() {
            return Err(CompileError::structural(
                lines.position(stmt.span.start),
                format!(
                    "top-level statements are not allowed when `main` is declared at {}",
                    lines.position(main.span.start)
                ),
            ));
        }
    } else {
        let span = match (program.top_level.first(), program.top_level.last()) {
            (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
            _ => Span::default(),
        };
        implicit_main = FnDecl {
            name: "main".to_string(),
            params: Vec::new(),
            body: Block(program.top_level.clone()),
            span,
        };
        decls.push(&implicit_main);
    }

    let mut signatures = Signatures {
        index: HashMap::new(),
        arity: Vec::new(),
    };
    for (i, decl) in decls.iter().enumerate() {
        if signatures.index.insert(decl.name.clone(), FuncRef(i)).is_some() {
            return Err(CompileError::structural(
                lines.position(decl.span.start),
                format!("function `{}` is declared more than once", decl.name),
            ));
        }
        signatures.arity.push(decl.params.len());
    }

    let mut functions = Vec::with_capacity(decls.len());
    for decl in &decls {
        let function = Compiler::new(&signatures, lines).compile_function(decl)?;
        debug!(
            function = %function.name,
            blocks = function.blocks.len(),
            vars = function.vars.len(),
            "lowered function"
        );
        functions.push(function);
    }

    let main = signatures
        .index
        .get("main")
        .copied()
        .ok_or_else(|| CompileError::structural(Position::new(1, 1), "program has no `main` function"))?;
    Ok(Module { functions, main })
}

struct Draft {
    insts: Vec<Insn>,
    control: Option<Control>,
}

struct Loop {
    header: BlockRef,
    exit: BlockRef,
}

struct Compiler<'a> {
    signatures: &'a Signatures,
    lines: &'a LineIndex,
    blocks: Vec<Draft>,
    current: BlockRef,
    // false once the current block has been terminated
    reachable: bool,
    slots: HashMap<String, Var>,
    names: Vec<String>,
    num_values: usize,
    loops: Vec<Loop>,
}

impl<'a> Compiler<'a> {
    fn new(signatures: &'a Signatures, lines: &'a LineIndex) -> Self {
        Compiler {
            signatures,
            lines,
            blocks: vec![Draft {
                insts: Vec::new(),
                control: None,
            }],
            current: Function::ENTRY,
            reachable: true,
            slots: HashMap::new(),
            names: Vec::new(),
            num_values: 0,
            loops: Vec::new(),
        }
    }

    fn pos(&self, span: Span) -> Position {
        self.lines.position(span.start)
    }

    fn new_block(&mut self) -> BlockRef {
        self.blocks.push(Draft {
            insts: Vec::new(),
            control: None,
        });
        BlockRef(self.blocks.len() - 1)
    }

    fn switch_to(&mut self, block: BlockRef) {
        self.current = block;
        self.reachable = true;
    }

    fn fresh(&mut self) -> ValueRef {
        let v = ValueRef(self.num_values);
        self.num_values += 1;
        v
    }

    fn emit(&mut self, basic: Basic, pos: Position) {
        self.blocks[self.current.0].insts.push(Insn { basic, pos });
    }

    fn terminate(&mut self, control: Control) {
        self.blocks[self.current.0].control = Some(control);
        self.reachable = false;
    }

    fn constant(&mut self, value: Constant, pos: Position) -> ValueRef {
        let dst = self.fresh();
        self.emit(Basic::Const { dst, value }, pos);
        dst
    }

    fn slot(&mut self, name: &str) -> Var {
        if let Some(var) = self.slots.get(name) {
            return *var;
        }
        let var = Var(self.names.len());
        self.names.push(name.to_string());
        self.slots.insert(name.to_string(), var);
        var
    }

    fn compile_exp(&mut self, e: &Expr) -> Result<ValueRef, CompileError> {
        let pos = self.pos(e.span);
        let value = match &e.kind {
            ExprKind::Num(n) => self.constant(Constant::Int(*n), pos),
            ExprKind::Str(s) => self.constant(Constant::Str(Rc::from(s.as_str())), pos),
            ExprKind::Bool(b) => self.constant(Constant::Bool(*b), pos),
            ExprKind::Var(x) => {
                let var = self.slot(x);
                let dst = self.fresh();
                self.emit(Basic::Load { dst, var }, pos);
                dst
            }
            ExprKind::BinOp(op, e1, e2) => {
                let lhs = self.compile_exp(e1)?;
                let rhs = self.compile_exp(e2)?;
                let dst = self.fresh();
                self.emit(Basic::Arith { dst, op: *op, lhs, rhs }, pos);
                dst
            }
            ExprKind::UnOp(op, operand) => {
                let operand = self.compile_exp(operand)?;
                let dst = self.fresh();
                self.emit(Basic::Unary { dst, op: *op, operand }, pos);
                dst
            }
            ExprKind::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.compile_exp(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let dst = self.fresh();
                match self.signatures.index.get(name) {
                    Some(&callee) => {
                        let expected = self.signatures.arity[callee.0];
                        if expected != args.len() {
                            return Err(CompileError::structural(
                                pos,
                                format!(
                                    "`{}` expects {} arguments but {} were supplied",
                                    name,
                                    expected,
                                    args.len()
                                ),
                            ));
                        }
                        self.emit(Basic::Call { dst, callee, args }, pos);
                    }
                    None => {
                        let name = name.clone();
                        self.emit(Basic::Builtin { dst, name, args }, pos);
                    }
                }
                dst
            }
        };
        Ok(value)
    }

    fn compile_stmt(&mut self, s: &Stmt) -> Result<(), CompileError> {
        let pos = self.pos(s.span);
        if !self.reachable {
            return Err(CompileError::structural(pos, "unreachable statement"));
        }
        match &s.kind {
            StmtKind::Declare(x, e) | StmtKind::Assign(x, e) => {
                let value = self.compile_exp(e)?;
                let var = self.slot(x);
                self.emit(Basic::Store { var, value }, pos);
            }
            StmtKind::Expr(e) => {
                self.compile_exp(e)?;
            }
            StmtKind::If(e, bt, bf) => {
                let cond = self.compile_exp(e)?;
                let then = self.new_block();
                let (otherwise, mut merge) = match bf {
                    Some(_) => (self.new_block(), None),
                    None => {
                        let merge = self.new_block();
                        (merge, Some(merge))
                    }
                };
                self.terminate(Control::Branch {
                    cond,
                    then,
                    otherwise,
                    pos: self.pos(e.span),
                });

                self.switch_to(then);
                self.compile_block(bt)?;
                self.jump_to_merge(&mut merge);

                if let Some(bf) = bf {
                    self.switch_to(otherwise);
                    self.compile_block(bf)?;
                    self.jump_to_merge(&mut merge);
                }

                // Both arms terminated: nothing after the `if` can run.
                if let Some(merge) = merge {
                    self.switch_to(merge);
                }
            }
            StmtKind::While(e, b) => {
                let header = self.new_block();
                self.terminate(Control::Jump(header));

                self.switch_to(header);
                let cond = self.compile_exp(e)?;
                let body = self.new_block();
                let exit = self.new_block();
                self.terminate(Control::Branch {
                    cond,
                    then: body,
                    otherwise: exit,
                    pos: self.pos(e.span),
                });

                self.loops.push(Loop { header, exit });
                self.switch_to(body);
                self.compile_block(b)?;
                if self.reachable {
                    self.terminate(Control::Jump(header));
                }
                self.loops.pop();

                self.switch_to(exit);
            }
            StmtKind::Break => {
                let exit = match self.loops.last() {
                    Some(l) => l.exit,
                    None => return Err(CompileError::structural(pos, "`break` outside of a loop")),
                };
                self.terminate(Control::Jump(exit));
            }
            StmtKind::Continue => {
                let header = match self.loops.last() {
                    Some(l) => l.header,
                    None => {
                        return Err(CompileError::structural(pos, "`continue` outside of a loop"))
                    }
                };
                self.terminate(Control::Jump(header));
            }
            StmtKind::Return(e) => {
                let value = match e {
                    Some(e) => self.compile_exp(e)?,
                    None => self.constant(Constant::Unit, pos),
                };
                self.terminate(Control::Return(value));
            }
        }
        Ok(())
    }

    fn jump_to_merge(&mut self, merge: &mut Option<BlockRef>) {
        if !self.reachable {
            return;
        }
        let target = match *merge {
            Some(target) => target,
            None => {
                let target = self.new_block();
                *merge = Some(target);
                target
            }
        };
        self.terminate(Control::Jump(target));
    }

    fn compile_block(&mut self, b: &Block) -> Result<(), CompileError> {
        for s in &b.0 {
            self.compile_stmt(s)?;
        }
        Ok(())
    }

    fn compile_function(mut self, decl: &FnDecl) -> Result<Function, CompileError> {
        let pos = self.pos(decl.span);
        self.assign_slots(decl)?;

        for (index, param) in decl.params.iter().enumerate() {
            let dst = self.fresh();
            self.emit(Basic::Param { dst, index }, pos);
            let var = self.slot(param);
            self.emit(Basic::Store { var, value: dst }, pos);
        }

        self.compile_block(&decl.body)?;

        if self.reachable {
            if contains_return(&decl.body) {
                return Err(CompileError::structural(
                    pos,
                    format!("not every path through `{}` ends in a return", decl.name),
                ));
            }
            let unit = self.constant(Constant::Unit, pos);
            self.terminate(Control::Return(unit));
        }

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (i, draft) in self.blocks.into_iter().enumerate() {
            let control = draft.control.ok_or_else(|| {
                CompileError::structural(pos, format!("block b{} of `{}` has no terminator", i, decl.name))
            })?;
            blocks.push(BasicBlock {
                insts: draft.insts,
                control,
                preds: Vec::new(),
            });
        }
        compute_preds(&mut blocks);

        Ok(Function {
            name: decl.name.clone(),
            params: decl.params.clone(),
            vars: self.names,
            blocks,
            num_values: self.num_values,
            pos,
        })
    }

    // Give every parameter and every assigned variable a slot up front, in
    // order of appearance, so variable numbering does not depend on the order
    // in which reads happen to be lowered.
    fn assign_slots(&mut self, decl: &FnDecl) -> Result<(), CompileError> {
        for param in &decl.params {
            if self.slots.contains_key(param) {
                return Err(CompileError::structural(
                    self.pos(decl.span),
                    format!("parameter `{}` of `{}` is declared more than once", param, decl.name),
                ));
            }
            self.slot(param);
        }
        self.assign_slots_block(&decl.body);
        Ok(())
    }

    fn assign_slots_block(&mut self, b: &Block) {
        for s in &b.0 {
            self.assign_slots_stmt(s);
        }
    }

    fn assign_slots_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Declare(x, _e) | StmtKind::Assign(x, _e) => {
                self.slot(x);
            }
            StmtKind::If(_e, bt, bf) => {
                self.assign_slots_block(bt);
                if let Some(bf) = bf {
                    self.assign_slots_block(bf);
                }
            }
            StmtKind::While(_e, b) => {
                self.assign_slots_block(b);
            }
            StmtKind::Expr(_) | StmtKind::Break | StmtKind::Continue | StmtKind::Return(_) => {}
        }
    }
}

fn contains_return(b: &Block) -> bool {
    b.0.iter().any(|s| match &s.kind {
        StmtKind::Return(_) => true,
        StmtKind::If(_, bt, bf) => contains_return(bt) || bf.as_ref().map_or(false, contains_return),
        StmtKind::While(_, body) => contains_return(body),
        _ => false,
    })
}

/// Records predecessors in block order, each block's successors in
/// terminator order. Phi operands follow this order.
pub fn compute_preds(blocks: &mut [BasicBlock]) {
    for block in blocks.iter_mut() {
        block.preds.clear();
    }
    for i in 0..blocks.len() {
        for succ in blocks[i].control.successors() {
            blocks[succ.0].preds.push(BlockRef(i));
        }
    }
}
