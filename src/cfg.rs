//! Control-flow graph representation shared by the lowering, SSA and
//! interpreter stages.
//!
//! A function is a vector of basic blocks; block 0 is the entry. Every block
//! holds a list of [`Basic`] instructions followed by exactly one [`Control`]
//! transfer, kept in its own field so nothing can follow it.
//!
//! Before SSA construction, named variables are reached through
//! [`Basic::Load`] and [`Basic::Store`]. Construction removes both and
//! inserts [`Basic::Phi`] merges at the start of join blocks.

use std::fmt;
use std::rc::Rc;

use crate::error::Position;
use crate::syntax::{BinOp, UnOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(pub usize);

/// An SSA value, local to its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(pub usize);

/// A named, mutable source variable, local to its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Basic {
    Const {
        dst: ValueRef,
        value: Constant,
    },
    /// The `index`-th argument of the enclosing function. Entry block only.
    Param {
        dst: ValueRef,
        index: usize,
    },
    Unary {
        dst: ValueRef,
        op: UnOp,
        operand: ValueRef,
    },
    Arith {
        dst: ValueRef,
        op: BinOp,
        lhs: ValueRef,
        rhs: ValueRef,
    },
    Call {
        dst: ValueRef,
        callee: FuncRef,
        args: Vec<ValueRef>,
    },
    /// A call to anything that is not a declared function. Resolved at run time.
    Builtin {
        dst: ValueRef,
        name: String,
        args: Vec<ValueRef>,
    },
    /// One operand per predecessor, in the block's predecessor order.
    Phi {
        dst: ValueRef,
        incoming: Vec<(BlockRef, ValueRef)>,
    },
    Load {
        dst: ValueRef,
        var: Var,
    },
    Store {
        var: Var,
        value: ValueRef,
    },
}

impl Basic {
    pub fn dst(&self) -> Option<ValueRef> {
        match self {
            Basic::Const { dst, .. }
            | Basic::Param { dst, .. }
            | Basic::Unary { dst, .. }
            | Basic::Arith { dst, .. }
            | Basic::Call { dst, .. }
            | Basic::Builtin { dst, .. }
            | Basic::Phi { dst, .. }
            | Basic::Load { dst, .. } => Some(*dst),
            Basic::Store { .. } => None,
        }
    }

    pub fn operands(&self) -> Vec<ValueRef> {
        match self {
            Basic::Const { .. } | Basic::Param { .. } | Basic::Load { .. } => Vec::new(),
            Basic::Unary { operand, .. } => vec![*operand],
            Basic::Arith { lhs, rhs, .. } => vec![*lhs, *rhs],
            Basic::Call { args, .. } | Basic::Builtin { args, .. } => args.clone(),
            Basic::Phi { incoming, .. } => incoming.iter().map(|(_, v)| *v).collect(),
            Basic::Store { value, .. } => vec![*value],
        }
    }

    pub fn map_operands(&mut self, mut f: impl FnMut(ValueRef) -> ValueRef) {
        match self {
            Basic::Const { .. } | Basic::Param { .. } | Basic::Load { .. } => {}
            Basic::Unary { operand, .. } => *operand = f(*operand),
            Basic::Arith { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            Basic::Call { args, .. } | Basic::Builtin { args, .. } => {
                for arg in args.iter_mut() {
                    *arg = f(*arg);
                }
            }
            Basic::Phi { incoming, .. } => {
                for (_, v) in incoming.iter_mut() {
                    *v = f(*v);
                }
            }
            Basic::Store { value, .. } => *value = f(*value),
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Basic::Phi { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub basic: Basic,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Jump(BlockRef),
    Branch {
        cond: ValueRef,
        then: BlockRef,
        otherwise: BlockRef,
        pos: Position,
    },
    Return(ValueRef),
}

impl Control {
    pub fn successors(&self) -> Vec<BlockRef> {
        match self {
            Control::Jump(target) => vec![*target],
            Control::Branch {
                then, otherwise, ..
            } => vec![*then, *otherwise],
            Control::Return(_) => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<ValueRef> {
        match self {
            Control::Jump(_) => Vec::new(),
            Control::Branch { cond, .. } => vec![*cond],
            Control::Return(value) => vec![*value],
        }
    }

    pub fn map_operands(&mut self, mut f: impl FnMut(ValueRef) -> ValueRef) {
        match self {
            Control::Jump(_) => {}
            Control::Branch { cond, .. } => *cond = f(*cond),
            Control::Return(value) => *value = f(*value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub insts: Vec<Insn>,
    pub control: Control,
    pub preds: Vec<BlockRef>,
}

impl BasicBlock {
    pub fn phis(&self) -> impl Iterator<Item = &Insn> {
        self.insts.iter().take_while(|insn| insn.basic.is_phi())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    /// Source variable names, indexed by [`Var`].
    pub vars: Vec<String>,
    pub blocks: Vec<BasicBlock>,
    /// Upper bound on [`ValueRef`] indices used by this function.
    pub num_values: usize,
    pub pos: Position,
}

impl Function {
    pub const ENTRY: BlockRef = BlockRef(0);

    pub fn block(&self, b: BlockRef) -> &BasicBlock {
        &self.blocks[b.0]
    }

    pub fn fresh_value(&mut self) -> ValueRef {
        let v = ValueRef(self.num_values);
        self.num_values += 1;
        v
    }
}

/// A whole compiled program.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub functions: Vec<Function>,
    pub main: FuncRef,
}

impl Module {
    pub fn function(&self, f: FuncRef) -> &Function {
        &self.functions[f.0]
    }

    pub fn find(&self, name: &str) -> Option<FuncRef> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncRef)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Unit => write!(f, "()"),
        }
    }
}

fn comma_separated(values: &[ValueRef]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Function {
    fn fmt_basic(&self, basic: &Basic, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match basic {
            Basic::Const { dst, value } => write!(f, "{} = const {}", dst, value),
            Basic::Param { dst, index } => write!(f, "{} = param {}", dst, index),
            Basic::Unary { dst, op, operand } => write!(f, "{} = {} {}", dst, op.mnemonic(), operand),
            Basic::Arith { dst, op, lhs, rhs } => {
                write!(f, "{} = {} {}, {}", dst, op.mnemonic(), lhs, rhs)
            }
            Basic::Call { dst, callee, args } => {
                write!(f, "{} = call @{}({})", dst, callee.0, comma_separated(args))
            }
            Basic::Builtin { dst, name, args } => {
                write!(f, "{} = builtin {}({})", dst, name, comma_separated(args))
            }
            Basic::Phi { dst, incoming } => {
                write!(f, "{} = phi ", dst)?;
                for (i, (block, value)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}: {}]", block, value)?;
                }
                Ok(())
            }
            Basic::Load { dst, var } => write!(f, "{} = load {}", dst, self.vars[var.0]),
            Basic::Store { var, value } => write!(f, "store {}, {}", self.vars[var.0], value),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}({}) {{", self.name, self.params.join(", "))?;
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "{}:", BlockRef(i))?;
            if !block.preds.is_empty() {
                let preds: Vec<String> = block.preds.iter().map(|p| p.to_string()).collect();
                write!(f, "  ; preds: {}", preds.join(", "))?;
            }
            writeln!(f)?;
            for insn in &block.insts {
                write!(f, "    ")?;
                self.fmt_basic(&insn.basic, f)?;
                writeln!(f)?;
            }
            match &block.control {
                Control::Jump(target) => writeln!(f, "    jmp {}", target)?,
                Control::Branch {
                    cond,
                    then,
                    otherwise,
                    ..
                } => writeln!(f, "    br {}, {}, {}", cond, then, otherwise)?,
                Control::Return(value) => writeln!(f, "    ret {}", value)?,
            }
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "; @{}", i)?;
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}
