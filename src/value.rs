use std::fmt;
use std::rc::Rc;

use crate::cfg::Constant;
use crate::error::{Position, RuntimeError};
use crate::syntax::{BinOp, UnOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    Unit,
}

impl Value {
    /// Program arguments that look like integers become `Int`, the rest `Str`.
    pub fn from_arg(arg: &str) -> Self {
        match arg.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Str(Rc::from(arg)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Unit => "unit",
        }
    }

    pub fn binary(op: BinOp, lhs: &Value, rhs: &Value, pos: Position) -> Result<Value, RuntimeError> {
        use Value::*;

        let value = match (op, lhs, rhs) {
            (BinOp::Add, Str(a), Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Str(Rc::from(s))
            }
            (BinOp::Add, Int(a), Int(b)) => {
                Int(checked(a.checked_add(*b), "addition overflowed", pos)?)
            }
            (BinOp::Sub, Int(a), Int(b)) => {
                Int(checked(a.checked_sub(*b), "subtraction overflowed", pos)?)
            }
            (BinOp::Mul, Int(a), Int(b)) => {
                Int(checked(a.checked_mul(*b), "multiplication overflowed", pos)?)
            }
            (BinOp::Div | BinOp::Rem, Int(_), Int(0)) => {
                return Err(RuntimeError::arithmetic(pos, "division by zero"))
            }
            (BinOp::Div, Int(a), Int(b)) => {
                Int(checked(a.checked_div(*b), "division overflowed", pos)?)
            }
            (BinOp::Rem, Int(a), Int(b)) => {
                Int(checked(a.checked_rem(*b), "remainder overflowed", pos)?)
            }
            (BinOp::Lt, Int(a), Int(b)) => Bool(a < b),
            (BinOp::Le, Int(a), Int(b)) => Bool(a <= b),
            (BinOp::Gt, Int(a), Int(b)) => Bool(a > b),
            (BinOp::Ge, Int(a), Int(b)) => Bool(a >= b),
            (BinOp::Lt, Str(a), Str(b)) => Bool(a < b),
            (BinOp::Le, Str(a), Str(b)) => Bool(a <= b),
            (BinOp::Gt, Str(a), Str(b)) => Bool(a > b),
            (BinOp::Ge, Str(a), Str(b)) => Bool(a >= b),
            (BinOp::Eq | BinOp::Ne, a, b) if a.type_name() == b.type_name() => {
                Bool((a == b) == (op == BinOp::Eq))
            }
            _ => {
                return Err(RuntimeError::type_mismatch(
                    pos,
                    format!(
                        "cannot apply `{}` to {} and {}",
                        op.mnemonic(),
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                ))
            }
        };
        Ok(value)
    }

    pub fn unary(op: UnOp, operand: &Value, pos: Position) -> Result<Value, RuntimeError> {
        match (op, operand) {
            (UnOp::Neg, Value::Int(n)) => {
                Ok(Value::Int(checked(n.checked_neg(), "negation overflowed", pos)?))
            }
            (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            _ => Err(RuntimeError::type_mismatch(
                pos,
                format!("cannot apply `{}` to {}", op.mnemonic(), operand.type_name()),
            )),
        }
    }
}

fn checked(result: Option<i64>, message: &str, pos: Position) -> Result<i64, RuntimeError> {
    result.ok_or_else(|| RuntimeError::arithmetic(pos, message))
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Int(n) => Value::Int(*n),
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Str(s) => Value::Str(Rc::clone(s)),
            Constant::Unit => Value::Unit,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Unit => write!(f, "()"),
        }
    }
}
