use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cfg::{Basic, BlockRef, Control, FuncRef, Module, ValueRef};
use crate::error::{Position, RuntimeError};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of live frames, `main` included.
    pub max_call_depth: usize,
    /// Maximum number of block transitions and calls before giving up.
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
        }
    }
}

#[derive(Debug)]
struct Frame {
    func: FuncRef,
    block: BlockRef,
    pc: usize, // index of the next instruction in `block`
    came_from: Option<BlockRef>,
    values: Vec<Option<Value>>,
    params: Vec<Value>,
    // where the caller wants the result; None for `main`
    ret: Option<ValueRef>,
}

impl Frame {
    fn get(&self, v: ValueRef) -> Result<Value, RuntimeError> {
        self.values
            .get(v.0)
            .cloned()
            .flatten()
            .ok_or_else(|| RuntimeError::unsupported(None, format!("{} is read before it is defined", v)))
    }

    fn set(&mut self, v: ValueRef, value: Value) {
        self.values[v.0] = Some(value);
    }
}

/// Runs an SSA [`Module`] with an explicit frame stack.
pub struct VM<'m> {
    module: &'m Module,
    config: VmConfig,
    frames: Vec<Frame>,
    args: Vec<Value>, // command-line arguments provided as inputs to the program
    steps: u64,
    output: Vec<String>,
    sink: Option<Box<dyn Write + 'm>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'m> VM<'m> {
    pub fn new(module: &'m Module, config: VmConfig) -> Self {
        VM {
            module,
            config,
            frames: Vec::new(),
            args: Vec::new(),
            steps: 0,
            output: Vec::new(),
            sink: None,
            cancel: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Also writes every printed line to `sink` as it is produced.
    pub fn with_sink(mut self, sink: impl Write + 'm) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Stops execution with [`RuntimeError::Cancelled`] once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    /// Runs `main` to completion and returns its result.
    pub fn execute(&mut self) -> Result<Value, RuntimeError> {
        self.steps = 0;
        let result = self.run();
        if let Err(err) = &result {
            debug!(%err, "execution failed");
            self.dump_state();
        }
        self.frames.clear();

        let flushed = match &mut self.sink {
            Some(sink) => sink.flush(),
            None => Ok(()),
        };
        let value = result?;
        flushed?;
        Ok(value)
    }

    fn run(&mut self) -> Result<Value, RuntimeError> {
        let main = self.module.function(self.module.main);
        if !main.params.is_empty() && main.params.len() != self.args.len() {
            return Err(RuntimeError::ArityMismatch {
                function: main.name.clone(),
                expected: main.params.len(),
                found: self.args.len(),
            });
        }
        let params = self.args.clone();
        self.push_frame(self.module.main, params, None);

        loop {
            if let Some(value) = self.step()? {
                return Ok(value);
            }
        }
    }

    // executes one instruction or terminator of the innermost frame. Some(value) once main returns.
    fn step(&mut self) -> Result<Option<Value>, RuntimeError> {
        let module = self.module;
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let block = module.function(frame.func).block(frame.block);

        let Some(insn) = block.insts.get(frame.pc) else {
            return self.transfer(&block.control);
        };
        frame.pc += 1;

        let value = match &insn.basic {
            Basic::Const { value, .. } => Value::from(value),
            Basic::Param { index, .. } => frame.params.get(*index).cloned().ok_or_else(|| {
                RuntimeError::unsupported(Some(insn.pos), format!("no argument {} was passed", index))
            })?,
            Basic::Unary { op, operand, .. } => Value::unary(*op, &frame.get(*operand)?, insn.pos)?,
            Basic::Arith { op, lhs, rhs, .. } => {
                Value::binary(*op, &frame.get(*lhs)?, &frame.get(*rhs)?, insn.pos)?
            }
            Basic::Call { dst, callee, args } => {
                let args = args.iter().map(|a| frame.get(*a)).collect::<Result<Vec<_>, _>>()?;
                self.call(*callee, args, *dst, insn.pos)?;
                return Ok(None);
            }
            Basic::Builtin { name, args, .. } => {
                let args = args.iter().map(|a| frame.get(*a)).collect::<Result<Vec<_>, _>>()?;
                self.builtin(name, args, insn.pos)?
            }
            // phis are evaluated on block entry
            Basic::Phi { .. } => return Ok(None),
            Basic::Load { .. } | Basic::Store { .. } => {
                return Err(RuntimeError::unsupported(
                    Some(insn.pos),
                    "variable access in a function that is not in SSA form",
                ))
            }
        };

        if let Some(dst) = insn.basic.dst() {
            self.frames.last_mut().ok_or_else(no_frame)?.set(dst, value);
        }
        Ok(None)
    }

    fn transfer(&mut self, control: &Control) -> Result<Option<Value>, RuntimeError> {
        match control {
            Control::Jump(target) => self.jump(*target)?,
            Control::Branch {
                cond,
                then,
                otherwise,
                pos,
            } => {
                let taken = match self.frame()?.get(*cond)? {
                    Value::Bool(true) => *then,
                    Value::Bool(false) => *otherwise,
                    other => {
                        return Err(RuntimeError::type_mismatch(
                            *pos,
                            format!("branch condition must be bool, found {}", other.type_name()),
                        ))
                    }
                };
                self.jump(taken)?;
            }
            Control::Return(v) => {
                let value = self.frame()?.get(*v)?;
                let done = self.frames.pop().ok_or_else(no_frame)?;
                trace!(
                    function = %self.module.function(done.func).name,
                    depth = self.frames.len(),
                    "frame popped"
                );
                match (done.ret, self.frames.last_mut()) {
                    (Some(dst), Some(caller)) => caller.set(dst, value),
                    _ => return Ok(Some(value)),
                }
            }
        }
        Ok(None)
    }

    // moves the innermost frame to `target`, evaluating its phis all at once
    // against the block control came from
    fn jump(&mut self, target: BlockRef) -> Result<(), RuntimeError> {
        self.tick()?;
        let module = self.module;
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let from = frame.block;

        let mut incoming = Vec::new();
        for insn in module.function(frame.func).block(target).phis() {
            let Basic::Phi { dst, incoming: operands } = &insn.basic else {
                continue;
            };
            let (_, v) = operands.iter().find(|(pred, _)| *pred == from).ok_or_else(|| {
                RuntimeError::unsupported(Some(insn.pos), format!("{} has no operand for {}", dst, from))
            })?;
            incoming.push((*dst, frame.get(*v)?));
        }

        frame.pc = incoming.len();
        for (dst, value) in incoming {
            frame.set(dst, value);
        }
        frame.came_from = Some(from);
        frame.block = target;
        Ok(())
    }

    fn call(
        &mut self,
        callee: FuncRef,
        args: Vec<Value>,
        dst: ValueRef,
        pos: Position,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow {
                pos: Some(pos),
                limit: self.config.max_call_depth,
            });
        }
        self.tick()?;
        self.push_frame(callee, args, Some(dst));
        Ok(())
    }

    fn push_frame(&mut self, func: FuncRef, params: Vec<Value>, ret: Option<ValueRef>) {
        let function = self.module.function(func);
        trace!(function = %function.name, depth = self.frames.len() + 1, "frame pushed");
        self.frames.push(Frame {
            func,
            block: BlockRef(0),
            pc: 0,
            came_from: None,
            values: vec![None; function.num_values],
            params,
            ret,
        });
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeError::StepLimit { limit });
            }
        }
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(RuntimeError::Cancelled);
            }
        }
        Ok(())
    }

    fn frame(&self) -> Result<&Frame, RuntimeError> {
        self.frames.last().ok_or_else(no_frame)
    }

    fn builtin(&mut self, name: &str, args: Vec<Value>, pos: Position) -> Result<Value, RuntimeError> {
        match (name, args.as_slice()) {
            ("print", values) => {
                let line = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.emit(line)?;
                Ok(Value::Unit)
            }
            ("format", [Value::Str(template), values @ ..]) => substitute(template, values, pos),
            ("format", [other, ..]) => Err(RuntimeError::type_mismatch(
                pos,
                format!("format string must be a string, found {}", other.type_name()),
            )),
            ("argc", []) => Ok(Value::Int(self.args.len() as i64)),
            ("arg", [Value::Int(i)]) => usize::try_from(*i)
                .ok()
                .and_then(|i| self.args.get(i))
                .cloned()
                .ok_or_else(|| {
                    RuntimeError::unsupported(
                        Some(pos),
                        format!("argument {} is out of range for {} arguments", i, self.args.len()),
                    )
                }),
            ("arg", [other]) => Err(RuntimeError::type_mismatch(
                pos,
                format!("argument index must be an int, found {}", other.type_name()),
            )),
            ("format" | "argc" | "arg", _) => Err(RuntimeError::unsupported(
                Some(pos),
                format!("`{}` does not take {} arguments", name, args.len()),
            )),
            _ => Err(RuntimeError::unsupported(
                Some(pos),
                format!("unknown function `{}`", name),
            )),
        }
    }

    fn emit(&mut self, line: String) -> Result<(), RuntimeError> {
        if let Some(sink) = &mut self.sink {
            writeln!(sink, "{}", line)?;
        }
        self.output.push(line);
        Ok(())
    }

    pub fn dump_state(&self) {
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            debug!(
                depth,
                function = %self.module.function(frame.func).name,
                block = %frame.block,
                pc = frame.pc,
                came_from = ?frame.came_from,
                "frame"
            );
        }
    }
}

fn no_frame() -> RuntimeError {
    RuntimeError::unsupported(None, "no frame to execute")
}

fn substitute(template: &str, values: &[Value], pos: Position) -> Result<Value, RuntimeError> {
    let pieces: Vec<&str> = template.split("{}").collect();
    if pieces.len() - 1 != values.len() {
        return Err(RuntimeError::type_mismatch(
            pos,
            format!(
                "format string has {} placeholders but {} values were supplied",
                pieces.len() - 1,
                values.len()
            ),
        ));
    }
    let mut out = String::from(pieces[0]);
    for (value, piece) in values.iter().zip(&pieces[1..]) {
        out.push_str(&value.to_string());
        out.push_str(piece);
    }
    Ok(Value::Str(Rc::from(out)))
}
