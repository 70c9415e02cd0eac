//! A small scripting language run through an SSA pipeline:
//! source → AST → control-flow graph → SSA → interpreter.

use lalrpop_util::lalrpop_mod;
use tracing::debug;

lalrpop_mod!(parser);

pub mod cfg;
pub mod compiler;
pub mod error;
pub mod fold;
pub mod ssa;
pub mod syntax;
pub mod value;
pub mod vm;

use cfg::Module;
use error::{CompileError, LineIndex, RuntimeError};
use syntax::Program;
use value::Value;
use vm::{VmConfig, VM};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Fold constant integer arithmetic before lowering.
    pub fold_constants: bool,
}

/// Parses `source`, folding constants if asked to.
pub fn parse_with(source: &str, options: &Options) -> Result<Program, CompileError> {
    let lines = LineIndex::new(source);
    parse_indexed(source, &lines, options)
}

fn parse_indexed(source: &str, lines: &LineIndex, options: &Options) -> Result<Program, CompileError> {
    let mut program = syntax::parse(source, lines)?;
    if options.fold_constants {
        let folded = fold::fold_program(&mut program);
        debug!(folded, "folded constant expressions");
    }
    Ok(program)
}

/// Parses and lowers `source` to control-flow graphs that still use
/// `load`/`store` for named variables.
pub fn lower_with(source: &str, options: &Options) -> Result<Module, CompileError> {
    let lines = LineIndex::new(source);
    let program = parse_indexed(source, &lines, options)?;
    compiler::lower(&program, &lines)
}

pub fn compile(source: &str) -> Result<Module, CompileError> {
    compile_with(source, &Options::default())
}

/// Compiles `source` all the way to SSA form.
pub fn compile_with(source: &str, options: &Options) -> Result<Module, CompileError> {
    let mut module = lower_with(source, options)?;
    ssa::construct(&mut module)?;
    for function in &module.functions {
        debug_assert_eq!(ssa::verify(function), Ok(()), "\n{}", function);
    }
    Ok(module)
}

/// What a program printed, and how it ended.
#[derive(Debug)]
pub struct Execution {
    pub output: Vec<String>,
    pub result: Result<Value, RuntimeError>,
}

pub fn execute(module: &Module, args: &[String]) -> Execution {
    execute_with(module, args, VmConfig::default())
}

pub fn execute_with(module: &Module, args: &[String], config: VmConfig) -> Execution {
    let args = args.iter().map(|arg| Value::from_arg(arg)).collect();
    let mut vm = VM::new(module, config).with_args(args);
    let result = vm.execute();
    Execution {
        output: vm.into_output(),
        result,
    }
}
