use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssa_runner::value::Value;
use ssa_runner::vm::{VmConfig, VM};
use ssa_runner::Options;

#[derive(Parser, Debug)]
#[command(name = "ssa-runner")]
#[command(about = "Compile a script to SSA form and run it")]
struct Cli {
    /// Script to run, or `-` for stdin
    #[arg(required_unless_present = "eval", conflicts_with = "eval")]
    file: Option<PathBuf>,

    /// Run the given source text instead of a file
    #[arg(short, long, value_name = "SRC")]
    eval: Option<String>,

    /// Print an intermediate form instead of running the program
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Fold constant arithmetic before lowering
    #[arg(long)]
    fold: bool,

    /// Maximum call depth before a stack overflow is reported
    #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,

    /// Give up after this many block transitions and calls
    #[arg(long)]
    max_steps: Option<u64>,

    /// Log compiler passes (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Arguments passed to the program, available through `arg(i)` and main's parameters
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The parsed syntax tree
    Ast,
    /// Control-flow graphs before SSA construction
    Cfg,
    /// Control-flow graphs in SSA form
    Ssa,
}

fn read_source(cli: &Cli) -> io::Result<(String, String)> {
    if let Some(src) = &cli.eval {
        return Ok(("<eval>".to_string(), src.clone()));
    }
    match &cli.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut src = String::new();
            io::stdin().read_to_string(&mut src)?;
            Ok(("<stdin>".to_string(), src))
        }
        Some(path) => Ok((path.display().to_string(), fs::read_to_string(path)?)),
        None => Err(io::Error::new(io::ErrorKind::InvalidInput, "no script given")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ssa_runner=debug"
    } else {
        "ssa_runner=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let (name, source) = match read_source(&cli) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(1);
        }
    };

    let options = Options {
        fold_constants: cli.fold,
    };

    if let Some(emit) = cli.emit {
        let emitted = match emit {
            Emit::Ast => ssa_runner::parse_with(&source, &options).map(|p| format!("{:#?}\n", p)),
            Emit::Cfg => ssa_runner::lower_with(&source, &options).map(|m| m.to_string()),
            Emit::Ssa => ssa_runner::compile_with(&source, &options).map(|m| m.to_string()),
        };
        return match emitted {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}: {}", name, err);
                ExitCode::from(1)
            }
        };
    }

    let module = match ssa_runner::compile_with(&source, &options) {
        Ok(module) => module,
        Err(err) => {
            eprintln!("{}: {}", name, err);
            return ExitCode::from(1);
        }
    };
    debug!(functions = module.functions.len(), "compiled {}", name);

    let config = VmConfig {
        max_call_depth: cli.max_call_depth,
        max_steps: cli.max_steps,
    };
    let args = cli.args.iter().map(|arg| Value::from_arg(arg)).collect();
    let mut vm = VM::new(&module, config)
        .with_args(args)
        .with_sink(io::stdout());

    match vm.execute() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", name, err);
            ExitCode::from(2)
        }
    }
}
