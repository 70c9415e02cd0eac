//! End-to-end runs of whole programs through the library entry points.

use pretty_assertions::assert_eq;

use ssa_runner::cfg::{Basic, BlockRef};
use ssa_runner::error::{CompileError, Position, RuntimeError};
use ssa_runner::value::Value;
use ssa_runner::vm::VmConfig;
use ssa_runner::{compile, compile_with, execute, execute_with, Options};

fn run(src: &str) -> Vec<String> {
    let module = compile(src).unwrap_or_else(|e| panic!("{}", e));
    let execution = execute(&module, &[]);
    if let Err(err) = execution.result {
        panic!("{}", err);
    }
    execution.output
}

#[test]
fn arithmetic_compiles_to_one_block() {
    let module = compile("print(1+2*3)").unwrap();
    let main = module.function(module.main);
    assert_eq!(main.blocks.len(), 1);
    assert_eq!(execute(&module, &[]).output, vec!["7".to_string()]);
}

#[test]
fn if_else_has_one_phi_in_the_merge_block() {
    let module = compile("if (1 < 2) { x = 1 } else { x = 2 } print(x)").unwrap();
    let main = module.function(module.main);

    let merges: Vec<usize> = main
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.preds.len() == 2)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(merges, vec![3]);

    let merge = main.block(BlockRef(3));
    let phis: Vec<_> = merge.phis().collect();
    assert_eq!(phis.len(), 1);
    let Basic::Phi { incoming, .. } = &phis[0].basic else {
        unreachable!()
    };
    assert_eq!(
        incoming.iter().map(|(b, _)| *b).collect::<Vec<_>>(),
        merge.preds
    );

    assert_eq!(execute(&module, &[]).output, vec!["1".to_string()]);
}

#[test]
fn division_by_zero_compiles_but_fails_when_run() {
    let module = compile("print(10/0)").unwrap();
    let execution = execute(&module, &[]);
    assert!(execution.output.is_empty());
    match execution.result {
        Err(RuntimeError::Arithmetic { pos, .. }) => assert_eq!(pos, Some(Position::new(1, 7))),
        other => panic!("expected an arithmetic error, got {:?}", other),
    }
}

#[test]
fn folding_keeps_division_by_zero_a_runtime_error() {
    let options = Options {
        fold_constants: true,
    };
    let module = compile_with("print((1 + 2) * 3) print(10/0)", &options).unwrap();
    let execution = execute(&module, &[]);
    assert_eq!(execution.output, vec!["9".to_string()]);
    assert!(matches!(execution.result, Err(RuntimeError::Arithmetic { .. })));
}

#[test]
fn return_in_only_one_arm_is_a_structural_error() {
    let src = "\
fn pick(c) {
    if (c) {
        return 1
    } else {
        print(2)
    }
}
print(pick(true))
";
    match compile(src) {
        Err(CompileError::Structural { pos, message }) => {
            assert_eq!(pos, Position::new(1, 1));
            assert_eq!(message, "not every path through `pick` ends in a return");
        }
        other => panic!("expected a structural error, got {:?}", other),
    }
}

#[test]
fn variable_defined_on_one_path_is_rejected() {
    let err = compile("if (argc() > 0) { x = 1 }\nprint(x)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "2:7: variable `x` is used before it is assigned on every path"
    );
}

#[test]
fn syntax_errors_stop_before_execution() {
    let err = compile("print(1)\nprint(2 +)").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }));
    assert_eq!(err.position(), Position::new(2, 10));
}

#[test]
fn iterative_and_recursive_factorial_agree() {
    let src = "
        fn fact(n) {
            if (n <= 1) { return 1 }
            return n * fact(n - 1)
        }

        fn fact_loop(n) {
            let acc = 1
            while (n > 1) {
                acc = acc * n
                n = n - 1
            }
            return acc
        }

        var i = 0
        while (i <= 20) {
            if (fact(i) != fact_loop(i)) {
                print(\"mismatch at\", i)
            }
            i = i + 1
        }
        print(fact(20))
    ";
    assert_eq!(run(src), vec!["2432902008176640000".to_string()]);
}

#[test]
fn nested_loops_and_else_if() {
    let src = r#"
        i = 0
        while (i < 3) {
            j = 0
            line = ""
            while (j < 3) {
                if (i == j) {
                    line = line + "x"
                } else if (i < j) {
                    line = line + "."
                } else {
                    line = line + "o"
                }
                j = j + 1
            }
            print(line)
            i = i + 1
        }
    "#;
    assert_eq!(
        run(src),
        vec!["x..".to_string(), "ox.".to_string(), "oox".to_string()]
    );
}

#[test]
fn factorial_overflow_is_an_arithmetic_error() {
    let module = compile("fn f(n) { if (n <= 1) { return 1 } return n * f(n - 1) } print(f(21))").unwrap();
    let execution = execute(&module, &[]);
    assert!(matches!(execution.result, Err(RuntimeError::Arithmetic { .. })));
}

#[test]
fn arguments_reach_main() {
    let module = compile("fn main(a, b) { print(format(\"{} + {} = {}\", a, b, a + b)) return a }").unwrap();
    let args = ["40".to_string(), "2".to_string()];
    let execution = execute(&module, &args);
    assert_eq!(execution.output, vec!["40 + 2 = 42".to_string()]);
    assert_eq!(execution.result.unwrap(), Value::Int(40));
}

#[test]
fn call_depth_limit_is_configurable() {
    let module = compile("fn down(n) { if (n == 0) { return 0 } return down(n - 1) } print(down(100))").unwrap();

    let shallow = VmConfig {
        max_call_depth: 10,
        ..VmConfig::default()
    };
    let execution = execute_with(&module, &[], shallow);
    assert!(matches!(
        execution.result,
        Err(RuntimeError::StackOverflow { limit: 10, .. })
    ));

    let execution = execute_with(&module, &[], VmConfig::default());
    assert_eq!(execution.output, vec!["0".to_string()]);
}

#[test]
fn compiling_twice_gives_identical_graphs() {
    let src = "
        fn gcd(a, b) { while (b != 0) { t = b b = a % b a = t } return a }
        print(gcd(1071, 462))
    ";
    assert_eq!(compile(src).unwrap(), compile(src).unwrap());
    assert_eq!(run(src), vec!["21".to_string()]);
}
