use lispy::ast::{Value, unit};
use lispy::builtinops::Arity;
use lispy::evaluator::{self, Context};
use lispy::reader::{parse_file, parse_program};
use lispy::{Env, EvalError};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::path::Path;
use std::process;

const PROMPT: &str = "lispy> ";
const CONTINUATION_PROMPT: &str = "...> ";

fn main() {
    init_tracing();

    let files: Vec<String> = std::env::args().skip(1).collect();
    if !files.is_empty() {
        process::exit(run_files(&files));
    }

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Log to stderr, only if RUST_LOG is set
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// Batch mode: evaluate each file in one shared environment, like `load`.
/// Returns the process exit code.
fn run_files(files: &[String]) -> i32 {
    let env = evaluator::create_global_env();
    let mut status = 0;

    for file in files {
        match parse_file(Path::new(file)) {
            Ok(exprs) => {
                for expr in exprs {
                    let result = evaluator::eval(&env, expr);
                    if result.is_error() {
                        println!("{result}");
                    }
                }
            }
            Err(e) => {
                eprintln!("{e}");
                status = 1;
            }
        }
    }
    status
}

fn run_repl() {
    println!("Lispy Version 0.1.0");
    println!("Enter expressions like: (+ 1 2) or (def {{x}} {{1 2 3}})");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let env = evaluator::create_global_env();

    // Register custom function that can be called from user code for demonstration purposes
    env.register_builtin("help", Arity::Exact(0), builtin_help);

    // Lines of an expression still waiting for its closing bracket or quote
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match command {
                        ":help" => {
                            let _ = rl.add_history_entry(command);
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(command);
                            print_environment(&env);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                let exprs = match parse_program(&pending) {
                    Ok(exprs) => exprs,
                    Err(e) if e.is_incomplete() => continue,
                    Err(e) => {
                        let _ = rl.add_history_entry(pending.trim_end());
                        pending.clear();
                        println!("{e}");
                        continue;
                    }
                };

                let _ = rl.add_history_entry(pending.trim_end());
                pending.clear();

                for expr in exprs {
                    println!("{}", evaluator::eval(&env, expr));
                }
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                // Abandon the unfinished expression, stay in the REPL
                pending.clear();
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn builtin_help(_ctx: &Context<'_>, _args: Vec<Value>) -> Result<Value, EvalError> {
    print_help();
    Ok(unit())
}

fn print_help() {
    println!("Lispy commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Abandon a multi-line expression, or exit");
    println!();
    println!("Values:");
    println!("  Numbers: 42, -5");
    println!("  Booleans: true, false");
    println!("  Strings: \"hello\\n\"");
    println!("  S-expressions (evaluated): (+ 1 2)");
    println!("  Q-expressions (data): {{1 2 3}}");
    println!();
    println!("Builtins:");
    println!("  Arithmetic: + - * / min max");
    println!("  Comparison: < <= > >= == !=");
    println!("  Logic: not if");
    println!("  Lists: list head tail join cons len eval");
    println!("  Definitions: \\ def = fun");
    println!("  Other: print error load");
    println!();
    println!("Examples:");
    println!("  (fun {{add a b}} {{+ a b}})");
    println!("  ((add 1) 2)");
    println!("  (head (tail {{1 2 3}}))");
    println!("  (if (> 2 1) {{\"yes\"}} {{\"no\"}})");
    println!();
}

fn print_environment(env: &Env) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    // Print built-in functions
    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    // Print user-defined values
    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
