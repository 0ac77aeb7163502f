use crate::evaluator::Evaluator;
use crate::format::format_number;
use crate::functions;
use crate::runner::{evaluate_line, OutputStyle};
use std::io::{self, Write};

/// Interactive loop over one persistent session. Lines starting with `:`
/// are commands; everything else is evaluated.
pub fn start(evaluator: &mut Evaluator, display: OutputStyle) {
    println!("Crunch {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit, ':help' for commands");
    println!();

    loop {
        print!("> ");
        if let Err(error) = io::stdout().flush() {
            eprintln!("Error writing prompt: {}", error);
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                match line.strip_prefix(':') {
                    Some(command) => run_command(command, evaluator, display),
                    None => {
                        if let Err(error) = evaluate_line(line, evaluator, display) {
                            error.report(line, None);
                        }
                    }
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

fn run_command(command: &str, evaluator: &mut Evaluator, display: OutputStyle) {
    let mut words = command.split_whitespace();

    match (words.next(), words.next()) {
        (Some("vars"), None) => {
            for variable in evaluator.get_user_defined_variables_plus_ans() {
                println!(
                    "{} = {}",
                    variable.identifier,
                    format_number(&variable.value, display.mode, display.precision)
                );
            }
        }
        (Some("funcs"), None) => {
            for function in evaluator.get_user_functions() {
                println!("{}", function);
            }
        }
        (Some("builtins"), None) => {
            for builtin in functions::all() {
                println!("{:<10} {}", builtin.name, builtin.description);
            }
        }
        (Some("unset"), Some(name)) => {
            let removed_variable = evaluator.unset_variable(name, false);
            let removed_function = evaluator.unset_user_function(name);
            if !removed_variable && !removed_function {
                println!("Nothing named '{}' to remove", name);
            }
        }
        (Some("clear"), None) => {
            evaluator.unset_all_user_defined_variables();
            evaluator.unset_all_user_functions();
        }
        (Some("dump"), None) => print!("{}", evaluator.dump()),
        (Some("help"), None) => {
            println!(":vars          list variables");
            println!(":funcs         list user functions");
            println!(":builtins      list built-in functions");
            println!(":unset NAME    remove a variable or function");
            println!(":clear         remove all user variables and functions");
            println!(":dump          show the compiled form of the last expression");
        }
        _ => println!("Unknown command ':{}', try ':help'", command),
    }
}
