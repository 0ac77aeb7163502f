use crate::error::CrunchError;
use crate::evaluator::Evaluator;
use crate::format::{format_number, DisplayMode};

/// Output settings shared by the runner and the REPL.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputStyle {
    pub mode: DisplayMode,
    pub precision: Option<usize>,
}

/// Evaluates `source` one line at a time, printing each result. Blank lines
/// and lines starting with `#` are skipped. Returns the number of lines that
/// failed.
pub fn run(source: &str, filename: Option<&str>, evaluator: &mut Evaluator, display: OutputStyle) -> usize {
    let mut failures = 0;

    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(error) = evaluate_line(line, evaluator, display) {
            error.report(line, filename);
            failures += 1;
        }
    }

    failures
}

/// Evaluates one line, updating `ans`, and prints its result. Definitions
/// print nothing.
pub fn evaluate_line(line: &str, evaluator: &mut Evaluator, display: OutputStyle) -> Result<(), CrunchError> {
    evaluator.set_expression(line);
    let value = evaluator.eval_update_ans()?;

    if let Some(error) = evaluator.error() {
        return Err(error.clone());
    }
    if !evaluator.is_user_function_assign() {
        println!("{}", format_number(&value, display.mode, display.precision));
    }
    Ok(())
}
