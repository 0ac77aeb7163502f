use clap::builder::RangedU64ValueParser;
use clap::{value_parser, Arg, ArgAction, Command};
use crunch::runner::{self, OutputStyle};
use crunch::config::MAX_DEPTH_LIMIT;
use crunch::{repl, AngleMode, Config, DisplayMode, Evaluator, RadixChar};
use std::fs;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();

    let matches = Command::new("crunch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A calculator expression engine with precise error diagnostics")
        .arg(
            Arg::new("file")
                .help("File of expressions to evaluate, one per line")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("expression")
                .short('e')
                .long("expression")
                .help("Evaluate an expression and exit")
                .value_name("EXPR")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("radix")
                .long("radix")
                .help("Decimal mark used in number literals")
                .value_parser(value_parser!(RadixChar))
                .default_value("dot"),
        )
        .arg(
            Arg::new("angle")
                .long("angle")
                .help("Angle unit of the trigonometric functions")
                .value_parser(value_parser!(AngleMode))
                .default_value("radian"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("How results are displayed")
                .value_parser(value_parser!(DisplayMode))
                .default_value("general"),
        )
        .arg(
            Arg::new("precision")
                .long("precision")
                .help("Significant digits (general) or decimals (fixed, scientific)")
                .value_name("N")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .help("Maximum nesting of user function calls")
                .value_name("N")
                .value_parser(RangedU64ValueParser::<usize>::new().range(1..=MAX_DEPTH_LIMIT as u64)),
        )
        .get_matches();

    let mut config = Config::default();
    if let Some(radix) = matches.get_one::<RadixChar>("radix") {
        config = config.with_radix(*radix);
    }
    if let Some(angle) = matches.get_one::<AngleMode>("angle") {
        config = config.with_angle(*angle);
    }
    if let Some(max_depth) = matches.get_one::<usize>("max-depth") {
        config = config.with_max_depth(*max_depth);
    }

    let display = OutputStyle {
        mode: matches.get_one::<DisplayMode>("format").copied().unwrap_or_default(),
        precision: matches.get_one::<usize>("precision").copied(),
    };

    let mut evaluator = Evaluator::with_config(config);
    let mut failures = 0;
    let mut ran_input = false;

    if let Some(expressions) = matches.get_many::<String>("expression") {
        for expression in expressions {
            if let Err(error) = runner::evaluate_line(expression, &mut evaluator, display) {
                error.report(expression, None);
                failures += 1;
            }
        }
        ran_input = true;
    }

    if let Some(file_path) = matches.get_one::<String>("file") {
        failures += run_file(file_path, &mut evaluator, display);
        ran_input = true;
    }

    if matches.get_flag("interactive") || !ran_input {
        repl::start(&mut evaluator, display);
    }

    if failures > 0 {
        process::exit(1);
    }
}

/// Installs the stderr subscriber. `CRUNCH_LOG` takes the usual filter
/// directives and defaults to `warn`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("CRUNCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_file(path: &str, evaluator: &mut Evaluator, display: OutputStyle) -> usize {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        process::exit(1);
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.display().to_string();
            runner::run(&source, Some(&filename), evaluator, display)
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}
