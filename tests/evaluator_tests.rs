// Evaluator Session Tests
//
// End-to-end behaviour of one session: evaluation, assignment side effects,
// user functions, preview mode and the answer register.

use crunch::config::{AngleMode, Config, RadixChar, MAX_DEPTH_LIMIT};
use crunch::error::{ErrorKind, NumError};
use crunch::number::Number;
use crunch::symbols::{UserFunction, VariableKind};
use crunch::Evaluator;
use rstest::rstest;

const EPSILON: f64 = 1e-9;

fn eval(evaluator: &mut Evaluator, expression: &str) -> Number {
    evaluator.set_expression(expression);
    match evaluator.eval() {
        Ok(value) => value,
        Err(error) => panic!("{} failed: {}", expression, error),
    }
}

fn value_of(expression: &str) -> f64 {
    let mut evaluator = Evaluator::new();
    let result = eval(&mut evaluator, expression);
    assert!(!result.is_error(), "{} gave {}", expression, result);
    result.value()
}

#[rstest]
#[case("2+3*4", 14.0)]
#[case("2^3^2", 512.0)]
#[case("-2^2", -4.0)]
#[case("2^-1", 0.5)]
#[case("(2+3)*4", 20.0)]
#[case("10 - 4 - 3", 3.0)]
#[case("2(3)", 6.0)]
#[case("(1)(2)(3)", 6.0)]
#[case("1/2(4)", 2.0)]
#[case("7 \\ 2", 3.0)]
#[case("7 mod 4", 3.0)]
#[case("5!", 120.0)]
#[case("3²", 9.0)]
#[case("2¹⁰", 1024.0)]
#[case("1 << 4", 16.0)]
#[case("0xF0 & 0x3C", 48.0)]
#[case("0b100 | 1", 5.0)]
#[case("#ff", 255.0)]
#[case("2 ** 3", 8.0)]
#[case("6 × 7", 42.0)]
fn operator_precedence_and_forms(#[case] expression: &str, #[case] expected: f64) {
    assert!((value_of(expression) - expected).abs() < EPSILON, "{}", expression);
}

#[rstest]
#[case("0")]
#[case("42")]
#[case("3.25")]
#[case("1e10")]
#[case("2.5E-3")]
#[case(".5")]
fn literals_evaluate_to_themselves(#[case] literal: &str) {
    let expected: f64 = format!("0{}", literal).parse().unwrap();
    assert_eq!(value_of(literal), expected);
}

#[test]
fn implicit_multiplication_with_variables() {
    let mut evaluator = Evaluator::new();
    evaluator.set_variable("x", Number::new(5.0), VariableKind::UserDefined);
    assert_eq!(eval(&mut evaluator, "2x").value(), 10.0);
    assert_eq!(eval(&mut evaluator, "2 x x").value(), 50.0);
    assert_eq!(eval(&mut evaluator, "x(2)").error(), Some(&NumError::NotAFunction("x".into())));
}

#[test]
fn implicit_multiplication_binds_like_explicit() {
    let mut evaluator = Evaluator::new();
    evaluator.set_variable("m", Number::new(4.0), VariableKind::UserDefined);
    // (1/2)*m, not 1/(2*m)
    assert_eq!(eval(&mut evaluator, "1/2m").value(), 2.0);
}

#[test]
fn division_by_zero_is_a_value_not_a_failure() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("1/0");
    assert!(evaluator.is_valid());
    let result = evaluator.eval().unwrap();
    assert_eq!(result.error(), Some(&NumError::DivisionByZero));
    let error = evaluator.error().cloned().unwrap();
    assert_eq!(error.kind, ErrorKind::RuntimeError);
    assert_eq!(error.message, "division by zero");
}

#[test]
fn unmatched_paren_reports_the_opener() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("(1+2");
    assert!(!evaluator.is_valid());
    let error = evaluator.error().cloned().unwrap();
    assert_eq!(error.kind, ErrorKind::CompileError);
    assert_eq!(error.position(), 0);
    assert!(evaluator.eval().is_err());
}

#[test]
fn empty_expression_has_no_error() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("   ");
    assert!(!evaluator.is_valid());
    assert_eq!(evaluator.error_message(), "");
    assert!(evaluator.eval().is_err());
}

#[test]
fn lexical_errors_surface_through_error() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("2 @ 3");
    assert!(!evaluator.is_valid());
    let error = evaluator.error().cloned().unwrap();
    assert_eq!(error.kind, ErrorKind::LexError);
    assert_eq!(error.position(), 2);
}

#[test]
fn variable_round_trip() {
    let mut evaluator = Evaluator::new();
    evaluator.set_variable("x", Number::new(5.0), VariableKind::UserDefined);
    assert_eq!(eval(&mut evaluator, "x+1").value(), 6.0);

    assert!(evaluator.unset_variable("x", false));
    let result = eval(&mut evaluator, "x+1");
    assert_eq!(result.error(), Some(&NumError::UnknownVariable("x".into())));
}

#[test]
fn assignment_through_eval() {
    let mut evaluator = Evaluator::new();
    assert_eq!(eval(&mut evaluator, "r = 3").value(), 3.0);
    let r = evaluator.get_variable("r").unwrap();
    assert_eq!(r.value, Number::new(3.0));
    assert_eq!(r.kind, VariableKind::UserDefined);

    assert_eq!(eval(&mut evaluator, "r = r + 1").value(), 4.0);
    assert_eq!(evaluator.get_variable("r").unwrap().value, Number::new(4.0));
}

#[test]
fn failed_assignment_keeps_previous_value() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "a = 1");
    let result = eval(&mut evaluator, "a = 1/0");
    assert!(result.is_error());
    assert_eq!(evaluator.get_variable("a").unwrap().value, Number::new(1.0));
}

#[rstest]
#[case("pi = 3")]
#[case("ans = 1")]
#[case("sin = 1")]
#[case("sqrt(x) = x")]
fn builtins_cannot_be_assigned(#[case] expression: &str) {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression(expression);
    assert!(!evaluator.is_valid());
    assert!(evaluator.error_message().contains("built-in"));
}

#[test]
fn user_function_round_trip() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("f(x) = x*2");
    assert!(evaluator.is_user_function_assign());
    evaluator.eval().unwrap();

    let f = evaluator.get_user_function("f").unwrap();
    assert_eq!(f.parameters, vec!["x"]);
    assert_eq!(f.body, "x*2");
    assert_eq!(eval(&mut evaluator, "f(3)").value(), 6.0);

    eval(&mut evaluator, "f(x) = x*10");
    assert_eq!(eval(&mut evaluator, "f(3)").value(), 30.0);

    evaluator.set_user_function(UserFunction::new("f", vec!["x".into()], "x - 1"));
    assert_eq!(eval(&mut evaluator, "f(3)").value(), 2.0);
}

#[test]
fn user_function_arity_and_removal() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "area(w, h) = w * h");
    assert_eq!(eval(&mut evaluator, "area(3, 4)").value(), 12.0);
    assert!(matches!(
        eval(&mut evaluator, "area(3)").error(),
        Some(NumError::InvalidArgumentCount { got: 1, .. })
    ));

    assert!(evaluator.unset_user_function("area"));
    assert_eq!(
        eval(&mut evaluator, "area(3, 4)").error(),
        Some(&NumError::UnknownFunction("area".into()))
    );
}

#[test]
fn user_functions_see_session_variables() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "k = 3");
    eval(&mut evaluator, "scale(x) = k x");
    assert_eq!(eval(&mut evaluator, "scale(2)").value(), 6.0);
    eval(&mut evaluator, "k = 5");
    assert_eq!(eval(&mut evaluator, "scale(2)").value(), 10.0);
}

#[test]
fn recursion_is_bounded() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "loop(x) = loop(x + 1)");
    assert_eq!(eval(&mut evaluator, "loop(1)").error(), Some(&NumError::TooDeep));

    let mut shallow = Evaluator::with_config(Config::default().with_max_depth(3));
    eval(&mut shallow, "a(x) = x + 1");
    eval(&mut shallow, "b(x) = a(x) + 1");
    eval(&mut shallow, "c(x) = b(x) + 1");
    eval(&mut shallow, "d(x) = c(x) + 1");
    assert_eq!(eval(&mut shallow, "c(0)").value(), 3.0);
    assert_eq!(eval(&mut shallow, "d(0)").error(), Some(&NumError::TooDeep));
}

#[test]
fn statements_run_in_order() {
    let mut evaluator = Evaluator::new();
    assert_eq!(eval(&mut evaluator, "a = 2; b = a * 3; b + 1").value(), 7.0);
    assert_eq!(evaluator.get_variable("a").unwrap().value, Number::new(2.0));
    assert_eq!(evaluator.get_variable("b").unwrap().value, Number::new(6.0));

    // The result of "a; b" is the result of "b".
    assert_eq!(eval(&mut evaluator, "100; 2 + 2").value(), 4.0);
}

#[test]
fn earlier_statements_survive_later_errors() {
    let mut evaluator = Evaluator::new();
    let result = eval(&mut evaluator, "a = 5; 1/0");
    assert!(result.is_error());
    assert_eq!(evaluator.get_variable("a").unwrap().value, Number::new(5.0));
}

#[test]
fn preview_does_not_touch_tables() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("p = 7; p * 2");
    assert_eq!(evaluator.eval_no_assign().unwrap().value(), 14.0);
    assert!(!evaluator.has_variable("p"));

    evaluator.set_expression("g(x) = x + 1");
    evaluator.eval_no_assign().unwrap();
    assert!(!evaluator.has_user_function("g"));

    assert_eq!(evaluator.eval().unwrap().value(), 0.0);
    assert!(evaluator.has_user_function("g"));
}

#[test]
fn ans_follows_successful_results() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("6 * 7");
    evaluator.eval_update_ans().unwrap();
    assert_eq!(evaluator.get_variable("ans").unwrap().value, Number::new(42.0));
    assert_eq!(eval(&mut evaluator, "ans + 1").value(), 43.0);

    evaluator.set_expression("1/0");
    evaluator.eval_update_ans().unwrap();
    assert_eq!(evaluator.get_variable("ans").unwrap().value, Number::new(42.0));

    evaluator.set_expression("h(x) = x");
    evaluator.eval_update_ans().unwrap();
    assert_eq!(evaluator.get_variable("ans").unwrap().value, Number::new(42.0));
}

#[test]
fn builtin_unset_needs_force() {
    let mut evaluator = Evaluator::new();
    assert!(evaluator.is_builtin_variable("pi"));
    assert!(!evaluator.unset_variable("pi", false));
    assert!(evaluator.has_variable("pi"));

    assert!(evaluator.unset_variable("pi", true));
    assert!(eval(&mut evaluator, "pi").is_error());

    evaluator.initialize_builtin_variables();
    assert!((eval(&mut evaluator, "pi").value() - std::f64::consts::PI).abs() < EPSILON);
}

#[test]
fn variable_listings() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "b = 2");
    eval(&mut evaluator, "a = 1");
    eval(&mut evaluator, "b = 3");

    let names: Vec<String> = evaluator
        .get_user_defined_variables()
        .into_iter()
        .map(|v| v.identifier)
        .collect();
    assert_eq!(names, vec!["b", "a"]);

    let with_ans: Vec<String> = evaluator
        .get_user_defined_variables_plus_ans()
        .into_iter()
        .map(|v| v.identifier)
        .collect();
    assert!(with_ans.contains(&"ans".to_string()));
    assert_eq!(with_ans.len(), 3);
    assert!(evaluator.get_variables().len() > with_ans.len());

    evaluator.unset_all_user_defined_variables();
    assert!(evaluator.get_user_defined_variables().is_empty());
    assert!(evaluator.has_variable("e"));
}

#[test]
fn reset_clears_user_state() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "v = 1");
    eval(&mut evaluator, "w(x) = x");
    evaluator.unset_variable("pi", true);
    evaluator.reset();
    assert_eq!(evaluator.expression(), "");
    assert!(!evaluator.has_variable("v"));
    assert!(!evaluator.has_user_function("w"));
    assert!(evaluator.is_builtin_variable("pi"));
}

#[test]
fn functions_in_use_lists_callees() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("sin(x) + f(cos(1)) + g");
    let used: Vec<String> = evaluator.functions_in_use().into_iter().collect();
    assert_eq!(used, vec!["cos", "f", "sin"]);
}

#[rstest]
#[case("  1 + 2  ", "1 + 2")]
#[case("1 + 2 =", "1 + 2")]
#[case("sin(1 + cos(2", "sin(1 + cos(2))")]
#[case("(1", "(1)")]
#[case("x = (2", "x = (2)")]
fn auto_fix_repairs_input(#[case] input: &str, #[case] expected: &str) {
    let evaluator = Evaluator::new();
    assert_eq!(evaluator.auto_fix(input), expected);
}

#[test]
fn builtin_function_errors_name_the_function() {
    let mut evaluator = Evaluator::new();
    assert_eq!(
        eval(&mut evaluator, "sqrt(-1)").error(),
        Some(&NumError::OutOfDomain { function: "sqrt".into() })
    );
    assert!(matches!(
        eval(&mut evaluator, "sqrt(1; 2)").error(),
        Some(NumError::InvalidArgumentCount { .. })
    ));
    assert_eq!(
        eval(&mut evaluator, "nosuch(1)").error(),
        Some(&NumError::UnknownFunction("nosuch".into()))
    );
}

#[test]
fn angle_mode_and_degree_sign() {
    let mut radians = Evaluator::new();
    assert!((eval(&mut radians, "sin(pi/2)").value() - 1.0).abs() < EPSILON);
    assert!((eval(&mut radians, "sin(90°)").value() - 1.0).abs() < EPSILON);

    let mut degrees = Evaluator::with_config(Config::default().with_angle(AngleMode::Degree));
    assert!((eval(&mut degrees, "sin(90)").value() - 1.0).abs() < EPSILON);
    assert!((eval(&mut degrees, "arccos(0)").value() - 90.0).abs() < EPSILON);
}

#[test]
fn unit_conversion() {
    let mut evaluator = Evaluator::new();
    assert!((eval(&mut evaluator, "3 foot in meter").value() - 0.9144).abs() < EPSILON);
    assert!((eval(&mut evaluator, "2 hour -> minute").value() - 120.0).abs() < EPSILON);
    assert!((eval(&mut evaluator, "1 mile + 1 kilometer in meter").value() - 2609.344).abs() < EPSILON);
    assert_eq!(
        eval(&mut evaluator, "1 in parsec").error(),
        Some(&NumError::UnknownVariable("parsec".into()))
    );
}

#[test]
fn comma_radix_session() {
    let mut evaluator = Evaluator::with_config(Config::default().with_radix(RadixChar::Comma));
    assert_eq!(eval(&mut evaluator, "1,5 + 1").value(), 2.5);
    assert_eq!(eval(&mut evaluator, "max(1,5; 2,5)").value(), 2.5);
}

#[test]
fn changing_config_recompiles() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("1,5");
    assert!(!evaluator.is_valid());
    evaluator.set_config(Config::default().with_radix(RadixChar::Comma));
    assert!(evaluator.is_valid());
    assert_eq!(evaluator.eval().unwrap().value(), 1.5);
}

#[test]
fn independent_sessions() {
    let mut first = Evaluator::new();
    let mut second = Evaluator::new();
    eval(&mut first, "shared = 1");
    assert!(first.has_variable("shared"));
    assert!(!second.has_variable("shared"));
    assert!(eval(&mut second, "shared").is_error());
}

#[test]
fn dump_shows_compiled_program() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression("x = 1 + 2");
    let dump = evaluator.dump();
    assert!(dump.contains("add"));
    assert!(dump.contains("assign x"));

    evaluator.set_expression("(1");
    assert!(evaluator.dump().starts_with("error:"));
}

#[test]
fn huge_depth_limits_still_end_in_too_deep() {
    let config = Config::default().with_max_depth(10_000_000);
    assert_eq!(config.max_depth, MAX_DEPTH_LIMIT);

    let mut evaluator = Evaluator::with_config(config);
    let value = eval(&mut evaluator, "f(x) = f(x + 1); f(0)");
    assert_eq!(value.error(), Some(&NumError::TooDeep));
}

#[test]
fn long_power_chain_is_rejected_cleanly() {
    let mut evaluator = Evaluator::new();
    evaluator.set_expression(&("2^".repeat(2_000) + "1"));
    assert!(!evaluator.is_valid());
    assert!(evaluator.error_message().contains("nested too deeply"));
}

#[test]
fn unsetting_a_function_drops_its_compiled_body() {
    let mut evaluator = Evaluator::new();
    eval(&mut evaluator, "sq(x) = x * x");
    assert_eq!(eval(&mut evaluator, "sq(4)").value(), 16.0);
    assert_eq!(evaluator.cached_function_count(), 1);

    assert!(evaluator.unset_user_function("sq"));
    assert_eq!(evaluator.cached_function_count(), 0);
}

#[test]
fn overflowing_literal_is_a_runtime_error() {
    let mut evaluator = Evaluator::new();
    let value = eval(&mut evaluator, "1e400 + 1");
    assert_eq!(value.error(), Some(&NumError::Overflow));
    assert_eq!(evaluator.error().map(|e| e.kind), Some(ErrorKind::RuntimeError));
}
