//! Built-in functions callable from expressions.
//!
//! Each entry declares its arity; [`BuiltinFunction::call`] checks the
//! argument count and error-tagged arguments before the numeric body runs,
//! so bodies only see plain values.

use crate::config::AngleMode;
use crate::error::NumError;
use crate::number::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Between(lo, hi) => (lo..=hi).contains(&count),
        }
    }

    fn describe(self) -> String {
        let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
        match self {
            Arity::Exact(n) => format!("{} {}", n, plural(n)),
            Arity::AtLeast(n) => format!("at least {} {}", n, plural(n)),
            Arity::Between(lo, hi) => format!("{} to {} arguments", lo, hi),
        }
    }
}

/// Why a function body rejected its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Domain,
    DivisionByZero,
    IntegerRequired,
}

type Body = fn(&[f64], AngleMode) -> Result<f64, Failure>;

#[derive(Debug)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub arity: Arity,
    pub description: &'static str,
    body: Body,
}

impl BuiltinFunction {
    pub fn call(&self, args: &[Number], angle: AngleMode) -> Number {
        if !self.arity.accepts(args.len()) {
            return Number::from_error(NumError::InvalidArgumentCount {
                function: self.name.to_string(),
                expected: self.arity.describe(),
                got: args.len(),
            });
        }
        if let Some(poisoned) = args.iter().find(|a| a.is_error()) {
            return poisoned.clone();
        }

        let values: Vec<f64> = args.iter().map(Number::value).collect();
        match (self.body)(&values, angle) {
            Ok(value) => Number::checked(value),
            Err(Failure::Domain) => Number::from_error(NumError::OutOfDomain {
                function: self.name.to_string(),
            }),
            Err(Failure::DivisionByZero) => Number::from_error(NumError::DivisionByZero),
            Err(Failure::IntegerRequired) => Number::from_error(NumError::IntegerRequired {
                operation: self.name,
            }),
        }
    }
}

pub fn find(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|f| f.name == name)
}

pub fn all() -> &'static [BuiltinFunction] {
    BUILTINS
}

fn to_radians(x: f64, angle: AngleMode) -> f64 {
    match angle {
        AngleMode::Radian => x,
        AngleMode::Degree => x.to_radians(),
    }
}

fn from_radians(x: f64, angle: AngleMode) -> f64 {
    match angle {
        AngleMode::Radian => x,
        AngleMode::Degree => x.to_degrees(),
    }
}

fn require(condition: bool) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::Domain)
    }
}

fn integer(x: f64) -> Result<i64, Failure> {
    if x.fract() != 0.0 || x.abs() > 9_007_199_254_740_992.0 {
        return Err(Failure::IntegerRequired);
    }
    Ok(x as i64)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn round_to(x: f64, digits: f64, op: fn(f64) -> f64) -> Result<f64, Failure> {
    let digits = integer(digits)?;
    require(digits.abs() <= 300)?;
    let scale = 10f64.powi(digits as i32);
    Ok(op(x * scale) / scale)
}

fn combinations(n: f64, k: f64) -> Result<f64, Failure> {
    let (n, k) = (integer(n)?, integer(k)?);
    require(n >= 0 && k >= 0 && k <= n)?;
    let k = k.min(n - k);
    Ok((0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64).round())
}

fn permutations(n: f64, k: f64) -> Result<f64, Failure> {
    let (n, k) = (integer(n)?, integer(k)?);
    require(n >= 0 && k >= 0 && k <= n)?;
    Ok((0..k).fold(1.0, |acc, i| acc * (n - i) as f64))
}

macro_rules! builtin {
    ($name:expr, $arity:expr, $description:expr, $body:expr) => {
        BuiltinFunction {
            name: $name,
            arity: $arity,
            description: $description,
            body: $body,
        }
    };
}

static BUILTINS: &[BuiltinFunction] = &[
    // general
    builtin!("abs", Arity::Exact(1), "absolute value", |a, _| Ok(a[0].abs())),
    builtin!("sgn", Arity::Exact(1), "sign", |a, _| {
        Ok(if a[0] == 0.0 { 0.0 } else { a[0].signum() })
    }),
    builtin!("sqrt", Arity::Exact(1), "square root", |a, _| {
        require(a[0] >= 0.0)?;
        Ok(a[0].sqrt())
    }),
    builtin!("cbrt", Arity::Exact(1), "cube root", |a, _| Ok(a[0].cbrt())),
    builtin!("exp", Arity::Exact(1), "exponential", |a, _| Ok(a[0].exp())),
    builtin!("ln", Arity::Exact(1), "natural logarithm", |a, _| {
        require(a[0] > 0.0)?;
        Ok(a[0].ln())
    }),
    builtin!("lg", Arity::Exact(1), "base-10 logarithm", |a, _| {
        require(a[0] > 0.0)?;
        Ok(a[0].log10())
    }),
    builtin!("lb", Arity::Exact(1), "base-2 logarithm", |a, _| {
        require(a[0] > 0.0)?;
        Ok(a[0].log2())
    }),
    builtin!("log", Arity::Exact(2), "logarithm: log(base, x)", |a, _| {
        require(a[0] > 0.0 && a[0] != 1.0 && a[1] > 0.0)?;
        Ok(a[1].ln() / a[0].ln())
    }),
    // trigonometry
    builtin!("sin", Arity::Exact(1), "sine", |a, m| Ok(to_radians(a[0], m).sin())),
    builtin!("cos", Arity::Exact(1), "cosine", |a, m| Ok(to_radians(a[0], m).cos())),
    builtin!("tan", Arity::Exact(1), "tangent", |a, m| Ok(to_radians(a[0], m).tan())),
    builtin!("cot", Arity::Exact(1), "cotangent", |a, m| {
        let t = to_radians(a[0], m).tan();
        if t == 0.0 {
            return Err(Failure::DivisionByZero);
        }
        Ok(1.0 / t)
    }),
    builtin!("sec", Arity::Exact(1), "secant", |a, m| {
        Ok(1.0 / to_radians(a[0], m).cos())
    }),
    builtin!("csc", Arity::Exact(1), "cosecant", |a, m| {
        let s = to_radians(a[0], m).sin();
        if s == 0.0 {
            return Err(Failure::DivisionByZero);
        }
        Ok(1.0 / s)
    }),
    builtin!("arcsin", Arity::Exact(1), "inverse sine", |a, m| {
        require(a[0].abs() <= 1.0)?;
        Ok(from_radians(a[0].asin(), m))
    }),
    builtin!("arccos", Arity::Exact(1), "inverse cosine", |a, m| {
        require(a[0].abs() <= 1.0)?;
        Ok(from_radians(a[0].acos(), m))
    }),
    builtin!("arctan", Arity::Exact(1), "inverse tangent", |a, m| {
        Ok(from_radians(a[0].atan(), m))
    }),
    builtin!("arctan2", Arity::Exact(2), "angle of the point (x, y)", |a, m| {
        Ok(from_radians(a[1].atan2(a[0]), m))
    }),
    builtin!("sinh", Arity::Exact(1), "hyperbolic sine", |a, _| Ok(a[0].sinh())),
    builtin!("cosh", Arity::Exact(1), "hyperbolic cosine", |a, _| Ok(a[0].cosh())),
    builtin!("tanh", Arity::Exact(1), "hyperbolic tangent", |a, _| Ok(a[0].tanh())),
    builtin!("arsinh", Arity::Exact(1), "inverse hyperbolic sine", |a, _| Ok(a[0].asinh())),
    builtin!("arcosh", Arity::Exact(1), "inverse hyperbolic cosine", |a, _| {
        require(a[0] >= 1.0)?;
        Ok(a[0].acosh())
    }),
    builtin!("artanh", Arity::Exact(1), "inverse hyperbolic tangent", |a, _| {
        require(a[0].abs() < 1.0)?;
        Ok(a[0].atanh())
    }),
    builtin!("radians", Arity::Exact(1), "degrees to radians", |a, _| Ok(a[0].to_radians())),
    builtin!("degrees", Arity::Exact(1), "radians to degrees", |a, _| Ok(a[0].to_degrees())),
    // rounding
    builtin!("floor", Arity::Exact(1), "round down", |a, _| Ok(a[0].floor())),
    builtin!("ceil", Arity::Exact(1), "round up", |a, _| Ok(a[0].ceil())),
    builtin!("round", Arity::Between(1, 2), "round to nearest", |a, _| {
        round_to(a[0], a.get(1).copied().unwrap_or(0.0), f64::round)
    }),
    builtin!("trunc", Arity::Between(1, 2), "round toward zero", |a, _| {
        round_to(a[0], a.get(1).copied().unwrap_or(0.0), f64::trunc)
    }),
    builtin!("frac", Arity::Exact(1), "fractional part", |a, _| Ok(a[0].fract())),
    // integer arithmetic
    builtin!("idiv", Arity::Exact(2), "integer quotient", |a, _| {
        if a[1] == 0.0 {
            return Err(Failure::DivisionByZero);
        }
        Ok((a[0] / a[1]).trunc())
    }),
    builtin!("gcd", Arity::AtLeast(2), "greatest common divisor", |a, _| {
        let mut acc = 0u64;
        for x in a {
            acc = gcd(acc, integer(*x)?.unsigned_abs());
        }
        Ok(acc as f64)
    }),
    builtin!("lcm", Arity::AtLeast(2), "least common multiple", |a, _| {
        let mut acc = 1u64;
        for x in a {
            let n = integer(*x)?.unsigned_abs();
            if n == 0 {
                return Ok(0.0);
            }
            acc = (acc / gcd(acc, n)).checked_mul(n).ok_or(Failure::Domain)?;
        }
        Ok(acc as f64)
    }),
    builtin!("ncr", Arity::Exact(2), "combinations", |a, _| combinations(a[0], a[1])),
    builtin!("npr", Arity::Exact(2), "permutations", |a, _| permutations(a[0], a[1])),
    // aggregates
    builtin!("min", Arity::AtLeast(1), "smallest argument", |a, _| {
        Ok(a.iter().copied().fold(f64::INFINITY, f64::min))
    }),
    builtin!("max", Arity::AtLeast(1), "largest argument", |a, _| {
        Ok(a.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }),
    builtin!("sum", Arity::AtLeast(1), "sum of arguments", |a, _| Ok(a.iter().sum())),
    builtin!("product", Arity::AtLeast(1), "product of arguments", |a, _| {
        Ok(a.iter().product())
    }),
    builtin!("average", Arity::AtLeast(1), "arithmetic mean", |a, _| {
        Ok(a.iter().sum::<f64>() / a.len() as f64)
    }),
    builtin!("hypot", Arity::AtLeast(1), "Euclidean norm", |a, _| {
        Ok(a.iter().map(|x| x * x).sum::<f64>().sqrt())
    }),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(name: &str, args: &[f64]) -> Number {
        let args: Vec<Number> = args.iter().copied().map(Number::new).collect();
        find(name)
            .map(|f| f.call(&args, AngleMode::Radian))
            .unwrap_or_else(|| Number::from_error(NumError::UnknownFunction(name.into())))
    }

    #[rstest]
    #[case("abs", &[-3.0], 3.0)]
    #[case("sqrt", &[16.0], 4.0)]
    #[case("log", &[2.0, 8.0], 3.0)]
    #[case("lg", &[1000.0], 3.0)]
    #[case("round", &[2.567, 2.0], 2.57)]
    #[case("trunc", &[-2.7], -2.0)]
    #[case("gcd", &[12.0, 18.0, 8.0], 2.0)]
    #[case("lcm", &[4.0, 6.0], 12.0)]
    #[case("ncr", &[5.0, 2.0], 10.0)]
    #[case("npr", &[5.0, 2.0], 20.0)]
    #[case("max", &[1.0, 7.0, 3.0], 7.0)]
    #[case("average", &[1.0, 2.0, 3.0], 2.0)]
    fn evaluates(#[case] name: &str, #[case] args: &[f64], #[case] expected: f64) {
        let result = call(name, args);
        assert!(!result.is_error(), "{} failed: {}", name, result);
        assert!((result.value() - expected).abs() < 1e-9, "{} = {}", name, result);
    }

    #[rstest]
    #[case("sqrt", &[-1.0])]
    #[case("ln", &[0.0])]
    #[case("arcsin", &[2.0])]
    #[case("log", &[1.0, 5.0])]
    #[case("ncr", &[2.0, 5.0])]
    fn domain_errors_name_the_function(#[case] name: &str, #[case] args: &[f64]) {
        assert_eq!(
            call(name, args).error(),
            Some(&NumError::OutOfDomain {
                function: name.to_string()
            })
        );
    }

    #[test]
    fn arity_is_checked() {
        let result = call("sin", &[1.0, 2.0]);
        assert_eq!(
            result.error(),
            Some(&NumError::InvalidArgumentCount {
                function: "sin".to_string(),
                expected: "1 argument".to_string(),
                got: 2,
            })
        );
        assert!(call("max", &[]).is_error());
    }

    #[test]
    fn degree_mode() {
        let sin = find("sin").map(|f| f.call(&[Number::new(90.0)], AngleMode::Degree));
        assert!(sin.is_some_and(|n| (n.value() - 1.0).abs() < 1e-12));
        let asin = find("arcsin").map(|f| f.call(&[Number::new(1.0)], AngleMode::Degree));
        assert!(asin.is_some_and(|n| (n.value() - 90.0).abs() < 1e-9));
    }

    #[test]
    fn poisoned_argument_propagates() {
        let args = [Number::new(1.0), Number::from_error(NumError::DivisionByZero)];
        let result = find("max").map(|f| f.call(&args, AngleMode::Radian));
        assert_eq!(
            result.and_then(|n| n.error().cloned()),
            Some(NumError::DivisionByZero)
        );
    }
}
