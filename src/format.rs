use crate::number::Number;
use clap::ValueEnum;

/// Significant digits shown in general mode when no precision is given.
const GENERAL_DIGITS: usize = 15;
const FIXED_DECIMALS: usize = 4;
const SCIENTIFIC_DECIMALS: usize = 6;

/// How results are rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DisplayMode {
    /// Plain decimal, switching to an exponent for very large or small values.
    #[default]
    General,
    Fixed,
    Scientific,
}

/// Renders `number` for display. `precision` counts significant digits in
/// general mode and decimals otherwise. Error values render as their message.
pub fn format_number(number: &Number, mode: DisplayMode, precision: Option<usize>) -> String {
    if let Some(error) = number.error() {
        return error.to_string();
    }

    let value = number.value();
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // No "-0".
    let value = if value == 0.0 { 0.0 } else { value };

    match mode {
        DisplayMode::General => general(value, precision.unwrap_or(GENERAL_DIGITS).clamp(1, 17)),
        DisplayMode::Fixed => format!("{:.*}", precision.unwrap_or(FIXED_DECIMALS), value),
        DisplayMode::Scientific => {
            format!("{:.*e}", precision.unwrap_or(SCIENTIFIC_DECIMALS), value)
        }
    }
}

fn general(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    // Exponent after rounding to `digits` significant digits.
    let rounded = format!("{:.*e}", digits - 1, value);
    let exponent = rounded
        .split_once('e')
        .and_then(|(_, exp)| exp.parse::<i32>().ok())
        .unwrap_or(0);

    if exponent < -5 || exponent >= digits as i32 {
        match rounded.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", trim_zeros(mantissa), exp),
            None => rounded,
        }
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
