use log::{trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::core::escape::avoid_wrapping;
use crate::types::{format_float, Number, Value};

use super::{arg_int, arg_text, ArgSpec, FnFilter};

static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-])?(\d*)(?:\.(\d*))?(?:[eE]([+-]?\d+))?$").unwrap());

/// Inputs whose digit count plus exponent magnitude exceed this are
/// returned untouched by `floatformat`.
const MAX_FLOATFORMAT_DIGITS: usize = 200;

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("add", ArgSpec::Required, add),
        FnFilter::new("get_digit", ArgSpec::Required, get_digit),
        FnFilter::new("divisibleby", ArgSpec::Required, divisibleby),
        FnFilter::new("floatformat", ArgSpec::Optional, floatformat).safe(),
        FnFilter::new("filesizeformat", ArgSpec::None, filesizeformat).safe(),
    ]
}

fn add(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let Some(arg) = arg else {
        return Value::from("");
    };
    if let (Some(a), Some(b)) = (value.to_int(), arg.to_int()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    match (&value, arg) {
        (Value::String(a), Value::String(b)) => Value::from(format!("{}{}", a.as_str(), b.as_str())),
        (Value::List(a), Value::List(b)) => Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>()),
        (Value::Number(a), Value::Number(b)) => Value::from(a.as_f64() + b.as_f64()),
        _ => {
            trace!("add: cannot combine {} and {}", value.kind(), arg.kind());
            Value::from("")
        }
    }
}

fn get_digit(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let (Some(position), Some(number)) = (arg_int(arg), value.to_int()) else {
        return value;
    };
    if position < 1 {
        return value;
    }
    let text = number.to_string();
    let digit = text
        .chars()
        .rev()
        .nth(position as usize - 1)
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0);
    Value::from(digit)
}

fn divisibleby(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    match (value.to_int(), arg_int(arg)) {
        (Some(_), Some(0)) | (None, _) | (_, None) => Value::from(""),
        (Some(n), Some(d)) => Value::from(n.checked_rem(d).is_none_or(|r| r == 0)),
    }
}

/// An exact decimal: `digits * 10^exponent`.
#[derive(Debug, Clone, PartialEq)]
struct Decimal {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl Decimal {
    fn parse(text: &str) -> Option<Decimal> {
        let caps = DECIMAL.captures(text.trim())?;
        let int_part = caps.get(2).map_or("", |m| m.as_str());
        let frac_part = caps.get(3).map_or("", |m| m.as_str());
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let exponent: i64 = match caps.get(4) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let mut digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).map(|b| b - b'0').collect();
        let leading = digits.iter().take_while(|d| **d == 0).count().min(digits.len() - 1);
        digits.drain(..leading);
        Some(Decimal {
            negative: caps.get(1).is_some_and(|m| m.as_str() == "-"),
            digits,
            exponent: exponent - frac_part.len() as i64,
        })
    }

    fn is_zero(&self) -> bool {
        self.digits.iter().all(|d| *d == 0)
    }

    fn is_integral(&self) -> bool {
        if self.exponent >= 0 {
            return true;
        }
        let fraction = (-self.exponent) as usize;
        let skip = self.digits.len().saturating_sub(fraction);
        self.digits[skip..].iter().all(|d| *d == 0)
    }

    /// Integer part as a plain string, sign included.
    fn integer_string(&self) -> String {
        let mut digits: Vec<u8> = self.digits.clone();
        if self.exponent >= 0 {
            digits.extend(std::iter::repeat_n(0, self.exponent as usize));
        } else {
            digits.truncate(digits.len().saturating_sub((-self.exponent) as usize));
        }
        let text: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        let text = text.trim_start_matches('0');
        match (text.is_empty(), self.negative) {
            (true, _) => "0".to_string(),
            (false, true) => format!("-{}", text),
            (false, false) => text.to_string(),
        }
    }

    /// Rounds half away from zero to `places` fractional digits.
    fn quantize(&self, places: usize) -> Decimal {
        let target = -(places as i64);
        let mut digits = self.digits.clone();
        if self.exponent >= target {
            digits.extend(std::iter::repeat_n(0, (self.exponent - target) as usize));
        } else {
            let drop = (target - self.exponent) as usize;
            while digits.len() <= drop {
                digits.insert(0, 0);
            }
            let round_up = digits[digits.len() - drop] >= 5;
            digits.truncate(digits.len() - drop);
            if round_up {
                let mut i = digits.len();
                loop {
                    if i == 0 {
                        digits.insert(0, 1);
                        break;
                    }
                    i -= 1;
                    if digits[i] == 9 {
                        digits[i] = 0;
                    } else {
                        digits[i] += 1;
                        break;
                    }
                }
            }
        }
        Decimal { negative: self.negative, digits, exponent: target }
    }

    /// Fixed-point rendering with exactly `-exponent` fractional digits.
    fn to_fixed(&self) -> String {
        let places = (-self.exponent).max(0) as usize;
        let mut text: String = self.digits.iter().map(|d| char::from(b'0' + d)).collect();
        while text.len() <= places {
            text.insert(0, '0');
        }
        let (int_part, frac_part) = text.split_at(text.len() - places);
        let int_part = match int_part.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        let sign = if self.negative && !self.is_zero() { "-" } else { "" };
        if places == 0 {
            format!("{}{}", sign, int_part)
        } else {
            format!("{}{}.{}", sign, int_part, frac_part)
        }
    }
}

/// Decimal view of a filter input; `None` when it is not numeric.
fn decimal_input(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(Number::Int(i)) => Decimal::parse(&i.to_string()),
        Value::Number(Number::Float(f)) => Decimal::parse(&format_float(*f)),
        Value::Bool(b) => Decimal::parse(if *b { "1.0" } else { "0.0" }),
        Value::String(s) => {
            Decimal::parse(s.as_str()).or_else(|| value.to_float().and_then(|f| Decimal::parse(&format_float(f))))
        }
        _ => None,
    }
}

fn floatformat(value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
    let input = value.to_string();
    let non_finite = value.to_float().is_some_and(|f| !f.is_finite());
    let Some(decimal) = decimal_input(&value) else {
        if non_finite {
            return Value::from(input);
        }
        return Value::from("");
    };

    let mut spec = arg_text(arg).unwrap_or_else(|| "-1".to_string());
    let mut force_grouping = false;
    let mut use_l10n = true;
    if spec.ends_with("gu") || spec.ends_with("ug") {
        force_grouping = true;
        use_l10n = false;
        spec.truncate(spec.len() - 2);
    } else if spec.ends_with('g') {
        force_grouping = true;
        spec.pop();
    } else if spec.ends_with('u') {
        use_l10n = false;
        spec.pop();
    }
    let precision = if spec.is_empty() {
        -1
    } else {
        match Value::from(spec.as_str()).to_int() {
            Some(p) => p,
            None => {
                warn!("floatformat: invalid precision '{}'", spec);
                return Value::from(input);
            }
        }
    };

    if decimal.digits.len() + decimal.exponent.unsigned_abs() as usize > MAX_FLOATFORMAT_DIGITS {
        warn!("floatformat: refusing to format {} digits", decimal.digits.len());
        return Value::from(input);
    }

    let formatter = &ctx.services().number_formatter;
    if decimal.is_integral() && precision <= 0 {
        let integer = decimal.integer_string();
        return Value::safe_string(formatter.format_number(&integer, Some(0), force_grouping, use_l10n));
    }

    let places = precision.unsigned_abs() as usize;
    let mut number = decimal.quantize(places).to_fixed();
    if precision < 0 && number.contains('.') {
        number = number.trim_end_matches('0').trim_end_matches('.').to_string();
        if number == "-0" {
            number = "0".to_string();
        }
    }
    let decimals = number.split_once('.').map_or(0, |(_, frac)| frac.len());
    Value::safe_string(formatter.format_number(&number, Some(decimals), force_grouping, use_l10n))
}

fn filesizeformat(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let Some(bytes) = value.to_int() else {
        return Value::from(avoid_wrapping("0 bytes"));
    };
    const KB: f64 = 1024.0;
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    let magnitude = bytes.unsigned_abs();
    let formatted = if magnitude < 1024 {
        if magnitude == 1 { "1 byte".to_string() } else { format!("{} bytes", magnitude) }
    } else {
        let mut size = magnitude as f64 / KB;
        let mut unit = 0;
        while size >= KB && unit < UNITS.len() - 1 {
            size /= KB;
            unit += 1;
        }
        let number = format!("{:.1}", size);
        let number = ctx.services().number_formatter.format_number(&number, Some(1), false, true);
        format!("{} {}", number, UNITS[unit])
    };
    let formatted = avoid_wrapping(&formatted);
    if bytes < 0 {
        Value::from(format!("-{}", formatted))
    } else {
        Value::from(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::run;

    fn ff(value: Value, arg: &str) -> String {
        run("floatformat", value, Some(Value::from(arg)), true).to_string()
    }

    #[test]
    fn decimal_parsing() {
        let d = Decimal::parse("0034.500").unwrap();
        assert_eq!(d.digits, vec![3, 4, 5, 0, 0]);
        assert_eq!(d.exponent, -3);
        assert!(Decimal::parse("1e3").unwrap().is_integral());
        assert!(Decimal::parse("abc").is_none());
        assert!(Decimal::parse(".").is_none());
    }

    #[test]
    fn fixed_precision() {
        assert_eq!(ff(Value::from(34.23234), "3"), "34.232");
        assert_eq!(ff(Value::from(34.0), "3"), "34.000");
        assert_eq!(ff(Value::from(7), "2"), "7.00");
        assert_eq!(ff(Value::from("0.0005"), "3"), "0.001");
    }

    #[test]
    fn negative_precision_trims() {
        assert_eq!(ff(Value::from(34.0), "-1"), "34");
        assert_eq!(ff(Value::from(34.26), "-3"), "34.26");
        assert_eq!(ff(Value::from(34.23234), "-3"), "34.232");
        assert_eq!(run("floatformat", Value::from(34.26), None, true).to_string(), "34.3");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(ff(Value::from("2.5"), "0"), "3");
        assert_eq!(ff(Value::from("-2.5"), "0"), "-3");
        assert_eq!(ff(Value::from("0.125"), "2"), "0.13");
        assert_eq!(ff(Value::from("9.995"), "2"), "10.00");
        assert_eq!(ff(Value::from("-0.001"), "2"), "0.00");
    }

    #[test]
    fn grouping_and_localization_flags() {
        assert_eq!(ff(Value::from(10000), "g"), "10,000");
        assert_eq!(ff(Value::from(66666.666), "2g"), "66,666.67");
        assert_eq!(ff(Value::from(66666.666), "2u"), "66666.67");
        assert_eq!(ff(Value::from(66666.666), "2gu"), "66,666.67");
    }

    #[test]
    fn invalid_input_degrades() {
        assert_eq!(ff(Value::from("foo"), "2"), "");
        assert_eq!(ff(Value::from(1.5), "bar"), "1.5");
        assert_eq!(ff(Value::from("inf"), "2"), "inf");
        let huge = format!("1e{}", 300);
        assert_eq!(ff(Value::from(huge.as_str()), "2"), huge);
        assert!(run("floatformat", Value::from(1.5), None, true).is_safe());
    }

    #[test]
    fn arithmetic_filters() {
        assert_eq!(run("add", Value::from("3"), Some(Value::from(4)), true), Value::from(7));
        assert_eq!(run("add", Value::from("ab"), Some(Value::from("cd")), true).to_string(), "abcd");
        assert_eq!(run("add", Value::from("ab"), Some(Value::from(1)), true).to_string(), "");
        assert_eq!(run("get_digit", Value::from(123), Some(Value::from(1)), true), Value::from(3));
        assert_eq!(run("get_digit", Value::from(123), Some(Value::from(5)), true), Value::from(0));
        assert_eq!(run("get_digit", Value::from("x"), Some(Value::from(1)), true).to_string(), "x");
        assert_eq!(run("divisibleby", Value::from(21), Some(Value::from(3)), true), Value::from(true));
        assert_eq!(run("divisibleby", Value::from(21), Some(Value::from(0)), true).to_string(), "");
        assert_eq!(run("divisibleby", Value::from(i64::MIN), Some(Value::from(-1)), true), Value::from(true));
    }

    #[test]
    fn file_sizes() {
        let size = |n: i64| run("filesizeformat", Value::from(n), None, true).to_string();
        assert_eq!(size(1), "1\u{a0}byte");
        assert_eq!(size(1023), "1023\u{a0}bytes");
        assert_eq!(size(1024), "1.0\u{a0}KB");
        assert_eq!(size(10 * 1024 * 1024), "10.0\u{a0}MB");
        assert_eq!(size(-2048), "-2.0\u{a0}KB");
        assert_eq!(run("filesizeformat", Value::from("x"), None, true).to_string(), "0\u{a0}bytes");
    }
}
