use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::core::escape::{escape, escapejs};
use crate::types::{format_float, Number, Value};

use super::{arg_int, arg_text, ArgSpec, FnFilter};

static TITLE_APOSTROPHE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]'[A-Z]").unwrap());
static TITLE_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[A-Z]").unwrap());
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());
static FORMAT_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-+ #0]*)(\d*)(?:\.(\d+))?([sdifFeExXorc])(.*)$").unwrap());

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("addslashes", ArgSpec::None, addslashes).safe().string_only(),
        FnFilter::new("capfirst", ArgSpec::None, capfirst).safe().string_only(),
        FnFilter::new("escapejs", ArgSpec::None, escapejs_filter).string_only(),
        FnFilter::new("linenumbers", ArgSpec::None, linenumbers).safe().needs_autoescape().string_only(),
        FnFilter::new("lower", ArgSpec::None, lower).safe().string_only(),
        FnFilter::new("upper", ArgSpec::None, upper).string_only(),
        FnFilter::new("make_list", ArgSpec::None, make_list).string_only(),
        FnFilter::new("slugify", ArgSpec::None, slugify).safe().string_only(),
        FnFilter::new("stringformat", ArgSpec::Required, stringformat).safe(),
        FnFilter::new("title", ArgSpec::None, title).safe().string_only(),
        FnFilter::new("truncatechars", ArgSpec::Required, truncatechars).safe().string_only(),
        FnFilter::new("truncatewords", ArgSpec::Required, truncatewords).safe().string_only(),
        FnFilter::new("urlencode", ArgSpec::Optional, urlencode).string_only(),
        FnFilter::new("iriencode", ArgSpec::None, iriencode).safe().string_only(),
        FnFilter::new("wordcount", ArgSpec::None, wordcount).string_only(),
        FnFilter::new("wordwrap", ArgSpec::Required, wordwrap).safe().string_only(),
        FnFilter::new("ljust", ArgSpec::Required, ljust).safe().string_only(),
        FnFilter::new("rjust", ArgSpec::Required, rjust).safe().string_only(),
        FnFilter::new("center", ArgSpec::Required, center).safe().string_only(),
        FnFilter::new("cut", ArgSpec::Required, cut).string_only(),
        FnFilter::new("phone2numeric", ArgSpec::None, phone2numeric).safe().string_only(),
    ]
}

fn text(value: &Value) -> String {
    value.to_str().into_string()
}

fn addslashes(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(text(&value).replace('\\', "\\\\").replace('"', "\\\"").replace('\'', "\\'"))
}

fn capfirst(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    let s = text(&value);
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => Value::from(first.to_uppercase().chain(chars).collect::<String>()),
        None => Value::from(s),
    }
}

fn escapejs_filter(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(escapejs(&text(&value)))
}

fn linenumbers(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let raw = text(&value);
    let lines: Vec<&str> = raw.split('\n').collect();
    let width = lines.len().to_string().len();
    let escape_lines = ctx.autoescape() && !value.is_safe();
    let numbered: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line = if escape_lines { escape(line) } else { line.to_string() };
            format!("{:0width$}. {}", i + 1, line, width = width)
        })
        .collect();
    Value::safe_string(numbered.join("\n"))
}

fn lower(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(text(&value).to_lowercase())
}

fn upper(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(text(&value).to_uppercase())
}

fn make_list(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(text(&value).chars().map(|c| Value::from(c.to_string())).collect::<Vec<_>>())
}

/// Folds common Latin letters with diacritics onto their ASCII base letter.
fn fold_to_ascii(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => "A",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ď' => "d",
        'Ď' => "D",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "E",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "I",
        'ñ' | 'ń' | 'ň' => "n",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ō' => "O",
        'ř' => "r",
        'Ř' => "R",
        'ś' | 'š' => "s",
        'Ś' | 'Š' => "S",
        'ť' => "t",
        'Ť' => "T",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ź' | 'ż' | 'ž' => "z",
        'Ź' | 'Ż' | 'Ž' => "Z",
        _ => return None,
    };
    Some(folded)
}

fn slugify(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    let ascii: String = text(&value)
        .chars()
        .filter_map(|c| {
            if c.is_ascii() {
                Some(c.to_string())
            } else {
                fold_to_ascii(c).map(str::to_string)
            }
        })
        .collect();
    let stripped = SLUG_STRIP.replace_all(&ascii.to_lowercase(), "").into_owned();
    let hyphenated = SLUG_HYPHENS.replace_all(&stripped, "-").into_owned();
    Value::from(hyphenated.trim_matches(|c| c == '-' || c == '_'))
}

fn title(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    let mut titled = String::new();
    let mut previous_cased = false;
    for c in text(&value).chars() {
        if previous_cased {
            titled.extend(c.to_lowercase());
        } else {
            titled.extend(c.to_uppercase());
        }
        previous_cased = c.is_lowercase() || c.is_uppercase();
    }
    let fixed = TITLE_APOSTROPHE.replace_all(&titled, |caps: &regex::Captures| caps[0].to_lowercase());
    let fixed = TITLE_DIGIT.replace_all(&fixed, |caps: &regex::Captures| caps[0].to_lowercase());
    Value::from(fixed.into_owned())
}

fn truncatechars(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let Some(length) = arg_int(arg) else {
        return value;
    };
    if length <= 0 {
        return Value::from("");
    }
    let s = text(&value);
    let length = length as usize;
    if s.chars().count() <= length {
        return Value::from(s);
    }
    let mut truncated: String = s.chars().take(length - 1).collect();
    truncated.push('…');
    Value::from(truncated)
}

fn truncatewords(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let Some(length) = arg_int(arg) else {
        return value;
    };
    if length <= 0 {
        return Value::from("");
    }
    let s = text(&value);
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() > length as usize {
        let kept = words[..length as usize].join(" ");
        if kept.ends_with(" …") {
            return Value::from(kept);
        }
        return Value::from(format!("{} …", kept));
    }
    Value::from(words.join(" "))
}

/// Percent-encodes everything except ASCII alphanumerics, `_.-~` and the
/// characters in `safe`.
pub(crate) fn quote(s: &str, safe: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        let c = byte as char;
        if byte.is_ascii_alphanumeric() || "_.-~".contains(c) || (byte.is_ascii() && safe.contains(c)) {
            out.push(c);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn urlencode(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let safe = arg_text(arg).unwrap_or_else(|| "/".to_string());
    Value::from(quote(&text(&value), &safe))
}

/// Percent-encodes an IRI into a URI, leaving reserved and already-escaped
/// characters alone.
fn iriencode(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(quote(&text(&value), "/#%[]=:;$&()+,!?*@'~"))
}

fn wordcount(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(text(&value).split_whitespace().count())
}

fn wrap(s: &str, width: usize) -> String {
    let mut lines = Vec::new();
    for line in s.split('\n') {
        let mut current = String::new();
        for word in line.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }
    lines.join("\n")
}

fn wordwrap(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    match arg_int(arg) {
        Some(width) if width > 0 => Value::from(wrap(&text(&value), width as usize)),
        _ => value,
    }
}

fn pad(value: &Value, arg: Option<&Value>, align: fn(usize, usize) -> (usize, usize)) -> Option<Value> {
    let width = arg_int(arg)?;
    let s = text(value);
    let len = s.chars().count();
    if width <= len as i64 {
        return Some(Value::from(s));
    }
    let (left, right) = align(width as usize - len, width as usize);
    Some(Value::from(format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))))
}

fn ljust(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    pad(&value, arg, |margin, _| (0, margin)).unwrap_or(value)
}

fn rjust(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    pad(&value, arg, |margin, _| (margin, 0)).unwrap_or(value)
}

fn center(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    // Odd margins put the extra space on the left only when the width is odd.
    pad(&value, arg, |margin, width| {
        let left = margin / 2 + (margin & width & 1);
        (left, margin - left)
    })
    .unwrap_or(value)
}

fn cut(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let needle = arg_text(arg).unwrap_or_default();
    let cut = text(&value).replace(&needle, "");
    if value.is_safe() && needle != ";" {
        Value::safe_string(cut)
    } else {
        Value::from(cut)
    }
}

fn phone2numeric(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    let converted: String = text(&value)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a' | 'b' | 'c' => '2',
            'd' | 'e' | 'f' => '3',
            'g' | 'h' | 'i' => '4',
            'j' | 'k' | 'l' => '5',
            'm' | 'n' | 'o' => '6',
            'p' | 'q' | 'r' | 's' => '7',
            't' | 'u' | 'v' => '8',
            'w' | 'x' | 'y' | 'z' => '9',
            other => other,
        })
        .collect();
    Value::from(converted)
}

/// printf-style formatting of a single value. Returns `None` when the
/// conversion does not apply to the value.
fn printf(spec: &str, value: &Value) -> Option<String> {
    let caps = FORMAT_SPEC.captures(spec)?;
    let flags = caps.get(1).map_or("", |m| m.as_str());
    let width: usize = caps.get(2).map_or("", |m| m.as_str()).parse().unwrap_or(0);
    let precision: Option<usize> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    let conversion = caps.get(4)?.as_str().chars().next()?;
    let rest = caps.get(5).map_or("", |m| m.as_str());
    if rest.contains('%') {
        return None;
    }

    let left = flags.contains('-');
    let zero = flags.contains('0') && !left;
    let plus = flags.contains('+');
    let space = flags.contains(' ');
    let alternate = flags.contains('#');

    let integer = || match value {
        Value::Bool(b) => Some(*b as i64),
        Value::Number(Number::Int(i)) => Some(*i),
        Value::Number(Number::Float(f)) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    };
    let float = || match value {
        Value::Bool(b) => Some(*b as i64 as f64),
        Value::Number(n) => Some(n.as_f64()),
        _ => None,
    };
    let sign = |negative: bool| {
        if negative {
            "-"
        } else if plus {
            "+"
        } else if space {
            " "
        } else {
            ""
        }
    };

    let (prefix, body, numeric) = match conversion {
        's' | 'r' => {
            let s = if conversion == 's' { value.to_string() } else { value.repr() };
            let s = match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            };
            (String::new(), s, false)
        }
        'c' => {
            let c = match value {
                Value::String(s) if s.as_str().chars().count() == 1 => s.as_str().to_string(),
                _ => char::from_u32(u32::try_from(integer()?).ok()?)?.to_string(),
            };
            (String::new(), c, false)
        }
        'd' | 'i' => {
            let i = integer()?;
            (sign(i < 0).to_string(), i.unsigned_abs().to_string(), true)
        }
        'x' | 'X' | 'o' => {
            if matches!(value, Value::Number(Number::Float(_))) {
                return None;
            }
            let i = integer()?;
            let magnitude = i.unsigned_abs();
            let (digits, marker) = match conversion {
                'x' => (format!("{:x}", magnitude), "0x"),
                'X' => (format!("{:X}", magnitude), "0X"),
                _ => (format!("{:o}", magnitude), "0o"),
            };
            let mut prefix = sign(i < 0).to_string();
            if alternate {
                prefix.push_str(marker);
            }
            (prefix, digits, true)
        }
        'f' | 'F' | 'e' | 'E' => {
            let f = float()?;
            let p = precision.unwrap_or(6);
            let body = if !f.is_finite() {
                format_float(f.abs())
            } else if conversion == 'f' || conversion == 'F' {
                format!("{:.*}", p, f.abs())
            } else {
                exponent_notation(f.abs(), p, conversion == 'E')
            };
            let body = if conversion.is_uppercase() { body.to_uppercase() } else { body };
            (sign(f.is_sign_negative() && f != 0.0).to_string(), body, true)
        }
        _ => return None,
    };

    let len = prefix.chars().count() + body.chars().count();
    let padded = if len >= width {
        format!("{}{}", prefix, body)
    } else if left {
        format!("{}{}{}", prefix, body, " ".repeat(width - len))
    } else if zero && numeric {
        format!("{}{}{}", prefix, "0".repeat(width - len), body)
    } else {
        format!("{}{}{}", " ".repeat(width - len), prefix, body)
    };
    Some(format!("{}{}", padded, rest))
}

fn exponent_notation(f: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{:.*e}", precision, f);
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exponent),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:0>2}", mantissa, e, sign, digits)
}

fn stringformat(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let spec = arg_text(arg).unwrap_or_default();
    match printf(&spec, &value) {
        Some(formatted) => Value::from(formatted),
        None => Value::from(""),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::filters::run;
    use crate::types::Value;

    fn s(name: &str, input: &str, arg: Option<Value>) -> String {
        run(name, Value::from(input), arg, true).to_string()
    }

    #[test]
    fn case_filters() {
        assert_eq!(s("capfirst", "hello world", None), "Hello world");
        assert_eq!(s("title", "my FIRST post's 1st line", None), "My First Post's 1st Line");
        assert_eq!(s("lower", "ABC", None), "abc");
        assert_eq!(s("upper", "abc", None), "ABC");
    }

    #[test]
    fn slugs() {
        assert_eq!(s("slugify", " Joel is a slug ", None), "joel-is-a-slug");
        assert_eq!(s("slugify", "Café -- déjà vu!", None), "cafe-deja-vu");
    }

    #[test]
    fn truncation() {
        assert_eq!(s("truncatechars", "Joel is a slug", Some(Value::from(7))), "Joel i…");
        assert_eq!(s("truncatechars", "short", Some(Value::from(10))), "short");
        assert_eq!(s("truncatewords", "Joel is a slug", Some(Value::from(2))), "Joel is …");
        assert_eq!(s("truncatewords", "a  b", Some(Value::from(5))), "a b");
        assert_eq!(s("truncatechars", "keep", Some(Value::from("x"))), "keep");
    }

    #[test]
    fn padding() {
        assert_eq!(s("ljust", "ab", Some(Value::from(5))), "ab   ");
        assert_eq!(s("rjust", "ab", Some(Value::from(5))), "   ab");
        assert_eq!(s("center", "ab", Some(Value::from(5))), "  ab ");
        assert_eq!(s("center", "abc", Some(Value::from(6))), " abc  ");
    }

    #[test]
    fn printf_conversions() {
        let fmt = |v: Value, spec: &str| run("stringformat", v, Some(Value::from(spec)), true).to_string();
        assert_eq!(fmt(Value::from(42), "05d"), "00042");
        assert_eq!(fmt(Value::from(255), "#x"), "0xff");
        assert_eq!(fmt(Value::from(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::from(12345.678), "e"), "1.234568e+04");
        assert_eq!(fmt(Value::from("abc"), "5s"), "  abc");
        assert_eq!(fmt(Value::from("abc"), "-5s|"), "abc  |");
        assert_eq!(fmt(Value::from("abc"), "d"), "");
    }

    #[test]
    fn misc_string_filters() {
        assert_eq!(s("addslashes", r#"I'm "here""#, None), r#"I\'m \"here\""#);
        assert_eq!(s("cut", "a b c", Some(Value::from(" "))), "abc");
        assert_eq!(s("phone2numeric", "0800-FLOWERS", None), "0800-3569377");
        assert_eq!(s("urlencode", "a b/c?d", None), "a%20b/c%3Fd");
        assert_eq!(s("urlencode", "a/b", Some(Value::from(""))), "a%2Fb");
        assert_eq!(s("iriencode", "?test=1&me=2", None), "?test=1&me=2");
        assert_eq!(s("iriencode", "/S\u{f8}r 1", None), "/S%C3%B8r%201");
        assert_eq!(s("wordcount", "one two  three", None), "3");
        assert_eq!(s("wordwrap", "Joel is a slug", Some(Value::from(5))), "Joel\nis a\nslug");
        assert_eq!(s("linenumbers", "a\n<b>", None), "1. a\n2. &lt;b&gt;");
        assert_eq!(run("make_list", Value::from(123), None, true).to_string(), "['1', '2', '3']");
    }
}
