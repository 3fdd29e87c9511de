use std::fmt::Debug;

use crate::config::NumberFormatConfig;

/// Formats an already-rounded decimal string for display.
pub trait NumberFormatter: Debug + Send + Sync {
    /// `number` is a plain decimal string such as `-1234.50`.
    /// `decimal_pos` truncates or zero-pads the fractional part.
    fn format_number(
        &self,
        number: &str,
        decimal_pos: Option<usize>,
        force_grouping: bool,
        use_l10n: bool,
    ) -> String;
}

/// Default formatter driven by [`NumberFormatConfig`]. Unlocalized output
/// always uses `.` and `,` with groups of three.
#[derive(Debug, Clone, Default)]
pub struct LocaleNumberFormatter {
    config: NumberFormatConfig,
}

impl LocaleNumberFormatter {
    pub fn new(config: NumberFormatConfig) -> Self {
        Self { config }
    }
}

impl NumberFormatter for LocaleNumberFormatter {
    fn format_number(
        &self,
        number: &str,
        decimal_pos: Option<usize>,
        force_grouping: bool,
        use_l10n: bool,
    ) -> String {
        let (decimal_sep, thousand_sep, grouping) = if use_l10n {
            (
                self.config.decimal_separator.as_str(),
                self.config.thousand_separator.as_str(),
                self.config.grouping,
            )
        } else {
            (".", ",", 3)
        };
        let use_grouping =
            (force_grouping || (use_l10n && self.config.use_thousand_separator)) && grouping > 0;

        let (sign, unsigned) = match number.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", number),
        };
        let (int_part, dec_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        let mut dec_part = dec_part.to_string();
        if let Some(pos) = decimal_pos {
            dec_part.truncate(pos);
            while dec_part.len() < pos {
                dec_part.push('0');
            }
        }

        let int_part = if use_grouping {
            group_digits(int_part, thousand_sep, grouping)
        } else {
            int_part.to_string()
        };

        if dec_part.is_empty() {
            format!("{}{}", sign, int_part)
        } else {
            format!("{}{}{}{}", sign, int_part, decimal_sep, dec_part)
        }
    }
}

fn group_digits(digits: &str, separator: &str, size: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / size);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            out.push_str(separator);
        }
        out.push(*c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_pads() {
        let formatter = LocaleNumberFormatter::default();
        assert_eq!(formatter.format_number("6666.67", Some(2), true, true), "6,666.67");
        assert_eq!(formatter.format_number("10000", Some(0), true, true), "10,000");
        assert_eq!(formatter.format_number("-1234.5", Some(3), false, true), "-1234.500");
        assert_eq!(formatter.format_number("123", None, true, false), "123");
    }

    #[test]
    fn localizes_separators() {
        let formatter = LocaleNumberFormatter::new(NumberFormatConfig {
            decimal_separator: ",".into(),
            thousand_separator: ".".into(),
            grouping: 3,
            use_thousand_separator: false,
        });
        assert_eq!(formatter.format_number("66666.67", Some(2), false, true), "66666,67");
        assert_eq!(formatter.format_number("66666.67", Some(2), false, false), "66666.67");
        assert_eq!(formatter.format_number("66666.67", Some(2), true, true), "66.666,67");
    }
}
