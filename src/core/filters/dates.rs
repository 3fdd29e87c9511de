use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use log::warn;

use crate::context::Context;
use crate::core::escape::avoid_wrapping;
use crate::types::Value;

use super::{arg_text, ArgSpec, FnFilter};

/// Format characters that only make sense for a calendar date.
const DATE_ONLY_CHARS: &str = "bcdDEFIjlLmMnNorStUwWyYz";

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("date", ArgSpec::Optional, date),
        FnFilter::new("time", ArgSpec::Optional, time),
        FnFilter::new("timesince", ArgSpec::Optional, timesince_filter),
        FnFilter::new("timeuntil", ArgSpec::Optional, timeuntil_filter),
    ]
}

/// Fixed month lengths used to place the pivot date; February is always 28.
const MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

const UNITS: [(&str, &str); 6] = [
    ("year", "years"),
    ("month", "months"),
    ("week", "weeks"),
    ("day", "days"),
    ("hour", "hours"),
    ("minute", "minutes"),
];

const CHUNKS: [i64; 4] = [604_800, 86_400, 3_600, 60];

fn unit_text(count: i64, unit: usize) -> String {
    let (singular, plural) = UNITS[unit];
    avoid_wrapping(&format!("{} {}", count, if count == 1 { singular } else { plural }))
}

/// Elapsed time from `d` to `now` as at most `depth` adjacent units, e.g.
/// "1 year, 2 months". Calendar years and months are counted first, the
/// rest is split into weeks, days, hours and minutes.
pub(crate) fn timesince(d: NaiveDateTime, now: NaiveDateTime, depth: usize) -> String {
    if (now - d).num_seconds() <= 0 {
        return unit_text(0, 5);
    }

    let mut total_months = (now.year() - d.year()) * 12 + now.month() as i32 - d.month() as i32;
    if d.day() > now.day() || (d.day() == now.day() && d.time() > now.time()) {
        total_months -= 1;
    }
    let (years, months) = (total_months / 12, total_months % 12);

    let pivot = if total_months > 0 {
        let mut year = d.year() + years;
        let mut month = d.month() as i32 + months;
        if month > 12 {
            month -= 12;
            year += 1;
        }
        let day = d.day().min(MONTH_DAYS[month as usize - 1]);
        NaiveDate::from_ymd_opt(year, month as u32, day)
            .and_then(|date| date.and_hms_opt(d.hour(), d.minute(), d.second()))
            .unwrap_or(d)
    } else {
        d
    };

    let mut remaining = (now - pivot).num_seconds();
    let mut partials = vec![years as i64, months as i64];
    for chunk in CHUNKS {
        partials.push(remaining / chunk);
        remaining %= chunk;
    }

    let Some(first) = partials.iter().position(|count| *count != 0) else {
        return unit_text(0, 5);
    };
    partials[first..]
        .iter()
        .enumerate()
        .take(depth)
        .take_while(|(_, count)| **count != 0)
        .map(|(offset, count)| unit_text(*count, first + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Datetime view of a filter argument. `Ok(None)` means no usable argument
/// was given, `Err` that one was given but is not a datetime.
fn arg_datetime(arg: Option<&Value>) -> Result<Option<NaiveDateTime>, ()> {
    match arg {
        Some(Value::DateTime(dt)) => Ok(Some(*dt)),
        Some(other) if other.is_true() => Err(()),
        _ => Ok(None),
    }
}

fn timesince_filter(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let (Value::DateTime(d), Ok(now)) = (&value, arg_datetime(arg)) else {
        return Value::from("");
    };
    let now = now.unwrap_or_else(|| Local::now().naive_local());
    Value::from(timesince(*d, now, 2))
}

fn timeuntil_filter(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let (Value::DateTime(d), Ok(now)) = (&value, arg_datetime(arg)) else {
        return Value::from("");
    };
    let now = now.unwrap_or_else(|| Local::now().naive_local());
    Value::from(timesince(now, *d, 2))
}

fn format_with(value: &Value, format: &str, ctx: &Context<'_>) -> Value {
    match value {
        Value::DateTime(dt) => {
            let format = ctx.config().named_format(format);
            Value::from(ctx.services().date_formatter.format_date(dt, format))
        }
        Value::None | Value::Undefined => Value::from(""),
        Value::String(s) if s.as_str().is_empty() => Value::from(""),
        other => {
            warn!("Date filter applied to a {} value", other.kind());
            Value::from("")
        }
    }
}

fn date(value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
    let format = arg_text(arg).unwrap_or_else(|| "DATE_FORMAT".to_string());
    format_with(&value, &format, ctx)
}

/// True when `format` uses a date-only character outside an escape.
fn uses_date_chars(format: &str) -> bool {
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if DATE_ONLY_CHARS.contains(c) {
            return true;
        }
    }
    false
}

fn time(value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
    let format = arg_text(arg).unwrap_or_else(|| "TIME_FORMAT".to_string());
    if uses_date_chars(ctx.config().named_format(&format)) {
        warn!("time filter format '{}' uses date characters", format);
        return Value::from("");
    }
    format_with(&value, &format, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::run;
    use chrono::NaiveDate;

    fn moment() -> Value {
        Value::from(NaiveDate::from_ymd_opt(2008, 1, 2).unwrap().and_hms_opt(13, 30, 0).unwrap())
    }

    #[test]
    fn named_and_literal_formats() {
        assert_eq!(run("date", moment(), None, true).to_string(), "Jan. 2, 2008");
        assert_eq!(run("date", moment(), Some(Value::from("Y-m-d")), true).to_string(), "2008-01-02");
        assert_eq!(run("date", moment(), Some(Value::from("SHORT_DATE_FORMAT")), true).to_string(), "01/02/2008");
        assert_eq!(run("time", moment(), None, true).to_string(), "1:30 p.m.");
        assert_eq!(run("time", moment(), Some(Value::from("H:i")), true).to_string(), "13:30");
    }

    #[test]
    fn time_rejects_date_characters() {
        assert_eq!(run("time", moment(), Some(Value::from("Y H:i")), true).to_string(), "");
        assert_eq!(run("time", moment(), Some(Value::from(r"\Y H")), true).to_string(), "Y 13");
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Value {
        Value::from(NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap())
    }

    #[test]
    fn elapsed_time_in_adjacent_units() {
        let since = |value: Value, now: Value| run("timesince", value, Some(now), true).to_string();
        assert_eq!(since(moment(), at(2009, 3, 5, 13, 30)), "1\u{a0}year, 2\u{a0}months");
        assert_eq!(since(moment(), at(2008, 1, 11, 15, 30)), "1\u{a0}week, 2\u{a0}days");
        assert_eq!(since(moment(), at(2008, 1, 2, 13, 31)), "1\u{a0}minute");
        // units must be adjacent: three days after a whole year is dropped
        assert_eq!(since(moment(), at(2009, 1, 5, 13, 30)), "1\u{a0}year");
        assert_eq!(since(moment(), at(2007, 1, 1, 0, 0)), "0\u{a0}minutes");
        assert_eq!(since(moment(), moment()), "0\u{a0}minutes");
    }

    #[test]
    fn time_until_counts_forward() {
        let until = run("timeuntil", at(2008, 1, 2, 16, 35), Some(moment()), true);
        assert_eq!(until.to_string(), "3\u{a0}hours, 5\u{a0}minutes");
        assert_eq!(run("timeuntil", at(2007, 1, 1, 0, 0), Some(moment()), true).to_string(), "0\u{a0}minutes");
    }

    #[test]
    fn elapsed_time_needs_datetimes() {
        assert_eq!(run("timesince", Value::from("yesterday"), None, true).to_string(), "");
        assert_eq!(run("timesince", moment(), Some(Value::from("today")), true).to_string(), "");
        assert_eq!(run("timeuntil", Value::None, None, true).to_string(), "");
    }

    #[test]
    fn non_dates_render_empty() {
        assert_eq!(run("date", Value::None, None, true).to_string(), "");
        assert_eq!(run("date", Value::from("2008-01-02"), None, true).to_string(), "");
        assert!(uses_date_chars("N j"));
        assert!(!uses_date_chars("P"));
    }
}
