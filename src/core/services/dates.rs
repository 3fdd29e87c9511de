use std::fmt::Debug;

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::warn;

/// Formats dates for the `date`/`time` filters and the `now` tag.
pub trait DateFormatter: Debug + Send + Sync {
    fn format_date(&self, value: &NaiveDateTime, format: &str) -> String;
}

/// Default formatter understanding the PHP-style format characters
/// (`Y-m-d`, `N j, Y`, `P`, ...). A backslash escapes the next character.
/// Timezone characters render as nothing since values are naive.
#[derive(Debug, Clone, Default)]
pub struct PhpDateFormatter;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const MONTHS_AP: [&str; 12] = [
    "Jan.", "Feb.", "March", "April", "May", "June", "July", "Aug.", "Sept.", "Oct.", "Nov.",
    "Dec.",
];
const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

impl DateFormatter for PhpDateFormatter {
    fn format_date(&self, value: &NaiveDateTime, format: &str) -> String {
        let mut out = String::new();
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                _ => match format_char(value, c) {
                    Some(piece) => out.push_str(&piece),
                    None => out.push(c),
                },
            }
        }
        out
    }
}

fn hour12(value: &NaiveDateTime) -> u32 {
    match value.hour() % 12 {
        0 => 12,
        h => h,
    }
}

fn format_char(value: &NaiveDateTime, c: char) -> Option<String> {
    let month = value.month0() as usize;
    let weekday = value.weekday().num_days_from_monday() as usize;
    let piece = match c {
        'a' => if value.hour() < 12 { "a.m." } else { "p.m." }.to_string(),
        'A' => if value.hour() < 12 { "AM" } else { "PM" }.to_string(),
        'b' => MONTHS[month][..3].to_lowercase(),
        'c' => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
        'd' => format!("{:02}", value.day()),
        'D' => WEEKDAYS[weekday][..3].to_string(),
        'E' | 'F' => MONTHS[month].to_string(),
        'f' => {
            if value.minute() == 0 {
                hour12(value).to_string()
            } else {
                format!("{}:{:02}", hour12(value), value.minute())
            }
        }
        'g' => hour12(value).to_string(),
        'G' => value.hour().to_string(),
        'h' => format!("{:02}", hour12(value)),
        'H' => format!("{:02}", value.hour()),
        'i' => format!("{:02}", value.minute()),
        'j' => value.day().to_string(),
        'l' => WEEKDAYS[weekday].to_string(),
        'L' => if is_leap_year(value.year()) { "True" } else { "False" }.to_string(),
        'm' => format!("{:02}", value.month()),
        'M' => MONTHS[month][..3].to_string(),
        'n' => value.month().to_string(),
        'N' => MONTHS_AP[month].to_string(),
        'o' => value.iso_week().year().to_string(),
        'P' => match (value.hour(), value.minute()) {
            (0, 0) => "midnight".to_string(),
            (12, 0) => "noon".to_string(),
            _ => format!("{} {}", format_char(value, 'f')?, format_char(value, 'a')?),
        },
        'r' => value.format("%a, %d %b %Y %H:%M:%S +0000").to_string(),
        's' => format!("{:02}", value.second()),
        'S' => ordinal_suffix(value.day()).to_string(),
        't' => days_in_month(value.year(), value.month()).to_string(),
        'u' => format!("{:06}", value.nanosecond() / 1_000 % 1_000_000),
        'U' => value.and_utc().timestamp().to_string(),
        'w' => value.weekday().num_days_from_sunday().to_string(),
        'W' => value.iso_week().week().to_string(),
        'y' => format!("{:02}", value.year() % 100),
        'Y' => format!("{:04}", value.year()),
        'z' => value.ordinal().to_string(),
        'e' | 'I' | 'O' | 'T' | 'Z' => {
            warn!("Timezone format character '{}' used on a naive datetime", c);
            String::new()
        }
        _ => return None,
    };
    Some(piece)
}

fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&day) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}
