use std::io;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::Formatter;

use crate::types::{Str, Value};

static SPACES_BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^<>]*>").unwrap());
static NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n|\r").unwrap());
static PARAGRAPHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// HTML-escapes `&`, `<`, `>`, `"` and `'`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes unless the value already carries the safe taint. The result is
/// always safe.
pub fn conditional_escape(value: &Value) -> Str {
    let text = value.to_str();
    if text.is_safe() {
        text
    } else {
        Str::safe(escape(text.as_str()))
    }
}

/// Removes everything that looks like a markup tag. Runs until a fixed
/// point so that tags revealed by a removal are stripped as well.
pub fn strip_tags(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let stripped = TAG.replace_all(&current, "").into_owned();
        if stripped == current {
            return stripped;
        }
        current = stripped;
    }
}

pub fn strip_spaces_between_tags(text: &str) -> String {
    SPACES_BETWEEN_TAGS.replace_all(text, "><").into_owned()
}

pub fn normalize_newlines(text: &str) -> String {
    NEWLINES.replace_all(text, "\n").into_owned()
}

/// Hex-encodes characters that are unsafe inside JavaScript string literals.
pub fn escapejs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '\'' | '"' | '>' | '<' | '&' | '=' | '-' | ';' | '`' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04X}", c as u32))
            }
            c if (c as u32) < 32 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Turns blank-line separated blocks into `<p>` paragraphs and single
/// newlines into `<br>`.
pub fn linebreaks(text: &str, autoescape: bool) -> String {
    let text = normalize_newlines(text);
    PARAGRAPHS
        .split(&text)
        .map(|para| {
            let para = if autoescape { escape(para) } else { para.to_string() };
            format!("<p>{}</p>", para.replace('\n', "<br>"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replaces spaces with non-breaking spaces.
pub fn avoid_wrapping(text: &str) -> String {
    text.replace(' ', "\u{a0}")
}

/// Serializes `value` as JSON inside a `<script type="application/json">`
/// element, escaping the characters that could close the element early.
pub fn json_script(value: &Value, element_id: Option<&str>) -> String {
    let json = to_python_json(&value.to_json())
        .replace('<', "\\u003C")
        .replace('>', "\\u003E")
        .replace('&', "\\u0026");
    match element_id {
        Some(id) if !id.is_empty() => format!(
            "<script id=\"{}\" type=\"application/json\">{}</script>",
            escape(id),
            json
        ),
        _ => format!("<script type=\"application/json\">{}</script>", json),
    }
}

/// JSON with `", "` and `": "` separators.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn to_python_json(json: &serde_json::Value) -> String {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
    if json.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_each_special_character_once() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
        let already = Value::safe_string("<b>");
        assert_eq!(conditional_escape(&already).as_str(), "<b>");
        assert_eq!(conditional_escape(&Value::from("<b>")).as_str(), "&lt;b&gt;");
    }

    #[test]
    fn strips_tags_and_inter_tag_space() {
        assert_eq!(strip_tags("<p>Hello <b>there</b></p>"), "Hello there");
        assert_eq!(strip_spaces_between_tags("<p>\n  <a>x</a>\n</p>"), "<p><a>x</a></p>");
        assert_eq!(strip_spaces_between_tags("<b> text </b>"), "<b> text </b>");
    }

    #[test]
    fn paragraphs_and_breaks() {
        assert_eq!(linebreaks("a\nb\r\n\r\nc", true), "<p>a<br>b</p>\n\n<p>c</p>");
        assert_eq!(linebreaks("<x>", true), "<p>&lt;x&gt;</p>");
    }

    #[test]
    fn javascript_escaping() {
        assert_eq!(escapejs("a'b\n"), "a\\u0027b\\u000A");
    }

    #[test]
    fn script_element() {
        let value = Value::from(json!({"hello": "<world>", "n": [1, 2]}));
        assert_eq!(
            json_script(&value, Some("data")),
            "<script id=\"data\" type=\"application/json\">{\"hello\": \"\\u003Cworld\\u003E\", \"n\": [1, 2]}</script>"
        );
    }
}
