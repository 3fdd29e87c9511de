use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::Context;
use crate::core::escape::{conditional_escape, escape, json_script, linebreaks, normalize_newlines, strip_tags};
use crate::types::{Str, Value};

use super::strings::quote;
use super::{arg_int, arg_text, ArgSpec, FnFilter};

static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\s<>"']+"#).unwrap());
static SCHEME_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://\[?\w").unwrap());
static WWW_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^www\.").unwrap());
static BARE_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\w[^@]+\.(?:com|edu|gov|int|mil|net|org)(?:/.*)?$").unwrap());
static HTML_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+?>|(.)").unwrap());
static HTML_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+?>|([^<>\s]+)").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^<(/)?(\S+?)(?:(\s*/)|\s.*?)?>$").unwrap());

const MAX_URL_LENGTH: usize = 2048;
const WRAPPING_PUNCTUATION: [(char, char); 2] = [('(', ')'), ('[', ']')];
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ':', ';', '!'];
const URL_SAFE: &str = "!*'();:@&=+$,/?#[]~%";
const HTML4_SINGLETS: [&str; 9] = ["br", "col", "link", "base", "img", "param", "area", "hr", "input"];

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("escape", ArgSpec::None, escape_filter).safe().string_only(),
        FnFilter::new("escapeseq", ArgSpec::None, escapeseq).safe(),
        FnFilter::new("force_escape", ArgSpec::None, force_escape).safe().string_only(),
        FnFilter::new("linebreaks", ArgSpec::None, linebreaks_filter).safe().needs_autoescape().string_only(),
        FnFilter::new("linebreaksbr", ArgSpec::None, linebreaksbr).safe().needs_autoescape().string_only(),
        FnFilter::new("safe", ArgSpec::None, safe).safe().string_only(),
        FnFilter::new("safeseq", ArgSpec::None, safeseq).safe(),
        FnFilter::new("striptags", ArgSpec::None, striptags).safe().string_only(),
        FnFilter::new("json_script", ArgSpec::Optional, json_script_filter).safe(),
        FnFilter::new("unordered_list", ArgSpec::None, unordered_list).safe().needs_autoescape(),
        FnFilter::new("urlize", ArgSpec::None, urlize).safe().needs_autoescape().string_only(),
        FnFilter::new("urlizetrunc", ArgSpec::Required, urlizetrunc).safe().needs_autoescape().string_only(),
        FnFilter::new("truncatechars_html", ArgSpec::Required, truncatechars_html).safe().string_only(),
        FnFilter::new("truncatewords_html", ArgSpec::Required, truncatewords_html).safe().string_only(),
    ]
}

fn escape_filter(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::String(conditional_escape(&value))
}

fn force_escape(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::safe_string(escape(value.to_str().as_str()))
}

fn escapeseq(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    match value.try_iter() {
        Some(items) => Value::from(items.iter().map(|v| Value::String(conditional_escape(v))).collect::<Vec<_>>()),
        None => value,
    }
}

fn safe(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::String(Str::safe(value.to_str().into_string()))
}

fn safeseq(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    match value.try_iter() {
        Some(items) => Value::from(items.iter().map(|v| Value::safe_string(v.to_string())).collect::<Vec<_>>()),
        None => value,
    }
}

fn linebreaks_filter(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let autoescape = ctx.autoescape() && !value.is_safe();
    Value::safe_string(linebreaks(value.to_str().as_str(), autoescape))
}

fn linebreaksbr(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let autoescape = ctx.autoescape() && !value.is_safe();
    let text = normalize_newlines(value.to_str().as_str());
    let text = if autoescape { escape(&text) } else { text };
    Value::safe_string(text.replace('\n', "<br>"))
}

fn striptags(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(strip_tags(value.to_str().as_str()))
}

fn json_script_filter(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let element_id = arg_text(arg);
    Value::safe_string(json_script(&value, element_id.as_deref()))
}

fn unordered_list(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let autoescape = ctx.autoescape();
    let render_item = |item: &Value| {
        if autoescape {
            conditional_escape(item).into_string()
        } else {
            item.to_string()
        }
    };
    Value::safe_string(list_items(&value, 1, &render_item))
}

/// Pairs each item with the sublist that directly follows it, if any.
fn walk_items(items: &[Value]) -> Vec<(Value, Option<Value>)> {
    let mut out = Vec::new();
    let mut iter = items.iter().peekable();
    while let Some(item) = iter.next() {
        let children = match iter.peek() {
            Some(next) if matches!(next, Value::List(_)) => iter.next().cloned(),
            _ => None,
        };
        out.push((item.clone(), children));
    }
    out
}

fn list_items(list: &Value, tabs: usize, render_item: &dyn Fn(&Value) -> String) -> String {
    let indent = "\t".repeat(tabs);
    let items = list.try_iter().unwrap_or_default();
    walk_items(&items)
        .into_iter()
        .map(|(item, children)| {
            let sublist = match children {
                Some(children) if !children.try_iter().unwrap_or_default().is_empty() => format!(
                    "\n{}<ul>\n{}\n{}</ul>\n{}",
                    indent,
                    list_items(&children, tabs + 1, render_item),
                    indent,
                    indent
                ),
                _ => String::new(),
            };
            format!("{}<li>{}{}</li>", indent, render_item(&item), sublist)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits wrapping and trailing punctuation off a candidate link. Closing
/// brackets stay when they balance an opening one inside the link.
fn trim_punctuation(word: &str) -> (String, String, String) {
    let mut lead = String::new();
    let mut middle = word.to_string();
    let mut trail = String::new();
    let mut trimmed = true;
    while trimmed {
        trimmed = false;
        for (opening, closing) in WRAPPING_PUNCTUATION {
            if let Some(rest) = middle.strip_prefix(opening) {
                middle = rest.to_string();
                lead.push(opening);
                trimmed = true;
            }
            if middle.ends_with(closing) && middle.matches(closing).count() == middle.matches(opening).count() + 1 {
                middle.pop();
                trail.insert(0, closing);
                trimmed = true;
            }
        }
        let keep = middle.trim_end_matches(TRAILING_PUNCTUATION).len();
        if keep != middle.len() {
            trail.insert_str(0, &middle[keep..]);
            middle.truncate(keep);
            trimmed = true;
        }
    }
    (lead, middle, trail)
}

fn is_email_simple(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

/// Turns URLs and email addresses in plain text into links.
struct Urlizer {
    limit: Option<usize>,
    autoescape: bool,
    safe_input: bool,
}

impl Urlizer {
    fn plain(&self, text: &str) -> String {
        if self.autoescape && !self.safe_input { escape(text) } else { text.to_string() }
    }

    fn trim_url(&self, url: &str) -> String {
        match self.limit {
            Some(limit) if url.chars().count() > limit => {
                let mut trimmed: String = url.chars().take(limit.saturating_sub(1)).collect();
                trimmed.push('…');
                trimmed
            }
            _ => url.to_string(),
        }
    }

    fn word(&self, word: &str) -> String {
        if !word.contains(&['.', '@', ':'][..]) {
            return self.plain(word);
        }
        let (lead, middle, trail) = trim_punctuation(word);
        let (url, nofollow) = if middle.len() <= MAX_URL_LENGTH && SCHEME_URL.is_match(&middle) {
            (quote(&middle, URL_SAFE), true)
        } else if middle.len() <= MAX_URL_LENGTH
            && (WWW_URL.is_match(&middle)
                || (!middle.to_ascii_lowercase().starts_with("http") && BARE_DOMAIN.is_match(&middle)))
        {
            (quote(&format!("http://{}", middle), URL_SAFE), true)
        } else if !middle.contains(':') && is_email_simple(&middle) {
            (format!("mailto:{}", middle), false)
        } else {
            return self.plain(word);
        };
        format!(
            "{}<a href=\"{}\"{}>{}</a>{}",
            self.plain(&lead),
            escape(&url),
            if nofollow { " rel=\"nofollow\"" } else { "" },
            self.plain(&self.trim_url(&middle)),
            self.plain(&trail)
        )
    }

    fn run(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for separator in WORD_SPLIT.find_iter(text) {
            out.push_str(&self.word(&text[last..separator.start()]));
            out.push_str(&self.plain(separator.as_str()));
            last = separator.end();
        }
        out.push_str(&self.word(&text[last..]));
        out
    }
}

fn urlize(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let urlizer = Urlizer { limit: None, autoescape: ctx.autoescape(), safe_input: value.is_safe() };
    Value::safe_string(urlizer.run(value.to_str().as_str()))
}

fn urlizetrunc(value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
    let Some(limit) = arg_int(arg) else {
        return value;
    };
    let urlizer = Urlizer {
        limit: Some(limit.max(0) as usize),
        autoescape: ctx.autoescape(),
        safe_input: value.is_safe(),
    };
    Value::safe_string(urlizer.run(value.to_str().as_str()))
}

/// Truncates markup to `length` visible characters or words, closing any
/// tags left open at the cut. Tags do not count towards the length.
fn truncate_html(text: &str, length: usize, words: bool, truncation: &str) -> String {
    let (pattern, truncate_len) = if words { (&HTML_WORDS, length) } else { (&HTML_CHARS, length - 1) };
    let mut current = 0;
    let mut end_text = 0;
    // innermost first
    let mut open_tags: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(text) {
        if current > length {
            break;
        }
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if caps.get(1).is_some() {
            current += 1;
            if current == truncate_len {
                end_text = whole.end();
            }
            continue;
        }
        let Some(tag) = HTML_TAG.captures(whole.as_str()) else {
            continue;
        };
        if current >= truncate_len {
            continue;
        }
        let name = tag.get(2).map_or(String::new(), |m| m.as_str().to_lowercase());
        if tag.get(3).is_some() || HTML4_SINGLETS.contains(&name.as_str()) {
            continue;
        }
        if tag.get(1).is_some() {
            if let Some(i) = open_tags.iter().position(|open| *open == name) {
                open_tags.drain(..=i);
            }
        } else {
            open_tags.insert(0, name);
        }
    }
    if current <= length {
        return text.to_string();
    }
    let mut out = text[..end_text].to_string();
    out.push_str(truncation);
    for tag in open_tags {
        out.push_str(&format!("</{}>", tag));
    }
    out
}

fn truncatechars_html(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    match arg_int(arg) {
        Some(length) if length <= 0 => Value::from(""),
        Some(length) => Value::from(truncate_html(value.to_str().as_str(), length as usize, false, "…")),
        None => value,
    }
}

fn truncatewords_html(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    match arg_int(arg) {
        Some(length) if length <= 0 => Value::from(""),
        Some(length) => Value::from(truncate_html(value.to_str().as_str(), length as usize, true, " …")),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use crate::core::filters::run;
    use crate::types::Value;
    use serde_json::json;

    #[test]
    fn escaping_respects_taint() {
        let escaped = run("escape", Value::from("<b>"), None, true);
        assert_eq!(escaped.to_string(), "&lt;b&gt;");
        assert!(escaped.is_safe());
        assert_eq!(run("escape", Value::safe_string("<b>"), None, true).to_string(), "<b>");
        assert_eq!(run("force_escape", Value::safe_string("<b>"), None, true).to_string(), "&lt;b&gt;");
    }

    #[test]
    fn safe_marks_output() {
        let value = run("safe", Value::from("<i>"), None, true);
        assert!(value.is_safe());
        let seq = run("safeseq", Value::from(json!(["<a>", "b"])), None, true);
        match seq {
            Value::List(items) => assert!(items.iter().all(Value::is_safe)),
            other => panic!("unexpected {:?}", other),
        }
        let seq = run("escapeseq", Value::from(json!(["<a>"])), None, true);
        assert_eq!(seq.to_string(), "['&lt;a&gt;']");
    }

    #[test]
    fn line_breaks() {
        assert_eq!(run("linebreaksbr", Value::from("a\n<b>"), None, true).to_string(), "a<br>&lt;b&gt;");
        assert_eq!(run("linebreaksbr", Value::from("a\n<b>"), None, false).to_string(), "a<br><b>");
        assert_eq!(run("linebreaks", Value::from("x\n\ny"), None, true).to_string(), "<p>x</p>\n\n<p>y</p>");
    }

    #[test]
    fn strips_markup() {
        let stripped = run("striptags", Value::from("<b>bold</b> text"), None, true);
        assert_eq!(stripped.to_string(), "bold text");
        assert!(!stripped.is_safe());
    }

    #[test]
    fn nested_unordered_list() {
        let value = Value::from(json!(["States", ["Kansas", ["Lawrence", "Topeka"], "Illinois"]]));
        assert_eq!(
            run("unordered_list", value, None, true).to_string(),
            "\t<li>States\n\t<ul>\n\t\t<li>Kansas\n\t\t<ul>\n\t\t\t<li>Lawrence</li>\n\t\t\t<li>Topeka</li>\n\t\t</ul>\n\t\t</li>\n\t\t<li>Illinois</li>\n\t</ul>\n\t</li>"
        );
    }

    #[test]
    fn links_urls_and_emails() {
        let text = Value::from("Check www.example.com, or mail me@x.org!");
        assert_eq!(
            run("urlize", text, None, true).to_string(),
            "Check <a href=\"http://www.example.com\" rel=\"nofollow\">www.example.com</a>, or mail <a href=\"mailto:me@x.org\">me@x.org</a>!"
        );
        let query = Value::from("(see https://a.b/?x=1&y=2)");
        assert_eq!(
            run("urlize", query, None, true).to_string(),
            "(see <a href=\"https://a.b/?x=1&amp;y=2\" rel=\"nofollow\">https://a.b/?x=1&amp;y=2</a>)"
        );
        assert_eq!(run("urlize", Value::from("djangoproject.com"), None, true).to_string(),
            "<a href=\"http://djangoproject.com\" rel=\"nofollow\">djangoproject.com</a>");
        assert_eq!(run("urlize", Value::from("<b> 1.5"), None, true).to_string(), "&lt;b&gt; 1.5");
        assert_eq!(run("urlize", Value::from("<b> 1.5"), None, false).to_string(), "<b> 1.5");
    }

    #[test]
    fn truncated_link_text() {
        let text = Value::from("http://example.com/long/path");
        assert_eq!(
            run("urlizetrunc", text, Some(Value::from(15)), true).to_string(),
            "<a href=\"http://example.com/long/path\" rel=\"nofollow\">http://example…</a>"
        );
    }

    #[test]
    fn truncates_markup_and_closes_tags() {
        let html = Value::from("<p>one <b>two three</b> four</p>");
        assert_eq!(
            run("truncatewords_html", html.clone(), Some(Value::from(2)), true).to_string(),
            "<p>one <b>two …</b></p>"
        );
        assert_eq!(run("truncatewords_html", html.clone(), Some(Value::from(9)), true).to_string(), html.to_string());
        assert_eq!(run("truncatewords_html", html, Some(Value::from(0)), true).to_string(), "");

        let html = Value::from("<p>Hello <b>world</b><br/></p>");
        assert_eq!(
            run("truncatechars_html", html.clone(), Some(Value::from(7)), true).to_string(),
            "<p>Hello …</p>"
        );
        assert_eq!(run("truncatechars_html", html.clone(), Some(Value::from(11)), true).to_string(), html.to_string());
        assert_eq!(run("truncatechars_html", html, Some(Value::from(1)), true).to_string(), "…");
    }

    #[test]
    fn script_tag() {
        let out = run("json_script", Value::from(json!({"a": "</script>"})), Some(Value::from("id")), true);
        assert_eq!(
            out.to_string(),
            "<script id=\"id\" type=\"application/json\">{\"a\": \"\\u003C/script\\u003E\"}</script>"
        );
    }
}
