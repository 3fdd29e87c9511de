use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

// Tags never span lines.
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Variable,
    Block,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub contents: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, contents: impl Into<String>, line: usize) -> Self {
        Self { kind, contents: contents.into(), line }
    }

    /// First word of a block tag's contents.
    pub fn command(&self) -> &str {
        self.contents.split_whitespace().next().unwrap_or("")
    }
}

/// Splits raw markup into text, variable, block and comment tokens.
///
/// Inside a `verbatim` block every tag is passed through as raw text until
/// the matching `endverbatim` (with the same suffix, if one was given).
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut verbatim: Option<String> = None;
    let mut line = 1;
    let mut last = 0;

    fn push_text(tokens: &mut Vec<Token>, text: &str, line: &mut usize) {
        if !text.is_empty() {
            tokens.push(Token::new(TokenKind::Text, text, *line));
            *line += text.matches('\n').count();
        }
    }

    for tag in TAG.find_iter(source) {
        push_text(&mut tokens, &source[last..tag.start()], &mut line);
        last = tag.end();

        let raw = tag.as_str();
        let contents = raw[2..raw.len() - 2].trim();
        let closing = verbatim.clone();
        let token = match (&raw[..2], closing.as_deref()) {
            ("{%", Some(end)) if contents == end => {
                verbatim = None;
                Token::new(TokenKind::Block, contents, line)
            }
            (_, Some(_)) => Token::new(TokenKind::Text, raw, line),
            ("{%", None) => {
                if contents == "verbatim" || contents.starts_with("verbatim ") {
                    verbatim = Some(format!("end{}", contents));
                }
                Token::new(TokenKind::Block, contents, line)
            }
            ("{{", None) => Token::new(TokenKind::Variable, contents, line),
            _ => Token::new(TokenKind::Comment, contents, line),
        };
        trace!("tokenize: {:?}", token);
        tokens.push(token);
        line += raw.matches('\n').count();
    }
    push_text(&mut tokens, &source[last..], &mut line);
    tokens
}
