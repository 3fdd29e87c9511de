use thiserror::Error;

use crate::parser::Rule;

/// Errors raised while turning a token stream into a node tree.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Failed to parse '{0}': {1}")]
    Pest(String, Box<pest::error::Error<Rule>>),
    #[error("Syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },
    #[error("Invalid block tag on line {line}: '{name}'")]
    UnknownTag { name: String, line: usize },
    #[error("Unclosed tag on line {line}: '{name}'. Looking for one of: {expected}")]
    UnclosedTag { name: String, expected: String, line: usize },
    #[error("Invalid filter: '{0}'")]
    UnknownFilter(String),
    #[error("{name} requires {expected} arguments, {provided} provided")]
    FilterArguments { name: String, expected: usize, provided: usize },
    #[error("Variables and attributes may not begin with underscores: '{0}'")]
    PrivateAccess(String),
    #[error("\"filter {name}\" is not permitted on line {line}. Use the \"autoescape\" tag instead.")]
    DisallowedFilter { name: String, line: usize },
    #[error("Named cycle '{name}' does not exist (line {line})")]
    UnknownCycle { name: String, line: usize },
    #[error("No cycles in template (line {line})")]
    NoCycles { line: usize },
    #[error("Invalid templatetag argument on line {line}: '{name}'")]
    InvalidTemplateTag { name: String, line: usize },
    #[error("Invalid number literal: '{0}'")]
    InvalidNumber(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParserError {
    pub(crate) fn syntax(message: impl Into<String>, line: usize) -> Self {
        ParserError::Syntax { message: message.into(), line }
    }
}

/// Errors that abort a render pass.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Need {expected} values to unpack in for loop; got {found} (line {line})")]
    Unpack { expected: usize, found: usize, line: usize },
    #[error("Reverse for '{name}' not found (line {line})")]
    NoReverseMatch { name: String, line: usize },
    #[error("widthratio final argument must be a number (line {line})")]
    WidthRatioScale { line: usize },
    #[error("No URL resolver configured for the url tag (line {line})")]
    MissingResolver { line: usize },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    ParserError(#[from] ParserError),
    #[error(transparent)]
    RenderError(#[from] RenderError),
}
