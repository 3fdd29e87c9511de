/// Literal output: template text, `verbatim` contents and `templatetag`
/// symbols all render as-is.
#[derive(Debug, Clone)]
pub struct TextNode {
    content: String,
}

impl TextNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }

    pub fn render(&self) -> String {
        self.content.clone()
    }
}

/// Maps a `templatetag` argument to the syntax characters it stands for.
pub fn template_tag_symbol(name: &str) -> Option<&'static str> {
    let symbol = match name {
        "openblock" => "{%",
        "closeblock" => "%}",
        "openvariable" => "{{",
        "closevariable" => "}}",
        "openbrace" => "{",
        "closebrace" => "}",
        "opencomment" => "{#",
        "closecomment" => "#}",
        _ => return None,
    };
    Some(symbol)
}
