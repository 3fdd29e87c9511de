use chrono::Local;
use log::{error, trace, warn};

use crate::context::Context;
use crate::core::escape::conditional_escape;
use crate::core::expression::{lookup_segment, FilterExpression};
use crate::errors::RenderError;
use crate::types::Value;

use super::render_value_in_context;

/// `firstof a b "c" [as name]`: the first truthy value.
#[derive(Debug, Clone)]
pub struct FirstOfNode {
    values: Vec<FilterExpression>,
    asvar: Option<String>,
}

impl FirstOfNode {
    pub fn new(values: Vec<FilterExpression>, asvar: Option<String>) -> Self {
        Self { values, asvar }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> String {
        let first = self
            .values
            .iter()
            .map(|expr| expr.resolve_quiet(ctx))
            .find(Value::is_true)
            .map(|value| render_value_in_context(&value, ctx))
            .unwrap_or_default();
        match &self.asvar {
            Some(name) => {
                ctx.set(name.clone(), Value::String(first));
                String::new()
            }
            None => first.into_string(),
        }
    }
}

/// `now "format" [as name]`.
#[derive(Debug, Clone)]
pub struct NowNode {
    format: String,
    asvar: Option<String>,
}

impl NowNode {
    pub fn new(format: String, asvar: Option<String>) -> Self {
        Self { format, asvar }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> String {
        let now = Local::now().naive_local();
        let format = ctx.config().named_format(&self.format);
        let formatted = ctx.services().date_formatter.format_date(&now, format);
        match &self.asvar {
            Some(name) => {
                ctx.set(name.clone(), Value::from(formatted));
                String::new()
            }
            None => formatted,
        }
    }
}

/// `url name arg key=value [as name]`, reversed through the host's resolver.
#[derive(Debug, Clone)]
pub struct UrlNode {
    name: FilterExpression,
    args: Vec<FilterExpression>,
    kwargs: Vec<(String, FilterExpression)>,
    asvar: Option<String>,
    line: usize,
}

impl UrlNode {
    pub fn new(
        name: FilterExpression,
        args: Vec<FilterExpression>,
        kwargs: Vec<(String, FilterExpression)>,
        asvar: Option<String>,
        line: usize,
    ) -> Self {
        Self { name, args, kwargs, asvar, line }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let Some(resolver) = ctx.services().url_resolver.clone() else {
            error!("url tag used without a URL resolver");
            return Err(RenderError::MissingResolver { line: self.line });
        };
        let args: Vec<Value> = self.args.iter().map(|arg| arg.resolve(ctx)).collect();
        let kwargs: Vec<(String, Value)> =
            self.kwargs.iter().map(|(key, expr)| (key.clone(), expr.resolve(ctx))).collect();
        let name = self.name.resolve(ctx).to_string();
        let current_app = ctx
            .get("request")
            .and_then(|request| {
                lookup_segment(request, "current_app").or_else(|| {
                    lookup_segment(request, "resolver_match")
                        .and_then(|resolved| lookup_segment(&resolved, "namespace"))
                })
            })
            .and_then(|app| app.as_str().map(str::to_string));

        let url = match resolver.reverse(&name, &args, &kwargs, current_app.as_deref()) {
            Ok(url) => url,
            Err(err) if self.asvar.is_some() => {
                trace!("UrlNode: {} (bound to a variable, ignoring)", err);
                String::new()
            }
            Err(err) => {
                error!("{}", err);
                return Err(RenderError::NoReverseMatch { name, line: self.line });
            }
        };

        match &self.asvar {
            Some(var) => {
                ctx.set(var.clone(), Value::from(url));
                Ok(String::new())
            }
            None if ctx.autoescape() => Ok(conditional_escape(&Value::from(url)).into_string()),
            None => Ok(url),
        }
    }
}

/// `csrf_token`: hidden form field carrying the `csrf_token` scope value.
#[derive(Debug, Clone, Default)]
pub struct CsrfTokenNode;

impl CsrfTokenNode {
    pub fn render(&self, ctx: &Context<'_>) -> String {
        match ctx.get("csrf_token").filter(|token| token.is_true()) {
            Some(token) if token.as_str() == Some("NOTPROVIDED") => String::new(),
            Some(token) => format!(
                "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"{}\">",
                conditional_escape(token).as_str()
            ),
            None => {
                warn!("csrf_token used in a template, but the context did not provide the value");
                String::new()
            }
        }
    }
}
