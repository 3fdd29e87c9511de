use log::{error, trace};

use crate::context::Context;
use crate::core::expression::FilterExpression;
use crate::errors::RenderError;
use crate::types::Value;

/// `widthratio value max scale [as name]`: `round(value / max * scale)`.
#[derive(Debug, Clone)]
pub struct WidthRatioNode {
    value: FilterExpression,
    max: FilterExpression,
    scale: FilterExpression,
    asvar: Option<String>,
    line: usize,
}

impl WidthRatioNode {
    pub fn new(
        value: FilterExpression,
        max: FilterExpression,
        scale: FilterExpression,
        asvar: Option<String>,
        line: usize,
    ) -> Self {
        Self { value, max, scale, asvar, line }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let max = self.max.resolve(ctx);
        let Some(scale) = self.scale.resolve(ctx).to_int() else {
            error!("widthratio scale '{}' is not a number", self.scale.token());
            return Err(RenderError::WidthRatioScale { line: self.line });
        };
        let value = self.value.resolve(ctx);
        let result = ratio(&value, &max, scale);
        trace!("WidthRatioNode: {} / {} * {} = '{}'", value, max, scale, result);

        match &self.asvar {
            Some(name) => {
                ctx.set(name.clone(), Value::from(result));
                Ok(String::new())
            }
            None => Ok(result),
        }
    }
}

fn ratio(value: &Value, max: &Value, scale: i64) -> String {
    let (Some(value), Some(max)) = (value.to_float(), max.to_float()) else {
        return String::new();
    };
    if max == 0.0 {
        return "0".to_string();
    }
    let ratio = value / max * scale as f64;
    if !ratio.is_finite() {
        return String::new();
    }
    // exact integer digits, even past the i64 range; `+ 0.0` drops a negative zero
    format!("{:.0}", ratio.round_ties_even() + 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(ratio(&Value::from(175), &Value::from(200), 100), "88");
        assert_eq!(ratio(&Value::from(1), &Value::from(8), 4), "0");
        assert_eq!(ratio(&Value::from(3), &Value::from(8), 4), "2");
        assert_eq!(ratio(&Value::from(5), &Value::from(0), 100), "0");
        assert_eq!(ratio(&Value::from("x"), &Value::from(10), 100), "");
        assert_eq!(ratio(&Value::from("inf"), &Value::from(10), 100), "");
        assert_eq!(ratio(&Value::from(-1), &Value::from(10), 1), "0");
        assert_eq!(ratio(&Value::from(1e30), &Value::from(1), 1), "1000000000000000019884624838656");
    }
}
