use serde::Deserialize;

/// Engine settings. Every field has a default, so a partial JSON document
/// (or none at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ambient autoescape setting at the start of every render.
    pub autoescape: bool,
    /// Text emitted for a missing variable in display position. A `%s`
    /// placeholder is replaced with the variable's path.
    pub string_if_invalid: String,
    pub number: NumberFormatConfig,
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    pub short_date_format: String,
    pub short_datetime_format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autoescape: true,
            string_if_invalid: String::new(),
            number: NumberFormatConfig::default(),
            date_format: "N j, Y".to_string(),
            time_format: "P".to_string(),
            datetime_format: "N j, Y, P".to_string(),
            short_date_format: "m/d/Y".to_string(),
            short_datetime_format: "m/d/Y P".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Resolves a named format (`DATE_FORMAT`, `SHORT_DATE_FORMAT`, ...).
    /// Anything else is returned unchanged as a literal format string.
    pub fn named_format<'a>(&'a self, name: &'a str) -> &'a str {
        match name {
            "DATE_FORMAT" => &self.date_format,
            "TIME_FORMAT" => &self.time_format,
            "DATETIME_FORMAT" => &self.datetime_format,
            "SHORT_DATE_FORMAT" => &self.short_date_format,
            "SHORT_DATETIME_FORMAT" => &self.short_datetime_format,
            other => other,
        }
    }
}

/// Locale settings used by the default number formatter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NumberFormatConfig {
    pub decimal_separator: String,
    pub thousand_separator: String,
    pub grouping: usize,
    pub use_thousand_separator: bool,
}

impl Default for NumberFormatConfig {
    fn default() -> Self {
        Self {
            decimal_separator: ".".to_string(),
            thousand_separator: ",".to_string(),
            grouping: 3,
            use_thousand_separator: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"autoescape": false, "number": {"decimal_separator": ","}}"#).unwrap();
        assert!(!config.autoescape);
        assert_eq!(config.number.decimal_separator, ",");
        assert_eq!(config.number.thousand_separator, ",");
        assert_eq!(config.named_format("DATE_FORMAT"), "N j, Y");
        assert_eq!(config.named_format("Y-m-d"), "Y-m-d");
    }
}
