use std::fmt::Debug;

use thiserror::Error;

use crate::types::Value;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Reverse for '{0}' not found")]
pub struct NoReverseMatch(pub String);

/// Bridge to the host's URL reversal.
///
/// The engine treats the returned URL as an opaque string. A
/// `NoReverseMatch` aborts the render unless the `url` tag binds its result
/// to a variable, in which case the variable receives an empty string.
pub trait UrlResolver: Debug + Send + Sync {
    fn reverse(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
        current_app: Option<&str>,
    ) -> Result<String, NoReverseMatch>;
}
