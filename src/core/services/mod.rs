// Collaborators invoked mid-render. Each is a trait so hosts can inject
// their own implementation; the defaults cover the common case.
pub mod choice;
pub mod dates;
pub mod numbers;
pub mod url;

pub use choice::{ChoiceSource, ThreadRngChoice};
pub use dates::{DateFormatter, PhpDateFormatter};
pub use numbers::{LocaleNumberFormatter, NumberFormatter};
pub use url::{NoReverseMatch, UrlResolver};
