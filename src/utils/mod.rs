//! Utility functions and helpers.

pub mod http;

use unicode_segmentation::UnicodeSegmentation;
use url::form_urlencoded;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Fill `{name}` placeholders in a link template.
///
/// Unknown placeholders are left as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}

/// URL-encode a value for use in a query string.
pub fn encode_query(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Truncate to at most `max` grapheme clusters, ending with [`ELLIPSIS`] when cut.
///
/// The ellipsis counts toward `max`.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out = graphemes[..keep].concat();
    out.push_str(ELLIPSIS);
    out
}

/// Mask a secret for display: first 4 characters then `***`.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}***")
}
