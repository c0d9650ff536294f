//! Pulls renderable HTML out of a payload that may be wrapped in a
//! markdown code fence.
//!
//! Chat-style clients frequently send HTML as
//!
//! ````text
//! Here is your report:
//! ```html
//! <h1>Report</h1>
//! ```
//! ````
//!
//! Only the first fenced block is used. A payload without a complete fence
//! is returned untouched.

const FENCE: &str = "```";
const HTML_TAG: &str = "html";

/// Return the trimmed interior of the first fenced code block in `text`,
/// or `text` itself when there is no usable fence.
///
/// The opening fence may carry an `html` tag. Any other tag is treated as
/// part of the block's content.
///
/// ```
/// assert_eq!(htmlshot::markup::extract_html("```html\n<p>hi</p>\n```"), "<p>hi</p>");
/// assert_eq!(htmlshot::markup::extract_html("<p>plain</p>"), "<p>plain</p>");
/// ```
pub fn extract_html(text: &str) -> &str {
    fenced_interior(text).unwrap_or(text)
}

fn fenced_interior(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let rest = &text[open + FENCE.len()..];
    let rest = rest.strip_prefix(HTML_TAG).unwrap_or(rest);
    let rest = rest.trim_start();

    let close = rest.find(FENCE)?;
    let interior = &rest[..close];
    if interior.is_empty() {
        return None;
    }
    Some(interior.trim())
}
