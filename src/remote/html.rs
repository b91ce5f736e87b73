//! Storage-format HTML to plain text.

use regex::Regex;
use std::sync::OnceLock;

fn block_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</(p|div|h[1-6]|li|td|th|tr|section|article|blockquote|pre)>|<(br|hr)\s*/?>")
            .expect("Invalid regex pattern")
    })
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("Invalid regex pattern"))
}

/// Strip markup, keeping block boundaries as spaces.
pub fn html_to_text(html: &str) -> String {
    let spaced = block_close().replace_all(html, " ");
    let stripped = any_tag().replace_all(&spaced, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        // last, so "&amp;lt;" decodes to "&lt;" rather than "<"
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
