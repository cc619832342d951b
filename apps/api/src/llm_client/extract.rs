//! Best-effort repair of JSON embedded in model output.
//!
//! Models wrap JSON in prose, Markdown fences, smart quotes and trailing
//! commas. `extract_json` undoes the common cases; it does not guarantee a
//! parseable result, callers still handle the parse error.

use regex::Regex;

fn fence_re() -> &'static Regex {
    static_regex!(r"(?i)```(?:json)?\n?")
}

fn leading_json_re() -> &'static Regex {
    static_regex!(r"(?i)^json\n?")
}

fn line_comment_re() -> &'static Regex {
    static_regex!(r"\n\s*//[^\n]*")
}

fn trailing_comma_re() -> &'static Regex {
    static_regex!(r",(\s*[}\]])")
}

fn whitespace_re() -> &'static Regex {
    static_regex!(r"\s+")
}

/// Returns the most JSON-like span of `raw`, normalised.
pub fn extract_json(raw: &str) -> String {
    let unfenced = fence_re().replace_all(raw, "");
    let unfenced = leading_json_re().replace(unfenced.trim(), "");
    let text = unfenced.trim();

    let span = outer_span(text).unwrap_or(text);

    let quotes = span
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let no_comments = line_comment_re().replace_all(&quotes, "");
    let no_trailing = trailing_comma_re().replace_all(&no_comments, "$1");
    let collapsed = whitespace_re().replace_all(&no_trailing, " ");

    collapsed.trim().to_string()
}

/// Slice from the first opening brace/bracket to its last matching closer.
/// An object wins over an array when it starts first.
fn outer_span(text: &str) -> Option<&str> {
    let first_brace = text.find('{');
    let first_bracket = text.find('[');

    let (start, end) = match (first_brace, first_bracket) {
        (Some(b), Some(k)) if b < k => (b, text.rfind('}')?),
        (Some(b), None) => (b, text.rfind('}')?),
        (_, Some(k)) => (k, text.rfind(']')?),
        (None, None) => return None,
    };

    (end > start).then(|| &text[start..=end])
}
