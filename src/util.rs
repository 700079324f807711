//! Shared utility functions used across the codebase.

use regex::Regex;

/// Extract the body of the first fenced code block tagged `lang`.
///
/// Generators are asked to answer with ```` ```xml ```` / ```` ```ltl ```` fences; anything
/// outside the fence (explanations, apologies) is discarded. Returns `None` when no
/// fence is present or the fenced body is blank.
pub fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    // The tag ends at whitespace; ```xmlfoo is a different language.
    let pattern = format!(r"(?s)```{}(?:[ \t][^\n]*)?\r?\n(.*?)```", regex::escape(lang));
    let re = Regex::new(&pattern).ok()?;
    let body = re.captures(text)?.get(1)?.as_str();
    if body.trim().is_empty() {
        return None;
    }
    Some(body.to_string())
}

/// Sanitize subprocess output before it is logged or fed back into a prompt.
///
/// Invalid UTF-8 is replaced and control characters other than newlines/tabs dropped.
pub fn sanitize_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect()
}

/// Truncate `text` to at most `max_chars` characters for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}… ({} chars total)", head, text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_code_block_takes_fenced_body() {
        let answer = "Here you go:\n```xml\n<TaskTemplate/>\n```\nLet me know.";
        assert_eq!(
            extract_code_block(answer, "xml").as_deref(),
            Some("<TaskTemplate/>\n")
        );
    }

    #[test]
    fn extract_code_block_ignores_other_languages() {
        let answer = "```ltl\nltl m { <>p }\n```";
        assert!(extract_code_block(answer, "xml").is_none());
        assert!(extract_code_block(answer, "ltl").is_some());
    }

    #[test]
    fn extract_code_block_requires_whole_tag() {
        let answer = "```xmlfoo\n<a/>\n```\n```xml\n<b/>\n```";
        assert_eq!(extract_code_block(answer, "xml").as_deref(), Some("<b/>\n"));
        assert!(extract_code_block("```ltlx\nltl m { <>p }\n```", "ltl").is_none());
        assert_eq!(
            extract_code_block("```xml title=plan\n<c/>\n```", "xml").as_deref(),
            Some("<c/>\n")
        );
    }

    #[test]
    fn extract_code_block_rejects_blank_body() {
        assert!(extract_code_block("```xml\n   \n```", "xml").is_none());
        assert!(extract_code_block("no fences here", "xml").is_none());
    }

    #[test]
    fn sanitize_output_drops_control_bytes() {
        let raw = b"ok\x00 line\n\x07next";
        assert_eq!(sanitize_output(raw), "ok line\nnext");
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short", 10), "short");
        assert!(preview(&"a".repeat(50), 10).starts_with("aaaaaaaaaa…"));
    }
}
