//! Text helpers for comparing and cleaning generated content.

use std::sync::LazyLock;

use regex::Regex;

/// Normalize line endings, strip trailing whitespace per line, and trim the whole text.
pub fn normalize_ws(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Unwrap content that is entirely enclosed in one markdown code fence.
///
/// The unwrapped body keeps its final newline. Content with prose outside the fence, or with
/// several fences, is returned unchanged.
pub fn strip_code_fence(content: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A\s*```[\w+.#-]*[^\S\n]*\n(.*?\n?)```\s*\z").unwrap()
    });

    match FENCE_RE.captures(content).and_then(|caps| caps.get(1)) {
        Some(body) if !body.as_str().contains("\n```") => body.as_str(),
        _ => content,
    }
}
