//! Recover a single JSON value from free-form model output.
//!
//! Model replies are not guaranteed to be pure JSON: they are often wrapped in
//! markdown fences or surrounded by commentary. Extraction first tries the whole
//! (trimmed) reply, then falls back to the first well-nested `{...}` / `[...]`
//! block. Callers treat `None` as "no usable structure".

use serde_json::Value;

/// Parse `text` as JSON, or the first balanced top-level block embedded in it.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let block = first_balanced_block(trimmed)?;
    serde_json::from_str(block).ok()
}

/// Extract and require a JSON object.
pub fn extract_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Extract and require a JSON array.
pub fn extract_array(text: &str) -> Option<Vec<Value>> {
    match extract_json(text)? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Return the substring from the first opener up to the closer that empties the
/// bracket stack.
///
/// Closers seen with an empty stack are noise and skipped. A mismatched pair
/// still pops the stack but never terminates the block.
fn first_balanced_block(text: &str) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' | '[' => {
                if start.is_none() {
                    start = Some(idx);
                }
                stack.push(ch);
            }
            '}' | ']' => {
                let Some(opener) = stack.pop() else {
                    continue;
                };
                let matched = matches!((opener, ch), ('{', '}') | ('[', ']'));
                if matched && stack.is_empty() {
                    let start = start?;
                    return Some(&text[start..idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
