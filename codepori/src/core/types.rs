//! Shared data types passed between pipeline stages.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One file the plan asks for, with a short description of its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub purpose: String,
}

/// Project plan produced once per run by the manager prompt.
///
/// Immutable after parsing; file generation consumes `files` then `tests` in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, deserialize_with = "bullets")]
    pub architecture: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub tests: Vec<FileSpec>,
    #[serde(default, deserialize_with = "free_text")]
    pub notes: String,
}

/// A file to materialize under the output code root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Sanitized path relative to the code root.
    pub path: PathBuf,
    pub content: String,
}

/// A proposed whole-file replacement from the debugger prompt.
///
/// `before` is only a soft precondition; `after` is the content to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub before: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub after: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub explanation: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept any JSON shape as advisory bullets.
///
/// Text is split into lines; list items and other values render as one bullet each.
fn bullets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::String(text) => text
            .lines()
            .map(|line| line.trim_start_matches(['-', '*', ' ']).trim_end())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items.into_iter().map(render).collect(),
        other => vec![other.to_string()],
    })
}

fn free_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::Array(items) => items.into_iter().map(render).collect::<Vec<_>>().join("\n"),
        other => render(other),
    })
}

fn render(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plan_accepts_text_architecture_and_list_notes() {
        let plan: Plan = serde_json::from_value(json!({
            "architecture": "- cli.py\n- core.py\n",
            "notes": ["no network", "python 3.11"]
        }))
        .expect("plan");
        assert_eq!(plan.architecture, vec!["cli.py", "core.py"]);
        assert_eq!(plan.notes, "no network\npython 3.11");
        assert!(plan.files.is_empty());
        assert!(plan.tests.is_empty());
    }

    #[test]
    fn patch_entry_defaults_optional_fields() {
        let entry: PatchEntry = serde_json::from_value(json!({"path": "a.py"})).expect("entry");
        assert_eq!(entry.before, "");
        assert_eq!(entry.after, "");
        assert_eq!(entry.explanation, "");
    }

    #[test]
    fn patch_entry_reads_null_fields_as_empty() {
        let entry: PatchEntry = serde_json::from_value(json!({
            "path": "a.py",
            "before": null,
            "after": "x = 1\n",
            "explanation": null
        }))
        .expect("entry");
        assert_eq!(entry.before, "");
        assert_eq!(entry.after, "x = 1\n");
        assert_eq!(entry.explanation, "");
    }

    #[test]
    fn plan_renders_structured_advisory_fields() {
        let plan: Plan = serde_json::from_value(json!({
            "architecture": [{"module": "app.py"}, "cli.py"],
            "notes": {"risk": "none"}
        }))
        .expect("plan");
        assert_eq!(plan.architecture, vec![r#"{"module":"app.py"}"#, "cli.py"]);
        assert_eq!(plan.notes, r#"{"risk":"none"}"#);
    }
}
