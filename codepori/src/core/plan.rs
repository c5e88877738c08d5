//! Plan validation: schema conformance, then typed parsing.

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::types::Plan;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Validate an extracted plan value and convert it into a [`Plan`].
///
/// Every schema violation is reported at once so a bad plan can be diagnosed
/// from the log alone.
pub fn parse_plan(value: &Value) -> Result<Plan> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    validate_schema(value, &schema)?;
    let plan: Plan = serde_json::from_value(value.clone()).context("parse plan as struct")?;
    Ok(plan)
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("plan schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_plan() {
        let plan = parse_plan(&json!({
            "architecture": ["app.py: entrypoint"],
            "files": [{"path": "app.py", "purpose": "entrypoint"}],
            "tests": [{"path": "tests/test_app.py", "purpose": "smoke test"}],
            "notes": "none"
        }))
        .expect("plan");
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.tests[0].path, "tests/test_app.py");
        assert_eq!(plan.notes, "none");
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let plan = parse_plan(&json!({"notes": null})).expect("plan");
        assert!(plan.files.is_empty());
        assert!(plan.tests.is_empty());
    }

    #[test]
    fn advisory_fields_accept_any_shape() {
        let plan = parse_plan(&json!({
            "architecture": [{"module": "app.py", "role": "entry"}],
            "files": [{"path": "app.py", "purpose": "entrypoint"}],
            "notes": {"risk": "none"}
        }))
        .expect("plan");
        assert_eq!(plan.architecture.len(), 1);
        assert!(plan.architecture[0].contains("\"module\":\"app.py\""));
        assert_eq!(plan.notes, r#"{"risk":"none"}"#);
        assert_eq!(plan.files[0].path, "app.py");
    }

    #[test]
    fn rejects_non_object_plan() {
        let err = parse_plan(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn reports_every_malformed_descriptor() {
        let err = parse_plan(&json!({
            "files": [{"path": "a.py"}],
            "tests": [{"purpose": "no path"}]
        }))
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("purpose"), "{message}");
        assert!(message.contains("path"), "{message}");
        assert_eq!(message.matches("\n- ").count(), 2, "{message}");
    }
}
