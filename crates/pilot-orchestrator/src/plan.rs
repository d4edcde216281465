//! Plan parsing
//!
//! The oracle answers with a YAML document, often wrapped in a Markdown
//! fence. A valid plan has exactly two top-level keys, `action` and `params`.

use pilot_core::{ActionKind, Params, PilotError, PlannedAction, Result};
use serde_json::Value;

/// Parse an oracle answer into a [`PlannedAction`]
///
/// Tolerated shape variations:
/// - `params` absent or null becomes an empty mapping
/// - `params` given as a bare string is taken as the XPath for locator actions
///   and dropped otherwise
pub fn parse_plan(raw: &str) -> Result<PlannedAction> {
    let document = extract_document(raw);
    if document.is_empty() {
        return Err(PilotError::PlanParse("empty response".to_string()));
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(document)
        .map_err(|e| PilotError::PlanParse(format!("not valid YAML: {}", e)))?;
    let value = serde_json::to_value(&yaml)
        .map_err(|e| PilotError::PlanParse(format!("unsupported YAML structure: {}", e)))?;

    let Value::Object(mut fields) = value else {
        return Err(PilotError::PlanParse(format!(
            "expected a mapping with action and params, got {}",
            value
        )));
    };

    if let Some(extra) = fields.keys().find(|k| *k != "action" && *k != "params") {
        return Err(PilotError::PlanParse(format!("unexpected field '{}'", extra)));
    }

    let action: ActionKind = match fields.remove("action") {
        Some(Value::String(name)) => name.parse().map_err(PilotError::PlanParse)?,
        Some(other) => {
            return Err(PilotError::PlanParse(format!(
                "action must be a name, got {}",
                other
            )))
        }
        None => return Err(PilotError::PlanParse("missing action field".to_string())),
    };

    let params = match fields.remove("params") {
        None | Some(Value::Null) => Params::new(),
        Some(Value::Object(map)) => map,
        Some(Value::String(xpath)) if action.takes_locator() => {
            let mut params = Params::new();
            params.insert("xpath".to_string(), Value::String(xpath));
            params
        }
        Some(Value::String(_)) => Params::new(),
        Some(other) => {
            return Err(PilotError::PlanParse(format!(
                "params must be a mapping, got {}",
                other
            )))
        }
    };

    Ok(PlannedAction::new(action, params))
}

/// Body of the first fenced block, or the whole answer when unfenced
fn extract_document(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    // Skip the language tag on the opening fence line
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => after_fence,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_plan() {
        let raw = "Here is the plan:\n```yaml\naction: click_element\nparams:\n  xpath: //button[text()='Save']\n```\n";
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.action, ActionKind::ClickElement);
        assert_eq!(plan.param_str("xpath"), Some("//button[text()='Save']"));
    }

    #[test]
    fn test_bare_plan_with_numbers() {
        let plan = parse_plan("action: scroll_down\nparams:\n  pixel: 600\n").unwrap();
        assert_eq!(plan.action, ActionKind::ScrollDown);
        assert_eq!(plan.params["pixel"], json!(600));
    }

    #[test]
    fn test_missing_or_null_params() {
        assert!(parse_plan("action: go_back").unwrap().params.is_empty());
        assert!(parse_plan("action: go_back\nparams: null").unwrap().params.is_empty());
    }

    #[test]
    fn test_string_params_become_xpath() {
        let plan = parse_plan("action: click_element\nparams: \"//a[@id='home']\"").unwrap();
        assert_eq!(plan.param_str("xpath"), Some("//a[@id='home']"));

        let plan = parse_plan("action: go_back\nparams: whatever").unwrap();
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_rejected_shapes() {
        for raw in [
            "",
            "I think we should click the button",
            "- action: click_element",
            "params:\n  xpath: //a",
            "action: hover\nparams: {}",
            "action: go_back\nparams: {}\nreason: looks right",
            "action: click_element\nparams: [1, 2]",
            "action: [click_element]",
        ] {
            assert!(
                matches!(parse_plan(raw), Err(PilotError::PlanParse(_))),
                "accepted: {raw:?}"
            );
        }
    }

    #[test]
    fn test_extract_unlabelled_fence() {
        assert_eq!(extract_document("```\naction: go_back\n```"), "action: go_back");
        assert_eq!(extract_document("  action: go_back  "), "action: go_back");
    }
}
