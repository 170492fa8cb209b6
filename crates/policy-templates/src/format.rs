//! JSON/YAML conversion
//!
//! Templates are resolved on YAML text: the document arrives as JSON, is
//! emitted as YAML (two-space indentation, no line wrapping, so expressions
//! stay on one line), and the resolved text is parsed back to JSON.

use crate::error::{Stage, TemplateError, TemplateResult};

/// Convert a JSON document to YAML text.
pub fn json_to_yaml(json: &[u8]) -> TemplateResult<String> {
    let value: serde_json::Value = serde_json::from_slice(json)
        .map_err(|e| TemplateError::conversion(Stage::ConvertToYaml, e.to_string()))?;

    serde_yaml::to_string(&value)
        .map_err(|e| TemplateError::conversion(Stage::ConvertToYaml, e.to_string()))
}

/// Convert YAML text to a compact JSON document.
pub fn yaml_to_json(yaml: &str) -> TemplateResult<Vec<u8>> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)
        .map_err(|e| TemplateError::conversion(Stage::ConvertToJson, e.to_string()))?;

    serde_json::to_vec(&value)
        .map_err(|e| TemplateError::conversion(Stage::ConvertToJson, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(value: serde_json::Value) -> serde_json::Value {
        let yaml = json_to_yaml(&serde_json::to_vec(&value).unwrap()).unwrap();
        serde_json::from_slice(&yaml_to_json(&yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_scalar_types() {
        let doc = json!({
            "replicas": 3,
            "ratio": 0.5,
            "enabled": true,
            "quoted_bool": "true",
            "quoted_int": "42",
            "nothing": null,
            "list": [1, "two", false],
            "nested": {"empty": "", "multi": "line one\nline two"}
        });
        assert_eq!(round_trip(doc.clone()), doc);
    }

    #[test]
    fn test_long_lines_are_not_wrapped() {
        let long = format!("{{{{ fromConfigMap \"ns\" \"cm\" \"{}\" }}}}", "k".repeat(200));
        let yaml = json_to_yaml(&serde_json::to_vec(&json!({ "value": long })).unwrap()).unwrap();
        assert_eq!(yaml.lines().count(), 1, "unexpected wrapping: {}", yaml);
        assert!(yaml.contains(&long));
    }

    #[test]
    fn test_nested_maps_use_two_space_indent() {
        let yaml = json_to_yaml(br#"{"spec":{"severity":"low"}}"#).unwrap();
        assert_eq!(yaml, "spec:\n  severity: low\n");
    }

    #[test]
    fn test_malformed_json_names_stage() {
        let err = json_to_yaml(b"{\"a\":").unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ConvertToYaml));
    }

    #[test]
    fn test_malformed_yaml_names_stage() {
        let err = yaml_to_json("a: [unclosed").unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ConvertToJson));
    }
}
