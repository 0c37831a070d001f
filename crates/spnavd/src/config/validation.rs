//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    for path in unknown_fields(content) {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Paths of fields the daemon does not understand, e.g. `devices.typo`.
/// Invalid JSON yields nothing; the parser reports it separately.
#[must_use]
pub fn unknown_fields(content: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    find_unknown_keys(&value, &expected_config_keys(), "")
}

fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_config_keys() -> ExpectedKeys {
    let device_keys = ExpectedKeys::new(&["match", "maxDevices", "grab", "inputDir"]);

    ExpectedKeys::new(&["socketPath", "hotplug", "sendQueueFrames", "maxSensitivity"])
        .with_nested("devices", device_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_no_warnings() {
        let json = r#"{
            "socketPath": "/run/spnav.sock",
            "hotplug": false,
            "devices": {
                "match": [{"vendor": 1133}],
                "maxDevices": 2
            }
        }"#;

        let unknowns = unknown_fields(json);
        assert!(
            unknowns.is_empty(),
            "Expected no unknowns, got: {unknowns:?}"
        );
    }

    #[test]
    fn test_unknown_top_level_field() {
        let json = r#"{"hotplug": true, "deadZone": 3}"#;
        assert_eq!(unknown_fields(json), vec!["deadZone"]);
    }

    #[test]
    fn test_unknown_nested_field() {
        let json = r#"{"devices": {"grab": false, "grabb": true}}"#;
        assert_eq!(unknown_fields(json), vec!["devices.grabb"]);
    }

    #[test]
    fn test_invalid_json_reports_nothing() {
        assert!(unknown_fields("not valid json").is_empty());
        warn_unknown_fields("not valid json", "test");
    }

    #[test]
    fn test_empty_config_no_warnings() {
        assert!(unknown_fields("{}").is_empty());
    }
}
