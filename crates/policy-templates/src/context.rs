//! Execution context
//!
//! Templates can reference caller-supplied values as `{{ .Field }}`. The
//! caller hands over any `Serialize` record; it is accepted only if it
//! serializes to a flat object whose values are all strings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{TemplateError, TemplateResult};

/// Flat mapping of field name to string value, built fresh per resolve call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    fields: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Validate a caller-supplied record. `None` yields an empty context.
    pub fn from_serialize<C>(context: Option<&C>) -> TemplateResult<Self>
    where
        C: Serialize + ?Sized,
    {
        let Some(context) = context else {
            return Ok(Self::default());
        };

        let value = serde_json::to_value(context)
            .map_err(|e| {
                TemplateError::context(format!("failed to serialize the context: {}", e))
            })?;

        let serde_json::Value::Object(map) = value else {
            return Err(TemplateError::context(format!(
                "got {}",
                json_kind(&value)
            )));
        };

        let mut fields = BTreeMap::new();
        for (name, value) in map {
            match value {
                serde_json::Value::String(s) => {
                    fields.insert(name, s);
                }
                other => {
                    return Err(TemplateError::context(format!(
                        "field {} is {}",
                        name,
                        json_kind(&other)
                    )));
                }
            }
        }

        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ExecutionContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a bool",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct ClusterContext {
        cluster_name: String,
        cluster_id: String,
    }

    #[derive(Serialize)]
    struct Nested {
        name: String,
        labels: HashMap<String, String>,
    }

    #[derive(Serialize)]
    struct Numeric {
        replicas: u32,
    }

    #[test]
    fn test_none_is_empty() {
        let ctx = ExecutionContext::from_serialize::<ClusterContext>(None).unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_struct_with_string_fields() {
        let ctx = ExecutionContext::from_serialize(Some(&ClusterContext {
            cluster_name: "cluster1".to_string(),
            cluster_id: "abc".to_string(),
        }))
        .unwrap();
        assert_eq!(ctx.get("ClusterName"), Some("cluster1"));
        assert_eq!(ctx.get("ClusterID"), None);
        assert_eq!(ctx.get("ClusterId"), Some("abc"));
    }

    #[test]
    fn test_string_map_is_accepted() {
        let map: HashMap<&str, &str> = [("Name", "cluster1")].into_iter().collect();
        let ctx = ExecutionContext::from_serialize(Some(&map)).unwrap();
        assert_eq!(ctx.get("Name"), Some("cluster1"));
    }

    #[test]
    fn test_rejects_non_record() {
        let err = ExecutionContext::from_serialize(Some("cluster1")).unwrap_err();
        assert!(matches!(err, TemplateError::Context { .. }));
        assert!(err.to_string().contains("got a string"));
    }

    #[test]
    fn test_rejects_nested_and_numeric_fields() {
        let err = ExecutionContext::from_serialize(Some(&Nested {
            name: "n".to_string(),
            labels: HashMap::new(),
        }))
        .unwrap_err();
        assert!(err.to_string().contains("field labels is an object"));

        let err = ExecutionContext::from_serialize(Some(&Numeric { replicas: 3 })).unwrap_err();
        assert!(err.to_string().contains("field replicas is a number"));
    }

    #[test]
    fn test_from_iterator() {
        let ctx: ExecutionContext = [("Name", "cluster1")].into_iter().collect();
        assert_eq!(ctx.get("Name"), Some("cluster1"));
    }
}
