use std::collections::BTreeMap;

/// Named constants available to condition values and broadcast rules.
///
/// Built once per rule-set load and passed by reference; a pass never
/// mutates it, so the same inputs always evaluate the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDictionary {
    vars: BTreeMap<String, String>,
}

impl DataDictionary {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a dictionary from raw JSON entries. Strings are kept verbatim,
    /// numbers and booleans use their JSON text, and nested objects or arrays
    /// (such as an embedded `latest_aggregation_config`) are skipped.
    pub fn from_json(entries: &BTreeMap<String, serde_json::Value>) -> Self {
        let vars = entries
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => return None,
                };
                Some((key.clone(), text))
            })
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataDictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_are_stringified_and_objects_skipped() {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "报表截止时间": "2025-07-31",
            "税率": 0.06,
            "启用": true,
            "latest_aggregation_config": { "default_time_field": "验收日" }
        }))
        .unwrap();

        let dict = DataDictionary::from_json(&raw);
        assert_eq!(dict.get("报表截止时间"), Some("2025-07-31"));
        assert_eq!(dict.get("税率"), Some("0.06"));
        assert_eq!(dict.get("启用"), Some("true"));
        assert!(!dict.contains("latest_aggregation_config"));
        assert_eq!(dict.len(), 3);
    }
}
