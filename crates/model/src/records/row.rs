use crate::core::{
    error::ValueError,
    value::{FieldValue, Value},
};
use serde::{Deserialize, Serialize};

/// JSON key carrying the store's persistent row identifier.
pub const ROW_ID_FIELD: &str = "_id";

/// An immutable snapshot of one table row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Row {
    pub id: Option<String>,
    pub fields: Vec<FieldValue>,
}

impl Row {
    pub fn new(id: Option<String>, fields: Vec<FieldValue>) -> Self {
        Row { id, fields }
    }

    pub fn with_id(id: impl Into<String>, fields: Vec<FieldValue>) -> Self {
        Row::new(Some(id.into()), fields)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == field)
    }

    /// Value of `field`, or `None` when the row does not carry that field at all.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.get(field).map(|f| &f.value)
    }

    /// Value of `field`, treating a missing field as `Null`.
    pub fn get_value(&self, field: &str) -> Value {
        self.value(field).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Sets `field`, replacing an existing cell in place or appending a new one.
    pub fn set(&mut self, field: &str, value: Value) {
        match self.fields.iter_mut().find(|f| f.name == field) {
            Some(existing) => existing.value = value,
            None => self.fields.push(FieldValue::new(field, value)),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl TryFrom<serde_json::Value> for Row {
    type Error = ValueError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(map) = json else {
            return Err(ValueError::NotAnObject(json.to_string()));
        };

        let mut id = None;
        let mut fields = Vec::with_capacity(map.len());
        for (name, raw) in map {
            if name == ROW_ID_FIELD {
                match raw {
                    serde_json::Value::String(s) => id = Some(s),
                    serde_json::Value::Null => {}
                    other => return Err(ValueError::InvalidRowId(other.to_string())),
                }
                continue;
            }
            fields.push(FieldValue::new(name, Value::from(raw)));
        }

        Ok(Row { id, fields })
    }
}

impl From<Row> for serde_json::Value {
    fn from(row: Row) -> Self {
        let mut map = serde_json::Map::with_capacity(row.fields.len() + 1);
        if let Some(id) = row.id {
            map.insert(ROW_ID_FIELD.to_string(), serde_json::Value::String(id));
        }
        for field in row.fields {
            map.insert(field.name, field.value.into());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_id_and_fields() {
        let row: Row = serde_json::from_value(json!({
            "_id": "r1",
            "合同编号": "HT-001",
            "金额": 12.5
        }))
        .unwrap();

        assert_eq!(row.id.as_deref(), Some("r1"));
        assert_eq!(row.get_value("合同编号"), Value::text("HT-001"));
        assert_eq!(row.get_value("金额"), Value::Float(12.5));
        assert!(row.value("missing").is_none());
        assert!(!row.contains(ROW_ID_FIELD));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(serde_json::from_value::<Row>(json!([1, 2])).is_err());
    }

    #[test]
    fn set_replaces_or_appends() {
        let mut row = Row::with_id("r1", vec![FieldValue::new("a", 1)]);
        row.set("a", Value::Int(2));
        row.set("b", Value::text("x"));
        assert_eq!(row.get_value("a"), Value::Int(2));
        assert_eq!(row.fields.len(), 2);
    }

    #[test]
    fn json_keeps_field_order() {
        let row = Row::with_id(
            "r1",
            vec![
                FieldValue::new("状态", "有效"),
                FieldValue::new("合同编号", "HT-001"),
                FieldValue::new("amount", 3),
            ],
        );
        let json: serde_json::Value = row.into();
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec![ROW_ID_FIELD, "状态", "合同编号", "amount"]);
    }
}
