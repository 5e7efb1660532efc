use crate::{context::dictionary::DataDictionary, error::ContextError};
use lazy_static::lazy_static;
use model::core::value::Value;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid");
}

/// Substitutes `{name}` placeholders with data dictionary entries.
///
/// Substitution is a single textual pass: braces inside a substituted value
/// are never expanded again.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    dictionary: &'a DataDictionary,
}

impl<'a> VariableResolver<'a> {
    pub fn new(dictionary: &'a DataDictionary) -> Self {
        Self { dictionary }
    }

    /// Placeholder names referenced by `text`, in order of appearance.
    pub fn placeholders(text: &str) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(text)
            .map(|c| c[1].trim().to_string())
            .collect()
    }

    /// Names referenced by `value` that the dictionary does not define.
    pub fn unresolved(&self, value: &Value) -> Vec<String> {
        match value {
            Value::String(text) => Self::placeholders(text)
                .into_iter()
                .filter(|name| !self.dictionary.contains(name))
                .collect(),
            Value::List(items) => items.iter().flat_map(|v| self.unresolved(v)).collect(),
            _ => Vec::new(),
        }
    }

    pub fn resolve_str(&self, text: &str) -> Result<String, ContextError> {
        if let Some(name) = Self::placeholders(text)
            .into_iter()
            .find(|name| !self.dictionary.contains(name))
        {
            return Err(ContextError::UnresolvedVariable(name));
        }

        Ok(PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                self.dictionary
                    .get(caps[1].trim())
                    .unwrap_or_default()
                    .to_string()
            })
            .into_owned())
    }

    /// Resolves placeholders inside string values; other shapes pass through.
    pub fn resolve(&self, value: &Value) -> Result<Value, ContextError> {
        match value {
            Value::String(text) => self.resolve_str(text).map(Value::String),
            Value::List(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> DataDictionary {
        [
            ("报表截止时间", "2025-07-31"),
            ("年份", "2025"),
            ("nested", "{年份}"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn substitutes_whole_and_embedded_placeholders() {
        let dict = dict();
        let r = VariableResolver::new(&dict);

        assert_eq!(
            r.resolve(&Value::text("{报表截止时间}")).unwrap(),
            Value::text("2025-07-31")
        );
        assert_eq!(
            r.resolve(&Value::text("FY{年份}-Q1")).unwrap(),
            Value::text("FY2025-Q1")
        );
        assert_eq!(r.resolve(&Value::Int(3)).unwrap(), Value::Int(3));
    }

    #[test]
    fn does_not_expand_recursively() {
        let dict = dict();
        let r = VariableResolver::new(&dict);
        assert_eq!(r.resolve_str("{nested}").unwrap(), "{年份}");
    }

    #[test]
    fn unknown_names_are_reported() {
        let dict = dict();
        let r = VariableResolver::new(&dict);

        assert_eq!(
            r.resolve_str("{missing}"),
            Err(ContextError::UnresolvedVariable("missing".into()))
        );
        assert_eq!(
            r.unresolved(&Value::text("{年份} {a} {b}")),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
