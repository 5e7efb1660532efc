use crate::rules::aggregation::SortOrder;
use serde::{Deserialize, Serialize};

/// Extra descriptive fields copied from the row selected by `latest`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldFill {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Global `latest` defaults from the rule-set document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatestAggregationConfig {
    #[serde(default)]
    pub default_time_field: Option<String>,
    #[serde(default)]
    pub default_sort_order: SortOrder,
    #[serde(default)]
    pub fallback_time_fields: Vec<String>,
    #[serde(default)]
    pub field_fill: FieldFill,
}

/// Per-rule or per-mapping override; unset members inherit the global config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatestConfig {
    #[serde(default)]
    pub time_field: Option<String>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub fallback_time_fields: Option<Vec<String>>,
    #[serde(default)]
    pub field_fill: Option<FieldFill>,
}

/// Effective selection parameters after merging an override with the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSelection {
    /// Primary time field first, then fallbacks, in the order they are tried.
    pub time_fields: Vec<String>,
    pub sort_order: SortOrder,
    pub fill_fields: Vec<String>,
}

impl LatestAggregationConfig {
    pub fn resolve(&self, local: Option<&LatestConfig>) -> LatestSelection {
        let primary = local
            .and_then(|l| l.time_field.clone())
            .filter(|f| !f.trim().is_empty())
            .or_else(|| self.default_time_field.clone());

        let fallbacks = local
            .and_then(|l| l.fallback_time_fields.clone())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| self.fallback_time_fields.clone());

        let mut time_fields: Vec<String> = primary.into_iter().collect();
        for field in fallbacks {
            if !time_fields.contains(&field) {
                time_fields.push(field);
            }
        }

        let fill = local
            .and_then(|l| l.field_fill.as_ref())
            .unwrap_or(&self.field_fill);

        LatestSelection {
            time_fields,
            sort_order: local
                .and_then(|l| l.sort_order)
                .unwrap_or(self.default_sort_order),
            fill_fields: if fill.enabled {
                fill.fields.clone()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> LatestAggregationConfig {
        LatestAggregationConfig {
            default_time_field: Some("验收日".into()),
            default_sort_order: SortOrder::Desc,
            fallback_time_fields: vec!["创建时间".into()],
            field_fill: FieldFill {
                enabled: true,
                fields: vec!["负责人".into()],
            },
        }
    }

    #[test]
    fn global_defaults_apply_without_override() {
        let sel = global().resolve(None);
        assert_eq!(sel.time_fields, vec!["验收日", "创建时间"]);
        assert_eq!(sel.sort_order, SortOrder::Desc);
        assert_eq!(sel.fill_fields, vec!["负责人"]);
    }

    #[test]
    fn override_replaces_only_set_members() {
        let local = LatestConfig {
            time_field: Some("签约日".into()),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        };
        let sel = global().resolve(Some(&local));
        assert_eq!(sel.time_fields, vec!["签约日", "创建时间"]);
        assert_eq!(sel.sort_order, SortOrder::Asc);
    }

    #[test]
    fn disabled_fill_yields_no_fields() {
        let local = LatestConfig {
            field_fill: Some(FieldFill {
                enabled: false,
                fields: vec!["x".into()],
            }),
            ..Default::default()
        };
        assert!(global().resolve(Some(&local)).fill_fields.is_empty());
    }
}
