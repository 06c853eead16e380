use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Conjunction of `matchNamespaces`, `matchLabels`, label expressions, `matchTags`
/// and `matchNames`, shared by `NotificationPolicy`, `Silence` and
/// `MaintenanceWindow` (GLOSSARY: Selector).
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct Selector {
    #[serde(rename = "matchNamespaces", skip_serializing_if = "Option::is_none")]
    pub match_namespaces: Option<Vec<String>>,
    #[serde(rename = "matchLabels", skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
    #[serde(rename = "matchExpressions", skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelExpression>>,
    #[serde(rename = "matchTags", skip_serializing_if = "Option::is_none")]
    pub match_tags: Option<Vec<String>>,
    #[serde(rename = "matchNames", skip_serializing_if = "Option::is_none")]
    pub match_names: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct LabelExpression {
    pub key: String,
    pub operator: LabelOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum LabelOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Facts about a monitor that selectors are matched against.
pub struct MatchSubject<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub tags: &'a [String],
}

impl Selector {
    /// AND across every configured dimension (§3 NotificationPolicy, §4.H).
    pub fn matches(&self, subject: &MatchSubject<'_>) -> bool {
        if let Some(namespaces) = &self.match_namespaces {
            if !namespaces.iter().any(|ns| ns == subject.namespace) {
                return false;
            }
        }
        if let Some(names) = &self.match_names {
            if !names.iter().any(|n| n == subject.name) {
                return false;
            }
        }
        if let Some(tags) = &self.match_tags {
            if !tags.iter().all(|t| subject.tags.contains(t)) {
                return false;
            }
        }
        if let Some(labels) = &self.match_labels {
            if !labels
                .iter()
                .all(|(k, v)| subject.labels.get(k) == Some(v))
            {
                return false;
            }
        }
        if let Some(expressions) = &self.match_expressions {
            if !expressions.iter().all(|expr| expr.matches(subject.labels)) {
                return false;
            }
        }
        true
    }
}

impl LabelExpression {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            LabelOperator::Exists => labels.contains_key(&self.key),
            LabelOperator::DoesNotExist => !labels.contains_key(&self.key),
            LabelOperator::In => match (&self.values, labels.get(&self.key)) {
                (Some(values), Some(v)) => values.contains(v),
                _ => false,
            },
            LabelOperator::NotIn => match (&self.values, labels.get(&self.key)) {
                (Some(values), Some(v)) => !values.contains(v),
                (Some(_), None) => true,
                (None, _) => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(
        namespace: &'a str,
        name: &'a str,
        labels: &'a BTreeMap<String, String>,
        tags: &'a [String],
    ) -> MatchSubject<'a> {
        MatchSubject {
            namespace,
            name,
            labels,
            tags,
        }
    }

    #[test]
    fn empty_selector_matches_everything() {
        let labels = BTreeMap::new();
        let tags = vec![];
        let s = subject("default", "mon", &labels, &tags);
        assert!(Selector::default().matches(&s));
    }

    #[test]
    fn match_labels_is_equality() {
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), "db".to_string());
        let tags = vec![];
        let s = subject("default", "mon", &labels, &tags);

        let mut want = BTreeMap::new();
        want.insert("service".to_string(), "db".to_string());
        let sel = Selector {
            match_labels: Some(want),
            ..Default::default()
        };
        assert!(sel.matches(&s));

        let mut wrong = BTreeMap::new();
        wrong.insert("service".to_string(), "web".to_string());
        let sel = Selector {
            match_labels: Some(wrong),
            ..Default::default()
        };
        assert!(!sel.matches(&s));
    }

    #[test]
    fn expression_operators() {
        let mut labels = BTreeMap::new();
        labels.insert("tier".to_string(), "critical".to_string());
        let tags = vec![];
        let s = subject("default", "mon", &labels, &tags);

        let exists = LabelExpression {
            key: "tier".to_string(),
            operator: LabelOperator::Exists,
            values: None,
        };
        assert!(exists.matches(&labels));

        let not_in = LabelExpression {
            key: "tier".to_string(),
            operator: LabelOperator::NotIn,
            values: Some(vec!["non-critical".to_string()]),
        };
        assert!(not_in.matches(&labels));

        let does_not_exist = LabelExpression {
            key: "absent".to_string(),
            operator: LabelOperator::DoesNotExist,
            values: None,
        };
        assert!(does_not_exist.matches(&labels));
    }

    #[test]
    fn match_tags_requires_all() {
        let labels = BTreeMap::new();
        let tags = vec!["prod".to_string(), "db".to_string()];
        let s = subject("default", "mon", &labels, &tags);

        let sel = Selector {
            match_tags: Some(vec!["prod".to_string(), "db".to_string()]),
            ..Default::default()
        };
        assert!(sel.matches(&s));

        let sel = Selector {
            match_tags: Some(vec!["staging".to_string()]),
            ..Default::default()
        };
        assert!(!sel.matches(&s));
    }
}
