// Audience Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Remote mutation an audience needs after planning.
///
/// `Create` and `Update` are mutually exclusive; `UpdateShares` is independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Update,
    UpdateShares,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "CREATE"),
            Action::Update => write!(f, "UPDATE"),
            Action::UpdateShares => write!(f, "UPDATE_SHARES"),
        }
    }
}

/// One row of the flat rule table.
///
/// Rules sharing a `group` end up in the same remote clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceRule {
    pub group: u32,
    pub variable_name: String,
    #[serde(default)]
    pub variable_friendly_name: String,
    pub operator: String,
    /// May hold several sub-values joined by the configured separator
    pub value: String,
    #[serde(default)]
    pub negation: bool,
}

impl AudienceRule {
    pub fn new(
        group: u32,
        variable_name: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            group,
            variable_name: variable_name.into(),
            variable_friendly_name: String::new(),
            operator: operator.into(),
            value: value.into(),
            negation: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negation = true;
        self
    }
}

/// Named targeting definition kept in sync with the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audience {
    /// Absent until the first remote creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Membership duration in days
    #[serde(default)]
    pub life_span: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floodlight_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floodlight_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<AudienceRule>,
    /// Account ids the audience is shared with
    #[serde(default)]
    pub shares: BTreeSet<String>,
}

impl Audience {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            life_span: 0,
            floodlight_id: None,
            floodlight_name: None,
            rules: Vec::new(),
            shares: BTreeSet::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.as_deref().map_or(true, str::is_empty)
    }

    /// Check the rule grouping invariant: each group forms one contiguous run.
    pub fn validate_rule_groups(&self) -> super::error::Result<()> {
        let mut seen = BTreeSet::new();
        let mut current: Option<u32> = None;
        for rule in &self.rules {
            if current != Some(rule.group) {
                if !seen.insert(rule.group) {
                    return Err(super::DomainError::ValidationError(format!(
                        "audience '{}': rules of group {} are not contiguous",
                        self.name, rule.group
                    )));
                }
                current = Some(rule.group);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_json_uses_camel_case() {
        let mut audience = Audience::new("Cart abandoners");
        audience.life_span = 30;
        audience.floodlight_id = Some("42".to_string());

        let value = serde_json::to_value(&audience).unwrap();
        assert_eq!(value["lifeSpan"], 30);
        assert_eq!(value["floodlightId"], "42");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_audience_decodes_with_defaults() {
        let audience: Audience = serde_json::from_str(r#"{"name":"A"}"#).unwrap();
        assert_eq!(audience.name, "A");
        assert!(audience.rules.is_empty());
        assert!(audience.shares.is_empty());
        assert!(audience.is_new());
    }

    #[test]
    fn test_rule_groups_must_be_contiguous() {
        let mut audience = Audience::new("A");
        audience.rules = vec![
            AudienceRule::new(0, "u1", "EQUALS", "x"),
            AudienceRule::new(1, "u2", "EQUALS", "y"),
            AudienceRule::new(0, "u3", "EQUALS", "z"),
        ];
        assert!(audience.validate_rule_groups().is_err());

        audience.rules.swap(1, 2);
        assert!(audience.validate_rule_groups().is_ok());
    }

    #[test]
    fn test_action_wire_names() {
        let json = serde_json::to_string(&Action::UpdateShares).unwrap();
        assert_eq!(json, "\"UPDATE_SHARES\"");
        assert_eq!(Action::Create.to_string(), "CREATE");
    }
}
