// Population Rule Model (remote API shape)

use serde::{Deserialize, Serialize};

/// Kind of a population term understood by the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermType {
    CustomVariableTerm,
}

/// Single targeting condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub variable_name: String,
    #[serde(rename = "type")]
    pub term_type: TermType,
    pub operator: String,
    pub value: String,
    #[serde(default)]
    pub negation: bool,
}

/// Group of terms evaluated together by the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default)]
    pub terms: Vec<Term>,
}

/// Nested rule structure attached to a remote audience
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floodlight_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floodlight_name: Option<String>,
    /// Omitted entirely when there are no rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clauses: Option<Vec<Clause>>,
}

/// Entry of the caller-supplied lookup used to label imported variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableName {
    /// System identifier such as `U1`
    pub system_name: String,
    pub friendly_name: String,
}

impl VariableName {
    pub fn new(system_name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            friendly_name: friendly_name.into(),
        }
    }
}
