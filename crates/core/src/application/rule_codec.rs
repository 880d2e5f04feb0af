//! Rule Codec - flat rule table <-> grouped population rule
//!
//! Encoding groups rules by `group` (ascending) into clauses; each rule
//! contributes one term per separator-delimited sub-value, keeping the order
//! rules were given in. Decoding tags each clause's terms with the clause
//! position as group and merges adjacent terms of the same condition back into
//! one rule, as long as every merged value splits back out unchanged.
//!
//! What a clause means (AND/OR) is left to the remote API.

use super::constants::{DEFAULT_RULE_SEPARATOR, DEFAULT_TERM_TYPE};
use crate::domain::{Audience, AudienceRule, Clause, PopulationRule, Term, VariableName};
use crate::port::RemarketingList;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RuleCodec {
    separator: String,
}

impl Default for RuleCodec {
    fn default() -> Self {
        Self::new(DEFAULT_RULE_SEPARATOR)
    }
}

impl RuleCodec {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn to_population_rule(
        &self,
        floodlight_id: Option<&str>,
        rules: &[AudienceRule],
    ) -> PopulationRule {
        let mut groups: BTreeMap<u32, Vec<Term>> = BTreeMap::new();
        for rule in rules {
            let terms = groups.entry(rule.group).or_default();
            for value in self.split_value(&rule.value) {
                terms.push(Term {
                    variable_name: rule.variable_name.clone(),
                    term_type: DEFAULT_TERM_TYPE,
                    operator: rule.operator.clone(),
                    value,
                    negation: rule.negation,
                });
            }
        }

        let clauses = if groups.is_empty() {
            None
        } else {
            Some(
                groups
                    .into_values()
                    .map(|terms| Clause { terms })
                    .collect(),
            )
        };

        PopulationRule {
            floodlight_id: floodlight_id.map(str::to_string),
            floodlight_name: None,
            clauses,
        }
    }

    /// Inverse of [`to_population_rule`](Self::to_population_rule).
    ///
    /// Friendly labels come from `variables` (case-insensitive match on the
    /// system name); an unknown variable gets an empty label.
    pub fn from_population_rule(
        &self,
        population_rule: &PopulationRule,
        variables: &[VariableName],
    ) -> Vec<AudienceRule> {
        let mut rules: Vec<AudienceRule> = Vec::new();
        let clauses = population_rule.clauses.as_deref().unwrap_or_default();

        for (position, clause) in clauses.iter().enumerate() {
            let group = u32::try_from(position).unwrap_or(u32::MAX);
            let first_of_clause = rules.len();
            let mut last_mergeable = false;

            for term in &clause.terms {
                let mergeable = self.is_mergeable(&term.value);
                if let Some(last) = rules[first_of_clause..].last_mut() {
                    if mergeable
                        && last_mergeable
                        && last.variable_name == term.variable_name
                        && last.operator == term.operator
                        && last.negation == term.negation
                    {
                        last.value.push_str(&self.separator);
                        last.value.push_str(&term.value);
                        continue;
                    }
                }
                last_mergeable = mergeable;
                rules.push(AudienceRule {
                    group,
                    variable_name: term.variable_name.clone(),
                    variable_friendly_name: friendly_name(&term.variable_name, variables),
                    operator: term.operator.clone(),
                    value: term.value.clone(),
                    negation: term.negation,
                });
            }
        }
        rules
    }

    /// Remote resource for create/update calls
    pub fn to_remarketing_list(&self, audience: &Audience) -> RemarketingList {
        let mut population_rule =
            self.to_population_rule(audience.floodlight_id.as_deref(), &audience.rules);
        population_rule.floodlight_name = audience.floodlight_name.clone();

        RemarketingList {
            id: audience.id.clone(),
            name: audience.name.clone(),
            description: audience.description.clone(),
            life_span: audience.life_span,
            list_population_rule: Some(population_rule),
        }
    }

    /// Audience imported from a remote resource (shares are fetched separately)
    pub fn from_remarketing_list(
        &self,
        list: &RemarketingList,
        variables: &[VariableName],
    ) -> Audience {
        let mut audience = Audience::new(list.name.clone());
        audience.id = list.id.clone();
        audience.description = list.description.clone();
        audience.life_span = list.life_span;

        if let Some(population_rule) = &list.list_population_rule {
            audience.floodlight_id = population_rule.floodlight_id.clone();
            audience.floodlight_name = population_rule.floodlight_name.clone();
            audience.rules = self.from_population_rule(population_rule, variables);
        }
        audience
    }

    /// A value that [`split_value`](Self::split_value) returns as itself
    fn is_mergeable(&self, value: &str) -> bool {
        !value.is_empty() && value.trim() == value && !value.contains(self.separator.as_str())
    }

    fn split_value(&self, value: &str) -> Vec<String> {
        let values: Vec<String> = value
            .split(self.separator.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            // Keep the condition even when it carries no value
            vec![String::new()]
        } else {
            values
        }
    }
}

fn friendly_name(variable_name: &str, variables: &[VariableName]) -> String {
    variables
        .iter()
        .find(|v| v.system_name.eq_ignore_ascii_case(variable_name))
        .map(|v| v.friendly_name.clone())
        .unwrap_or_default()
}
