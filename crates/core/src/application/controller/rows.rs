// Sheet row layouts and conversions
//
// Audience sheet: [id, name, description, lifeSpan, floodlightRef, shares,
//                  status, contentChecksum, sharesChecksum, jsonSnapshot]
// Rule sheet:     [audienceRef, group, variableFriendlyName, variableName,
//                  operator, value, negation]

use crate::application::constants::{STATUS_ERROR, STATUS_SUCCESS};
use crate::domain::{Audience, AudienceRule, DomainError};
use crate::port::Row;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet};

pub const AUDIENCE_COLUMNS: usize = 10;
pub const COL_ID: usize = 0;
pub const COL_NAME: usize = 1;
pub const COL_DESCRIPTION: usize = 2;
pub const COL_LIFE_SPAN: usize = 3;
pub const COL_FLOODLIGHT: usize = 4;
pub const COL_SHARES: usize = 5;
pub const COL_STATUS: usize = 6;
pub const COL_CONTENT_CHECKSUM: usize = 7;
pub const COL_SHARES_CHECKSUM: usize = 8;
pub const COL_SNAPSHOT: usize = 9;

pub const RULE_COLUMNS: usize = 7;
pub const RULE_COL_AUDIENCE: usize = 0;
const RULE_COL_GROUP: usize = 1;
const RULE_COL_FRIENDLY_NAME: usize = 2;
const RULE_COL_VARIABLE: usize = 3;
const RULE_COL_OPERATOR: usize = 4;
const RULE_COL_VALUE: usize = 5;
const RULE_COL_NEGATION: usize = 6;

const SHARES_SEPARATOR: char = ',';

/// An audience row plus what it remembers about the last sync
#[derive(Debug, Clone)]
pub struct AudienceRow {
    pub audience: Audience,
    pub content_checksum: Option<String>,
    pub shares_checksum: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Rule rows keyed by audience reference (id, or name before creation)
#[derive(Debug, Default)]
pub struct RuleIndex {
    rules: BTreeMap<String, Vec<AudienceRule>>,
    errors: BTreeMap<String, String>,
}

impl RuleIndex {
    /// Parse every non-blank rule row; `first_row` is the sheet row of `rows[0]`
    pub fn from_rows(rows: &[Row], first_row: usize) -> Self {
        let mut index = Self::default();
        for (offset, row) in rows.iter().enumerate() {
            if is_blank(row) {
                continue;
            }
            let audience_ref = cell(row, RULE_COL_AUDIENCE).to_string();
            match parse_rule_row(first_row + offset, row) {
                Ok(rule) => index.rules.entry(audience_ref).or_default().push(rule),
                Err(e) => {
                    index.errors.entry(audience_ref).or_insert_with(|| e.to_string());
                }
            }
        }
        index
    }

    /// Rules of an audience, looked up by id first and then by name.
    ///
    /// `None` when the sheet has no rows for it; `Some(Err)` when one of its
    /// rows is malformed.
    pub fn lookup(&self, id: Option<&str>, name: &str) -> Option<Result<Vec<AudienceRule>, String>> {
        let key = id
            .filter(|id| self.contains(id))
            .unwrap_or(name);
        if let Some(error) = self.errors.get(key) {
            return Some(Err(error.clone()));
        }
        self.rules.get(key).cloned().map(Ok)
    }

    fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key) || self.errors.contains_key(key)
    }
}

pub fn is_blank(row: &Row) -> bool {
    row.iter().all(|value| value.trim().is_empty())
}

fn cell(row: &Row, column: usize) -> &str {
    row.get(column).map(|value| value.trim()).unwrap_or_default()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Build the audience of a sheet row.
///
/// The JSON snapshot is the baseline; edited cells override it. Rules come
/// only from the rule sheet: an audience without rule rows has no rules.
pub fn parse_audience_row(
    sheet_row: usize,
    row: &Row,
    rules: &RuleIndex,
) -> Result<AudienceRow, DomainError> {
    let invalid = |reason: String| DomainError::InvalidRow {
        row: sheet_row,
        reason,
    };

    let snapshot = cell(row, COL_SNAPSHOT);
    let mut audience = if snapshot.is_empty() {
        Audience::new("")
    } else {
        serde_json::from_str::<Audience>(snapshot)
            .map_err(|e| invalid(format!("malformed snapshot: {}", e)))?
    };

    audience.id = non_empty(cell(row, COL_ID));
    audience.name = cell(row, COL_NAME).to_string();
    if audience.name.is_empty() {
        return Err(invalid("missing name".to_string()));
    }
    audience.description = cell(row, COL_DESCRIPTION).to_string();

    let life_span = cell(row, COL_LIFE_SPAN);
    if !life_span.is_empty() {
        audience.life_span = life_span
            .parse()
            .map_err(|_| invalid(format!("invalid life span '{}'", life_span)))?;
    }

    let (floodlight_name, floodlight_id) = parse_floodlight_ref(cell(row, COL_FLOODLIGHT));
    audience.floodlight_name = floodlight_name;
    audience.floodlight_id = floodlight_id;
    audience.shares = parse_shares(cell(row, COL_SHARES));

    audience.rules = match rules.lookup(audience.id.as_deref(), &audience.name) {
        Some(found) => found.map_err(invalid)?,
        None => Vec::new(),
    };
    audience.validate_rule_groups()?;

    Ok(AudienceRow {
        audience,
        content_checksum: non_empty(cell(row, COL_CONTENT_CHECKSUM)),
        shares_checksum: non_empty(cell(row, COL_SHARES_CHECKSUM)),
        last_synced: parse_last_synced(cell(row, COL_STATUS)),
    })
}

/// Full audience row as written back after a successful sync
pub fn format_audience_row(
    audience: &Audience,
    status: String,
    content_checksum: String,
    shares_checksum: String,
) -> Result<Row, serde_json::Error> {
    let mut row = vec![String::new(); AUDIENCE_COLUMNS];
    row[COL_ID] = audience.id.clone().unwrap_or_default();
    row[COL_NAME] = audience.name.clone();
    row[COL_DESCRIPTION] = audience.description.clone();
    row[COL_LIFE_SPAN] = audience.life_span.to_string();
    row[COL_FLOODLIGHT] = format_floodlight_ref(
        audience.floodlight_name.as_deref(),
        audience.floodlight_id.as_deref(),
    );
    row[COL_SHARES] = audience
        .shares
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(&SHARES_SEPARATOR.to_string());
    row[COL_STATUS] = status;
    row[COL_CONTENT_CHECKSUM] = content_checksum;
    row[COL_SHARES_CHECKSUM] = shares_checksum;
    row[COL_SNAPSHOT] = serde_json::to_string(audience)?;
    Ok(row)
}

pub fn format_rule_row(audience_ref: &str, rule: &AudienceRule) -> Row {
    let mut row = vec![String::new(); RULE_COLUMNS];
    row[RULE_COL_AUDIENCE] = audience_ref.to_string();
    row[RULE_COL_GROUP] = rule.group.to_string();
    row[RULE_COL_FRIENDLY_NAME] = rule.variable_friendly_name.clone();
    row[RULE_COL_VARIABLE] = rule.variable_name.clone();
    row[RULE_COL_OPERATOR] = rule.operator.clone();
    row[RULE_COL_VALUE] = rule.value.clone();
    row[RULE_COL_NEGATION] = if rule.negation { "TRUE" } else { "FALSE" }.to_string();
    row
}

fn parse_rule_row(sheet_row: usize, row: &Row) -> Result<AudienceRule, DomainError> {
    let invalid = |reason: String| DomainError::InvalidRow {
        row: sheet_row,
        reason,
    };

    let group_cell = cell(row, RULE_COL_GROUP);
    let group = if group_cell.is_empty() {
        0
    } else {
        group_cell
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid rule group '{}'", group_cell)))?
    };
    let variable_name = cell(row, RULE_COL_VARIABLE);
    if variable_name.is_empty() {
        return Err(invalid("rule without variable name".to_string()));
    }

    let negation = match cell(row, RULE_COL_NEGATION).to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "0" => false,
        "true" | "yes" | "1" => true,
        other => return Err(invalid(format!("invalid negation '{}'", other))),
    };

    Ok(AudienceRule {
        group,
        variable_name: variable_name.to_string(),
        variable_friendly_name: cell(row, RULE_COL_FRIENDLY_NAME).to_string(),
        operator: cell(row, RULE_COL_OPERATOR).to_string(),
        value: cell(row, RULE_COL_VALUE).to_string(),
        negation,
    })
}

/// `"<name> (<id>)"` or a bare id
pub fn parse_floodlight_ref(value: &str) -> (Option<String>, Option<String>) {
    if value.is_empty() {
        return (None, None);
    }
    if let Some(inner) = value.strip_suffix(')') {
        if let Some(open) = inner.rfind(" (") {
            let name = inner[..open].trim();
            let id = inner[open + 2..].trim();
            return (non_empty(name), non_empty(id));
        }
    }
    (None, Some(value.to_string()))
}

pub fn format_floodlight_ref(name: Option<&str>, id: Option<&str>) -> String {
    match (name.filter(|n| !n.is_empty()), id) {
        (Some(name), Some(id)) => format!("{} ({})", name, id),
        (None, Some(id)) => id.to_string(),
        (Some(_), None) | (None, None) => String::new(),
    }
}

fn parse_shares(value: &str) -> BTreeSet<String> {
    value
        .split(SHARES_SEPARATOR)
        .map(str::trim)
        .filter(|share| !share.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn success_status(now: DateTime<Utc>) -> String {
    format!(
        "{} {}",
        STATUS_SUCCESS,
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub fn error_status(now: DateTime<Utc>, message: &str) -> String {
    format!(
        "{} {}: {}",
        STATUS_ERROR,
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        message
    )
}

/// Time of the last successful sync recorded in a status cell
fn parse_last_synced(status: &str) -> Option<DateTime<Utc>> {
    let timestamp = status.strip_prefix(STATUS_SUCCESS)?.trim();
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
