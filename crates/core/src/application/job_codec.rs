//! Job Codec - JSON wire format of the polymorphic job tree
//!
//! The `variant` discriminator selects the payload; a missing or unknown
//! discriminator decodes as `GENERIC`. Status and logs are restored as sent,
//! and children decode recursively through the same dispatch.

use crate::domain::{
    Action, Audience, DomainError, Job, JobKind, JobStatus, JobVariant, LogEntry,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJob {
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    id: usize,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    logs: Vec<LogEntry>,
    #[serde(default)]
    children: Vec<WireJob>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audience: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actions: Option<BTreeSet<Action>>,
}

impl WireJob {
    fn from_job(job: &Job) -> Self {
        let (audience, actions) = match job.kind() {
            JobKind::Generic => (None, None),
            JobKind::AudienceLoad { audience } => (Some(audience.clone()), None),
            JobKind::AudienceProcess { audience, actions } => {
                (Some(audience.clone()), Some(actions.clone()))
            }
        };

        Self {
            variant: Some(job.variant().as_str().to_string()),
            id: job.id,
            index: job.index,
            status: job.status(),
            logs: job.logs().to_vec(),
            children: job.children.iter().map(WireJob::from_job).collect(),
            offset: job.offset,
            error: job.error().to_string(),
            audience,
            actions,
        }
    }

    fn into_job(self) -> Result<Job> {
        let variant = match self.variant.as_deref() {
            Some("AUDIENCE_LOAD") => JobVariant::AudienceLoad,
            Some("AUDIENCE_PROCESS") => JobVariant::AudienceProcess,
            _ => JobVariant::Generic,
        };

        let kind = match variant {
            JobVariant::Generic => JobKind::Generic,
            JobVariant::AudienceLoad => JobKind::AudienceLoad {
                audience: require_audience(self.audience, variant)?,
            },
            JobVariant::AudienceProcess => JobKind::AudienceProcess {
                audience: require_audience(self.audience, variant)?,
                actions: self.actions.unwrap_or_default(),
            },
        };

        let children = self
            .children
            .into_iter()
            .map(WireJob::into_job)
            .collect::<Result<Vec<_>>>()?;

        Ok(Job::from_parts(
            self.id,
            self.index,
            self.offset,
            self.status,
            self.logs,
            self.error,
            children,
            kind,
        ))
    }
}

fn require_audience(audience: Option<Audience>, variant: JobVariant) -> Result<Audience> {
    audience.ok_or_else(|| {
        DomainError::MissingPayload {
            variant: variant.to_string(),
            field: "audience".to_string(),
        }
        .into()
    })
}

pub fn to_value(job: &Job) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(WireJob::from_job(job))?)
}

pub fn from_value(value: serde_json::Value) -> Result<Job> {
    serde_json::from_value::<WireJob>(value)?.into_job()
}

/// Serialize a job (and its children) to a JSON string
pub fn encode(job: &Job) -> Result<String> {
    Ok(serde_json::to_string(&WireJob::from_job(job))?)
}

/// Deserialize a job produced by [`encode`] (or by a remote worker)
pub fn decode(serialized: &str) -> Result<Job> {
    serde_json::from_str::<WireJob>(serialized)?.into_job()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AudienceRule;
    use crate::error::AppError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn process_job() -> Job {
        let mut audience = Audience::new("Buyers");
        audience.rules = vec![AudienceRule::new(0, "U1", "EQUALS", "x")];
        audience.shares.insert("acct-1".to_string());
        Job::audience_process(
            4,
            audience,
            BTreeSet::from([Action::Create, Action::UpdateShares]),
        )
    }

    #[test]
    fn test_process_job_wire_shape() {
        let value = to_value(&process_job()).unwrap();
        assert_eq!(value["variant"], "AUDIENCE_PROCESS");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["index"], 4);
        assert_eq!(value["audience"]["name"], "Buyers");
        assert_eq!(value["actions"], json!(["CREATE", "UPDATE_SHARES"]));
    }

    #[test]
    fn test_decode_keeps_serialized_status() {
        let mut job = process_job();
        job.start().unwrap();
        job.fail("quota exceeded").unwrap();

        let decoded = decode(&encode(&job).unwrap()).unwrap();
        assert_eq!(decoded.status(), JobStatus::Error);
        assert_eq!(decoded.error(), "quota exceeded");
        assert_eq!(decoded.variant(), JobVariant::AudienceProcess);
        assert_eq!(decoded.actions(), job.actions());
    }

    #[test]
    fn test_log_timestamps_decode_to_time_values() {
        let mut job = process_job();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        job.log(at, "created list 1001");

        let value = to_value(&job).unwrap();
        assert!(value["logs"][0]["timestamp"].is_string());

        let decoded = from_value(value).unwrap();
        assert_eq!(decoded.logs()[0].timestamp, at);
        assert_eq!(decoded.logs()[0].message, "created list 1001");
    }

    #[test]
    fn test_missing_or_unknown_variant_defaults_to_generic() {
        let job = decode(r#"{"index": 2, "status": "RUNNING"}"#).unwrap();
        assert_eq!(job.variant(), JobVariant::Generic);
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.index, 2);

        let job = decode(r#"{"variant": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(job.variant(), JobVariant::Generic);
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn test_children_decode_to_their_own_variants() {
        let container = Job::generic(0, vec![process_job(), Job::generic(1, Vec::new())]);

        let decoded = decode(&encode(&container).unwrap()).unwrap();
        assert_eq!(decoded.variant(), JobVariant::Generic);
        assert_eq!(decoded.children.len(), 2);
        assert_eq!(decoded.children[0].variant(), JobVariant::AudienceProcess);
        assert_eq!(decoded.children[0].audience().unwrap().name, "Buyers");
        assert_eq!(decoded.children[1].variant(), JobVariant::Generic);
    }

    #[test]
    fn test_payload_variant_without_audience_is_rejected() {
        let err = decode(r#"{"variant": "AUDIENCE_LOAD"}"#).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::MissingPayload { .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        assert!(matches!(
            decode("{not json").unwrap_err(),
            AppError::Serialization(_)
        ));
    }

    #[test]
    fn test_encode_decode_preserves_job() {
        let mut job = process_job();
        job.id = 7;
        job.offset = 1;
        job.log(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), "queued");

        assert_eq!(decode(&encode(&job).unwrap()).unwrap(), job);
    }
}
