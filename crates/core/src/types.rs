use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// A single tracked job application, persisted as one document keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: String,
    pub company: String,
    pub position: String,
    pub status: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub applied_date: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl JobApplication {
    /// Produces the record that replaces `self` after applying `patch`.
    ///
    /// Fields missing from the patch keep their stored value. `id` and
    /// `created_at` always come from the stored record and `updated_at` is
    /// stamped with `now`.
    pub fn merge(&self, patch: JobFields, now: DateTime<Utc>) -> JobApplication {
        JobApplication {
            id: self.id.clone(),
            company: patch.company.unwrap_or_else(|| self.company.clone()),
            position: patch.position.unwrap_or_else(|| self.position.clone()),
            status: patch.status.unwrap_or_else(|| self.status.clone()),
            location: patch.location.unwrap_or_else(|| self.location.clone()),
            salary: patch.salary.unwrap_or_else(|| self.salary.clone()),
            notes: patch.notes.unwrap_or_else(|| self.notes.clone()),
            applied_date: patch
                .applied_date
                .unwrap_or_else(|| self.applied_date.clone()),
            created_at: self.created_at.clone(),
            updated_at: Some(format_timestamp(now)),
        }
    }
}

/// Client-supplied job fields, used both for create and merge-update bodies.
///
/// Every field is optional at the wire level; a JSON `null` is treated the
/// same as an absent key, so `{"company": null, ...}` fails creation with
/// `Missing required field: company` rather than storing a null company.
/// Unknown keys (including `id`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFields {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub applied_date: Option<String>,
}

impl JobFields {
    /// Decodes a request body. Anything that is not a JSON object with
    /// string-or-null field values is rejected as invalid JSON.
    pub fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(RequestError::InvalidJson)?;
        if !value.is_object() {
            return Err(RequestError::NotAnObject);
        }
        serde_json::from_value(value).map_err(RequestError::InvalidJson)
    }

    /// Builds a brand new record, checking `company`, `position` and `status`
    /// in that order and reporting the first one missing.
    pub fn into_new_job(
        self,
        id: String,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, RequestError> {
        let company = self.company.ok_or(RequestError::MissingField("company"))?;
        let position = self
            .position
            .ok_or(RequestError::MissingField("position"))?;
        let status = self.status.ok_or(RequestError::MissingField("status"))?;
        let created_at = format_timestamp(now);

        Ok(JobApplication {
            id,
            company,
            position,
            status,
            location: self.location.unwrap_or_default(),
            salary: self.salary.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            applied_date: self.applied_date.unwrap_or_else(|| created_at.clone()),
            created_at,
            updated_at: None,
        })
    }
}

/// Client errors detected before the store is touched.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid JSON in request body")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Invalid JSON in request body")]
    NotAnObject,
}

/// Generates a fresh 128-bit random record id.
pub fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

/// Renders a timestamp as RFC 3339 with millisecond precision and a `Z` suffix.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
