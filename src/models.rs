use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp format used everywhere (SQLite columns and JSON bodies).
/// Millisecond precision, UTC, lexicographically sortable.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn now_utc() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// --- Pipeline stage ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Saved,
    Applied,
    PhoneScreen,
    Interview,
    Offer,
    Rejected,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Saved,
        Stage::Applied,
        Stage::PhoneScreen,
        Stage::Interview,
        Stage::Offer,
        Stage::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Saved => "SAVED",
            Stage::Applied => "APPLIED",
            Stage::PhoneScreen => "PHONE_SCREEN",
            Stage::Interview => "INTERVIEW",
            Stage::Offer => "OFFER",
            Stage::Rejected => "REJECTED",
        }
    }

    /// Forgiving parse for CLI input: case-insensitive, accepts dashes.
    /// The wire format stays strict (see `FromStr`).
    pub fn parse_flexible(s: &str) -> Result<Stage, ParseStageError> {
        s.trim().to_uppercase().replace('-', "_").parse()
    }
}

#[derive(Debug, Error)]
#[error("invalid job stage '{0}' (expected SAVED, APPLIED, PHONE_SCREEN, INTERVIEW, OFFER, or REJECTED)")]
pub struct ParseStageError(pub String);

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVED" => Ok(Stage::Saved),
            "APPLIED" => Ok(Stage::Applied),
            "PHONE_SCREEN" => Ok(Stage::PhoneScreen),
            "INTERVIEW" => Ok(Stage::Interview),
            "OFFER" => Ok(Stage::Offer),
            "REJECTED" => Ok(Stage::Rejected),
            _ => Err(ParseStageError(s.to_string())),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Stage {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Stage {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| s.parse().map_err(|e: ParseStageError| FromSqlError::Other(Box::new(e))))
    }
}

// --- Interview type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewType {
    PhoneScreen,
    VideoCall,
    OnSite,
    Technical,
    Behavioral,
    FinalRound,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::PhoneScreen => "PHONE_SCREEN",
            InterviewType::VideoCall => "VIDEO_CALL",
            InterviewType::OnSite => "ON_SITE",
            InterviewType::Technical => "TECHNICAL",
            InterviewType::Behavioral => "BEHAVIORAL",
            InterviewType::FinalRound => "FINAL_ROUND",
        }
    }

    pub fn parse_flexible(s: &str) -> Result<InterviewType, ParseInterviewTypeError> {
        s.trim().to_uppercase().replace('-', "_").parse()
    }
}

#[derive(Debug, Error)]
#[error("invalid interview type '{0}' (expected PHONE_SCREEN, VIDEO_CALL, ON_SITE, TECHNICAL, BEHAVIORAL, or FINAL_ROUND)")]
pub struct ParseInterviewTypeError(pub String);

impl FromStr for InterviewType {
    type Err = ParseInterviewTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHONE_SCREEN" => Ok(InterviewType::PhoneScreen),
            "VIDEO_CALL" => Ok(InterviewType::VideoCall),
            "ON_SITE" => Ok(InterviewType::OnSite),
            "TECHNICAL" => Ok(InterviewType::Technical),
            "BEHAVIORAL" => Ok(InterviewType::Behavioral),
            "FINAL_ROUND" => Ok(InterviewType::FinalRound),
            _ => Err(ParseInterviewTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for InterviewType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for InterviewType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().and_then(|s| {
            s.parse()
                .map_err(|e: ParseInterviewTypeError| FromSqlError::Other(Box::new(e)))
        })
    }
}

// --- Entities ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub application_date: String,
    pub job_url: Option<String>,
    pub resume_used: Option<String>,
    pub notes: Option<String>,
    pub current_stage: Stage,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub interviews: Vec<Interview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub notes: Option<String>,
    pub job_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: InterviewType,
    pub scheduled_at: String,
    pub notes: Option<String>,
    pub questions_asked: Option<String>,
    pub feedback: Option<String>,
    pub job_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate view for the dashboard. Stages with zero jobs are absent
/// from the map, not reported as 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total_jobs: i64,
    pub jobs_by_stage: BTreeMap<Stage, i64>,
}

// --- Request payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub application_date: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub resume_used: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub current_stage: Option<Stage>,
}

/// Tri-state update field. A plain `Option` cannot distinguish "field
/// absent from the request" from "field sent as null", and the update
/// contract needs both: absent leaves the stored value alone, null (or
/// an empty string) clears it.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }
}

// Hand-written so Patch<Stage> defaults without a Default bound on T.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Absent fields never reach this point; #[serde(default)] on the
        // containing struct yields Keep for those.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Patch::Keep | Patch::Clear => serializer.serialize_none(),
            Patch::Set(value) => serializer.serialize_some(value),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub company: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub location: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub application_date: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub job_url: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub resume_used: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub notes: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub current_stage: Patch<Stage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInterview {
    #[serde(rename = "type")]
    pub kind: InterviewType,
    pub scheduled_at: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub questions_asked: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wire_format_round_trip() {
        let json = serde_json::to_string(&Stage::PhoneScreen).unwrap();
        assert_eq!(json, "\"PHONE_SCREEN\"");
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Stage::PhoneScreen);
    }

    #[test]
    fn test_stage_from_str_is_strict() {
        assert!("saved".parse::<Stage>().is_err());
        assert!("PHONE-SCREEN".parse::<Stage>().is_err());
        assert_eq!("OFFER".parse::<Stage>().unwrap(), Stage::Offer);
    }

    #[test]
    fn test_stage_parse_flexible_accepts_cli_spellings() {
        assert_eq!(Stage::parse_flexible("phone-screen").unwrap(), Stage::PhoneScreen);
        assert_eq!(Stage::parse_flexible("  rejected ").unwrap(), Stage::Rejected);
        assert!(Stage::parse_flexible("hired").is_err());
    }

    #[test]
    fn test_interview_type_parse_flexible() {
        assert_eq!(
            InterviewType::parse_flexible("final-round").unwrap(),
            InterviewType::FinalRound
        );
        assert!(InterviewType::parse_flexible("casual-chat").is_err());
    }

    #[test]
    fn test_patch_absent_null_and_value_are_distinct() {
        let patch: JobPatch = serde_json::from_str(r#"{"notes": null, "location": "Remote"}"#).unwrap();
        assert_eq!(patch.notes, Patch::Clear);
        assert_eq!(patch.location, Patch::Set("Remote".to_string()));
        assert_eq!(patch.title, Patch::Keep);
        assert_eq!(patch.current_stage, Patch::Keep);
    }

    #[test]
    fn test_patch_keep_is_omitted_when_serializing() {
        let patch = JobPatch {
            notes: Patch::Clear,
            title: Patch::Set("Engineer".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Engineer", "notes": null }));
    }

    #[test]
    fn test_unknown_stage_is_rejected_at_deserialization() {
        let result: Result<NewJob, _> =
            serde_json::from_str(r#"{"title": "a", "company": "b", "currentStage": "HIRED"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_stats_serialize_stage_keys_as_strings() {
        let mut stats = JobStats::default();
        stats.total_jobs = 2;
        stats.jobs_by_stage.insert(Stage::Saved, 1);
        stats.jobs_by_stage.insert(Stage::Rejected, 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "totalJobs": 2, "jobsByStage": { "SAVED": 1, "REJECTED": 1 } })
        );
    }
}
