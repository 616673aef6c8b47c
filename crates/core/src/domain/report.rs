use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::contract::ValidationIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Weekly,
    Monthly,
}

impl ReportKind {
    /// Maps a `type=` parameter to a kind. Only the exact string `monthly` selects the monthly
    /// report; everything else, including an absent parameter, is weekly.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("monthly") => Self::Monthly,
            _ => Self::Weekly,
        }
    }

    pub fn tag(self) -> ReportTag {
        match self {
            Self::Monthly => ReportTag::MonthlyPortfolio,
            Self::Weekly => ReportTag::WeeklyMacro,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Heading used on exported documents.
    pub fn title(self) -> &'static str {
        match self {
            Self::Weekly => "TÁCTICO SEMANAL",
            Self::Monthly => "ESTRATEGIA MENSUAL",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage discriminator for reports of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportTag {
    #[serde(rename = "WEEKLY_MACRO")]
    WeeklyMacro,
    #[serde(rename = "MONTHLY_PORTFOLIO")]
    MonthlyPortfolio,
}

impl ReportTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WeeklyMacro => "WEEKLY_MACRO",
            Self::MonthlyPortfolio => "MONTHLY_PORTFOLIO",
        }
    }

    pub fn kind(self) -> ReportKind {
        match self {
            Self::WeeklyMacro => ReportKind::Weekly,
            Self::MonthlyPortfolio => ReportKind::Monthly,
        }
    }
}

impl fmt::Display for ReportTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEEKLY_MACRO" => Ok(Self::WeeklyMacro),
            "MONTHLY_PORTFOLIO" => Ok(Self::MonthlyPortfolio),
            other => anyhow::bail!("unknown report tag: {other}"),
        }
    }
}

pub fn tag_for(param: Option<&str>) -> ReportTag {
    ReportKind::from_param(param).tag()
}

#[derive(Debug, Clone, Copy)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub issued_at: DateTime<Utc>,
}

impl ReportRequest {
    pub fn new(kind: ReportKind, issued_at: DateTime<Utc>) -> Self {
        Self { kind, issued_at }
    }
}

/// A model-authored report object. Any JSON object is accepted; fields are interpreted lazily.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedReport(pub Map<String, Value>);

impl ParsedReport {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ParsedReport {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for ParsedReport {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => anyhow::bail!("report document must be a JSON object, got {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub kind: ReportKind,
    pub report: ParsedReport,
    pub model_used: String,
    pub report_date: NaiveDate,
    pub validation_issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: Uuid,
    pub tag: ReportTag,
    pub created_at: DateTime<Utc>,
    pub report_date: NaiveDate,
    pub model_used: String,
    pub report: ParsedReport,
    pub validation_issues: Vec<ValidationIssue>,
}

impl StoredReport {
    pub fn kind(&self) -> ReportKind {
        self.tag.kind()
    }

    /// The stored document as readers see it: the report fields verbatim, with the storage
    /// metadata written over any same-named keys the model produced.
    pub fn document(&self) -> Value {
        let mut doc = self.report.0.clone();
        doc.insert("type".to_string(), Value::from(self.tag.as_str()));
        doc.insert(
            "createdAt".to_string(),
            Value::from(self.created_at.to_rfc3339()),
        );
        doc.insert("model_used".to_string(), Value::from(self.model_used.clone()));
        doc.insert("date".to_string(), Value::from(self.report_date.to_string()));
        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn tag_mapping_defaults_to_weekly() {
        assert_eq!(tag_for(Some("monthly")), ReportTag::MonthlyPortfolio);
        assert_eq!(tag_for(Some("weekly")), ReportTag::WeeklyMacro);
        assert_eq!(tag_for(None), ReportTag::WeeklyMacro);
        assert_eq!(tag_for(Some("MONTHLY")), ReportTag::WeeklyMacro);
        assert_eq!(tag_for(Some("")), ReportTag::WeeklyMacro);
    }

    #[test]
    fn tag_round_trips_through_strings() {
        for tag in [ReportTag::WeeklyMacro, ReportTag::MonthlyPortfolio] {
            assert_eq!(tag.as_str().parse::<ReportTag>().unwrap(), tag);
            assert_eq!(json!(tag), json!(tag.as_str()));
        }
        assert!("DAILY".parse::<ReportTag>().is_err());
    }

    #[test]
    fn document_overrides_model_supplied_type() {
        let report = ParsedReport::try_from(json!({
            "type": "SOMETHING_ELSE",
            "executive_summary": "x",
        }))
        .unwrap();
        let stored = StoredReport {
            id: Uuid::new_v4(),
            tag: ReportTag::WeeklyMacro,
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 7, 30, 0).unwrap(),
            report_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            model_used: "gemini-2.5-flash".to_string(),
            report,
            validation_issues: Vec::new(),
        };

        let doc = stored.document();
        assert_eq!(doc["type"], "WEEKLY_MACRO");
        assert_eq!(doc["executive_summary"], "x");
        assert_eq!(doc["date"], "2026-03-02");
        assert_eq!(doc["model_used"], "gemini-2.5-flash");
        assert!(doc["createdAt"].as_str().unwrap().starts_with("2026-03-02T07:30:00"));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(ParsedReport::try_from(json!([1, 2, 3])).is_err());
    }
}
