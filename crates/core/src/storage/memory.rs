use crate::domain::report::{NewReport, ReportTag, StoredReport};
use crate::storage::{RawInput, ReportStore};
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store with the same append/latest semantics as the Postgres one.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<Vec<StoredReport>>,
    raw_inputs: RwLock<Vec<(Uuid, RawInput)>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<StoredReport> {
        self.reports.read().await.clone()
    }

    pub async fn raw_inputs(&self) -> Vec<(Uuid, RawInput)> {
        self.raw_inputs.read().await.clone()
    }
}

#[async_trait::async_trait]
impl ReportStore for MemoryReportStore {
    async fn append(&self, report: NewReport) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.reports.write().await.push(StoredReport {
            id,
            tag: report.kind.tag(),
            created_at: Utc::now(),
            report_date: report.report_date,
            model_used: report.model_used,
            report: report.report,
            validation_issues: report.validation_issues,
        });
        Ok(id)
    }

    async fn latest(&self, tag: ReportTag) -> anyhow::Result<Option<StoredReport>> {
        // Later inserts win ties on created_at, matching the insert-sequence tie-break in SQL.
        let reports = self.reports.read().await;
        Ok(reports
            .iter()
            .enumerate()
            .filter(|(_, r)| r.tag == tag)
            .max_by_key(|(seq, r)| (r.created_at, *seq))
            .map(|(_, r)| r.clone()))
    }

    async fn archive_raw_input(&self, input: RawInput) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.raw_inputs.write().await.push((id, input));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{ParsedReport, ReportKind};
    use chrono::NaiveDate;
    use serde_json::json;

    fn new_report(kind: ReportKind, summary: &str) -> NewReport {
        NewReport {
            kind,
            report: ParsedReport::try_from(json!({"executive_summary": summary})).unwrap(),
            model_used: "gemini-2.5-flash".to_string(),
            report_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            validation_issues: Vec::new(),
        }
    }

    #[tokio::test]
    async fn latest_reads_back_the_last_append_per_tag() {
        let store = MemoryReportStore::new();
        assert!(store.latest(ReportTag::WeeklyMacro).await.unwrap().is_none());

        let first = store.append(new_report(ReportKind::Weekly, "uno")).await.unwrap();
        let monthly = store.append(new_report(ReportKind::Monthly, "mes")).await.unwrap();
        let second = store.append(new_report(ReportKind::Weekly, "dos")).await.unwrap();
        assert_ne!(first, second);

        let weekly = store.latest(ReportTag::WeeklyMacro).await.unwrap().unwrap();
        assert_eq!(weekly.id, second);
        assert_eq!(weekly.report.executive_summary(), Some("dos"));
        assert_eq!(weekly.document()["type"], "WEEKLY_MACRO");

        let latest_monthly = store.latest(ReportTag::MonthlyPortfolio).await.unwrap().unwrap();
        assert_eq!(latest_monthly.id, monthly);

        // Append never overwrites.
        assert_eq!(store.reports().await.len(), 3);
    }

    #[tokio::test]
    async fn raw_inputs_are_archived() {
        let store = MemoryReportStore::new();
        let input = RawInput {
            texto: "Nota de mercado".to_string(),
            asunto: Some("FW: Morning note".to_string()),
            fecha: None,
        };
        let id = store.archive_raw_input(input.clone()).await.unwrap();
        assert_eq!(store.raw_inputs().await, vec![(id, input)]);
    }
}
