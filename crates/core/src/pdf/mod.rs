pub mod layout;
mod render;

use crate::domain::report::{ReportKind, StoredReport};
use chrono::NaiveDate;

pub const CONTENT_TYPE: &str = "application/pdf";

/// Renders the stored report as an A4 PDF. `today` is the date printed in the footer.
pub fn render_report(report: &StoredReport, today: NaiveDate) -> anyhow::Result<Vec<u8>> {
    let pages = layout::build_layout(report, today);
    let title = format!("Global Investment Outlook - {}", layout::fold_ascii(report.kind().title()));
    render::render_pages(&title, &pages)
}

pub fn export_filename(kind: ReportKind, today: NaiveDate) -> String {
    format!("Informe_{}_{}.pdf", kind.as_str(), today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{ParsedReport, ReportTag};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn filename_uses_kind_and_date() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(export_filename(ReportKind::Weekly, today), "Informe_weekly_2026-03-09.pdf");
        assert_eq!(export_filename(ReportKind::Monthly, today), "Informe_monthly_2026-03-09.pdf");
    }

    #[test]
    fn renders_a_pdf_document() {
        let report = StoredReport {
            id: Uuid::new_v4(),
            tag: ReportTag::MonthlyPortfolio,
            created_at: Utc::now(),
            report_date: NaiveDate::from_ymd_opt(2026, 2, 27).unwrap(),
            model_used: "gemini-2.5-flash".to_string(),
            report: ParsedReport::try_from(json!({
                "executive_summary": "Resumen",
                "model_portfolio": [{"asset_class": "Renta Fija", "weight": 100, "view": "Neutral"}]
            }))
            .unwrap(),
            validation_issues: Vec::new(),
        };

        let bytes = render_report(&report, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
