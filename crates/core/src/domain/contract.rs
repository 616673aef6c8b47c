use crate::domain::report::{ParsedReport, ReportKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

const WEIGHT_SUM_TOLERANCE: f64 = 0.5;

/// Weekly analysis areas, in display order.
pub const WEEKLY_SECTIONS: [&str; 4] = ["rates", "equity_valuation", "credit_risk", "flows_positioning"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// What the pipeline does with a report that has validation issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Persist and record the issues next to the report.
    #[default]
    Flag,
    /// Reject the report; nothing is persisted.
    Strict,
}

impl FromStr for ValidationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" => Ok(Self::Flag),
            "strict" => Ok(Self::Strict),
            other => anyhow::bail!("unknown validation mode: {other} (expected flag|strict)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioView {
    Sobreponderar,
    Neutral,
    Infraponderar,
}

impl PortfolioView {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sobreponderar" => Some(Self::Sobreponderar),
            "neutral" => Some(Self::Neutral),
            "infraponderar" => Some(Self::Infraponderar),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sobreponderar => "Sobreponderar",
            Self::Neutral => "Neutral",
            Self::Infraponderar => "Infraponderar",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyDriver {
    pub title: Option<String>,
    pub impact: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioPosition {
    pub asset_class: Option<String>,
    pub region: Option<String>,
    pub weight: Option<f64>,
    pub benchmark: Option<f64>,
    pub view: Option<String>,
    pub conviction: Option<f64>,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSection {
    pub title: Option<String>,
    pub content: Option<String>,
    pub key_metric: Option<String>,
}

// Lenient readers over the model-authored document. Absent or mistyped fields read as `None`.
impl ParsedReport {
    pub fn executive_summary(&self) -> Option<&str> {
        non_blank(self.get("executive_summary"))
    }

    pub fn market_sentiment(&self) -> Option<&str> {
        non_blank(self.get("marketSentiment"))
    }

    /// `thesis` is either `{ content, title? }` or a bare string.
    pub fn thesis_text(&self) -> Option<&str> {
        match self.get("thesis")? {
            Value::String(s) => non_blank_str(s),
            Value::Object(obj) => non_blank(obj.get("content")),
            _ => None,
        }
    }

    pub fn key_drivers(&self) -> Option<Vec<KeyDriver>> {
        let items = self.get("keyDrivers")?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|obj| KeyDriver {
                    title: owned(obj.get("title")),
                    impact: owned(obj.get("impact")),
                })
                .collect(),
        )
    }

    pub fn model_portfolio(&self) -> Option<Vec<PortfolioPosition>> {
        let items = self.get("model_portfolio")?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_object)
                .map(position_from_object)
                .collect(),
        )
    }

    pub fn weekly_sections(&self) -> Vec<(&'static str, AnalysisSection)> {
        WEEKLY_SECTIONS
            .iter()
            .filter_map(|key| {
                let obj = self.get(key)?.as_object()?;
                Some((
                    *key,
                    AnalysisSection {
                        title: owned(obj.get("title")),
                        content: owned(obj.get("content")),
                        key_metric: owned(obj.get("key_metric")),
                    },
                ))
            })
            .collect()
    }
}

/// Checks a parsed report against the declared shape for its kind. Returns every problem found;
/// an empty list means the report conforms.
pub fn validate_report(kind: ReportKind, report: &ParsedReport) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if report.executive_summary().is_none() {
        issues.push(ValidationIssue::new("executive_summary", "missing or empty"));
    }
    if report.market_sentiment().is_none() {
        issues.push(ValidationIssue::new("marketSentiment", "missing or empty"));
    }

    match report.get("thesis") {
        None | Some(Value::String(_)) => {}
        Some(Value::Object(obj)) if obj.get("content").is_some_and(Value::is_string) => {}
        Some(_) => issues.push(ValidationIssue::new(
            "thesis",
            "must be a string or an object with a string `content`",
        )),
    }

    if let Some(drivers) = report.get("keyDrivers") {
        match drivers.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    let has_title = item
                        .as_object()
                        .is_some_and(|obj| non_blank(obj.get("title")).is_some());
                    if !has_title {
                        issues.push(ValidationIssue::new(
                            format!("keyDrivers[{idx}].title"),
                            "missing or empty",
                        ));
                    }
                }
            }
            None => issues.push(ValidationIssue::new("keyDrivers", "must be an array")),
        }
    }

    if kind == ReportKind::Monthly {
        validate_portfolio(report, &mut issues);
    }

    issues
}

fn validate_portfolio(report: &ParsedReport, issues: &mut Vec<ValidationIssue>) {
    let Some(raw) = report.get("model_portfolio") else {
        issues.push(ValidationIssue::new("model_portfolio", "missing"));
        return;
    };
    let Some(items) = raw.as_array() else {
        issues.push(ValidationIssue::new("model_portfolio", "must be an array"));
        return;
    };
    if items.is_empty() {
        issues.push(ValidationIssue::new("model_portfolio", "must not be empty"));
        return;
    }

    let mut total = 0.0;
    let mut all_weighted = true;
    for (idx, item) in items.iter().enumerate() {
        let field = |name: &str| format!("model_portfolio[{idx}].{name}");
        let Some(obj) = item.as_object() else {
            issues.push(ValidationIssue::new(format!("model_portfolio[{idx}]"), "must be an object"));
            all_weighted = false;
            continue;
        };
        let pos = position_from_object(obj);

        if pos.asset_class.as_deref().map_or(true, |s| s.trim().is_empty()) {
            issues.push(ValidationIssue::new(field("asset_class"), "missing or empty"));
        }

        match pos.weight {
            Some(w) if (0.0..=100.0).contains(&w) => total += w,
            Some(w) => {
                issues.push(ValidationIssue::new(
                    field("weight"),
                    format!("must be between 0 and 100 (got {w})"),
                ));
                all_weighted = false;
            }
            None => {
                issues.push(ValidationIssue::new(field("weight"), "missing or not a number"));
                all_weighted = false;
            }
        }

        match pos.view.as_deref() {
            Some(v) if PortfolioView::parse(v).is_some() => {}
            Some(v) => issues.push(ValidationIssue::new(
                field("view"),
                format!("must be Sobreponderar, Neutral or Infraponderar (got {v})"),
            )),
            None => issues.push(ValidationIssue::new(field("view"), "missing")),
        }

        if let Some(c) = pos.conviction {
            if c.fract() != 0.0 || !(1.0..=5.0).contains(&c) {
                issues.push(ValidationIssue::new(
                    field("conviction"),
                    format!("must be an integer between 1 and 5 (got {c})"),
                ));
            }
        }
    }

    if all_weighted && (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        issues.push(ValidationIssue::new(
            "model_portfolio",
            format!("weights sum to {total} (expected 100)"),
        ));
    }
}

fn position_from_object(obj: &Map<String, Value>) -> PortfolioPosition {
    PortfolioPosition {
        asset_class: owned(obj.get("asset_class")),
        region: owned(obj.get("region")),
        weight: number(obj.get("weight")),
        benchmark: number(obj.get("benchmark")),
        view: owned(obj.get("view")),
        conviction: number(obj.get("conviction")),
        rationale: owned(obj.get("rationale")),
    }
}

/// Numbers, or numeric strings such as `"25"` / `"25%"`.
fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn non_blank(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).and_then(non_blank_str)
}

fn non_blank_str(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn owned(v: Option<&Value>) -> Option<String> {
    non_blank(v).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(v: Value) -> ParsedReport {
        ParsedReport::try_from(v).unwrap()
    }

    fn portfolio(weights: &[f64]) -> Value {
        let items: Vec<_> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                json!({
                    "asset_class": "Renta Variable",
                    "region": format!("Región {i}"),
                    "weight": w,
                    "view": "Neutral",
                    "conviction": 3,
                    "rationale": "...",
                })
            })
            .collect();
        Value::Array(items)
    }

    #[test]
    fn conforming_monthly_report_has_no_issues() {
        let r = report(json!({
            "executive_summary": "Resumen",
            "marketSentiment": "Neutral",
            "thesis": {"title": "Tesis", "content": "Duración larga"},
            "keyDrivers": [{"title": "Inflación", "impact": "Alta"}],
            "model_portfolio": portfolio(&[25.0, 15.0, 10.0, 30.0, 15.0, 5.0]),
        }));
        assert_eq!(validate_report(ReportKind::Monthly, &r), Vec::new());
    }

    #[test]
    fn weights_not_summing_to_100_are_flagged() {
        let r = report(json!({
            "executive_summary": "Resumen",
            "marketSentiment": "Neutral",
            "model_portfolio": portfolio(&[25.0, 15.0, 10.0, 25.0, 15.0, 5.0]),
        }));
        let issues = validate_report(ReportKind::Monthly, &r);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "model_portfolio");
        assert!(issues[0].message.contains("sum to 95"));
    }

    #[test]
    fn position_level_problems_are_reported_with_paths() {
        let r = report(json!({
            "executive_summary": "Resumen",
            "marketSentiment": "Neutral",
            "model_portfolio": [
                {"asset_class": "Crédito", "weight": 140, "view": "Comprar", "conviction": 7},
                {"asset_class": "", "weight": "abc", "view": "neutral", "conviction": 2.5},
            ],
        }));
        let fields: Vec<_> = validate_report(ReportKind::Monthly, &r)
            .into_iter()
            .map(|i| i.field)
            .collect();
        assert!(fields.contains(&"model_portfolio[0].weight".to_string()));
        assert!(fields.contains(&"model_portfolio[0].view".to_string()));
        assert!(fields.contains(&"model_portfolio[0].conviction".to_string()));
        assert!(fields.contains(&"model_portfolio[1].asset_class".to_string()));
        assert!(fields.contains(&"model_portfolio[1].weight".to_string()));
        assert!(fields.contains(&"model_portfolio[1].conviction".to_string()));
        // The sum check is skipped when a weight is unusable.
        assert!(!fields.contains(&"model_portfolio".to_string()));
    }

    #[test]
    fn empty_report_is_flagged_but_weekly_needs_no_portfolio() {
        let issues = validate_report(ReportKind::Weekly, &ParsedReport::default());
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["executive_summary", "marketSentiment"]);

        let monthly = validate_report(ReportKind::Monthly, &ParsedReport::default());
        assert!(monthly.iter().any(|i| i.field == "model_portfolio"));
    }

    #[test]
    fn lenient_readers_accept_both_thesis_shapes_and_string_numbers() {
        let r = report(json!({
            "thesis": "Bonos largos",
            "model_portfolio": [{"asset_class": "Liquidez", "weight": "5%", "view": "Neutral"}],
            "rates": {"title": "Tasas & Curvas", "content": "...", "key_metric": "US10Y: 4.1%"},
            "credit_risk": "not an object",
        }));
        assert_eq!(r.thesis_text(), Some("Bonos largos"));
        let positions = r.model_portfolio().unwrap();
        assert_eq!(positions[0].weight, Some(5.0));

        let sections = r.weekly_sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, "rates");
        assert_eq!(sections[0].1.key_metric.as_deref(), Some("US10Y: 4.1%"));

        let structured = report(json!({"thesis": {"content": "Value sobre growth"}}));
        assert_eq!(structured.thesis_text(), Some("Value sobre growth"));
    }

    #[test]
    fn validation_mode_parses() {
        assert_eq!("strict".parse::<ValidationMode>().unwrap(), ValidationMode::Strict);
        assert_eq!(" FLAG ".parse::<ValidationMode>().unwrap(), ValidationMode::Flag);
        assert!("off".parse::<ValidationMode>().is_err());
    }
}
