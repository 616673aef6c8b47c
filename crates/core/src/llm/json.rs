use crate::domain::report::ParsedReport;
use serde_json::{Map, Value};

/// Stand-in for an empty model reply. Parses to an empty report rather than failing.
pub const EMPTY_RESPONSE_FALLBACK: &str = "{}";

#[derive(Debug, thiserror::Error)]
pub enum MalformedResponse {
    #[error("no JSON object found in model output")]
    NoJsonObject { raw_output: String },

    #[error("invalid JSON syntax in model output: {source}")]
    InvalidSyntax {
        candidate: String,
        raw_output: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MalformedResponse {
    pub fn raw_output(&self) -> &str {
        match self {
            Self::NoJsonObject { raw_output } | Self::InvalidSyntax { raw_output, .. } => raw_output,
        }
    }
}

/// Removes every ```json and ``` marker, wherever it appears.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "")
}

/// First `{` to last `}`. Does not look inside strings, so a stray brace in surrounding prose
/// or an unbalanced brace inside a value corrupts the slice. Kept as the last-resort fallback.
pub fn extract_json_naive(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// One forward pass over `text`, pairing each `}` with the nearest open `{` while skipping braces
/// inside string literals. Returns the outermost balanced `(start, end)` spans in order. String
/// state is only tracked while some brace is open; quotes in surrounding prose are ignored.
fn outermost_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for (idx, &b) in text.as_bytes().iter().enumerate() {
        if open.is_empty() {
            if b == b'{' {
                open.push(idx);
            }
            continue;
        }
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => open.push(idx),
            b'}' if !in_string => {
                if let Some(start) = open.pop() {
                    spans.push((start, idx));
                }
                if open.is_empty() {
                    in_string = false;
                }
            }
            _ => {}
        }
    }

    // Balanced spans either nest or are disjoint, so sorted by start an enclosing span always
    // precedes the spans inside it.
    spans.sort_unstable_by_key(|&(start, _)| start);
    let mut outermost: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        if outermost.last().is_some_and(|&(_, prev_end)| start < prev_end) {
            continue;
        }
        outermost.push((start, end));
    }
    outermost
}

/// Every outermost `{...}` span that parses as a JSON object. An outermost span that fails to
/// parse is dropped together with everything nested in it, so a broken report never yields one of
/// its inner objects.
fn balanced_objects(text: &str) -> Vec<(&str, Map<String, Value>)> {
    outermost_spans(text)
        .into_iter()
        .filter_map(|(start, end)| {
            let candidate = &text[start..=end];
            serde_json::from_str::<Map<String, Value>>(candidate)
                .ok()
                .map(|map| (candidate, map))
        })
        .collect()
}

fn largest_object(text: &str) -> Option<(&str, Map<String, Value>)> {
    balanced_objects(text)
        .into_iter()
        .max_by_key(|(candidate, _)| candidate.len())
}

/// The largest well-formed JSON object embedded in `text`, if any.
pub fn extract_json(text: &str) -> Option<&str> {
    largest_object(text).map(|(candidate, _)| candidate)
}

/// Recovers a report object from loosely formatted model output.
///
/// Code fences are stripped first. An empty reply is read as `{}`. The largest balanced object
/// that parses wins; otherwise the naive first/last brace slice is parsed and its error is
/// reported.
pub fn sanitize(raw: &str) -> Result<ParsedReport, MalformedResponse> {
    let stripped = strip_code_fences(raw);
    let mut text = stripped.trim();
    if text.is_empty() {
        tracing::warn!("model returned empty text; treating as empty object");
        text = EMPTY_RESPONSE_FALLBACK;
    }

    if let Some((_, map)) = largest_object(text) {
        return Ok(ParsedReport(map));
    }

    let Some(candidate) = extract_json_naive(text) else {
        return Err(MalformedResponse::NoJsonObject {
            raw_output: raw.to_string(),
        });
    };

    serde_json::from_str::<Map<String, Value>>(candidate)
        .map(ParsedReport)
        .map_err(|source| MalformedResponse::InvalidSyntax {
            candidate: candidate.to_string(),
            raw_output: raw.to_string(),
            source,
        })
}
