use crate::domain::contract::PortfolioPosition;
use crate::domain::report::{ReportKind, StoredReport};
use chrono::NaiveDate;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const MARGIN_MM: f32 = 18.0;
const BOTTOM_LIMIT_MM: f32 = 25.0;
const FOOTER_Y_MM: f32 = 12.0;
const PT_TO_MM: f32 = 0.3528;
const LINE_SPACING: f32 = 1.45;

// Average Helvetica advance as a fraction of the font size.
const REGULAR_ADVANCE: f32 = 0.5;
const BOLD_ADVANCE: f32 = 0.55;

// Allocation table columns, as offsets from the left margin.
const COL_REGION_MM: f32 = 45.0;
const COL_WEIGHT_MM: f32 = 90.0;
const COL_VIEW_MM: f32 = 112.0;
const CELL_WIDTH_MM: f32 = 42.0;

pub const EMPTY_SUMMARY: &str = "Sin resumen disponible.";
pub const DEFAULT_SENTIMENT: &str = "Neutral";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// RGB fill, components in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint(pub f32, pub f32, pub f32);

const BLACK: Tint = Tint(0.0, 0.0, 0.0);
const NAVY: Tint = Tint(0.059, 0.090, 0.165);
const GOLD: Tint = Tint(0.918, 0.702, 0.031);
const GREY: Tint = Tint(0.45, 0.45, 0.45);

/// One positioned line of text. `y_mm` is the baseline measured from the bottom of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub size_pt: f32,
    pub weight: Weight,
    pub tint: Tint,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub runs: Vec<TextRun>,
}

impl PageLayout {
    pub fn text(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

pub fn build_layout(report: &StoredReport, today: NaiveDate) -> Vec<PageLayout> {
    let kind = report.kind();
    let doc = &report.report;
    let mut cur = Cursor::new();

    cur.centered("Global Investment Outlook", 24.0, Weight::Bold, NAVY);
    cur.gap(2.0);
    cur.centered(kind.title(), 14.0, Weight::Regular, GOLD);
    cur.gap(2.0);
    cur.centered(
        &format!("Fecha de Corte: {}", report.report_date.format("%d/%m/%Y")),
        10.0,
        Weight::Regular,
        GREY,
    );
    cur.gap(10.0);

    cur.heading("Resumen Ejecutivo");
    cur.paragraph(
        doc.executive_summary().unwrap_or(EMPTY_SUMMARY),
        11.0,
        Weight::Regular,
        BLACK,
        0.0,
    );
    cur.gap(6.0);

    cur.heading("Sentimiento de Mercado");
    cur.paragraph(
        doc.market_sentiment().unwrap_or(DEFAULT_SENTIMENT),
        14.0,
        Weight::Regular,
        GOLD,
        0.0,
    );
    cur.gap(6.0);

    if kind == ReportKind::Weekly {
        if let Some(thesis) = doc.thesis_text() {
            cur.heading("Tesis de Inversión");
            cur.paragraph(thesis, 11.0, Weight::Regular, BLACK, 0.0);
            cur.gap(6.0);
        }

        let sections = doc.weekly_sections();
        if !sections.is_empty() {
            cur.ensure(40.0);
            cur.heading("Análisis por Áreas");
            for (key, section) in sections {
                let title = section.title.as_deref().unwrap_or(key);
                cur.paragraph(title, 12.0, Weight::Bold, BLACK, 0.0);
                if let Some(content) = section.content.as_deref() {
                    cur.paragraph(content, 10.0, Weight::Regular, BLACK, 5.0);
                }
                if let Some(metric) = section.key_metric.as_deref() {
                    cur.paragraph(&format!("Dato clave: {metric}"), 10.0, Weight::Regular, GREY, 5.0);
                }
                cur.gap(3.0);
            }
            cur.gap(3.0);
        }
    }

    if kind == ReportKind::Monthly {
        if let Some(positions) = doc.model_portfolio() {
            cur.ensure(60.0);
            cur.heading("Matriz de Asignación de Activos");
            allocation_table(&mut cur, &positions);
            cur.gap(6.0);
        }
    }

    if let Some(drivers) = doc.key_drivers() {
        cur.ensure(40.0);
        cur.heading("Drivers Principales");
        for driver in drivers {
            let title = driver.title.as_deref().unwrap_or("Driver");
            cur.paragraph(&format!("- {title}"), 12.0, Weight::Bold, BLACK, 0.0);
            cur.paragraph(
                driver.impact.as_deref().unwrap_or("-"),
                10.0,
                Weight::Regular,
                BLACK,
                5.0,
            );
            cur.gap(3.0);
        }
    }

    let footer = format!(
        "Generado por AI ({}) - {}",
        report.model_used,
        today.format("%d/%m/%Y")
    );
    cur.finish(&footer)
}

fn allocation_table(cur: &mut Cursor, positions: &[PortfolioPosition]) {
    let size = 10.0;
    let lh = line_height(size);

    cur.ensure(lh * 2.0);
    cur.row(
        &[
            (0.0, "Clase".to_string()),
            (COL_REGION_MM, "Región".to_string()),
            (COL_WEIGHT_MM, "Peso".to_string()),
            (COL_VIEW_MM, "Visión".to_string()),
        ],
        size,
        Weight::Bold,
    );
    cur.gap(2.0);

    for pos in positions {
        let class_lines = wrap(
            &fold_ascii(pos.asset_class.as_deref().unwrap_or("-")),
            max_chars(CELL_WIDTH_MM, size, Weight::Regular),
        );
        let region_lines = wrap(
            &fold_ascii(pos.region.as_deref().unwrap_or("-")),
            max_chars(CELL_WIDTH_MM, size, Weight::Regular),
        );
        let height = class_lines.len().max(region_lines.len()).max(1);

        cur.ensure(lh * height as f32 + 2.0);
        for idx in 0..height {
            let mut cells = Vec::with_capacity(4);
            if let Some(line) = class_lines.get(idx) {
                cells.push((0.0, line.clone()));
            }
            if let Some(line) = region_lines.get(idx) {
                cells.push((COL_REGION_MM, line.clone()));
            }
            if idx == 0 {
                cells.push((COL_WEIGHT_MM, format_weight(pos.weight)));
                cells.push((COL_VIEW_MM, pos.view.clone().unwrap_or_else(|| "-".to_string())));
            }
            cur.row(&cells, size, Weight::Regular);
        }
        cur.gap(2.0);
    }
}

fn format_weight(weight: Option<f64>) -> String {
    match weight {
        Some(w) if w.fract() == 0.0 => format!("{}%", w as i64),
        Some(w) => format!("{w:.1}%"),
        None => "-".to_string(),
    }
}

struct Cursor {
    done: Vec<PageLayout>,
    current: PageLayout,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: PageLayout::default(),
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn ensure(&mut self, height_mm: f32) {
        if self.y - height_mm < BOTTOM_LIMIT_MM {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        let page = std::mem::take(&mut self.current);
        self.done.push(page);
        self.y = PAGE_HEIGHT_MM - MARGIN_MM;
    }

    fn put(&mut self, x_mm: f32, text: String, size_pt: f32, weight: Weight, tint: Tint) {
        self.current.runs.push(TextRun {
            text,
            x_mm,
            y_mm: self.y - size_pt * PT_TO_MM,
            size_pt,
            weight,
            tint,
        });
    }

    fn heading(&mut self, text: &str) {
        self.ensure(line_height(16.0) * 3.0);
        self.paragraph(text, 16.0, Weight::Bold, BLACK, 0.0);
        self.gap(2.0);
    }

    fn centered(&mut self, text: &str, size_pt: f32, weight: Weight, tint: Tint) {
        let text = fold_ascii(text);
        let width = text.chars().count() as f32 * advance_mm(size_pt, weight);
        let x = ((PAGE_WIDTH_MM - width) / 2.0).max(MARGIN_MM);
        self.ensure(line_height(size_pt));
        self.put(x, text, size_pt, weight, tint);
        self.y -= line_height(size_pt);
    }

    fn paragraph(&mut self, text: &str, size_pt: f32, weight: Weight, tint: Tint, indent_mm: f32) {
        let width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - indent_mm;
        for line in wrap(&fold_ascii(text), max_chars(width, size_pt, weight)) {
            self.ensure(line_height(size_pt));
            self.put(MARGIN_MM + indent_mm, line, size_pt, weight, tint);
            self.y -= line_height(size_pt);
        }
    }

    /// One table line; each cell is placed at its column offset on the same baseline.
    fn row(&mut self, cells: &[(f32, String)], size_pt: f32, weight: Weight) {
        for (offset, text) in cells {
            self.put(MARGIN_MM + offset, fold_ascii(text), size_pt, weight, BLACK);
        }
        self.y -= line_height(size_pt);
    }

    fn finish(mut self, footer: &str) -> Vec<PageLayout> {
        self.done.push(self.current);

        let footer = fold_ascii(footer);
        let size = 8.0;
        let width = footer.chars().count() as f32 * advance_mm(size, Weight::Regular);
        let x = ((PAGE_WIDTH_MM - width) / 2.0).max(MARGIN_MM);
        for page in &mut self.done {
            page.runs.push(TextRun {
                text: footer.clone(),
                x_mm: x,
                y_mm: FOOTER_Y_MM,
                size_pt: size,
                weight: Weight::Regular,
                tint: GREY,
            });
        }
        self.done
    }
}

fn line_height(size_pt: f32) -> f32 {
    size_pt * PT_TO_MM * LINE_SPACING
}

fn advance_mm(size_pt: f32, weight: Weight) -> f32 {
    let factor = match weight {
        Weight::Regular => REGULAR_ADVANCE,
        Weight::Bold => BOLD_ADVANCE,
    };
    size_pt * PT_TO_MM * factor
}

fn max_chars(width_mm: f32, size_pt: f32, weight: Weight) -> usize {
    ((width_mm / advance_mm(size_pt, weight)).floor() as usize).max(1)
}

/// Greedy word wrap. Newlines in the input start a new line; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    for para in text.lines() {
        let mut line = String::new();
        for word in para.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                out.push(word.drain(..max_chars).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            let needed = if line.is_empty() {
                word.len()
            } else {
                line.chars().count() + 1 + word.len()
            };
            if needed > max_chars && !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        if !line.is_empty() {
            out.push(line);
        }
    }
    out
}

/// The builtin PDF fonts only cover a Latin-1 subset reliably; fold everything to ASCII.
/// Accents are lost in the rendered PDF (`Visión` becomes `Vision`); stored reports keep them.
pub fn fold_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' => out.push('a'),
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => out.push('A'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'Í' | 'Ì' | 'Î' | 'Ï' => out.push('I'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => out.push('O'),
            'ú' | 'ù' | 'û' | 'ü' => out.push('u'),
            'Ú' | 'Ù' | 'Û' | 'Ü' => out.push('U'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            '¿' | '¡' => {}
            '€' => out.push_str("EUR"),
            '‘' | '’' => out.push('\''),
            '“' | '”' | '«' | '»' => out.push('"'),
            '–' | '—' => out.push('-'),
            '•' | '·' => out.push('-'),
            '…' => out.push_str("..."),
            '\t' => out.push(' '),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}
