use crate::domain::report::ReportKind;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Inbound material forwarded for analysis (e-mail body, subject, attachments count).
#[derive(Debug, Clone, Default)]
pub struct InboundMaterial {
    pub text: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub attachment_count: usize,
}

pub fn build_prompt(kind: ReportKind, report_date: NaiveDate) -> Prompt {
    Prompt {
        system: system_prompt(kind),
        user: user_prompt(report_date),
    }
}

pub fn build_inbound_prompt(
    kind: ReportKind,
    report_date: NaiveDate,
    material: &InboundMaterial,
) -> Prompt {
    let mut user = user_prompt(report_date);
    user.push_str("\n\nBasa el informe en el siguiente material recibido.");
    if let Some(subject) = material.subject.as_deref() {
        user.push_str(&format!("\nAsunto: {subject}"));
    }
    if let Some(date) = material.date.as_deref() {
        user.push_str(&format!("\nFecha del material: {date}"));
    }
    if material.attachment_count > 0 {
        user.push_str(&format!(
            "\nSe adjuntan {} documento(s); extrae de ellos los datos relevantes.",
            material.attachment_count
        ));
    }
    if let Some(text) = material.text.as_deref() {
        user.push_str("\n\nTEXTO:\n");
        user.push_str(text);
    }

    Prompt {
        system: system_prompt(kind),
        user,
    }
}

fn system_prompt(kind: ReportKind) -> String {
    let (preamble, task, schema) = match kind {
        ReportKind::Weekly => (WEEKLY_PREAMBLE, WEEKLY_TASK, weekly_schema()),
        ReportKind::Monthly => (MONTHLY_PREAMBLE, MONTHLY_TASK, monthly_schema()),
    };

    [
        preamble,
        "",
        task,
        "",
        "SALIDA JSON (reproduce EXACTAMENTE estas claves):",
        schema.as_str(),
        "",
        "Reglas:",
        "- Responde SOLO con un objeto JSON válido. Sin markdown, sin bloques de código, sin texto adicional.",
        "- Usa comillas dobles en todas las cadenas. Sin comas finales ni comentarios.",
        RULES_BY_KIND[kind_index(kind)],
    ]
    .join("\n")
}

fn user_prompt(report_date: NaiveDate) -> String {
    format!(
        "Fecha del informe: {}. Escribe con tono profesional, denso y analítico. JSON puro.",
        report_date.format("%d/%m/%Y")
    )
}

fn kind_index(kind: ReportKind) -> usize {
    match kind {
        ReportKind::Weekly => 0,
        ReportKind::Monthly => 1,
    }
}

const WEEKLY_PREAMBLE: &str = "ROL: Estratega senior de mercados. Redactas el \"Informe Táctico Semanal\" para el comité de inversiones.";

const WEEKLY_TASK: &str = "INSTRUCCIONES:\n\
1. Analiza los últimos 7 días: inflación, PIB, bancos centrales (Fed/BCE) y geopolítica.\n\
2. Cubre las 4 áreas de análisis: tasas, renta variable, crédito y flujos.\n\
3. Cita datos concretos (niveles de tipos, spreads, valoraciones).";

const MONTHLY_PREAMBLE: &str = "ROL: Chief Investment Officer (CIO) Global. Redactas la \"Estrategia de Asignación de Activos\" mensual.";

const MONTHLY_TASK: &str = "INSTRUCCIONES:\n\
1. Revisa el cierre mensual: S&P 500, rentabilidad del bono a 10 años, VIX y datos macro clave.\n\
2. Construye una cartera modelo cuyos pesos sumen exactamente 100.\n\
3. Define la tesis de inversión para el mes entrante con profundidad analítica (mínimo 150 palabras en el resumen).";

const RULES_BY_KIND: [&str; 2] = [
    "- marketSentiment debe empezar por Bullish, Neutral o Bearish.",
    "- Los pesos (weight) de model_portfolio son números entre 0 y 100 y deben sumar 100.\n\
- view debe ser exactamente Sobreponderar, Neutral o Infraponderar.\n\
- conviction es un entero de 1 a 5.",
];

fn weekly_schema() -> String {
    [
        "{",
        "  \"executive_summary\": \"Dos párrafos densos sobre la situación macro de la semana.\",",
        "  \"marketSentiment\": \"Bullish / Neutral / Bearish y una frase que lo justifique\",",
        "  \"keyDrivers\": [",
        "    {\"title\": \"Nombre del driver\", \"impact\": \"Cómo afecta a los mercados esta semana.\"}",
        "  ],",
        "  \"thesis\": {\"title\": \"La oportunidad de la semana\", \"content\": \"Tesis táctica principal.\"},",
        "  \"rates\": {\"title\": \"Tasas & Curvas\", \"content\": \"Bonos y política monetaria.\", \"key_metric\": \"US10Y: X.X%\"},",
        "  \"equity_valuation\": {\"title\": \"Valoración Equity\", \"content\": \"¿Bolsas caras o baratas?\", \"key_metric\": \"S&P P/E: XXx\"},",
        "  \"credit_risk\": {\"title\": \"Riesgo Crédito\", \"content\": \"Spreads corporativos y high yield.\", \"key_metric\": \"Spreads: Estables/Altos\"},",
        "  \"flows_positioning\": {\"title\": \"Flujos & Posicionamiento\", \"content\": \"Sentimiento y flujos de fondos.\", \"key_metric\": \"Sentimiento: Fear/Greed\"}",
        "}",
    ]
    .join("\n")
}

fn monthly_schema() -> String {
    [
        "{",
        "  \"executive_summary\": \"Análisis macro profundo: bancos centrales, geopolítica y valoraciones.\",",
        "  \"marketSentiment\": \"Cautiously Optimistic / Neutral / Defensive\",",
        "  \"thesis\": {\"title\": \"Tesis del mes\", \"content\": \"Conclusión de inversión para el mes entrante.\"},",
        "  \"model_portfolio\": [",
        "    {\"asset_class\": \"Renta Variable\", \"region\": \"EE.UU.\", \"weight\": 25, \"view\": \"Sobreponderar\", \"conviction\": 4, \"rationale\": \"...\"},",
        "    {\"asset_class\": \"Renta Variable\", \"region\": \"Europa\", \"weight\": 15, \"view\": \"Infraponderar\", \"conviction\": 2, \"rationale\": \"...\"},",
        "    {\"asset_class\": \"Renta Variable\", \"region\": \"Emergentes\", \"weight\": 10, \"view\": \"Neutral\", \"conviction\": 3, \"rationale\": \"...\"},",
        "    {\"asset_class\": \"Renta Fija\", \"region\": \"Bonos Gobierno (10Y)\", \"weight\": 30, \"view\": \"Sobreponderar\", \"conviction\": 5, \"rationale\": \"...\"},",
        "    {\"asset_class\": \"Crédito\", \"region\": \"Investment Grade\", \"weight\": 15, \"view\": \"Neutral\", \"conviction\": 3, \"rationale\": \"...\"},",
        "    {\"asset_class\": \"Alternativos\", \"region\": \"Oro/Commodities\", \"weight\": 5, \"view\": \"Sobreponderar\", \"conviction\": 4, \"rationale\": \"...\"}",
        "  ],",
        "  \"keyDrivers\": [",
        "    {\"title\": \"Inflación y Tipos\", \"impact\": \"Hoja de ruta de la Fed y el BCE.\"}",
        "  ]",
        "}",
    ]
    .join("\n")
}
