//! Intent resolution.
//!
//! A question is classified into an [`Intent`] by an [`IntentClassifier`],
//! then anaphoric references ("ese mes", "lo anterior") are filled in from
//! the previous turn's context. Resolution never fails on bad classifier
//! output: anything that does not parse becomes the `ayuda` intent.

use crate::agent::traits::{ClassifyRequest, CompletionService, IntentClassifier};
use crate::models::{fold_text, Action, Context, Intent, Month};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Phrases naming the previous month, year or family. Matched on folded text.
const MONTH_MARKERS: &[&str] = &["ese mes", "mismo mes", "that month", "same month"];
const YEAR_MARKERS: &[&str] = &["ese ano", "mismo ano", "that year", "same year"];
const FAMILY_MARKERS: &[&str] = &["esa familia", "misma familia", "that family", "same family"];

/// Phrases that point at the previous answer as a whole.
const PREVIOUS_MARKERS: &[&str] = &[
    "ese mismo",
    "esa misma",
    "lo anterior",
    "el anterior",
    "la anterior",
    "the above",
    "the previous",
];

/// What an anaphoric question refers back to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Referents {
    month: bool,
    year: bool,
    family: bool,
    previous: bool,
}

impl Referents {
    fn find(question: &str) -> Self {
        let folded = fold_text(question);
        let any = |markers: &[&str]| markers.iter().any(|marker| folded.contains(marker));

        let month = any(MONTH_MARKERS);
        let year = any(YEAR_MARKERS);
        let family = any(FAMILY_MARKERS);
        // "ese mismo mes" names the month, not the whole answer.
        let previous = !(month || year || family) && any(PREVIOUS_MARKERS);

        Self {
            month,
            year,
            family,
            previous,
        }
    }

    fn is_empty(&self) -> bool {
        !(self.month || self.year || self.family || self.previous)
    }
}

/// Classifier that asks a language model for the intent JSON.
pub struct LlmIntentClassifier {
    service: Arc<dyn CompletionService>,
}

impl LlmIntentClassifier {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Intent> {
        let prompt = build_intent_prompt(&request);
        debug!("Requesting intent from {}", self.service.describe());

        let raw = self.service.complete(&prompt).await?;
        debug!("Raw intent response: {}", raw.trim());

        Ok(parse_intent(&raw))
    }
}

/// Build the classification prompt: output schema, rules, recognized
/// months, examples, the previous context and the known families.
pub fn build_intent_prompt(request: &ClassifyRequest<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str("Eres un analista experto en ventas. Tu trabajo es interpretar consultas\n");
    prompt.push_str("en lenguaje natural y devolver SOLO un JSON válido.\n\n");

    prompt.push_str("Formato obligatorio:\n\n");
    prompt.push_str(INTENT_SCHEMA);
    prompt.push_str("\n\n");

    prompt.push_str("Reglas fuertes (OBEDECER SIEMPRE):\n\n");
    prompt.push_str(INTENT_RULES);
    prompt.push_str(&format!("   {}\n", request.context.to_json()));
    prompt.push_str("8. Si no puedes interpretar → accion = \"ayuda\".\n\n");

    let months: Vec<String> = Month::ALL.iter().map(|m| format!("\"{}\"", m.key())).collect();
    prompt.push_str(&format!("Lista de meses reconocidos:\n[{}]\n\n", months.join(",")));

    if !request.families.is_empty() {
        prompt.push_str(&format!(
            "Familias conocidas (usa el nombre exacto):\n{}\n\n",
            request.families.join(", ")
        ));
    }

    prompt.push_str("Ejemplos:\n\n");
    prompt.push_str(INTENT_EXAMPLES);
    prompt.push_str("\n\n");

    prompt.push_str(&format!("Consulta del usuario:\n\"{}\"\n\n", request.question));
    prompt.push_str("Devuelve SOLO el JSON, sin texto adicional.\n");

    prompt
}

/// Parse a classifier response into an intent.
///
/// One surrounding Markdown code fence is removed; any other deviation from
/// the schema yields [`Intent::help`].
pub fn parse_intent(raw: &str) -> Intent {
    let body = strip_code_fence(raw);

    let mut intent: Intent = match serde_json::from_str(body) {
        Ok(intent) => intent,
        Err(e) => {
            warn!("Unusable intent response, falling back to help: {}", e);
            return Intent::help();
        }
    };

    intent.month = intent.month.as_deref().and_then(|text| {
        let month = Month::parse(text);
        if month.is_none() {
            debug!("Ignoring unknown month in intent: {}", text);
        }
        month.map(|m| m.key())
    });

    intent.family = intent
        .family
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());

    intent
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") on the opening line.
    match inner.find('\n') {
        Some(pos) => inner[pos + 1..].trim(),
        None => inner.trim(),
    }
}

/// True when the question refers back to the previous answer.
pub fn has_anaphora(question: &str) -> bool {
    !Referents::find(question).is_empty()
}

/// Fill in what an anaphoric question leaves out from the previous context.
///
/// The marker decides what is reused. "ese mes" brings back the month and
/// its year and asks for that month's sales; "ese año" brings back only the
/// year; "esa familia" the family. "lo anterior" reuses every field and
/// lets a `help` intent take over the previous action. Explicit fields are
/// never overwritten, and questions without a marker are returned unchanged.
pub fn apply_context(mut intent: Intent, question: &str, context: &Context) -> Intent {
    let referents = Referents::find(question);
    if context.is_empty() || referents.is_empty() {
        return intent;
    }

    if referents.previous {
        if intent.action == Action::Help {
            match context.action() {
                Some(Action::Help) | Some(Action::Unrecognized(_)) | None => {}
                Some(previous) => intent.action = previous,
            }
        }
        fill_year(&mut intent, context);
        fill_month(&mut intent, context);
        fill_family(&mut intent, context);
    }

    if referents.month {
        fill_year(&mut intent, context);
        fill_month(&mut intent, context);
        if intent.month.is_some()
            && matches!(intent.action, Action::Help | Action::SalesByYear)
        {
            intent.action = Action::SalesByMonth;
        }
    }

    if referents.year {
        fill_year(&mut intent, context);
        if !referents.month
            && intent.month.is_none()
            && matches!(intent.action, Action::Help | Action::SalesByMonth)
        {
            intent.action = Action::SalesByYear;
        }
    }

    if referents.family {
        fill_family(&mut intent, context);
        if intent.family.is_some() && intent.action == Action::Help {
            intent.action = Action::FamilyAverage;
        }
    }

    debug!("Intent after context: {:?}", intent);
    intent
}

fn fill_year(intent: &mut Intent, context: &Context) {
    if intent.year.is_none() {
        intent.year = context.year();
    }
}

fn fill_month(intent: &mut Intent, context: &Context) {
    if intent.month.is_none() {
        intent.month = context
            .month()
            .map(|m| Month::parse(&m).map(|month| month.key()).unwrap_or(m));
    }
}

fn fill_family(intent: &mut Intent, context: &Context) {
    if intent.family.is_none() {
        intent.family = context.family();
    }
}

/// Classify a question and resolve references to the previous turn.
pub async fn resolve(
    classifier: &dyn IntentClassifier,
    request: ClassifyRequest<'_>,
) -> Result<Intent> {
    let intent = classifier.classify(request).await?;
    Ok(apply_context(intent, request.question, request.context))
}

const INTENT_SCHEMA: &str = r#"{
 "accion": "ventas_mes" | "ventas_año" | "promedio_familia" |
            "top_familias" | "resumen_mensual" |
            "recomendacion" | "explicacion" | "ayuda",
 "año": número | null,
 "mes": texto | null,
 "familia": texto | null,
 "k": número | null
}"#;

const INTENT_RULES: &str = r#"1. Si el usuario pregunta por "ventas en <mes> <año>" → accion = "ventas_mes".
2. Si el usuario menciona un mes (enero, feb, marzo, abril...) → es ventas_mes.
3. Si menciona solo un año → ventas_año.
4. Si menciona familia → promedio_familia.
5. Si menciona "top X familias" → top_familias.
6. Si pide estrategia, sugerencias → recomendacion.
7. Si usa referencias como "ese mes", "lo anterior" → usa contexto:
"#;

const INTENT_EXAMPLES: &str = r#"Usuario: "¿Cuáles fueron las ventas en mayo del 2021?"
JSON:
{"accion":"ventas_mes","año":2021,"mes":"mayo","familia":null,"k":null}

Usuario: "Ventas en feb 2020"
JSON:
{"accion":"ventas_mes","año":2020,"mes":"febrero","familia":null,"k":null}

Usuario: "Top 3 familias 2020"
JSON:
{"accion":"top_familias","año":2020,"mes":null,"familia":null,"k":3}"#;
