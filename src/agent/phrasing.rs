//! Turning result records into answers.
//!
//! The language model only ever sees the serialized result record, never
//! the table or earlier turns. The template phraser produces the same kind
//! of short answer without a model.

use crate::agent::traits::{CompletionService, Phraser};
use crate::models::ResultRecord;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Phraser backed by a language model.
pub struct LlmPhraser {
    service: Arc<dyn CompletionService>,
}

impl LlmPhraser {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Phraser for LlmPhraser {
    async fn phrase(&self, result: &ResultRecord) -> Result<String> {
        let prompt = build_phrasing_prompt(result);
        debug!("Requesting phrasing from {}", self.service.describe());

        let answer = self.service.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

/// Build the phrasing prompt around the serialized result.
pub fn build_phrasing_prompt(result: &ResultRecord) -> String {
    let mut prompt = String::new();

    prompt.push_str("Eres un analista de datos.\n");
    prompt.push_str("Responde EXCLUSIVAMENTE sobre los siguientes resultados ANONIMIZADOS:\n\n");
    prompt.push_str(&result.to_json());
    prompt.push_str("\n\n");
    prompt.push_str(PHRASING_RULES);
    prompt.push_str("\n\nRedacta una explicación concisa para el usuario.\n");

    prompt
}

const PHRASING_RULES: &str = "Reglas estrictas:
- Describe e interpreta ÚNICAMENTE estos datos.
- No conectes con mensajes anteriores.
- No generes discurso largo.
- No hagas recomendaciones a menos que el usuario las pida explícitamente.
- No inventes valores ni tendencias que no se vean en este resultado.
- Sé claro, breve y directo.";

/// Deterministic Spanish answers, one shape per kind of result.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplatePhraser;

impl TemplatePhraser {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, result: &ResultRecord) -> String {
        if result.is_empty() {
            return "No hay cifras que describir para esta consulta.".to_string();
        }

        if let Some(message) = result.get("mensaje").and_then(Value::as_str) {
            return message.to_string();
        }

        let year = result.get("año").and_then(Value::as_i64);

        if let Some(Value::Array(rows)) = result.get("top_familias") {
            return render_top_families(year, rows);
        }

        if let Some(Value::Array(rows)) = result.get("top_meses") {
            return render_monthly_summary(year, rows, result);
        }

        if let (Some(family), Some(Value::Array(groups))) = (
            result.get("familia").and_then(Value::as_str),
            result.get("resumen"),
        ) {
            return render_family_average(family, groups);
        }

        if let Some(total) = result.get("total_unidades").and_then(Value::as_f64) {
            let year_text = year.map(|y| y.to_string()).unwrap_or_else(|| "?".to_string());
            let mut text = match result.get("mes").and_then(Value::as_str) {
                Some(month) => format!(
                    "En {} de {} se vendieron {} unidades.",
                    capitalize(month),
                    year_text,
                    format_units(total)
                ),
                None => format!(
                    "En {} se vendieron {} unidades.",
                    year_text,
                    format_units(total)
                ),
            };
            if let Some(mean) = result.get("promedio_unidades").and_then(Value::as_f64) {
                text.push_str(&format!(" Promedio por registro: {}.", format_units(mean)));
            }
            if let Some(best) = result.get("mes_mayor_venta").and_then(Value::as_str) {
                text.push_str(&format!(" El mes de mayor venta fue {}.", best));
            }
            return text;
        }

        format!("Resultado: {}", result.to_json())
    }
}

#[async_trait]
impl Phraser for TemplatePhraser {
    async fn phrase(&self, result: &ResultRecord) -> Result<String> {
        Ok(self.render(result))
    }
}

fn render_top_families(year: Option<i64>, rows: &[Value]) -> String {
    let year_text = year.map(|y| y.to_string()).unwrap_or_default();
    if rows.is_empty() {
        return format!("No hay familias con ventas registradas en {}.", year_text);
    }

    let items: Vec<String> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            format!(
                "{}. {} ({} unidades)",
                i + 1,
                row.get("Familia").and_then(Value::as_str).unwrap_or("?"),
                format_units(row.get("Cantidad").and_then(Value::as_f64).unwrap_or(0.0))
            )
        })
        .collect();

    format!("Familias más vendidas en {}: {}.", year_text, items.join("; "))
}

fn render_monthly_summary(year: Option<i64>, rows: &[Value], result: &ResultRecord) -> String {
    let year_text = year.map(|y| y.to_string()).unwrap_or_default();
    let best = result.get("mes_mayor_venta").and_then(Value::as_str).unwrap_or("?");
    let worst = result.get("mes_menor_venta").and_then(Value::as_str).unwrap_or("?");

    let items: Vec<String> = rows
        .iter()
        .map(|row| {
            format!(
                "{} {}",
                row.get("NombreMes").and_then(Value::as_str).unwrap_or("?"),
                format_units(row.get("Cantidad").and_then(Value::as_f64).unwrap_or(0.0))
            )
        })
        .collect();

    format!(
        "En {} el mes de mayor venta fue {} y el de menor venta {}. Ranking: {}.",
        year_text,
        best,
        worst,
        items.join(", ")
    )
}

fn render_family_average(family: &str, groups: &[Value]) -> String {
    if groups.is_empty() {
        return format!("No hay registros para la familia {}.", family);
    }

    let items: Vec<String> = groups
        .iter()
        .map(|group| {
            let mean = group
                .get("Cantidad")
                .and_then(Value::as_f64)
                .map(format_units)
                .unwrap_or_else(|| "sin datos".to_string());
            format!(
                "{} {}: {}",
                group.get("NombreMes").and_then(Value::as_str).unwrap_or("?"),
                group.get("Año").and_then(Value::as_i64).unwrap_or_default(),
                mean
            )
        })
        .collect();

    format!("Promedio mensual de unidades de {}: {}.", family, items.join("; "))
}

/// Whole numbers without decimals, everything else with two.
pub fn format_units(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
