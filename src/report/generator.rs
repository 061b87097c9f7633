//! Markdown and JSON exports.
//!
//! This module renders the session transcript and the dashboard data
//! tables, in the same two formats.

use crate::agent::phrasing::format_units;
use crate::analytics::charts::{MonthlyTotal, YearSeries};
use crate::analytics::functions::{FamilyMonthMean, YearlySummary};
use crate::analytics::Dashboard;
use crate::session::Turn;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Facts about the session shown at the top of the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMetadata {
    pub model_used: String,
    pub started_at: DateTime<Utc>,
    /// Loaded files with their recognized year.
    pub files: Vec<(i32, String)>,
    pub rows: usize,
    pub duration_seconds: f64,
}

/// A whole conversation, ready to export.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub metadata: TranscriptMetadata,
    pub turns: Vec<Turn>,
}

/// Generate the Markdown transcript.
pub fn generate_markdown_transcript(transcript: &Transcript, include_intents: bool) -> String {
    let mut output = String::new();

    output.push_str("# FinderQA Session\n\n");
    output.push_str(&generate_metadata_section(&transcript.metadata, transcript.turns.len()));
    output.push_str(&generate_turns_section(&transcript.turns, include_intents));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &TranscriptMetadata, turns: usize) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Session Date:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Rows Loaded:** {}\n", metadata.rows));
    section.push_str(&format!("- **Questions:** {}\n", turns));
    section.push_str(&format!(
        "- **Session Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));

    if !metadata.files.is_empty() {
        section.push_str("- **Files:**\n");
        for (year, path) in &metadata.files {
            section.push_str(&format!("  - {}: `{}`\n", year, path));
        }
    }
    section.push('\n');

    section
}

/// Generate one block per question.
fn generate_turns_section(turns: &[Turn], include_intents: bool) -> String {
    let mut section = String::new();

    section.push_str("## Conversation\n\n");

    if turns.is_empty() {
        section.push_str("No questions were asked in this session.\n\n");
        return section;
    }

    for (i, turn) in turns.iter().enumerate() {
        section.push_str(&generate_turn_block(i + 1, turn, include_intents));
    }

    section
}

fn generate_turn_block(number: usize, turn: &Turn, include_intents: bool) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {}. {}\n\n", number, turn.question));
    block.push_str(&format!("{}\n\n", turn.answer));

    if include_intents {
        block.push_str("<details>\n<summary>Intent and result</summary>\n\n```json\n");
        block.push_str(&serde_json::Value::Object(turn.intent.to_map()).to_string());
        block.push('\n');
        block.push_str(&turn.result.to_json());
        block.push_str("\n```\n</details>\n\n");
    }

    block.push_str("---\n\n");

    block
}

fn generate_footer() -> String {
    format!("*Generated by FinderQA v{}*\n", env!("CARGO_PKG_VERSION"))
}

/// Generate a JSON transcript.
pub fn generate_json_transcript(transcript: &Transcript) -> Result<String> {
    serde_json::to_string_pretty(transcript).map_err(Into::into)
}

/// Generate the Markdown dashboard: one table per view.
pub fn generate_markdown_dashboard(dashboard: &Dashboard) -> String {
    let mut output = String::new();

    output.push_str("# FinderQA Dashboard\n\n");
    output.push_str(&generate_yearly_section(&dashboard.resumen_anual));
    output.push_str(&generate_monthly_totals_section(&dashboard.suma_por_mes));
    output.push_str(&generate_evolution_section(&dashboard.evolucion));
    output.push_str(&generate_family_section(
        dashboard.familia_seleccionada.as_deref(),
        &dashboard.promedio_familia,
        &dashboard.familias,
    ));
    output.push_str(&generate_footer());

    output
}

fn generate_yearly_section(summaries: &[YearlySummary]) -> String {
    let mut section = String::new();

    section.push_str("## Resumen anual\n\n");
    section.push_str("| Año | Total unidades | Promedio | Mes de mayor venta |\n");
    section.push_str("|:---:|---:|---:|:---|\n");
    for summary in summaries {
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            summary.year,
            format_units(summary.total_unidades),
            summary
                .promedio_unidades
                .map(format_units)
                .unwrap_or_else(|| "-".to_string()),
            summary.mes_mayor_venta
        ));
    }
    section.push('\n');

    section
}

fn generate_monthly_totals_section(totals: &[MonthlyTotal]) -> String {
    let mut section = String::new();

    section.push_str("## Cantidad por año y mes\n\n");
    section.push_str("| Año | Mes | Cantidad |\n");
    section.push_str("|:---:|:---|---:|\n");
    for total in totals {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            total.year,
            total.month,
            format_units(total.quantity)
        ));
    }
    section.push('\n');

    section
}

fn generate_evolution_section(series: &[YearSeries]) -> String {
    let mut section = String::new();

    section.push_str("## Evolución mensual\n\n");
    if series.is_empty() {
        section.push_str("Sin datos.\n\n");
        return section;
    }

    section.push_str("| Mes |");
    for line in series {
        section.push_str(&format!(" {} |", line.year));
    }
    section.push_str("\n|:---|");
    section.push_str(&"---:|".repeat(series.len()));
    section.push('\n');

    for (i, (month, _)) in series[0].puntos.iter().enumerate() {
        section.push_str(&format!("| {} |", month));
        for line in series {
            let cell = line
                .puntos
                .get(i)
                .and_then(|(_, value)| *value)
                .map(format_units)
                .unwrap_or_else(|| "-".to_string());
            section.push_str(&format!(" {} |", cell));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_family_section(
    family: Option<&str>,
    groups: &[FamilyMonthMean],
    families: &[String],
) -> String {
    let mut section = String::new();

    let Some(family) = family else {
        section.push_str("## Promedio por familia\n\nNo hay familias en los datos.\n\n");
        return section;
    };

    section.push_str(&format!("## Promedio mensual: {}\n\n", family));
    if groups.is_empty() {
        section.push_str(&format!("No hay registros para la familia {}.\n\n", family));
    } else {
        section.push_str("| Año | Mes | Cantidad promedio |\n");
        section.push_str("|:---:|:---|---:|\n");
        for group in groups {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                group.year,
                group.month,
                group.mean.map(format_units).unwrap_or_else(|| "-".to_string())
            ));
        }
        section.push('\n');
    }

    section.push_str(&format!(
        "*Familias disponibles ({}): {}*\n\n",
        families.len(),
        families.join(", ")
    ));

    section
}

/// Generate the dashboard as JSON.
pub fn generate_json_dashboard(dashboard: &Dashboard) -> Result<String> {
    serde_json::to_string_pretty(dashboard).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_output(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::functions::tests::sample_table;
    use crate::models::{Action, Intent, ResultRecord};
    use serde_json::json;

    fn create_test_transcript() -> Transcript {
        let mut result = ResultRecord::empty();
        result.insert("año", json!(2021));
        result.insert("total_unidades", json!(165.0));

        Transcript {
            metadata: TranscriptMetadata {
                model_used: "ollama:test-model".to_string(),
                started_at: Utc::now(),
                files: vec![(2021, "ventas_2021.csv".to_string())],
                rows: 12,
                duration_seconds: 4.2,
            },
            turns: vec![Turn {
                question: "¿Cuánto se vendió en 2021?".to_string(),
                intent: Intent::new(Action::SalesByYear).with_year(2021),
                result,
                answer: "En 2021 se vendieron 165 unidades.".to_string(),
                asked_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn test_generate_markdown_transcript() {
        let transcript = create_test_transcript();
        let markdown = generate_markdown_transcript(&transcript, true);

        assert!(markdown.contains("# FinderQA Session"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("ollama:test-model"));
        assert!(markdown.contains("ventas_2021.csv"));
        assert!(markdown.contains("### 1. ¿Cuánto se vendió en 2021?"));
        assert!(markdown.contains(r#""accion":"ventas_año""#));
    }

    #[test]
    fn test_markdown_transcript_without_intents() {
        let transcript = create_test_transcript();
        let markdown = generate_markdown_transcript(&transcript, false);

        assert!(markdown.contains("En 2021 se vendieron 165 unidades."));
        assert!(!markdown.contains("<details>"));
    }

    #[test]
    fn test_generate_json_transcript() {
        let transcript = create_test_transcript();
        let json = generate_json_transcript(&transcript).unwrap();

        assert!(json.contains("\"model_used\""));
        assert!(json.contains("\"turns\""));
        assert!(json.contains("\"accion\": \"ventas_año\""));
    }

    #[test]
    fn test_generate_markdown_dashboard() {
        let dashboard = Dashboard::build(&sample_table(), Some("Tornillos"));
        let markdown = generate_markdown_dashboard(&dashboard);

        assert!(markdown.contains("## Resumen anual"));
        assert!(markdown.contains("| 2021 | 165 | 33 | Mayo |"));
        assert!(markdown.contains("| 2020 | Marzo | 70 |"));
        assert!(markdown.contains("## Promedio mensual: Tornillos"));
        assert!(markdown.contains("| Mayo | - | - | 120 |"));
    }

    #[test]
    fn test_generate_json_dashboard() {
        let dashboard = Dashboard::build(&sample_table(), None);
        let json = generate_json_dashboard(&dashboard).unwrap();

        assert!(json.contains("\"suma_por_mes\""));
        assert!(json.contains("\"familia_seleccionada\": \"Anclas\""));
    }

    #[test]
    fn test_write_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sesion.md");
        write_output(&path, "hola").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hola");
    }
}
