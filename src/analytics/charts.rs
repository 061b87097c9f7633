//! Data series behind the dashboard views.
//!
//! Rendering is left to whatever consumes the exported dashboard; this
//! module only computes the numbers, from the same table the chat uses.

use crate::analytics::functions::{family_average, yearly_summary, FamilyMonthMean, YearlySummary};
use crate::models::{Month, SalesTable};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Quantity sum for one (year, month) cell of the grouped bar chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    #[serde(rename = "Año")]
    pub year: i32,
    #[serde(rename = "NombreMes")]
    pub month: String,
    #[serde(rename = "Cantidad")]
    pub quantity: f64,
}

/// One line of the month-by-month evolution chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSeries {
    #[serde(rename = "Año")]
    pub year: i32,
    /// Twelve points, Enero to Diciembre; months without rows are `None`.
    pub puntos: Vec<(String, Option<f64>)>,
}

/// All dashboard data for a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub suma_por_mes: Vec<MonthlyTotal>,
    pub evolucion: Vec<YearSeries>,
    pub resumen_anual: Vec<YearlySummary>,
    pub familias: Vec<String>,
    pub familia_seleccionada: Option<String>,
    pub promedio_familia: Vec<FamilyMonthMean>,
}

/// Sum of quantity per (year, month), years ascending, months in calendar order.
pub fn monthly_totals(table: &SalesTable) -> Vec<MonthlyTotal> {
    let mut grouped: BTreeMap<(i32, Month), f64> = BTreeMap::new();
    for record in table.records() {
        *grouped.entry((record.year, record.month)).or_default() +=
            record.quantity.unwrap_or(0.0);
    }

    grouped
        .into_iter()
        .map(|((year, month), quantity)| MonthlyTotal {
            year,
            month: month.name().to_string(),
            quantity,
        })
        .collect()
}

/// The monthly totals reshaped into one twelve-point series per year.
pub fn year_series(totals: &[MonthlyTotal]) -> Vec<YearSeries> {
    let mut by_year: BTreeMap<i32, BTreeMap<String, f64>> = BTreeMap::new();
    for total in totals {
        by_year
            .entry(total.year)
            .or_default()
            .insert(total.month.clone(), total.quantity);
    }

    by_year
        .into_iter()
        .map(|(year, months)| YearSeries {
            year,
            puntos: Month::ALL
                .iter()
                .map(|m| (m.name().to_string(), months.get(m.name()).copied()))
                .collect(),
        })
        .collect()
}

impl Dashboard {
    /// Compute every view. `family` selects the per-family chart; when it is
    /// `None` the first family in sorted order is used.
    pub fn build(table: &SalesTable, family: Option<&str>) -> Self {
        let suma_por_mes = monthly_totals(table);
        let evolucion = year_series(&suma_por_mes);
        let familias = table.families();

        let familia_seleccionada = family
            .map(String::from)
            .or_else(|| familias.first().cloned());

        let promedio_familia = familia_seleccionada
            .as_deref()
            .map(|f| family_average(table, f, None).groups)
            .unwrap_or_default();

        let resumen_anual = table
            .years()
            .into_iter()
            .filter_map(|year| yearly_summary(table, year).ok())
            .collect();

        debug!(
            "Dashboard built: {} cells, {} series, {} families",
            suma_por_mes.len(),
            evolucion.len(),
            familias.len()
        );

        Self {
            suma_por_mes,
            evolucion,
            resumen_anual,
            familias,
            familia_seleccionada,
            promedio_familia,
        }
    }
}
