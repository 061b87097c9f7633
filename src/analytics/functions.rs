//! Query operations over the normalized sales table.
//!
//! Every function here is pure: it reads the table, filters and aggregates,
//! and returns a result struct holding only figures, never rows. Null
//! quantities are skipped by sums and means, so an empty selection sums
//! to zero.

use crate::error::AnalyticsError;
use crate::models::{Month, Record, SalesTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Total units for one month of one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSales {
    #[serde(rename = "año")]
    pub year: i32,
    #[serde(rename = "mes")]
    pub month: String,
    pub total_unidades: f64,
}

/// Total units for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSales {
    #[serde(rename = "año")]
    pub year: i32,
    pub total_unidades: f64,
}

/// Total, mean and best month of a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlySummary {
    #[serde(rename = "año")]
    pub year: i32,
    pub total_unidades: f64,
    /// Mean over rows with a quantity; `None` when every quantity is null.
    pub promedio_unidades: Option<f64>,
    pub mes_mayor_venta: String,
}

/// One row of a month ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotal {
    #[serde(rename = "NombreMes")]
    pub month: String,
    #[serde(rename = "Cantidad")]
    pub quantity: f64,
}

/// Months of a year ranked by total units, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    #[serde(rename = "año")]
    pub year: i32,
    pub top_meses: Vec<MonthTotal>,
    pub mes_mayor_venta: String,
    pub mes_menor_venta: String,
}

/// Mean units of a family for one (year, month) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMonthMean {
    #[serde(rename = "Año")]
    pub year: i32,
    #[serde(rename = "NombreMes")]
    pub month: String,
    #[serde(rename = "Cantidad")]
    pub mean: Option<f64>,
}

/// Per-month means for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyAverage {
    #[serde(rename = "familia")]
    pub family: String,
    #[serde(rename = "resumen")]
    pub groups: Vec<FamilyMonthMean>,
}

/// One row of a family ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyTotal {
    #[serde(rename = "Familia")]
    pub family: String,
    #[serde(rename = "Cantidad")]
    pub quantity: f64,
}

/// The best-selling families of a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFamilies {
    #[serde(rename = "año")]
    pub year: i32,
    pub top_familias: Vec<FamilyTotal>,
}

/// Sum of the non-null quantities.
fn total<'a>(rows: impl IntoIterator<Item = &'a Record>) -> f64 {
    rows.into_iter().filter_map(|r| r.quantity).sum()
}

/// Mean of the non-null quantities, `None` if there are none.
fn mean<'a>(rows: impl IntoIterator<Item = &'a Record>) -> Option<f64> {
    let (sum, count) = rows
        .into_iter()
        .filter_map(|r| r.quantity)
        .fold((0.0, 0usize), |(sum, count), q| (sum + q, count + 1));

    (count > 0).then(|| sum / count as f64)
}

/// Sum quantities per month of a year, in calendar order.
fn totals_by_month(table: &SalesTable, year: i32) -> BTreeMap<Month, f64> {
    let mut grouped: BTreeMap<Month, f64> = BTreeMap::new();
    for record in table.year(year) {
        *grouped.entry(record.month).or_default() += record.quantity.unwrap_or(0.0);
    }
    grouped
}

/// Total units sold in `month` of `year`; the month name matches case-insensitively.
pub fn sales_by_month(table: &SalesTable, year: i32, month: &str) -> MonthSales {
    let wanted = month.trim().to_lowercase();
    let total_unidades = total(
        table
            .year(year)
            .filter(|r| r.month.name().to_lowercase() == wanted),
    );

    MonthSales {
        year,
        month: month.to_string(),
        total_unidades,
    }
}

/// Total units sold in `year`.
pub fn sales_by_year(table: &SalesTable, year: i32) -> YearSales {
    YearSales {
        year,
        total_unidades: total(table.year(year)),
    }
}

/// Total, mean and best month of `year`.
///
/// Fails with [`AnalyticsError::NoData`] when the year has no rows.
pub fn yearly_summary(table: &SalesTable, year: i32) -> Result<YearlySummary, AnalyticsError> {
    let by_month = totals_by_month(table, year);

    // Ties go to the earliest month.
    let best = by_month
        .iter()
        .fold(None::<(Month, f64)>, |best, (&month, &qty)| match best {
            Some((_, best_qty)) if best_qty >= qty => best,
            _ => Some((month, qty)),
        })
        .ok_or(AnalyticsError::NoData { year })?;

    Ok(YearlySummary {
        year,
        total_unidades: total(table.year(year)),
        promedio_unidades: mean(table.year(year)),
        mes_mayor_venta: best.0.name().to_string(),
    })
}

/// Months of `year` ranked by total units, plus the best and worst month.
///
/// Fails with [`AnalyticsError::NoData`] when the year has no rows.
pub fn monthly_summary(table: &SalesTable, year: i32) -> Result<MonthlySummary, AnalyticsError> {
    let mut ranking: Vec<(Month, f64)> = totals_by_month(table, year).into_iter().collect();

    // Stable sort keeps calendar order among equal totals.
    ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (top, bottom) = match (ranking.first(), ranking.last()) {
        (Some(top), Some(bottom)) => (top.0, bottom.0),
        _ => return Err(AnalyticsError::NoData { year }),
    };

    Ok(MonthlySummary {
        year,
        top_meses: ranking
            .into_iter()
            .map(|(month, quantity)| MonthTotal {
                month: month.name().to_string(),
                quantity,
            })
            .collect(),
        mes_mayor_venta: top.name().to_string(),
        mes_menor_venta: bottom.name().to_string(),
    })
}

/// Mean units per (year, month) for an exactly matching family.
///
/// When `year` is given only that year is considered. An unknown family
/// yields an empty group list.
pub fn family_average(table: &SalesTable, family: &str, year: Option<i32>) -> FamilyAverage {
    let mut grouped: BTreeMap<(i32, Month), Vec<&Record>> = BTreeMap::new();

    for record in table.records() {
        if record.family.as_deref() != Some(family) {
            continue;
        }
        if year.is_some_and(|y| y != record.year) {
            continue;
        }
        grouped
            .entry((record.year, record.month))
            .or_default()
            .push(record);
    }

    FamilyAverage {
        family: family.to_string(),
        groups: grouped
            .into_iter()
            .map(|((year, month), rows)| FamilyMonthMean {
                year,
                month: month.name().to_string(),
                mean: mean(rows),
            })
            .collect(),
    }
}

/// The `k` families with the highest total units in `year`.
///
/// Rows without a family are left out. Fewer than `k` families is not an
/// error; the ranking is simply shorter.
pub fn top_families(table: &SalesTable, year: i32, k: usize) -> TopFamilies {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for record in table.year(year) {
        if let Some(ref family) = record.family {
            *totals.entry(family.as_str()).or_default() += record.quantity.unwrap_or(0.0);
        }
    }

    let mut ranking: Vec<(&str, f64)> = totals.into_iter().collect();
    ranking.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranking.truncate(k);

    TopFamilies {
        year,
        top_familias: ranking
            .into_iter()
            .map(|(family, quantity)| FamilyTotal {
                family: family.to_string(),
                quantity,
            })
            .collect(),
    }
}
