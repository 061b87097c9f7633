//! Row normalization for the combined yearly table.
//!
//! Raw cells arrive as optional strings (null tokens already removed by the
//! parser). Normalization parses the movement date, derives the calendar
//! fields, coerces quantities and cleans family labels.

use crate::models::{Month, Record, SalesTable};
use chrono::{Datelike, NaiveDate};
use tracing::debug;

/// Literal cell values treated as null when reading a file.
pub const NULL_TOKENS: [&str; 6] = ["NADA", "NULL", "null", "nan", "NaN", ""];

/// Family labels (case-insensitive, after trimming) that mean "no family".
const EMPTY_FAMILIES: [&str; 3] = ["nan", "", "none"];

/// The three source columns the core cares about, as read from one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// `FechaMov`
    pub date: Option<String>,
    /// `Cantidad`
    pub quantity: Option<String>,
    /// `Familia`
    pub family: Option<String>,
}

/// Map a raw cell to `None` when it is one of the null tokens.
pub fn null_if_token(cell: &str) -> Option<String> {
    if NULL_TOKENS.contains(&cell) {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Normalize the concatenated rows into a table.
///
/// Rows whose date does not match `date_format` exactly are dropped
/// silently; only the drop count is logged.
pub fn normalize_rows<I>(rows: I, date_format: &str) -> SalesTable
where
    I: IntoIterator<Item = RawRow>,
{
    let mut dropped = 0usize;
    let mut records = Vec::new();

    for row in rows {
        let Some(date) = parse_date(row.date.as_deref(), date_format) else {
            dropped += 1;
            continue;
        };
        let Some(month) = Month::from_number(date.month()) else {
            dropped += 1;
            continue;
        };

        records.push(Record {
            date,
            year: date.year(),
            month,
            quantity: parse_quantity(row.quantity.as_deref()),
            family: normalize_family(row.family.as_deref()),
        });
    }

    if dropped > 0 {
        debug!("Dropped {} rows with unparseable dates", dropped);
    }

    SalesTable::new(records)
}

/// Parse a date with an exact format; anything else is `None`.
pub fn parse_date(value: Option<&str>, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.trim(), format).ok()
}

/// Coerce a quantity cell to a finite number.
pub fn parse_quantity(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|q| q.is_finite())
}

/// Trim a family label and null out the placeholder spellings.
pub fn normalize_family(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    let lowered = trimmed.to_lowercase();
    if EMPTY_FAMILIES.contains(&lowered.as_str()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, quantity: &str, family: &str) -> RawRow {
        RawRow {
            date: null_if_token(date),
            quantity: null_if_token(quantity),
            family: null_if_token(family),
        }
    }

    #[test]
    fn test_null_tokens() {
        for token in NULL_TOKENS {
            assert_eq!(null_if_token(token), None);
        }
        assert_eq!(null_if_token("Nada"), Some("Nada".to_string()));
        assert_eq!(null_if_token("0"), Some("0".to_string()));
    }

    #[test]
    fn test_parse_date_exact_format() {
        let fmt = "%d/%m/%Y";
        assert_eq!(
            parse_date(Some("15/05/2021"), fmt),
            NaiveDate::from_ymd_opt(2021, 5, 15)
        );
        assert_eq!(parse_date(Some("2021-05-15"), fmt), None);
        assert_eq!(parse_date(Some("31/02/2021"), fmt), None);
        assert_eq!(parse_date(None, fmt), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(Some(" 12.5 ")), Some(12.5));
        assert_eq!(parse_quantity(Some("-3")), Some(-3.0));
        assert_eq!(parse_quantity(Some("doce")), None);
        assert_eq!(parse_quantity(Some("inf")), None);
        assert_eq!(parse_quantity(None), None);
    }

    #[test]
    fn test_normalize_family() {
        assert_eq!(normalize_family(Some("  Tornillos ")), Some("Tornillos".to_string()));
        assert_eq!(normalize_family(Some("None")), None);
        assert_eq!(normalize_family(Some("NAN")), None);
        assert_eq!(normalize_family(Some("   ")), None);
        assert_eq!(normalize_family(None), None);
    }

    #[test]
    fn test_normalize_rows_drops_bad_dates_and_derives_fields() {
        let table = normalize_rows(
            vec![
                row("03/05/2021", "10", "Tornillos"),
                row("fecha", "99", "Tornillos"),
                row("", "99", "Tornillos"),
                row("28/12/2019", "x", "none"),
            ],
            "%d/%m/%Y",
        );

        assert_eq!(table.len(), 2);
        let first = &table.records()[0];
        assert_eq!(first.year, 2021);
        assert_eq!(first.month, Month::May);
        assert_eq!(first.quantity, Some(10.0));
        assert_eq!(first.family.as_deref(), Some("Tornillos"));

        let second = &table.records()[1];
        assert_eq!(second.year, 2019);
        assert_eq!(second.month, Month::December);
        assert_eq!(second.quantity, None);
        assert_eq!(second.family, None);
    }
}
