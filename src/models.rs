//! Data models for the sales assistant.
//!
//! This module contains the core data structures shared by the loader,
//! the analytics functions, the intent resolver and the session:
//! months, normalized records, intents, result records and the rolling
//! conversational context.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Calendar month with the canonical Spanish names used by the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Build a month from its number (1-12).
    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get(number.checked_sub(1)? as usize).copied()
    }

    /// Canonical display name, e.g. `"Mayo"`.
    pub fn name(&self) -> &'static str {
        match self {
            Month::January => "Enero",
            Month::February => "Febrero",
            Month::March => "Marzo",
            Month::April => "Abril",
            Month::May => "Mayo",
            Month::June => "Junio",
            Month::July => "Julio",
            Month::August => "Agosto",
            Month::September => "Septiembre",
            Month::October => "Octubre",
            Month::November => "Noviembre",
            Month::December => "Diciembre",
        }
    }

    /// Lower-case name as used in intents, e.g. `"mayo"`.
    pub fn key(&self) -> String {
        self.name().to_lowercase()
    }

    /// Parse a month from a full name or a common abbreviation.
    ///
    /// Matching ignores case and Spanish accents: `"feb"`, `"Febrero"`,
    /// `"SEPT"` and `"setiembre"` are all recognized.
    pub fn parse(text: &str) -> Option<Self> {
        let folded = fold_text(text.trim());
        let folded = folded.trim_end_matches('.');

        Self::ALL.into_iter().find(|month| {
            let key = month.key();
            folded == key || Self::abbreviations(*month).contains(&folded)
        })
    }

    /// Parse one word of free text.
    ///
    /// Stricter than [`Month::parse`]: abbreviations that are also ordinary
    /// words ("mar", "set", "ago") or English ("may", "aug") are ignored.
    pub fn from_word(word: &str) -> Option<Self> {
        let folded = fold_text(word.trim());
        if AMBIGUOUS_ABBREVIATIONS.contains(&folded.trim_end_matches('.')) {
            return None;
        }
        Self::parse(&folded)
    }

    fn abbreviations(month: Month) -> &'static [&'static str] {
        match month {
            Month::January => &["ene", "jan"],
            Month::February => &["feb"],
            Month::March => &["mar"],
            Month::April => &["abr", "apr"],
            Month::May => &["may"],
            Month::June => &["jun"],
            Month::July => &["jul"],
            Month::August => &["ago", "aug"],
            Month::September => &["sep", "sept", "set", "setiembre"],
            Month::October => &["oct"],
            Month::November => &["nov"],
            Month::December => &["dic", "dec"],
        }
    }
}

const AMBIGUOUS_ABBREVIATIONS: [&str; 8] = ["mar", "may", "ago", "set", "jan", "apr", "aug", "dec"];

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lower-case a string and strip Spanish diacritics.
pub fn fold_text(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// One row of the normalized sales table.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Movement date (`FechaMov`).
    pub date: NaiveDate,
    /// Year derived from the date.
    pub year: i32,
    /// Month derived from the date.
    pub month: Month,
    /// Units moved; `None` when the source value was null or non-numeric.
    pub quantity: Option<f64>,
    /// Product family; `None` for blank, "nan" or "none".
    pub family: Option<String>,
}

/// The normalized, concatenated dataset held by a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesTable {
    records: Vec<Record>,
}

impl SalesTable {
    /// Create a table from already-normalized records.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over the rows of a single year.
    pub fn year(&self, year: i32) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.year == year)
    }

    /// Distinct years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.records.iter().map(|r| r.year).collect();
        years.into_iter().collect()
    }

    /// Distinct non-null families, sorted.
    pub fn families(&self) -> Vec<String> {
        let families: BTreeSet<&str> = self
            .records
            .iter()
            .filter_map(|r| r.family.as_deref())
            .collect();
        families.into_iter().map(String::from).collect()
    }
}

/// Analytical operation requested by an intent.
///
/// The wire representation is the Spanish tag used in the intent JSON.
/// Tags outside the known set are kept as [`Action::Unrecognized`] so the
/// dispatcher can answer them with guidance instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    SalesByMonth,
    SalesByYear,
    FamilyAverage,
    TopFamilies,
    MonthlySummary,
    Recommendation,
    Explanation,
    Help,
    Unrecognized(String),
}

impl Action {
    pub fn tag(&self) -> &str {
        match self {
            Action::SalesByMonth => "ventas_mes",
            Action::SalesByYear => "ventas_año",
            Action::FamilyAverage => "promedio_familia",
            Action::TopFamilies => "top_familias",
            Action::MonthlySummary => "resumen_mensual",
            Action::Recommendation => "recomendacion",
            Action::Explanation => "explicacion",
            Action::Help => "ayuda",
            Action::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for Action {
    fn from(tag: String) -> Self {
        match fold_text(tag.trim()).as_str() {
            "ventas_mes" => Action::SalesByMonth,
            "ventas_ano" => Action::SalesByYear,
            "promedio_familia" => Action::FamilyAverage,
            "top_familias" => Action::TopFamilies,
            "resumen_mensual" => Action::MonthlySummary,
            "recomendacion" => Action::Recommendation,
            "explicacion" => Action::Explanation,
            "ayuda" => Action::Help,
            _ => Action::Unrecognized(tag),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.tag().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Default number of families returned by `top_familias`.
pub const DEFAULT_TOP_K: usize = 5;

/// Structured interpretation of a free-text question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "accion")]
    pub action: Action,
    #[serde(rename = "año", default)]
    pub year: Option<i32>,
    #[serde(rename = "mes", default)]
    pub month: Option<String>,
    #[serde(rename = "familia", default)]
    pub family: Option<String>,
    #[serde(default)]
    pub k: Option<i64>,
}

impl Intent {
    /// An intent for `action` with every field unknown.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            year: None,
            month: None,
            family: None,
            k: None,
        }
    }

    /// The fallback intent used whenever resolution fails.
    pub fn help() -> Self {
        Self::new(Action::Help)
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_month(mut self, month: impl Into<String>) -> Self {
        self.month = Some(month.into());
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn with_k(mut self, k: i64) -> Self {
        self.k = Some(k);
        self
    }

    /// Effective `k` for `top_familias`: positive values only, else the default.
    pub fn top_k(&self) -> usize {
        match self.k {
            Some(k) if k > 0 => k as usize,
            _ => DEFAULT_TOP_K,
        }
    }

    /// Serialize into a JSON object keyed by the wire names.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Aggregated outcome of one turn; never contains raw rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord(Map<String, Value>);

impl ResultRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from any serializable result struct.
    pub fn from_serializable<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => {
                let mut map = Map::new();
                map.insert("valor".to_string(), other);
                Ok(Self(map))
            }
        }
    }

    /// A record carrying only a guidance message for the user.
    pub fn message(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("mensaje".to_string(), Value::String(text.into()));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Compact JSON rendering (non-ASCII kept as-is).
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// The most recent intent merged with the most recent result.
///
/// Exactly one generation exists at a time; it is replaced, never appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge an intent with its result; result keys win on collision.
    pub fn merge(intent: &Intent, result: &ResultRecord) -> Self {
        let mut map = intent.to_map();
        for (key, value) in result.as_map() {
            map.insert(key.clone(), value.clone());
        }
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn action(&self) -> Option<Action> {
        self.get("accion")
            .and_then(Value::as_str)
            .map(|tag| Action::from(tag.to_string()))
    }

    pub fn year(&self) -> Option<i32> {
        self.get("año")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok())
    }

    pub fn month(&self) -> Option<String> {
        self.get("mes")
            .and_then(Value::as_str)
            .map(String::from)
    }

    pub fn family(&self) -> Option<String> {
        self.get("familia")
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// The context reused verbatim as a result record.
    pub fn to_record(&self) -> ResultRecord {
        ResultRecord(self.0.clone())
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_month_numbers_and_names() {
        assert_eq!(Month::from_number(1), Some(Month::January));
        assert_eq!(Month::from_number(12), Some(Month::December));
        assert_eq!(Month::from_number(0), None);
        assert_eq!(Month::from_number(13), None);
        assert_eq!(Month::May.name(), "Mayo");
        assert_eq!(Month::September.key(), "septiembre");
    }

    #[test]
    fn test_month_parse() {
        assert_eq!(Month::parse("mayo"), Some(Month::May));
        assert_eq!(Month::parse("FEB"), Some(Month::February));
        assert_eq!(Month::parse("Sept."), Some(Month::September));
        assert_eq!(Month::parse("setiembre"), Some(Month::September));
        assert_eq!(Month::parse("diciembre"), Some(Month::December));
        assert_eq!(Month::parse("lunes"), None);
    }

    #[test]
    fn test_month_from_word_skips_ambiguous_abbreviations() {
        assert_eq!(Month::from_word("Febrero"), Some(Month::February));
        assert_eq!(Month::from_word("sept."), Some(Month::September));
        assert_eq!(Month::from_word("dic"), Some(Month::December));
        assert_eq!(Month::from_word("set"), None);
        assert_eq!(Month::from_word("ago"), None);
        assert_eq!(Month::from_word("mar"), None);
        assert_eq!(Month::from_word("may"), None);
        assert_eq!(Month::parse("ago"), Some(Month::August));
    }

    #[test]
    fn test_action_tags() {
        assert_eq!(Action::from("ventas_año".to_string()), Action::SalesByYear);
        assert_eq!(Action::from("ventas_ano".to_string()), Action::SalesByYear);
        assert_eq!(Action::from("top_familias".to_string()), Action::TopFamilies);
        assert_eq!(
            Action::from("borrar_todo".to_string()),
            Action::Unrecognized("borrar_todo".to_string())
        );
        assert_eq!(String::from(Action::Recommendation), "recomendacion");
    }

    #[test]
    fn test_intent_wire_format() {
        let intent: Intent = serde_json::from_str(
            r#"{"accion":"ventas_mes","año":2021,"mes":"mayo","familia":null,"k":null}"#,
        )
        .unwrap();
        assert_eq!(intent, Intent::new(Action::SalesByMonth).with_year(2021).with_month("mayo"));

        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(
            value,
            json!({"accion": "ventas_mes", "año": 2021, "mes": "mayo", "familia": null, "k": null})
        );
    }

    #[test]
    fn test_intent_missing_fields_default_to_null() {
        let intent: Intent = serde_json::from_str(r#"{"accion":"ayuda"}"#).unwrap();
        assert_eq!(intent, Intent::help());
    }

    #[test]
    fn test_intent_top_k() {
        assert_eq!(Intent::new(Action::TopFamilies).top_k(), DEFAULT_TOP_K);
        assert_eq!(Intent::new(Action::TopFamilies).with_k(3).top_k(), 3);
        assert_eq!(Intent::new(Action::TopFamilies).with_k(0).top_k(), DEFAULT_TOP_K);
        assert_eq!(Intent::new(Action::TopFamilies).with_k(-2).top_k(), DEFAULT_TOP_K);
    }

    #[test]
    fn test_context_merge_result_wins() {
        let intent = Intent::new(Action::SalesByMonth).with_year(2021).with_month("mayo");
        let mut result = ResultRecord::empty();
        result.insert("mes", json!("Mayo"));
        result.insert("total_unidades", json!(120.0));

        let context = Context::merge(&intent, &result);
        assert_eq!(context.action(), Some(Action::SalesByMonth));
        assert_eq!(context.year(), Some(2021));
        assert_eq!(context.month().as_deref(), Some("Mayo"));
        assert_eq!(context.get("total_unidades"), Some(&json!(120.0)));
        assert_eq!(context.family(), None);
    }

    #[test]
    fn test_sales_table_helpers() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let table = SalesTable::new(vec![
            Record {
                date,
                year: 2020,
                month: Month::March,
                quantity: Some(1.0),
                family: Some("Tornillos".to_string()),
            },
            Record {
                date,
                year: 2021,
                month: Month::March,
                quantity: None,
                family: Some("Anclas".to_string()),
            },
            Record {
                date,
                year: 2021,
                month: Month::March,
                quantity: None,
                family: None,
            },
        ]);

        assert_eq!(table.len(), 3);
        assert_eq!(table.years(), vec![2020, 2021]);
        assert_eq!(table.families(), vec!["Anclas", "Tornillos"]);
        assert_eq!(table.year(2021).count(), 2);
    }
}
