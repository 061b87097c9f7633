//! Intent dispatch and context construction.

use crate::analytics::{
    family_average, monthly_summary, sales_by_month, sales_by_year, top_families,
};
use crate::error::AnalyticsError;
use crate::models::{Action, Context, Intent, ResultRecord, SalesTable};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Answer for `ayuda` and for any action outside the known set.
pub const GUIDANCE_MESSAGE: &str =
    "Puedo responder sobre ventas por mes, año, familia, top meses, recomendaciones, etc.";

/// Run the single operation an intent asks for.
///
/// Never fails: missing parameters and empty years come back as records
/// carrying a `mensaje` for the user.
pub fn dispatch(table: &SalesTable, intent: &Intent, context: &Context) -> ResultRecord {
    debug!("Dispatching {}", intent.action);

    match &intent.action {
        Action::SalesByMonth => match (intent.year, intent.month.as_deref()) {
            (Some(year), Some(month)) => to_record(&sales_by_month(table, year, month)),
            (None, _) => missing_parameter("año", "ventas por mes"),
            (_, None) => missing_parameter("mes", "ventas por mes"),
        },
        Action::SalesByYear => match intent.year {
            Some(year) => to_record(&sales_by_year(table, year)),
            None => missing_parameter("año", "ventas por año"),
        },
        Action::FamilyAverage => match intent.family.as_deref() {
            Some(family) => to_record(&family_average(table, family, intent.year)),
            None => missing_parameter("familia", "el promedio por familia"),
        },
        Action::TopFamilies => match intent.year {
            Some(year) => to_record(&top_families(table, year, intent.top_k())),
            None => missing_parameter("año", "el top de familias"),
        },
        Action::MonthlySummary => match intent.year {
            Some(year) => match monthly_summary(table, year) {
                Ok(summary) => to_record(&summary),
                Err(AnalyticsError::NoData { year }) => no_data(year),
            },
            None => missing_parameter("año", "el resumen mensual"),
        },
        Action::Recommendation => context.to_record(),
        Action::Explanation => ResultRecord::empty(),
        Action::Help => ResultRecord::message(GUIDANCE_MESSAGE),
        Action::Unrecognized(tag) => {
            warn!("Unrecognized action '{}', answering with guidance", tag);
            ResultRecord::message(GUIDANCE_MESSAGE)
        }
    }
}

/// The context for the next turn: intent fields overlaid by result fields.
pub fn next_context(intent: &Intent, result: &ResultRecord) -> Context {
    Context::merge(intent, result)
}

fn to_record<T: Serialize>(value: &T) -> ResultRecord {
    ResultRecord::from_serializable(value).unwrap_or_else(|e| {
        warn!("Failed to serialize result: {}", e);
        ResultRecord::message(GUIDANCE_MESSAGE)
    })
}

fn missing_parameter(field: &str, operation: &str) -> ResultRecord {
    let mut record = ResultRecord::message(format!(
        "Para consultar {} necesito el dato '{}'. Por ejemplo: \"Ventas en mayo 2021\".",
        operation, field
    ));
    record.insert("falta", Value::String(field.to_string()));
    record
}

fn no_data(year: i32) -> ResultRecord {
    let mut record = ResultRecord::message(AnalyticsError::NoData { year }.to_string());
    record.insert("año", Value::from(year));
    record.insert("sin_datos", Value::Bool(true));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::functions::tests::sample_table;
    use serde_json::json;

    #[test]
    fn test_dispatch_sales_by_month() {
        let table = sample_table();
        let intent = Intent::new(Action::SalesByMonth).with_year(2021).with_month("mayo");
        let result = dispatch(&table, &intent, &Context::empty());

        assert_eq!(result.get("total_unidades"), Some(&json!(120.0)));
        assert_eq!(result.get("mes"), Some(&json!("mayo")));
    }

    #[test]
    fn test_dispatch_top_families_bounded() {
        let table = sample_table();
        let intent = Intent::new(Action::TopFamilies).with_year(2020).with_k(3);
        let result = dispatch(&table, &intent, &Context::empty());

        let rows = result.get("top_familias").and_then(Value::as_array).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], json!({"Familia": "Tornillos", "Cantidad": 85.0}));
    }

    #[test]
    fn test_dispatch_top_families_default_k() {
        let table = sample_table();
        let intent = Intent::new(Action::TopFamilies).with_year(2020).with_k(-1);
        let result = dispatch(&table, &intent, &Context::empty());

        let rows = result.get("top_familias").and_then(Value::as_array).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_dispatch_family_average_and_year() {
        let table = sample_table();

        let intent = Intent::new(Action::FamilyAverage).with_family("Anclas");
        let result = dispatch(&table, &intent, &Context::empty());
        assert_eq!(result.get("familia"), Some(&json!("Anclas")));
        assert_eq!(result.get("resumen").and_then(Value::as_array).map(Vec::len), Some(2));

        let intent = Intent::new(Action::SalesByYear).with_year(2021);
        let result = dispatch(&table, &intent, &Context::empty());
        assert_eq!(result.get("total_unidades"), Some(&json!(165.0)));
    }

    #[test]
    fn test_dispatch_monthly_summary_empty_year() {
        let table = sample_table();
        let intent = Intent::new(Action::MonthlySummary).with_year(2018);
        let result = dispatch(&table, &intent, &Context::empty());

        assert_eq!(result.get("sin_datos"), Some(&json!(true)));
        assert_eq!(result.get("año"), Some(&json!(2018)));
        assert!(result.get("mensaje").is_some());
    }

    #[test]
    fn test_dispatch_missing_parameters() {
        let table = sample_table();

        let intent = Intent::new(Action::SalesByMonth).with_year(2021);
        let result = dispatch(&table, &intent, &Context::empty());
        assert_eq!(result.get("falta"), Some(&json!("mes")));

        let intent = Intent::new(Action::FamilyAverage);
        let result = dispatch(&table, &intent, &Context::empty());
        assert_eq!(result.get("falta"), Some(&json!("familia")));

        let intent = Intent::new(Action::TopFamilies);
        let result = dispatch(&table, &intent, &Context::empty());
        assert_eq!(result.get("falta"), Some(&json!("año")));
    }

    #[test]
    fn test_dispatch_recommendation_reuses_context() {
        let table = sample_table();
        let previous = Intent::new(Action::SalesByYear).with_year(2021);
        let context = next_context(&previous, &dispatch(&table, &previous, &Context::empty()));

        let result = dispatch(&table, &Intent::new(Action::Recommendation), &context);
        assert_eq!(result, context.to_record());
    }

    #[test]
    fn test_dispatch_help_explanation_and_unknown() {
        let table = sample_table();
        let guidance = ResultRecord::message(GUIDANCE_MESSAGE);

        assert_eq!(dispatch(&table, &Intent::help(), &Context::empty()), guidance);
        assert_eq!(
            dispatch(
                &table,
                &Intent::new(Action::Unrecognized("borrar_todo".to_string())),
                &Context::empty()
            ),
            guidance
        );
        assert!(dispatch(&table, &Intent::new(Action::Explanation), &Context::empty()).is_empty());
    }

    #[test]
    fn test_next_context_result_wins() {
        let intent = Intent::new(Action::SalesByMonth).with_year(2021).with_month("mayo");
        let mut result = ResultRecord::empty();
        result.insert("mes", json!("Mayo"));
        result.insert("total_unidades", json!(120.0));

        let context = next_context(&intent, &result);
        assert_eq!(context.month().as_deref(), Some("Mayo"));
        assert_eq!(context.year(), Some(2021));
        assert_eq!(context.action(), Some(Action::SalesByMonth));
    }
}
