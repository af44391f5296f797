use std::cmp::Ordering;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use super::engine::calculate_rentability;
use super::error::{EngineError, EngineResult};
use super::filter::DatasetFilter;
use super::types::{CostAssumptions, FinancingInputs, PropertyRecord, ValuatedProperty, labels};

/// Why a dataset row was left out of a valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowDiagnostic {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValuation {
    /// Sorted by gross yield, highest first.
    pub properties: Vec<ValuatedProperty>,
    pub rejected: Vec<RowDiagnostic>,
}

/// Values raw dataset rows. Rows that do not parse as a property, or whose
/// metrics are undefined, are reported in `rejected` instead of failing the
/// batch. Invalid financing or assumptions fail the whole call.
pub fn valuate_rows(
    rows: &[Value],
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<BatchValuation> {
    valuate_filtered_rows(rows, &DatasetFilter::default(), financing, assumptions)
}

/// Like `valuate_rows`, over the rows `filter` accepts. Diagnostics keep the
/// row's index in `rows`, not in the filtered subset.
pub fn valuate_filtered_rows(
    rows: &[Value],
    filter: &DatasetFilter,
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<BatchValuation> {
    financing.validate()?;
    assumptions.validate()?;

    let outcomes: Vec<Result<ValuatedProperty, RowDiagnostic>> = filter
        .select(rows)
        .into_par_iter()
        .map(|(index, row)| {
            serde_json::from_value::<PropertyRecord>(row.clone())
                .map_err(|e| EngineError::invalid(e.to_string()))
                .and_then(|record| valuate_record(record, financing, assumptions))
                .map_err(|e| RowDiagnostic {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect();

    Ok(collect_outcomes(outcomes))
}

/// Values already-typed records; the same isolation rules as `valuate_rows`.
pub fn valuate_properties(
    records: &[PropertyRecord],
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<BatchValuation> {
    financing.validate()?;
    assumptions.validate()?;

    let outcomes: Vec<Result<ValuatedProperty, RowDiagnostic>> = records
        .par_iter()
        .enumerate()
        .map(|(index, record)| {
            valuate_record(record.clone(), financing, assumptions).map_err(|e| RowDiagnostic {
                index,
                reason: e.to_string(),
            })
        })
        .collect();

    Ok(collect_outcomes(outcomes))
}

fn valuate_record(
    mut record: PropertyRecord,
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<ValuatedProperty> {
    let metrics = calculate_rentability(&record, financing, assumptions)?;
    // Stale metric columns from an earlier pass would shadow the fresh ones.
    record.attributes.retain(|name, _| !labels::is_metric(name));
    Ok(ValuatedProperty { record, metrics })
}

fn collect_outcomes(outcomes: Vec<Result<ValuatedProperty, RowDiagnostic>>) -> BatchValuation {
    let mut batch = BatchValuation::default();
    for outcome in outcomes {
        match outcome {
            Ok(property) => batch.properties.push(property),
            Err(diagnostic) => {
                tracing::warn!(
                    row = diagnostic.index,
                    reason = %diagnostic.reason,
                    "excluding row from valuation"
                );
                batch.rejected.push(diagnostic);
            }
        }
    }

    sort_by_gross_yield(&mut batch.properties);
    tracing::debug!(
        valuated = batch.properties.len(),
        rejected = batch.rejected.len(),
        "valuation pass complete"
    );
    batch
}

/// Stable: equal yields keep their input order.
pub fn sort_by_gross_yield(properties: &mut [ValuatedProperty]) {
    properties.sort_by(|a, b| {
        b.metrics
            .gross_yield
            .partial_cmp(&a.metrics.gross_yield)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldValue;
    use proptest::prelude::{Just, Strategy, prop_assert_eq, proptest};
    use serde_json::json;

    fn sample_financing() -> FinancingInputs {
        FinancingInputs {
            down_payment_fraction: 0.20,
            renovation_cost: 5_000.0,
            agency_fee: 3_000.0,
            term_years: 30,
            nominal_annual_rate: 0.03,
            annual_life_insurance: 0.0,
            irpf_rate: 0.17,
            amortization_base_fraction: 0.40,
        }
    }

    fn codes(batch: &BatchValuation) -> Vec<String> {
        batch
            .properties
            .iter()
            .map(|p| {
                p.record
                    .attributes
                    .get("codigo")
                    .and_then(FieldValue::as_text)
                    .expect("every sample row has a codigo")
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn rows_are_sorted_by_gross_yield_descending() {
        let rows = vec![
            json!({ "codigo": "low", "precio": 200000, "alquiler_predicho": 700 }),
            json!({ "codigo": "high", "precio": 90000, "alquiler_predicho": 800 }),
            json!({ "codigo": "mid", "precio": 120000, "alquiler_predicho": 800 }),
        ];
        let batch = valuate_rows(&rows, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");

        assert_eq!(codes(&batch), vec!["high", "mid", "low"]);
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn equal_yields_keep_input_order() {
        let rows = vec![
            json!({ "codigo": "first", "precio": 100000, "alquiler_predicho": 800 }),
            json!({ "codigo": "second", "precio": 100000, "alquiler_predicho": 800 }),
            json!({ "codigo": "third", "precio": 100000, "alquiler_predicho": 800 }),
        ];
        let batch = valuate_rows(&rows, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");
        assert_eq!(codes(&batch), vec!["first", "second", "third"]);
    }

    #[test]
    fn malformed_rows_are_reported_not_fatal() {
        let rows = vec![
            json!({ "codigo": "ok", "precio": 100000, "alquiler_predicho": 800 }),
            json!({ "codigo": "no-price", "alquiler_predicho": 800 }),
            json!({ "codigo": "text-rent", "precio": 100000, "alquiler_predicho": "n/a" }),
            json!({ "codigo": "free", "precio": 0, "alquiler_predicho": 800 }),
            json!("not an object"),
        ];
        let batch = valuate_rows(&rows, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");

        assert_eq!(codes(&batch), vec!["ok"]);
        let rejected: Vec<usize> = batch.rejected.iter().map(|d| d.index).collect();
        assert_eq!(rejected, vec![1, 2, 3, 4]);
        assert!(batch.rejected[0].reason.contains("precio"));
        assert!(batch.rejected[2].reason.contains("precio"));
    }

    #[test]
    fn filtered_rows_report_their_dataset_index() {
        let rows = vec![
            json!({ "codigo": "centro", "distrito": "Centro", "precio": 100000, "alquiler_predicho": 800 }),
            json!({ "codigo": "ok", "distrito": "Delicias", "precio": 100000, "alquiler_predicho": 800 }),
            json!({ "codigo": "bad", "distrito": "Delicias", "precio": 100000, "alquiler_predicho": "n/a" }),
        ];
        let filter = DatasetFilter {
            districts: Some(vec!["Delicias".to_string()]),
            ..DatasetFilter::default()
        };
        let batch = valuate_filtered_rows(
            &rows,
            &filter,
            &sample_financing(),
            &CostAssumptions::default(),
        )
        .expect("valid financing");

        assert_eq!(codes(&batch), vec!["ok"]);
        let rejected: Vec<usize> = batch.rejected.iter().map(|d| d.index).collect();
        assert_eq!(rejected, vec![2]);
    }

    #[test]
    fn degenerate_rows_name_the_metric() {
        let rows = vec![json!({ "precio": 100000, "alquiler_predicho": 0 })];
        let batch = valuate_rows(&rows, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");
        assert!(batch.properties.is_empty());
        assert!(batch.rejected[0].reason.contains(labels::ROCE_YEARS));
    }

    #[test]
    fn invalid_financing_fails_the_batch() {
        let mut financing = sample_financing();
        financing.term_years = 0;
        let rows = vec![json!({ "precio": 100000, "alquiler_predicho": 800 })];
        let err = valuate_rows(&rows, &financing, &CostAssumptions::default())
            .expect_err("financing applies to every row");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn passthrough_columns_survive_and_stale_metrics_are_replaced() {
        let rows = vec![json!({
            "precio": 100000,
            "alquiler_predicho": 800,
            "distrito": "Delicias",
            "Rentabilidad Bruta": 99.0
        })];
        let batch = valuate_rows(&rows, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");
        let property = &batch.properties[0];
        assert!(property.record.attributes.contains_key("distrito"));
        assert!(!property.record.attributes.contains_key(labels::GROSS_YIELD));
        assert_eq!(property.metrics.gross_yield, 8.14);

        let json = serde_json::to_value(property).expect("row should serialize");
        assert_eq!(json["Rentabilidad Bruta"], json!(8.14));
        assert_eq!(json["precio"], json!(100000.0));
        assert_eq!(json["distrito"], json!("Delicias"));
        assert_eq!(json["Cuota Mensual Hipoteca"], json!(337.28));
    }

    #[test]
    fn typed_records_follow_the_same_rules() {
        let records = vec![
            PropertyRecord::new(150_000.0, 700.0),
            PropertyRecord::new(-1.0, 700.0),
            PropertyRecord::new(80_000.0, 650.0),
        ];
        let batch = valuate_properties(&records, &sample_financing(), &CostAssumptions::default())
            .expect("valid financing");
        assert_eq!(batch.properties.len(), 2);
        assert_eq!(batch.properties[0].record.price, 80_000.0);
        assert_eq!(batch.rejected[0].index, 1);
    }

    fn dataset_and_shuffle() -> impl Strategy<Value = (Vec<(u32, u32)>, Vec<usize>)> {
        proptest::collection::vec((40_000u32..400_000, 300u32..2_000), 1..24).prop_flat_map(
            |rows| {
                let order: Vec<usize> = (0..rows.len()).collect();
                (Just(rows), Just(order).prop_shuffle())
            },
        )
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_output_is_independent_of_input_order((rows, order) in dataset_and_shuffle()) {
            let original: Vec<Value> = rows
                .iter()
                .enumerate()
                .map(|(i, (price, rent))| json!({ "codigo": i.to_string(), "precio": price, "alquiler_predicho": rent }))
                .collect();
            let shuffled: Vec<Value> = order.iter().map(|&i| original[i].clone()).collect();

            let financing = sample_financing();
            let assumptions = CostAssumptions::default();
            let a = valuate_rows(&original, &financing, &assumptions).expect("valid financing");
            let b = valuate_rows(&shuffled, &financing, &assumptions).expect("valid financing");

            let mut metrics_a: Vec<(String, f64, f64)> = a.properties.iter()
                .map(|p| (format!("{:?}", p.record.attributes.get("codigo")), p.metrics.gross_yield, p.metrics.net_profit))
                .collect();
            let mut metrics_b: Vec<(String, f64, f64)> = b.properties.iter()
                .map(|p| (format!("{:?}", p.record.attributes.get("codigo")), p.metrics.gross_yield, p.metrics.net_profit))
                .collect();
            metrics_a.sort_by(|x, y| x.0.cmp(&y.0));
            metrics_b.sort_by(|x, y| x.0.cmp(&y.0));
            prop_assert_eq!(metrics_a, metrics_b);

            let yields_a: Vec<f64> = a.properties.iter().map(|p| p.metrics.gross_yield).collect();
            let yields_b: Vec<f64> = b.properties.iter().map(|p| p.metrics.gross_yield).collect();
            prop_assert_eq!(yields_a, yields_b);
        }
    }
}
