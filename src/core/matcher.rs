use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::{DESCRIPTION_COLUMN, ValuatedProperty};

/// Gross yields closer than this rank as equal and fall through to price.
pub const YIELD_EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bound {
    Min,
    Max,
}

impl Bound {
    fn suffix(self) -> &'static str {
        match self {
            Bound::Min => "_min",
            Bound::Max => "_max",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Range {
        field: String,
        bound: Bound,
        value: f64,
    },
    Equals {
        field: String,
        value: f64,
    },
    Flag {
        field: String,
        value: bool,
    },
    Text {
        field: String,
        needle: String,
    },
}

impl Constraint {
    pub fn field(&self) -> &str {
        match self {
            Constraint::Range { field, .. }
            | Constraint::Equals { field, .. }
            | Constraint::Flag { field, .. }
            | Constraint::Text { field, .. } => field,
        }
    }

    /// The criteria key this constraint was parsed from.
    pub fn key(&self) -> String {
        match self {
            Constraint::Range { field, bound, .. } => format!("{field}{}", bound.suffix()),
            other => other.field().to_string(),
        }
    }

    fn matches(&self, property: &ValuatedProperty) -> bool {
        match self {
            Constraint::Range {
                field,
                bound,
                value,
            } => {
                let Some(actual) = property.field(field).and_then(|v| v.as_f64()) else {
                    return false;
                };
                match bound {
                    Bound::Min => actual >= *value,
                    Bound::Max => actual <= *value,
                }
            }
            Constraint::Equals { field, value } => property
                .field(field)
                .and_then(|v| v.as_f64())
                .is_some_and(|actual| actual == *value),
            Constraint::Flag { field, value } => property
                .field(field)
                .and_then(|v| v.as_bool())
                .is_some_and(|actual| actual == *value),
            Constraint::Text { field, needle } => {
                let needle = needle.to_lowercase();
                let contains = |column: &str| {
                    property
                        .field(column)
                        .and_then(|v| v.searchable_text().map(|t| t.to_lowercase()))
                        .is_some_and(|text| text.contains(&needle))
                };
                contains(field.as_str()) || contains(DESCRIPTION_COLUMN)
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IgnoreReason {
    UnknownColumn,
    UnsupportedValue,
    NonNumericBound,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::UnknownColumn => "not a column of the dataset",
            IgnoreReason::UnsupportedValue => "value is not a number, boolean or string",
            IgnoreReason::NonNumericBound => "min/max bound is not a number",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredCriterion {
    pub key: String,
    pub reason: IgnoreReason,
}

/// Criteria validated into typed constraints. Keys that cannot become a
/// constraint are kept aside so callers can report them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchCriteria {
    constraints: Vec<Constraint>,
    ignored: Vec<IgnoredCriterion>,
}

impl MatchCriteria {
    pub fn from_json(criteria: &Map<String, Value>) -> Self {
        let mut parsed = Self::default();
        for (key, value) in criteria {
            match parse_constraint(key, value) {
                Ok(constraint) => parsed.constraints.push(constraint),
                Err(reason) => parsed.ignored.push(IgnoredCriterion {
                    key: key.clone(),
                    reason,
                }),
            }
        }
        parsed
    }

    #[cfg(test)]
    pub(crate) fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

fn parse_constraint(key: &str, value: &Value) -> Result<Constraint, IgnoreReason> {
    for bound in [Bound::Max, Bound::Min] {
        if let Some(field) = key.strip_suffix(bound.suffix()) {
            if field.is_empty() {
                break;
            }
            let value = value.as_f64().ok_or(IgnoreReason::NonNumericBound)?;
            return Ok(Constraint::Range {
                field: field.to_string(),
                bound,
                value,
            });
        }
    }

    let field = key.to_string();
    match value {
        Value::Bool(flag) => Ok(Constraint::Flag {
            field,
            value: *flag,
        }),
        Value::Number(number) => number
            .as_f64()
            .map(|value| Constraint::Equals { field, value })
            .ok_or(IgnoreReason::UnsupportedValue),
        Value::String(needle) => Ok(Constraint::Text {
            field,
            needle: needle.clone(),
        }),
        _ => Err(IgnoreReason::UnsupportedValue),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchOutcome<'a> {
    Found {
        property: &'a ValuatedProperty,
        /// Rows that satisfied every applied constraint.
        candidates: usize,
    },
    NoMatch {
        /// Key of the constraint that emptied the candidate set, if any.
        exhausted_by: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchReport<'a> {
    pub outcome: MatchOutcome<'a>,
    pub applied: Vec<String>,
    pub ignored: Vec<IgnoredCriterion>,
}

impl<'a> MatchReport<'a> {
    pub fn best(&self) -> Option<&'a ValuatedProperty> {
        match self.outcome {
            MatchOutcome::Found { property, .. } => Some(property),
            MatchOutcome::NoMatch { .. } => None,
        }
    }
}

/// Narrows `dataset` by every recognised constraint and returns the single
/// best survivor: highest gross yield, then lowest price.
pub fn find_best_match<'a>(
    dataset: &'a [ValuatedProperty],
    criteria: &MatchCriteria,
) -> MatchReport<'a> {
    let mut candidates: Vec<&ValuatedProperty> = dataset.iter().collect();
    let mut applied = Vec::new();
    let mut ignored = criteria.ignored.clone();
    let mut exhausted_by = None;

    for constraint in &criteria.constraints {
        if !dataset.iter().any(|p| p.has_column(constraint.field())) {
            ignored.push(IgnoredCriterion {
                key: constraint.key(),
                reason: IgnoreReason::UnknownColumn,
            });
            continue;
        }

        let before = candidates.len();
        candidates.retain(|p| constraint.matches(p));
        applied.push(constraint.key());
        if before > 0 && candidates.is_empty() {
            exhausted_by = Some(constraint.key());
        }
    }

    for skipped in &ignored {
        tracing::debug!(key = %skipped.key, reason = %skipped.reason, "ignoring criterion");
    }

    let candidate_count = candidates.len();
    let outcome = match candidates.into_iter().min_by(|a, b| rank(a, b)) {
        Some(property) => MatchOutcome::Found {
            property,
            candidates: candidate_count,
        },
        None => MatchOutcome::NoMatch { exhausted_by },
    };
    tracing::debug!(
        applied = applied.len(),
        ignored = ignored.len(),
        candidates = candidate_count,
        "criteria match complete"
    );

    MatchReport {
        outcome,
        applied,
        ignored,
    }
}

/// Ordering used to pick the best property; `Less` ranks first.
pub fn rank(a: &ValuatedProperty, b: &ValuatedProperty) -> Ordering {
    let (ya, yb) = (a.metrics.gross_yield, b.metrics.gross_yield);
    if (ya - yb).abs() > YIELD_EPSILON {
        return yb.partial_cmp(&ya).unwrap_or(Ordering::Equal);
    }
    a.record
        .price
        .partial_cmp(&b.record.price)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FieldValue, ProfitabilityMetrics, PropertyRecord};
    use serde_json::json;

    fn metrics_with_yield(gross_yield: f64) -> ProfitabilityMetrics {
        ProfitabilityMetrics {
            total_cost: 0.0,
            gross_yield,
            pre_tax_profit: 0.0,
            net_yield: 0.0,
            monthly_payment: 0.0,
            cash_for_purchase: 0.0,
            cash_for_purchase_and_renovation: 0.0,
            net_profit: 0.0,
            cashflow_before_tax: 0.0,
            cashflow_after_tax: 0.0,
            roce: 0.0,
            roce_years: 0.0,
            cocr: 0.0,
            cocr_years: 0.0,
        }
    }

    fn property(code: &str, price: f64, gross_yield: f64) -> ValuatedProperty {
        ValuatedProperty {
            record: PropertyRecord::new(price, 700.0)
                .with_attribute("codigo", FieldValue::Text(code.to_string())),
            metrics: metrics_with_yield(gross_yield),
        }
    }

    fn with(mut property: ValuatedProperty, name: &str, value: FieldValue) -> ValuatedProperty {
        property.record.attributes.insert(name.to_string(), value);
        property
    }

    fn criteria(value: Value) -> MatchCriteria {
        match value {
            Value::Object(map) => MatchCriteria::from_json(&map),
            other => panic!("criteria must be an object, got {other}"),
        }
    }

    fn code_of(report: &MatchReport<'_>) -> Option<String> {
        report.best().map(|p| match p.record.attributes.get("codigo") {
            Some(FieldValue::Text(code)) => code.clone(),
            other => panic!("unexpected codigo {other:?}"),
        })
    }

    fn sample_dataset() -> Vec<ValuatedProperty> {
        vec![
            with(
                with(
                    property("three-bed", 140_000.0, 6.0),
                    "habitaciones",
                    FieldValue::Number(3.0),
                ),
                "terraza",
                FieldValue::Bool(true),
            ),
            with(
                with(
                    with(
                        property("four-bed", 145_000.0, 7.0),
                        "habitaciones",
                        FieldValue::Number(4.0),
                    ),
                    "terraza",
                    FieldValue::Bool(false),
                ),
                "descripcion",
                FieldValue::Text("Piso reformado con Ascensor".to_string()),
            ),
            with(
                with(
                    property("two-bed", 90_000.0, 9.0),
                    "habitaciones",
                    FieldValue::Number(2.0),
                ),
                "distrito",
                FieldValue::Text("Delicias".to_string()),
            ),
        ]
    }

    #[test]
    fn range_criteria_pick_highest_yield_survivor() {
        let dataset = sample_dataset();
        let report = find_best_match(
            &dataset,
            &criteria(json!({ "habitaciones_min": 3, "precio_max": 150000 })),
        );
        assert_eq!(code_of(&report).as_deref(), Some("four-bed"));
        assert!(matches!(
            report.outcome,
            MatchOutcome::Found { candidates: 2, .. }
        ));
        assert!(report.ignored.is_empty());
    }

    #[test]
    fn unknown_column_is_ignored() {
        let dataset = sample_dataset();
        let with_unknown = find_best_match(
            &dataset,
            &criteria(json!({ "piscina": true, "habitaciones_max": 3 })),
        );
        let without = find_best_match(&dataset, &criteria(json!({ "habitaciones_max": 3 })));

        assert_eq!(code_of(&with_unknown), code_of(&without));
        assert_eq!(code_of(&with_unknown).as_deref(), Some("two-bed"));
        assert_eq!(
            with_unknown.ignored,
            vec![IgnoredCriterion {
                key: "piscina".to_string(),
                reason: IgnoreReason::UnknownColumn,
            }]
        );
    }

    #[test]
    fn unknown_range_target_is_ignored() {
        let dataset = sample_dataset();
        let report = find_best_match(&dataset, &criteria(json!({ "banios_min": 2 })));
        assert_eq!(code_of(&report).as_deref(), Some("two-bed"));
        assert_eq!(report.ignored[0].key, "banios_min");
    }

    #[test]
    fn empty_criteria_returns_global_best() {
        let dataset = sample_dataset();
        let report = find_best_match(&dataset, &MatchCriteria::default());
        assert_eq!(code_of(&report).as_deref(), Some("two-bed"));
        assert!(report.applied.is_empty());
    }

    #[test]
    fn yield_ties_break_on_lowest_price() {
        let dataset = vec![
            property("dear", 150_000.0, 7.5),
            property("cheap", 120_000.0, 7.5 + YIELD_EPSILON / 2.0),
            property("worse", 60_000.0, 7.0),
        ];
        let report = find_best_match(&dataset, &MatchCriteria::default());
        assert_eq!(code_of(&report).as_deref(), Some("cheap"));
    }

    #[test]
    fn boolean_criteria_match_exactly() {
        let dataset = sample_dataset();
        let report = find_best_match(&dataset, &criteria(json!({ "terraza": true })));
        assert_eq!(code_of(&report).as_deref(), Some("three-bed"));
    }

    #[test]
    fn numeric_criteria_match_exactly() {
        let dataset = sample_dataset();
        let report = find_best_match(&dataset, &criteria(json!({ "habitaciones": 3 })));
        assert_eq!(code_of(&report).as_deref(), Some("three-bed"));
    }

    #[test]
    fn text_criteria_search_field_and_description_case_insensitively() {
        let dataset = sample_dataset();
        let by_field = find_best_match(&dataset, &criteria(json!({ "distrito": "delicias" })));
        assert_eq!(code_of(&by_field).as_deref(), Some("two-bed"));

        let by_description =
            find_best_match(&dataset, &criteria(json!({ "distrito": "ASCENSOR" })));
        assert_eq!(code_of(&by_description).as_deref(), Some("four-bed"));
    }

    #[test]
    fn metric_columns_are_filterable() {
        let dataset = sample_dataset();
        let report = find_best_match(
            &dataset,
            &criteria(json!({ "Rentabilidad Bruta_max": 7.0 })),
        );
        assert_eq!(code_of(&report).as_deref(), Some("four-bed"));
    }

    #[test]
    fn missing_field_does_not_match() {
        let dataset = sample_dataset();
        // Only the two-bed row has a district.
        let report = find_best_match(&dataset, &criteria(json!({ "distrito": "Centro" })));
        assert_eq!(report.best(), None);
    }

    #[test]
    fn no_survivors_reports_the_exhausting_constraint() {
        let dataset = sample_dataset();
        let report = find_best_match(
            &dataset,
            &criteria(json!({ "habitaciones_min": 4, "precio_max": 100000 })),
        );
        assert_eq!(
            report.outcome,
            MatchOutcome::NoMatch {
                exhausted_by: Some("precio_max".to_string())
            }
        );
        assert_eq!(report.applied.len(), 2);
    }

    #[test]
    fn empty_dataset_is_no_match() {
        let report = find_best_match(&[], &MatchCriteria::default());
        assert_eq!(report.outcome, MatchOutcome::NoMatch { exhausted_by: None });
    }

    #[test]
    fn boundary_rejects_unsupported_values() {
        let parsed = criteria(json!({
            "precio_max": "cheap",
            "urls_imagenes": ["a.jpg"],
            "contacto": null,
            "planta": 0,
            "exterior": true
        }));

        assert_eq!(parsed.constraints().len(), 2);
        assert!(parsed.constraints().contains(&Constraint::Equals {
            field: "planta".to_string(),
            value: 0.0,
        }));
        assert!(parsed.constraints().contains(&Constraint::Flag {
            field: "exterior".to_string(),
            value: true,
        }));

        let reason_for = |key: &str| {
            parsed
                .ignored
                .iter()
                .find(|i| i.key == key)
                .map(|i| i.reason.clone())
        };
        assert_eq!(reason_for("precio_max"), Some(IgnoreReason::NonNumericBound));
        assert_eq!(reason_for("urls_imagenes"), Some(IgnoreReason::UnsupportedValue));
        assert_eq!(reason_for("contacto"), Some(IgnoreReason::UnsupportedValue));
    }

    #[test]
    fn bare_suffix_is_not_a_range() {
        let parsed = criteria(json!({ "_max": 3 }));
        assert_eq!(
            parsed.constraints(),
            &[Constraint::Equals {
                field: "_max".to_string(),
                value: 3.0,
            }]
        );
    }

    #[test]
    fn matcher_is_deterministic() {
        let dataset = sample_dataset();
        let parsed = criteria(json!({ "precio_max": 145000, "terraza": false }));
        let first = find_best_match(&dataset, &parsed);
        let second = find_best_match(&dataset, &parsed);
        assert_eq!(first, second);
        assert_eq!(code_of(&first).as_deref(), Some("four-bed"));
    }
}
