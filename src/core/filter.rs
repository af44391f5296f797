use serde::Deserialize;
use serde_json::Value;

use super::error::{EngineError, EngineResult};
use super::types::PRICE_COLUMN;

const DISTRICT_COLUMN: &str = "distrito";
const SIZE_COLUMN: &str = "tamanio";
const BATHROOM_SCORE_COLUMN: &str = "puntuacion_banio";
const KITCHEN_SCORE_COLUMN: &str = "puntuacion_cocina";

/// Browse-view narrowing applied to raw rows before valuation. Every clause
/// is optional; a row missing a referenced column fails that clause.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasetFilter {
    pub districts: Option<Vec<String>>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub size_min: Option<f64>,
    pub size_max: Option<f64>,
    pub min_bathroom_score: Option<f64>,
    pub min_kitchen_score: Option<f64>,
    pub require_coordinates: bool,
}

impl DatasetFilter {
    pub fn accepts(&self, row: &Value) -> bool {
        if let Some(districts) = &self.districts {
            let Some(district) = row.get(DISTRICT_COLUMN).and_then(Value::as_str) else {
                return false;
            };
            if !districts.iter().any(|d| d == district) {
                return false;
            }
        }

        let price = number(row, PRICE_COLUMN).or_else(|| number(row, "price"));
        if !within(price, self.price_min, self.price_max) {
            return false;
        }
        if !within(number(row, SIZE_COLUMN), self.size_min, self.size_max) {
            return false;
        }
        if !within(number(row, BATHROOM_SCORE_COLUMN), self.min_bathroom_score, None) {
            return false;
        }
        if !within(number(row, KITCHEN_SCORE_COLUMN), self.min_kitchen_score, None) {
            return false;
        }

        if self.require_coordinates && (number(row, "lat").is_none() || number(row, "lon").is_none())
        {
            return false;
        }
        true
    }

    /// Accepted rows paired with their position in `rows`.
    pub fn select<'a>(&self, rows: &'a [Value]) -> Vec<(usize, &'a Value)> {
        let kept: Vec<(usize, &Value)> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.accepts(row))
            .collect();
        tracing::debug!(
            total = rows.len(),
            kept = kept.len(),
            "dataset pre-filter applied"
        );
        kept
    }
}

fn number(row: &Value, column: &str) -> Option<f64> {
    row.get(column).and_then(Value::as_f64)
}

fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> EngineResult<Page<'_, T>> {
    if per_page == 0 {
        return Err(EngineError::invalid("page size must be >= 1"));
    }
    let total_pages = items.len().div_ceil(per_page).max(1);
    if page == 0 || page > total_pages {
        return Err(EngineError::invalid(format!(
            "page must be between 1 and {total_pages}, got {page}"
        )));
    }

    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Ok(Page {
        items: &items[start..end],
        page,
        total_pages,
        total_items: items.len(),
    })
}
