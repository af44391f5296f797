use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};

/// Column labels of the metrics appended to every valuated row.
pub mod labels {
    pub const TOTAL_COST: &str = "Coste Total";
    pub const GROSS_YIELD: &str = "Rentabilidad Bruta";
    pub const PRE_TAX_PROFIT: &str = "Beneficio Antes de Impuestos";
    pub const NET_YIELD: &str = "Rentabilidad Neta";
    pub const MONTHLY_PAYMENT: &str = "Cuota Mensual Hipoteca";
    pub const CASH_FOR_PURCHASE: &str = "Cash Necesario Compra";
    pub const CASH_FOR_PURCHASE_AND_RENOVATION: &str = "Cash Total Compra y Reforma";
    pub const NET_PROFIT: &str = "Beneficio Neto";
    pub const CASHFLOW_BEFORE_TAX: &str = "Cashflow Antes de Impuestos";
    pub const CASHFLOW_AFTER_TAX: &str = "Cashflow Después de Impuestos";
    pub const ROCE: &str = "ROCE";
    pub const ROCE_YEARS: &str = "ROCE (Años)";
    pub const COCR: &str = "Cash-on-Cash Return";
    pub const COCR_YEARS: &str = "COCR (Años)";

    pub const ALL: [&str; 14] = [
        TOTAL_COST,
        GROSS_YIELD,
        PRE_TAX_PROFIT,
        NET_YIELD,
        MONTHLY_PAYMENT,
        CASH_FOR_PURCHASE,
        CASH_FOR_PURCHASE_AND_RENOVATION,
        NET_PROFIT,
        CASHFLOW_BEFORE_TAX,
        CASHFLOW_AFTER_TAX,
        ROCE,
        ROCE_YEARS,
        COCR,
        COCR_YEARS,
    ];

    pub fn is_metric(name: &str) -> bool {
        ALL.contains(&name)
    }
}

pub const PRICE_COLUMN: &str = "precio";
pub const RENT_COLUMN: &str = "alquiler_predicho";
pub const DESCRIPTION_COLUMN: &str = "descripcion";

/// Longest mortgage term accepted, in years.
pub const MAX_TERM_YEARS: u32 = 100;

/// Financing terms shared by every property of one valuation pass.
/// Rates are fractions (0.03 = 3 %).
#[derive(Debug, Clone, PartialEq)]
pub struct FinancingInputs {
    pub down_payment_fraction: f64,
    pub renovation_cost: f64,
    pub agency_fee: f64,
    pub term_years: u32,
    pub nominal_annual_rate: f64,
    pub annual_life_insurance: f64,
    pub irpf_rate: f64,
    pub amortization_base_fraction: f64,
}

impl FinancingInputs {
    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_TERM_YEARS).contains(&self.term_years) {
            return Err(EngineError::invalid(format!(
                "term_years must be between 1 and {MAX_TERM_YEARS}, got {}",
                self.term_years
            )));
        }
        for (name, value) in [
            ("down_payment_fraction", self.down_payment_fraction),
            ("irpf_rate", self.irpf_rate),
            ("amortization_base_fraction", self.amortization_base_fraction),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("renovation_cost", self.renovation_cost),
            ("agency_fee", self.agency_fee),
            ("nominal_annual_rate", self.nominal_annual_rate),
            ("annual_life_insurance", self.annual_life_insurance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid(format!(
                    "{name} must be >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Jurisdiction-dependent rates and fixed costs. Defaults are the Spanish
/// (Zaragoza) figures the model was calibrated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CostAssumptions {
    pub non_payment_insurance_rate: f64,
    pub home_insurance: f64,
    pub property_tax_rate: f64,
    pub waste_tax: f64,
    pub maintenance_rate: f64,
    pub vacancy_rate: f64,
    pub transfer_tax_rate: f64,
    pub notary_rate: f64,
    pub amortization_rate: f64,
    pub deduction_rate: f64,
}

impl Default for CostAssumptions {
    fn default() -> Self {
        Self {
            non_payment_insurance_rate: 0.04,
            home_insurance: 176.29,
            property_tax_rate: 0.004047,
            waste_tax: 283.0,
            maintenance_rate: 0.10,
            vacancy_rate: 0.05,
            transfer_tax_rate: 0.08,
            notary_rate: 0.02,
            amortization_rate: 0.03,
            deduction_rate: 0.60,
        }
    }
}

impl CostAssumptions {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("home_insurance", self.home_insurance),
            ("waste_tax", self.waste_tax),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid(format!(
                    "{name} must be >= 0, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("non_payment_insurance_rate", self.non_payment_insurance_rate),
            ("property_tax_rate", self.property_tax_rate),
            ("maintenance_rate", self.maintenance_rate),
            ("vacancy_rate", self.vacancy_rate),
            ("transfer_tax_rate", self.transfer_tax_rate),
            ("notary_rate", self.notary_rate),
            ("amortization_rate", self.amortization_rate),
            ("deduction_rate", self.deduction_rate),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// An opaque dataset cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Text form used for substring search; containers and null have none.
    pub fn searchable_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(v) => Some(Cow::Borrowed(v)),
            FieldValue::Number(v) => Some(Cow::Owned(v.to_string())),
            FieldValue::Bool(v) => Some(Cow::Owned(v.to_string())),
            _ => None,
        }
    }
}

/// One dataset row. Only price and rent are interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(rename = "precio", alias = "price")]
    pub price: f64,
    #[serde(
        rename = "alquiler_predicho",
        alias = "predicted_monthly_rent",
        alias = "rent"
    )]
    pub predicted_monthly_rent: f64,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, FieldValue>,
}

impl PropertyRecord {
    pub fn new(price: f64, predicted_monthly_rent: f64) -> Self {
        Self {
            price,
            predicted_monthly_rent,
            attributes: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_attribute(mut self, name: &str, value: FieldValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(EngineError::invalid(format!(
                "{PRICE_COLUMN} must be > 0, got {}",
                self.price
            )));
        }
        if !self.predicted_monthly_rent.is_finite() || self.predicted_monthly_rent < 0.0 {
            return Err(EngineError::invalid(format!(
                "{RENT_COLUMN} must be >= 0, got {}",
                self.predicted_monthly_rent
            )));
        }
        Ok(())
    }

    pub fn annual_rent(&self) -> f64 {
        self.predicted_monthly_rent * 12.0
    }
}

/// Profitability figures for one property, rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitabilityMetrics {
    #[serde(rename = "Coste Total")]
    pub total_cost: f64,
    #[serde(rename = "Rentabilidad Bruta")]
    pub gross_yield: f64,
    #[serde(rename = "Beneficio Antes de Impuestos")]
    pub pre_tax_profit: f64,
    #[serde(rename = "Rentabilidad Neta")]
    pub net_yield: f64,
    #[serde(rename = "Cuota Mensual Hipoteca")]
    pub monthly_payment: f64,
    #[serde(rename = "Cash Necesario Compra")]
    pub cash_for_purchase: f64,
    #[serde(rename = "Cash Total Compra y Reforma")]
    pub cash_for_purchase_and_renovation: f64,
    #[serde(rename = "Beneficio Neto")]
    pub net_profit: f64,
    #[serde(rename = "Cashflow Antes de Impuestos")]
    pub cashflow_before_tax: f64,
    #[serde(rename = "Cashflow Después de Impuestos")]
    pub cashflow_after_tax: f64,
    #[serde(rename = "ROCE")]
    pub roce: f64,
    #[serde(rename = "ROCE (Años)")]
    pub roce_years: f64,
    #[serde(rename = "Cash-on-Cash Return")]
    pub cocr: f64,
    #[serde(rename = "COCR (Años)")]
    pub cocr_years: f64,
}

impl ProfitabilityMetrics {
    pub fn get(&self, label: &str) -> Option<f64> {
        let value = match label {
            labels::TOTAL_COST => self.total_cost,
            labels::GROSS_YIELD => self.gross_yield,
            labels::PRE_TAX_PROFIT => self.pre_tax_profit,
            labels::NET_YIELD => self.net_yield,
            labels::MONTHLY_PAYMENT => self.monthly_payment,
            labels::CASH_FOR_PURCHASE => self.cash_for_purchase,
            labels::CASH_FOR_PURCHASE_AND_RENOVATION => self.cash_for_purchase_and_renovation,
            labels::NET_PROFIT => self.net_profit,
            labels::CASHFLOW_BEFORE_TAX => self.cashflow_before_tax,
            labels::CASHFLOW_AFTER_TAX => self.cashflow_after_tax,
            labels::ROCE => self.roce,
            labels::ROCE_YEARS => self.roce_years,
            labels::COCR => self.cocr,
            labels::COCR_YEARS => self.cocr_years,
            _ => return None,
        };
        Some(value)
    }
}

/// A dataset row with its metrics appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuatedProperty {
    #[serde(flatten)]
    pub record: PropertyRecord,
    #[serde(flatten)]
    pub metrics: ProfitabilityMetrics,
}

impl ValuatedProperty {
    /// Looks a column up by name across record fields, metrics and attributes.
    pub fn field(&self, name: &str) -> Option<Cow<'_, FieldValue>> {
        match name {
            PRICE_COLUMN | "price" => Some(Cow::Owned(FieldValue::Number(self.record.price))),
            RENT_COLUMN | "predicted_monthly_rent" | "rent" => Some(Cow::Owned(
                FieldValue::Number(self.record.predicted_monthly_rent),
            )),
            _ => match self.metrics.get(name) {
                Some(value) => Some(Cow::Owned(FieldValue::Number(value))),
                None => self.record.attributes.get(name).map(Cow::Borrowed),
            },
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
