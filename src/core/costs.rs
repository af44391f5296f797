use super::types::CostAssumptions;

/// Annual running costs of a let property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingCosts {
    pub non_payment_insurance: f64,
    pub home_insurance: f64,
    pub property_tax: f64,
    pub waste_tax: f64,
    pub maintenance: f64,
    pub vacancy_allowance: f64,
}

impl OperatingCosts {
    pub fn total(self) -> f64 {
        self.non_payment_insurance
            + self.home_insurance
            + self.property_tax
            + self.waste_tax
            + self.maintenance
            + self.vacancy_allowance
    }
}

pub fn operating_costs(
    price: f64,
    annual_rent: f64,
    assumptions: &CostAssumptions,
) -> OperatingCosts {
    OperatingCosts {
        non_payment_insurance: assumptions.non_payment_insurance_rate * annual_rent,
        home_insurance: assumptions.home_insurance,
        property_tax: price * assumptions.property_tax_rate,
        waste_tax: assumptions.waste_tax,
        maintenance: assumptions.maintenance_rate * annual_rent,
        vacancy_allowance: assumptions.vacancy_rate * annual_rent,
    }
}
