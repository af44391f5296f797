use super::costs::OperatingCosts;
use super::types::CostAssumptions;

#[derive(Debug, Clone, Copy)]
pub struct TaxInputs {
    pub price: f64,
    pub annual_rent: f64,
    pub annual_life_insurance: f64,
    pub annual_interest: f64,
    pub amortization_base_fraction: f64,
    /// Renovation, agency fee, notary and transfer tax.
    pub acquisition_costs: f64,
    pub irpf_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBreakdown {
    pub pre_tax_profit: f64,
    pub amortization_base: f64,
    pub annual_amortization: f64,
    pub long_term_deduction: f64,
    /// Tax adjustment; negative when it reduces profit.
    pub irpf: f64,
    pub net_profit: f64,
}

pub fn profit_breakdown(
    inputs: &TaxInputs,
    costs: OperatingCosts,
    assumptions: &CostAssumptions,
) -> ProfitBreakdown {
    let pre_tax_profit = inputs.annual_rent
        - costs.non_payment_insurance
        - costs.home_insurance
        - inputs.annual_life_insurance
        - costs.property_tax
        - costs.waste_tax
        - costs.maintenance
        - costs.vacancy_allowance
        - inputs.annual_interest;

    let amortization_base =
        inputs.amortization_base_fraction * inputs.price + inputs.acquisition_costs;
    let annual_amortization = assumptions.amortization_rate * amortization_base;
    let long_term_deduction = (pre_tax_profit - annual_amortization) * assumptions.deduction_rate;
    let irpf = -(long_term_deduction * inputs.irpf_rate);

    ProfitBreakdown {
        pre_tax_profit,
        amortization_base,
        annual_amortization,
        long_term_deduction,
        irpf,
        net_profit: pre_tax_profit + irpf,
    }
}
