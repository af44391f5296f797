use super::costs::{OperatingCosts, operating_costs};
use super::error::{EngineError, EngineResult};
use super::mortgage::{MortgageSchedule, amortize};
use super::tax::{ProfitBreakdown, TaxInputs, profit_breakdown};
use super::types::{CostAssumptions, FinancingInputs, ProfitabilityMetrics, PropertyRecord, labels};

/// One-off purchase costs and the cash they require up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionCosts {
    pub transfer_tax: f64,
    pub notary_cost: f64,
    pub total_cost: f64,
    pub down_payment: f64,
    pub cash_for_purchase: f64,
    pub cash_for_purchase_and_renovation: f64,
    pub initial_investment: f64,
}

impl AcquisitionCosts {
    fn new(price: f64, financing: &FinancingInputs, assumptions: &CostAssumptions) -> Self {
        let transfer_tax = price * assumptions.transfer_tax_rate;
        let notary_cost = price * assumptions.notary_rate;
        let down_payment = financing.down_payment_fraction * price;
        Self {
            transfer_tax,
            notary_cost,
            total_cost: price
                + financing.renovation_cost
                + financing.agency_fee
                + notary_cost
                + transfer_tax,
            down_payment,
            cash_for_purchase: down_payment + financing.agency_fee + notary_cost + transfer_tax,
            cash_for_purchase_and_renovation: down_payment
                + financing.renovation_cost
                + notary_cost
                + transfer_tax,
            initial_investment: down_payment
                + financing.renovation_cost
                + financing.agency_fee
                + notary_cost
                + transfer_tax,
        }
    }

    /// Costs that feed the tax amortization base besides the building itself.
    fn amortizable_extras(self, financing: &FinancingInputs) -> f64 {
        financing.renovation_cost + financing.agency_fee + self.notary_cost + self.transfer_tax
    }
}

/// Every intermediate figure of a valuation at full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct RentabilityBreakdown {
    pub annual_rent: f64,
    pub acquisition: AcquisitionCosts,
    pub mortgage: MortgageSchedule,
    pub costs: OperatingCosts,
    pub profit: ProfitBreakdown,
    pub metrics: ProfitabilityMetrics,
}

pub fn rentability_breakdown(
    record: &PropertyRecord,
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<RentabilityBreakdown> {
    financing.validate()?;
    assumptions.validate()?;
    record.validate()?;

    let price = record.price;
    let annual_rent = record.annual_rent();
    let acquisition = AcquisitionCosts::new(price, financing, assumptions);

    let loan = price * (1.0 - financing.down_payment_fraction);
    let mortgage = amortize(loan, financing.term_years, financing.nominal_annual_rate)?;
    let costs = operating_costs(price, annual_rent, assumptions);
    let profit = profit_breakdown(
        &TaxInputs {
            price,
            annual_rent,
            annual_life_insurance: financing.annual_life_insurance,
            annual_interest: mortgage.annual_interest,
            amortization_base_fraction: financing.amortization_base_fraction,
            acquisition_costs: acquisition.amortizable_extras(financing),
            irpf_rate: financing.irpf_rate,
        },
        costs,
        assumptions,
    );

    let gross_yield = ratio(labels::GROSS_YIELD, annual_rent, acquisition.total_cost)? * 100.0;
    let net_yield = ratio(labels::NET_YIELD, profit.net_profit, acquisition.total_cost)? * 100.0;
    let cashflow_before_tax = profit.pre_tax_profit - mortgage.annual_principal;
    let cashflow_after_tax = profit.net_profit - mortgage.annual_principal;

    let initial_investment = acquisition.initial_investment;
    let roce = ratio(labels::ROCE, annual_rent, initial_investment)? * 100.0;
    // Reduces to 100 / ROCE; kept in this form for parity with published figures.
    let roce_years = ratio(
        labels::ROCE_YEARS,
        initial_investment,
        initial_investment * roce / 100.0,
    )?;
    let cocr = ratio(labels::COCR, cashflow_after_tax, initial_investment)? * 100.0;
    let cocr_years = cash_on_cash_years(initial_investment, cashflow_after_tax)?;

    let metrics = ProfitabilityMetrics {
        total_cost: acquisition.total_cost,
        gross_yield,
        pre_tax_profit: profit.pre_tax_profit,
        net_yield,
        monthly_payment: mortgage.monthly_payment,
        cash_for_purchase: acquisition.cash_for_purchase,
        cash_for_purchase_and_renovation: acquisition.cash_for_purchase_and_renovation,
        net_profit: profit.net_profit,
        cashflow_before_tax,
        cashflow_after_tax,
        roce,
        roce_years,
        cocr,
        cocr_years,
    };

    Ok(RentabilityBreakdown {
        annual_rent,
        acquisition,
        mortgage,
        costs,
        profit,
        metrics,
    })
}

/// Profitability metrics for one property, rounded to 2 decimals.
pub fn calculate_rentability(
    record: &PropertyRecord,
    financing: &FinancingInputs,
    assumptions: &CostAssumptions,
) -> EngineResult<ProfitabilityMetrics> {
    rentability_breakdown(record, financing, assumptions).map(|b| b.metrics.rounded())
}

/// Years of after-tax cashflow needed to recover the initial investment.
/// Negative when the property never pays back.
pub fn cash_on_cash_years(initial_investment: f64, cashflow_after_tax: f64) -> EngineResult<f64> {
    ratio(labels::COCR_YEARS, initial_investment, cashflow_after_tax)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio(metric: &'static str, numerator: f64, denominator: f64) -> EngineResult<f64> {
    if denominator == 0.0 {
        return Err(EngineError::DegenerateInput { metric });
    }
    let value = numerator / denominator;
    if !value.is_finite() {
        return Err(EngineError::DegenerateInput { metric });
    }
    Ok(value)
}

impl ProfitabilityMetrics {
    pub fn rounded(&self) -> Self {
        Self {
            total_cost: round2(self.total_cost),
            gross_yield: round2(self.gross_yield),
            pre_tax_profit: round2(self.pre_tax_profit),
            net_yield: round2(self.net_yield),
            monthly_payment: round2(self.monthly_payment),
            cash_for_purchase: round2(self.cash_for_purchase),
            cash_for_purchase_and_renovation: round2(self.cash_for_purchase_and_renovation),
            net_profit: round2(self.net_profit),
            cashflow_before_tax: round2(self.cashflow_before_tax),
            cashflow_after_tax: round2(self.cashflow_after_tax),
            roce: round2(self.roce),
            roce_years: round2(self.roce_years),
            cocr: round2(self.cocr),
            cocr_years: round2(self.cocr_years),
        }
    }
}
