mod batch;
mod costs;
mod engine;
mod error;
mod filter;
mod matcher;
mod mortgage;
mod tax;
mod types;

pub use batch::{
    BatchValuation, RowDiagnostic, sort_by_gross_yield, valuate_filtered_rows, valuate_properties,
    valuate_rows,
};
pub use costs::{OperatingCosts, operating_costs};
pub use engine::{
    AcquisitionCosts, RentabilityBreakdown, calculate_rentability, cash_on_cash_years,
    rentability_breakdown, round2,
};
pub use error::{EngineError, EngineResult};
pub use filter::{DatasetFilter, Page, paginate};
pub use matcher::{
    Bound, Constraint, IgnoreReason, IgnoredCriterion, MatchCriteria, MatchOutcome, MatchReport,
    YIELD_EPSILON, find_best_match, rank,
};
pub use mortgage::{MortgageSchedule, amortize, payment_per_period};
pub use tax::{ProfitBreakdown, TaxInputs, profit_breakdown};
pub use types::{
    CostAssumptions, DESCRIPTION_COLUMN, FieldValue, FinancingInputs, MAX_TERM_YEARS,
    PRICE_COLUMN, ProfitabilityMetrics, PropertyRecord, RENT_COLUMN, ValuatedProperty, labels,
};
