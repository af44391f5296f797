use super::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MortgageSchedule {
    pub principal: f64,
    /// Magnitude of the level monthly payment.
    pub monthly_payment: f64,
    pub total_paid: f64,
    pub total_interest: f64,
    pub annual_principal: f64,
    pub annual_interest: f64,
}

/// Level payment per period for a loan of `present_value`, signed as a cash
/// outflow (negative for a positive loan).
pub fn payment_per_period(rate: f64, periods: u32, present_value: f64) -> f64 {
    let n = periods as f64;
    if rate == 0.0 {
        return -present_value / n;
    }
    -present_value * rate / (1.0 - (1.0 + rate).powf(-n))
}

pub fn amortize(
    principal: f64,
    term_years: u32,
    nominal_annual_rate: f64,
) -> EngineResult<MortgageSchedule> {
    if term_years == 0 {
        return Err(EngineError::invalid("term_years must be >= 1"));
    }
    if !principal.is_finite() || principal < 0.0 {
        return Err(EngineError::invalid(format!(
            "loan principal must be >= 0, got {principal}"
        )));
    }
    if !nominal_annual_rate.is_finite() || nominal_annual_rate < 0.0 {
        return Err(EngineError::invalid(format!(
            "nominal_annual_rate must be >= 0, got {nominal_annual_rate}"
        )));
    }

    let periods = term_years
        .checked_mul(12)
        .ok_or_else(|| EngineError::invalid(format!("term_years {term_years} is too large")))?;
    let monthly_payment = payment_per_period(nominal_annual_rate / 12.0, periods, principal).abs();
    let total_paid = monthly_payment * periods as f64;
    let total_interest = total_paid - principal;
    let years = term_years as f64;

    Ok(MortgageSchedule {
        principal,
        monthly_payment,
        total_paid,
        total_interest,
        annual_principal: principal / years,
        annual_interest: total_interest / years,
    })
}
