use axum::{
    Router,
    extract::{Json, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use crate::core::{
    CostAssumptions, DatasetFilter, FinancingInputs, IgnoredCriterion, MAX_TERM_YEARS,
    MatchCriteria, MatchOutcome, RowDiagnostic, ValuatedProperty, find_best_match, paginate,
    valuate_filtered_rows,
};

const DEFAULT_PAGE_SIZE: usize = 20;
const NO_MATCH_MESSAGE: &str = "No properties match the given criteria";

#[derive(Parser, Debug)]
#[command(
    name = "rentability",
    about = "Buy-to-let rentability estimator (mortgage + running costs + IRPF)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Value every property of a JSON dataset and print the ranked result.
    Valuate {
        #[arg(long, help = "Path to a JSON array of property rows")]
        dataset: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        financing: FinancingArgs,
        #[command(flatten)]
        assumptions: AssumptionArgs,
    },
    /// Print the single best property for a set of criteria.
    Match {
        #[arg(long, help = "Path to a JSON array of property rows")]
        dataset: PathBuf,
        #[arg(
            long,
            default_value = "{}",
            help = "JSON object of criteria, e.g. '{\"habitaciones_min\": 3, \"precio_max\": 150000}'"
        )]
        criteria: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        financing: FinancingArgs,
        #[command(flatten)]
        assumptions: AssumptionArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(
        long = "district",
        help = "Keep only rows in this district (repeatable)"
    )]
    pub districts: Vec<String>,
    #[arg(long)]
    pub price_min: Option<f64>,
    #[arg(long)]
    pub price_max: Option<f64>,
    #[arg(long, help = "Minimum size in square metres")]
    pub size_min: Option<f64>,
    #[arg(long, help = "Maximum size in square metres")]
    pub size_max: Option<f64>,
    #[arg(long)]
    pub min_bathroom_score: Option<f64>,
    #[arg(long)]
    pub min_kitchen_score: Option<f64>,
    #[arg(long, help = "Drop rows without lat/lon")]
    pub require_coordinates: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FinancingArgs {
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Down payment in percent of the purchase price"
    )]
    pub down_payment: f64,
    #[arg(long, default_value_t = 5000.0, help = "Renovation cost")]
    pub renovation_cost: f64,
    #[arg(long, default_value_t = 3000.0, help = "Agency fee")]
    pub agency_fee: f64,
    #[arg(long, default_value_t = 30, help = "Mortgage term in years")]
    pub years: u32,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Nominal annual interest rate (TIN) in percent"
    )]
    pub tin: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual life insurance premium")]
    pub life_insurance: f64,
    #[arg(long, default_value_t = 17.0, help = "IRPF rate in percent")]
    pub irpf: f64,
    #[arg(
        long,
        default_value_t = 40.0,
        help = "Share of the price that can be amortized for tax, in percent"
    )]
    pub amortization_base: f64,
}

#[derive(Args, Debug, Clone)]
pub struct AssumptionArgs {
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Non-payment insurance in percent of annual rent"
    )]
    pub non_payment_insurance_rate: f64,
    #[arg(long, default_value_t = 176.29, help = "Annual home insurance")]
    pub home_insurance: f64,
    #[arg(
        long,
        default_value_t = 0.4047,
        help = "Property tax (IBI) in percent of price"
    )]
    pub property_tax_rate: f64,
    #[arg(long, default_value_t = 283.0, help = "Annual waste collection tax")]
    pub waste_tax: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Maintenance and community fees in percent of annual rent"
    )]
    pub maintenance_rate: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Vacancy allowance in percent of annual rent"
    )]
    pub vacancy_rate: f64,
    #[arg(
        long,
        default_value_t = 8.0,
        help = "Transfer tax (ITP) in percent of price"
    )]
    pub transfer_tax_rate: f64,
    #[arg(long, default_value_t = 2.0, help = "Notary costs in percent of price")]
    pub notary_rate: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Annual tax amortization in percent of the amortization base"
    )]
    pub amortization_rate: f64,
    #[arg(
        long,
        default_value_t = 60.0,
        help = "Long-term rental deduction in percent"
    )]
    pub deduction_rate: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FinancingPayload {
    down_payment: Option<f64>,
    renovation_cost: Option<f64>,
    agency_fee: Option<f64>,
    years: Option<u32>,
    tin: Option<f64>,
    life_insurance: Option<f64>,
    irpf: Option<f64>,
    amortization_base: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AssumptionsPayload {
    non_payment_insurance_rate: Option<f64>,
    home_insurance: Option<f64>,
    property_tax_rate: Option<f64>,
    waste_tax: Option<f64>,
    maintenance_rate: Option<f64>,
    vacancy_rate: Option<f64>,
    transfer_tax_rate: Option<f64>,
    notary_rate: Option<f64>,
    amortization_rate: Option<f64>,
    deduction_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ValuatePayload {
    properties: Vec<Value>,
    financing: FinancingPayload,
    assumptions: AssumptionsPayload,
    filter: DatasetFilter,
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MatchPayload {
    properties: Vec<Value>,
    financing: FinancingPayload,
    assumptions: AssumptionsPayload,
    filter: DatasetFilter,
    criteria: Map<String, Value>,
}

#[derive(Debug)]
struct ValuateRequest {
    properties: Vec<Value>,
    financing: FinancingInputs,
    assumptions: CostAssumptions,
    filter: DatasetFilter,
    page: usize,
    page_size: usize,
}

#[derive(Debug)]
struct MatchRequest {
    properties: Vec<Value>,
    financing: FinancingInputs,
    assumptions: CostAssumptions,
    filter: DatasetFilter,
    criteria: MatchCriteria,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValuateResponse {
    page: usize,
    total_pages: usize,
    total_properties: usize,
    properties: Vec<ValuatedProperty>,
    rejected: Vec<RowDiagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchResponse {
    found: bool,
    property: Option<ValuatedProperty>,
    candidates: usize,
    message: Option<String>,
    exhausted_by: Option<String>,
    applied_criteria: Vec<String>,
    ignored_criteria: Vec<IgnoredCriterion>,
    rejected: Vec<RowDiagnostic>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_filter(args: &FilterArgs) -> DatasetFilter {
    DatasetFilter {
        districts: (!args.districts.is_empty()).then(|| args.districts.clone()),
        price_min: args.price_min,
        price_max: args.price_max,
        size_min: args.size_min,
        size_max: args.size_max,
        min_bathroom_score: args.min_bathroom_score,
        min_kitchen_score: args.min_kitchen_score,
        require_coordinates: args.require_coordinates,
    }
}

fn build_financing(args: &FinancingArgs) -> Result<FinancingInputs, String> {
    if !(1..=MAX_TERM_YEARS).contains(&args.years) {
        return Err(format!("--years must be between 1 and {MAX_TERM_YEARS}"));
    }

    for (name, pct) in [
        ("--down-payment", args.down_payment),
        ("--irpf", args.irpf),
        ("--amortization-base", args.amortization_base),
    ] {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if !args.tin.is_finite() || args.tin < 0.0 {
        return Err("--tin must be >= 0".to_string());
    }

    for (name, amount) in [
        ("--renovation-cost", args.renovation_cost),
        ("--agency-fee", args.agency_fee),
        ("--life-insurance", args.life_insurance),
    ] {
        if !amount.is_finite() || amount < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    let financing = FinancingInputs {
        down_payment_fraction: args.down_payment / 100.0,
        renovation_cost: args.renovation_cost,
        agency_fee: args.agency_fee,
        term_years: args.years,
        nominal_annual_rate: args.tin / 100.0,
        annual_life_insurance: args.life_insurance,
        irpf_rate: args.irpf / 100.0,
        amortization_base_fraction: args.amortization_base / 100.0,
    };
    financing.validate().map_err(|e| e.to_string())?;
    Ok(financing)
}

fn build_assumptions(args: &AssumptionArgs) -> Result<CostAssumptions, String> {
    for (name, pct) in [
        ("--non-payment-insurance-rate", args.non_payment_insurance_rate),
        ("--property-tax-rate", args.property_tax_rate),
        ("--maintenance-rate", args.maintenance_rate),
        ("--vacancy-rate", args.vacancy_rate),
        ("--transfer-tax-rate", args.transfer_tax_rate),
        ("--notary-rate", args.notary_rate),
        ("--amortization-rate", args.amortization_rate),
        ("--deduction-rate", args.deduction_rate),
    ] {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if !args.home_insurance.is_finite() || args.home_insurance < 0.0 {
        return Err("--home-insurance must be >= 0".to_string());
    }
    if !args.waste_tax.is_finite() || args.waste_tax < 0.0 {
        return Err("--waste-tax must be >= 0".to_string());
    }

    let assumptions = CostAssumptions {
        non_payment_insurance_rate: args.non_payment_insurance_rate / 100.0,
        home_insurance: args.home_insurance,
        property_tax_rate: args.property_tax_rate / 100.0,
        waste_tax: args.waste_tax,
        maintenance_rate: args.maintenance_rate / 100.0,
        vacancy_rate: args.vacancy_rate / 100.0,
        transfer_tax_rate: args.transfer_tax_rate / 100.0,
        notary_rate: args.notary_rate / 100.0,
        amortization_rate: args.amortization_rate / 100.0,
        deduction_rate: args.deduction_rate / 100.0,
    };
    assumptions.validate().map_err(|e| e.to_string())?;
    Ok(assumptions)
}

fn default_financing_args() -> FinancingArgs {
    FinancingArgs {
        down_payment: 20.0,
        renovation_cost: 5_000.0,
        agency_fee: 3_000.0,
        years: 30,
        tin: 3.0,
        life_insurance: 0.0,
        irpf: 17.0,
        amortization_base: 40.0,
    }
}

fn default_assumption_args() -> AssumptionArgs {
    let defaults = CostAssumptions::default();
    AssumptionArgs {
        non_payment_insurance_rate: defaults.non_payment_insurance_rate * 100.0,
        home_insurance: defaults.home_insurance,
        property_tax_rate: defaults.property_tax_rate * 100.0,
        waste_tax: defaults.waste_tax,
        maintenance_rate: defaults.maintenance_rate * 100.0,
        vacancy_rate: defaults.vacancy_rate * 100.0,
        transfer_tax_rate: defaults.transfer_tax_rate * 100.0,
        notary_rate: defaults.notary_rate * 100.0,
        amortization_rate: defaults.amortization_rate * 100.0,
        deduction_rate: defaults.deduction_rate * 100.0,
    }
}

fn financing_from_payload(payload: FinancingPayload) -> Result<FinancingInputs, String> {
    let mut args = default_financing_args();

    if let Some(v) = payload.down_payment {
        args.down_payment = v;
    }
    if let Some(v) = payload.renovation_cost {
        args.renovation_cost = v;
    }
    if let Some(v) = payload.agency_fee {
        args.agency_fee = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.tin {
        args.tin = v;
    }
    if let Some(v) = payload.life_insurance {
        args.life_insurance = v;
    }
    if let Some(v) = payload.irpf {
        args.irpf = v;
    }
    if let Some(v) = payload.amortization_base {
        args.amortization_base = v;
    }

    build_financing(&args)
}

fn assumptions_from_payload(payload: AssumptionsPayload) -> Result<CostAssumptions, String> {
    let mut args = default_assumption_args();

    if let Some(v) = payload.non_payment_insurance_rate {
        args.non_payment_insurance_rate = v;
    }
    if let Some(v) = payload.home_insurance {
        args.home_insurance = v;
    }
    if let Some(v) = payload.property_tax_rate {
        args.property_tax_rate = v;
    }
    if let Some(v) = payload.waste_tax {
        args.waste_tax = v;
    }
    if let Some(v) = payload.maintenance_rate {
        args.maintenance_rate = v;
    }
    if let Some(v) = payload.vacancy_rate {
        args.vacancy_rate = v;
    }
    if let Some(v) = payload.transfer_tax_rate {
        args.transfer_tax_rate = v;
    }
    if let Some(v) = payload.notary_rate {
        args.notary_rate = v;
    }
    if let Some(v) = payload.amortization_rate {
        args.amortization_rate = v;
    }
    if let Some(v) = payload.deduction_rate {
        args.deduction_rate = v;
    }

    build_assumptions(&args)
}

fn valuate_request_from_payload(payload: ValuatePayload) -> Result<ValuateRequest, String> {
    Ok(ValuateRequest {
        properties: payload.properties,
        financing: financing_from_payload(payload.financing)?,
        assumptions: assumptions_from_payload(payload.assumptions)?,
        filter: payload.filter,
        page: payload.page.unwrap_or(1),
        page_size: payload.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    })
}

fn match_request_from_payload(payload: MatchPayload) -> Result<MatchRequest, String> {
    Ok(MatchRequest {
        properties: payload.properties,
        financing: financing_from_payload(payload.financing)?,
        assumptions: assumptions_from_payload(payload.assumptions)?,
        filter: payload.filter,
        criteria: MatchCriteria::from_json(&payload.criteria),
    })
}

fn run_valuation(request: &ValuateRequest) -> Result<ValuateResponse, String> {
    let batch = valuate_filtered_rows(
        &request.properties,
        &request.filter,
        &request.financing,
        &request.assumptions,
    )
    .map_err(|e| e.to_string())?;
    let page = paginate(&batch.properties, request.page, request.page_size)
        .map_err(|e| e.to_string())?;

    Ok(ValuateResponse {
        page: page.page,
        total_pages: page.total_pages,
        total_properties: page.total_items,
        properties: page.items.to_vec(),
        rejected: batch.rejected,
    })
}

fn run_match(request: &MatchRequest) -> Result<MatchResponse, String> {
    let batch = valuate_filtered_rows(
        &request.properties,
        &request.filter,
        &request.financing,
        &request.assumptions,
    )
    .map_err(|e| e.to_string())?;
    if request.criteria.is_empty() {
        tracing::debug!("no usable criteria; returning the best-ranked property");
    }

    let report = find_best_match(&batch.properties, &request.criteria);
    let response = match report.outcome {
        MatchOutcome::Found {
            property,
            candidates,
        } => MatchResponse {
            found: true,
            property: Some(property.clone()),
            candidates,
            message: None,
            exhausted_by: None,
            applied_criteria: report.applied,
            ignored_criteria: report.ignored,
            rejected: batch.rejected,
        },
        MatchOutcome::NoMatch { exhausted_by } => MatchResponse {
            found: false,
            property: None,
            candidates: 0,
            message: Some(NO_MATCH_MESSAGE.to_string()),
            exhausted_by,
            applied_criteria: report.applied,
            ignored_criteria: report.ignored,
            rejected: batch.rejected,
        },
    };
    Ok(response)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "rentability HTTP API listening");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/valuate", post(valuate_handler))
        .route("/api/match", post(match_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn valuate_handler(payload: Result<Json<ValuatePayload>, JsonRejection>) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let request = match valuate_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_valuation(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn match_handler(payload: Result<Json<MatchPayload>, JsonRejection>) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };
    let request = match match_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_match(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn rejection_response(rejection: JsonRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        &format!("Invalid API JSON payload: {}", rejection.body_text()),
    )
}

fn load_dataset(path: &Path) -> Result<Vec<Value>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read dataset {}: {e}", path.display()))?;
    serde_json::from_str::<Vec<Value>>(&raw)
        .map_err(|e| format!("dataset {} is not a JSON array: {e}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

/// Runs a parsed command line; the `serve` command blocks until shutdown.
pub async fn run_cli(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Valuate {
            dataset,
            page,
            page_size,
            filter,
            financing,
            assumptions,
        } => {
            let request = ValuateRequest {
                properties: load_dataset(&dataset)?,
                financing: build_financing(&financing)?,
                assumptions: build_assumptions(&assumptions)?,
                filter: build_filter(&filter),
                page,
                page_size,
            };
            print_json(&run_valuation(&request)?)
        }
        Command::Match {
            dataset,
            criteria,
            filter,
            financing,
            assumptions,
        } => {
            let criteria = serde_json::from_str::<Map<String, Value>>(&criteria)
                .map_err(|e| format!("--criteria must be a JSON object: {e}"))?;
            let request = MatchRequest {
                properties: load_dataset(&dataset)?,
                financing: build_financing(&financing)?,
                assumptions: build_assumptions(&assumptions)?,
                filter: build_filter(&filter),
                criteria: MatchCriteria::from_json(&criteria),
            };
            print_json(&run_match(&request)?)
        }
    }
}

#[cfg(test)]
fn valuate_request_from_json(json: &str) -> Result<ValuateRequest, String> {
    let payload = serde_json::from_str::<ValuatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    valuate_request_from_payload(payload)
}

#[cfg(test)]
fn match_request_from_json(json: &str) -> Result<MatchRequest, String> {
    let payload = serde_json::from_str::<MatchPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    match_request_from_payload(payload)
}
