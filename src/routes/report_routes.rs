// src/routes/report_routes.rs

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
    scheduling::reporting::{
        self, BillingRange, BillingSummary, FeeModel, KeyMetrics, MetricsPeriod, Overview,
        OverviewRange,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/overview", get(overview))
        .route("/reports/key-metrics", get(key_metrics))
        .route("/reports/billing-summary", get(billing_summary))
}

/* ============================================================
   Query params
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    /// `today` or `this_week`; anything else means all time.
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// `last_7_days`, `last_30_days` or `YYYY-MM`.
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BillingQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub fee_type: Option<String>,
    pub fee_value: Option<i64>,
}

impl BillingQuery {
    fn fee(&self, default: FeeModel) -> Result<FeeModel, ApiError> {
        match (&self.fee_type, self.fee_value) {
            (None, None) => Ok(default),
            (Some(fee_type), Some(value)) => Ok(FeeModel::from_parts(fee_type, value)?),
            _ => Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "fee_type and fee_value must be given together".into(),
            )),
        }
    }
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn overview(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<OverviewQuery>,
) -> Result<Json<ApiOk<Overview>>, ApiError> {
    let range = q.filter.as_deref().and_then(OverviewRange::parse);
    let data = reporting::overview(
        state.store.as_ref(),
        &auth.caller(),
        range,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(ApiOk { data }))
}

pub async fn key_metrics(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<MetricsQuery>,
) -> Result<Json<ApiOk<KeyMetrics>>, ApiError> {
    let period = q.period.as_deref().and_then(MetricsPeriod::parse);
    let data = reporting::key_metrics(
        state.store.as_ref(),
        &auth.caller(),
        period,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(ApiOk { data }))
}

pub async fn billing_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<BillingQuery>,
) -> Result<Json<ApiOk<BillingSummary>>, ApiError> {
    let fee = q.fee(state.default_fee)?;
    let range = BillingRange {
        start: q.start,
        end: q.end,
    };
    let data = reporting::billing_summary(
        state.store.as_ref(),
        &auth.caller(),
        range,
        fee,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(Json(ApiOk { data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(fee_type: Option<&str>, fee_value: Option<i64>) -> BillingQuery {
        BillingQuery {
            start: None,
            end: None,
            fee_type: fee_type.map(str::to_string),
            fee_value,
        }
    }

    #[test]
    fn billing_fee_falls_back_to_the_configured_default() {
        let default = FeeModel::Percentage { basis_points: 3000 };
        assert_eq!(query(None, None).fee(default).unwrap(), default);
        assert_eq!(
            query(Some("flat"), Some(1500)).fee(default).unwrap(),
            FeeModel::Flat { amount_cents: 1500 }
        );
    }

    #[test]
    fn billing_fee_rejects_partial_or_unknown_input() {
        let default = FeeModel::Flat { amount_cents: 0 };
        assert!(matches!(
            query(Some("flat"), None).fee(default),
            Err(ApiError::BadRequest("VALIDATION_ERROR", _))
        ));
        assert!(matches!(
            query(Some("commission"), Some(10)).fee(default),
            Err(ApiError::BadRequest("VALIDATION_ERROR", _))
        ));
    }
}
