//! Listening statistics endpoints.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::GuardedStats;
use crate::stats::{InsightsReport, Period, StatsReport, WrappedReport};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

pub async fn get_stats(
    session: Session,
    State(stats): State<GuardedStats>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<StatsReport>> {
    let period = Period::parse(query.period.as_deref());
    let report = stats
        .report(session.user_id, period)
        .map_err(ApiError::internal)?;
    Ok(Json(report))
}

pub async fn get_insights(
    session: Session,
    State(stats): State<GuardedStats>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Json<InsightsReport>> {
    let period = Period::parse(query.period.as_deref());
    let report = stats
        .insights(session.user_id, period)
        .map_err(ApiError::internal)?;
    Ok(Json(report))
}

pub async fn get_wrapped(
    session: Session,
    State(stats): State<GuardedStats>,
) -> ApiResult<Json<WrappedReport>> {
    let report = stats.wrapped(session.user_id).map_err(ApiError::internal)?;
    Ok(Json(report))
}
