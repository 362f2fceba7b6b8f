//! Handlers for `/performance` endpoints: the students of a classroom or
//! grade whose average falls in one tier.
//!
//! `?tier=` is required and takes either `excellent|good|average|weak` or
//! the report-card label (`Giỏi|Khá|Trung bình|Yếu`); the period parameters
//! are the same as for rankings.

use std::str::FromStr as _;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use scorebook_core::{
  average::Tier,
  code::{ClassroomCode, GradeCode, SchoolYearCode, TermCode},
  ranking::Population,
  report::PerformanceList,
};
use serde::Deserialize;

use crate::{AppState, Backend, error::ApiError, rankings::PeriodParams};

#[derive(Debug, Deserialize)]
pub struct PerformanceParams {
  pub tier:        Option<String>,
  pub term:        Option<TermCode>,
  pub school_year: Option<SchoolYearCode>,
}

async fn performance<S: Backend>(
  state: &AppState<S>,
  population: Population,
  params: PerformanceParams,
) -> Result<PerformanceList, ApiError> {
  let tier = params
    .tier
    .ok_or_else(|| ApiError::BadRequest("tier is required".into()))?;
  let tier = Tier::from_str(&tier)
    .map_err(|_| scorebook_core::Error::UnknownTier(tier))?;

  let period = PeriodParams { term: params.term, school_year: params.school_year }
    .into_period()?;
  let period = state.reports.resolve_period(&population, period).await?;
  Ok(state.reports.performance(&population, &period, tier).await?)
}

/// `GET /performance/classrooms/{code}?tier=<tier>`
pub async fn classroom<S: Backend>(
  State(state): State<AppState<S>>,
  Path(code): Path<ClassroomCode>,
  Query(params): Query<PerformanceParams>,
) -> Result<Json<PerformanceList>, ApiError> {
  Ok(Json(performance(&state, Population::Classroom(code), params).await?))
}

/// `GET /performance/grades/{code}?tier=<tier>`
pub async fn grade<S: Backend>(
  State(state): State<AppState<S>>,
  Path(code): Path<GradeCode>,
  Query(params): Query<PerformanceParams>,
) -> Result<Json<PerformanceList>, ApiError> {
  Ok(Json(performance(&state, Population::Grade(code), params).await?))
}
