//! Handlers for `/rankings` endpoints.
//!
//! Both take either `?term=<code>` or `?school_year=<code>`; with neither, the
//! school year of the population's grade is used.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use scorebook_core::{
  code::{ClassroomCode, GradeCode, SchoolYearCode, TermCode},
  ranking::{Period, Population},
  report::RankingList,
};
use serde::Deserialize;

use crate::{AppState, Backend, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
  pub term:        Option<TermCode>,
  pub school_year: Option<SchoolYearCode>,
}

impl PeriodParams {
  /// The requested period, or `None` to fall back to the default year.
  pub fn into_period(self) -> Result<Option<Period>, ApiError> {
    match (self.term, self.school_year) {
      (Some(_), Some(_)) => Err(ApiError::BadRequest(
        "give either term or school_year, not both".into(),
      )),
      (Some(term), None) => Ok(Some(Period::Term(term))),
      (None, Some(year)) => Ok(Some(Period::SchoolYear(year))),
      (None, None) => Ok(None),
    }
  }
}

async fn ranking<S: Backend>(
  state: &AppState<S>,
  population: Population,
  params: PeriodParams,
) -> Result<RankingList, ApiError> {
  let period = params.into_period()?;
  let period = state.reports.resolve_period(&population, period).await?;
  Ok(state.reports.ranking(&population, &period).await?)
}

/// `GET /rankings/classrooms/{code}`
pub async fn classroom<S: Backend>(
  State(state): State<AppState<S>>,
  Path(code): Path<ClassroomCode>,
  Query(params): Query<PeriodParams>,
) -> Result<Json<RankingList>, ApiError> {
  Ok(Json(ranking(&state, Population::Classroom(code), params).await?))
}

/// `GET /rankings/grades/{code}`
pub async fn grade<S: Backend>(
  State(state): State<AppState<S>>,
  Path(code): Path<GradeCode>,
  Query(params): Query<PeriodParams>,
) -> Result<Json<RankingList>, ApiError> {
  Ok(Json(ranking(&state, Population::Grade(code), params).await?))
}
