//! JSON REST API for Scorebook.
//!
//! Exposes an axum [`Router`] backed by any store implementing the
//! [`scorebook_core::store`] traits. Transport concerns (TLS, tracing
//! layers) are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", scorebook_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod performance;
pub mod rankings;
pub mod scores;

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::State,
  routing::{get, post, put},
};
use scorebook_core::{
  book::ScoreBook,
  engine::RebuildReport,
  report::Reports,
  store::{AggregateStore, ReferenceReader, ScoreStore},
};

pub use error::ApiError;

/// Any backend the API can serve.
pub trait Backend:
  ReferenceReader + ScoreStore + AggregateStore + 'static
{
}

impl<S> Backend for S where
  S: ReferenceReader + ScoreStore + AggregateStore + 'static
{
}

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub book:    Arc<ScoreBook<S>>,
  pub reports: Reports<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { book: Arc::clone(&self.book), reports: self.reports.clone() }
  }
}

impl<S: Backend> AppState<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      book:    Arc::new(ScoreBook::new(Arc::clone(&store))),
      reports: Reports::new(store),
    }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: Backend>(store: Arc<S>) -> Router<()> {
  Router::new()
    // Scores
    .route(
      "/scores/{student}/{exam}",
      put(scores::put_one::<S>)
        .get(scores::get_one::<S>)
        .delete(scores::delete_one::<S>),
    )
    .route(
      "/classrooms/{classroom}/exams/{exam}/scores",
      post(scores::enter_sheet::<S>),
    )
    .route(
      "/classrooms/{classroom}/scores",
      get(scores::classroom_scores::<S>),
    )
    .route("/students/{student}/scores", get(scores::student_scores::<S>))
    // Rankings
    .route("/rankings/classrooms/{code}", get(rankings::classroom::<S>))
    .route("/rankings/grades/{code}", get(rankings::grade::<S>))
    // Performance
    .route("/performance/classrooms/{code}", get(performance::classroom::<S>))
    .route("/performance/grades/{code}", get(performance::grade::<S>))
    // Maintenance
    .route("/rebuild", post(rebuild::<S>))
    .with_state(AppState::new(store))
}

/// `POST /rebuild`: recompute every aggregate from the score table.
async fn rebuild<S: Backend>(
  State(state): State<AppState<S>>,
) -> Result<Json<RebuildReport>, ApiError> {
  let report = state.book.engine().rebuild().await.map_err(ApiError::store)?;
  Ok(Json(report))
}
