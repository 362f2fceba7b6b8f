//! Handlers for score endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/scores/{student}/{exam}` | Body: `{"value":8.5}`; recomputes |
//! | `GET`    | `/scores/{student}/{exam}` | 404 if not found |
//! | `DELETE` | `/scores/{student}/{exam}` | 404 if not found; recomputes |
//! | `POST`   | `/classrooms/{classroom}/exams/{exam}/scores` | Body: `[{"student_code":"HS01","value":7}]` |
//! | `GET`    | `/classrooms/{classroom}/scores` | Optional `?exam=&subject=` |
//! | `GET`    | `/students/{student}/scores` | Optional `?subject=&term=` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use scorebook_core::{
  book::Written,
  code::{ClassroomCode, ExamCode, StudentCode, SubjectCode, TermCode},
  score::{ClassroomScore, Score, ScoreDetail, ScoreEntry},
};
use serde::Deserialize;

use crate::{AppState, Backend, error::ApiError};

// ─── Single score ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PutBody {
  pub value: f64,
}

/// `PUT /scores/{student}/{exam}`
pub async fn put_one<S: Backend>(
  State(state): State<AppState<S>>,
  Path((student, exam)): Path<(StudentCode, ExamCode)>,
  Json(body): Json<PutBody>,
) -> Result<Json<Written>, ApiError> {
  let score = Score::new(student, exam, body.value)?;
  let written = state.book.put_score(score).await?;
  Ok(Json(written))
}

/// `GET /scores/{student}/{exam}`
pub async fn get_one<S: Backend>(
  State(state): State<AppState<S>>,
  Path((student, exam)): Path<(StudentCode, ExamCode)>,
) -> Result<Json<Score>, ApiError> {
  let score = state
    .book
    .get_score(&student, &exam)
    .await?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no score for student {student} on exam {exam}"))
    })?;
  Ok(Json(score))
}

/// `DELETE /scores/{student}/{exam}`
pub async fn delete_one<S: Backend>(
  State(state): State<AppState<S>>,
  Path((student, exam)): Path<(StudentCode, ExamCode)>,
) -> Result<StatusCode, ApiError> {
  match state.book.delete_score(&student, &exam).await? {
    Some(_) => Ok(StatusCode::NO_CONTENT),
    None => Err(ApiError::NotFound(format!(
      "no score for student {student} on exam {exam}"
    ))),
  }
}

// ─── Score sheet ─────────────────────────────────────────────────────────────

/// `POST /classrooms/{classroom}/exams/{exam}/scores`
pub async fn enter_sheet<S: Backend>(
  State(state): State<AppState<S>>,
  Path((classroom, exam)): Path<(ClassroomCode, ExamCode)>,
  Json(entries): Json<Vec<ScoreEntry>>,
) -> Result<Json<Vec<Score>>, ApiError> {
  let scores = state
    .book
    .enter_exam_scores(&classroom, &exam, entries)
    .await?;
  Ok(Json(scores))
}

#[derive(Debug, Deserialize)]
pub struct ClassroomScoreParams {
  pub exam:    Option<ExamCode>,
  pub subject: Option<SubjectCode>,
}

/// `GET /classrooms/{classroom}/scores[?exam=<code>][&subject=<code>]`
pub async fn classroom_scores<S: Backend>(
  State(state): State<AppState<S>>,
  Path(classroom): Path<ClassroomCode>,
  Query(params): Query<ClassroomScoreParams>,
) -> Result<Json<Vec<ClassroomScore>>, ApiError> {
  let scores = state
    .reports
    .classroom_scores(&classroom, params.exam.as_ref(), params.subject.as_ref())
    .await?;
  Ok(Json(scores))
}

// ─── Student scores ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StudentScoreParams {
  pub subject: Option<SubjectCode>,
  pub term:    Option<TermCode>,
}

/// `GET /students/{student}/scores[?subject=<code>][&term=<code>]`
pub async fn student_scores<S: Backend>(
  State(state): State<AppState<S>>,
  Path(student): Path<StudentCode>,
  Query(params): Query<StudentScoreParams>,
) -> Result<Json<Vec<ScoreDetail>>, ApiError> {
  let scores = state
    .reports
    .student_scores(&student, params.subject.as_ref(), params.term.as_ref())
    .await?;
  Ok(Json(scores))
}
