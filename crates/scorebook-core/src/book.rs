//! [`ScoreBook`], the score-mutation boundary.
//!
//! Every write through a `ScoreBook` is followed by an explicit call to
//! [`Recomputer::on_score_changed`] for the affected (student, exam). The
//! score write itself is never rolled back because of the cascade; a failed
//! cascade leaves the aggregates stale until the next trigger.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::{
  Error, ServiceError,
  code::{ClassroomCode, ExamCode, StudentCode},
  engine::{CascadeReport, Recomputer},
  score::{Score, ScoreEntry},
  store::{AggregateStore, ReferenceReader, ScoreStore},
};

/// Result of writing one score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Written {
  pub score:   Score,
  /// `None` when the cascade was aborted or failed; see the logs.
  pub cascade: Option<CascadeReport>,
}

pub struct ScoreBook<S> {
  engine: Recomputer<S>,
}

impl<S> ScoreBook<S>
where
  S: ReferenceReader + ScoreStore + AggregateStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { engine: Recomputer::new(store) } }

  pub fn engine(&self) -> &Recomputer<S> { &self.engine }

  pub fn store(&self) -> &Arc<S> { self.engine.store() }

  pub async fn get_score(
    &self,
    student: &StudentCode,
    exam: &ExamCode,
  ) -> Result<Option<Score>, ServiceError<S::Error>> {
    self
      .store()
      .get_score(student, exam)
      .await
      .map_err(ServiceError::Store)
  }

  /// Create or overwrite one score, then recompute.
  ///
  /// The student and exam must exist.
  pub async fn put_score(
    &self,
    score: Score,
  ) -> Result<Written, ServiceError<S::Error>> {
    let store = self.store();
    store
      .student(&score.student_code)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::StudentNotFound(score.student_code.clone()))?;
    store
      .exam(&score.exam_code)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::ExamNotFound(score.exam_code.clone()))?;

    store
      .put_score(score.clone())
      .await
      .map_err(ServiceError::Store)?;
    let cascade = self
      .engine
      .on_score_changed(&score.student_code, &score.exam_code)
      .await;
    Ok(Written { score, cascade })
  }

  /// Delete one score, then recompute. Returns the deleted score, or `None`
  /// (without recomputing) if there was nothing to delete.
  pub async fn delete_score(
    &self,
    student: &StudentCode,
    exam: &ExamCode,
  ) -> Result<Option<Score>, ServiceError<S::Error>> {
    let removed = self
      .store()
      .delete_score(student, exam)
      .await
      .map_err(ServiceError::Store)?;
    if removed.is_some() {
      self.engine.on_score_changed(student, exam).await;
    }
    Ok(removed)
  }

  /// Enter a classroom's score sheet for one exam.
  ///
  /// Every entry is validated (student enrolled in `classroom`, value in
  /// range) before anything is written; the sheet is then written as one
  /// atomic batch and a cascade runs for each student on it. When a student
  /// appears more than once, the last entry wins.
  ///
  /// Returns every score the classroom now has for `exam`, including those
  /// of students who were not on the sheet.
  pub async fn enter_exam_scores(
    &self,
    classroom: &ClassroomCode,
    exam: &ExamCode,
    entries: Vec<ScoreEntry>,
  ) -> Result<Vec<Score>, ServiceError<S::Error>> {
    let store = self.store();
    store
      .classroom(classroom)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::ClassroomNotFound(classroom.clone()))?;
    store
      .exam(exam)
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::ExamNotFound(exam.clone()))?;

    let enrolled = store
      .classroom_students(classroom)
      .await
      .map_err(ServiceError::Store)?;
    if enrolled.is_empty() {
      return Err(Error::EmptyClassroom(classroom.clone()).into());
    }

    let mut sheet: BTreeMap<StudentCode, Score> = BTreeMap::new();
    for entry in entries {
      if !enrolled.iter().any(|s| s.code == entry.student_code) {
        return Err(
          Error::NotInClassroom {
            student:   entry.student_code,
            classroom: classroom.clone(),
          }
          .into(),
        );
      }
      let score = Score::new(entry.student_code.clone(), exam.clone(), entry.value)?;
      sheet.insert(entry.student_code, score);
    }

    let scores: Vec<Score> = sheet.into_values().collect();
    store
      .put_scores(scores.clone())
      .await
      .map_err(ServiceError::Store)?;
    info!(%classroom, %exam, count = scores.len(), "entered exam scores");

    for score in &scores {
      self
        .engine
        .on_score_changed(&score.student_code, &score.exam_code)
        .await;
    }

    let mut listed: Vec<Score> = store
      .classroom_scores(classroom)
      .await
      .map_err(ServiceError::Store)?
      .into_iter()
      .filter(|row| &row.exam_code == exam)
      .map(Score::from)
      .collect();
    listed.sort_by(|a, b| a.student_code.cmp(&b.student_code));
    Ok(listed)
  }
}
