//! The average/ranking recomputation engine.
//!
//! Every score mutation funnels into [`Recomputer::on_score_changed`], which
//! runs the cascade for the affected (student, exam):
//!
//! 1. resolve exam → (subject, term) and term → school year;
//! 2. recompute the subject-term average;
//! 3. recompute the student-term average and re-rank classroom and grade for
//!    the term;
//! 4. recompute the subject-yearly average;
//! 5. recompute the student-yearly average and re-rank classroom and grade for
//!    the school year.
//!
//! Each step reads the previous step's output, so the order is fixed. Every
//! step recomputes its row from scratch; nothing is adjusted incrementally,
//! which keeps every aggregate equal to what a full rebuild would produce.

use std::{
  collections::{BTreeSet, HashMap},
  sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
  average::{
    StudentTermAverage, StudentYearlyAverage, SubjectTermAverage,
    SubjectYearlyAverage, mean,
  },
  code::{ExamCode, SchoolYearCode, StudentCode, SubjectCode, TermCode},
  ranking::{Period, Population, RankAssignment},
  school::{Exam, Term},
  store::{AggregateStore, ReferenceReader, ScoreStore},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a cascade stopped before writing anything.
#[derive(Debug, Error)]
pub enum CascadeError<E>
where
  E: std::error::Error + 'static,
{
  #[error("exam not found: {0}")]
  ExamNotFound(ExamCode),

  #[error("term not found: {0}")]
  TermNotFound(TermCode),

  #[error("store error: {0}")]
  Store(#[source] E),
}

/// Every row a completed cascade wrote, as read back after ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
  pub subject_term:   SubjectTermAverage,
  pub student_term:   StudentTermAverage,
  pub subject_yearly: SubjectYearlyAverage,
  pub student_yearly: StudentYearlyAverage,
}

/// Summary of a [`Recomputer::rebuild`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
  /// Cascades run to completion.
  pub cascades: usize,
  /// (student, subject, term) keys skipped because a reference was missing.
  pub skipped:  usize,
}

// ─── Per-student locking ─────────────────────────────────────────────────────

/// One async lock per student. A cascade holds its student's lock from the
/// first read to the last write, so two cascades for the same student never
/// interleave.
///
/// Entries are never evicted; the map grows to at most one lock per student
/// in the roster.
#[derive(Debug, Default)]
struct StudentLocks {
  locks: Mutex<HashMap<StudentCode, Arc<AsyncMutex<()>>>>,
}

impl StudentLocks {
  async fn lock(&self, student: &StudentCode) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(locks.entry(student.clone()).or_default())
    };
    lock.lock_owned().await
  }
}

// ─── Recomputer ──────────────────────────────────────────────────────────────

/// Runs the recomputation cascade against a store.
pub struct Recomputer<S> {
  store: Arc<S>,
  locks: StudentLocks,
}

impl<S> Recomputer<S>
where
  S: ReferenceReader + ScoreStore + AggregateStore,
{
  pub fn new(store: Arc<S>) -> Self {
    Self { store, locks: StudentLocks::default() }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Trigger entry point, called after any create, update, or delete of the
  /// score for (`student`, `exam`).
  ///
  /// Never fails: a missing exam or term aborts the cascade with a warning,
  /// and a storage failure is logged. In both cases the aggregates stay as
  /// they were until the next successful trigger.
  pub async fn on_score_changed(
    &self,
    student: &StudentCode,
    exam: &ExamCode,
  ) -> Option<CascadeReport> {
    match self.recompute(student, exam).await {
      Ok(report) => Some(report),
      Err(CascadeError::Store(e)) => {
        error!(%student, %exam, "recomputation failed: {e}");
        None
      }
      Err(e) => {
        warn!(%student, %exam, "recomputation aborted: {e}");
        None
      }
    }
  }

  /// Fallible form of [`Self::on_score_changed`].
  pub async fn recompute(
    &self,
    student: &StudentCode,
    exam: &ExamCode,
  ) -> Result<CascadeReport, CascadeError<S::Error>> {
    let exam = self
      .store
      .exam(exam)
      .await
      .map_err(CascadeError::Store)?
      .ok_or_else(|| CascadeError::ExamNotFound(exam.clone()))?;
    let term = self.resolve_term(&exam).await?;
    self.cascade(student, &exam.subject_code, &term).await
  }

  async fn resolve_term(
    &self,
    exam: &Exam,
  ) -> Result<Term, CascadeError<S::Error>> {
    self
      .store
      .term(&exam.term_code)
      .await
      .map_err(CascadeError::Store)?
      .ok_or_else(|| CascadeError::TermNotFound(exam.term_code.clone()))
  }

  async fn cascade(
    &self,
    student: &StudentCode,
    subject: &SubjectCode,
    term: &Term,
  ) -> Result<CascadeReport, CascadeError<S::Error>> {
    let _guard = self.locks.lock(student).await;
    let year = &term.school_year_code;
    info!(
      %student, %subject, term = %term.code, school_year = %year,
      "recomputing averages"
    );

    let subject_term = self
      .update_subject_term_average(student, subject, &term.code)
      .await
      .map_err(CascadeError::Store)?;
    let student_term = self
      .update_student_term_average(student, &term.code)
      .await
      .map_err(CascadeError::Store)?;
    let subject_yearly = self
      .update_subject_yearly_average(student, subject, year)
      .await
      .map_err(CascadeError::Store)?;
    let student_yearly = self
      .update_student_yearly_average(student, year)
      .await
      .map_err(CascadeError::Store)?;

    Ok(CascadeReport { subject_term, student_term, subject_yearly, student_yearly })
  }

  // ── Aggregators ───────────────────────────────────────────────────────────

  /// Mean of `student`'s scores on exams of `subject` in `term`, written to
  /// the subject-term row (0 when there are no scores).
  pub async fn update_subject_term_average(
    &self,
    student: &StudentCode,
    subject: &SubjectCode,
    term: &TermCode,
  ) -> Result<SubjectTermAverage, S::Error> {
    let scores = self.store.subject_term_scores(student, subject, term).await?;
    let row = SubjectTermAverage {
      student_code: student.clone(),
      subject_code: subject.clone(),
      term_code:    term.clone(),
      average:      mean(scores),
    };
    debug!(%student, %subject, %term, average = row.average, "subject term average");
    self.store.upsert_subject_term_average(row.clone()).await?;
    Ok(row)
  }

  /// Mean of `student`'s subject-term averages for `term`, classified and
  /// written, then ranked within the student's classroom and grade.
  pub async fn update_student_term_average(
    &self,
    student: &StudentCode,
    term: &TermCode,
  ) -> Result<StudentTermAverage, S::Error> {
    let subject_rows = self.store.subject_term_averages(student, term).await?;
    let average = mean(subject_rows.iter().map(|r| r.average));
    let row = StudentTermAverage::unranked(student.clone(), term.clone(), average);
    debug!(%student, %term, average, tier = %row.tier, "student term average");
    self.store.upsert_student_term_average(row.clone()).await?;

    self.rerank(student, &Period::Term(term.clone())).await?;

    Ok(
      self
        .store
        .get_student_term_average(student, term)
        .await?
        .unwrap_or(row),
    )
  }

  /// Mean of `student`'s `subject` averages across every term of
  /// `school_year`.
  pub async fn update_subject_yearly_average(
    &self,
    student: &StudentCode,
    subject: &SubjectCode,
    school_year: &SchoolYearCode,
  ) -> Result<SubjectYearlyAverage, S::Error> {
    let terms: Vec<TermCode> = self
      .store
      .terms_in_year(school_year)
      .await?
      .into_iter()
      .map(|t| t.code)
      .collect();
    let term_rows = self
      .store
      .subject_averages_in_terms(student, subject, &terms)
      .await?;
    let row = SubjectYearlyAverage {
      student_code:     student.clone(),
      subject_code:     subject.clone(),
      school_year_code: school_year.clone(),
      average:          mean(term_rows.iter().map(|r| r.average)),
    };
    debug!(
      %student, %subject, %school_year, average = row.average,
      "subject yearly average"
    );
    self.store.upsert_subject_yearly_average(row.clone()).await?;
    Ok(row)
  }

  /// Mean of `student`'s subject-yearly averages, classified and written,
  /// then ranked within the student's classroom and grade.
  pub async fn update_student_yearly_average(
    &self,
    student: &StudentCode,
    school_year: &SchoolYearCode,
  ) -> Result<StudentYearlyAverage, S::Error> {
    let subject_rows = self
      .store
      .subject_yearly_averages(student, school_year)
      .await?;
    let average = mean(subject_rows.iter().map(|r| r.average));
    let row = StudentYearlyAverage::unranked(
      student.clone(),
      school_year.clone(),
      average,
    );
    debug!(%student, %school_year, average, tier = %row.tier, "student yearly average");
    self.store.upsert_student_yearly_average(row.clone()).await?;

    self
      .rerank(student, &Period::SchoolYear(school_year.clone()))
      .await?;

    Ok(
      self
        .store
        .get_student_yearly_average(student, school_year)
        .await?
        .unwrap_or(row),
    )
  }

  // ── Ranking ───────────────────────────────────────────────────────────────

  /// Re-rank `student`'s classroom and grade for `period`.
  ///
  /// A student without a resolvable classroom or grade keeps their average
  /// but is not ranked; that is logged, not returned as an error.
  pub async fn rerank(
    &self,
    student: &StudentCode,
    period: &Period,
  ) -> Result<(), S::Error> {
    let Some(record) = self.store.student(student).await? else {
      warn!(%student, "student not found; skipping ranking");
      return Ok(());
    };
    let Some(classroom_code) = record.classroom_code else {
      warn!(%student, "student has no classroom; skipping ranking");
      return Ok(());
    };
    let Some(classroom) = self.store.classroom(&classroom_code).await? else {
      warn!(%student, classroom = %classroom_code, "classroom not found; skipping ranking");
      return Ok(());
    };

    self
      .rank_population(&Population::Classroom(classroom.code), period)
      .await?;
    self
      .rank_population(&Population::Grade(classroom.grade_code), period)
      .await?;
    Ok(())
  }

  /// Rank every member of `population` with a row for `period`.
  pub async fn rank_population(
    &self,
    population: &Population,
    period: &Period,
  ) -> Result<Vec<RankAssignment>, S::Error> {
    let students = match population {
      Population::Classroom(code) => self.store.classroom_students(code).await?,
      Population::Grade(code) => self.store.grade_students(code).await?,
    };
    let members: Vec<StudentCode> = students.into_iter().map(|s| s.code).collect();

    let ranks = self
      .store
      .apply_ranking(period, population.scope(), &members)
      .await?;
    debug!(?population, ?period, ranked = ranks.len(), "applied ranking");
    Ok(ranks)
  }

  // ── Rebuild ───────────────────────────────────────────────────────────────

  /// Recompute every aggregate from the full score set.
  ///
  /// Runs one cascade per (student, subject, term) that either has a score or
  /// already has a subject-term row, so rows whose scores were all deleted
  /// are brought back to 0 as well.
  pub async fn rebuild(&self) -> Result<RebuildReport, S::Error> {
    let mut exams: HashMap<ExamCode, Option<Exam>> = HashMap::new();
    let mut keys: BTreeSet<(StudentCode, SubjectCode, TermCode)> = BTreeSet::new();
    let mut report = RebuildReport::default();

    for score in self.store.list_scores().await? {
      if !exams.contains_key(&score.exam_code) {
        let exam = self.store.exam(&score.exam_code).await?;
        exams.insert(score.exam_code.clone(), exam);
      }
      match exams.get(&score.exam_code).and_then(Option::as_ref) {
        Some(exam) => {
          keys.insert((
            score.student_code,
            exam.subject_code.clone(),
            exam.term_code.clone(),
          ));
        }
        None => {
          warn!(exam = %score.exam_code, "exam not found; score left out of rebuild");
          report.skipped += 1;
        }
      }
    }
    for row in self.store.list_subject_term_averages().await? {
      keys.insert((row.student_code, row.subject_code, row.term_code));
    }

    let mut terms: HashMap<TermCode, Option<Term>> = HashMap::new();
    for (student, subject, term_code) in keys {
      if !terms.contains_key(&term_code) {
        let term = self.store.term(&term_code).await?;
        terms.insert(term_code.clone(), term);
      }
      let Some(term) = terms.get(&term_code).and_then(Option::as_ref) else {
        warn!(term = %term_code, "term not found; skipping");
        report.skipped += 1;
        continue;
      };
      match self.cascade(&student, &subject, term).await {
        Ok(_) => report.cascades += 1,
        Err(CascadeError::Store(e)) => return Err(e),
        Err(e) => {
          warn!(%student, "rebuild cascade aborted: {e}");
          report.skipped += 1;
        }
      }
    }

    info!(cascades = report.cascades, skipped = report.skipped, "rebuild complete");
    Ok(report)
  }
}

#[cfg(test)]
mod tests;
