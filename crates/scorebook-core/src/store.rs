//! Storage traits the engine and services are written against.
//!
//! Backends (e.g. `scorebook-store-sqlite`, or [`crate::memory::MemoryStore`]
//! for tests) implement all three. Higher layers depend on these
//! abstractions, never on a concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use crate::{
  average::{
    StudentTermAverage, StudentYearlyAverage, SubjectTermAverage,
    SubjectYearlyAverage,
  },
  code::{
    ClassroomCode, ExamCode, GradeCode, SchoolYearCode, StudentCode,
    SubjectCode, TermCode,
  },
  ranking::{Period, RankAssignment, RankScope, Standing},
  school::{Classroom, Exam, Grade, Student, Term},
  score::{ClassroomScore, Score, ScoreDetail},
};

/// Shared error type for every storage trait a backend implements.
pub trait Store: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── Reference data ──────────────────────────────────────────────────────────

/// Read-only access to the school graph. The engine never writes through
/// this trait.
pub trait ReferenceReader: Store {
  fn student<'a>(
    &'a self,
    code: &'a StudentCode,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + 'a;

  fn classroom<'a>(
    &'a self,
    code: &'a ClassroomCode,
  ) -> impl Future<Output = Result<Option<Classroom>, Self::Error>> + Send + 'a;

  fn grade<'a>(
    &'a self,
    code: &'a GradeCode,
  ) -> impl Future<Output = Result<Option<Grade>, Self::Error>> + Send + 'a;

  fn exam<'a>(
    &'a self,
    code: &'a ExamCode,
  ) -> impl Future<Output = Result<Option<Exam>, Self::Error>> + Send + 'a;

  fn term<'a>(
    &'a self,
    code: &'a TermCode,
  ) -> impl Future<Output = Result<Option<Term>, Self::Error>> + Send + 'a;

  /// Every term belonging to `school_year`.
  fn terms_in_year<'a>(
    &'a self,
    school_year: &'a SchoolYearCode,
  ) -> impl Future<Output = Result<Vec<Term>, Self::Error>> + Send + 'a;

  /// Every student enrolled in `classroom`.
  fn classroom_students<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + 'a;

  /// Every student enrolled in any classroom of `grade`.
  fn grade_students<'a>(
    &'a self,
    grade: &'a GradeCode,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + 'a;
}

// ─── Scores ──────────────────────────────────────────────────────────────────

/// The raw score table. Writes through this trait do not recompute anything;
/// callers go through [`crate::book::ScoreBook`] to get the cascade.
pub trait ScoreStore: Store {
  fn get_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + 'a;

  /// Insert the score, or overwrite the value for an existing
  /// (student, exam) pair.
  fn put_score(
    &self,
    score: Score,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Upsert a batch of scores atomically: either every score is written or
  /// none is.
  fn put_scores(
    &self,
    scores: Vec<Score>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove a score, returning it if it existed.
  fn delete_score<'a>(
    &'a self,
    student: &'a StudentCode,
    exam: &'a ExamCode,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + 'a;

  /// Values of every score `student` has on exams of `subject` in `term`.
  fn subject_term_scores<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> impl Future<Output = Result<Vec<f64>, Self::Error>> + Send + 'a;

  /// Every score of `student`, joined with its exam's subject and term.
  fn student_scores<'a>(
    &'a self,
    student: &'a StudentCode,
  ) -> impl Future<Output = Result<Vec<ScoreDetail>, Self::Error>> + Send + 'a;

  /// Every score held by a student currently enrolled in `classroom`, on an
  /// exam that exists.
  fn classroom_scores<'a>(
    &'a self,
    classroom: &'a ClassroomCode,
  ) -> impl Future<Output = Result<Vec<ClassroomScore>, Self::Error>> + Send + 'a;

  fn list_scores(
    &self,
  ) -> impl Future<Output = Result<Vec<Score>, Self::Error>> + Send + '_;
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// The derived aggregate tables.
///
/// Every `upsert_*` creates the row if absent and overwrites its average (and
/// tier) if present. Upserts never touch rank fields; only
/// [`AggregateStore::apply_ranking`] writes ranks.
pub trait AggregateStore: Store {
  fn upsert_subject_term_average(
    &self,
    row: SubjectTermAverage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_subject_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    term: &'a TermCode,
  ) -> impl Future<Output = Result<Option<SubjectTermAverage>, Self::Error>>
  + Send
  + 'a;

  /// All of `student`'s subject averages for `term`, across subjects.
  fn subject_term_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> impl Future<Output = Result<Vec<SubjectTermAverage>, Self::Error>>
  + Send
  + 'a;

  /// `student`'s averages for `subject` in any of `terms`.
  fn subject_averages_in_terms<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    terms: &'a [TermCode],
  ) -> impl Future<Output = Result<Vec<SubjectTermAverage>, Self::Error>>
  + Send
  + 'a;

  fn list_subject_term_averages(
    &self,
  ) -> impl Future<Output = Result<Vec<SubjectTermAverage>, Self::Error>>
  + Send
  + '_;

  /// Upsert average and tier; existing rank fields are preserved.
  fn upsert_student_term_average(
    &self,
    row: StudentTermAverage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_student_term_average<'a>(
    &'a self,
    student: &'a StudentCode,
    term: &'a TermCode,
  ) -> impl Future<Output = Result<Option<StudentTermAverage>, Self::Error>>
  + Send
  + 'a;

  fn upsert_subject_yearly_average(
    &self,
    row: SubjectYearlyAverage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_subject_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    subject: &'a SubjectCode,
    school_year: &'a SchoolYearCode,
  ) -> impl Future<Output = Result<Option<SubjectYearlyAverage>, Self::Error>>
  + Send
  + 'a;

  fn subject_yearly_averages<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> impl Future<Output = Result<Vec<SubjectYearlyAverage>, Self::Error>>
  + Send
  + 'a;

  /// Upsert average and tier; existing rank fields are preserved.
  fn upsert_student_yearly_average(
    &self,
    row: StudentYearlyAverage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_student_yearly_average<'a>(
    &'a self,
    student: &'a StudentCode,
    school_year: &'a SchoolYearCode,
  ) -> impl Future<Output = Result<Option<StudentYearlyAverage>, Self::Error>>
  + Send
  + 'a;

  /// Every student-level row for `period`.
  fn standings<'a>(
    &'a self,
    period: &'a Period,
  ) -> impl Future<Output = Result<Vec<Standing>, Self::Error>> + Send + 'a;

  /// Rank `members` for `period` with [`crate::ranking::dense_rank`] and write
  /// the `scope` rank field of each ranked row.
  ///
  /// Members without a row for `period` are skipped. Reading the averages and
  /// writing the ranks happens as one atomic batch, so no reader ever sees a
  /// half-applied ranking.
  fn apply_ranking<'a>(
    &'a self,
    period: &'a Period,
    scope: RankScope,
    members: &'a [StudentCode],
  ) -> impl Future<Output = Result<Vec<RankAssignment>, Self::Error>> + Send + 'a;
}
