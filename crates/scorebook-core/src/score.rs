//! Scores: the raw facts every derived aggregate is computed from.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  code::{ExamCode, StudentCode, SubjectCode, TermCode},
};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// One student's result on one exam. At most one score exists per
/// (student, exam) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
  pub student_code: StudentCode,
  pub exam_code:    ExamCode,
  pub value:        f64,
}

impl Score {
  /// Build a score, rejecting values outside `[0, 10]` and non-finite values.
  pub fn new(
    student_code: StudentCode,
    exam_code: ExamCode,
    value: f64,
  ) -> Result<Self> {
    Ok(Self { student_code, exam_code, value: validate_value(value)? })
  }
}

pub fn validate_value(value: f64) -> Result<f64> {
  if value.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&value) {
    Ok(value)
  } else {
    Err(Error::ScoreOutOfRange(value))
  }
}

/// A score joined with the subject and term of its exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetail {
  pub exam_code:    ExamCode,
  pub subject_code: SubjectCode,
  pub term_code:    TermCode,
  pub value:        f64,
}

/// A score as listed on a classroom's score sheet: the student's name plus
/// the exam's subject and term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassroomScore {
  pub student_code: StudentCode,
  pub student_name: String,
  pub exam_code:    ExamCode,
  pub subject_code: SubjectCode,
  pub term_code:    TermCode,
  pub value:        f64,
}

impl From<ClassroomScore> for Score {
  fn from(row: ClassroomScore) -> Self {
    Self {
      student_code: row.student_code,
      exam_code:    row.exam_code,
      value:        row.value,
    }
  }
}

/// One line of a classroom score sheet for a single exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
  pub student_code: StudentCode,
  pub value:        f64,
}
