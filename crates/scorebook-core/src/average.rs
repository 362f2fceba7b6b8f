//! Derived aggregate rows and the averaging policy behind them.
//!
//! Averages are two-level: a subject average is the mean of that subject's
//! scores, and a student average is the mean of the subject averages. A
//! subject with one exam therefore weighs the same as one with ten.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::code::{SchoolYearCode, StudentCode, SubjectCode, TermCode};

/// Arithmetic mean of `values`; an empty set averages to `0.0`.
pub fn mean<I>(values: I) -> f64
where
  I: IntoIterator<Item = f64>,
{
  let (sum, count) = values
    .into_iter()
    .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
  if count == 0 { 0.0 } else { sum / count as f64 }
}

// ─── Performance tier ────────────────────────────────────────────────────────

/// Academic-performance classification ("học lực") derived from an average.
///
/// Parses from either the snake_case name or the report-card label.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum Tier {
  #[strum(to_string = "excellent", serialize = "Giỏi")]
  Excellent,
  #[strum(to_string = "good", serialize = "Khá")]
  Good,
  #[strum(to_string = "average", serialize = "Trung bình")]
  Average,
  #[strum(to_string = "weak", serialize = "Yếu")]
  Weak,
}

impl Tier {
  /// Classify an average: `>= 8.0` excellent, `>= 6.5` good, `>= 5.0`
  /// average, anything lower weak.
  pub fn classify(average: f64) -> Self {
    if average >= 8.0 {
      Self::Excellent
    } else if average >= 6.5 {
      Self::Good
    } else if average >= 5.0 {
      Self::Average
    } else {
      Self::Weak
    }
  }

  /// The label printed on Vietnamese report cards.
  pub fn label_vi(&self) -> &'static str {
    match self {
      Self::Excellent => "Giỏi",
      Self::Good => "Khá",
      Self::Average => "Trung bình",
      Self::Weak => "Yếu",
    }
  }
}

// ─── Term aggregates ─────────────────────────────────────────────────────────

/// Mean of a student's scores in one subject for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTermAverage {
  pub student_code: StudentCode,
  pub subject_code: SubjectCode,
  pub term_code:    TermCode,
  pub average:      f64,
}

/// Mean of a student's subject-term averages for one term, with ranks.
///
/// Rank fields stay `None` until the first ranking pass covering the student
/// in that scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentTermAverage {
  pub student_code:   StudentCode,
  pub term_code:      TermCode,
  pub average:        f64,
  pub classroom_rank: Option<u32>,
  pub grade_rank:     Option<u32>,
  pub tier:           Tier,
}

impl StudentTermAverage {
  /// An unranked row for `average`, classified into its tier.
  pub fn unranked(
    student_code: StudentCode,
    term_code: TermCode,
    average: f64,
  ) -> Self {
    Self {
      student_code,
      term_code,
      average,
      classroom_rank: None,
      grade_rank: None,
      tier: Tier::classify(average),
    }
  }
}

// ─── Yearly aggregates ───────────────────────────────────────────────────────

/// Mean of a student's subject-term averages for one subject across every
/// term of a school year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectYearlyAverage {
  pub student_code:     StudentCode,
  pub subject_code:     SubjectCode,
  pub school_year_code: SchoolYearCode,
  pub average:          f64,
}

/// Mean of a student's subject-yearly averages, with ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentYearlyAverage {
  pub student_code:     StudentCode,
  pub school_year_code: SchoolYearCode,
  pub average:          f64,
  pub classroom_rank:   Option<u32>,
  pub grade_rank:       Option<u32>,
  pub tier:             Tier,
}

impl StudentYearlyAverage {
  pub fn unranked(
    student_code: StudentCode,
    school_year_code: SchoolYearCode,
    average: f64,
  ) -> Self {
    Self {
      student_code,
      school_year_code,
      average,
      classroom_rank: None,
      grade_rank: None,
      tier: Tier::classify(average),
    }
  }
}
